mod support;

use serde_json::json;
use support::{spawn_sidecar, MANUAL_RESYNC, STUDENT, TEACHER};

fn graded_classroom(sc: &mut support::Sidecar) -> (String, Vec<String>) {
    sc.open_workspace("classroomd-grading");
    let classroom_id = sc.seed_classroom();
    let task_ids: Vec<String> = (1..=3)
        .map(|n| sc.create_task(&classroom_id, json!({ "title": format!("Test {n}"), "type": "exam", "points": 100 })))
        .collect();

    sc.login(STUDENT);
    for task_id in &task_ids {
        sc.data(
            "submissions.submit",
            json!({ "classroomId": classroom_id, "taskId": task_id, "text": "answers" }),
        );
    }

    sc.login(TEACHER);
    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["counts"]["needsGrading"], json!(3));

    for (task_id, grade) in task_ids.iter().zip([80, 90, 70]) {
        let receipt = sc.data(
            "grades.update",
            json!({
                "classroomId": classroom_id,
                "taskId": task_id,
                "studentEmail": STUDENT,
                "grade": grade,
                "feedback": "ok",
            }),
        );
        assert_eq!(receipt["submission"]["grade"], json!(grade as f64));
    }
    (classroom_id, task_ids)
}

#[test]
fn class_average_is_rounded_percentage() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    let (classroom_id, _) = graded_classroom(&mut sc);

    let summary = sc.data("grades.studentSummary", json!({ "classroomId": classroom_id }));
    let students = summary["students"].as_array().cloned().unwrap_or_default();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["studentEmail"], json!(STUDENT));
    assert_eq!(students[0]["gradedCount"], json!(3));
    assert_eq!(students[0]["average"], json!(80));

    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["counts"]["graded"], json!(3));
    assert_eq!(board["counts"]["needsGrading"], json!(0));

    // Same numbers once the server copy is authoritative again.
    sc.data("tasks.resync", json!({ "classroomId": classroom_id }));
    let summary = sc.data(
        "grades.studentSummary",
        json!({ "classroomId": classroom_id, "studentEmail": "ADA@x.com" }),
    );
    assert_eq!(summary["students"][0]["average"], json!(80));
}

#[test]
fn out_of_range_grade_is_rejected_and_nothing_moves() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    let (classroom_id, task_ids) = graded_classroom(&mut sc);

    for bad in [json!(101), json!(-1)] {
        let (code, _) = sc.failure(
            "grades.update",
            json!({
                "classroomId": classroom_id,
                "taskId": task_ids[0],
                "studentEmail": STUDENT,
                "grade": bad,
            }),
        );
        assert_eq!(code, "validation_error");
    }

    let summary = sc.data("grades.studentSummary", json!({ "classroomId": classroom_id }));
    assert_eq!(summary["students"][0]["average"], json!(80));
    assert_eq!(summary["students"][0]["totalPoints"], json!(240.0));
}

#[test]
fn students_read_only_their_own_summary() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    let (classroom_id, task_ids) = graded_classroom(&mut sc);

    sc.login(STUDENT);
    let summary = sc.data("grades.studentSummary", json!({ "classroomId": classroom_id }));
    assert_eq!(summary["students"][0]["average"], json!(80));

    let (code, _) = sc.failure(
        "grades.studentSummary",
        json!({ "classroomId": classroom_id, "studentEmail": "bob@x.com" }),
    );
    assert_eq!(code, "access_denied");

    let (code, _) = sc.failure(
        "grades.update",
        json!({
            "classroomId": classroom_id,
            "taskId": task_ids[0],
            "studentEmail": STUDENT,
            "grade": 100,
        }),
    );
    assert_eq!(code, "access_denied");
}

mod support;

use serde_json::json;
use std::thread;
use std::time::Duration;
use support::{spawn_sidecar, MANUAL_RESYNC, STUDENT, TEACHER};

fn homework() -> serde_json::Value {
    json!({ "title": "Worksheet 3", "type": "homework", "points": 10 })
}

#[test]
fn submission_is_provisional_until_resync_confirms_it() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-submit-phases");
    let classroom_id = sc.seed_classroom();
    let task_id = sc.create_task(&classroom_id, homework());

    sc.login(STUDENT);
    let receipt = sc.data(
        "submissions.submit",
        json!({ "classroomId": classroom_id, "taskId": task_id, "text": "my answers" }),
    );
    assert_eq!(receipt["phase"], json!("provisional"));
    assert_eq!(receipt["isResubmission"], json!(false));
    assert_eq!(receipt["submission"]["studentEmail"], json!(STUDENT));

    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["phase"], json!("provisional"));
    assert_eq!(board["journal"][0]["event"]["kind"], json!("submissionRecorded"));
    assert_eq!(board["tasks"][0]["status"], json!("completed"));

    let synced = sc.data("tasks.resync", json!({ "classroomId": classroom_id }));
    assert_eq!(synced["phase"], json!("confirmed"));

    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["phase"], json!("confirmed"));
    assert_eq!(board["journal"], json!([]));
    assert_eq!(board["tasks"][0]["submissions"][0]["text"], json!("my answers"));
}

#[test]
fn delayed_resync_fires_without_a_request() {
    let mut sc = spawn_sidecar("50");
    sc.open_workspace("classroomd-submit-timer");
    let classroom_id = sc.seed_classroom();
    let task_id = sc.create_task(&classroom_id, homework());

    sc.login(STUDENT);
    sc.data(
        "submissions.submit",
        json!({ "classroomId": classroom_id, "taskId": task_id, "text": "done" }),
    );
    thread::sleep(Duration::from_millis(400));

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["resyncPending"], json!(false));
    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["phase"], json!("confirmed"));
    assert_eq!(board["tasks"][0]["submissions"].as_array().map(|s| s.len()), Some(1));
}

#[test]
fn resubmission_asks_first_and_keeps_a_single_record() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-resubmit");
    let classroom_id = sc.seed_classroom();
    let task_id = sc.create_task(&classroom_id, homework());

    sc.login(STUDENT);
    let submit = |text: &str, confirmed: bool| {
        json!({
            "classroomId": classroom_id,
            "taskId": task_id,
            "text": text,
            "confirmed": confirmed,
        })
    };
    sc.data("submissions.submit", submit("v1", false));

    // The first one has not been reconciled yet.
    let (code, kind) = sc.failure("submissions.submit", submit("v2", true));
    assert_eq!(code, "submission_in_flight");
    assert_eq!(kind, "validation");

    sc.data("tasks.resync", json!({ "classroomId": classroom_id }));

    let declined = sc.command("submissions.submit", submit("v2", false));
    assert_eq!(declined["success"], json!(false));
    assert_eq!(declined["cancelled"], json!(true));
    assert!(declined["prompt"].as_str().unwrap_or_default().contains("Worksheet 3"));

    let receipt = sc.data("submissions.resubmit", submit("v2", false));
    assert_eq!(receipt["isResubmission"], json!(true));

    sc.data("tasks.resync", json!({ "classroomId": classroom_id }));
    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    let subs = board["tasks"][0]["submissions"].as_array().cloned().unwrap_or_default();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0]["text"], json!("v2"));
    assert_eq!(subs[0]["isResubmission"], json!(true));

    let mine = sc.data(
        "submissions.mine",
        json!({ "classroomId": classroom_id, "taskId": task_id }),
    );
    assert_eq!(mine["submission"]["text"], json!("v2"));
}

#[test]
fn empty_submission_is_rejected_without_side_effects() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-submit-empty");
    let classroom_id = sc.seed_classroom();
    let task_id = sc.create_task(&classroom_id, homework());

    sc.login(STUDENT);
    let (code, _) = sc.failure(
        "submissions.submit",
        json!({ "classroomId": classroom_id, "taskId": task_id, "text": "   " }),
    );
    assert_eq!(code, "validation_error");

    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["phase"], json!("confirmed"));
    assert_eq!(board["tasks"][0]["status"], json!("pending"));
}

#[test]
fn late_work_needs_accept_late() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-submit-late");
    let classroom_id = sc.seed_classroom();
    let task_id = sc.create_task(
        &classroom_id,
        json!({ "title": "Essay", "points": 20, "dueDate": "2024-01-01T00:00:00Z" }),
    );

    sc.login(STUDENT);
    let board = sc.data(
        "tasks.list",
        json!({ "classroomId": classroom_id, "filter": "overdue" }),
    );
    assert_eq!(board["tasks"][0]["status"], json!("overdue"));
    assert_eq!(board["counts"]["overdue"], json!(1));

    let (code, _) = sc.failure(
        "submissions.submit",
        json!({ "classroomId": classroom_id, "taskId": task_id, "text": "sorry" }),
    );
    assert_eq!(code, "validation_error");

    sc.login(TEACHER);
    sc.data(
        "tasks.update",
        json!({ "classroomId": classroom_id, "taskId": task_id, "patch": { "acceptLate": true } }),
    );

    sc.login(STUDENT);
    sc.data(
        "submissions.submit",
        json!({ "classroomId": classroom_id, "taskId": task_id, "text": "sorry" }),
    );
    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["tasks"][0]["status"], json!("completed"));
}

#[test]
fn instructors_cannot_submit_and_students_see_only_their_work() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-submit-roles");
    let classroom_id = sc.seed_classroom();
    sc.data(
        "classrooms.addStudent",
        json!({ "classroomId": classroom_id, "email": "bob@x.com", "name": "Bob" }),
    );
    let task_id = sc.create_task(&classroom_id, homework());

    let (code, _) = sc.failure(
        "submissions.submit",
        json!({ "classroomId": classroom_id, "taskId": task_id, "text": "teacher copy" }),
    );
    assert_eq!(code, "access_denied");

    for who in [STUDENT, "bob@x.com"] {
        sc.login(who);
        sc.data(
            "submissions.submit",
            json!({ "classroomId": classroom_id, "taskId": task_id, "text": who }),
        );
    }

    let listed = sc.data(
        "submissions.list",
        json!({ "classroomId": classroom_id, "taskId": task_id }),
    );
    assert_eq!(listed["role"], json!("member"));
    assert_eq!(listed["submissions"].as_array().map(|s| s.len()), Some(1));

    sc.login(TEACHER);
    let listed = sc.data(
        "submissions.list",
        json!({ "classroomId": classroom_id, "taskId": task_id }),
    );
    assert_eq!(listed["role"], json!("owner"));
    assert_eq!(listed["submissions"].as_array().map(|s| s.len()), Some(2));
}

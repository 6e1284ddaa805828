mod support;

use serde_json::json;
use support::{spawn_sidecar, MANUAL_RESYNC, STUDENT};

#[test]
fn declined_delete_changes_nothing() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-task-delete");
    let classroom_id = sc.seed_classroom();
    let task_id = sc.create_task(&classroom_id, json!({ "title": "Quiz 1", "type": "quiz", "points": 5 }));

    let declined = sc.command(
        "tasks.delete",
        json!({ "classroomId": classroom_id, "taskId": task_id }),
    );
    assert_eq!(declined["success"], json!(false));
    assert_eq!(declined["cancelled"], json!(true));
    assert!(declined.get("error").is_none());

    sc.data("tasks.resync", json!({ "classroomId": classroom_id }));
    let board = sc.data("tasks.list", json!({ "classroomId": classroom_id }));
    assert_eq!(board["tasks"].as_array().map(|t| t.len()), Some(1));

    let removed = sc.data(
        "tasks.delete",
        json!({ "classroomId": classroom_id, "taskId": task_id, "confirmed": true }),
    );
    assert_eq!(removed["phase"], json!("provisional"));

    let synced = sc.data("tasks.resync", json!({ "classroomId": classroom_id }));
    assert_eq!(synced["taskCount"], json!(0));
}

#[test]
fn drafts_and_patches_are_validated_locally() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-task-validate");
    let classroom_id = sc.seed_classroom();

    let (code, kind) = sc.failure(
        "tasks.create",
        json!({ "classroomId": classroom_id, "task": { "title": "Zero", "points": 0 } }),
    );
    assert_eq!(code, "validation_error");
    assert_eq!(kind, "validation");

    let (code, _) = sc.failure(
        "tasks.create",
        json!({ "classroomId": classroom_id, "task": { "title": "  ", "points": 5 } }),
    );
    assert_eq!(code, "validation_error");

    let resp = sc.request(
        "tasks.create",
        json!({ "classroomId": classroom_id, "task": { "title": "X", "type": "lecture", "points": 5 } }),
    );
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    let task_id = sc.create_task(
        &classroom_id,
        json!({ "title": "Project", "type": "project", "points": 50, "dueDate": "2030-06-01" }),
    );
    let (code, _) = sc.failure(
        "tasks.update",
        json!({ "classroomId": classroom_id, "taskId": task_id, "patch": {} }),
    );
    assert_eq!(code, "validation_error");

    let updated = sc.data(
        "tasks.update",
        json!({
            "classroomId": classroom_id,
            "taskId": task_id,
            "patch": { "title": "Final project", "dueDate": null },
        }),
    );
    assert_eq!(updated["task"]["title"], json!("Final project"));
    assert_eq!(updated["task"]["dueDate"], json!(null));
    assert_eq!(updated["task"]["points"], json!(50.0));
}

#[test]
fn students_cannot_manage_tasks() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-task-student");
    let classroom_id = sc.seed_classroom();
    let task_id = sc.create_task(&classroom_id, json!({ "title": "Lab", "points": 10 }));

    sc.login(STUDENT);
    let (code, kind) = sc.failure(
        "tasks.create",
        json!({ "classroomId": classroom_id, "task": { "title": "Mine", "points": 1 } }),
    );
    assert_eq!(code, "access_denied");
    assert_eq!(kind, "accessDenied");

    let (code, _) = sc.failure(
        "tasks.delete",
        json!({ "classroomId": classroom_id, "taskId": task_id, "confirmed": true }),
    );
    assert_eq!(code, "access_denied");

    let (code, _) = sc.failure(
        "tasks.update",
        json!({ "classroomId": classroom_id, "taskId": task_id, "patch": { "points": 100 } }),
    );
    assert_eq!(code, "access_denied");
}

#[test]
fn unknown_filter_is_a_bad_param() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    sc.open_workspace("classroomd-task-filter");
    let classroom_id = sc.seed_classroom();
    let resp = sc.request(
        "tasks.list",
        json!({ "classroomId": classroom_id, "filter": "someday" }),
    );
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    let board = sc.data(
        "tasks.list",
        json!({ "classroomId": classroom_id, "filter": "needs-grading" }),
    );
    assert_eq!(board["role"], json!("owner"));
    assert_eq!(board["counts"]["total"], json!(0));
}

mod support;

use serde_json::json;
use support::{spawn_sidecar, MANUAL_RESYNC};

#[test]
fn host_errors_use_the_envelope() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);

    let health = sc.request_ok("health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert_eq!(health["resyncDelayMs"], json!(600000));

    let resp = sc.request("tasks.list", json!({ "classroomId": "c1" }));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("no_workspace"));

    sc.open_workspace("classroomd-smoke");
    let resp = sc.request("classrooms.list", json!({}));
    assert_eq!(resp["error"]["code"], json!("no_session"));

    let resp = sc.request("session.set", json!({ "email": "  " }));
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    let resp = sc.request("gradebook.explode", json!({}));
    assert_eq!(resp["error"]["code"], json!("not_implemented"));

    let resp = sc.send_raw("{not json");
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));

    // Still serving after a bad line.
    sc.request_ok("health", json!({}));
}

#[test]
fn session_email_is_normalized() {
    let mut sc = spawn_sidecar(MANUAL_RESYNC);
    let result = sc.request_ok("session.set", json!({ "email": " Mixed@Case.COM ", "name": "" }));
    assert_eq!(result["session"]["email"], json!("mixed@case.com"));
    assert_eq!(result["session"]["name"], json!("mixed@case.com"));
}

use crate::error::TaskError;
use crate::ipc::helpers::{command, ctx, get_flag, get_required_str, parse_params, Ctx};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle::{SubmissionLifecycle, SubmitReceipt};
use crate::model::SubmissionPayload;
use crate::outcome::{CommandResult, Outcome, Prompt};
use chrono::Utc;
use serde_json::json;

fn submit(
    c: &mut Ctx<'_>,
    classroom_id: &str,
    task_id: &str,
    payload: SubmissionPayload,
    resubmission: bool,
    confirmed: bool,
) -> Result<Outcome<SubmitReceipt>, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    let mut lifecycle = SubmissionLifecycle::new(&c.gateway, c.store, c.resyncs, c.resync_delay);
    lifecycle.submit(
        &classroom,
        c.actor,
        task_id,
        payload,
        resubmission,
        &mut |_: &Prompt| confirmed,
        Utc::now(),
    )
}

fn handle_submit(state: &mut AppState, req: &Request, resubmission: bool) -> serde_json::Value {
    let (classroom_id, task_id) = match (
        get_required_str(&req.params, "classroomId"),
        get_required_str(&req.params, "taskId"),
    ) {
        (Ok(c), Ok(t)) => (c, t),
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };
    let payload: SubmissionPayload = match parse_params(&req.params, None) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let confirmed = get_flag(&req.params, "confirmed");
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let result = submit(&mut c, &classroom_id, &task_id, payload, resubmission, confirmed);
    command(&req.id, CommandResult::from_outcome(result))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (classroom_id, task_id) = match (
        get_required_str(&req.params, "classroomId"),
        get_required_str(&req.params, "taskId"),
    ) {
        (Ok(c), Ok(t)) => (c, t),
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };
    let c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let result = c
        .gateway
        .fetch_classroom(&classroom_id)
        .and_then(|classroom| c.gateway.list_submissions(&classroom, c.actor, &task_id));
    command(&req.id, CommandResult::from_result(result))
}

fn handle_mine(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (classroom_id, task_id) = match (
        get_required_str(&req.params, "classroomId"),
        get_required_str(&req.params, "taskId"),
    ) {
        (Ok(c), Ok(t)) => (c, t),
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };
    let c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let result = c
        .gateway
        .fetch_classroom(&classroom_id)
        .and_then(|classroom| c.gateway.get_my_submission(&classroom, c.actor, &task_id))
        .map(|submission| json!({ "submission": submission }));
    command(&req.id, CommandResult::from_result(result))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.submit" => Some(handle_submit(state, req, false)),
        "submissions.resubmit" => Some(handle_submit(state, req, true)),
        "submissions.list" => Some(handle_list(state, req)),
        "submissions.mine" => Some(handle_mine(state, req)),
        _ => None,
    }
}

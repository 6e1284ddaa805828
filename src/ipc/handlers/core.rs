use crate::db::SqliteBackend;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Actor;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "session": state.actor,
            "resyncDelayMs": state.config.resync_delay_ms,
            "resyncPending": state.next_resync().is_some(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match SqliteBackend::open(&path) {
        Ok(backend) => {
            state.reset_boards();
            state.workspace = Some(path.clone());
            state.backend = Some(backend);
            tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_session_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = match get_required_str(&req.params, "email") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let name = get_optional_str(&req.params, "name").unwrap_or_default();
    let actor = Actor::new(&email, &name);
    // Cached boards may hold another user's view.
    if state.actor.as_ref() != Some(&actor) {
        state.reset_boards();
    }
    tracing::info!(actor = %actor.email, "session set");
    state.actor = Some(actor.clone());
    ok(&req.id, json!({ "session": actor }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.set" => Some(handle_session_set(state, req)),
        _ => None,
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

use crate::db::SqliteBackend;
use crate::gateway::TaskGateway;
pub use crate::ipc::error::command;
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::model::Actor;
use crate::resync::ResyncQueue;
use crate::store::{BoardEvent, BoardSnapshot, TaskStore};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_flag(params: &serde_json::Value, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Deserializes `params[key]`, or the whole params object when `key` is `None`.
pub fn parse_params<T: DeserializeOwned>(
    params: &serde_json::Value,
    key: Option<&str>,
) -> Result<T, HandlerErr> {
    let value = match key {
        Some(k) => params
            .get(k)
            .cloned()
            .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", k)))?,
        None => params.clone(),
    };
    serde_json::from_value(value).map_err(|e| HandlerErr {
        code: "bad_params",
        message: e.to_string(),
        details: key.map(|k| serde_json::json!({ "field": k })),
    })
}

/// Everything a task command needs, split out of `AppState` so the gateway
/// can borrow the backend while the store and queue are mutated.
pub struct Ctx<'a> {
    pub gateway: TaskGateway<'a, SqliteBackend>,
    pub actor: &'a Actor,
    pub store: &'a mut TaskStore,
    pub resyncs: &'a mut ResyncQueue,
    pub resync_delay: Duration,
}

impl Ctx<'_> {
    /// Applies a provisional change and queues the authoritative refetch.
    pub fn record(&mut self, classroom_id: &str, event: BoardEvent) -> Arc<BoardSnapshot> {
        let snapshot = self.store.apply(classroom_id, event);
        self.resyncs
            .schedule(classroom_id, Instant::now() + self.resync_delay);
        snapshot
    }
}

pub fn require_workspace(state: &AppState) -> Result<&SqliteBackend, HandlerErr> {
    state.backend.as_ref().ok_or_else(no_workspace)
}

pub fn require_session(state: &AppState) -> Result<&Actor, HandlerErr> {
    state.actor.as_ref().ok_or_else(no_session)
}

pub fn ctx(state: &mut AppState) -> Result<Ctx<'_>, HandlerErr> {
    let resync_delay = state.config.resync_delay();
    let AppState {
        config,
        backend,
        actor,
        store,
        resyncs,
        ..
    } = state;
    let backend = backend.as_ref().ok_or_else(no_workspace)?;
    let actor = actor.as_ref().ok_or_else(no_session)?;
    Ok(Ctx {
        gateway: TaskGateway::new(backend, &config.fallback_error_message),
        actor,
        store,
        resyncs,
        resync_delay,
    })
}

fn no_workspace() -> HandlerErr {
    HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    }
}

fn no_session() -> HandlerErr {
    HandlerErr {
        code: "no_session",
        message: "call session.set first".to_string(),
        details: None,
    }
}

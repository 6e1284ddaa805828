use std::path::PathBuf;
use std::time::Instant;

use serde::Deserialize;

use crate::config::Config;
use crate::db::SqliteBackend;
use crate::gateway::TaskGateway;
use crate::model::Actor;
use crate::resync::{run_due, ResyncQueue};
use crate::store::TaskStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub backend: Option<SqliteBackend>,
    pub actor: Option<Actor>,
    pub store: TaskStore,
    pub resyncs: ResyncQueue,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            backend: None,
            actor: None,
            store: TaskStore::default(),
            resyncs: ResyncQueue::default(),
        }
    }

    /// Drops every cached board and pending refetch.
    pub fn reset_boards(&mut self) {
        self.store.clear();
        self.resyncs.clear();
    }

    pub fn next_resync(&self) -> Option<Instant> {
        self.resyncs.next_deadline()
    }

    pub fn run_due_resyncs(&mut self, now: Instant) -> usize {
        let Some(backend) = self.backend.as_ref() else {
            self.resyncs.clear();
            return 0;
        };
        let gateway = TaskGateway::new(backend, &self.config.fallback_error_message);
        let retry_after = self.config.resync_delay();
        run_due(&gateway, &mut self.store, &mut self.resyncs, now, retry_after)
    }
}

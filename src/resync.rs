use crate::backend::Backend;
use crate::error::TaskError;
use crate::gateway::TaskGateway;
use crate::store::{BoardEvent, BoardSnapshot, TaskStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pending authoritative refetches, at most one per classroom.
#[derive(Debug, Default)]
pub struct ResyncQueue {
    pending: HashMap<String, Instant>,
}

impl ResyncQueue {
    /// Keeps the earliest deadline when a classroom is already scheduled.
    pub fn schedule(&mut self, classroom_id: &str, at: Instant) {
        self.pending
            .entry(classroom_id.to_string())
            .and_modify(|due| *due = (*due).min(at))
            .or_insert(at);
    }

    pub fn is_scheduled(&self, classroom_id: &str) -> bool {
        self.pending.contains_key(classroom_id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Removes and returns every classroom whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<(Instant, String)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, id.clone()))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn cancel(&mut self, classroom_id: &str) {
        self.pending.remove(classroom_id);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Fetches the authoritative task list and overwrites the board with it.
pub fn resync<B: Backend + ?Sized>(
    gateway: &TaskGateway<'_, B>,
    store: &mut TaskStore,
    classroom_id: &str,
) -> Result<Arc<BoardSnapshot>, TaskError> {
    let tasks = gateway.list_tasks(classroom_id)?;
    Ok(store.apply(classroom_id, BoardEvent::Confirmed { tasks }))
}

pub fn ensure_loaded<B: Backend + ?Sized>(
    gateway: &TaskGateway<'_, B>,
    store: &mut TaskStore,
    classroom_id: &str,
) -> Result<Arc<BoardSnapshot>, TaskError> {
    if store.is_loaded(classroom_id) {
        return Ok(store.snapshot(classroom_id));
    }
    resync(gateway, store, classroom_id)
}

/// Lower bound on the retry delay so a dead backend can't spin the loop.
const MIN_RETRY: Duration = Duration::from_millis(250);

/// Runs every reconciliation whose delay has elapsed. A failed fetch leaves the
/// provisional state in place and queues the classroom again after `retry_after`.
pub fn run_due<B: Backend + ?Sized>(
    gateway: &TaskGateway<'_, B>,
    store: &mut TaskStore,
    queue: &mut ResyncQueue,
    now: Instant,
    retry_after: Duration,
) -> usize {
    let mut done = 0;
    for classroom_id in queue.take_due(now) {
        match resync(gateway, store, &classroom_id) {
            Ok(snapshot) => {
                tracing::debug!(classroom = %classroom_id, version = snapshot.version(), "resync applied");
                done += 1;
            }
            Err(e) => {
                tracing::warn!(classroom = %classroom_id, error = %e, "resync failed; keeping provisional state");
                queue.schedule(&classroom_id, now + retry_after.max(MIN_RETRY));
            }
        }
    }
    done
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_coalesces_to_earliest_deadline() {
        let base = Instant::now();
        let mut q = ResyncQueue::default();
        q.schedule("c1", base + Duration::from_millis(500));
        q.schedule("c1", base + Duration::from_millis(100));
        q.schedule("c1", base + Duration::from_millis(900));
        q.schedule("c2", base + Duration::from_millis(300));
        assert_eq!(q.next_deadline(), Some(base + Duration::from_millis(100)));

        assert!(q.take_due(base).is_empty());
        assert_eq!(q.take_due(base + Duration::from_millis(400)), vec!["c1", "c2"]);
        assert!(!q.is_scheduled("c1"));
        assert_eq!(q.next_deadline(), None);
    }

    #[test]
    fn cancel_removes_pending() {
        let mut q = ResyncQueue::default();
        q.schedule("c1", Instant::now());
        q.cancel("c1");
        assert!(q.take_due(Instant::now() + Duration::from_secs(1)).is_empty());
    }
}

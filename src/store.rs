use crate::model::{timestamp, Submission, Task};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Every way the local task collection can change. `Confirmed` is the
/// authoritative overwrite; everything else is provisional until then.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BoardEvent {
    Confirmed {
        tasks: Vec<Task>,
    },
    TaskCreated {
        task: Task,
    },
    TaskUpdated {
        task: Task,
    },
    TaskRemoved {
        task_id: String,
    },
    SubmissionRecorded {
        submission: Submission,
    },
    GradeRecorded {
        task_id: String,
        student_email: String,
        grade: f64,
        feedback: Option<String>,
        graded_by: String,
        graded_at: String,
    },
}

impl BoardEvent {
    pub fn label(&self) -> &'static str {
        match self {
            BoardEvent::Confirmed { .. } => "confirmed",
            BoardEvent::TaskCreated { .. } => "taskCreated",
            BoardEvent::TaskUpdated { .. } => "taskUpdated",
            BoardEvent::TaskRemoved { .. } => "taskRemoved",
            BoardEvent::SubmissionRecorded { .. } => "submissionRecorded",
            BoardEvent::GradeRecorded { .. } => "gradeRecorded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Confirmed,
    Provisional,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub seq: u64,
    pub recorded_at: String,
    pub event: BoardEvent,
}

/// Immutable view of one classroom's tasks: the last confirmed list plus the
/// provisional journal folded on top of it.
#[derive(Debug, Clone, Default)]
pub struct BoardSnapshot {
    version: u64,
    loaded: bool,
    confirmed: Arc<Vec<Task>>,
    journal: Vec<JournalEntry>,
    view: Vec<Task>,
}

fn fold(tasks: &mut Vec<Task>, event: &BoardEvent) {
    match event {
        BoardEvent::Confirmed { tasks: fresh } => *tasks = fresh.clone(),
        BoardEvent::TaskCreated { task } | BoardEvent::TaskUpdated { task } => {
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => tasks.push(task.clone()),
            }
        }
        BoardEvent::TaskRemoved { task_id } => tasks.retain(|t| &t.id != task_id),
        BoardEvent::SubmissionRecorded { submission } => {
            if let Some(task) = tasks.iter_mut().find(|t| t.id == submission.task_id) {
                task.upsert_submission(submission.clone());
            }
        }
        BoardEvent::GradeRecorded {
            task_id,
            student_email,
            grade,
            feedback,
            graded_by,
            graded_at,
        } => {
            let target = tasks
                .iter_mut()
                .find(|t| &t.id == task_id)
                .and_then(|t| t.submissions.iter_mut().find(|s| s.is_from(student_email)));
            if let Some(s) = target {
                s.grade = Some(*grade);
                s.feedback = feedback.clone();
                s.graded_by = Some(graded_by.clone());
                s.graded_at = Some(graded_at.clone());
            }
        }
    }
}

impl BoardSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn phase(&self) -> Phase {
        if self.journal.is_empty() {
            Phase::Confirmed
        } else {
            Phase::Provisional
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.view
    }

    pub fn confirmed_tasks(&self) -> &[Task] {
        &self.confirmed
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.view.iter().find(|t| t.id == task_id)
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// True while a submission by `email` for `task_id` awaits reconciliation.
    pub fn has_pending_submission(&self, task_id: &str, email: &str) -> bool {
        self.journal.iter().any(|e| {
            matches!(&e.event, BoardEvent::SubmissionRecorded { submission }
                if submission.task_id == task_id && submission.is_from(email))
        })
    }

    fn reduce(&self, event: BoardEvent) -> BoardSnapshot {
        let version = self.version + 1;
        if let BoardEvent::Confirmed { tasks } = event {
            let view = tasks.clone();
            return BoardSnapshot {
                version,
                loaded: true,
                confirmed: Arc::new(tasks),
                journal: Vec::new(),
                view,
            };
        }
        let mut view = self.view.clone();
        fold(&mut view, &event);
        let mut journal = self.journal.clone();
        journal.push(JournalEntry {
            seq: version,
            recorded_at: timestamp(Utc::now()),
            event,
        });
        BoardSnapshot {
            version,
            loaded: self.loaded,
            confirmed: Arc::clone(&self.confirmed),
            journal,
            view,
        }
    }
}

/// Single entry point for every change to the local task collections.
#[derive(Debug, Default)]
pub struct TaskStore {
    boards: HashMap<String, Arc<BoardSnapshot>>,
}

impl TaskStore {
    pub fn snapshot(&self, classroom_id: &str) -> Arc<BoardSnapshot> {
        self.boards
            .get(classroom_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, classroom_id: &str) -> bool {
        self.boards
            .get(classroom_id)
            .is_some_and(|b| b.is_loaded())
    }

    pub fn apply(&mut self, classroom_id: &str, event: BoardEvent) -> Arc<BoardSnapshot> {
        let label = event.label();
        let next = Arc::new(self.snapshot(classroom_id).reduce(event));
        tracing::debug!(
            classroom = classroom_id,
            event = label,
            version = next.version(),
            pending = next.journal().len(),
            "task board updated"
        );
        self.boards.insert(classroom_id.to_string(), Arc::clone(&next));
        next
    }

    pub fn clear(&mut self) {
        self.boards.clear();
    }
}

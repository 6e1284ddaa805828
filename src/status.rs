use crate::model::Task;
use crate::ownership::Role;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Graded,
    Overdue,
    NeedsGrading,
}

/// Orthogonal facts behind a status. More than one may hold at once
/// (an instructor task can be overdue and fully graded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFlags {
    pub overdue: bool,
    pub submitted: bool,
    pub graded: bool,
    pub needs_grading: bool,
}

pub fn task_flags(task: &Task, actor_email: &str, role: Role, now: DateTime<Utc>) -> TaskFlags {
    let past_due = task.is_past_due(now);
    match role {
        Role::Member => {
            let own = task.submission_for(actor_email);
            TaskFlags {
                overdue: past_due && own.is_none(),
                submitted: own.is_some(),
                graded: own.is_some_and(|s| s.is_graded()),
                needs_grading: false,
            }
        }
        Role::Owner => {
            let needs_grading =
                task.submissions.is_empty() || task.submissions.iter().any(|s| !s.is_graded());
            TaskFlags {
                overdue: past_due,
                submitted: !task.submissions.is_empty(),
                graded: !needs_grading,
                needs_grading,
            }
        }
    }
}

pub fn derive_status(task: &Task, actor_email: &str, role: Role, now: DateTime<Utc>) -> TaskStatus {
    let flags = task_flags(task, actor_email, role, now);
    match role {
        Role::Member => {
            if flags.overdue {
                TaskStatus::Overdue
            } else if flags.graded {
                TaskStatus::Graded
            } else if flags.submitted {
                TaskStatus::Completed
            } else {
                TaskStatus::Pending
            }
        }
        Role::Owner => {
            if flags.overdue {
                TaskStatus::Overdue
            } else if flags.needs_grading {
                TaskStatus::NeedsGrading
            } else {
                TaskStatus::Graded
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum StatusCounts {
    Student {
        total: usize,
        pending: usize,
        completed: usize,
        graded: usize,
        overdue: usize,
    },
    Instructor {
        total: usize,
        needs_grading: usize,
        graded: usize,
        overdue: usize,
    },
}

impl StatusCounts {
    pub fn empty(role: Role) -> Self {
        match role {
            Role::Member => StatusCounts::Student {
                total: 0,
                pending: 0,
                completed: 0,
                graded: 0,
                overdue: 0,
            },
            Role::Owner => StatusCounts::Instructor {
                total: 0,
                needs_grading: 0,
                graded: 0,
                overdue: 0,
            },
        }
    }

    fn record(&mut self, status: TaskStatus, flags: TaskFlags) {
        match self {
            StatusCounts::Student {
                total,
                pending,
                completed,
                graded,
                overdue,
            } => {
                *total += 1;
                match status {
                    TaskStatus::Pending => *pending += 1,
                    TaskStatus::Completed => *completed += 1,
                    TaskStatus::Graded => *graded += 1,
                    TaskStatus::Overdue => *overdue += 1,
                    TaskStatus::NeedsGrading => {}
                }
            }
            // Flag based, so overdue and graded can both count the same task.
            StatusCounts::Instructor {
                total,
                needs_grading,
                graded,
                overdue,
            } => {
                *total += 1;
                *needs_grading += usize::from(flags.needs_grading);
                *graded += usize::from(flags.graded);
                *overdue += usize::from(flags.overdue);
            }
        }
    }
}

pub fn count_statuses<'a, I>(tasks: I, actor_email: &str, role: Role, now: DateTime<Utc>) -> StatusCounts
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut counts = StatusCounts::empty(role);
    for task in tasks {
        counts.record(
            derive_status(task, actor_email, role, now),
            task_flags(task, actor_email, role, now),
        );
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFilter {
    #[default]
    All,
    Pending,
    Completed,
    Graded,
    Overdue,
    NeedsGrading,
}

impl TaskFilter {
    pub fn matches(self, status: TaskStatus, flags: TaskFlags) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Pending => status == TaskStatus::Pending,
            TaskFilter::Completed => status == TaskStatus::Completed,
            TaskFilter::Graded => flags.graded,
            TaskFilter::Overdue => flags.overdue,
            TaskFilter::NeedsGrading => flags.needs_grading,
        }
    }
}

impl FromStr for TaskFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(TaskFilter::All),
            "pending" => Ok(TaskFilter::Pending),
            "completed" => Ok(TaskFilter::Completed),
            "graded" => Ok(TaskFilter::Graded),
            "overdue" => Ok(TaskFilter::Overdue),
            "needs-grading" | "needsgrading" | "needs_grading" => Ok(TaskFilter::NeedsGrading),
            other => Err(format!("unknown filter: {other}")),
        }
    }
}

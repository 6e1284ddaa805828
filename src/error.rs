use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    AccessDenied,
    Backend,
}

/// Failures of a task command. Everything except `Backend` is decided locally,
/// before any request leaves the process.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),
    #[error("a submission for task {task_id} is still being reconciled")]
    InFlight { task_id: String },
    #[error("{0}")]
    AccessDenied(String),
    #[error("{message}")]
    Backend { status: Option<u16>, message: String },
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }

    pub fn denied(message: impl Into<String>) -> Self {
        TaskError::AccessDenied(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Validation(_) | TaskError::InFlight { .. } => ErrorKind::Validation,
            TaskError::AccessDenied(_) => ErrorKind::AccessDenied,
            TaskError::Backend { .. } => ErrorKind::Backend,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TaskError::Validation(_) => "validation_error",
            TaskError::InFlight { .. } => "submission_in_flight",
            TaskError::AccessDenied(_) => "access_denied",
            TaskError::Backend { .. } => "backend_error",
        }
    }
}

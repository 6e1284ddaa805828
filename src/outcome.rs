use crate::error::{ErrorKind, TaskError};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A question the UI must put to the user before a command proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Resubmit { task_title: String },
    DeleteTask { task_title: String },
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::Resubmit { task_title } => write!(
                f,
                "You already submitted \"{task_title}\". Replace your previous submission?"
            ),
            Prompt::DeleteTask { task_title } => write!(
                f,
                "Delete \"{task_title}\" and all of its submissions? This cannot be undone."
            ),
        }
    }
}

/// Confirmation collaborator (a dialog in the UI, a request flag over IPC).
pub trait Confirm {
    fn confirm(&mut self, prompt: &Prompt) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&Prompt) -> bool,
{
    fn confirm(&mut self, prompt: &Prompt) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    /// The user declined a confirmation. Not a failure.
    Cancelled(Prompt),
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(v) => Outcome::Done(f(v)),
            Outcome::Cancelled(p) => Outcome::Cancelled(p),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// The `{success, data | error}` shape every command returns to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl CommandResult {
    pub fn done<T: Serialize>(data: &T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
            error: None,
            cancelled: None,
            prompt: None,
        }
    }

    pub fn cancelled(prompt: &Prompt) -> Self {
        Self {
            success: false,
            data: None,
            error: None,
            cancelled: Some(true),
            prompt: Some(prompt.to_string()),
        }
    }

    pub fn failed(error: &TaskError) -> Self {
        let status = match error {
            TaskError::Backend { status, .. } => *status,
            _ => None,
        };
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: error.code(),
                kind: error.kind(),
                message: error.to_string(),
                status,
            }),
            cancelled: None,
            prompt: None,
        }
    }

    pub fn from_outcome<T: Serialize>(result: Result<Outcome<T>, TaskError>) -> Self {
        match result {
            Ok(Outcome::Done(data)) => Self::done(&data),
            Ok(Outcome::Cancelled(prompt)) => Self::cancelled(&prompt),
            Err(e) => Self::failed(&e),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, TaskError>) -> Self {
        Self::from_outcome(result.map(Outcome::Done))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

use crate::model::{
    Classroom, GradeRequest, Submission, SubmitAck, SubmitRequest, Task, TaskDraft, TaskPatch,
};
use crate::ownership::Role;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A non-success answer from the authoritative backend, or a transport failure
/// (no status, no body).
#[derive(Debug, Clone, PartialEq)]
pub struct BackendFailure {
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub detail: Option<String>,
}

impl BackendFailure {
    pub fn response(status: u16, body: Value) -> Self {
        Self {
            status: Some(status),
            body: Some(body),
            detail: None,
        }
    }

    pub fn with_message(status: u16, message: impl Into<String>) -> Self {
        Self::response(status, json!({ "message": message.into() }))
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            body: None,
            detail: Some(detail.into()),
        }
    }

    pub fn message(&self) -> Option<String> {
        self.body.as_ref().and_then(extract_message)
    }
}

pub type BackendResult<T> = Result<T, BackendFailure>;

fn non_empty(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pulls a human readable message out of an error body, trying the shapes
/// servers commonly return.
pub fn extract_message(body: &Value) -> Option<String> {
    if let Some(s) = non_empty(body) {
        return Some(s);
    }
    let candidates = [
        body.get("message"),
        body.get("error"),
        body.get("error").and_then(|e| e.get("message")),
        body.get("detail"),
        body.get("errors").and_then(|e| e.get(0)),
        body.get("errors")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("message")),
    ];
    candidates.into_iter().flatten().find_map(non_empty)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionList {
    pub submissions: Vec<Submission>,
    pub role: Role,
}

/// Logical operations of the authoritative classroom service.
pub trait Backend {
    fn fetch_classroom(&self, classroom_id: &str) -> BackendResult<Classroom>;
    fn list_tasks(&self, classroom_id: &str) -> BackendResult<Vec<Task>>;
    fn create_task(
        &self,
        classroom_id: &str,
        draft: &TaskDraft,
        creator_email: &str,
    ) -> BackendResult<Task>;
    fn update_task(&self, classroom_id: &str, task_id: &str, patch: &TaskPatch)
        -> BackendResult<Task>;
    fn delete_task(&self, classroom_id: &str, task_id: &str) -> BackendResult<()>;
    /// Covers both first submissions and resubmissions.
    fn submit(
        &self,
        classroom_id: &str,
        task_id: &str,
        request: &SubmitRequest,
    ) -> BackendResult<SubmitAck>;
    fn list_submissions(
        &self,
        classroom_id: &str,
        task_id: &str,
        actor_email: &str,
    ) -> BackendResult<SubmissionList>;
    fn get_submission(
        &self,
        classroom_id: &str,
        task_id: &str,
        actor_email: &str,
    ) -> BackendResult<Option<Submission>>;
    fn grade(
        &self,
        classroom_id: &str,
        task_id: &str,
        submission_id: &str,
        request: &GradeRequest,
    ) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_list_reads_service_payload() {
        let list: SubmissionList =
            serde_json::from_value(json!({ "submissions": [], "role": "member" })).expect("parse");
        assert_eq!(list.role, Role::Member);
        assert!(list.submissions.is_empty());
    }

    #[test]
    fn message_extraction_shapes() {
        assert_eq!(extract_message(&json!("plain")).as_deref(), Some("plain"));
        assert_eq!(extract_message(&json!({ "message": "m" })).as_deref(), Some("m"));
        assert_eq!(extract_message(&json!({ "error": "e" })).as_deref(), Some("e"));
        assert_eq!(
            extract_message(&json!({ "error": { "message": "nested" } })).as_deref(),
            Some("nested")
        );
        assert_eq!(extract_message(&json!({ "detail": "d" })).as_deref(), Some("d"));
        assert_eq!(extract_message(&json!({ "errors": ["first", "second"] })).as_deref(), Some("first"));
        assert_eq!(
            extract_message(&json!({ "errors": [{ "message": "obj" }] })).as_deref(),
            Some("obj")
        );
    }

    #[test]
    fn blank_or_missing_messages_fall_through() {
        assert_eq!(extract_message(&json!({ "message": "  " })), None);
        assert_eq!(extract_message(&json!({ "status": 500 })), None);
        assert_eq!(BackendFailure::transport("connection reset").message(), None);
    }
}

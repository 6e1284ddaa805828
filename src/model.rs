use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Canonical form of an email used as the identity join key everywhere.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn same_email(a: &str, b: &str) -> bool {
    let a = normalize_email(a);
    !a.is_empty() && a == normalize_email(b)
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Lenient due-date parsing. Anything unrecognised means "no deadline".
pub fn parse_due(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(naive.and_utc());
        }
    }
    // A bare date is due at the end of that day.
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub email: String,
    pub name: String,
}

impl Actor {
    pub fn new(email: &str, name: &str) -> Self {
        let email = normalize_email(email);
        let name = match name.trim() {
            "" => email.clone(),
            n => n.to_string(),
        };
        Self { email, name }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub email: String,
    #[serde(default, alias = "displayName")]
    pub name: String,
}

/// A classroom as the backend returns it. Ownership may be encoded in any of
/// several legacy attributes, which are kept verbatim in `attrs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Classroom {
    pub fn has_student(&self, email: &str) -> bool {
        self.students.iter().any(|s| same_email(&s.email, email))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Assignment,
    Quiz,
    Project,
    Homework,
    Exam,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Assignment => "assignment",
            TaskType::Quiz => "quiz",
            TaskType::Project => "project",
            TaskType::Homework => "homework",
            TaskType::Exam => "exam",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assignment" => Ok(TaskType::Assignment),
            "quiz" => Ok(TaskType::Quiz),
            "project" => Ok(TaskType::Project),
            "homework" => Ok(TaskType::Homework),
            "exam" => Ok(TaskType::Exam),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Opaque reference produced by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub id: Option<String>,
    pub task_id: String,
    pub student_email: String,
    #[serde(default)]
    pub student_name: String,
    pub submitted_at: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<Attachment>,
    #[serde(default)]
    pub is_resubmission: bool,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub graded_by: Option<String>,
    #[serde(default)]
    pub graded_at: Option<String>,
}

impl Submission {
    pub fn is_graded(&self) -> bool {
        self.grade.is_some_and(f64::is_finite)
    }

    pub fn is_from(&self, email: &str) -> bool {
        same_email(&self.student_email, email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub due_date: Option<String>,
    pub points: f64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub accept_late: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

impl Task {
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_date.as_deref().and_then(parse_due)
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at().is_some_and(|due| now > due)
    }

    pub fn submission_for(&self, email: &str) -> Option<&Submission> {
        self.submissions.iter().find(|s| s.is_from(email))
    }

    /// Replace-by-key: at most one submission per student.
    pub fn upsert_submission(&mut self, submission: Submission) {
        match self
            .submissions
            .iter_mut()
            .find(|s| s.is_from(&submission.student_email))
        {
            Some(existing) => *existing = submission,
            None => self.submissions.push(submission),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub accept_late: bool,
}

impl TaskDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("task title must not be empty".to_string());
        }
        validate_points(self.points)
    }
}

fn validate_points(points: f64) -> Result<(), String> {
    if !points.is_finite() || points <= 0.0 {
        return Err(format!("points must be a positive number (got {points})"));
    }
    Ok(())
}

fn double_option<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

/// Partial update. `dueDate: null` clears the deadline; an absent key leaves it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_late: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("patch must change at least one field".to_string());
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err("task title must not be empty".to_string());
            }
        }
        if let Some(points) = self.points {
            validate_points(points)?;
        }
        Ok(())
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(task_type) = self.task_type {
            task.task_type = task_type;
        }
        if let Some(due_date) = &self.due_date {
            task.due_date = due_date.clone();
        }
        if let Some(points) = self.points {
            task.points = points;
        }
        if let Some(accept_late) = self.accept_late {
            task.accept_late = accept_late;
        }
    }
}

/// What a student hands in: free text, an uploaded file, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<Attachment>,
}

impl SubmissionPayload {
    pub fn is_empty(&self) -> bool {
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_file = self.file.as_ref().is_some_and(|f| !f.url.trim().is_empty());
        !has_text && !has_file
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub student_email: String,
    pub student_name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<Attachment>,
    pub is_resubmission: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub grade: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    pub graded_by: String,
}

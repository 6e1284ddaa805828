use crate::error::TaskError;
use crate::gateway::actor_role;
use crate::grading::{class_aggregates, student_aggregate, GradeReceipt, GradingSession, StudentAggregate};
use crate::ipc::helpers::{
    command, ctx, get_optional_str, get_required_f64, get_required_str, Ctx,
};
use crate::ipc::types::{AppState, Request};
use crate::model::same_email;
use crate::outcome::CommandResult;
use crate::ownership::Role;
use crate::resync::ensure_loaded;
use chrono::Utc;
use serde_json::json;

fn update_grade(
    c: &mut Ctx<'_>,
    classroom_id: &str,
    task_id: &str,
    student_email: &str,
    grade: f64,
    feedback: Option<String>,
) -> Result<GradeReceipt, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    let mut session = GradingSession::new(&c.gateway, c.store, c.resyncs, c.resync_delay);
    let submission = session.find_submission(&classroom, task_id, student_email)?;
    session.update_grade(&classroom, c.actor, &submission, grade, feedback, Utc::now())
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let args = get_required_str(&req.params, "classroomId").and_then(|classroom_id| {
        Ok((
            classroom_id,
            get_required_str(&req.params, "taskId")?,
            get_required_str(&req.params, "studentEmail")?,
            get_required_f64(&req.params, "grade")?,
        ))
    });
    let (classroom_id, task_id, student_email, grade) = match args {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let feedback = get_optional_str(&req.params, "feedback");
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let result = update_grade(&mut c, &classroom_id, &task_id, &student_email, grade, feedback);
    command(&req.id, CommandResult::from_result(result))
}

/// Owners see everyone (or one student); members only ever see themselves.
fn student_summary(
    c: &mut Ctx<'_>,
    classroom_id: &str,
    student_email: Option<&str>,
) -> Result<Vec<StudentAggregate>, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    let role = actor_role(&classroom, c.actor)?;
    let board = ensure_loaded(&c.gateway, c.store, classroom_id)?;
    match (role, student_email) {
        (Role::Owner, None) => Ok(class_aggregates(board.tasks(), &classroom)),
        (Role::Owner, Some(email)) => Ok(vec![student_aggregate(board.tasks(), email)]),
        (Role::Member, Some(email)) if !same_email(email, &c.actor.email) => Err(
            TaskError::denied("students can only view their own grades"),
        ),
        (Role::Member, _) => Ok(vec![student_aggregate(board.tasks(), &c.actor.email)]),
    }
}

fn handle_student_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let classroom_id = match get_required_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_email = get_optional_str(&req.params, "studentEmail").filter(|s| !s.trim().is_empty());
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let result = student_summary(&mut c, &classroom_id, student_email.as_deref())
        .map(|students| json!({ "classroomId": classroom_id, "students": students }));
    command(&req.id, CommandResult::from_result(result))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.update" => Some(handle_update(state, req)),
        "grades.studentSummary" => Some(handle_student_summary(state, req)),
        _ => None,
    }
}

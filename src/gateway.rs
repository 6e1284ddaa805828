use crate::backend::{Backend, BackendFailure, SubmissionList};
use crate::error::TaskError;
use crate::model::{
    Actor, Classroom, GradeRequest, Submission, SubmitAck, SubmitRequest, Task, TaskDraft,
    TaskPatch,
};
use crate::outcome::{Confirm, Outcome, Prompt};
use crate::ownership::{resolve_access, Role};

pub const DEFAULT_FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

fn require_id(value: &str, what: &str) -> Result<(), TaskError> {
    if value.trim().is_empty() {
        return Err(TaskError::validation(format!("missing {what}")));
    }
    Ok(())
}

pub fn actor_role(classroom: &Classroom, actor: &Actor) -> Result<Role, TaskError> {
    resolve_access(classroom, &actor.email).role().ok_or_else(|| {
        TaskError::denied(format!(
            "{} has no access to classroom {}",
            actor.email, classroom.name
        ))
    })
}

pub fn require_owner(classroom: &Classroom, actor: &Actor, action: &str) -> Result<(), TaskError> {
    match actor_role(classroom, actor)? {
        Role::Owner => Ok(()),
        Role::Member => Err(TaskError::denied(format!(
            "only the classroom owner can {action}"
        ))),
    }
}

pub fn require_member(classroom: &Classroom, actor: &Actor, action: &str) -> Result<(), TaskError> {
    match actor_role(classroom, actor)? {
        Role::Member => Ok(()),
        Role::Owner => Err(TaskError::denied(format!("instructors cannot {action}"))),
    }
}

/// Typed commands against the classroom service. Identifier and privilege
/// checks run locally; nothing malformed or known-forbidden goes out.
pub struct TaskGateway<'a, B: Backend + ?Sized> {
    backend: &'a B,
    fallback_message: &'a str,
}

impl<'a, B: Backend + ?Sized> TaskGateway<'a, B> {
    pub fn new(backend: &'a B, fallback_message: &'a str) -> Self {
        Self {
            backend,
            fallback_message,
        }
    }

    fn backend_error(&self, op: &str, failure: BackendFailure) -> TaskError {
        let message = failure
            .message()
            .unwrap_or_else(|| self.fallback_message.to_string());
        tracing::warn!(
            op,
            status = ?failure.status,
            detail = failure.detail.as_deref().unwrap_or(""),
            %message,
            "backend call failed"
        );
        TaskError::Backend {
            status: failure.status,
            message,
        }
    }

    pub fn fetch_classroom(&self, classroom_id: &str) -> Result<Classroom, TaskError> {
        require_id(classroom_id, "classroom id")?;
        self.backend
            .fetch_classroom(classroom_id)
            .map_err(|e| self.backend_error("fetch_classroom", e))
    }

    pub fn list_tasks(&self, classroom_id: &str) -> Result<Vec<Task>, TaskError> {
        require_id(classroom_id, "classroom id")?;
        self.backend
            .list_tasks(classroom_id)
            .map_err(|e| self.backend_error("list_tasks", e))
    }

    pub fn create_task(&self, classroom: &Classroom, actor: &Actor, draft: &TaskDraft) -> Result<Task, TaskError> {
        require_id(&classroom.id, "classroom id")?;
        require_owner(classroom, actor, "create tasks")?;
        draft.validate().map_err(TaskError::Validation)?;
        let task = self
            .backend
            .create_task(&classroom.id, draft, &actor.email)
            .map_err(|e| self.backend_error("create_task", e))?;
        tracing::info!(classroom = %classroom.id, task = %task.id, "task created");
        Ok(task)
    }

    pub fn update_task(
        &self,
        classroom: &Classroom,
        actor: &Actor,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, TaskError> {
        require_id(&classroom.id, "classroom id")?;
        require_id(task_id, "task id")?;
        require_owner(classroom, actor, "edit tasks")?;
        patch.validate().map_err(TaskError::Validation)?;
        self.backend
            .update_task(&classroom.id, task_id, patch)
            .map_err(|e| self.backend_error("update_task", e))
    }

    /// Asks for confirmation first; a decline never reaches the backend.
    pub fn delete_task(
        &self,
        classroom: &Classroom,
        actor: &Actor,
        task_id: &str,
        task_title: &str,
        confirm: &mut dyn Confirm,
    ) -> Result<Outcome<()>, TaskError> {
        require_id(&classroom.id, "classroom id")?;
        require_id(task_id, "task id")?;
        require_owner(classroom, actor, "delete tasks")?;
        let prompt = Prompt::DeleteTask {
            task_title: task_title.to_string(),
        };
        if !confirm.confirm(&prompt) {
            tracing::debug!(task = task_id, "task deletion cancelled");
            return Ok(Outcome::Cancelled(prompt));
        }
        self.backend
            .delete_task(&classroom.id, task_id)
            .map_err(|e| self.backend_error("delete_task", e))?;
        tracing::info!(classroom = %classroom.id, task = task_id, "task deleted");
        Ok(Outcome::Done(()))
    }

    pub fn submit_task(
        &self,
        classroom: &Classroom,
        actor: &Actor,
        task_id: &str,
        request: &SubmitRequest,
    ) -> Result<SubmitAck, TaskError> {
        require_id(&classroom.id, "classroom id")?;
        require_id(task_id, "task id")?;
        require_id(&request.student_email, "student email")?;
        require_member(classroom, actor, "submit work")?;
        self.backend
            .submit(&classroom.id, task_id, request)
            .map_err(|e| self.backend_error("submit_task", e))
    }

    pub fn resubmit_task(
        &self,
        classroom: &Classroom,
        actor: &Actor,
        task_id: &str,
        request: &SubmitRequest,
    ) -> Result<SubmitAck, TaskError> {
        let request = SubmitRequest {
            is_resubmission: true,
            ..request.clone()
        };
        self.submit_task(classroom, actor, task_id, &request)
    }

    pub fn grade_submission(
        &self,
        classroom: &Classroom,
        actor: &Actor,
        task_id: &str,
        submission_id: &str,
        request: &GradeRequest,
    ) -> Result<(), TaskError> {
        require_id(&classroom.id, "classroom id")?;
        require_id(task_id, "task id")?;
        require_id(submission_id, "submission id")?;
        require_owner(classroom, actor, "grade submissions")?;
        self.backend
            .grade(&classroom.id, task_id, submission_id, request)
            .map_err(|e| self.backend_error("grade_submission", e))
    }

    pub fn list_submissions(&self, classroom: &Classroom, actor: &Actor, task_id: &str) -> Result<SubmissionList, TaskError> {
        require_id(&classroom.id, "classroom id")?;
        require_id(task_id, "task id")?;
        actor_role(classroom, actor)?;
        self.backend
            .list_submissions(&classroom.id, task_id, &actor.email)
            .map_err(|e| self.backend_error("list_submissions", e))
    }

    pub fn get_my_submission(&self, classroom: &Classroom, actor: &Actor, task_id: &str) -> Result<Option<Submission>, TaskError> {
        require_id(&classroom.id, "classroom id")?;
        require_id(task_id, "task id")?;
        actor_role(classroom, actor)?;
        self.backend
            .get_submission(&classroom.id, task_id, &actor.email)
            .map_err(|e| self.backend_error("get_my_submission", e))
    }
}

use crate::backend::Backend;
use crate::error::TaskError;
use crate::gateway::{require_member, TaskGateway};
use crate::model::{timestamp, Actor, Classroom, Submission, SubmissionPayload, SubmitRequest};
use crate::outcome::{Confirm, Outcome, Prompt};
use crate::resync::{ensure_loaded, ResyncQueue};
use crate::store::{BoardEvent, Phase, TaskStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub submission: Submission,
    pub is_resubmission: bool,
    pub phase: Phase,
    pub version: u64,
    pub resync_in_ms: u64,
}

/// Drives submit and resubmit end to end: gate, validate, send, apply
/// optimistically, then schedule the authoritative refetch.
pub struct SubmissionLifecycle<'g, 's, B: Backend + ?Sized> {
    gateway: &'s TaskGateway<'g, B>,
    store: &'s mut TaskStore,
    resyncs: &'s mut ResyncQueue,
    resync_delay: Duration,
}

impl<'g, 's, B: Backend + ?Sized> SubmissionLifecycle<'g, 's, B> {
    pub fn new(
        gateway: &'s TaskGateway<'g, B>,
        store: &'s mut TaskStore,
        resyncs: &'s mut ResyncQueue,
        resync_delay: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            resyncs,
            resync_delay,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &mut self,
        classroom: &Classroom,
        actor: &Actor,
        task_id: &str,
        payload: SubmissionPayload,
        resubmission_hint: bool,
        confirm: &mut dyn Confirm,
        now: DateTime<Utc>,
    ) -> Result<Outcome<SubmitReceipt>, TaskError> {
        let span = tracing::info_span!("submit", classroom = %classroom.id, task = task_id, actor = %actor.email);
        let _enter = span.enter();

        require_member(classroom, actor, "submit work")?;
        let board = ensure_loaded(self.gateway, self.store, &classroom.id)?;
        let Some(task) = board.task(task_id) else {
            return Err(TaskError::validation(format!("task {task_id} not found")));
        };

        if board.has_pending_submission(task_id, &actor.email) {
            return Err(TaskError::InFlight {
                task_id: task_id.to_string(),
            });
        }

        let already_submitted = task.submission_for(&actor.email).is_some();
        if already_submitted && !resubmission_hint {
            let prompt = Prompt::Resubmit {
                task_title: task.title.clone(),
            };
            if !confirm.confirm(&prompt) {
                tracing::debug!("resubmission declined");
                return Ok(Outcome::Cancelled(prompt));
            }
        }

        if payload.is_empty() {
            return Err(TaskError::validation(
                "add some text or attach a file before submitting",
            ));
        }
        if task.is_past_due(now) && !task.accept_late {
            return Err(TaskError::validation(format!(
                "the deadline for \"{}\" has passed",
                task.title
            )));
        }

        let is_resubmission = already_submitted || resubmission_hint;
        let text = payload
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let request = SubmitRequest {
            student_email: actor.email.clone(),
            student_name: actor.name.clone(),
            text,
            file: payload.file,
            is_resubmission,
        };
        let ack = if is_resubmission {
            self.gateway
                .resubmit_task(classroom, actor, task_id, &request)?
        } else {
            self.gateway.submit_task(classroom, actor, task_id, &request)?
        };

        let submission = Submission {
            id: ack.id,
            task_id: task_id.to_string(),
            student_email: request.student_email,
            student_name: request.student_name,
            submitted_at: ack.submitted_at.unwrap_or_else(|| timestamp(now)),
            text: request.text,
            file: request.file,
            is_resubmission,
            grade: None,
            feedback: None,
            graded_by: None,
            graded_at: None,
        };
        let snapshot = self.store.apply(
            &classroom.id,
            BoardEvent::SubmissionRecorded {
                submission: submission.clone(),
            },
        );
        self.resyncs
            .schedule(&classroom.id, Instant::now() + self.resync_delay);
        tracing::info!(is_resubmission, "submission accepted; resync scheduled");

        Ok(Outcome::Done(SubmitReceipt {
            submission,
            is_resubmission,
            phase: snapshot.phase(),
            version: snapshot.version(),
            resync_in_ms: self.resync_delay.as_millis() as u64,
        }))
    }
}

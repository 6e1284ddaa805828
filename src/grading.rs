use crate::backend::Backend;
use crate::error::TaskError;
use crate::gateway::{require_owner, TaskGateway};
use crate::model::{normalize_email, same_email, timestamp, Actor, Classroom, GradeRequest, Submission, Task};
use crate::resync::{ensure_loaded, ResyncQueue};
use crate::store::{BoardEvent, TaskStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

pub fn validate_grade(grade: f64, max_points: f64) -> Result<(), TaskError> {
    if !grade.is_finite() || grade < 0.0 || grade > max_points {
        return Err(TaskError::validation(format!(
            "grade must be between 0 and {max_points} (got {grade})"
        )));
    }
    Ok(())
}

/// Derived per-student totals. Always recomputed from the task list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAggregate {
    pub student_email: String,
    pub graded_count: usize,
    pub total_points: f64,
    pub max_points: f64,
    /// Whole-number percentage; `None` until something is graded.
    pub average: Option<i64>,
}

pub fn student_aggregate(tasks: &[Task], student_email: &str) -> StudentAggregate {
    let mut graded_count = 0;
    let mut total_points = 0.0;
    let mut max_points = 0.0;
    for task in tasks {
        let Some(grade) = task
            .submission_for(student_email)
            .filter(|s| s.is_graded())
            .and_then(|s| s.grade)
        else {
            continue;
        };
        graded_count += 1;
        total_points += grade;
        max_points += task.points;
    }
    let average = (max_points > 0.0).then(|| (total_points / max_points * 100.0).round() as i64);
    StudentAggregate {
        student_email: normalize_email(student_email),
        graded_count,
        total_points,
        max_points,
        average,
    }
}

pub fn class_aggregates(tasks: &[Task], classroom: &Classroom) -> Vec<StudentAggregate> {
    classroom
        .students
        .iter()
        .map(|s| student_aggregate(tasks, &s.email))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReceipt {
    pub submission: Submission,
    pub student: StudentAggregate,
    pub version: u64,
}

/// Instructor-side grade edits with optimistic recompute.
pub struct GradingSession<'g, 's, B: Backend + ?Sized> {
    gateway: &'s TaskGateway<'g, B>,
    store: &'s mut TaskStore,
    resyncs: &'s mut ResyncQueue,
    resync_delay: Duration,
}

impl<'g, 's, B: Backend + ?Sized> GradingSession<'g, 's, B> {
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

    /// Looks up the current local copy of a student's submission.
    pub fn find_submission(
        &mut self,
        classroom: &Classroom,
        task_id: &str,
        student_email: &str,
    ) -> Result<Submission, TaskError> {
        let board = ensure_loaded(self.gateway, self.store, &classroom.id)?;
        board
            .task(task_id)
            .ok_or_else(|| TaskError::validation(format!("task {task_id} not found")))?
            .submission_for(student_email)
            .cloned()
            .ok_or_else(|| {
                TaskError::validation(format!("{student_email} has not submitted this task"))
            })
    }

    pub fn update_grade(
        &mut self,
        classroom: &Classroom,
        actor: &Actor,
        submission: &Submission,
        new_grade: f64,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<GradeReceipt, TaskError> {
        let span = tracing::info_span!("update_grade", classroom = %classroom.id, task = %submission.task_id);
        let _enter = span.enter();

        require_owner(classroom, actor, "grade submissions")?;
        let board = ensure_loaded(self.gateway, self.store, &classroom.id)?;
        let task = board
            .task(&submission.task_id)
            .ok_or_else(|| TaskError::validation(format!("task {} not found", submission.task_id)))?;
        validate_grade(new_grade, task.points)?;
        let Some(submission_id) = submission.id.as_deref() else {
            return Err(TaskError::validation(
                "submission has not been confirmed by the server yet",
            ));
        };

        let feedback = feedback.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
        self.gateway.grade_submission(
            classroom,
            actor,
            &submission.task_id,
            submission_id,
            &GradeRequest {
                grade: new_grade,
                feedback: feedback.clone(),
                graded_by: actor.email.clone(),
            },
        )?;

        let graded_at = timestamp(now);
        let snapshot = self.store.apply(
            &classroom.id,
            BoardEvent::GradeRecorded {
                task_id: submission.task_id.clone(),
                student_email: submission.student_email.clone(),
                grade: new_grade,
                feedback: feedback.clone(),
                graded_by: actor.email.clone(),
                graded_at: graded_at.clone(),
            },
        );
        self.resyncs
            .schedule(&classroom.id, Instant::now() + self.resync_delay);

        let updated = snapshot
            .task(&submission.task_id)
            .and_then(|t| {
                t.submissions
                    .iter()
                    .find(|s| same_email(&s.student_email, &submission.student_email))
            })
            .cloned()
            .unwrap_or_else(|| Submission {
                grade: Some(new_grade),
                feedback,
                graded_by: Some(actor.email.clone()),
                graded_at: Some(graded_at),
                ..submission.clone()
            });
        let student = student_aggregate(snapshot.tasks(), &submission.student_email);
        tracing::info!(grade = new_grade, average = ?student.average, "grade recorded");
        Ok(GradeReceipt {
            submission: updated,
            student,
            version: snapshot.version(),
        })
    }
}

use crate::backend::{Backend, BackendFailure, BackendResult, SubmissionList};
use crate::model::{
    normalize_email, timestamp, Attachment, Classroom, GradeRequest, Student, Submission,
    SubmitAck, SubmitRequest, Task, TaskDraft, TaskPatch, TaskType,
};
use crate::ownership::{resolve_access, Access, Role};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "classroom.sqlite3";

/// Local stand-in for the classroom service, backed by a workspace SQLite file.
/// Update and delete carry no caller identity (that rides on the transport's
/// auth token), so only create, submit, list and grade are authorized here.
pub struct SqliteBackend {
    conn: Connection,
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT,
            attrs TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classroom_students(
            classroom_id TEXT NOT NULL,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(classroom_id, email),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tasks(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            task_type TEXT NOT NULL,
            due_date TEXT,
            points REAL NOT NULL,
            created_by TEXT NOT NULL,
            accept_late INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tasks_classroom ON tasks(classroom_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            student_email TEXT NOT NULL,
            student_name TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            body TEXT,
            file_json TEXT,
            is_resubmission INTEGER NOT NULL DEFAULT 0,
            grade REAL,
            feedback TEXT,
            graded_by TEXT,
            graded_at TEXT,
            FOREIGN KEY(task_id) REFERENCES tasks(id),
            UNIQUE(task_id, student_email)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_task ON submissions(task_id)",
        [],
    )?;

    Ok(())
}

fn db_failure(e: rusqlite::Error) -> BackendFailure {
    tracing::error!(error = %e, "sqlite backend query failed");
    BackendFailure::transport(format!("database error: {e}"))
}

fn not_found(what: &str) -> BackendFailure {
    BackendFailure::with_message(404, format!("{what} not found"))
}

fn forbidden(message: &str) -> BackendFailure {
    BackendFailure::response(403, serde_json::json!({ "error": { "message": message } }))
}

fn submission_from_row(r: &Row<'_>) -> rusqlite::Result<Submission> {
    let file_json: Option<String> = r.get(6)?;
    let file: Option<Attachment> = file_json.and_then(|s| serde_json::from_str(&s).ok());
    Ok(Submission {
        id: Some(r.get(0)?),
        task_id: r.get(1)?,
        student_email: r.get(2)?,
        student_name: r.get(3)?,
        submitted_at: r.get(4)?,
        text: r.get(5)?,
        file,
        is_resubmission: r.get::<_, i64>(7)? != 0,
        grade: r.get(8)?,
        feedback: r.get(9)?,
        graded_by: r.get(10)?,
        graded_at: r.get(11)?,
    })
}

const SUBMISSION_COLUMNS: &str = "id, task_id, student_email, student_name, submitted_at, body,
     file_json, is_resubmission, grade, feedback, graded_by, graded_at";

fn task_from_row(r: &Row<'_>) -> rusqlite::Result<Task> {
    let task_type: String = r.get(3)?;
    Ok(Task {
        id: r.get(0)?,
        title: r.get(1)?,
        description: r.get(2)?,
        task_type: task_type.parse().unwrap_or(TaskType::Assignment),
        due_date: r.get(4)?,
        points: r.get(5)?,
        created_by: r.get(6)?,
        accept_late: r.get::<_, i64>(7)? != 0,
        created_at: r.get(8)?,
        submissions: Vec::new(),
    })
}

impl SqliteBackend {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_db(workspace)?,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn create_classroom(
        &self,
        name: &str,
        subject: Option<&str>,
        attrs: &Map<String, Value>,
    ) -> anyhow::Result<Classroom> {
        let id = Uuid::new_v4().to_string();
        let attrs_json = serde_json::to_string(attrs)?;
        self.conn
            .execute(
                "INSERT INTO classrooms(id, name, subject, attrs, created_at) VALUES(?, ?, ?, ?, ?)",
                (&id, name, subject, &attrs_json, timestamp(Utc::now())),
            )
            .context("insert classroom")?;
        Ok(Classroom {
            id,
            name: name.to_string(),
            subject: subject.map(str::to_string),
            students: Vec::new(),
            attrs: attrs.clone(),
        })
    }

    pub fn add_student(&self, classroom_id: &str, email: &str, name: &str) -> anyhow::Result<Student> {
        let email = normalize_email(email);
        let next_sort: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM classroom_students WHERE classroom_id = ?",
            [classroom_id],
            |r| r.get(0),
        )?;
        self.conn
            .execute(
                "INSERT INTO classroom_students(classroom_id, email, name, sort_order)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(classroom_id, email) DO UPDATE SET name = excluded.name",
                (classroom_id, &email, name, next_sort),
            )
            .context("insert classroom student")?;
        Ok(Student {
            email,
            name: name.to_string(),
        })
    }

    pub fn list_classrooms(&self) -> anyhow::Result<Vec<Classroom>> {
        let ids: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT id FROM classrooms ORDER BY name")?;
            let rows = stmt.query_map([], |r| r.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(c) = self.load_classroom(&id)? {
                out.push(c);
            }
        }
        Ok(out)
    }

    fn load_classroom(&self, classroom_id: &str) -> rusqlite::Result<Option<Classroom>> {
        let row: Option<(String, String, Option<String>, String)> = self
            .conn
            .query_row(
                "SELECT id, name, subject, attrs FROM classrooms WHERE id = ?",
                [classroom_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((id, name, subject, attrs_json)) = row else {
            return Ok(None);
        };
        let attrs: Map<String, Value> = serde_json::from_str(&attrs_json).unwrap_or_default();

        let mut stmt = self.conn.prepare(
            "SELECT email, name FROM classroom_students WHERE classroom_id = ? ORDER BY sort_order",
        )?;
        let students = stmt
            .query_map([classroom_id], |r| {
                Ok(Student {
                    email: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Classroom {
            id,
            name,
            subject,
            students,
            attrs,
        }))
    }

    fn classroom_for(&self, classroom_id: &str) -> BackendResult<Classroom> {
        self.load_classroom(classroom_id)
            .map_err(db_failure)?
            .ok_or_else(|| not_found("classroom"))
    }

    fn authorize(&self, classroom_id: &str, actor_email: &str) -> BackendResult<(Classroom, Role)> {
        let classroom = self.classroom_for(classroom_id)?;
        match resolve_access(&classroom, actor_email) {
            Access::Granted(role) => Ok((classroom, role)),
            Access::Denied => Err(forbidden("not a member of this classroom")),
        }
    }

    fn require_owner(&self, classroom_id: &str, actor_email: &str) -> BackendResult<Classroom> {
        match self.authorize(classroom_id, actor_email)? {
            (classroom, Role::Owner) => Ok(classroom),
            (_, Role::Member) => Err(forbidden("only the classroom owner can do that")),
        }
    }

    fn load_task(&self, classroom_id: &str, task_id: &str) -> BackendResult<Task> {
        let task = self
            .conn
            .query_row(
                "SELECT id, title, description, task_type, due_date, points, created_by,
                        accept_late, created_at
                 FROM tasks WHERE classroom_id = ? AND id = ?",
                (classroom_id, task_id),
                task_from_row,
            )
            .optional()
            .map_err(db_failure)?;
        let mut task = task.ok_or_else(|| not_found("task"))?;
        task.submissions = self.load_submissions(&task.id).map_err(db_failure)?;
        Ok(task)
    }

    fn load_submissions(&self, task_id: &str) -> rusqlite::Result<Vec<Submission>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE task_id = ? ORDER BY submitted_at, id"
        ))?;
        let rows = stmt.query_map([task_id], submission_from_row)?;
        rows.collect()
    }
}

impl Backend for SqliteBackend {
    fn fetch_classroom(&self, classroom_id: &str) -> BackendResult<Classroom> {
        self.classroom_for(classroom_id)
    }

    fn list_tasks(&self, classroom_id: &str) -> BackendResult<Vec<Task>> {
        self.classroom_for(classroom_id)?;
        let mut tasks = {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT id, title, description, task_type, due_date, points, created_by,
                            accept_late, created_at
                     FROM tasks WHERE classroom_id = ?
                     ORDER BY created_at, id",
                )
                .map_err(db_failure)?;
            let rows = stmt
                .query_map([classroom_id], task_from_row)
                .map_err(db_failure)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_failure)?
        };
        for task in &mut tasks {
            task.submissions = self.load_submissions(&task.id).map_err(db_failure)?;
        }
        Ok(tasks)
    }

    fn create_task(&self, classroom_id: &str, draft: &TaskDraft, creator_email: &str) -> BackendResult<Task> {
        self.require_owner(classroom_id, creator_email)?;
        if let Err(message) = draft.validate() {
            return Err(BackendFailure::with_message(422, message));
        }
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO tasks(id, classroom_id, title, description, task_type, due_date,
                                   points, created_by, accept_late, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    id,
                    classroom_id,
                    draft.title.trim(),
                    draft.description,
                    draft.task_type.as_str(),
                    draft.due_date,
                    draft.points,
                    normalize_email(creator_email),
                    draft.accept_late as i64,
                    timestamp(Utc::now()),
                ],
            )
            .map_err(db_failure)?;
        self.load_task(classroom_id, &id)
    }

    fn update_task(&self, classroom_id: &str, task_id: &str, patch: &TaskPatch) -> BackendResult<Task> {
        let mut task = self.load_task(classroom_id, task_id)?;
        if let Err(message) = patch.validate() {
            return Err(BackendFailure::with_message(422, message));
        }
        patch.apply(&mut task);
        self.conn
            .execute(
                "UPDATE tasks SET title = ?, description = ?, task_type = ?, due_date = ?,
                                  points = ?, accept_late = ?
                 WHERE id = ?",
                rusqlite::params![
                    task.title,
                    task.description,
                    task.task_type.as_str(),
                    task.due_date,
                    task.points,
                    task.accept_late as i64,
                    task.id,
                ],
            )
            .map_err(db_failure)?;
        Ok(task)
    }

    fn delete_task(&self, classroom_id: &str, task_id: &str) -> BackendResult<()> {
        let tx = self.conn.unchecked_transaction().map_err(db_failure)?;
        tx.execute("DELETE FROM submissions WHERE task_id = ?", [task_id])
            .map_err(db_failure)?;
        let n = tx
            .execute(
                "DELETE FROM tasks WHERE id = ? AND classroom_id = ?",
                (task_id, classroom_id),
            )
            .map_err(db_failure)?;
        if n == 0 {
            let _ = tx.rollback();
            return Err(not_found("task"));
        }
        tx.commit().map_err(db_failure)?;
        Ok(())
    }

    fn submit(&self, classroom_id: &str, task_id: &str, request: &SubmitRequest) -> BackendResult<SubmitAck> {
        match self.authorize(classroom_id, &request.student_email)? {
            (_, Role::Member) => {}
            (_, Role::Owner) => return Err(forbidden("instructors cannot submit work")),
        }
        let task = self.load_task(classroom_id, task_id)?;
        let has_text = request.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_file = request.file.as_ref().is_some_and(|f| !f.url.trim().is_empty());
        if !has_text && !has_file {
            return Err(BackendFailure::with_message(422, "submission is empty"));
        }
        if task.is_past_due(Utc::now()) && !task.accept_late {
            return Err(BackendFailure::with_message(409, "the deadline for this task has passed"));
        }

        let email = normalize_email(&request.student_email);
        let already = task.submission_for(&email).is_some();
        let file_json = match &request.file {
            Some(f) => Some(serde_json::to_string(f).map_err(|e| {
                BackendFailure::with_message(400, format!("bad attachment: {e}"))
            })?),
            None => None,
        };
        let submitted_at = timestamp(Utc::now());
        // A resubmission replaces the row in place and clears any earlier grade.
        self.conn
            .execute(
                "INSERT INTO submissions(id, task_id, student_email, student_name, submitted_at,
                                         body, file_json, is_resubmission)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(task_id, student_email) DO UPDATE SET
                   student_name = excluded.student_name,
                   submitted_at = excluded.submitted_at,
                   body = excluded.body,
                   file_json = excluded.file_json,
                   is_resubmission = excluded.is_resubmission,
                   grade = NULL,
                   feedback = NULL,
                   graded_by = NULL,
                   graded_at = NULL",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    task_id,
                    email,
                    request.student_name,
                    submitted_at,
                    request.text,
                    file_json,
                    (request.is_resubmission || already) as i64,
                ],
            )
            .map_err(db_failure)?;

        let id: String = self
            .conn
            .query_row(
                "SELECT id FROM submissions WHERE task_id = ? AND student_email = ?",
                (task_id, &email),
                |r| r.get(0),
            )
            .map_err(db_failure)?;
        Ok(SubmitAck {
            id: Some(id),
            submitted_at: Some(submitted_at),
        })
    }

    fn list_submissions(&self, classroom_id: &str, task_id: &str, actor_email: &str) -> BackendResult<SubmissionList> {
        let (_, role) = self.authorize(classroom_id, actor_email)?;
        let task = self.load_task(classroom_id, task_id)?;
        let submissions = match role {
            Role::Owner => task.submissions,
            Role::Member => task
                .submissions
                .into_iter()
                .filter(|s| s.is_from(actor_email))
                .collect(),
        };
        Ok(SubmissionList { submissions, role })
    }

    fn get_submission(&self, classroom_id: &str, task_id: &str, actor_email: &str) -> BackendResult<Option<Submission>> {
        self.authorize(classroom_id, actor_email)?;
        let task = self.load_task(classroom_id, task_id)?;
        Ok(task.submission_for(actor_email).cloned())
    }

    fn grade(&self, classroom_id: &str, task_id: &str, submission_id: &str, request: &GradeRequest) -> BackendResult<()> {
        self.require_owner(classroom_id, &request.graded_by)?;
        let task = self.load_task(classroom_id, task_id)?;
        if !request.grade.is_finite() || request.grade < 0.0 || request.grade > task.points {
            return Err(BackendFailure::with_message(
                422,
                format!("grade must be between 0 and {}", task.points),
            ));
        }
        let n = self
            .conn
            .execute(
                "UPDATE submissions SET grade = ?, feedback = ?, graded_by = ?, graded_at = ?
                 WHERE id = ? AND task_id = ?",
                rusqlite::params![
                    request.grade,
                    request.feedback,
                    normalize_email(&request.graded_by),
                    timestamp(Utc::now()),
                    submission_id,
                    task_id,
                ],
            )
            .map_err(db_failure)?;
        if n == 0 {
            return Err(not_found("submission"));
        }
        Ok(())
    }
}

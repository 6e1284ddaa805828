use crate::error::TaskError;
use crate::gateway::actor_role;
use crate::ipc::helpers::{
    command, ctx, get_flag, get_optional_str, get_required_str, parse_params, Ctx, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Task, TaskDraft, TaskPatch};
use crate::outcome::{CommandResult, Outcome, Prompt};
use crate::ownership::Role;
use crate::resync::{ensure_loaded, resync};
use crate::status::{
    count_statuses, derive_status, task_flags, StatusCounts, TaskFilter, TaskFlags, TaskStatus,
};
use crate::store::{BoardEvent, JournalEntry, Phase};
use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskRow {
    #[serde(flatten)]
    task: Task,
    status: TaskStatus,
    flags: TaskFlags,
    /// False while the row differs from the last server copy.
    synced: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskBoard {
    classroom_id: String,
    role: Role,
    phase: Phase,
    version: u64,
    resync_scheduled: bool,
    tasks: Vec<TaskRow>,
    counts: StatusCounts,
    journal: Vec<JournalEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskChange {
    task: Task,
    phase: Phase,
    version: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskRemoval {
    task_id: String,
    phase: Phase,
    version: u64,
}

fn list_board(c: &mut Ctx<'_>, classroom_id: &str, filter: TaskFilter) -> Result<TaskBoard, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    let role = actor_role(&classroom, c.actor)?;
    let board = ensure_loaded(&c.gateway, c.store, classroom_id)?;
    let now = Utc::now();
    let email = &c.actor.email;

    let tasks = board
        .tasks()
        .iter()
        .filter_map(|task| {
            let status = derive_status(task, email, role, now);
            let flags = task_flags(task, email, role, now);
            if !filter.matches(status, flags) {
                return None;
            }
            let synced = board.confirmed_tasks().contains(task);
            let mut task = task.clone();
            // Students only ever see their own work.
            if role == Role::Member {
                task.submissions.retain(|s| s.is_from(email));
            }
            Some(TaskRow {
                task,
                status,
                flags,
                synced,
            })
        })
        .collect();

    Ok(TaskBoard {
        classroom_id: classroom_id.to_string(),
        role,
        phase: board.phase(),
        version: board.version(),
        resync_scheduled: c.resyncs.is_scheduled(classroom_id),
        tasks,
        counts: count_statuses(board.tasks(), email, role, now),
        journal: board.journal().to_vec(),
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let classroom_id = match get_required_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let filter = match get_optional_str(&req.params, "filter")
        .map(|f| TaskFilter::from_str(&f))
        .transpose()
    {
        Ok(f) => f.unwrap_or_default(),
        Err(message) => return HandlerErr::bad_params(message).response(&req.id),
    };
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    command(&req.id, CommandResult::from_result(list_board(&mut c, &classroom_id, filter)))
}

fn create_task(c: &mut Ctx<'_>, classroom_id: &str, draft: &TaskDraft) -> Result<TaskChange, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    ensure_loaded(&c.gateway, c.store, classroom_id)?;
    let task = c.gateway.create_task(&classroom, c.actor, draft)?;
    let board = c.record(classroom_id, BoardEvent::TaskCreated { task: task.clone() });
    Ok(TaskChange {
        task,
        phase: board.phase(),
        version: board.version(),
    })
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let classroom_id = match get_required_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let draft: TaskDraft = match parse_params(&req.params, Some("task")) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    command(&req.id, CommandResult::from_result(create_task(&mut c, &classroom_id, &draft)))
}

fn update_task(
    c: &mut Ctx<'_>,
    classroom_id: &str,
    task_id: &str,
    patch: &TaskPatch,
) -> Result<TaskChange, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    ensure_loaded(&c.gateway, c.store, classroom_id)?;
    let task = c.gateway.update_task(&classroom, c.actor, task_id, patch)?;
    let board = c.record(classroom_id, BoardEvent::TaskUpdated { task: task.clone() });
    Ok(TaskChange {
        task,
        phase: board.phase(),
        version: board.version(),
    })
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (classroom_id, task_id) = match (
        get_required_str(&req.params, "classroomId"),
        get_required_str(&req.params, "taskId"),
    ) {
        (Ok(c), Ok(t)) => (c, t),
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };
    let patch: TaskPatch = match parse_params(&req.params, Some("patch")) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    command(
        &req.id,
        CommandResult::from_result(update_task(&mut c, &classroom_id, &task_id, &patch)),
    )
}

fn delete_task(
    c: &mut Ctx<'_>,
    classroom_id: &str,
    task_id: &str,
    confirmed: bool,
) -> Result<Outcome<TaskRemoval>, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    let board = ensure_loaded(&c.gateway, c.store, classroom_id)?;
    let Some(task) = board.task(task_id) else {
        return Err(TaskError::validation(format!("task {task_id} not found")));
    };
    let outcome = c.gateway.delete_task(
        &classroom,
        c.actor,
        task_id,
        &task.title,
        &mut |_: &Prompt| confirmed,
    )?;
    Ok(outcome.map(|()| {
        let board = c.record(
            classroom_id,
            BoardEvent::TaskRemoved {
                task_id: task_id.to_string(),
            },
        );
        TaskRemoval {
            task_id: task_id.to_string(),
            phase: board.phase(),
            version: board.version(),
        }
    }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (classroom_id, task_id) = match (
        get_required_str(&req.params, "classroomId"),
        get_required_str(&req.params, "taskId"),
    ) {
        (Ok(c), Ok(t)) => (c, t),
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };
    let confirmed = get_flag(&req.params, "confirmed");
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    command(
        &req.id,
        CommandResult::from_outcome(delete_task(&mut c, &classroom_id, &task_id, confirmed)),
    )
}

fn resync_board(c: &mut Ctx<'_>, classroom_id: &str) -> Result<serde_json::Value, TaskError> {
    c.resyncs.cancel(classroom_id);
    let board = resync(&c.gateway, c.store, classroom_id)?;
    Ok(serde_json::json!({
        "classroomId": classroom_id,
        "phase": board.phase(),
        "version": board.version(),
        "taskCount": board.tasks().len(),
    }))
}

fn handle_resync(state: &mut AppState, req: &Request) -> serde_json::Value {
    let classroom_id = match get_required_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    command(&req.id, CommandResult::from_result(resync_board(&mut c, &classroom_id)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tasks.list" => Some(handle_list(state, req)),
        "tasks.create" => Some(handle_create(state, req)),
        "tasks.update" => Some(handle_update(state, req)),
        "tasks.delete" => Some(handle_delete(state, req)),
        "tasks.resync" => Some(handle_resync(state, req)),
        _ => None,
    }
}

use crate::error::TaskError;
use crate::gateway::{actor_role, require_owner};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    command, ctx, get_optional_str, get_required_str, require_session, require_workspace, Ctx,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Classroom, Student};
use crate::outcome::CommandResult;
use crate::ownership::{canonical_owner, resolve_access, Access, Role, OWNER_FIELDS};
use crate::resync::ensure_loaded;
use crate::store::Phase;
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassroomSummary {
    id: String,
    name: String,
    subject: Option<String>,
    role: Role,
    owner: Option<String>,
    student_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenedClassroom {
    classroom: Classroom,
    role: Role,
    owner: Option<String>,
    phase: Phase,
    version: u64,
    task_count: usize,
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let subject = get_optional_str(&req.params, "subject").filter(|s| !s.trim().is_empty());
    let mut attrs: Map<String, Value> = match req.params.get("attrs") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(_) => return err(&req.id, "bad_params", "attrs must be an object", None),
    };
    let actor = match require_session(state) {
        Ok(a) => a.clone(),
        Err(e) => return e.response(&req.id),
    };
    let backend = match require_workspace(state) {
        Ok(b) => b,
        Err(e) => return e.response(&req.id),
    };

    // Without any ownership attribute nobody could manage the classroom.
    if !OWNER_FIELDS.iter().any(|f| attrs.contains_key(f.key())) {
        attrs.insert("createdBy".to_string(), json!(actor.email));
    }

    match backend.create_classroom(&name, subject.as_deref(), &attrs) {
        Ok(classroom) => {
            tracing::info!(classroom = %classroom.id, "classroom created");
            ok(&req.id, json!({ "classroom": classroom }))
        }
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:?}"), None),
    }
}

fn add_student(
    state: &mut AppState,
    classroom_id: &str,
    email: &str,
    name: &str,
) -> Result<Result<Student, TaskError>, HandlerErr> {
    let c = ctx(state)?;
    let classroom = match c.gateway.fetch_classroom(classroom_id) {
        Ok(v) => v,
        Err(e) => return Ok(Err(e)),
    };
    if let Err(e) = require_owner(&classroom, c.actor, "add students") {
        return Ok(Err(e));
    }
    let backend = require_workspace(state)?;
    backend
        .add_student(classroom_id, email, name)
        .map(Ok)
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: format!("{e:?}"),
            details: None,
        })
}

fn handle_add_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (classroom_id, email) = match (
        get_required_str(&req.params, "classroomId"),
        get_required_str(&req.params, "email"),
    ) {
        (Ok(c), Ok(e)) => (c, e),
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };
    let name = get_optional_str(&req.params, "name").unwrap_or_default();
    match add_student(state, &classroom_id, &email, &name) {
        Ok(result) => {
            if result.is_ok() {
                // Roster changes move students in and out of access.
                state.store.clear();
            }
            command(&req.id, CommandResult::from_result(result))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match require_session(state) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let backend = match require_workspace(state) {
        Ok(b) => b,
        Err(e) => return e.response(&req.id),
    };
    let classrooms = match backend.list_classrooms() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    let visible: Vec<ClassroomSummary> = classrooms
        .into_iter()
        .filter_map(|c| match resolve_access(&c, &actor.email) {
            Access::Granted(role) => Some(ClassroomSummary {
                owner: canonical_owner(&c),
                student_count: c.students.len(),
                id: c.id,
                name: c.name,
                subject: c.subject,
                role,
            }),
            Access::Denied => None,
        })
        .collect();
    ok(&req.id, json!({ "classrooms": visible }))
}

fn open_classroom(c: &mut Ctx<'_>, classroom_id: &str) -> Result<OpenedClassroom, TaskError> {
    let classroom = c.gateway.fetch_classroom(classroom_id)?;
    let role = actor_role(&classroom, c.actor)?;
    let board = ensure_loaded(&c.gateway, c.store, &classroom.id)?;
    Ok(OpenedClassroom {
        owner: canonical_owner(&classroom),
        classroom,
        role,
        phase: board.phase(),
        version: board.version(),
        task_count: board.tasks().len(),
    })
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let classroom_id = match get_required_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let mut c = match ctx(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    command(&req.id, CommandResult::from_result(open_classroom(&mut c, &classroom_id)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classrooms.create" => Some(handle_create(state, req)),
        "classrooms.addStudent" => Some(handle_add_student(state, req)),
        "classrooms.list" => Some(handle_list(state, req)),
        "classrooms.open" => Some(handle_open(state, req)),
        _ => None,
    }
}

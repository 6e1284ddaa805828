//! Response envelopes. `ok` carries handler output (including command
//! results that failed in the domain); `err` is reserved for host problems.

use crate::outcome::CommandResult;
use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

pub fn command(id: &str, result: CommandResult) -> Value {
    ok(id, result.to_value())
}

/// Reply for a line that never parsed, so there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> Value {
    json!({
        "ok": false,
        "error": { "code": "bad_json", "message": message.into() }
    })
}

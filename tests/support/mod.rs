#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TEACHER: &str = "t@x.com";
pub const STUDENT: &str = "ada@x.com";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Resync delay long enough that nothing reconciles on its own mid-test.
pub const MANUAL_RESYNC: &str = "600000";

pub fn spawn_sidecar(resync_delay_ms: &str) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .env("CLASSROOMD_RESYNC_DELAY_MS", resync_delay_ms)
        .env_remove("CLASSROOMD_CONFIG")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Envelope succeeded; returns the `{success, data | error}` command result.
    pub fn command(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.request_ok(method, params)
    }

    /// Command succeeded; returns its data.
    pub fn data(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let result = self.command(method, params);
        assert_eq!(
            result.get("success").and_then(|v| v.as_bool()),
            Some(true),
            "{} not successful: {}",
            method,
            result
        );
        result.get("data").cloned().unwrap_or_else(|| json!(null))
    }

    /// Command failed; returns `(code, kind)`.
    pub fn failure(&mut self, method: &str, params: serde_json::Value) -> (String, String) {
        let result = self.command(method, params);
        assert_eq!(
            result.get("success").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            result
        );
        let error = result.get("error").unwrap_or_else(|| panic!("no error in {}", result));
        (
            error["code"].as_str().unwrap_or_default().to_string(),
            error["kind"].as_str().unwrap_or_default().to_string(),
        )
    }

    pub fn open_workspace(&mut self, prefix: &str) -> PathBuf {
        let workspace = temp_dir(prefix);
        self.request_ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        workspace
    }

    pub fn login(&mut self, email: &str) {
        self.request_ok("session.set", json!({ "email": email }));
    }

    /// Teacher-owned classroom (legacy `teachers` list) with one enrolled student.
    pub fn seed_classroom(&mut self) -> String {
        self.login(TEACHER);
        let created = self.request_ok(
            "classrooms.create",
            json!({
                "name": "Algebra I",
                "subject": "Maths",
                "attrs": { "teachers": [{ "email": TEACHER }] },
            }),
        );
        let classroom_id = created["classroom"]["id"]
            .as_str()
            .expect("classroom id")
            .to_string();
        self.data(
            "classrooms.addStudent",
            json!({ "classroomId": classroom_id, "email": STUDENT, "name": "Ada" }),
        );
        classroom_id
    }

    pub fn create_task(&mut self, classroom_id: &str, task: serde_json::Value) -> String {
        let data = self.data(
            "tasks.create",
            json!({ "classroomId": classroom_id, "task": task }),
        );
        data["task"]["id"].as_str().expect("task id").to_string()
    }
}

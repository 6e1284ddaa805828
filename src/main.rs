mod backend;
mod config;
mod db;
mod error;
mod gateway;
mod grading;
mod ipc;
mod lifecycle;
mod logging;
mod model;
mod outcome;
mod ownership;
mod resync;
mod status;
mod store;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;

fn main() {
    let config = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("classroomd: {e:#}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("classroomd: {e:#}");
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        resync_delay_ms = config.resync_delay_ms,
        "classroomd starting"
    );

    let mut state = ipc::AppState::new(config);

    // Stdin is read on its own thread so pending resyncs can fire while idle.
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdout = io::stdout();
    loop {
        state.run_due_resyncs(Instant::now());

        let next = match state.next_resync() {
            Some(deadline) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(line) => line,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(line) => line,
                Err(_) => break,
            },
        };
        if next.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&next) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "unparseable request");
                let _ = writeln!(stdout, "{}", ipc::bad_json(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        // Anything that came due while we were blocked lands before the request.
        state.run_due_resyncs(Instant::now());

        let span = tracing::debug_span!("request", id = %req.id, method = %req.method);
        let resp = span.in_scope(|| ipc::handle_request(&mut state, req));
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed; shutting down");
}

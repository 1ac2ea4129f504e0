mod attendance;
mod calc;
mod db;
mod error;
mod ipc;
mod model;
mod roster;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout is reserved for protocol responses.
fn setup_tracing() {
    let filter = EnvFilter::try_from_env("ATTENDD_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME"))));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    setup_tracing();
    let mut state = ipc::AppState::default();

    if let Some(path) = std::env::var_os("ATTENDD_WORKSPACE").map(PathBuf::from) {
        if let Err(e) = ipc::select_workspace(&mut state, &path) {
            error!(workspace = %path.display(), "failed to open workspace from env: {e:?}");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "attendd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; answer with an id-less error.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, shutting down");
}

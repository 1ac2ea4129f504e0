pub mod attendance;
pub mod core;
pub mod seating;
pub mod setup;
pub mod students;

use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;

type Op = fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

/// Runs `op` against the open workspace and wraps its outcome in a response.
fn with_workspace(state: &AppState, req: &Request, op: Op) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match op(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

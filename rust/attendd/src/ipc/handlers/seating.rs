use super::{with_workspace, Op};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, SEAT_COLUMNS, SEAT_ROWS};
use rusqlite::Connection;
use serde_json::json;

fn seating_get(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let students = roster::list_students(conn)?;
    let seats = roster::seat_grid(&students);
    let occupied = students.len();
    Ok(json!({
        "rows": SEAT_ROWS,
        "columns": SEAT_COLUMNS,
        "occupied": occupied,
        "seats": seats
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: Op = match req.method.as_str() {
        "seating.get" => seating_get,
        _ => return None,
    };
    Some(with_workspace(state, req, op))
}

use crate::calc::{AttendancePolicy, DEFAULT_FULL_DAY_HOURS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::info;

const ATTENDANCE_KEY: &str = "setup.attendance";
const MAX_FULL_DAY_HOURS: f64 = 24.0;

fn default_attendance() -> Value {
    json!({ "fullDayHours": DEFAULT_FULL_DAY_HOURS })
}

fn parse_hours(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(n > 0.0 && n <= MAX_FULL_DAY_HOURS) {
        return Err(format!("{} must be in (0, {}]", key, MAX_FULL_DAY_HOURS));
    }
    Ok(n)
}

fn merge_attendance_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "fullDayHours" => {
                obj.insert(k.clone(), Value::from(parse_hours(v, k)?));
            }
            _ => return Err(format!("unknown attendance field: {}", k)),
        }
    }
    Ok(())
}

fn load_attendance(conn: &Connection) -> anyhow::Result<Value> {
    let mut current = default_attendance();
    if let Some(saved) = db::settings_get_json(conn, ATTENDANCE_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults instead of failing reads.
            let _ = merge_attendance_patch(&mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Workspace attendance policy: saved settings over defaults.
pub fn load_policy(conn: &Connection) -> anyhow::Result<AttendancePolicy> {
    let section = load_attendance(conn)?;
    let full_day_hours = section
        .get("fullDayHours")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_FULL_DAY_HOURS);
    Ok(AttendancePolicy { full_day_hours })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match load_attendance(conn) {
        Ok(attendance) => ok(&req.id, json!({ "attendance": attendance })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    if section != "attendance" {
        return err(&req.id, "bad_params", "unknown section", None);
    }
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_attendance(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_attendance_patch(&mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, ATTENDANCE_KEY, &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(section, settings = %current, "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

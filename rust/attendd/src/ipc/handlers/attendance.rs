use super::setup::load_policy;
use super::{with_workspace, Op};
use crate::attendance::{self, BulkMarkRequest, MarkRequest, ReconcileRequest};
use crate::calc::AttendancePolicy;
use crate::error::AttendanceError;
use crate::ipc::error::{parse_params, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::PeriodFilter;
use crate::roster;
use crate::store::{MarkStore, SqliteMarkStore};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn policy(conn: &Connection) -> Result<AttendancePolicy, HandlerErr> {
    load_policy(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn roster_ids(conn: &Connection) -> Result<Vec<String>, HandlerErr> {
    Ok(roster::student_ids(conn)?)
}

/// Reads report a missing date the same way writes do.
fn required_date(params: &serde_json::Value) -> Result<String, HandlerErr> {
    params
        .get("date")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AttendanceError::MissingRequiredField("date").into())
}

fn period_filter(params: &serde_json::Value) -> Result<PeriodFilter, HandlerErr> {
    Ok(PeriodFilter::parse(
        params.get("period").and_then(|v| v.as_str()),
    )?)
}

/// Raw marks for a date with each record's student summary attached.
fn attendance_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = required_date(params)?;
    let (_, date) = crate::model::parse_date(&date)?;
    let filter = period_filter(params)?;
    let marks = SqliteMarkStore::new(conn).fetch_marks(&date, filter)?;

    let students: HashMap<String, _> = roster::list_students(conn)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let records: Vec<serde_json::Value> = marks
        .iter()
        .map(|m| {
            let student = match students.get(&m.student_id) {
                Some(s) => json!({
                    "id": s.id,
                    "name": s.name,
                    "rollNumber": s.roll_number,
                    "email": s.email
                }),
                None => json!({ "id": m.student_id }),
            };
            json!({
                "student": student,
                "studentId": m.student_id,
                "date": m.date,
                "period": m.period,
                "status": m.status,
                "timeRange": m.time_range,
                "hours": m.hours,
                "updatedAt": m.updated_at
            })
        })
        .collect();
    Ok(json!({ "records": records }))
}

fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let req: MarkRequest = parse_params(params)?;
    let mark = attendance::mark_attendance(&SqliteMarkStore::new(conn), &req)?;
    Ok(json!({ "mark": mark }))
}

fn attendance_bulk_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let req: BulkMarkRequest = parse_params(params)?;
    let count = attendance::mark_attendance_bulk(&SqliteMarkStore::new(conn), &req)?;
    Ok(json!({ "count": count }))
}

fn attendance_day_view(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = required_date(params)?;
    let filter = period_filter(params)?;
    let view = attendance::day_view(&SqliteMarkStore::new(conn), &date, filter)?;
    Ok(json!(view))
}

fn attendance_day_summary(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = required_date(params)?;
    let summary = attendance::day_summary(
        &SqliteMarkStore::new(conn),
        &policy(conn)?,
        &roster_ids(conn)?,
        &date,
    )?;
    Ok(json!(summary))
}

fn attendance_week_summary(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = required_date(params)?;
    let summary = attendance::week_summary(
        &SqliteMarkStore::new(conn),
        &policy(conn)?,
        &roster_ids(conn)?,
        &date,
    )?;
    Ok(json!(summary))
}

fn attendance_reconcile(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let req: ReconcileRequest = parse_params(params)?;
    let out = attendance::reconcile(
        &SqliteMarkStore::new(conn),
        &policy(conn)?,
        &roster_ids(conn)?,
        &req,
    )?;
    Ok(json!(out))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: Op = match req.method.as_str() {
        "attendance.list" => attendance_list,
        "attendance.mark" => attendance_mark,
        "attendance.bulkMark" => attendance_bulk_mark,
        "attendance.dayView" => attendance_day_view,
        "attendance.daySummary" => attendance_day_summary,
        "attendance.weekSummary" => attendance_week_summary,
        "attendance.reconcile" => attendance_reconcile,
        _ => return None,
    };
    Some(with_workspace(state, req, op))
}

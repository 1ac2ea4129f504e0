use super::{with_workspace, Op};
use crate::ipc::error::{get_required_str, parse_params, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, NewStudent, StudentPatch};
use rusqlite::Connection;
use serde_json::json;

fn students_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let students = roster::list_students(conn)?;
    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let input: NewStudent = parse_params(params)?;
    let student = roster::create_student(conn, &input)?;
    Ok(json!({ "student": student }))
}

fn students_bulk_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = params.get("students") else {
        return Err(HandlerErr::new("bad_params", "missing students"));
    };
    let inputs: Vec<NewStudent> = parse_params(raw)?;
    let students = roster::create_students_bulk(conn, &inputs)?;
    Ok(json!({ "students": students }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let patch: StudentPatch = match params.get("patch") {
        Some(p) => parse_params(p)?,
        None => StudentPatch::default(),
    };
    let student = roster::update_student(conn, &id, &patch)?;
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let deleted_marks = roster::delete_student(conn, &id)?;
    Ok(json!({ "ok": true, "deletedMarks": deleted_marks }))
}

fn students_delete_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (deleted_students, deleted_marks) = roster::delete_all_students(conn)?;
    Ok(json!({
        "deletedStudents": deleted_students,
        "deletedMarks": deleted_marks
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: Op = match req.method.as_str() {
        "students.list" => students_list,
        "students.create" => students_create,
        "students.bulkCreate" => students_bulk_create,
        "students.update" => students_update,
        "students.delete" => students_delete,
        "students.deleteAll" => students_delete_all,
        _ => return None,
    };
    Some(with_workspace(state, req, op))
}

use crate::error::{is_unique_violation, RosterError};
use crate::model::Student;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

pub const SEAT_ROWS: i64 = 7;
pub const SEAT_COLUMNS: i64 = 8;

/// Student fields as they arrive from a client; `id` is generated when absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub id: Option<String>,
    pub name: Option<String>,
    pub roll_number: Option<String>,
    pub email: Option<String>,
    pub seat_row: Option<i64>,
    pub seat_column: Option<i64>,
}

/// Partial update. Blank strings leave the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub name: Option<String>,
    pub roll_number: Option<String>,
    pub email: Option<String>,
    pub seat_row: Option<i64>,
    pub seat_column: Option<i64>,
}

fn non_blank(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn check_seat(row: i64, column: i64) -> Result<(), RosterError> {
    if !(0..SEAT_ROWS).contains(&row) || !(0..SEAT_COLUMNS).contains(&column) {
        return Err(RosterError::SeatOutOfRange { row, column });
    }
    Ok(())
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        roll_number: r.get(2)?,
        email: r.get(3)?,
        seat_row: r.get(4)?,
        seat_column: r.get(5)?,
    })
}

const SELECT_STUDENT: &str =
    "SELECT id, name, roll_number, email, seat_row, seat_column FROM students";

/// Students in seat order: row-major across the room.
pub fn list_students(conn: &Connection) -> Result<Vec<Student>, RosterError> {
    let mut stmt = conn.prepare(&format!("{SELECT_STUDENT} ORDER BY seat_row, seat_column"))?;
    let students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

pub fn get_student(conn: &Connection, id: &str) -> Result<Option<Student>, RosterError> {
    Ok(conn
        .query_row(&format!("{SELECT_STUDENT} WHERE id = ?"), [id], student_from_row)
        .optional()?)
}

pub fn student_ids(conn: &Connection) -> Result<Vec<String>, RosterError> {
    Ok(list_students(conn)?.into_iter().map(|s| s.id).collect())
}

fn seat_holder(conn: &Connection, row: i64, column: i64) -> Result<Option<String>, RosterError> {
    Ok(conn
        .query_row(
            "SELECT id FROM students WHERE seat_row = ? AND seat_column = ?",
            (row, column),
            |r| r.get(0),
        )
        .optional()?)
}

fn roll_holder(conn: &Connection, roll_number: &str) -> Result<Option<String>, RosterError> {
    Ok(conn
        .query_row(
            "SELECT id FROM students WHERE roll_number = ?",
            [roll_number],
            |r| r.get(0),
        )
        .optional()?)
}

fn validate_new(input: &NewStudent) -> Result<Student, RosterError> {
    let name = non_blank(input.name.as_deref()).ok_or(RosterError::MissingRequiredField("name"))?;
    let roll_number = non_blank(input.roll_number.as_deref())
        .ok_or(RosterError::MissingRequiredField("rollNumber"))?;
    let seat_row = input
        .seat_row
        .ok_or(RosterError::MissingRequiredField("seatRow"))?;
    let seat_column = input
        .seat_column
        .ok_or(RosterError::MissingRequiredField("seatColumn"))?;
    check_seat(seat_row, seat_column)?;
    Ok(Student {
        id: non_blank(input.id.as_deref()).unwrap_or_else(|| Uuid::new_v4().to_string()),
        name,
        roll_number,
        email: input.email.as_deref().map(str::trim).unwrap_or("").to_string(),
        seat_row,
        seat_column,
    })
}

fn insert_student(conn: &Connection, s: &Student) -> Result<(), RosterError> {
    if seat_holder(conn, s.seat_row, s.seat_column)?.is_some() {
        return Err(RosterError::SeatTaken {
            row: s.seat_row,
            column: s.seat_column,
        });
    }
    if roll_holder(conn, &s.roll_number)?.is_some() {
        return Err(RosterError::RollNumberTaken(s.roll_number.clone()));
    }
    if get_student(conn, &s.id)?.is_some() {
        return Err(RosterError::IdTaken(s.id.clone()));
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO students(id, name, roll_number, email, seat_row, seat_column, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.name,
            &s.roll_number,
            &s.email,
            s.seat_row,
            s.seat_column,
            &now,
            &now,
        ),
    )?;
    Ok(())
}

pub fn create_student(conn: &Connection, input: &NewStudent) -> Result<Student, RosterError> {
    let student = validate_new(input)?;
    insert_student(conn, &student)?;
    info!(student_id = %student.id, roll_number = %student.roll_number, "student created");
    Ok(student)
}

/// Inserts every student or none of them.
pub fn create_students_bulk(conn: &Connection, inputs: &[NewStudent]) -> Result<Vec<Student>, RosterError> {
    let students = inputs
        .iter()
        .map(validate_new)
        .collect::<Result<Vec<_>, _>>()?;
    let tx = conn.unchecked_transaction()?;
    for s in &students {
        insert_student(&tx, s)?;
    }
    tx.commit()?;
    info!(count = students.len(), "students bulk created");
    Ok(students)
}

pub fn update_student(conn: &Connection, id: &str, patch: &StudentPatch) -> Result<Student, RosterError> {
    let Some(mut s) = get_student(conn, id)? else {
        return Err(RosterError::NotFound(id.to_string()));
    };
    if let Some(name) = non_blank(patch.name.as_deref()) {
        s.name = name;
    }
    if let Some(roll) = non_blank(patch.roll_number.as_deref()) {
        if roll != s.roll_number && roll_holder(conn, &roll)?.is_some() {
            return Err(RosterError::RollNumberTaken(roll));
        }
        s.roll_number = roll;
    }
    if let Some(email) = non_blank(patch.email.as_deref()) {
        s.email = email;
    }
    let row = patch.seat_row.unwrap_or(s.seat_row);
    let column = patch.seat_column.unwrap_or(s.seat_column);
    check_seat(row, column)?;
    if let Some(holder) = seat_holder(conn, row, column)? {
        if holder != s.id {
            return Err(RosterError::SeatTaken { row, column });
        }
    }
    s.seat_row = row;
    s.seat_column = column;

    conn.execute(
        "UPDATE students
         SET name = ?, roll_number = ?, email = ?, seat_row = ?, seat_column = ?, updated_at = ?
         WHERE id = ?",
        (
            &s.name,
            &s.roll_number,
            &s.email,
            s.seat_row,
            s.seat_column,
            chrono::Utc::now().to_rfc3339(),
            &s.id,
        ),
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            RosterError::SeatTaken { row, column }
        } else {
            RosterError::Storage(e)
        }
    })?;
    Ok(s)
}

/// Removes the student and every attendance mark it owns. Returns the mark count.
pub fn delete_student(conn: &Connection, id: &str) -> Result<usize, RosterError> {
    if get_student(conn, id)?.is_none() {
        return Err(RosterError::NotFound(id.to_string()));
    }
    let tx = conn.unchecked_transaction()?;
    let marks = tx.execute("DELETE FROM attendance_marks WHERE student_id = ?", [id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.commit()?;
    info!(student_id = id, deleted_marks = marks, "student deleted");
    Ok(marks)
}

/// Empties the roster and all attendance. Fails with `Empty` when there is nothing to delete.
pub fn delete_all_students(conn: &Connection) -> Result<(usize, usize), RosterError> {
    let tx = conn.unchecked_transaction()?;
    let marks = tx.execute("DELETE FROM attendance_marks", [])?;
    let students = tx.execute("DELETE FROM students", [])?;
    if students == 0 {
        return Err(RosterError::Empty);
    }
    tx.commit()?;
    info!(deleted_students = students, deleted_marks = marks, "roster cleared");
    Ok((students, marks))
}

/// Room layout as `rows x columns`, each cell holding the seated student's id.
pub fn seat_grid(students: &[Student]) -> Vec<Vec<Option<String>>> {
    let mut grid = vec![vec![None; SEAT_COLUMNS as usize]; SEAT_ROWS as usize];
    for s in students {
        if check_seat(s.seat_row, s.seat_column).is_ok() {
            grid[s.seat_row as usize][s.seat_column as usize] = Some(s.id.clone());
        }
    }
    grid
}

use rusqlite::ffi;
use serde_json::json;
use thiserror::Error;

/// Failures raised by the attendance core and the mark store.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("invalid time format: {0:?} (expected HH:MM)")]
    InvalidTimeFormat(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("invalid date: {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid period: {0:?} (expected 1-6)")]
    InvalidPeriod(String),

    #[error("invalid status: {0:?} (expected present or absent)")]
    InvalidStatus(String),

    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error("{} student(s) not found", .0.len())]
    UnknownStudents(Vec<String>),

    #[error("duplicate attendance key ({student_id}, {date}, {period})")]
    DuplicateKeyViolation {
        student_id: String,
        date: String,
        period: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTimeFormat(_) => "invalid_time_format",
            Self::MissingRequiredField(_) => "missing_field",
            Self::InvalidDate(_) => "invalid_date",
            Self::InvalidPeriod(_) => "invalid_period",
            Self::InvalidStatus(_) => "invalid_status",
            Self::StudentNotFound(_) | Self::UnknownStudents(_) => "not_found",
            Self::DuplicateKeyViolation { .. } => "duplicate_key",
            Self::Storage(_) => "db_update_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::MissingRequiredField(field) => Some(json!({ "field": field })),
            Self::StudentNotFound(id) => Some(json!({ "studentIds": [id] })),
            Self::UnknownStudents(ids) => Some(json!({ "studentIds": ids })),
            Self::DuplicateKeyViolation {
                student_id,
                date,
                period,
            } => Some(json!({
                "studentId": student_id,
                "date": date,
                "period": period
            })),
            _ => None,
        }
    }
}

/// Failures raised by roster (student) maintenance.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("seat ({row}, {column}) is outside the 7x8 room")]
    SeatOutOfRange { row: i64, column: i64 },

    #[error("seat ({row}, {column}) is already occupied")]
    SeatTaken { row: i64, column: i64 },

    #[error("roll number {0:?} is already in use")]
    RollNumberTaken(String),

    #[error("student id {0:?} is already in use")]
    IdTaken(String),

    #[error("student not found: {0}")]
    NotFound(String),

    #[error("no students found to delete")]
    Empty,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl RosterError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredField(_) => "missing_field",
            Self::SeatOutOfRange { .. } => "bad_params",
            Self::SeatTaken { .. } => "seat_taken",
            Self::RollNumberTaken(_) | Self::IdTaken(_) => "duplicate_key",
            Self::NotFound(_) | Self::Empty => "not_found",
            Self::Storage(_) => "db_update_failed",
        }
    }
}

/// True when `e` is SQLite refusing a write on a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

pub fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "attendance.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates every table and index if missing. Safe to run on an existing workspace.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            roll_number TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            seat_row INTEGER NOT NULL CHECK(seat_row BETWEEN 0 AND 6),
            seat_column INTEGER NOT NULL CHECK(seat_column BETWEEN 0 AND 7),
            created_at TEXT,
            updated_at TEXT,
            UNIQUE(seat_row, seat_column)
        )",
        [],
    )?;

    // One mark per (student, date, period); the key is what makes writes upserts.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_marks(
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            period TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('present', 'absent')),
            start_time TEXT,
            end_time TEXT,
            hours REAL NOT NULL DEFAULT 0,
            updated_at TEXT,
            PRIMARY KEY(student_id, date, period),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_marks_date ON attendance_marks(date, period)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json)
         VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

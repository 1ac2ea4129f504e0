//! Persistence for attendance marks.
//!
//! Writes are keyed by (student, date, period) and are last-write-wins: the daemon
//! serves one request at a time on a single connection, so two writes to the same
//! key always land in arrival order and the later one replaces the earlier.

use crate::error::{is_foreign_key_violation, is_unique_violation, AttendanceError};
use crate::model::{AttendanceMark, MarkKey, MarkStatus, MarkValues, Period, PeriodFilter, TimeRange};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;

pub trait MarkStore {
    /// All marks for `date`, optionally narrowed to one period.
    fn fetch_marks(&self, date: &str, period: PeriodFilter) -> Result<Vec<AttendanceMark>, AttendanceError>;

    /// Inserts or wholesale replaces the mark at `key`.
    fn upsert_mark(&self, key: &MarkKey, values: &MarkValues) -> Result<AttendanceMark, AttendanceError>;

    /// Applies every entry for one (date, period) or none of them.
    fn upsert_marks_bulk(
        &self,
        date: &str,
        period: Period,
        entries: &[(String, MarkValues)],
    ) -> Result<usize, AttendanceError>;
}

pub struct SqliteMarkStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteMarkStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const UPSERT_SQL: &str = "INSERT INTO attendance_marks(student_id, date, period, status, start_time, end_time, hours, updated_at)
     VALUES(?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(student_id, date, period) DO UPDATE SET
       status = excluded.status,
       start_time = excluded.start_time,
       end_time = excluded.end_time,
       hours = excluded.hours,
       updated_at = excluded.updated_at";

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn write_one(conn: &Connection, key: &MarkKey, values: &MarkValues, stamp: &str) -> Result<(), AttendanceError> {
    let (start, end) = match &values.time_range {
        Some(r) => (r.start_time.as_deref(), r.end_time.as_deref()),
        None => (None, None),
    };
    conn.execute(
        UPSERT_SQL,
        (
            &key.student_id,
            &key.date,
            key.period.as_str(),
            values.status.as_str(),
            start,
            end,
            values.hours,
            stamp,
        ),
    )
    .map_err(|e| classify_write_error(e, key))?;
    Ok(())
}

fn classify_write_error(e: rusqlite::Error, key: &MarkKey) -> AttendanceError {
    if is_foreign_key_violation(&e) {
        AttendanceError::StudentNotFound(key.student_id.clone())
    } else if is_unique_violation(&e) {
        AttendanceError::DuplicateKeyViolation {
            student_id: key.student_id.clone(),
            date: key.date.clone(),
            period: key.period.to_string(),
        }
    } else {
        AttendanceError::Storage(e)
    }
}

fn mark_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceMark> {
    let period_raw: String = r.get(2)?;
    let status_raw: String = r.get(3)?;
    let start: Option<String> = r.get(4)?;
    let end: Option<String> = r.get(5)?;
    let period = Period::parse(&period_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = MarkStatus::parse(&status_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let time_range = if start.is_none() && end.is_none() {
        None
    } else {
        Some(TimeRange {
            start_time: start,
            end_time: end,
        })
    };
    Ok(AttendanceMark {
        student_id: r.get(0)?,
        date: r.get(1)?,
        period,
        status,
        time_range,
        hours: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

impl MarkStore for SqliteMarkStore<'_> {
    fn fetch_marks(&self, date: &str, period: PeriodFilter) -> Result<Vec<AttendanceMark>, AttendanceError> {
        let base = "SELECT student_id, date, period, status, start_time, end_time, hours, updated_at
                    FROM attendance_marks
                    WHERE date = ?1";
        let marks = match period {
            PeriodFilter::All => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{base} ORDER BY period, student_id"))?;
                let rows = stmt.query_map([date], mark_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            PeriodFilter::Only(p) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{base} AND period = ?2 ORDER BY student_id"))?;
                let rows = stmt.query_map((date, p.as_str()), mark_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(marks)
    }

    fn upsert_mark(&self, key: &MarkKey, values: &MarkValues) -> Result<AttendanceMark, AttendanceError> {
        let stamp = now_rfc3339();
        write_one(self.conn, key, values, &stamp)?;
        debug!(student_id = %key.student_id, date = %key.date, period = %key.period, "mark upserted");
        Ok(AttendanceMark {
            student_id: key.student_id.clone(),
            date: key.date.clone(),
            period: key.period,
            status: values.status,
            time_range: values.time_range.clone(),
            hours: values.hours,
            updated_at: Some(stamp),
        })
    }

    fn upsert_marks_bulk(
        &self,
        date: &str,
        period: Period,
        entries: &[(String, MarkValues)],
    ) -> Result<usize, AttendanceError> {
        let tx = self.conn.unchecked_transaction()?;

        let mut missing = Vec::new();
        for (student_id, _) in entries {
            let exists = tx
                .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
                    r.get::<_, i64>(0)
                })
                .optional()?
                .is_some();
            if !exists {
                missing.push(student_id.clone());
            }
        }
        if !missing.is_empty() {
            // Dropping the transaction rolls it back; nothing has been written yet.
            return Err(AttendanceError::UnknownStudents(missing));
        }

        let stamp = now_rfc3339();
        for (student_id, values) in entries {
            let key = MarkKey {
                student_id: student_id.clone(),
                date: date.to_string(),
                period,
            };
            write_one(&tx, &key, values, &stamp)?;
        }
        tx.commit()?;
        debug!(date, period = %period, count = entries.len(), "bulk marks committed");
        Ok(entries.len())
    }
}

use crate::calc::{self, AttendancePolicy, ClassRate, MarkingStats, StudentDay};
use crate::error::AttendanceError;
use crate::model::{
    parse_date, AttendanceMark, DailyAttendanceView, MarkKey, MarkStatus, MarkValues, Period,
    PeriodFilter, PeriodMarks, TimeRange,
};
use crate::store::MarkStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

fn required<'a>(v: Option<&'a str>, field: &'static str) -> Result<&'a str, AttendanceError> {
    v.map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AttendanceError::MissingRequiredField(field))
}

/// Single-mark write. Any `hours` the client sends is ignored; hours come from `timeRange`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRequest {
    pub student_id: Option<String>,
    pub date: Option<String>,
    pub period: Option<String>,
    pub status: Option<String>,
    pub time_range: Option<TimeRange>,
}

pub fn mark_attendance<S: MarkStore + ?Sized>(
    store: &S,
    req: &MarkRequest,
) -> Result<AttendanceMark, AttendanceError> {
    let student_id = required(req.student_id.as_deref(), "studentId")?;
    let date = required(req.date.as_deref(), "date")?;
    let period = required(req.period.as_deref(), "period")?;
    let status = required(req.status.as_deref(), "status")?;

    let (_, date) = parse_date(date)?;
    let period = Period::parse(period)?;
    let status = MarkStatus::parse(status)?;
    let values = MarkValues::new(status, req.time_range.clone())?;

    let key = MarkKey {
        student_id: student_id.to_string(),
        date,
        period,
    };
    let mark = store.upsert_mark(&key, &values)?;
    info!(
        student_id = %mark.student_id,
        date = %mark.date,
        period = %mark.period,
        status = mark.status.as_str(),
        hours = mark.hours,
        "attendance marked"
    );
    Ok(mark)
}

/// One status per student for a single (date, period), sharing one time range.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkRequest {
    pub date: Option<String>,
    pub period: Option<String>,
    pub students_status: Option<BTreeMap<String, String>>,
    pub time_range: Option<TimeRange>,
}

/// Every entry is validated before anything is written, and the store applies the
/// batch atomically: either all students are marked or none are.
pub fn mark_attendance_bulk<S: MarkStore + ?Sized>(
    store: &S,
    req: &BulkMarkRequest,
) -> Result<usize, AttendanceError> {
    let date = required(req.date.as_deref(), "date")?;
    let period = required(req.period.as_deref(), "period")?;
    let Some(statuses) = req.students_status.as_ref() else {
        return Err(AttendanceError::MissingRequiredField("studentsStatus"));
    };

    let (_, date) = parse_date(date)?;
    let period = Period::parse(period)?;

    let mut parsed = Vec::with_capacity(statuses.len());
    for (student_id, status) in statuses {
        let student_id = required(Some(student_id.as_str()), "studentId")?;
        parsed.push((student_id.to_string(), MarkStatus::parse(status)?));
    }

    // The shared range is validated only when someone is present.
    let present = if parsed.iter().any(|(_, s)| *s == MarkStatus::Present) {
        Some(MarkValues::new(MarkStatus::Present, req.time_range.clone())?)
    } else {
        None
    };
    let absent = MarkValues::new(MarkStatus::Absent, None)?;

    let mut entries = Vec::with_capacity(parsed.len());
    for (student_id, status) in parsed {
        let values = match (status, &present) {
            (MarkStatus::Present, Some(v)) => v.clone(),
            _ => absent.clone(),
        };
        entries.push((student_id, values));
    }

    let count = store.upsert_marks_bulk(&date, period, &entries)?;
    let hours = present.as_ref().map_or(0.0, |v| v.hours);
    info!(date = %date, period = %period, count, hours, "bulk attendance marked");
    Ok(count)
}

pub fn day_view<S: MarkStore + ?Sized>(
    store: &S,
    date: &str,
    period: PeriodFilter,
) -> Result<DailyAttendanceView, AttendanceError> {
    let (_, date) = parse_date(date)?;
    let marks = store.fetch_marks(&date, period)?;
    Ok(DailyAttendanceView::from_marks(&date, &marks))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: String,
    pub full_day_hours: f64,
    pub rows: Vec<StudentDay>,
    pub rate: ClassRate,
}

pub fn day_summary<S: MarkStore + ?Sized>(
    store: &S,
    policy: &AttendancePolicy,
    roster: &[String],
    date: &str,
) -> Result<DaySummary, AttendanceError> {
    let view = day_view(store, date, PeriodFilter::All)?;
    let rows = roster
        .iter()
        .map(|sid| calc::student_day(policy, &view, sid))
        .collect();
    let rate = calc::class_rate_for_roster(policy, roster.iter().map(String::as_str), &view);
    Ok(DaySummary {
        date: view.date,
        full_day_hours: policy.full_day_hours,
        rows,
        rate,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentWeek {
    pub student_id: String,
    pub days: Vec<StudentDay>,
    pub total_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSummary {
    pub days: Vec<String>,
    pub capacity_hours: f64,
    pub rows: Vec<StudentWeek>,
}

/// Per-day hours for the Sunday..Saturday week containing `date`.
pub fn week_summary<S: MarkStore + ?Sized>(
    store: &S,
    policy: &AttendancePolicy,
    roster: &[String],
    date: &str,
) -> Result<WeekSummary, AttendanceError> {
    let (anchor, _) = parse_date(date)?;
    let days: Vec<String> = calc::week_days(anchor)
        .into_iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();

    let mut views = Vec::with_capacity(days.len());
    for day in &days {
        let marks = store.fetch_marks(day, PeriodFilter::All)?;
        views.push(DailyAttendanceView::from_marks(day, &marks));
    }

    let rows = roster
        .iter()
        .map(|sid| {
            let per_day: Vec<StudentDay> = views
                .iter()
                .map(|v| calc::student_day(policy, v, sid))
                .collect();
            let total_hours = calc::round_1_decimal(per_day.iter().map(|d| d.total_hours).sum());
            StudentWeek {
                student_id: sid.clone(),
                days: per_day,
                total_hours,
            }
        })
        .collect();

    Ok(WeekSummary {
        capacity_hours: days.len() as f64 * policy.full_day_hours,
        days,
        rows,
    })
}

/// Unsaved marking-screen edits for one (date, period).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub date: Option<String>,
    pub period: Option<String>,
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub local_edits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciled {
    pub date: String,
    pub period: Period,
    pub marks: PeriodMarks,
    pub stats: MarkingStats,
}

/// Merges local edits over the stored period, local winning. Nothing is written.
pub fn reconcile<S: MarkStore + ?Sized>(
    store: &S,
    policy: &AttendancePolicy,
    roster: &[String],
    req: &ReconcileRequest,
) -> Result<Reconciled, AttendanceError> {
    let date = required(req.date.as_deref(), "date")?;
    let period = Period::parse(required(req.period.as_deref(), "period")?)?;

    let mut edits = BTreeMap::new();
    for (student_id, status) in &req.local_edits {
        edits.insert(student_id.clone(), MarkStatus::parse(status)?);
    }

    let mut day = day_view(store, date, PeriodFilter::All)?;
    let server = day.period(period).cloned().unwrap_or_default();
    let merged = calc::merge(&server, &edits, req.time_range.as_ref())?;
    day.periods.insert(period, merged.clone());

    let stats = calc::marking_stats(policy, roster.iter().map(String::as_str), &merged, &day);
    Ok(Reconciled {
        date: day.date,
        period,
        marks: merged,
        stats,
    })
}

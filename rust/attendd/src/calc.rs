use crate::error::AttendanceError;
use crate::model::{
    DailyAttendanceView, DayStatus, MarkStatus, MarkValues, PeriodEntry, PeriodMarks, TimeRange,
};
use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_FULL_DAY_HOURS: f64 = 8.0;

/// Nearest tenth, ties away from zero: `round(10*x) / 10`.
pub fn round_1_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn minutes_of_day(raw: &str) -> Result<i64, AttendanceError> {
    let t = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| AttendanceError::InvalidTimeFormat(raw.to_string()))?;
    Ok(i64::from(t.hour()) * 60 + i64::from(t.minute()))
}

/// Minutes of a field that is set; `None` for a missing or blank one.
fn present_minutes(raw: Option<&str>) -> Result<Option<i64>, AttendanceError> {
    match raw.filter(|s| !s.trim().is_empty()) {
        Some(t) => minutes_of_day(t).map(Some),
        None => Ok(None),
    }
}

/// Hours covered by `range`, one decimal.
///
/// A missing range, or a range with either end missing or blank, counts as 0.
/// Any end that is given must still be valid `HH:MM`.
/// End before start is not rejected and yields negative hours.
pub fn compute_hours(range: Option<&TimeRange>) -> Result<f64, AttendanceError> {
    let Some(range) = range else { return Ok(0.0) };
    let start = present_minutes(range.start_time.as_deref())?;
    let end = present_minutes(range.end_time.as_deref())?;
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(0.0);
    };
    let minutes = end - start;
    // Tenths of an hour are 6 minute steps; rounding there keeps x.x5 ties exact.
    Ok((minutes as f64 / 6.0).round() / 10.0)
}

/// Full-day threshold used to classify and scale daily hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePolicy {
    pub full_day_hours: f64,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            full_day_hours: DEFAULT_FULL_DAY_HOURS,
        }
    }
}

impl AttendancePolicy {
    pub fn status_for_hours(&self, hours: f64) -> DayStatus {
        if hours >= self.full_day_hours {
            DayStatus::Full
        } else if hours > 0.0 {
            DayStatus::Partial
        } else {
            DayStatus::Absent
        }
    }

    /// `round(hours / fullDay * 100)` clamped to `0..=100`.
    pub fn percentage_for_hours(&self, hours: f64) -> u32 {
        let pct = (hours / self.full_day_hours * 100.0).round();
        pct.clamp(0.0, 100.0) as u32
    }
}

/// Sum of a student's hours across every period of the view.
pub fn total_hours_for_date(view: &DailyAttendanceView, student_id: &str) -> f64 {
    let sum: f64 = view
        .periods
        .values()
        .filter_map(|marks| marks.get(student_id))
        .map(|e| e.hours)
        .sum();
    round_1_decimal(sum)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRate {
    pub present: usize,
    pub partial: usize,
    pub absent: usize,
    pub total: usize,
    pub present_percentage: u32,
}

/// Partial days weigh half toward the class rate.
pub fn class_rate_for_roster<'a, I>(
    policy: &AttendancePolicy,
    roster: I,
    view: &DailyAttendanceView,
) -> ClassRate
where
    I: IntoIterator<Item = &'a str>,
{
    let mut rate = ClassRate::default();
    for student_id in roster {
        rate.total += 1;
        match policy.status_for_hours(total_hours_for_date(view, student_id)) {
            DayStatus::Full => rate.present += 1,
            DayStatus::Partial => rate.partial += 1,
            DayStatus::Absent => rate.absent += 1,
        }
    }
    if rate.total > 0 {
        let weighted = rate.present as f64 + 0.5 * rate.partial as f64;
        rate.present_percentage = (weighted / rate.total as f64 * 100.0).round() as u32;
    }
    rate
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDay {
    pub student_id: String,
    pub total_hours: f64,
    pub status: DayStatus,
    pub percentage: u32,
}

pub fn student_day(policy: &AttendancePolicy, view: &DailyAttendanceView, student_id: &str) -> StudentDay {
    let total_hours = total_hours_for_date(view, student_id);
    StudentDay {
        student_id: student_id.to_string(),
        total_hours,
        status: policy.status_for_hours(total_hours),
        percentage: policy.percentage_for_hours(total_hours),
    }
}

/// Sunday through Saturday of the week holding `date`.
pub fn week_days(date: NaiveDate) -> Vec<NaiveDate> {
    let back = u64::from(date.weekday().num_days_from_sunday());
    let start = date.checked_sub_days(Days::new(back)).unwrap_or(date);
    start.iter_days().take(7).collect()
}

/// Overlays in-progress local edits on a server snapshot of one period.
///
/// Every local edit replaces the server entry for its student. Present edits take
/// `working_range` and its hours, absent edits carry neither.
pub fn merge(
    server: &PeriodMarks,
    local_edits: &BTreeMap<String, MarkStatus>,
    working_range: Option<&TimeRange>,
) -> Result<PeriodMarks, AttendanceError> {
    let present = MarkValues::new(MarkStatus::Present, working_range.cloned())?;
    let mut merged = server.clone();
    for (student_id, status) in local_edits {
        let entry: PeriodEntry = match status {
            MarkStatus::Present => present.clone().into(),
            MarkStatus::Absent => MarkValues::new(MarkStatus::Absent, None)?.into(),
        };
        merged.insert(student_id.clone(), entry);
    }
    Ok(merged)
}

/// Marking-screen counters for one period, before confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkingStats {
    pub present: usize,
    pub absent: usize,
    pub partial: usize,
    pub unmarked: usize,
    pub total: usize,
    pub present_percentage: u32,
    pub ready_to_confirm: bool,
}

/// `partial` is judged on whole-day hours from `day`, everything else on `merged`.
pub fn marking_stats<'a, I>(
    policy: &AttendancePolicy,
    roster: I,
    merged: &PeriodMarks,
    day: &DailyAttendanceView,
) -> MarkingStats
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stats = MarkingStats::default();
    for student_id in roster {
        stats.total += 1;
        match merged.get(student_id).map(|e| e.status) {
            Some(MarkStatus::Present) => stats.present += 1,
            Some(MarkStatus::Absent) => stats.absent += 1,
            None => stats.unmarked += 1,
        }
        if policy.status_for_hours(total_hours_for_date(day, student_id)) == DayStatus::Partial {
            stats.partial += 1;
        }
    }
    if stats.total > 0 {
        stats.present_percentage =
            (stats.present as f64 / stats.total as f64 * 100.0).round() as u32;
    }
    stats.ready_to_confirm = stats.unmarked == 0;
    stats
}

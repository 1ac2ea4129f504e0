use crate::error::AttendanceError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Class session slot within a school day, `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(u8);

impl Period {
    pub const FIRST: u8 = 1;
    pub const LAST: u8 = 6;

    pub fn parse(raw: &str) -> Result<Self, AttendanceError> {
        let t = raw.trim();
        match t.parse::<u8>() {
            Ok(n) if (Self::FIRST..=Self::LAST).contains(&n) => Ok(Self(n)),
            _ => Err(AttendanceError::InvalidPeriod(t.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self.0 {
            1 => "1",
            2 => "2",
            3 => "3",
            4 => "4",
            5 => "5",
            _ => "6",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Period {
    type Error = AttendanceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Period::parse(&value)
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.as_str().to_string()
    }
}

/// Query-side period selector. `"all"` (or no period at all) never reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodFilter {
    All,
    Only(Period),
}

impl PeriodFilter {
    pub fn parse(raw: Option<&str>) -> Result<Self, AttendanceError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::All),
            Some(s) if s.eq_ignore_ascii_case("all") => Ok(Self::All),
            Some(s) => Period::parse(s).map(Self::Only),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkStatus {
    Present,
    Absent,
}

impl MarkStatus {
    pub fn parse(raw: &str) -> Result<Self, AttendanceError> {
        match raw.trim() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(AttendanceError::InvalidStatus(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

/// Daily classification from accumulated hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Full,
    Partial,
    Absent,
}

/// Wall-clock span, each end a 24-hour `HH:MM` string. Either end may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[cfg(test)]
impl TimeRange {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
        }
    }
}

/// Validates `raw` as a calendar date and returns its canonical `YYYY-MM-DD` form.
pub fn parse_date(raw: &str) -> Result<(NaiveDate, String), AttendanceError> {
    let t = raw.trim();
    let date = NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .map_err(|_| AttendanceError::InvalidDate(t.to_string()))?;
    let canonical = date.format("%Y-%m-%d").to_string();
    if canonical != t {
        return Err(AttendanceError::InvalidDate(t.to_string()));
    }
    Ok((date, canonical))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkKey {
    pub student_id: String,
    pub date: String,
    pub period: Period,
}

/// Everything a write replaces for one key: status, time range and derived hours.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkValues {
    pub status: MarkStatus,
    pub time_range: Option<TimeRange>,
    pub hours: f64,
}

impl MarkValues {
    /// Absent marks never carry a time range; present marks get hours from theirs.
    pub fn new(status: MarkStatus, time_range: Option<TimeRange>) -> Result<Self, AttendanceError> {
        match status {
            MarkStatus::Absent => Ok(Self {
                status,
                time_range: None,
                hours: 0.0,
            }),
            MarkStatus::Present => {
                let hours = crate::calc::compute_hours(time_range.as_ref())?;
                Ok(Self {
                    status,
                    time_range,
                    hours,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMark {
    pub student_id: String,
    pub date: String,
    pub period: Period,
    pub status: MarkStatus,
    pub time_range: Option<TimeRange>,
    pub hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl AttendanceMark {
    pub fn entry(&self) -> PeriodEntry {
        PeriodEntry {
            status: self.status,
            time_range: self.time_range.clone(),
            hours: self.hours,
        }
    }
}

/// A mark as seen inside a day view, stripped of its key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodEntry {
    pub status: MarkStatus,
    pub time_range: Option<TimeRange>,
    pub hours: f64,
}

impl From<MarkValues> for PeriodEntry {
    fn from(v: MarkValues) -> Self {
        Self {
            status: v.status,
            time_range: v.time_range,
            hours: v.hours,
        }
    }
}

pub type PeriodMarks = BTreeMap<String, PeriodEntry>;

/// One date's marks grouped as period -> student -> entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAttendanceView {
    pub date: String,
    pub periods: BTreeMap<Period, PeriodMarks>,
}

impl DailyAttendanceView {
    /// Marks dated elsewhere are ignored.
    pub fn from_marks<'a, I>(date: &str, marks: I) -> Self
    where
        I: IntoIterator<Item = &'a AttendanceMark>,
    {
        let mut periods: BTreeMap<Period, PeriodMarks> = BTreeMap::new();
        for m in marks {
            if m.date != date {
                continue;
            }
            periods
                .entry(m.period)
                .or_default()
                .insert(m.student_id.clone(), m.entry());
        }
        Self {
            date: date.to_string(),
            periods,
        }
    }

    pub fn period(&self, period: Period) -> Option<&PeriodMarks> {
        self.periods.get(&period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_number: String,
    pub email: String,
    pub seat_row: i64,
    pub seat_column: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(student: &str, date: &str, period: &str, hours: f64) -> AttendanceMark {
        AttendanceMark {
            student_id: student.to_string(),
            date: date.to_string(),
            period: Period::parse(period).expect("period"),
            status: MarkStatus::Present,
            time_range: None,
            hours,
            updated_at: None,
        }
    }

    #[test]
    fn period_accepts_one_through_six_only() {
        assert_eq!(Period::parse("1").expect("p1").as_str(), "1");
        assert_eq!(Period::parse(" 6 ").expect("p6").as_str(), "6");
        assert!(matches!(
            Period::parse("0"),
            Err(AttendanceError::InvalidPeriod(_))
        ));
        assert!(Period::parse("7").is_err());
        assert!(Period::parse("all").is_err());
    }

    #[test]
    fn period_filter_treats_all_as_wildcard() {
        assert_eq!(PeriodFilter::parse(None).expect("none"), PeriodFilter::All);
        assert_eq!(PeriodFilter::parse(Some("all")).expect("all"), PeriodFilter::All);
        assert_eq!(
            PeriodFilter::parse(Some("3")).expect("3"),
            PeriodFilter::Only(Period::parse("3").expect("p3"))
        );
        assert!(PeriodFilter::parse(Some("9")).is_err());
    }

    #[test]
    fn parse_date_requires_canonical_form() {
        let (_, s) = parse_date("2024-03-05").expect("date");
        assert_eq!(s, "2024-03-05");
        assert!(matches!(
            parse_date("2024-3-5"),
            Err(AttendanceError::InvalidDate(_))
        ));
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("03/05/2024").is_err());
    }

    #[test]
    fn absent_values_drop_time_range() {
        let v = MarkValues::new(MarkStatus::Absent, Some(TimeRange::new("09:00", "11:00")))
            .expect("absent");
        assert_eq!(v.time_range, None);
        assert_eq!(v.hours, 0.0);

        let v = MarkValues::new(MarkStatus::Present, Some(TimeRange::new("09:00", "11:00")))
            .expect("present");
        assert_eq!(v.hours, 2.0);
        assert!(v.time_range.is_some());
    }

    #[test]
    fn day_view_groups_by_period_and_skips_other_dates() {
        let marks = vec![
            mark("s1", "2024-03-05", "1", 1.0),
            mark("s2", "2024-03-05", "1", 2.0),
            mark("s1", "2024-03-05", "2", 1.5),
            mark("s1", "2024-03-06", "1", 4.0),
        ];
        let view = DailyAttendanceView::from_marks("2024-03-05", &marks);
        assert_eq!(view.periods.len(), 2);
        let p1 = view.period(Period::parse("1").expect("p1")).expect("period 1");
        assert_eq!(p1.len(), 2);
        assert_eq!(p1["s2"].hours, 2.0);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(MarkStatus::Present).expect("json"),
            serde_json::json!("present")
        );
        let p: Period = serde_json::from_value(serde_json::json!("4")).expect("period");
        assert_eq!(serde_json::to_value(p).expect("json"), serde_json::json!("4"));
    }
}

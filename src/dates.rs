//! Local calendar math in the viewer's timezone.
//!
//! Every day boundary in the crate goes through here so DST transitions
//! are handled in one place.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// First day of the week for `now/w` and weekly grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    /// ISO 8601 week.
    #[default]
    Monday,
    Sunday,
}

/// Calendar day of `instant` as seen in `tz`.
pub fn local_day(instant: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

fn local_naive_to_utc(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => Some(first.min(second).with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// First instant of `day` in `tz`.
///
/// When midnight does not exist (DST jump at 00:00) the day starts at the
/// first valid local time after it.
pub fn local_midnight(day: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    if let Some(dt) = local_naive_to_utc(naive, tz) {
        return dt;
    }
    (1..=4)
        .find_map(|step| local_naive_to_utc(naive + Duration::minutes(30 * step), tz))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Half-open `[start, end)` UTC bounds of a local day.
pub fn day_bounds(day: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = day.succ_opt().unwrap_or(NaiveDate::MAX);
    (local_midnight(day, tz), local_midnight(next, tz))
}

/// Whether `instant` falls inside local `day`.
pub fn is_on_day(instant: DateTime<Utc>, day: NaiveDate, tz: &Tz) -> bool {
    local_day(instant, tz) == day
}

pub fn start_of_week(day: NaiveDate, week_start: WeekStart) -> NaiveDate {
    let offset = match week_start {
        WeekStart::Monday => day.weekday().num_days_from_monday(),
        WeekStart::Sunday => day.weekday().num_days_from_sunday(),
    };
    day - Duration::days(i64::from(offset))
}

pub fn start_of_month(day: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(day.year(), day.month(), 1).unwrap_or(day)
}

/// Last day of the month containing `day`.
pub fn end_of_month(day: NaiveDate) -> NaiveDate {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(day)
}

/// Inclusive range of local days touched by `[start, end)`.
///
/// An end exactly at local midnight does not count the following day.
/// Zero-length or inverted ranges touch only the start day.
pub fn days_spanned(start: DateTime<Utc>, end: DateTime<Utc>, tz: &Tz) -> (NaiveDate, NaiveDate) {
    let first = local_day(start, tz);
    if end <= start {
        return (first, first);
    }
    let last = local_day(end - Duration::nanoseconds(1), tz);
    (first, last.max(first))
}

/// Browser-style timezone offset in minutes (UTC minus local, so UTC+2 is -120).
pub fn timezone_offset_minutes(tz: &Tz, at: DateTime<Utc>) -> i32 {
    let local_minus_utc = at.with_timezone(tz).offset().fix().local_minus_utc();
    -(local_minus_utc / 60)
}

/// Parse an explicit date as the user's filter would carry it.
///
/// Accepts RFC 3339 instants, `YYYY-MM-DD` (local midnight), and
/// `YYYY-MM-DDTHH:MM:SS` without offset (local wall time).
pub fn parse_local_date(value: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(local_midnight(day, tz));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|naive| local_naive_to_utc(naive, tz))
}

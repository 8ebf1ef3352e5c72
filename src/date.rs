//! Loose date parsing and calendar arithmetic.
//!
//! Clients send dates as ISO strings, bare `YYYY-MM-DD` days, local
//! `datetime-local` values or epoch milliseconds. Everything ends up as a
//! [`DateTime<Utc>`] or nothing at all.

use chrono::{
    DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Utc,
};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse any client-provided date into a valid timestamp.
///
/// Date-only strings are read as UTC midnight. Date-times without an offset
/// are read in `tz`. Unparseable input yields `None`.
pub fn parse_date<Tz: TimeZone>(input: &Value, tz: &Tz) -> Option<DateTime<Utc>> {
    match input {
        Value::String(raw) => parse_str(raw.trim(), tz),
        Value::Number(n) => n
            .as_f64()
            .filter(|ms| ms.is_finite())
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64)),
        _ => None,
    }
}

fn parse_str<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }

    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(day.and_time(NaiveTime::MIN).and_utc());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| resolve_local(tz, naive))
        .map(|date| date.with_timezone(&Utc))
}

/// Map a wall-clock time to an instant, stepping over DST gaps.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        tz.from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
    })
}

fn at_time<Tz: TimeZone>(at: &DateTime<Tz>, time: NaiveTime) -> DateTime<Tz> {
    let naive = at.date_naive().and_time(time);
    resolve_local(&at.timezone(), naive).unwrap_or_else(|| at.clone())
}

/// Midnight of the calendar day holding `at`.
pub fn start_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    at_time(at, NaiveTime::MIN)
}

/// Last millisecond of the calendar day holding `at`.
pub fn end_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    at_time(at, time)
}

/// Move `at` by whole calendar days, keeping the wall-clock time.
pub fn add_days<Tz: TimeZone>(at: &DateTime<Tz>, days: i64) -> DateTime<Tz> {
    let shifted = if days >= 0 {
        at.clone().checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        at.clone().checked_sub_days(Days::new(days.unsigned_abs()))
    };

    shifted
        .or_else(|| TimeDelta::try_days(days).and_then(|d| at.clone().checked_add_signed(d)))
        .unwrap_or_else(|| at.clone())
}

pub fn days_ago<Tz: TimeZone>(now: &DateTime<Tz>, days: i64) -> DateTime<Tz> {
    add_days(now, -days)
}

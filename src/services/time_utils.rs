use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::settings::MINUTES_PER_DAY;

/// Parse `HH:MM` into minutes from midnight (0..=1439).
pub fn to_minutes(value: &str) -> AppResult<i64> {
    let (hours, minutes) = value
        .split_once(':')
        .ok_or_else(|| bad_time(value, "expected HH:MM"))?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(bad_time(value, "expected two-digit fields"));
    }
    let hours: i64 = hours
        .parse()
        .map_err(|_| bad_time(value, "hour is not a number"))?;
    let minutes: i64 = minutes
        .parse()
        .map_err(|_| bad_time(value, "minute is not a number"))?;
    if hours > 23 || minutes > 59 {
        return Err(bad_time(value, "out of range"));
    }
    Ok(hours * 60 + minutes)
}

fn bad_time(value: &str, reason: &str) -> AppError {
    AppError::validation_with_details(
        "invalid time of day",
        json!({"value": value, "reason": reason}),
    )
}

/// Format minutes from midnight back to `HH:MM`.
pub fn from_minutes(total: i64) -> String {
    debug_assert!((0..MINUTES_PER_DAY).contains(&total));
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
        AppError::validation_with_details(
            "invalid date",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_timestamp(value: &str) -> AppResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|err| {
        AppError::validation_with_details(
            "invalid timestamp",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

/// Lazy sequence of dates from `from` to `to`. With `inclusive` the end
/// date is yielded too; either way an empty range yields nothing.
pub fn date_range(
    from: NaiveDate,
    to: NaiveDate,
    inclusive: bool,
) -> impl Iterator<Item = NaiveDate> {
    let last = if inclusive {
        to
    } else {
        to.pred_opt().unwrap_or(to)
    };
    from.iter_days().take_while(move |date| *date <= last)
}

/// Day of week with the repository convention Sunday = 0.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Half-open minute-of-day interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> AppResult<Self> {
        if start < 0 || end > MINUTES_PER_DAY || end <= start {
            return Err(AppError::validation_with_details(
                "invalid minute interval",
                json!({"start": start, "end": end}),
            ));
        }
        Ok(Self { start, end })
    }

    pub const FULL_DAY: Interval = Interval {
        start: 0,
        end: MINUTES_PER_DAY,
    };

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Pad both sides by `buffer`, clamped to the day.
    pub fn widen(&self, buffer: i64) -> Interval {
        Interval {
            start: (self.start - buffer).max(0),
            end: (self.end + buffer).min(MINUTES_PER_DAY),
        }
    }
}

/// Sort intervals by start and coalesce overlapping or touching ones.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::services::time_utils;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixedCommitment {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub recurring: bool,
    /// Days of week the commitment recurs on, Sunday = 0. Only meaningful
    /// when `recurring` is true.
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Concrete dates for one-off commitments.
    #[serde(default)]
    pub specific_dates: Vec<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub day_specific_timings: Vec<DaySpecificTiming>,
    #[serde(default)]
    pub deleted_occurrences: Vec<String>,
    /// Per-date overrides keyed by `YYYY-MM-DD`. BTreeMap keeps iteration
    /// order stable across runs.
    #[serde(default)]
    pub modified_occurrences: BTreeMap<String, OccurrenceOverride>,
    #[serde(default = "default_true")]
    pub counts_toward_daily_hours: bool,
}

fn default_true() -> bool {
    true
}

/// Inclusive date range clipping a recurring commitment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Timing override for one day of the week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaySpecificTiming {
    pub day_of_week: u8,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_all_day: Option<bool>,
}

/// Timing override for one concrete date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceOverride {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_all_day: Option<bool>,
}

impl FixedCommitment {
    /// Configuration-time validation. The scheduler requires same-day
    /// intervals, so overnight timings are rejected here rather than
    /// handled downstream.
    pub fn validate(&self) -> AppResult<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("commitment id must not be empty"));
        }

        if self.recurring {
            if self.days_of_week.is_empty() {
                return Err(AppError::validation_with_details(
                    "recurring commitment requires at least one day of week",
                    json!({"commitmentId": self.id}),
                ));
            }
            if self.days_of_week.iter().any(|day| *day > 6) {
                return Err(AppError::validation_with_details(
                    "daysOfWeek entries must be between 0 (Sunday) and 6 (Saturday)",
                    json!({"commitmentId": self.id, "daysOfWeek": self.days_of_week}),
                ));
            }
        } else if self.specific_dates.is_empty() {
            return Err(AppError::validation_with_details(
                "non-recurring commitment requires at least one specific date",
                json!({"commitmentId": self.id}),
            ));
        }

        if let Some(range) = &self.date_range {
            let start = time_utils::parse_date(&range.start)?;
            let end = time_utils::parse_date(&range.end)?;
            if end < start {
                return Err(AppError::validation_with_details(
                    "commitment dateRange end precedes start",
                    json!({"commitmentId": self.id, "start": range.start, "end": range.end}),
                ));
            }
        }

        for date in self
            .specific_dates
            .iter()
            .chain(self.deleted_occurrences.iter())
            .chain(self.modified_occurrences.keys())
        {
            time_utils::parse_date(date)?;
        }

        if !self.is_all_day {
            validate_timing(&self.id, self.start_time.as_deref(), self.end_time.as_deref())?;
        }

        for timing in &self.day_specific_timings {
            if timing.day_of_week > 6 {
                return Err(AppError::validation_with_details(
                    "daySpecificTimings dayOfWeek out of range",
                    json!({"commitmentId": self.id, "dayOfWeek": timing.day_of_week}),
                ));
            }
            if timing.is_all_day != Some(true) {
                validate_optional_timing(
                    &self.id,
                    timing.start_time.as_deref(),
                    timing.end_time.as_deref(),
                )?;
            }
        }

        for (date, patch) in &self.modified_occurrences {
            if patch.is_all_day != Some(true) {
                validate_optional_timing(
                    &self.id,
                    patch.start_time.as_deref(),
                    patch.end_time.as_deref(),
                )
                .map_err(|_| {
                    AppError::validation_with_details(
                        "modifiedOccurrences timing invalid",
                        json!({"commitmentId": self.id, "date": date}),
                    )
                })?;
            }
        }

        Ok(())
    }
}

fn validate_timing(id: &str, start: Option<&str>, end: Option<&str>) -> AppResult<()> {
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(AppError::validation_with_details(
                "timed commitment requires both startTime and endTime",
                json!({"commitmentId": id}),
            ))
        }
    };
    let start_minute = time_utils::to_minutes(start)?;
    let end_minute = time_utils::to_minutes(end)?;
    if end_minute <= start_minute {
        return Err(AppError::validation_with_details(
            "commitment endTime must be after startTime on the same day",
            json!({"commitmentId": id, "startTime": start, "endTime": end}),
        ));
    }
    Ok(())
}

fn validate_optional_timing(id: &str, start: Option<&str>, end: Option<&str>) -> AppResult<()> {
    match (start, end) {
        (None, None) => Ok(()),
        (start, end) => validate_timing(id, start, end),
    }
}

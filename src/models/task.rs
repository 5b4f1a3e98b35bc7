use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::settings::UserSettings;
use crate::services::time_utils;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub estimated_minutes: i64,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub deadline_type: DeadlineType,
    #[serde(default)]
    pub importance: bool,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub target_frequency: TargetFrequency,
    #[serde(default = "default_true")]
    pub respect_frequency_for_deadlines: bool,
    #[serde(default)]
    pub min_session_minutes: Option<i64>,
    #[serde(default)]
    pub max_session_minutes: Option<i64>,
    #[serde(default)]
    pub is_one_sitting: bool,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub preferred_time_slots: Vec<TimeSlot>,
    pub created_at: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DeadlineType {
    Hard,
    Soft,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TargetFrequency {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "3x-week")]
    ThreeTimesWeekly,
    #[serde(rename = "weekly")]
    Weekly,
    #[default]
    #[serde(rename = "flexible")]
    Flexible,
}

/// Coarse bands of the study window a task prefers. The planner treats
/// these as a soft bias, not a constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

impl TaskRecord {
    /// Session length floor, resolving the per-task override against the
    /// settings default.
    pub fn effective_min_session(&self, settings: &UserSettings) -> i64 {
        self.min_session_minutes
            .unwrap_or(settings.min_session_minutes)
            .max(1)
    }

    /// Session length ceiling, resolving the per-task override against the
    /// settings default. Never below the effective minimum.
    pub fn effective_max_session(&self, settings: &UserSettings) -> i64 {
        self.max_session_minutes
            .unwrap_or(settings.max_session_minutes)
            .max(self.effective_min_session(settings))
    }

    pub fn deadline_date(&self) -> AppResult<Option<NaiveDate>> {
        match &self.deadline {
            Some(raw) => Ok(Some(time_utils::parse_date(raw)?)),
            None => Ok(None),
        }
    }

    pub fn start_date_parsed(&self) -> AppResult<Option<NaiveDate>> {
        match &self.start_date {
            Some(raw) => Ok(Some(time_utils::parse_date(raw)?)),
            None => Ok(None),
        }
    }

    /// Input-shape validation. A malformed task aborts the planning call
    /// before any plan is touched.
    pub fn validate(&self) -> AppResult<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("task id must not be empty"));
        }
        if self.estimated_minutes <= 0 {
            return Err(AppError::validation_with_details(
                "task estimatedMinutes must be positive",
                json!({"taskId": self.id, "estimatedMinutes": self.estimated_minutes}),
            ));
        }
        if self.deadline_type != DeadlineType::None && self.deadline.is_none() {
            return Err(AppError::validation_with_details(
                "task with a deadline type requires a deadline date",
                json!({"taskId": self.id}),
            ));
        }
        self.deadline_date()?;
        self.start_date_parsed()?;
        if let (Some(min), Some(max)) = (self.min_session_minutes, self.max_session_minutes) {
            if min > max {
                return Err(AppError::validation_with_details(
                    "task minSessionMinutes exceeds maxSessionMinutes",
                    json!({"taskId": self.id, "min": min, "max": max}),
                ));
            }
        }
        time_utils::parse_timestamp(&self.created_at)?;
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};

pub const MINUTES_PER_DAY: i64 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub daily_available_minutes: i64,
    /// Days of week available for planning, Sunday = 0.
    pub work_days: Vec<u8>,
    pub study_window_start_minute: i64,
    pub study_window_end_minute: i64,
    pub buffer_between_sessions_minutes: i64,
    pub buffer_days_before_deadline: i64,
    pub min_session_minutes: i64,
    pub max_session_minutes: i64,
    #[serde(default)]
    pub study_plan_mode: StudyPlanMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StudyPlanMode {
    #[default]
    Even,
    FrontLoaded,
    Balanced,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            daily_available_minutes: 240,
            work_days: vec![1, 2, 3, 4, 5],
            study_window_start_minute: 9 * 60,
            study_window_end_minute: 18 * 60,
            buffer_between_sessions_minutes: 0,
            buffer_days_before_deadline: 0,
            min_session_minutes: 30,
            max_session_minutes: 120,
            study_plan_mode: StudyPlanMode::Even,
        }
    }
}

impl UserSettings {
    pub fn is_work_day(&self, day_of_week: u8) -> bool {
        self.work_days.contains(&day_of_week)
    }

    pub fn window_minutes(&self) -> i64 {
        self.study_window_end_minute - self.study_window_start_minute
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.study_window_start_minute < 0
            || self.study_window_end_minute > MINUTES_PER_DAY
            || self.study_window_start_minute >= self.study_window_end_minute
        {
            return Err(AppError::validation_with_details(
                "study window must satisfy 0 <= start < end <= 1440",
                json!({
                    "start": self.study_window_start_minute,
                    "end": self.study_window_end_minute,
                }),
            ));
        }
        if self.daily_available_minutes <= 0 {
            return Err(AppError::validation(
                "dailyAvailableMinutes must be positive",
            ));
        }
        if self.buffer_between_sessions_minutes < 0 {
            return Err(AppError::validation(
                "bufferBetweenSessionsMinutes must not be negative",
            ));
        }
        if self.buffer_days_before_deadline < 0 {
            return Err(AppError::validation(
                "bufferDaysBeforeDeadline must not be negative",
            ));
        }
        if self.min_session_minutes <= 0 || self.min_session_minutes > self.max_session_minutes {
            return Err(AppError::validation_with_details(
                "session length bounds must satisfy 0 < min <= max",
                json!({
                    "min": self.min_session_minutes,
                    "max": self.max_session_minutes,
                }),
            ));
        }
        if self.work_days.is_empty() {
            return Err(AppError::validation("workDays must not be empty"));
        }
        if self.work_days.iter().any(|day| *day > 6) {
            return Err(AppError::validation(
                "workDays entries must be between 0 (Sunday) and 6 (Saturday)",
            ));
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::time_utils;

/// One planned work interval for one task on one date. Sessions carry no
/// standalone id; `(task_id, session_number)` identifies a session within
/// its plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub task_id: String,
    pub plan_date: String,
    pub session_number: u32,
    pub start_time: String,
    pub end_time: String,
    pub allocated_minutes: i64,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub actual_minutes: Option<i64>,
    #[serde(default)]
    pub is_manual_override: bool,
    #[serde(default)]
    pub original_date: Option<String>,
    #[serde(default)]
    pub original_start_time: Option<String>,
    #[serde(default)]
    pub original_end_time: Option<String>,
    #[serde(default)]
    pub rescheduled_at: Option<String>,
    #[serde(default)]
    pub reschedule_history: Vec<RescheduleEntry>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub skipped_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Completed,
    SkippedUser,
    SkippedSystem,
    Missed,
    Redistributed,
    Failed,
}

impl SessionStatus {
    /// Skipped sessions keep their slot in the plan but drop out of the
    /// daily total.
    pub fn is_skipped(self) -> bool {
        matches!(self, SessionStatus::SkippedUser | SessionStatus::SkippedSystem)
    }

    /// Work that occupies real time on its date. Skipped sessions and the
    /// `redistributed`/`failed` tombstones left behind by re-planning hold
    /// no slot.
    pub fn counts_toward_daily_total(self) -> bool {
        matches!(
            self,
            SessionStatus::Scheduled | SessionStatus::Completed | SessionStatus::Missed
        )
    }

    /// Work that no longer needs re-planning: executed or deliberately
    /// waived by the user or the system.
    pub fn accounts_completed_work(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::SkippedUser | SessionStatus::SkippedSystem
        )
    }
}

/// One entry of a session's movement audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleEntry {
    pub from_date: String,
    pub from_start: String,
    pub from_end: String,
    pub to_date: String,
    pub to_start: String,
    pub to_end: String,
    pub reason: RescheduleReason,
    /// The engine's supplied `today` at the time of the change, never the
    /// wall clock.
    pub recorded_on: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RescheduleReason {
    ManualMove,
    Redistribution,
    PartialSkip,
}

/// Composite key addressing one session inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub task_id: String,
    pub session_number: u32,
}

impl StudySession {
    pub fn start_minute(&self) -> AppResult<i64> {
        time_utils::to_minutes(&self.start_time)
    }

    pub fn end_minute(&self) -> AppResult<i64> {
        time_utils::to_minutes(&self.end_time)
    }

    pub fn interval(&self) -> AppResult<time_utils::Interval> {
        time_utils::Interval::new(self.start_minute()?, self.end_minute()?)
    }

    pub fn matches(&self, reference: &SessionRef) -> bool {
        self.task_id == reference.task_id && self.session_number == reference.session_number
    }

    /// Capture the pre-move coordinates the first time the session is
    /// displaced; later moves keep the original anchor.
    pub fn remember_origin(&mut self) {
        if self.original_date.is_none() {
            self.original_date = Some(self.plan_date.clone());
            self.original_start_time = Some(self.start_time.clone());
            self.original_end_time = Some(self.end_time.clone());
        }
    }
}

/// The ordered set of sessions for a single date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub date: String,
    pub planned_tasks: Vec<StudySession>,
    pub total_scheduled_minutes: i64,
}

impl StudyPlan {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            planned_tasks: Vec::new(),
            total_scheduled_minutes: 0,
        }
    }

    /// Sort sessions by start time and refresh the non-skipped total.
    pub fn normalize(&mut self) -> AppResult<()> {
        let mut keyed = Vec::with_capacity(self.planned_tasks.len());
        for session in self.planned_tasks.drain(..) {
            let start = time_utils::to_minutes(&session.start_time)?;
            keyed.push((start, session));
        }
        keyed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.task_id.cmp(&b.1.task_id))
                .then_with(|| a.1.session_number.cmp(&b.1.session_number))
        });
        self.planned_tasks = keyed.into_iter().map(|(_, session)| session).collect();
        self.total_scheduled_minutes = self
            .planned_tasks
            .iter()
            .filter(|session| session.status.counts_toward_daily_total())
            .map(|session| session.allocated_minutes)
            .sum();
        Ok(())
    }

    pub fn find_session(&self, reference: &SessionRef) -> Option<&StudySession> {
        self.planned_tasks
            .iter()
            .find(|session| session.matches(reference))
    }

    pub fn find_session_mut(&mut self, reference: &SessionRef) -> Option<&mut StudySession> {
        self.planned_tasks
            .iter_mut()
            .find(|session| session.matches(reference))
    }
}

/// Locate a plan by date inside a sorted plan set.
pub fn find_plan<'a>(plans: &'a [StudyPlan], date: &str) -> Option<&'a StudyPlan> {
    plans.iter().find(|plan| plan.date == date)
}

pub fn find_plan_mut<'a>(plans: &'a mut [StudyPlan], date: &str) -> Option<&'a mut StudyPlan> {
    plans.iter_mut().find(|plan| plan.date == date)
}

/// Fetch or create the plan for a date, keeping the plan set ordered.
pub fn plan_entry<'a>(plans: &'a mut Vec<StudyPlan>, date: &str) -> &'a mut StudyPlan {
    if let Some(position) = plans.iter().position(|plan| plan.date == date) {
        return &mut plans[position];
    }
    let insert_at = plans
        .iter()
        .position(|plan| plan.date.as_str() > date)
        .unwrap_or(plans.len());
    plans.insert(insert_at, StudyPlan::new(date));
    &mut plans[insert_at]
}

/// Sort every plan, recompute totals, and drop plans left without
/// sessions.
pub fn normalize_plans(plans: &mut Vec<StudyPlan>) -> AppResult<()> {
    for plan in plans.iter_mut() {
        plan.normalize()?;
    }
    plans.retain(|plan| !plan.planned_tasks.is_empty());
    plans.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(())
}

/// Next 1-based session number for a task across the whole plan set.
pub fn next_session_number(plans: &[StudyPlan], task_id: &str) -> u32 {
    plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .filter(|session| session.task_id == task_id)
        .map(|session| session.session_number)
        .max()
        .map(|highest| highest + 1)
        .unwrap_or(1)
}

pub fn session_not_found(reference: &SessionRef, date: &str) -> AppError {
    AppError::validation_with_details(
        "session not found in plan",
        serde_json::json!({
            "taskId": reference.task_id,
            "sessionNumber": reference.session_number,
            "planDate": date,
        }),
    )
}

pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use error::AppResult;
use models::commitment::FixedCommitment;
use models::planning::{MoveOutcome, PlanResult, RedistributionResult, SkipMode, Slot, SlotValidation};
use models::session::{self, SessionRef, StudyPlan, StudySession};
use models::settings::UserSettings;
use models::task::TaskRecord;
use services::commitment_expander::CommitmentExpander;
use services::planner_service::PlannerService;
use services::redistribution_service::RedistributionService;
use services::session_service::SessionService;
use services::slot_finder::SlotFinder;
use services::time_utils;

/// Build a fresh plan set for the given tasks.
pub fn generate_initial_plan(
    tasks: &[TaskRecord],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    today: &str,
) -> AppResult<PlanResult> {
    PlannerService::generate_initial_plan(tasks, settings, commitments, today)
}

/// Re-plan the remaining work of every task with missed sessions.
pub fn redistribute(
    plans: &[StudyPlan],
    tasks: &[TaskRecord],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    today: &str,
) -> AppResult<RedistributionResult> {
    RedistributionService::redistribute(plans, tasks, settings, commitments, today)
}

/// Check one candidate interval against every scheduling constraint.
#[allow(clippy::too_many_arguments)]
pub fn validate_slot(
    date: &str,
    start_time: &str,
    end_time: &str,
    plans: &[StudyPlan],
    commitments: &[FixedCommitment],
    settings: &UserSettings,
    exclude_session: Option<&SessionRef>,
    is_all_day: bool,
) -> AppResult<SlotValidation> {
    settings.validate()?;
    let parsed = time_utils::parse_date(date)?;
    let start = time_utils::to_minutes(start_time)?;
    let end = time_utils::to_minutes(end_time)?;
    let expander = CommitmentExpander::new(commitments);
    let finder = SlotFinder::new(settings, &expander);
    finder.validate(
        parsed,
        start,
        end,
        sessions_on(plans, date),
        exclude_session,
        is_all_day,
    )
}

/// Earliest legal interval of `duration_minutes` on `date`, if any.
/// With `is_all_day` the question becomes whether the whole day is
/// free: the full study window is returned only when nothing occupies
/// the date.
pub fn find_slot(
    date: &str,
    duration_minutes: i64,
    plans: &[StudyPlan],
    commitments: &[FixedCommitment],
    settings: &UserSettings,
    is_all_day: bool,
) -> AppResult<Option<Slot>> {
    settings.validate()?;
    let parsed = time_utils::parse_date(date)?;
    let expander = CommitmentExpander::new(commitments);
    let finder = SlotFinder::new(settings, &expander);
    let existing = sessions_on(plans, date);
    if is_all_day {
        let occupied = existing
            .iter()
            .any(|session| session.status.counts_toward_daily_total())
            || !expander.busy_intervals(parsed)?.is_empty();
        if occupied {
            return Ok(None);
        }
        return Ok(Some(Slot {
            start_minute: settings.study_window_start_minute,
            end_minute: settings.study_window_end_minute,
        }));
    }
    finder.find_earliest_slot(parsed, duration_minutes, existing)
}

/// Mark one session as executed.
pub fn mark_completed(
    plans: &[StudyPlan],
    plan_date: &str,
    task_id: &str,
    session_number: u32,
    actual_minutes: Option<i64>,
) -> AppResult<Vec<StudyPlan>> {
    let reference = SessionRef {
        task_id: task_id.to_string(),
        session_number,
    };
    SessionService::mark_completed(plans, plan_date, &reference, actual_minutes)
}

/// Skip one session fully or partially.
#[allow(clippy::too_many_arguments)]
pub fn skip_session(
    plans: &[StudyPlan],
    tasks: &[TaskRecord],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    plan_date: &str,
    task_id: &str,
    session_number: u32,
    mode: SkipMode,
    reason: &str,
    today: &str,
) -> AppResult<Vec<StudyPlan>> {
    let reference = SessionRef {
        task_id: task_id.to_string(),
        session_number,
    };
    SessionService::skip_session(
        plans,
        tasks,
        settings,
        commitments,
        plan_date,
        &reference,
        mode,
        reason,
        today,
    )
}

/// Manually move a session within its day.
#[allow(clippy::too_many_arguments)]
pub fn move_session(
    plans: &[StudyPlan],
    commitments: &[FixedCommitment],
    settings: &UserSettings,
    plan_date: &str,
    task_id: &str,
    session_number: u32,
    target_date: &str,
    target_start: &str,
    today: &str,
) -> AppResult<(Vec<StudyPlan>, MoveOutcome)> {
    let reference = SessionRef {
        task_id: task_id.to_string(),
        session_number,
    };
    SessionService::move_session(
        plans,
        commitments,
        settings,
        plan_date,
        &reference,
        target_date,
        target_start,
        today,
    )
}

fn sessions_on<'a>(plans: &'a [StudyPlan], date: &str) -> &'a [StudySession] {
    session::find_plan(plans, date)
        .map(|plan| plan.planned_tasks.as_slice())
        .unwrap_or(&[])
}

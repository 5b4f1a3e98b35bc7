use chrono::Duration;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::commitment::FixedCommitment;
use crate::models::planning::{MoveOutcome, MoveRejection, SkipMode, Slot};
use crate::models::session::{
    self, next_session_number, normalize_plans, session_not_found, RescheduleEntry,
    RescheduleReason, SessionRef, SessionStatus, StudyPlan,
};
use crate::models::settings::UserSettings;
use crate::models::task::TaskRecord;
use crate::services::commitment_expander::CommitmentExpander;
use crate::services::planner_service::{self, DEFAULT_HORIZON_DAYS};
use crate::services::slot_finder::SlotFinder;
use crate::services::time_utils;

/// Execution-mark and user-edit operations over a plan set. Every
/// operation takes the plans as an immutable snapshot and returns the
/// updated set.
pub struct SessionService;

impl SessionService {
    /// Record an executed session. `actual_minutes` captures the real
    /// duration; accounting stays on `allocated_minutes`.
    pub fn mark_completed(
        plans: &[StudyPlan],
        plan_date: &str,
        reference: &SessionRef,
        actual_minutes: Option<i64>,
    ) -> AppResult<Vec<StudyPlan>> {
        if let Some(minutes) = actual_minutes {
            if minutes <= 0 {
                return Err(AppError::validation("actualMinutes must be positive"));
            }
        }

        let mut working = plans.to_vec();
        let plan =
            session::find_plan_mut(&mut working, plan_date).ok_or_else(AppError::not_found)?;
        let session = plan
            .find_session_mut(reference)
            .ok_or_else(|| session_not_found(reference, plan_date))?;

        match session.status {
            SessionStatus::Scheduled | SessionStatus::Missed => {}
            status => {
                return Err(AppError::conflict(format!(
                    "session cannot be completed from status {:?}",
                    status
                )))
            }
        }

        session.status = SessionStatus::Completed;
        session.actual_minutes = actual_minutes;
        info!(
            target: "app::sessions",
            task_id = %reference.task_id,
            session = reference.session_number,
            date = %plan_date,
            "session completed"
        );

        normalize_plans(&mut working)?;
        Ok(working)
    }

    /// Skip a scheduled session, either entirely or keeping its first
    /// `minutes`. The partial remainder is re-planned through the slot
    /// finder on the same day, then on subsequent eligible days; a
    /// remainder with no home is emitted as a failed session so the
    /// unscheduled work stays visible.
    #[allow(clippy::too_many_arguments)]
    pub fn skip_session(
        plans: &[StudyPlan],
        tasks: &[TaskRecord],
        settings: &UserSettings,
        commitments: &[FixedCommitment],
        plan_date: &str,
        reference: &SessionRef,
        mode: SkipMode,
        reason: &str,
        today: &str,
    ) -> AppResult<Vec<StudyPlan>> {
        settings.validate()?;
        time_utils::parse_date(today)?;

        let mut working = plans.to_vec();
        let plan =
            session::find_plan_mut(&mut working, plan_date).ok_or_else(AppError::not_found)?;
        let session = plan
            .find_session_mut(reference)
            .ok_or_else(|| session_not_found(reference, plan_date))?;

        if session.status != SessionStatus::Scheduled {
            return Err(AppError::conflict(format!(
                "only scheduled sessions can be skipped, found {:?}",
                session.status
            )));
        }

        match mode {
            SkipMode::Full => {
                session.status = SessionStatus::SkippedUser;
                session.skip_reason = Some(reason.to_string());
                session.skipped_at = Some(today.to_string());
                info!(
                    target: "app::sessions",
                    task_id = %reference.task_id,
                    session = reference.session_number,
                    "session skipped"
                );
            }
            SkipMode::Partial(kept_minutes) => {
                if kept_minutes <= 0 || kept_minutes >= session.allocated_minutes {
                    return Err(AppError::validation_with_details(
                        "partial skip must keep between 1 minute and the session length",
                        json!({
                            "keptMinutes": kept_minutes,
                            "allocatedMinutes": session.allocated_minutes,
                        }),
                    ));
                }

                let remainder = session.allocated_minutes - kept_minutes;
                let original_start = session.start_time.clone();
                let original_end = session.end_time.clone();
                let start_minute = session.start_minute()?;

                session.end_time = time_utils::from_minutes(start_minute + kept_minutes);
                session.allocated_minutes = kept_minutes;
                session.skip_reason = Some(reason.to_string());
                session.skipped_at = Some(today.to_string());

                place_partial_remainder(
                    &mut working,
                    tasks,
                    settings,
                    commitments,
                    reference,
                    plan_date,
                    remainder,
                    &original_start,
                    &original_end,
                    today,
                )?;
            }
        }

        normalize_plans(&mut working)?;
        let expander = CommitmentExpander::new(commitments);
        planner_service::verify_invariants(&working, tasks, settings, &expander)?;
        Ok(working)
    }

    /// Move a scheduled session within its day. Cross-day moves are
    /// rejected; the landing position comes from the nearest-slot
    /// search so a drop on occupied space slides to the closest legal
    /// minute.
    #[allow(clippy::too_many_arguments)]
    pub fn move_session(
        plans: &[StudyPlan],
        commitments: &[FixedCommitment],
        settings: &UserSettings,
        plan_date: &str,
        reference: &SessionRef,
        target_date: &str,
        target_start: &str,
        today: &str,
    ) -> AppResult<(Vec<StudyPlan>, MoveOutcome)> {
        settings.validate()?;
        let date = time_utils::parse_date(plan_date)?;
        time_utils::parse_date(target_date)?;
        let target_minute = time_utils::to_minutes(target_start)?;
        time_utils::parse_date(today)?;

        let mut working = plans.to_vec();
        let plan =
            session::find_plan_mut(&mut working, plan_date).ok_or_else(AppError::not_found)?;
        let session = plan
            .find_session(reference)
            .ok_or_else(|| session_not_found(reference, plan_date))?;

        if session.status != SessionStatus::Scheduled {
            warn!(
                target: "app::sessions",
                task_id = %reference.task_id,
                status = ?session.status,
                "rejecting move of non-scheduled session"
            );
            return Ok((
                plans.to_vec(),
                MoveOutcome::Rejected {
                    reason: MoveRejection::SessionNotMovable,
                    conflicts: Vec::new(),
                },
            ));
        }

        if target_date != plan_date {
            debug!(
                target: "app::sessions",
                from = %plan_date,
                to = %target_date,
                "rejecting cross-day move"
            );
            return Ok((
                plans.to_vec(),
                MoveOutcome::Rejected {
                    reason: MoveRejection::CrossDayMoveNotAllowed,
                    conflicts: Vec::new(),
                },
            ));
        }

        let duration = session.allocated_minutes;
        let expander = CommitmentExpander::new(commitments);
        let finder = SlotFinder::new(settings, &expander);

        let found = finder.find_nearest_slot(
            date,
            duration,
            target_minute,
            &plan.planned_tasks,
            Some(reference),
        )?;

        let Some((slot, placement)) = found else {
            let validation = finder.validate(
                date,
                target_minute,
                target_minute + duration,
                &plan.planned_tasks,
                Some(reference),
                false,
            )?;
            return Ok((
                plans.to_vec(),
                MoveOutcome::Rejected {
                    reason: MoveRejection::NoSlotAvailable,
                    conflicts: validation.conflicts,
                },
            ));
        };

        let session = plan
            .find_session_mut(reference)
            .ok_or_else(|| session_not_found(reference, plan_date))?;
        let from_start = session.start_time.clone();
        let from_end = session.end_time.clone();
        session.remember_origin();
        session.start_time = slot.start_time();
        session.end_time = slot.end_time();
        session.is_manual_override = true;
        session.rescheduled_at = Some(today.to_string());
        session.reschedule_history.push(RescheduleEntry {
            from_date: plan_date.to_string(),
            from_start,
            from_end,
            to_date: plan_date.to_string(),
            to_start: slot.start_time(),
            to_end: slot.end_time(),
            reason: RescheduleReason::ManualMove,
            recorded_on: today.to_string(),
        });

        info!(
            target: "app::sessions",
            task_id = %reference.task_id,
            session = reference.session_number,
            start = %slot.start_time(),
            placement = ?placement,
            "session moved"
        );

        normalize_plans(&mut working)?;
        planner_service::verify_invariants(&working, &[], settings, &expander)?;
        Ok((working, MoveOutcome::Moved { placement, slot }))
    }
}

/// Find a home for the unworked tail of a partially skipped session:
/// same day first, then later eligible days. Falls back to a failed
/// marker on the original day.
#[allow(clippy::too_many_arguments)]
fn place_partial_remainder(
    working: &mut Vec<StudyPlan>,
    tasks: &[TaskRecord],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    reference: &SessionRef,
    plan_date: &str,
    remainder: i64,
    original_start: &str,
    original_end: &str,
    today: &str,
) -> AppResult<()> {
    let expander = CommitmentExpander::new(commitments);
    let finder = SlotFinder::new(settings, &expander);

    let start_date = time_utils::parse_date(plan_date)?;
    let task = tasks.iter().find(|task| task.id == reference.task_id);
    let end_date = match task.map(|task| task.deadline_date()).transpose()?.flatten() {
        Some(deadline) => deadline - Duration::days(settings.buffer_days_before_deadline),
        None => start_date + Duration::days(DEFAULT_HORIZON_DAYS - 1),
    };

    let number = next_session_number(working, &reference.task_id);
    let history = RescheduleEntry {
        from_date: plan_date.to_string(),
        from_start: original_start.to_string(),
        from_end: original_end.to_string(),
        to_date: String::new(),
        to_start: String::new(),
        to_end: String::new(),
        reason: RescheduleReason::PartialSkip,
        recorded_on: today.to_string(),
    };

    for date in time_utils::date_range(start_date, end_date, true) {
        let date_key = time_utils::format_date(date);
        let empty: &[crate::models::session::StudySession] = &[];
        let existing = session::find_plan(working, &date_key)
            .map(|plan| plan.planned_tasks.as_slice())
            .unwrap_or(empty);
        if let Some(slot) = finder.find_earliest_slot(date, remainder, existing)? {
            let mut placed = planner_service::new_session(&reference.task_id, &date_key, number, slot);
            placed.rescheduled_at = Some(today.to_string());
            placed.reschedule_history = vec![RescheduleEntry {
                to_date: date_key.clone(),
                to_start: slot.start_time(),
                to_end: slot.end_time(),
                ..history.clone()
            }];
            session::plan_entry(working, &date_key)
                .planned_tasks
                .push(placed);
            debug!(
                target: "app::sessions",
                task_id = %reference.task_id,
                date = %date_key,
                remainder,
                "partial-skip remainder placed"
            );
            return Ok(());
        }
    }

    // Nowhere to put the remainder: surface it as failed work on the
    // original day, occupying the tail of the original interval.
    warn!(
        target: "app::sessions",
        task_id = %reference.task_id,
        remainder,
        "partial-skip remainder could not be placed"
    );
    let tail_start = time_utils::to_minutes(original_end)? - remainder;
    let mut failed = planner_service::new_session(
        &reference.task_id,
        plan_date,
        number,
        Slot {
            start_minute: tail_start,
            end_minute: tail_start + remainder,
        },
    );
    failed.status = SessionStatus::Failed;
    failed.skipped_at = Some(today.to_string());
    session::plan_entry(working, plan_date)
        .planned_tasks
        .push(failed);
    Ok(())
}

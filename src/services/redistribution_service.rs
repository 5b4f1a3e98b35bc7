use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::commitment::FixedCommitment;
use crate::models::planning::{
    RedistributionEntry, RedistributionOutcome, RedistributionReport, RedistributionResult,
    RemovedSession,
};
use crate::models::session::{
    self, next_session_number, normalize_plans, RescheduleEntry, RescheduleReason, SessionStatus,
    StudyPlan, StudySession,
};
use crate::models::settings::UserSettings;
use crate::models::task::{TaskRecord, TaskStatus};
use crate::services::commitment_expander::CommitmentExpander;
use crate::services::planner_service::{
    self, eligible_days, find_slot_for_task, new_session, unscheduled_record,
};
use crate::services::slot_finder::SlotFinder;
use crate::services::time_utils;

/// Rebuilds the remaining work of tasks with missed sessions, at task
/// granularity, while leaving completed work, untouched tasks, and
/// manual placements alone. Operates on a snapshot and swaps atomically:
/// the input plans are never mutated.
pub struct RedistributionService;

impl RedistributionService {
    pub fn redistribute(
        plans: &[StudyPlan],
        tasks: &[TaskRecord],
        settings: &UserSettings,
        commitments: &[FixedCommitment],
        today: &str,
    ) -> AppResult<RedistributionResult> {
        settings.validate()?;
        for commitment in commitments {
            commitment.validate()?;
        }
        for task in tasks {
            task.validate()?;
        }
        let today_date = time_utils::parse_date(today)?;
        let today_key = time_utils::format_date(today_date);

        let expander = CommitmentExpander::new(commitments);
        let finder = SlotFinder::new(settings, &expander);

        let mut working: Vec<StudyPlan> = plans.to_vec();
        let mut report = RedistributionReport::default();

        report.missed_sessions_found = mark_missed(&mut working, &today_key);

        let task_index: HashMap<&str, &TaskRecord> =
            tasks.iter().map(|task| (task.id.as_str(), task)).collect();

        let mut affected: Vec<&TaskRecord> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for plan in &working {
            for session in &plan.planned_tasks {
                if session.status != SessionStatus::Missed {
                    continue;
                }
                let Some(&task) = task_index.get(session.task_id.as_str()) else {
                    continue;
                };
                if task.status == TaskStatus::Pending && seen.insert(task.id.as_str()) {
                    affected.push(task);
                }
            }
        }
        order_affected(&mut affected)?;

        info!(
            target: "app::redistribution",
            missed = report.missed_sessions_found,
            affected_tasks = affected.len(),
            "redistribution scan complete"
        );

        for task in affected {
            let entry = replan_task(
                &finder,
                &mut working,
                task,
                settings,
                today_date,
                &today_key,
            )?;
            report.total_replanned_minutes += entry.placed_minutes;
            report.total_unplaced_minutes += entry.unplaced_minutes;
            report.entries.push(entry);
        }

        normalize_plans(&mut working)?;
        planner_service::verify_invariants(&working, tasks, settings, &expander)?;

        Ok(RedistributionResult {
            plans: working,
            report,
        })
    }
}

/// Mark every unexecuted session on a past date as missed. Idempotent:
/// already-terminal sessions are left alone. Returns how many missed
/// sessions exist on past dates afterwards.
fn mark_missed(plans: &mut [StudyPlan], today_key: &str) -> usize {
    let mut missed = 0;
    for plan in plans.iter_mut() {
        if plan.date.as_str() >= today_key {
            continue;
        }
        for session in plan.planned_tasks.iter_mut() {
            if session.status == SessionStatus::Scheduled {
                debug!(
                    target: "app::redistribution",
                    task_id = %session.task_id,
                    session = session.session_number,
                    date = %plan.date,
                    "marking session missed"
                );
                session.status = SessionStatus::Missed;
            }
            if session.status == SessionStatus::Missed {
                missed += 1;
            }
        }
    }
    missed
}

/// Importance first, then nearer deadlines, then older tasks.
fn order_affected(tasks: &mut [&TaskRecord]) -> AppResult<()> {
    let mut keys: HashMap<String, (u8, String, chrono::DateTime<chrono::FixedOffset>)> =
        HashMap::new();
    for task in tasks.iter() {
        let importance_rank = if task.importance { 0 } else { 1 };
        let deadline = task.deadline.clone().unwrap_or_else(|| "9999-12-31".to_string());
        let created = time_utils::parse_timestamp(&task.created_at)?;
        keys.insert(task.id.clone(), (importance_rank, deadline, created));
    }
    tasks.sort_by(|a, b| {
        let ka = &keys[&a.id];
        let kb = &keys[&b.id];
        ka.cmp(kb).then_with(|| a.id.cmp(&b.id))
    });
    Ok(())
}

fn replan_task(
    finder: &SlotFinder,
    working: &mut Vec<StudyPlan>,
    task: &TaskRecord,
    settings: &UserSettings,
    today: NaiveDate,
    today_key: &str,
) -> AppResult<RedistributionEntry> {
    let accounting = task_accounting(working, &task.id, today_key);
    let remaining =
        task.estimated_minutes - accounting.completed_minutes - accounting.manual_future_minutes;

    let mut removed = remove_replannable_sessions(working, &task.id, today_key);
    debug!(
        target: "app::redistribution",
        task_id = %task.id,
        removed = removed.len(),
        remaining,
        "task gathered for re-planning"
    );

    if remaining <= 0 {
        let entry = RedistributionEntry {
            task_id: task.id.clone(),
            outcome: RedistributionOutcome::NothingRemaining,
            reason: None,
            removed: into_log(removed, SessionStatus::Redistributed),
            placed_minutes: 0,
            unplaced_minutes: 0,
            urgency: None,
            suggestions: Vec::new(),
        };
        return Ok(entry);
    }

    // Days already carrying preserved sessions of this task (completed
    // today, manual placements) are not re-planned over in the first
    // pass.
    let occupied: HashSet<String> = working
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .filter(|session| session.task_id == task.id)
        .filter(|session| session.status.counts_toward_daily_total())
        .map(|session| session.plan_date.clone())
        .collect();
    let eligible: Vec<NaiveDate> = eligible_days(task, settings, today)?
        .into_iter()
        .filter(|date| !occupied.contains(&time_utils::format_date(*date)))
        .collect();

    if eligible.is_empty() {
        warn!(
            target: "app::redistribution",
            task_id = %task.id,
            "no eligible days before deadline"
        );
        restore_failed(working, &mut removed);
        let record = unscheduled_record(task, settings, remaining, today)?;
        return Ok(RedistributionEntry {
            task_id: task.id.clone(),
            outcome: RedistributionOutcome::Failed,
            reason: Some("no_days_before_deadline".to_string()),
            removed: into_log(removed, SessionStatus::Failed),
            placed_minutes: 0,
            unplaced_minutes: remaining,
            urgency: Some(record.urgency),
            suggestions: record.suggestions,
        });
    }

    let origins: Vec<(String, String, String)> = removed
        .iter()
        .map(|session| {
            (
                session.plan_date.clone(),
                session.start_time.clone(),
                session.end_time.clone(),
            )
        })
        .collect();

    let placed = if task.is_one_sitting {
        place_one_sitting(finder, working, task, &eligible, remaining, today_key, &origins)?
    } else {
        place_spread(
            finder, working, task, settings, &eligible, remaining, today_key, &origins,
        )?
    };

    if placed == 0 {
        warn!(
            target: "app::redistribution",
            task_id = %task.id,
            remaining,
            "no slots available, restoring removed sessions as failed"
        );
        restore_failed(working, &mut removed);
        let record = unscheduled_record(task, settings, remaining, today)?;
        return Ok(RedistributionEntry {
            task_id: task.id.clone(),
            outcome: RedistributionOutcome::Failed,
            reason: Some("no_slots_available".to_string()),
            removed: into_log(removed, SessionStatus::Failed),
            placed_minutes: 0,
            unplaced_minutes: remaining,
            urgency: Some(record.urgency),
            suggestions: record.suggestions,
        });
    }

    let unplaced = remaining - placed;
    let entry = if unplaced > 0 {
        let record = unscheduled_record(task, settings, unplaced, today)?;
        RedistributionEntry {
            task_id: task.id.clone(),
            outcome: RedistributionOutcome::PartialFailure,
            reason: Some("partial_failure".to_string()),
            removed: into_log(removed, SessionStatus::Redistributed),
            placed_minutes: placed,
            unplaced_minutes: unplaced,
            urgency: Some(record.urgency),
            suggestions: record.suggestions,
        }
    } else {
        RedistributionEntry {
            task_id: task.id.clone(),
            outcome: RedistributionOutcome::Rescheduled,
            reason: None,
            removed: into_log(removed, SessionStatus::Redistributed),
            placed_minutes: placed,
            unplaced_minutes: 0,
            urgency: None,
            suggestions: Vec::new(),
        }
    };
    Ok(entry)
}

struct TaskAccounting {
    completed_minutes: i64,
    manual_future_minutes: i64,
}

fn task_accounting(plans: &[StudyPlan], task_id: &str, today_key: &str) -> TaskAccounting {
    let mut completed = 0;
    let mut manual_future = 0;
    for plan in plans {
        for session in &plan.planned_tasks {
            if session.task_id != task_id {
                continue;
            }
            if session.status.accounts_completed_work() {
                completed += session.allocated_minutes;
            } else if session.status == SessionStatus::Scheduled
                && session.is_manual_override
                && plan.date.as_str() >= today_key
            {
                manual_future += session.allocated_minutes;
            }
        }
    }
    TaskAccounting {
        completed_minutes: completed,
        manual_future_minutes: manual_future,
    }
}

/// Pull out every session the re-plan owns: missed ones, and future
/// scheduled ones the user has not manually placed.
fn remove_replannable_sessions(
    plans: &mut [StudyPlan],
    task_id: &str,
    today_key: &str,
) -> Vec<StudySession> {
    let mut removed = Vec::new();
    for plan in plans.iter_mut() {
        let future = plan.date.as_str() >= today_key;
        let mut index = 0;
        while index < plan.planned_tasks.len() {
            let session = &plan.planned_tasks[index];
            let replannable = session.task_id == task_id
                && (session.status == SessionStatus::Missed
                    || (future
                        && session.status == SessionStatus::Scheduled
                        && !session.is_manual_override));
            if replannable {
                removed.push(plan.planned_tasks.remove(index));
            } else {
                index += 1;
            }
        }
    }
    removed
}

fn restore_failed(plans: &mut Vec<StudyPlan>, removed: &mut [StudySession]) {
    for session in removed.iter_mut() {
        session.status = SessionStatus::Failed;
        let date = session.plan_date.clone();
        session::plan_entry(plans, &date)
            .planned_tasks
            .push(session.clone());
    }
}

fn into_log(removed: Vec<StudySession>, status: SessionStatus) -> Vec<RemovedSession> {
    removed
        .into_iter()
        .map(|mut session| {
            session.status = status;
            RemovedSession { session }
        })
        .collect()
}

fn reschedule_history(
    origins: &[(String, String, String)],
    to: &StudySession,
    today_key: &str,
) -> Vec<RescheduleEntry> {
    origins
        .iter()
        .map(|(date, start, end)| RescheduleEntry {
            from_date: date.clone(),
            from_start: start.clone(),
            from_end: end.clone(),
            to_date: to.plan_date.clone(),
            to_start: to.start_time.clone(),
            to_end: to.end_time.clone(),
            reason: RescheduleReason::Redistribution,
            recorded_on: today_key.to_string(),
        })
        .collect()
}

fn place_one_sitting(
    finder: &SlotFinder,
    working: &mut Vec<StudyPlan>,
    task: &TaskRecord,
    eligible: &[NaiveDate],
    remaining: i64,
    today_key: &str,
    origins: &[(String, String, String)],
) -> AppResult<i64> {
    let number = next_session_number(working, &task.id);
    for date in eligible {
        if let Some(slot) = find_slot_for_task(finder, working, task, *date, remaining)? {
            let date_key = time_utils::format_date(*date);
            let mut placed = new_session(&task.id, &date_key, number, slot);
            placed.rescheduled_at = Some(today_key.to_string());
            placed.reschedule_history = reschedule_history(origins, &placed, today_key);
            session::plan_entry(working, &date_key)
                .planned_tasks
                .push(placed);
            return Ok(remaining);
        }
    }
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
fn place_spread(
    finder: &SlotFinder,
    working: &mut Vec<StudyPlan>,
    task: &TaskRecord,
    settings: &UserSettings,
    eligible: &[NaiveDate],
    remaining: i64,
    today_key: &str,
    origins: &[(String, String, String)],
) -> AppResult<i64> {
    let eff_min = task.effective_min_session(settings);
    let eff_max = task.effective_max_session(settings);
    let count = eligible.len() as i64;
    let size = ((remaining + count - 1) / count).clamp(eff_min, eff_max);

    let mut budget = remaining;
    let mut number = next_session_number(working, &task.id);
    let mut used_days: Vec<NaiveDate> = Vec::new();

    for date in eligible {
        if budget == 0 {
            break;
        }
        let chunk = size.min(budget);
        if place_chunk(
            finder, working, task, *date, chunk, &mut number, today_key, origins,
        )? {
            budget -= chunk;
            used_days.push(*date);
        }
    }

    // Second pass: a second session on each already-used day, up to the
    // session maximum, still honouring every placement rule.
    if budget > 0 {
        for date in &used_days {
            if budget == 0 {
                break;
            }
            let chunk = budget.min(eff_max);
            if place_chunk(
                finder, working, task, *date, chunk, &mut number, today_key, origins,
            )? {
                budget -= chunk;
            }
        }
    }

    Ok(remaining - budget)
}

#[allow(clippy::too_many_arguments)]
fn place_chunk(
    finder: &SlotFinder,
    working: &mut Vec<StudyPlan>,
    task: &TaskRecord,
    date: NaiveDate,
    minutes: i64,
    number: &mut u32,
    today_key: &str,
    origins: &[(String, String, String)],
) -> AppResult<bool> {
    if minutes <= 0 {
        return Ok(false);
    }
    let Some(slot) = find_slot_for_task(finder, working, task, date, minutes)? else {
        return Ok(false);
    };
    let date_key = time_utils::format_date(date);
    let mut placed = new_session(&task.id, &date_key, *number, slot);
    placed.rescheduled_at = Some(today_key.to_string());
    placed.reschedule_history = reschedule_history(origins, &placed, today_key);
    session::plan_entry(working, &date_key)
        .planned_tasks
        .push(placed);
    *number += 1;
    Ok(true)
}

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::commitment::FixedCommitment;
use crate::models::planning::{PlanResult, Remedy, Slot, UnscheduledReport, UnscheduledTask, UrgencyLevel};
use crate::models::session::{
    self, next_session_number, normalize_plans, SessionStatus, StudyPlan, StudySession,
};
use crate::models::settings::{StudyPlanMode, UserSettings};
use crate::models::task::{DeadlineType, TargetFrequency, TaskRecord, TaskStatus};
use crate::services::commitment_expander::CommitmentExpander;
use crate::services::slot_finder::SlotFinder;
use crate::services::time_utils::{self, Interval};

/// Planning horizon for tasks without a deadline, in days from `today`.
pub const DEFAULT_HORIZON_DAYS: i64 = 28;

const THREE_TIMES_WEEKLY_MIN_DAYS: usize = 7;
const WEEKLY_MIN_DAYS: usize = 14;

/// Builds a fresh plan set from scratch. Inputs are immutable snapshots;
/// the same inputs always produce the same plans.
pub struct PlannerService;

impl PlannerService {
    pub fn generate_initial_plan(
        tasks: &[TaskRecord],
        settings: &UserSettings,
        commitments: &[FixedCommitment],
        today: &str,
    ) -> AppResult<PlanResult> {
        settings.validate()?;
        for commitment in commitments {
            commitment.validate()?;
        }
        for task in tasks {
            task.validate()?;
        }
        let today = time_utils::parse_date(today)?;

        let expander = CommitmentExpander::new(commitments);
        let finder = SlotFinder::new(settings, &expander);

        let mut ordered: Vec<&TaskRecord> = tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .collect();
        sort_by_priority(&mut ordered, today)?;

        let mut plans: Vec<StudyPlan> = Vec::new();
        let mut report = UnscheduledReport::default();

        for task in ordered {
            let remaining = plan_task(&finder, &mut plans, task, settings, today)?;
            if remaining > 0 {
                warn!(
                    target: "app::planner",
                    task_id = %task.id,
                    remaining,
                    "task could not be fully scheduled"
                );
                report.push(unscheduled_record(task, settings, remaining, today)?);
            }
        }

        normalize_plans(&mut plans)?;
        verify_invariants(&plans, tasks, settings, &expander)?;

        info!(
            target: "app::planner",
            plans = plans.len(),
            unscheduled_tasks = report.items.len(),
            "initial plan generated"
        );

        Ok(PlanResult {
            plans,
            unscheduled: report,
        })
    }
}

/// Total priority order: hard deadlines first, then nearer deadlines,
/// then important tasks, then older tasks, then id.
fn sort_by_priority(tasks: &mut [&TaskRecord], today: NaiveDate) -> AppResult<()> {
    let mut keys: HashMap<String, (u8, i64, u8, chrono::DateTime<chrono::FixedOffset>)> =
        HashMap::new();
    for task in tasks.iter() {
        let hard_rank = if task.deadline_type == DeadlineType::Hard {
            0
        } else {
            1
        };
        let distance = match task.deadline_date()? {
            Some(deadline) => (deadline - today).num_days(),
            None => i64::MAX,
        };
        let importance_rank = if task.importance { 0 } else { 1 };
        let created = time_utils::parse_timestamp(&task.created_at)?;
        keys.insert(task.id.clone(), (hard_rank, distance, importance_rank, created));
    }
    tasks.sort_by(|a, b| {
        let ka = &keys[&a.id];
        let kb = &keys[&b.id];
        ka.cmp(kb).then_with(|| a.id.cmp(&b.id))
    });
    Ok(())
}

/// Work days between `max(today, startDate)` and the deadline minus the
/// deadline buffer, both inclusive. Tasks without a deadline plan across
/// the default horizon.
pub(crate) fn eligible_days(
    task: &TaskRecord,
    settings: &UserSettings,
    today: NaiveDate,
) -> AppResult<Vec<NaiveDate>> {
    let mut start = today;
    if let Some(task_start) = task.start_date_parsed()? {
        if task_start > start {
            start = task_start;
        }
    }
    let end = match task.deadline_date()? {
        Some(deadline) => deadline - Duration::days(settings.buffer_days_before_deadline),
        None => today + Duration::days(DEFAULT_HORIZON_DAYS - 1),
    };
    Ok(time_utils::date_range(start, end, true)
        .filter(|date| settings.is_work_day(time_utils::day_of_week(*date)))
        .collect())
}

/// Place one task's estimate across its eligible days. Returns the
/// minutes that could not be placed.
fn plan_task(
    finder: &SlotFinder,
    plans: &mut Vec<StudyPlan>,
    task: &TaskRecord,
    settings: &UserSettings,
    today: NaiveDate,
) -> AppResult<i64> {
    let eligible = eligible_days(task, settings, today)?;
    if eligible.is_empty() {
        return Ok(task.estimated_minutes);
    }

    if task.is_one_sitting {
        return plan_one_sitting(finder, plans, task, settings, &eligible);
    }

    let mut remaining = task.estimated_minutes;
    let targets = target_dates(task, &eligible, settings, remaining);
    let size = session_size(task, settings, remaining, targets.len());
    let mut number = next_session_number(plans, &task.id);

    debug!(
        target: "app::planner",
        task_id = %task.id,
        eligible = eligible.len(),
        targets = targets.len(),
        size,
        "placing task sessions"
    );

    for date in &targets {
        if remaining == 0 {
            break;
        }
        let chunk = size.min(remaining);
        if try_place(finder, plans, task, *date, chunk, &mut number)? {
            remaining -= chunk;
        }
    }

    // Spill: sweep every eligible day, shrinking toward the session
    // minimum, until a full sweep places nothing.
    let eff_min = task.effective_min_session(settings);
    let eff_max = task.effective_max_session(settings);
    while remaining > 0 {
        let mut progress = false;
        for date in &eligible {
            if remaining == 0 {
                break;
            }
            let chunk = remaining.min(eff_max);
            if try_place(finder, plans, task, *date, chunk, &mut number)? {
                remaining -= chunk;
                progress = true;
                continue;
            }
            let shrunk = remaining.min(eff_min);
            if shrunk < chunk && try_place(finder, plans, task, *date, shrunk, &mut number)? {
                remaining -= shrunk;
                progress = true;
            }
        }
        if !progress {
            break;
        }
    }

    Ok(remaining)
}

fn plan_one_sitting(
    finder: &SlotFinder,
    plans: &mut Vec<StudyPlan>,
    task: &TaskRecord,
    settings: &UserSettings,
    eligible: &[NaiveDate],
) -> AppResult<i64> {
    let minutes = task.estimated_minutes;
    if minutes > settings.window_minutes() || minutes > settings.daily_available_minutes {
        return Ok(minutes);
    }
    let mut number = next_session_number(plans, &task.id);
    for date in eligible {
        if try_place(finder, plans, task, *date, minutes, &mut number)? {
            return Ok(0);
        }
    }
    Ok(minutes)
}

/// The dates a task's frequency preference aims at, before spill. The
/// cascade degrades weekly → 3x-week → daily when the eligible range is
/// too short, and a deadline with `respectFrequencyForDeadlines = false`
/// forces daily whenever the sparser shape cannot absorb the estimate.
fn target_dates(
    task: &TaskRecord,
    eligible: &[NaiveDate],
    settings: &UserSettings,
    remaining: i64,
) -> Vec<NaiveDate> {
    let eff_max = task.effective_max_session(settings);
    let capacity_ok = |dates: &[NaiveDate]| dates.len() as i64 * eff_max >= remaining;

    let chosen = match task.target_frequency {
        TargetFrequency::Daily | TargetFrequency::Flexible => eligible.to_vec(),
        TargetFrequency::ThreeTimesWeekly => every_other_day(eligible),
        TargetFrequency::Weekly => weekly_dates(eligible),
    };

    if chosen.len() < eligible.len()
        && task.deadline.is_some()
        && !task.respect_frequency_for_deadlines
        && !capacity_ok(&chosen)
    {
        return eligible.to_vec();
    }
    chosen
}

fn every_other_day(eligible: &[NaiveDate]) -> Vec<NaiveDate> {
    if eligible.len() < THREE_TIMES_WEEKLY_MIN_DAYS {
        return eligible.to_vec();
    }
    eligible.iter().copied().step_by(2).collect()
}

/// One date per ISO week, on the week's earliest eligible day.
fn weekly_dates(eligible: &[NaiveDate]) -> Vec<NaiveDate> {
    if eligible.len() < WEEKLY_MIN_DAYS {
        return every_other_day(eligible);
    }
    let mut chosen = Vec::new();
    let mut last_week = None;
    for date in eligible {
        let week = date.iso_week();
        let key = (week.year(), week.week());
        if last_week != Some(key) {
            chosen.push(*date);
            last_week = Some(key);
        }
    }
    chosen
}

fn session_size(
    task: &TaskRecord,
    settings: &UserSettings,
    remaining: i64,
    target_count: usize,
) -> i64 {
    let eff_min = task.effective_min_session(settings);
    let eff_max = task.effective_max_session(settings);
    let count = target_count.max(1) as i64;
    let even = (remaining + count - 1) / count;
    let base = match task.target_frequency {
        TargetFrequency::Flexible => match settings.study_plan_mode {
            StudyPlanMode::Even => even,
            StudyPlanMode::FrontLoaded => eff_max,
            StudyPlanMode::Balanced => (even + eff_max) / 2,
        },
        _ => even,
    };
    base.clamp(eff_min, eff_max)
}

/// Try the task's preferred bands in order, then the whole window.
pub(crate) fn find_slot_for_task(
    finder: &SlotFinder,
    plans: &[StudyPlan],
    task: &TaskRecord,
    date: NaiveDate,
    minutes: i64,
) -> AppResult<Option<Slot>> {
    let date_key = time_utils::format_date(date);
    let empty: &[StudySession] = &[];
    let existing = session::find_plan(plans, &date_key)
        .map(|plan| plan.planned_tasks.as_slice())
        .unwrap_or(empty);

    for band in &task.preferred_time_slots {
        if let Some(slot) = finder.find_earliest_slot_in_band(date, minutes, existing, *band)? {
            return Ok(Some(slot));
        }
    }
    finder.find_earliest_slot(date, minutes, existing)
}

fn try_place(
    finder: &SlotFinder,
    plans: &mut Vec<StudyPlan>,
    task: &TaskRecord,
    date: NaiveDate,
    minutes: i64,
    number: &mut u32,
) -> AppResult<bool> {
    if minutes <= 0 {
        return Ok(false);
    }
    let slot = match find_slot_for_task(finder, plans, task, date, minutes)? {
        Some(slot) => slot,
        None => return Ok(false),
    };
    let date_key = time_utils::format_date(date);
    let session = new_session(&task.id, &date_key, *number, slot);
    session::plan_entry(plans, &date_key).planned_tasks.push(session);
    *number += 1;
    Ok(true)
}

pub(crate) fn new_session(
    task_id: &str,
    plan_date: &str,
    session_number: u32,
    slot: Slot,
) -> StudySession {
    StudySession {
        task_id: task_id.to_string(),
        plan_date: plan_date.to_string(),
        session_number,
        start_time: slot.start_time(),
        end_time: slot.end_time(),
        allocated_minutes: slot.duration(),
        status: SessionStatus::Scheduled,
        actual_minutes: None,
        is_manual_override: false,
        original_date: None,
        original_start_time: None,
        original_end_time: None,
        rescheduled_at: None,
        reschedule_history: Vec::new(),
        skip_reason: None,
        skipped_at: None,
    }
}

pub(crate) fn unscheduled_record(
    task: &TaskRecord,
    settings: &UserSettings,
    remaining: i64,
    today: NaiveDate,
) -> AppResult<UnscheduledTask> {
    Ok(UnscheduledTask {
        task_id: task.id.clone(),
        title: task.title.clone(),
        remaining_minutes: remaining,
        urgency: urgency_for(task, remaining, today)?,
        suggestions: remedies_for(task, settings),
    })
}

fn urgency_for(task: &TaskRecord, remaining: i64, today: NaiveDate) -> AppResult<UrgencyLevel> {
    let proportion = remaining as f64 / task.estimated_minutes.max(1) as f64;
    let distance = match task.deadline_date()? {
        Some(deadline) => (deadline - today).num_days(),
        None => i64::MAX,
    };
    let level = if (task.deadline_type == DeadlineType::Hard && distance <= 3) || proportion > 0.5 {
        UrgencyLevel::Critical
    } else if distance <= 7 || proportion > 0.25 {
        UrgencyLevel::High
    } else if distance <= 14 || proportion > 0.1 {
        UrgencyLevel::Medium
    } else {
        UrgencyLevel::Low
    };
    Ok(level)
}

fn remedies_for(task: &TaskRecord, settings: &UserSettings) -> Vec<Remedy> {
    let mut suggestions = vec![Remedy::IncreaseDailyHours];
    if settings.work_days.len() < 7 {
        suggestions.push(Remedy::AddWorkDays);
    }
    if task.deadline.is_some() {
        suggestions.push(Remedy::ExtendDeadline);
    }
    if settings.buffer_between_sessions_minutes > 0 || settings.buffer_days_before_deadline > 0 {
        suggestions.push(Remedy::ReduceBuffer);
    }
    suggestions.push(Remedy::ReduceEstimate);
    if task.is_one_sitting {
        suggestions.push(Remedy::SplitTask);
    }
    if !task.importance {
        suggestions.push(Remedy::Prioritize);
    }
    suggestions
}

/// Walk a finished plan set against every structural invariant. A
/// failure here is an engine bug, surfaced as a fatal error rather than
/// a bad plan.
pub fn verify_invariants(
    plans: &[StudyPlan],
    tasks: &[TaskRecord],
    settings: &UserSettings,
    expander: &CommitmentExpander,
) -> AppResult<()> {
    let task_index: HashMap<&str, &TaskRecord> =
        tasks.iter().map(|task| (task.id.as_str(), task)).collect();
    let buffer = settings.buffer_between_sessions_minutes;
    let window = Interval::new(
        settings.study_window_start_minute,
        settings.study_window_end_minute,
    )?;

    for plan in plans {
        let date = time_utils::parse_date(&plan.date)?;
        let busy_commitments = expander.busy_intervals(date)?;
        let mut daily_total = 0;

        let active: Vec<&StudySession> = plan
            .planned_tasks
            .iter()
            .filter(|session| session.status.counts_toward_daily_total())
            .filter(|session| {
                !matches!(
                    session.status,
                    SessionStatus::Redistributed | SessionStatus::Failed
                )
            })
            .collect();

        for (index, &session) in active.iter().enumerate() {
            let interval = session.interval()?;

            if session.status == SessionStatus::Scheduled || session.status == SessionStatus::Missed
            {
                if !window.contains(&interval) {
                    return Err(invariant_failure("session outside study window", session));
                }
                if !session.is_manual_override
                    && !settings.is_work_day(time_utils::day_of_week(date))
                {
                    return Err(invariant_failure("session on non-work day", session));
                }
                for busy in &busy_commitments {
                    if interval.overlaps(busy) {
                        return Err(invariant_failure("session overlaps commitment", session));
                    }
                }
                for other in active.iter().skip(index + 1) {
                    if interval.overlaps(&other.interval()?.widen(buffer)) {
                        return Err(invariant_failure("sessions closer than buffer", session));
                    }
                }
            }

            daily_total += session.allocated_minutes;

            if let Some(task) = task_index.get(session.task_id.as_str()) {
                if task.deadline_type == DeadlineType::Hard
                    && session.status == SessionStatus::Scheduled
                {
                    if let Some(deadline) = task.deadline_date()? {
                        let limit =
                            deadline - Duration::days(settings.buffer_days_before_deadline);
                        if date > limit {
                            return Err(invariant_failure(
                                "session past hard deadline buffer",
                                session,
                            ));
                        }
                    }
                }
            }
        }

        if daily_total > settings.daily_available_minutes {
            return Err(AppError::invariant_with_details(
                "daily total exceeds available minutes",
                json!({"date": plan.date, "total": daily_total}),
            ));
        }
    }

    // Accounted work never exceeds the estimate.
    let mut per_task: HashMap<&str, i64> = HashMap::new();
    for plan in plans {
        for session in &plan.planned_tasks {
            if matches!(
                session.status,
                SessionStatus::Scheduled
                    | SessionStatus::Completed
                    | SessionStatus::SkippedUser
                    | SessionStatus::Missed
            ) {
                *per_task.entry(session.task_id.as_str()).or_default() +=
                    session.allocated_minutes;
            }
        }
    }
    for (task_id, total) in per_task {
        if let Some(task) = task_index.get(task_id) {
            if total > task.estimated_minutes {
                return Err(AppError::invariant_with_details(
                    "scheduled work exceeds task estimate",
                    json!({"taskId": task_id, "total": total, "estimated": task.estimated_minutes}),
                ));
            }
        }
    }

    Ok(())
}

fn invariant_failure(message: &str, session: &StudySession) -> AppError {
    AppError::invariant_with_details(
        message,
        json!({
            "taskId": session.task_id,
            "sessionNumber": session.session_number,
            "planDate": session.plan_date,
            "startTime": session.start_time,
            "endTime": session.end_time,
        }),
    )
}

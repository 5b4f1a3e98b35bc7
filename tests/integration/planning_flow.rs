use std::collections::BTreeMap;

use studyflow_core::models::commitment::{DateRange, FixedCommitment};
use studyflow_core::models::planning::{ConflictKind, Remedy, UrgencyLevel};
use studyflow_core::models::settings::{StudyPlanMode, UserSettings};
use studyflow_core::models::task::{DeadlineType, TargetFrequency, TaskRecord, TaskStatus};
use studyflow_core::store::PlannerState;
use studyflow_core::{find_slot, generate_initial_plan, validate_slot};
use tempfile::tempdir;

// The test week: Monday 2025-06-02 through Friday 2025-06-06.
const TODAY: &str = "2025-06-02";

fn settings() -> UserSettings {
    UserSettings {
        daily_available_minutes: 480,
        work_days: vec![1, 2, 3, 4, 5],
        study_window_start_minute: 9 * 60,
        study_window_end_minute: 17 * 60,
        buffer_between_sessions_minutes: 0,
        buffer_days_before_deadline: 0,
        min_session_minutes: 30,
        max_session_minutes: 120,
        study_plan_mode: StudyPlanMode::Even,
    }
}

fn task(id: &str, minutes: i64, deadline: &str) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        title: format!("Task {id}"),
        category: None,
        estimated_minutes: minutes,
        deadline: Some(deadline.to_string()),
        deadline_type: DeadlineType::Hard,
        importance: false,
        status: TaskStatus::Pending,
        target_frequency: TargetFrequency::Daily,
        respect_frequency_for_deadlines: true,
        min_session_minutes: None,
        max_session_minutes: None,
        is_one_sitting: false,
        start_date: None,
        preferred_time_slots: Vec::new(),
        created_at: "2025-06-01T08:00:00+00:00".to_string(),
    }
}

fn commitment_on(date: &str, start: &str, end: &str) -> FixedCommitment {
    FixedCommitment {
        id: format!("commitment-{date}"),
        title: "Standing meeting".to_string(),
        category: None,
        recurring: true,
        days_of_week: vec![1, 2, 3, 4, 5],
        date_range: Some(DateRange {
            start: date.to_string(),
            end: date.to_string(),
        }),
        specific_dates: Vec::new(),
        start_time: Some(start.to_string()),
        end_time: Some(end.to_string()),
        is_all_day: false,
        day_specific_timings: Vec::new(),
        deleted_occurrences: Vec::new(),
        modified_occurrences: BTreeMap::new(),
        counts_toward_daily_hours: false,
    }
}

#[test]
fn simple_distribution_fills_four_days_at_window_start() {
    let tasks = vec![task("essay", 240, "2025-06-05")];
    let result = generate_initial_plan(&tasks, &settings(), &[], TODAY).unwrap();

    assert!(result.unscheduled.items.is_empty());
    let dates: Vec<_> = result.plans.iter().map(|plan| plan.date.as_str()).collect();
    assert_eq!(
        dates,
        vec!["2025-06-02", "2025-06-03", "2025-06-04", "2025-06-05"]
    );
    for plan in &result.plans {
        assert_eq!(plan.planned_tasks.len(), 1);
        let session = &plan.planned_tasks[0];
        assert_eq!(session.allocated_minutes, 60);
        assert_eq!(session.start_time, "09:00");
        assert_eq!(session.end_time, "10:00");
        assert_eq!(plan.total_scheduled_minutes, 60);
    }
}

#[test]
fn commitment_displaces_only_its_own_day() {
    let tasks = vec![task("essay", 240, "2025-06-05")];
    let commitments = vec![commitment_on("2025-06-03", "09:00", "10:30")];
    let result = generate_initial_plan(&tasks, &settings(), &commitments, TODAY).unwrap();

    for plan in &result.plans {
        let session = &plan.planned_tasks[0];
        if plan.date == "2025-06-03" {
            assert_eq!(session.start_time, "10:30");
            assert_eq!(session.end_time, "11:30");
        } else {
            assert_eq!(session.start_time, "09:00");
        }
    }
}

#[test]
fn hard_deadline_overflow_fits_within_capacity() {
    let tasks = vec![task("crunch", 600, "2025-06-03")];
    let result = generate_initial_plan(&tasks, &settings(), &[], TODAY).unwrap();

    assert!(result.unscheduled.items.is_empty());
    let scheduled: i64 = result
        .plans
        .iter()
        .map(|plan| plan.total_scheduled_minutes)
        .sum();
    assert_eq!(scheduled, 600);
    for plan in &result.plans {
        assert!(plan.total_scheduled_minutes <= 480);
    }
}

#[test]
fn hard_deadline_overflow_past_capacity_reports_critical() {
    let mut limited = settings();
    limited.daily_available_minutes = 240;
    let tasks = vec![task("crunch", 600, "2025-06-03")];
    let result = generate_initial_plan(&tasks, &limited, &[], TODAY).unwrap();

    let scheduled: i64 = result
        .plans
        .iter()
        .map(|plan| plan.total_scheduled_minutes)
        .sum();
    assert_eq!(scheduled, 480);

    assert_eq!(result.unscheduled.items.len(), 1);
    let item = &result.unscheduled.items[0];
    assert_eq!(item.remaining_minutes, 120);
    assert_eq!(item.urgency, UrgencyLevel::Critical);
    assert!(item.suggestions.contains(&Remedy::IncreaseDailyHours));
    assert!(item.suggestions.contains(&Remedy::ExtendDeadline));
}

#[test]
fn all_day_commitment_causes_spill_to_next_day() {
    let mut blocker = commitment_on("2025-06-02", "09:00", "10:00");
    blocker.is_all_day = true;
    let tasks = vec![task("essay", 120, "2025-06-03")];
    let result = generate_initial_plan(&tasks, &settings(), &[blocker.clone()], TODAY).unwrap();

    // Everything lands on the second day.
    assert_eq!(result.plans.len(), 1);
    assert_eq!(result.plans[0].date, "2025-06-03");
    assert_eq!(result.plans[0].total_scheduled_minutes, 120);

    // And find_slot agrees the blocked day has no room.
    assert!(
        find_slot("2025-06-02", 30, &result.plans, &[blocker], &settings(), false)
            .unwrap()
            .is_none()
    );
}

#[test]
fn validate_slot_reports_all_conflicts_with_alternatives() {
    let tasks = vec![task("essay", 60, "2025-06-02")];
    let commitments = vec![commitment_on("2025-06-02", "10:00", "11:00")];
    let result = generate_initial_plan(&tasks, &settings(), &commitments, TODAY).unwrap();

    // 09:30 collides with the planned session (09:00-10:00) and the
    // commitment (10:00-11:00).
    let validation = validate_slot(
        "2025-06-02",
        "09:30",
        "10:30",
        &result.plans,
        &commitments,
        &settings(),
        None,
        false,
    )
    .unwrap();

    assert!(!validation.ok);
    let kinds: Vec<_> = validation.conflicts.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&ConflictKind::SessionOverlap));
    assert!(kinds.contains(&ConflictKind::CommitmentConflict));
    assert!(!validation.alternatives.is_empty());
    assert_eq!(validation.alternatives[0].start_minute, 11 * 60);
}

#[test]
fn zero_buffer_allows_back_to_back_sessions() {
    let tasks = vec![task("a", 120, "2025-06-02"), task("b", 120, "2025-06-02")];
    let result = generate_initial_plan(&tasks, &settings(), &[], TODAY).unwrap();

    let plan = &result.plans[0];
    assert_eq!(plan.planned_tasks.len(), 2);
    // Half-open intervals: the second session starts the instant the
    // first ends.
    assert_eq!(plan.planned_tasks[0].end_time, plan.planned_tasks[1].start_time);
}

#[test]
fn buffer_separates_sessions_of_different_tasks() {
    let mut buffered = settings();
    buffered.buffer_between_sessions_minutes = 15;
    let tasks = vec![task("a", 60, "2025-06-02"), task("b", 60, "2025-06-02")];
    let result = generate_initial_plan(&tasks, &buffered, &[], TODAY).unwrap();

    let plan = &result.plans[0];
    assert_eq!(plan.planned_tasks.len(), 2);
    assert_eq!(plan.planned_tasks[0].end_time, "10:00");
    assert_eq!(plan.planned_tasks[1].start_time, "10:15");
}

#[test]
fn snapshot_round_trip_replans_identically() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("state.json");

    let tasks = vec![
        task("essay", 240, "2025-06-05"),
        task("reading", 180, "2025-06-06"),
    ];
    let commitments = vec![commitment_on("2025-06-03", "09:00", "10:30")];
    let settings = settings();

    let first = generate_initial_plan(&tasks, &settings, &commitments, TODAY).unwrap();
    let state = PlannerState {
        plans: first.plans.clone(),
        tasks: tasks.clone(),
        commitments: commitments.clone(),
        settings: settings.clone(),
    };
    state.save(&path).unwrap();

    let reloaded = PlannerState::load(&path).unwrap();
    assert_eq!(state, reloaded);

    let second = generate_initial_plan(
        &reloaded.tasks,
        &reloaded.settings,
        &reloaded.commitments,
        TODAY,
    )
    .unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn malformed_commitment_aborts_without_partial_output() {
    let tasks = vec![task("essay", 60, "2025-06-05")];
    let mut broken = commitment_on("2025-06-03", "09:00", "10:30");
    broken.days_of_week.clear();
    let result = generate_initial_plan(&tasks, &settings(), &[broken], TODAY);
    assert!(result.is_err());
}

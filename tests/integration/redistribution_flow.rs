use studyflow_core::models::planning::RedistributionOutcome;
use studyflow_core::models::session::SessionStatus;
use studyflow_core::models::settings::{StudyPlanMode, UserSettings};
use studyflow_core::models::task::{DeadlineType, TargetFrequency, TaskRecord, TaskStatus};
use studyflow_core::{generate_initial_plan, mark_completed, move_session, redistribute};

// The test week: Monday 2025-06-02 through Thursday 2025-06-05 carry the
// four one-hour sessions of a four-hour task.
const PLAN_DAY: &str = "2025-06-02";
const REDISTRIBUTION_DAY: &str = "2025-06-04";

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

fn essay_task() -> TaskRecord {
    TaskRecord {
        id: "essay".to_string(),
        title: "Essay".to_string(),
        category: None,
        estimated_minutes: 240,
        deadline: Some("2025-06-05".to_string()),
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

/// Day 1 executed, day 2 never touched, days 3 and 4 still scheduled.
fn executed_first_day() -> Vec<studyflow_core::models::session::StudyPlan> {
    let tasks = vec![essay_task()];
    let result = generate_initial_plan(&tasks, &settings(), &[], PLAN_DAY).unwrap();
    assert_eq!(result.plans.len(), 4);
    mark_completed(&result.plans, "2025-06-02", "essay", 1, Some(60)).unwrap()
}

#[test]
fn missed_day_is_replanned_across_remaining_days() {
    let plans = executed_first_day();
    let tasks = vec![essay_task()];

    let result = redistribute(&plans, &tasks, &settings(), &[], REDISTRIBUTION_DAY).unwrap();

    assert_eq!(result.report.missed_sessions_found, 1);
    assert_eq!(result.report.entries.len(), 1);
    let entry = &result.report.entries[0];
    assert_eq!(entry.outcome, RedistributionOutcome::Rescheduled);
    assert_eq!(entry.placed_minutes, 180);
    assert!(entry
        .removed
        .iter()
        .all(|removed| removed.session.status == SessionStatus::Redistributed));

    // The missed day-2 session is gone from the plans; remaining work is
    // ninety minutes on each of the last two days.
    assert!(result.plans.iter().all(|plan| plan.date != "2025-06-03"));
    let day3 = result
        .plans
        .iter()
        .find(|plan| plan.date == "2025-06-04")
        .unwrap();
    let day4 = result
        .plans
        .iter()
        .find(|plan| plan.date == "2025-06-05")
        .unwrap();
    assert_eq!(day3.total_scheduled_minutes, 90);
    assert_eq!(day4.total_scheduled_minutes, 90);

    // Completed plus re-scheduled work covers the whole estimate.
    let total: i64 = result
        .plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .filter(|session| {
            matches!(
                session.status,
                SessionStatus::Scheduled | SessionStatus::Completed
            )
        })
        .map(|session| session.allocated_minutes)
        .sum();
    assert_eq!(total, 240);
}

#[test]
fn manual_override_is_preserved_and_reduces_remaining() {
    let plans = executed_first_day();
    let tasks = vec![essay_task()];

    // The user drags day 3's session to 14:00 before day 2's work is
    // ever redistributed.
    let (plans, outcome) = move_session(
        &plans,
        &[],
        &settings(),
        "2025-06-04",
        "essay",
        3,
        "2025-06-04",
        "14:00",
        "2025-06-03",
    )
    .unwrap();
    assert!(matches!(
        outcome,
        studyflow_core::models::planning::MoveOutcome::Moved { .. }
    ));

    let result = redistribute(&plans, &tasks, &settings(), &[], REDISTRIBUTION_DAY).unwrap();

    // remaining = 240 - 60 completed - 60 manual = 120, placed as one
    // two-hour session on the final day.
    let entry = &result.report.entries[0];
    assert_eq!(entry.placed_minutes, 120);

    let day3 = result
        .plans
        .iter()
        .find(|plan| plan.date == "2025-06-04")
        .unwrap();
    assert_eq!(day3.planned_tasks.len(), 1);
    assert_eq!(day3.planned_tasks[0].start_time, "14:00");
    assert!(day3.planned_tasks[0].is_manual_override);
    assert_eq!(day3.planned_tasks[0].status, SessionStatus::Scheduled);

    let day4 = result
        .plans
        .iter()
        .find(|plan| plan.date == "2025-06-05")
        .unwrap();
    assert_eq!(day4.planned_tasks.len(), 1);
    assert_eq!(day4.planned_tasks[0].allocated_minutes, 120);
}

#[test]
fn redistribute_twice_is_identity() {
    let plans = executed_first_day();
    let tasks = vec![essay_task()];

    let first = redistribute(&plans, &tasks, &settings(), &[], REDISTRIBUTION_DAY).unwrap();
    let second = redistribute(&first.plans, &tasks, &settings(), &[], REDISTRIBUTION_DAY).unwrap();

    assert_eq!(
        serde_json::to_string(&first.plans).unwrap(),
        serde_json::to_string(&second.plans).unwrap()
    );
    assert!(second.report.entries.is_empty());
    assert_eq!(second.report.missed_sessions_found, 0);
}

#[test]
fn new_sessions_carry_redistribution_history() {
    let plans = executed_first_day();
    let tasks = vec![essay_task()];

    let result = redistribute(&plans, &tasks, &settings(), &[], REDISTRIBUTION_DAY).unwrap();

    let replanned: Vec<_> = result
        .plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .filter(|session| session.status == SessionStatus::Scheduled)
        .collect();
    assert!(!replanned.is_empty());
    for session in replanned {
        assert_eq!(session.rescheduled_at.as_deref(), Some(REDISTRIBUTION_DAY));
        assert!(!session.reschedule_history.is_empty());
        // The history points back at the removed occurrences.
        assert!(session
            .reschedule_history
            .iter()
            .any(|entry| entry.from_date == "2025-06-03"));
    }
}

#[test]
fn expired_deadline_restores_sessions_as_failed() {
    let mut short = essay_task();
    short.deadline = Some("2025-06-03".to_string());
    short.estimated_minutes = 120;
    let tasks = vec![short];

    let result = generate_initial_plan(&tasks, &settings(), &[], PLAN_DAY).unwrap();
    assert_eq!(result.plans.len(), 2);

    // Nothing was executed and the deadline has passed.
    let outcome = redistribute(&result.plans, &tasks, &settings(), &[], REDISTRIBUTION_DAY).unwrap();

    let entry = &outcome.report.entries[0];
    assert_eq!(entry.outcome, RedistributionOutcome::Failed);
    assert_eq!(entry.reason.as_deref(), Some("no_days_before_deadline"));
    assert!(entry.urgency.is_some());

    let failed: Vec<_> = outcome
        .plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .filter(|session| session.status == SessionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 2);
}

#[test]
fn unrelated_tasks_are_untouched_by_redistribution() {
    let mut other = essay_task();
    other.id = "reading".to_string();
    other.title = "Reading".to_string();
    other.estimated_minutes = 120;
    other.start_date = Some("2025-06-04".to_string());
    let tasks = vec![essay_task(), other];

    let result = generate_initial_plan(&tasks, &settings(), &[], PLAN_DAY).unwrap();
    let plans = mark_completed(&result.plans, "2025-06-02", "essay", 1, None).unwrap();

    let before: Vec<_> = plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .filter(|session| session.task_id == "reading")
        .cloned()
        .collect();

    let outcome = redistribute(&plans, &tasks, &settings(), &[], REDISTRIBUTION_DAY).unwrap();

    let after: Vec<_> = outcome
        .plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .filter(|session| session.task_id == "reading")
        .cloned()
        .collect();
    assert_eq!(before, after);
    assert!(outcome
        .report
        .entries
        .iter()
        .all(|entry| entry.task_id == "essay"));
}

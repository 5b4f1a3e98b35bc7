use studyflow_core::models::planning::{
    MoveOutcome, MoveRejection, SkipMode, SlotPlacement,
};
use studyflow_core::models::session::SessionStatus;
use studyflow_core::models::settings::{StudyPlanMode, UserSettings};
use studyflow_core::models::task::{DeadlineType, TargetFrequency, TaskRecord, TaskStatus};
use studyflow_core::{generate_initial_plan, move_session, redistribute, skip_session};

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

fn planned_week() -> Vec<studyflow_core::models::session::StudyPlan> {
    let result = generate_initial_plan(&[essay_task()], &settings(), &[], TODAY).unwrap();
    result.plans
}

#[test]
fn cross_day_drag_is_rejected_and_plans_are_unchanged() {
    let plans = planned_week();

    let (updated, outcome) = move_session(
        &plans,
        &[],
        &settings(),
        "2025-06-02",
        "essay",
        1,
        "2025-06-03",
        "09:00",
        TODAY,
    )
    .unwrap();

    assert_eq!(
        outcome,
        MoveOutcome::Rejected {
            reason: MoveRejection::CrossDayMoveNotAllowed,
            conflicts: Vec::new(),
        }
    );
    assert_eq!(
        serde_json::to_string(&updated).unwrap(),
        serde_json::to_string(&plans).unwrap()
    );
}

#[test]
fn same_day_drag_snaps_to_the_requested_minute() {
    let plans = planned_week();

    let (updated, outcome) = move_session(
        &plans,
        &[],
        &settings(),
        "2025-06-02",
        "essay",
        1,
        "2025-06-02",
        "15:30",
        TODAY,
    )
    .unwrap();

    match outcome {
        MoveOutcome::Moved { placement, slot } => {
            assert_eq!(placement, SlotPlacement::Exact);
            assert_eq!(slot.start_minute, 15 * 60 + 30);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let plan = updated.iter().find(|plan| plan.date == "2025-06-02").unwrap();
    let session = &plan.planned_tasks[0];
    assert_eq!(session.start_time, "15:30");
    assert!(session.is_manual_override);
    assert_eq!(session.original_start_time.as_deref(), Some("09:00"));
    assert_eq!(session.rescheduled_at.as_deref(), Some(TODAY));
}

#[test]
fn manual_move_survives_a_later_redistribution() {
    let plans = planned_week();

    let (plans, _) = move_session(
        &plans,
        &[],
        &settings(),
        "2025-06-03",
        "essay",
        2,
        "2025-06-03",
        "14:00",
        TODAY,
    )
    .unwrap();

    // Day 1 is never executed; on day 2 the engine redistributes.
    let result = redistribute(&plans, &[essay_task()], &settings(), &[], "2025-06-03").unwrap();

    let moved = result
        .plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .find(|session| session.is_manual_override)
        .expect("manual session preserved");
    assert_eq!(moved.plan_date, "2025-06-03");
    assert_eq!(moved.start_time, "14:00");
    assert_eq!(moved.status, SessionStatus::Scheduled);
}

#[test]
fn full_skip_counts_as_accounted_work_in_redistribution() {
    let plans = planned_week();
    let tasks = vec![essay_task()];

    // The user waives day 1 entirely.
    let plans = skip_session(
        &plans,
        &tasks,
        &settings(),
        &[],
        "2025-06-02",
        "essay",
        1,
        SkipMode::Full,
        "travel day",
        TODAY,
    )
    .unwrap();

    let skipped = plans[0]
        .planned_tasks
        .iter()
        .find(|session| session.status == SessionStatus::SkippedUser)
        .expect("skipped session");
    assert_eq!(skipped.skip_reason.as_deref(), Some("travel day"));
    assert_eq!(plans[0].total_scheduled_minutes, 0);

    // Day 2 is missed; on day 3 the redistribution treats the skipped
    // hour as done: remaining = 240 - 60 skipped - 0 completed = 180,
    // but only the missed hour and the two future hours are replanned.
    let result = redistribute(&plans, &tasks, &settings(), &[], "2025-06-04").unwrap();
    let entry = &result.report.entries[0];
    assert_eq!(entry.placed_minutes, 180);

    // The skipped session itself is untouched.
    let still_skipped = result
        .plans
        .iter()
        .flat_map(|plan| plan.planned_tasks.iter())
        .any(|session| session.status == SessionStatus::SkippedUser);
    assert!(still_skipped);
}

#[test]
fn partial_skip_replans_the_remainder_on_the_same_day() {
    let plans = planned_week();
    let tasks = vec![essay_task()];

    let updated = skip_session(
        &plans,
        &tasks,
        &settings(),
        &[],
        "2025-06-02",
        "essay",
        1,
        SkipMode::Partial(30),
        "late start",
        TODAY,
    )
    .unwrap();

    let plan = updated.iter().find(|plan| plan.date == "2025-06-02").unwrap();
    assert_eq!(plan.planned_tasks.len(), 2);
    let shortened = &plan.planned_tasks[0];
    assert_eq!(shortened.allocated_minutes, 30);
    assert_eq!(shortened.end_time, "09:30");
    let remainder = &plan.planned_tasks[1];
    assert_eq!(remainder.allocated_minutes, 30);
    assert_eq!(remainder.start_time, "09:30");
    assert_eq!(remainder.status, SessionStatus::Scheduled);
    assert_eq!(plan.total_scheduled_minutes, 60);
}

#[test]
fn partial_skip_remainder_fails_when_every_day_is_full() {
    // A one-hour window holds exactly one session per day, and the
    // 15-minute buffer keeps the shortened session's tail unusable.
    let mut tight = settings();
    tight.daily_available_minutes = 60;
    tight.study_window_start_minute = 9 * 60;
    tight.study_window_end_minute = 10 * 60;
    tight.buffer_between_sessions_minutes = 15;
    let result = generate_initial_plan(&[essay_task()], &tight, &[], TODAY).unwrap();
    assert_eq!(result.plans.len(), 4);
    let tasks = vec![essay_task()];

    let updated = skip_session(
        &result.plans,
        &tasks,
        &tight,
        &[],
        "2025-06-02",
        "essay",
        1,
        SkipMode::Partial(30),
        "interrupted",
        TODAY,
    )
    .unwrap();

    // Every day up to the deadline is occupied, so the remainder
    // surfaces as failed work on the original day's tail.
    let day1 = updated.iter().find(|plan| plan.date == "2025-06-02").unwrap();
    assert_eq!(day1.total_scheduled_minutes, 30);
    let failed = day1
        .planned_tasks
        .iter()
        .find(|session| session.status == SessionStatus::Failed)
        .expect("failed remainder");
    assert_eq!(failed.allocated_minutes, 30);
    assert_eq!(failed.start_time, "09:30");
    assert_eq!(failed.end_time, "10:00");
}

#[test]
fn move_onto_another_session_slides_to_nearest_free_minute() {
    // The nearer deadline puts the reading session at 09:00-10:00 and
    // the essay session right after it at 10:00-11:00.
    let mut second = essay_task();
    second.id = "reading".to_string();
    second.estimated_minutes = 60;
    second.deadline = Some("2025-06-02".to_string());
    let both = generate_initial_plan(&[essay_task(), second], &settings(), &[], TODAY).unwrap();

    // Drop the essay session into the middle of the reading session;
    // the search walks outward until the overlap clears.
    let (updated, outcome) = move_session(
        &both.plans,
        &[],
        &settings(),
        "2025-06-02",
        "essay",
        1,
        "2025-06-02",
        "09:30",
        TODAY,
    )
    .unwrap();

    match outcome {
        MoveOutcome::Moved { placement, slot } => {
            assert_eq!(placement, SlotPlacement::NearestAvailable);
            assert_eq!(slot.start_minute, 10 * 60);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let plan = updated.iter().find(|plan| plan.date == "2025-06-02").unwrap();
    assert_eq!(plan.planned_tasks[0].task_id, "reading");
    assert_eq!(plan.planned_tasks[1].task_id, "essay");
    assert_eq!(plan.planned_tasks[1].start_time, "10:00");
    assert!(plan.planned_tasks[1].is_manual_override);
}

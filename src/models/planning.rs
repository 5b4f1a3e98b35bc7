use serde::{Deserialize, Serialize};

use crate::models::session::{StudyPlan, StudySession};
use crate::services::time_utils;

/// A candidate placement inside one date's study window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub start_minute: i64,
    pub end_minute: i64,
}

impl Slot {
    pub fn duration(&self) -> i64 {
        self.end_minute - self.start_minute
    }

    pub fn start_time(&self) -> String {
        time_utils::from_minutes(self.start_minute)
    }

    pub fn end_time(&self) -> String {
        time_utils::from_minutes(self.end_minute)
    }
}

/// How close a nearest-slot search landed to the requested position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SlotPlacement {
    Exact,
    SnappedToGrid,
    NearestAvailable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    InvalidTimeRange,
    OutsideStudyWindow,
    NotWorkDay,
    SessionOverlap,
    CommitmentConflict,
    DailyLimitExceeded,
}

/// One violated constraint. `item` names the offending session or
/// commitment when the conflict has one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotConflict {
    pub kind: ConflictKind,
    pub message: String,
    #[serde(default)]
    pub item: Option<String>,
}

/// Outcome of `validate`: every violated constraint, not just the first,
/// plus alternative placements when the requested one fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotValidation {
    pub ok: bool,
    #[serde(default)]
    pub conflicts: Vec<SlotConflict>,
    #[serde(default)]
    pub alternatives: Vec<Slot>,
}

impl SlotValidation {
    pub fn ok() -> Self {
        Self {
            ok: true,
            conflicts: Vec::new(),
            alternatives: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    IncreaseDailyHours,
    AddWorkDays,
    ExtendDeadline,
    ReduceBuffer,
    ReduceEstimate,
    SplitTask,
    Prioritize,
}

/// Work the planner could not place for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnscheduledTask {
    pub task_id: String,
    pub title: String,
    pub remaining_minutes: i64,
    pub urgency: UrgencyLevel,
    pub suggestions: Vec<Remedy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnscheduledReport {
    pub items: Vec<UnscheduledTask>,
    pub total_unscheduled_minutes: i64,
}

impl UnscheduledReport {
    pub fn push(&mut self, item: UnscheduledTask) {
        self.total_unscheduled_minutes += item.remaining_minutes;
        self.items.push(item);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub plans: Vec<StudyPlan>,
    pub unscheduled: UnscheduledReport,
}

/// A session the redistribution engine pulled out of the plans, kept for
/// audit with its terminal status (`redistributed` or `failed`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemovedSession {
    pub session: StudySession,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RedistributionOutcome {
    Rescheduled,
    NothingRemaining,
    Failed,
    PartialFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedistributionEntry {
    pub task_id: String,
    pub outcome: RedistributionOutcome,
    #[serde(default)]
    pub reason: Option<String>,
    pub removed: Vec<RemovedSession>,
    pub placed_minutes: i64,
    pub unplaced_minutes: i64,
    #[serde(default)]
    pub urgency: Option<UrgencyLevel>,
    #[serde(default)]
    pub suggestions: Vec<Remedy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RedistributionReport {
    pub entries: Vec<RedistributionEntry>,
    pub missed_sessions_found: usize,
    pub total_replanned_minutes: i64,
    pub total_unplaced_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedistributionResult {
    pub plans: Vec<StudyPlan>,
    pub report: RedistributionReport,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveRejection {
    CrossDayMoveNotAllowed,
    SessionNotMovable,
    NoSlotAvailable,
}

/// Result of a manual-move request. The placement kind lets the UI say
/// whether the drop landed exactly, snapped, or was relocated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum MoveOutcome {
    #[serde(rename = "moved")]
    Moved { placement: SlotPlacement, slot: Slot },
    #[serde(rename = "rejected")]
    Rejected {
        reason: MoveRejection,
        #[serde(default)]
        conflicts: Vec<SlotConflict>,
    },
}

/// Skip request shape: drop the whole session, or keep the first
/// `minutes` of it and re-plan the remainder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "mode", content = "minutes")]
pub enum SkipMode {
    Full,
    Partial(i64),
}

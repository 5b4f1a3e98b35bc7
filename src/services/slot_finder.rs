use chrono::NaiveDate;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::planning::{
    ConflictKind, Slot, SlotConflict, SlotPlacement, SlotValidation,
};
use crate::models::session::{SessionRef, StudySession};
use crate::models::settings::{UserSettings, MINUTES_PER_DAY};
use crate::models::task::TimeSlot;
use crate::services::commitment_expander::{CommitmentExpander, Occurrence};
use crate::services::time_utils::{self, Interval};

/// Grid the nearest-slot search walks when the requested minute is not
/// available.
pub const NEAREST_GRID_MINUTES: i64 = 5;
/// How far the nearest-slot search ranges on either side of the request.
pub const NEAREST_RADIUS_MINUTES: i64 = 6 * 60;
const MAX_ALTERNATIVES: usize = 3;

const MORNING_END_MINUTE: i64 = 12 * 60;
const AFTERNOON_END_MINUTE: i64 = 17 * 60;

/// Answers "is this slot legal?" and "where does a block of H minutes
/// fit?" against the study window, work days, buffer policy, daily
/// capacity, existing sessions, and expanded commitments.
pub struct SlotFinder<'a> {
    settings: &'a UserSettings,
    expander: &'a CommitmentExpander<'a>,
}

/// A free stretch between busy intervals. The effective bounds already
/// account for the buffer around busy neighbours; window edges carry no
/// buffer.
#[derive(Debug, Clone, Copy)]
struct Gap {
    raw: Interval,
    effective_start: i64,
    effective_end: i64,
}

impl Gap {
    fn effective_len(&self) -> i64 {
        self.effective_end - self.effective_start
    }
}

impl<'a> SlotFinder<'a> {
    pub fn new(settings: &'a UserSettings, expander: &'a CommitmentExpander<'a>) -> Self {
        Self { settings, expander }
    }

    /// Check a candidate `[start, end)` on `date` against every
    /// constraint, reporting all violations in one pass. `exclude` names
    /// a session to ignore so a move candidate does not collide with
    /// itself. All-day candidates skip the window and work-day checks
    /// (they are commitment material, not sessions).
    pub fn validate(
        &self,
        date: NaiveDate,
        start: i64,
        end: i64,
        existing: &[StudySession],
        exclude: Option<&SessionRef>,
        is_all_day: bool,
    ) -> AppResult<SlotValidation> {
        let mut conflicts = Vec::new();

        let (start, end) = if is_all_day {
            (0, MINUTES_PER_DAY)
        } else {
            (start, end)
        };

        let range_valid = start >= 0 && end <= MINUTES_PER_DAY && start < end;
        if !range_valid {
            conflicts.push(SlotConflict {
                kind: ConflictKind::InvalidTimeRange,
                message: format!(
                    "end minute {} must be after start minute {} within one day",
                    end, start
                ),
                item: None,
            });
        }

        if !is_all_day {
            if start < self.settings.study_window_start_minute
                || end > self.settings.study_window_end_minute
            {
                conflicts.push(SlotConflict {
                    kind: ConflictKind::OutsideStudyWindow,
                    message: format!(
                        "slot {}-{} lies outside the study window {}-{}",
                        time_utils::from_minutes(start.clamp(0, MINUTES_PER_DAY - 1)),
                        time_utils::from_minutes((end - 1).clamp(0, MINUTES_PER_DAY - 1)),
                        time_utils::from_minutes(self.settings.study_window_start_minute),
                        time_utils::from_minutes(self.settings.study_window_end_minute - 1),
                    ),
                    item: None,
                });
            }

            let day = time_utils::day_of_week(date);
            if !self.settings.is_work_day(day) {
                conflicts.push(SlotConflict {
                    kind: ConflictKind::NotWorkDay,
                    message: format!("{} is not a work day", time_utils::format_date(date)),
                    item: None,
                });
            }
        }

        if range_valid {
            let candidate = Interval::new(start, end)?;
            let buffer = self.settings.buffer_between_sessions_minutes;

            for session in existing {
                if Some(true) == exclude.map(|reference| session.matches(reference)) {
                    continue;
                }
                if !session.status.counts_toward_daily_total() {
                    continue;
                }
                let neighbour = session.interval()?;
                if candidate.overlaps(&neighbour.widen(buffer)) {
                    conflicts.push(SlotConflict {
                        kind: ConflictKind::SessionOverlap,
                        message: format!(
                            "overlaps session {} of task {} ({}-{})",
                            session.session_number,
                            session.task_id,
                            session.start_time,
                            session.end_time
                        ),
                        item: Some(session.task_id.clone()),
                    });
                }
            }

            for (index, occurrence) in self.expander.occurrences_on(date)? {
                let busy = match occurrence {
                    Occurrence::AllDay => Interval::FULL_DAY,
                    Occurrence::Timed(interval) => interval,
                };
                if candidate.overlaps(&busy.widen(buffer)) {
                    let commitment = &self.expander.commitments()[index];
                    conflicts.push(SlotConflict {
                        kind: ConflictKind::CommitmentConflict,
                        message: format!("conflicts with commitment {}", commitment.title),
                        item: Some(commitment.id.clone()),
                    });
                }
            }

            if !is_all_day {
                let duration = end - start;
                let used = self.used_minutes(date, existing, exclude)?;
                if used + duration > self.settings.daily_available_minutes {
                    conflicts.push(SlotConflict {
                        kind: ConflictKind::DailyLimitExceeded,
                        message: format!(
                            "{} scheduled plus {} requested exceeds the daily limit of {} minutes",
                            used, duration, self.settings.daily_available_minutes
                        ),
                        item: None,
                    });
                }
            }
        }

        if conflicts.is_empty() {
            return Ok(SlotValidation::ok());
        }

        let alternatives = if range_valid && !is_all_day {
            self.alternative_slots(date, end - start, existing, exclude)?
        } else {
            Vec::new()
        };

        debug!(
            target: "app::slots",
            date = %time_utils::format_date(date),
            conflicts = conflicts.len(),
            alternatives = alternatives.len(),
            "slot validation failed"
        );

        Ok(SlotValidation {
            ok: false,
            conflicts,
            alternatives,
        })
    }

    /// Earliest legal interval of `duration` minutes on `date`:
    /// first-fit, left-to-right across the free gaps of the study
    /// window. Returns `None` on non-work days, fully blocked days, and
    /// days without room.
    pub fn find_earliest_slot(
        &self,
        date: NaiveDate,
        duration: i64,
        existing: &[StudySession],
    ) -> AppResult<Option<Slot>> {
        if !self.settings.is_work_day(time_utils::day_of_week(date)) {
            return Ok(None);
        }
        self.find_slot_with_floor(date, duration, existing, None, None)
    }

    /// Band-biased variant for `preferred_time_slots`: the search floor
    /// rises to the band start and slots starting past the band end are
    /// rejected. Callers fall back to the unbiased search.
    pub fn find_earliest_slot_in_band(
        &self,
        date: NaiveDate,
        duration: i64,
        existing: &[StudySession],
        band: TimeSlot,
    ) -> AppResult<Option<Slot>> {
        if !self.settings.is_work_day(time_utils::day_of_week(date)) {
            return Ok(None);
        }
        let window_start = self.settings.study_window_start_minute;
        let window_end = self.settings.study_window_end_minute;
        let (floor, band_end) = match band {
            TimeSlot::Morning => (window_start, MORNING_END_MINUTE.min(window_end)),
            TimeSlot::Afternoon => (
                MORNING_END_MINUTE.max(window_start),
                AFTERNOON_END_MINUTE.min(window_end),
            ),
            TimeSlot::Evening => (AFTERNOON_END_MINUTE.max(window_start), window_end),
        };
        if floor >= band_end {
            return Ok(None);
        }
        self.find_slot_with_floor(date, duration, existing, Some(floor), Some(band_end))
    }

    /// Nearest legal slot to `target_start`, alternating outward on a
    /// 5-minute grid up to a 6-hour radius. Used for manual drops, so
    /// the work-day rule is intentionally not enforced (manual placement
    /// overrides it).
    pub fn find_nearest_slot(
        &self,
        date: NaiveDate,
        duration: i64,
        target_start: i64,
        existing: &[StudySession],
        exclude: Option<&SessionRef>,
    ) -> AppResult<Option<(Slot, SlotPlacement)>> {
        if duration <= 0 {
            return Err(AppError::validation("slot duration must be positive"));
        }
        if self.expander.has_all_day(date)? {
            return Ok(None);
        }

        if self.position_is_legal(date, target_start, duration, existing, exclude)? {
            let slot = Slot {
                start_minute: target_start,
                end_minute: target_start + duration,
            };
            return Ok(Some((slot, SlotPlacement::Exact)));
        }

        let mut delta = NEAREST_GRID_MINUTES;
        while delta <= NEAREST_RADIUS_MINUTES {
            for candidate in [target_start + delta, target_start - delta] {
                if self.position_is_legal(date, candidate, duration, existing, exclude)? {
                    let placement = if delta <= NEAREST_GRID_MINUTES {
                        SlotPlacement::SnappedToGrid
                    } else {
                        SlotPlacement::NearestAvailable
                    };
                    let slot = Slot {
                        start_minute: candidate,
                        end_minute: candidate + duration,
                    };
                    return Ok(Some((slot, placement)));
                }
            }
            delta += NEAREST_GRID_MINUTES;
        }

        Ok(None)
    }

    fn position_is_legal(
        &self,
        date: NaiveDate,
        start: i64,
        duration: i64,
        existing: &[StudySession],
        exclude: Option<&SessionRef>,
    ) -> AppResult<bool> {
        let end = start + duration;
        if start < self.settings.study_window_start_minute
            || end > self.settings.study_window_end_minute
        {
            return Ok(false);
        }
        let candidate = Interval::new(start, end)?;
        let buffer = self.settings.buffer_between_sessions_minutes;

        for session in existing {
            if Some(true) == exclude.map(|reference| session.matches(reference)) {
                continue;
            }
            if !session.status.counts_toward_daily_total() {
                continue;
            }
            if candidate.overlaps(&session.interval()?.widen(buffer)) {
                return Ok(false);
            }
        }
        for busy in self.expander.busy_intervals(date)? {
            if candidate.overlaps(&busy.widen(buffer)) {
                return Ok(false);
            }
        }

        let used = self.used_minutes(date, existing, exclude)?;
        Ok(used + duration <= self.settings.daily_available_minutes)
    }

    fn find_slot_with_floor(
        &self,
        date: NaiveDate,
        duration: i64,
        existing: &[StudySession],
        floor: Option<i64>,
        band_end: Option<i64>,
    ) -> AppResult<Option<Slot>> {
        if duration <= 0 {
            return Err(AppError::validation("slot duration must be positive"));
        }
        if self.expander.has_all_day(date)? {
            return Ok(None);
        }

        let remaining_capacity =
            self.settings.daily_available_minutes - self.used_minutes(date, existing, None)?;
        if duration > remaining_capacity {
            return Ok(None);
        }

        let window_start = floor
            .unwrap_or(self.settings.study_window_start_minute)
            .max(self.settings.study_window_start_minute);
        let window_end = self.settings.study_window_end_minute;
        if window_start >= window_end {
            return Ok(None);
        }

        let mut busy = Vec::new();
        for session in existing {
            if session.status.counts_toward_daily_total() {
                busy.push(session.interval()?);
            }
        }
        busy.extend(self.expander.busy_intervals(date)?);
        let busy = time_utils::merge_intervals(busy);

        let buffer = self.settings.buffer_between_sessions_minutes;
        for gap in free_gaps(window_start, window_end, &busy, buffer) {
            if gap.raw.len() < self.settings.min_session_minutes {
                continue;
            }
            if gap.effective_len() < duration {
                continue;
            }
            if let Some(limit) = band_end {
                if gap.effective_start >= limit {
                    continue;
                }
            }
            return Ok(Some(Slot {
                start_minute: gap.effective_start,
                end_minute: gap.effective_start + duration,
            }));
        }

        Ok(None)
    }

    fn alternative_slots(
        &self,
        date: NaiveDate,
        duration: i64,
        existing: &[StudySession],
        exclude: Option<&SessionRef>,
    ) -> AppResult<Vec<Slot>> {
        if duration <= 0 || self.expander.has_all_day(date)? {
            return Ok(Vec::new());
        }

        let mut busy = Vec::new();
        for session in existing {
            if Some(true) == exclude.map(|reference| session.matches(reference)) {
                continue;
            }
            if session.status.counts_toward_daily_total() {
                busy.push(session.interval()?);
            }
        }
        busy.extend(self.expander.busy_intervals(date)?);
        let busy = time_utils::merge_intervals(busy);

        let buffer = self.settings.buffer_between_sessions_minutes;
        let mut slots = Vec::new();
        for gap in free_gaps(
            self.settings.study_window_start_minute,
            self.settings.study_window_end_minute,
            &busy,
            buffer,
        ) {
            if gap.effective_len() >= duration {
                slots.push(Slot {
                    start_minute: gap.effective_start,
                    end_minute: gap.effective_start + duration,
                });
                if slots.len() == MAX_ALTERNATIVES {
                    break;
                }
            }
        }
        Ok(slots)
    }

    /// Minutes already consumed on `date`: non-skipped sessions plus
    /// commitments flagged `counts_toward_daily_hours`. An all-day
    /// counting commitment consumes the whole budget.
    fn used_minutes(
        &self,
        date: NaiveDate,
        existing: &[StudySession],
        exclude: Option<&SessionRef>,
    ) -> AppResult<i64> {
        let mut used = 0;
        for session in existing {
            if Some(true) == exclude.map(|reference| session.matches(reference)) {
                continue;
            }
            if session.status.counts_toward_daily_total() {
                used += session.allocated_minutes;
            }
        }
        for (index, occurrence) in self.expander.occurrences_on(date)? {
            let commitment = &self.expander.commitments()[index];
            if !commitment.counts_toward_daily_hours {
                continue;
            }
            used += match occurrence {
                Occurrence::AllDay => self.settings.daily_available_minutes,
                Occurrence::Timed(interval) => interval.len(),
            };
        }
        Ok(used)
    }
}

fn free_gaps(window_start: i64, window_end: i64, busy: &[Interval], buffer: i64) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut cursor = window_start;
    let mut left_is_busy = false;

    for interval in busy {
        if interval.end <= cursor {
            // Entirely before the cursor; it still bounds the gap when it
            // touches the cursor exactly.
            if interval.end == cursor {
                left_is_busy = true;
            }
            continue;
        }
        if interval.start >= window_end {
            break;
        }
        if interval.start > cursor {
            push_gap(
                &mut gaps,
                cursor,
                interval.start.min(window_end),
                left_is_busy,
                true,
                buffer,
            );
        }
        cursor = cursor.max(interval.end);
        left_is_busy = true;
        if cursor >= window_end {
            return gaps;
        }
    }

    if cursor < window_end {
        push_gap(&mut gaps, cursor, window_end, left_is_busy, false, buffer);
    }
    gaps
}

fn push_gap(
    gaps: &mut Vec<Gap>,
    start: i64,
    end: i64,
    left_is_busy: bool,
    right_is_busy: bool,
    buffer: i64,
) {
    if end <= start {
        return;
    }
    let raw = Interval { start, end };
    let effective_start = if left_is_busy { start + buffer } else { start };
    let effective_end = if right_is_busy { end - buffer } else { end };
    if effective_end <= effective_start {
        return;
    }
    gaps.push(Gap {
        raw,
        effective_start,
        effective_end,
    });
}

use std::cell::RefCell;
use std::num::NonZeroUsize;

use chrono::NaiveDate;
use lru::LruCache;
use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::commitment::FixedCommitment;
use crate::services::time_utils::{self, Interval};

/// The effective presence of a commitment on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    AllDay,
    Timed(Interval),
}

const EXPANSION_CACHE_ENTRIES: usize = 4096;

/// Per-planning-call view over the commitment set. Expansions are
/// memoized by `(commitment index, date)` because the planner asks for
/// the same date once per candidate session.
pub struct CommitmentExpander<'a> {
    commitments: &'a [FixedCommitment],
    cache: RefCell<LruCache<(usize, NaiveDate), Option<Occurrence>>>,
}

impl<'a> CommitmentExpander<'a> {
    pub fn new(commitments: &'a [FixedCommitment]) -> Self {
        let capacity = NonZeroUsize::new(EXPANSION_CACHE_ENTRIES).expect("non-zero cache size");
        Self {
            commitments,
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn commitments(&self) -> &'a [FixedCommitment] {
        self.commitments
    }

    /// Every commitment occurrence effective on `date`, paired with the
    /// commitment's index for attribution.
    pub fn occurrences_on(&self, date: NaiveDate) -> AppResult<Vec<(usize, Occurrence)>> {
        let mut found = Vec::new();
        for (index, commitment) in self.commitments.iter().enumerate() {
            if let Some(occurrence) = self.expand_cached(index, commitment, date)? {
                found.push((index, occurrence));
            }
        }
        Ok(found)
    }

    /// Merged busy set for `date`. An all-day occurrence collapses the
    /// whole day into a single interval.
    pub fn busy_intervals(&self, date: NaiveDate) -> AppResult<Vec<Interval>> {
        let occurrences = self.occurrences_on(date)?;
        if occurrences
            .iter()
            .any(|(_, occurrence)| matches!(occurrence, Occurrence::AllDay))
        {
            return Ok(vec![Interval::FULL_DAY]);
        }
        let intervals = occurrences
            .into_iter()
            .map(|(_, occurrence)| match occurrence {
                Occurrence::Timed(interval) => interval,
                Occurrence::AllDay => unreachable!("all-day handled above"),
            })
            .collect();
        Ok(time_utils::merge_intervals(intervals))
    }

    pub fn has_all_day(&self, date: NaiveDate) -> AppResult<bool> {
        Ok(self
            .occurrences_on(date)?
            .iter()
            .any(|(_, occurrence)| matches!(occurrence, Occurrence::AllDay)))
    }

    fn expand_cached(
        &self,
        index: usize,
        commitment: &FixedCommitment,
        date: NaiveDate,
    ) -> AppResult<Option<Occurrence>> {
        let key = (index, date);
        if let Some(cached) = self.cache.borrow_mut().get(&key) {
            return Ok(*cached);
        }
        let expanded = expand(commitment, date)?;
        self.cache.borrow_mut().put(key, expanded);
        Ok(expanded)
    }
}

/// Resolve one commitment against one date: recurrence rules, date-range
/// clipping, deleted occurrences, then timing overrides with precedence
/// per-date > per-day-of-week > commitment-wide.
pub fn expand(commitment: &FixedCommitment, date: NaiveDate) -> AppResult<Option<Occurrence>> {
    let date_key = time_utils::format_date(date);

    if commitment
        .deleted_occurrences
        .iter()
        .any(|deleted| deleted == &date_key)
    {
        return Ok(None);
    }

    if !applies_on(commitment, date, &date_key)? {
        return Ok(None);
    }

    let day = time_utils::day_of_week(date);
    let date_patch = commitment.modified_occurrences.get(&date_key);
    let day_patch = commitment
        .day_specific_timings
        .iter()
        .find(|timing| timing.day_of_week == day);

    let all_day = date_patch
        .and_then(|patch| patch.is_all_day)
        .or_else(|| day_patch.and_then(|patch| patch.is_all_day))
        .unwrap_or(commitment.is_all_day);
    if all_day {
        debug!(target: "app::expander", commitment_id = %commitment.id, date = %date_key, "all-day occurrence");
        return Ok(Some(Occurrence::AllDay));
    }

    let start_raw = date_patch
        .and_then(|patch| patch.start_time.as_deref())
        .or_else(|| day_patch.and_then(|patch| patch.start_time.as_deref()))
        .or(commitment.start_time.as_deref());
    let end_raw = date_patch
        .and_then(|patch| patch.end_time.as_deref())
        .or_else(|| day_patch.and_then(|patch| patch.end_time.as_deref()))
        .or(commitment.end_time.as_deref());

    let (start_raw, end_raw) = match (start_raw, end_raw) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(AppError::validation_with_details(
                "commitment resolves to a timed occurrence without both times",
                json!({"commitmentId": commitment.id, "date": date_key}),
            ))
        }
    };

    let start = time_utils::to_minutes(start_raw)?;
    let end = time_utils::to_minutes(end_raw)?;
    let interval = Interval::new(start, end).map_err(|_| {
        AppError::validation_with_details(
            "commitment occurrence must end after it starts within one day",
            json!({
                "commitmentId": commitment.id,
                "date": date_key,
                "startTime": start_raw,
                "endTime": end_raw,
            }),
        )
    })?;

    Ok(Some(Occurrence::Timed(interval)))
}

fn applies_on(commitment: &FixedCommitment, date: NaiveDate, date_key: &str) -> AppResult<bool> {
    if commitment.recurring {
        if !commitment
            .days_of_week
            .contains(&time_utils::day_of_week(date))
        {
            return Ok(false);
        }
        if let Some(range) = &commitment.date_range {
            let start = time_utils::parse_date(&range.start)?;
            let end = time_utils::parse_date(&range.end)?;
            // range end is inclusive
            if date < start || date > end {
                return Ok(false);
            }
        }
        Ok(true)
    } else {
        Ok(commitment
            .specific_dates
            .iter()
            .any(|specific| specific == date_key))
    }
}

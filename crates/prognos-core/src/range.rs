//! Time ranges produced by range strategies.
//!
//! A [`Range`] is a half-open sub-interval `[start, end)` of an analysable's span. The ranges
//! produced for one analysable must be strictly increasing and pairwise non-overlapping, and
//! each must have `end > start`; [`check_ranges`] verifies that contract.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// 1-based position of the range within its strategy's output.
    pub index: u32,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Range {
    #[must_use]
    pub const fn new(index: u32, start: Timestamp, end: Timestamp) -> Self {
        Self { index, start, end }
    }

    #[must_use]
    pub const fn duration(&self) -> Timestamp {
        self.end - self.start
    }

    #[must_use]
    pub const fn contains(&self, time: Timestamp) -> bool {
        self.start <= time && time < self.end
    }

    /// Whether the whole range lies in the past at `now`.
    #[must_use]
    pub const fn has_elapsed(&self, now: Timestamp) -> bool {
        self.end <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum RangeContractError {
    #[display("range {index} is empty: [{start}, {end})")]
    Empty {
        index: u32,
        start: Timestamp,
        end: Timestamp,
    },
    #[display("range {next} starts before range {previous} ends")]
    Overlapping { previous: u32, next: u32 },
}

/// Checks that `ranges` are non-empty, strictly increasing and pairwise non-overlapping.
pub fn check_ranges(ranges: &[Range]) -> Result<(), RangeContractError> {
    for range in ranges {
        if range.end <= range.start {
            return Err(RangeContractError::Empty {
                index: range.index,
                start: range.start,
                end: range.end,
            });
        }
    }
    for pair in ranges.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if next.start < previous.end {
            return Err(RangeContractError::Overlapping {
                previous: previous.index,
                next: next.index,
            });
        }
    }
    Ok(())
}

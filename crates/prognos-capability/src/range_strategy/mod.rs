//! Range strategies: partitioning an analysable's span into time ranges.
//!
//! A [`RangeStrategy`] turns an analysable into an ordered sequence of non-overlapping
//! [`Range`]s covering a prefix of its `[start, end)` span. Strategies are stateless and
//! identified by a short code, which also names the dataset artifacts built from their ranges.
//!
//! # Available Strategies
//!
//! - [`EqualSplit`] - A fixed number of equal-width ranges ([`EqualSplit::quarters()`] is the
//!   reference strategy)
//! - [`FixedWidth`] - Consecutive ranges of a fixed duration ([`FixedWidth::weekly()`])
//!
//! # Elapsed-Range Gate
//!
//! Strategies that return `true` from [`RangeStrategy::past_only()`] only yield ranges that
//! have fully elapsed at "now". The gate lives in the provided [`RangeStrategy::ranges()`]
//! method so every strategy gets it regardless of its partitioning formula.

use std::{fmt, sync::Arc};

use prognos_core::{Analysable, Range, Timestamp};

pub use self::{equal_split::EqualSplit, fixed_width::FixedWidth};

mod equal_split;
mod fixed_width;

pub trait RangeStrategy: fmt::Debug + Send + Sync {
    /// Short code identifying the strategy and its artifacts.
    #[must_use]
    fn code(&self) -> &str;

    #[must_use]
    fn name(&self) -> &str;

    /// Whether ranges ending after "now" are withheld.
    #[must_use]
    fn past_only(&self) -> bool {
        false
    }

    /// Every range the strategy defines for `analysable`, elapsed or not.
    #[must_use]
    fn define_ranges(&self, analysable: &Analysable) -> Vec<Range>;

    /// Ranges ready for analysis at `now`.
    #[must_use]
    fn ranges(&self, analysable: &Analysable, now: Timestamp) -> Vec<Range> {
        let ranges = self.define_ranges(analysable);
        if !self.past_only() {
            return ranges;
        }
        ranges
            .into_iter()
            .filter(|range| range.has_elapsed(now))
            .collect()
    }
}

pub type SharedRangeStrategy = Arc<dyn RangeStrategy>;

#[cfg(test)]
mod tests {
    use prognos_core::{AnalysableId, AnalysableKind, AnalysableSpan};

    use super::*;

    #[derive(Debug)]
    struct Halves {
        past_only: bool,
    }

    impl RangeStrategy for Halves {
        fn code(&self) -> &'static str {
            "halves"
        }

        fn name(&self) -> &'static str {
            "Halves"
        }

        fn past_only(&self) -> bool {
            self.past_only
        }

        fn define_ranges(&self, analysable: &Analysable) -> Vec<Range> {
            let middle = analysable.start() + analysable.duration() / 2;
            vec![
                Range::new(1, analysable.start(), middle),
                Range::new(2, middle, analysable.end()),
            ]
        }
    }

    fn analysable() -> Analysable {
        let span = AnalysableSpan {
            id: AnalysableId(1),
            kind: AnalysableKind::Course,
            start: 0,
            end: 100,
        };
        Analysable::new(span, Default::default()).unwrap()
    }

    #[test]
    fn test_elapsed_gate_applies_only_when_flagged() {
        let gated = Halves { past_only: true };
        let ungated = Halves { past_only: false };
        let analysable = analysable();

        assert_eq!(gated.ranges(&analysable, 49).len(), 0);
        assert_eq!(gated.ranges(&analysable, 50).len(), 1);
        assert_eq!(gated.ranges(&analysable, 100).len(), 2);
        assert_eq!(ungated.ranges(&analysable, 0).len(), 2);
    }
}

use prognos_core::{Analysable, Range, Timestamp, WEEK_SECS};

use super::RangeStrategy;

/// Consecutive ranges of a fixed duration, anchored at the analysable start.
///
/// Only complete ranges are produced; a trailing partial window is left uncovered, the same
/// truncation policy as [`EqualSplit`](super::EqualSplit).
#[derive(Debug, Clone)]
pub struct FixedWidth {
    code: String,
    name: String,
    width: Timestamp,
    past_only: bool,
}

impl FixedWidth {
    #[must_use]
    pub fn new(code: &str, name: &str, width: Timestamp, past_only: bool) -> Self {
        assert!(width > 0, "range width must be positive");
        Self {
            code: code.to_owned(),
            name: name.to_owned(),
            width,
            past_only,
        }
    }

    /// One range per elapsed week.
    #[must_use]
    pub fn weekly() -> Self {
        Self::new("weekly", "Weekly", WEEK_SECS, true)
    }
}

impl RangeStrategy for FixedWidth {
    fn code(&self) -> &str {
        &self.code
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn past_only(&self) -> bool {
        self.past_only
    }

    fn define_ranges(&self, analysable: &Analysable) -> Vec<Range> {
        let mut ranges = vec![];
        let mut start = analysable.start();
        let mut index = 1;
        while start + self.width <= analysable.end() {
            ranges.push(Range::new(index, start, start + self.width));
            start += self.width;
            index += 1;
        }
        ranges
    }
}

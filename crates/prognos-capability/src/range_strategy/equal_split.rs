use prognos_core::{Analysable, Range};

use super::RangeStrategy;

/// Splits the span into `parts` ranges of equal width.
///
/// # Ranges
///
/// - `width = floor((end - start) / parts)`
/// - range `i` (1-based) spans `[start + (i - 1) * width, start + i * width)`
///
/// The remainder of a non-exact division is not given to any range: the last
/// `(end - start) mod parts` seconds of the span stay uncovered, so boundaries only depend on
/// `start` and the width. Spans shorter than `parts` seconds produce no ranges.
#[derive(Debug, Clone)]
pub struct EqualSplit {
    code: String,
    name: String,
    parts: u32,
}

impl EqualSplit {
    #[must_use]
    pub fn new(code: &str, name: &str, parts: u32) -> Self {
        assert!(parts > 0, "an equal split needs at least one part");
        Self {
            code: code.to_owned(),
            name: name.to_owned(),
            parts,
        }
    }

    /// Four equal quarters.
    #[must_use]
    pub fn quarters() -> Self {
        Self::new("quarters", "Quarters", 4)
    }

    /// The whole span as one range.
    #[must_use]
    pub fn single() -> Self {
        Self::new("single_range", "Single Range", 1)
    }

    #[must_use]
    pub fn parts(&self) -> u32 {
        self.parts
    }
}

impl RangeStrategy for EqualSplit {
    fn code(&self) -> &str {
        &self.code
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn define_ranges(&self, analysable: &Analysable) -> Vec<Range> {
        let start = analysable.start();
        let width = analysable.duration() / i64::from(self.parts);
        if width == 0 {
            return vec![];
        }
        (1..=self.parts)
            .map(|index| {
                let i = i64::from(index);
                Range::new(index, start + (i - 1) * width, start + i * width)
            })
            .collect()
    }
}

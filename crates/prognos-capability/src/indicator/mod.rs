//! Indicators: per-sample feature extraction.
//!
//! An [`Indicator`] computes one feature value for a sample within a range of an analysable.
//! Values are in \[-1.0, 1.0\] by convention. An indicator may report that it does not apply
//! (`Ok(None)`); the dataset records that as a missing value, not as an error.
//!
//! # Available Indicators
//!
//! - [`FeedbackViewed`] - Whether the sample looked at feedback after being graded in a given
//!   activity kind. One parameterized type covers every activity kind.
//! - [`AnyCourseAccess`] - Whether the sample produced any activity in the range.

use std::{fmt, sync::Arc};

use prognos_core::{
    Analysable, AnalysableKind, Range, SampleId,
    collaborator::{CollaboratorError, EventLogQuery},
};

pub use self::{access::AnyCourseAccess, feedback::FeedbackViewed};

mod access;
mod feedback;

/// Highest indicator value.
pub const INDICATOR_MAX: f64 = 1.0;
/// Lowest indicator value.
pub const INDICATOR_MIN: f64 = -1.0;

pub trait Indicator: fmt::Debug + Send + Sync {
    /// Fully-qualified identity, also used as the dataset column name.
    #[must_use]
    fn id(&self) -> &str;

    #[must_use]
    fn name(&self) -> &str;

    /// Whether the indicator produces a column for analysables of `kind`.
    #[must_use]
    fn applies_to(&self, kind: AnalysableKind) -> bool {
        let _ = kind;
        true
    }

    /// Feature value of `sample` within `range`, or `None` when it does not apply.
    fn value(
        &self,
        logs: &dyn EventLogQuery,
        sample: SampleId,
        range: &Range,
        analysable: &Analysable,
    ) -> Result<Option<f64>, CollaboratorError>;
}

pub type SharedIndicator = Arc<dyn Indicator>;

/// Maps a yes/no observation to the indicator value range.
#[must_use]
pub fn binary_value(observed: bool) -> f64 {
    if observed { INDICATOR_MAX } else { INDICATOR_MIN }
}

//! Targets: deciding what is being predicted.
//!
//! A [`Target`] supplies the label column of a dataset. It first gates each analysable with
//! [`Target::validate()`]; a rejection is a typed "skip this analysable" outcome carrying a
//! diagnostic, never a panic. Accepted analysables then have each sample labelled with
//! [`Target::label()`].
//!
//! # Available Targets
//!
//! - [`CourseDropout`] - Binary dropout label for course analysables

use std::fmt;

use prognos_core::{
    Analysable, AnalysableKind, Label, SampleId, Timestamp, collaborator::CollaboratorError,
};

pub use self::dropout::CourseDropout;

mod dropout;

/// Label of a sample that stayed on track.
pub const RETAINED: Label = 0;
/// Label of a sample that dropped out.
pub const DROPOUT: Label = 1;

/// Why a target refused an analysable.
///
/// The display string is the diagnostic reported in the analyser's message map.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ValidationRejection {
    #[display("Analysable is not yet finished")]
    NotFinished,
    #[display("Duration is more than 1 year")]
    TooLong,
    #[display("Not enough logs")]
    NotEnoughLogs,
    #[display("No pass method available (no completion, competencies or course grades)")]
    NoOutcomeChannel,
    #[display("Data unavailable: {reason}")]
    DataUnavailable { reason: String },
}

impl From<CollaboratorError> for ValidationRejection {
    fn from(err: CollaboratorError) -> Self {
        Self::DataUnavailable {
            reason: err.to_string(),
        }
    }
}

pub trait Target: fmt::Debug + Send + Sync {
    #[must_use]
    fn id(&self) -> &str;

    /// Kind of analysable this target labels, which decides the analyser scope.
    #[must_use]
    fn analysable_kind(&self) -> AnalysableKind;

    /// Whether labels are continuous rather than classes.
    #[must_use]
    fn is_linear(&self) -> bool;

    /// Drops per-run memoized data. Called at the start of every run.
    fn reset(&self) {}

    /// `Ok(())` if the analysable can be labelled, otherwise the reason it cannot.
    fn validate(&self, analysable: &Analysable, now: Timestamp) -> Result<(), ValidationRejection>;

    fn label(&self, sample: SampleId, analysable: &Analysable) -> Result<Label, CollaboratorError>;

    /// Post-prediction hook for external consumers. Must not fail.
    fn notify(&self, sample: SampleId, prediction: Label, score: f64);
}

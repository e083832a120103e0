//! Contracts for the external systems the pipeline reads from.
//!
//! Each trait is deliberately narrow: it answers exactly the questions the range strategies,
//! indicators and targets ask, and nothing about how the answers are stored. Implementations
//! report failures as [`CollaboratorError`]; the analyser turns those into a per-analysable
//! error status instead of aborting the batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Timestamp,
    analysable::{AnalysableId, AnalysableSpan, Enrolment, InvalidSpanError, SampleId},
};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum CollaboratorError {
    #[display("unknown analysable {id}")]
    #[from(ignore)]
    UnknownAnalysable { id: AnalysableId },
    #[display("{_0}")]
    InvalidSpan(InvalidSpanError),
    #[display("{service} unavailable: {reason}")]
    #[from(ignore)]
    Unavailable {
        service: &'static str,
        reason: String,
    },
}

/// Lists the analysables known to the system.
pub trait AnalysableSource: Send + Sync {
    /// The single site-wide analysable.
    fn site(&self) -> Result<AnalysableSpan, CollaboratorError>;

    /// Every course analysable.
    fn courses(&self) -> Result<Vec<AnalysableSpan>, CollaboratorError>;
}

/// Maps an analysable to its samples.
pub trait SampleSource: Send + Sync {
    fn samples(
        &self,
        span: &AnalysableSpan,
    ) -> Result<BTreeMap<SampleId, Enrolment>, CollaboratorError>;
}

/// Filter for activity-log queries.
///
/// Matches entries of `analysable` with `start <= time < end` whose sample is in `samples`
/// and whose anonymity flag equals `anonymous`. When `event_kinds` is `Some`, only entries
/// of one of those kinds match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub analysable: AnalysableId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub samples: Vec<SampleId>,
    pub anonymous: bool,
    pub event_kinds: Option<Vec<String>>,
}

impl LogQuery {
    #[must_use]
    pub fn new(analysable: AnalysableId, start: Timestamp, end: Timestamp) -> Self {
        Self {
            analysable,
            start,
            end,
            samples: vec![],
            anonymous: false,
            event_kinds: None,
        }
    }

    #[must_use]
    pub fn samples<I>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = SampleId>,
    {
        self.samples = samples.into_iter().collect();
        self
    }

    #[must_use]
    pub fn event_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_kinds = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn matches_kind(&self, kind: &str) -> bool {
        self.event_kinds
            .as_ref()
            .is_none_or(|kinds| kinds.iter().any(|k| k == kind))
    }
}

/// Read access to the activity log.
pub trait EventLogQuery: Send + Sync {
    /// Number of matching log entries.
    fn count(&self, query: &LogQuery) -> Result<u64, CollaboratorError>;

    /// Timestamp of the earliest matching log entry, if any.
    fn first_after(&self, query: &LogQuery) -> Result<Option<Timestamp>, CollaboratorError>;
}

pub trait CompletionService: Send + Sync {
    fn is_enabled(&self, analysable: AnalysableId) -> Result<bool, CollaboratorError>;
    fn has_criteria(&self, analysable: AnalysableId) -> Result<bool, CollaboratorError>;
    fn is_complete(
        &self,
        analysable: AnalysableId,
        sample: SampleId,
    ) -> Result<bool, CollaboratorError>;
}

pub trait CompetencyService: Send + Sync {
    /// Number of competencies associated with the analysable.
    fn count_competencies(&self, analysable: AnalysableId) -> Result<u32, CollaboratorError>;

    /// Number of the analysable's competencies the sample is proficient in.
    fn count_proficient(
        &self,
        analysable: AnalysableId,
        sample: SampleId,
    ) -> Result<u32, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(transparent)]
pub struct GradeItemId(pub u64);

/// The course-level grade item of an analysable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeItem {
    pub id: GradeItemId,
    /// Whether the item is graded on a numeric scale.
    pub numeric: bool,
}

/// A sample's grade against a grade item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub final_grade: Option<f64>,
    pub min: f64,
    pub max: f64,
    /// Pass threshold; `None` or `<= 0` means no threshold is configured.
    pub pass: Option<f64>,
}

pub trait GradeService: Send + Sync {
    fn course_grade_item(
        &self,
        analysable: AnalysableId,
    ) -> Result<Option<GradeItem>, CollaboratorError>;

    fn grade(&self, item: &GradeItem, sample: SampleId)
    -> Result<Option<Grade>, CollaboratorError>;

    /// `(min, max)` of the grade's scale.
    fn grade_bounds(&self, grade: &Grade) -> (f64, f64) {
        (grade.min, grade.max)
    }

    /// Whether the grade reaches its pass threshold, or `None` when that cannot be decided.
    fn is_passed(&self, grade: &Grade) -> Option<bool> {
        match (grade.pass, grade.final_grade) {
            (Some(pass), Some(final_grade)) if pass > 0.0 => Some(final_grade >= pass),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DefaultGrades;

    impl GradeService for DefaultGrades {
        fn course_grade_item(
            &self,
            _analysable: AnalysableId,
        ) -> Result<Option<GradeItem>, CollaboratorError> {
            Ok(None)
        }

        fn grade(
            &self,
            _item: &GradeItem,
            _sample: SampleId,
        ) -> Result<Option<Grade>, CollaboratorError> {
            Ok(None)
        }
    }

    fn grade(final_grade: Option<f64>, pass: Option<f64>) -> Grade {
        Grade {
            final_grade,
            min: 0.0,
            max: 100.0,
            pass,
        }
    }

    #[test]
    fn test_is_passed_requires_positive_threshold() {
        let grades = DefaultGrades;
        assert_eq!(grades.is_passed(&grade(Some(60.0), Some(50.0))), Some(true));
        assert_eq!(grades.is_passed(&grade(Some(40.0), Some(50.0))), Some(false));
        assert_eq!(grades.is_passed(&grade(Some(40.0), Some(0.0))), None);
        assert_eq!(grades.is_passed(&grade(Some(40.0), None)), None);
        assert_eq!(grades.is_passed(&grade(None, Some(50.0))), None);
        assert_eq!(grades.grade_bounds(&grade(None, None)), (0.0, 100.0));
    }

    #[test]
    fn test_log_query_kind_filter() {
        let any = LogQuery::new(AnalysableId(1), 0, 10);
        assert!(any.matches_kind("viewed"));

        let filtered = any.clone().event_kinds(["graded", "viewed"]);
        assert!(filtered.matches_kind("viewed"));
        assert!(!filtered.matches_kind("submitted"));
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = CollaboratorError::Unavailable {
            service: "grades",
            reason: "timeout".into(),
        };
        assert_eq!(err.to_string(), "grades unavailable: timeout");
        let err = CollaboratorError::UnknownAnalysable {
            id: AnalysableId(9),
        };
        assert_eq!(err.to_string(), "unknown analysable 9");
    }
}

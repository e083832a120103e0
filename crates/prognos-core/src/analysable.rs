//! Analysables: the time-bounded subjects datasets are built from.
//!
//! An [`Analysable`] is constructed once per run from an [`AnalysableSpan`] (identity and
//! time bounds, as reported by an
//! [`AnalysableSource`](crate::collaborator::AnalysableSource)) and the enrolment map
//! reported by a [`SampleSource`](crate::collaborator::SampleSource). It is immutable for
//! the rest of the run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Identity of an analysable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct AnalysableId(pub u64);

/// Identity of a sample, scoped to one analysable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct SampleId(pub u64);

/// What an analysable represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum AnalysableKind {
    /// The whole site, analysed as a single subject.
    #[display("site")]
    Site,
    /// A single course.
    #[display("course")]
    Course,
}

/// Enrolment-like metadata attached to a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrolment {
    /// When the sample joined the analysable, if known.
    pub enrolled_at: Option<Timestamp>,
}

/// Identity and time bounds of an analysable, before its samples are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysableSpan {
    pub id: AnalysableId,
    pub kind: AnalysableKind,
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("analysable {id} has an empty span [{start}, {end})")]
pub struct InvalidSpanError {
    pub id: AnalysableId,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A time-bounded subject exposing a sample set and a `[start, end)` span.
#[derive(Debug, Clone)]
pub struct Analysable {
    span: AnalysableSpan,
    samples: BTreeMap<SampleId, Enrolment>,
}

impl Analysable {
    /// Builds an analysable, rejecting spans where `start >= end`.
    pub fn new(
        span: AnalysableSpan,
        samples: BTreeMap<SampleId, Enrolment>,
    ) -> Result<Self, InvalidSpanError> {
        if span.start >= span.end {
            return Err(InvalidSpanError {
                id: span.id,
                start: span.start,
                end: span.end,
            });
        }
        Ok(Self { span, samples })
    }

    #[must_use]
    pub fn span(&self) -> &AnalysableSpan {
        &self.span
    }

    #[must_use]
    pub fn id(&self) -> AnalysableId {
        self.span.id
    }

    #[must_use]
    pub fn kind(&self) -> AnalysableKind {
        self.span.kind
    }

    #[must_use]
    pub fn start(&self) -> Timestamp {
        self.span.start
    }

    #[must_use]
    pub fn end(&self) -> Timestamp {
        self.span.end
    }

    /// Length of the span in seconds (always positive).
    #[must_use]
    pub fn duration(&self) -> Timestamp {
        self.span.end - self.span.start
    }

    /// Whether the span has fully elapsed at `now`.
    #[must_use]
    pub fn is_finished(&self, now: Timestamp) -> bool {
        self.span.end <= now
    }

    #[must_use]
    pub fn samples(&self) -> &BTreeMap<SampleId, Enrolment> {
        &self.samples
    }

    pub fn sample_ids(&self) -> impl Iterator<Item = SampleId> + '_ {
        self.samples.keys().copied()
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: Timestamp, end: Timestamp) -> AnalysableSpan {
        AnalysableSpan {
            id: AnalysableId(7),
            kind: AnalysableKind::Course,
            start,
            end,
        }
    }

    #[test]
    fn test_rejects_empty_span() {
        assert!(Analysable::new(span(10, 10), BTreeMap::new()).is_err());
        assert!(Analysable::new(span(20, 10), BTreeMap::new()).is_err());
        let err = Analysable::new(span(5, 5), BTreeMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "analysable 7 has an empty span [5, 5)");
    }

    #[test]
    fn test_accessors() {
        let samples = [(SampleId(2), Enrolment::default()), (SampleId(1), Enrolment::default())]
            .into_iter()
            .collect();
        let analysable = Analysable::new(span(100, 500), samples).unwrap();
        assert_eq!(analysable.id(), AnalysableId(7));
        assert_eq!(analysable.kind(), AnalysableKind::Course);
        assert_eq!(analysable.duration(), 400);
        assert_eq!(analysable.sample_count(), 2);
        assert_eq!(
            analysable.sample_ids().collect::<Vec<_>>(),
            vec![SampleId(1), SampleId(2)]
        );
        assert!(!analysable.is_finished(499));
        assert!(analysable.is_finished(500));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&(AnalysableId(3), SampleId(4))).unwrap();
        assert_eq!(json, "[3,4]");
    }
}

use prognos_core::{
    Analysable, Range, SampleId,
    collaborator::{CollaboratorError, EventLogQuery, LogQuery},
};

use super::{Indicator, binary_value};

/// Any activity of the sample within the range.
///
/// # Value
///
/// - `1.0` if at least one non-anonymous log entry of the sample falls inside the range
/// - `-1.0` otherwise
///
/// Applies to every analysable kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyCourseAccess;

impl AnyCourseAccess {
    pub const ID: &'static str = "indicator::any_course_access";
}

impl Indicator for AnyCourseAccess {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Any Course Access"
    }

    fn value(
        &self,
        logs: &dyn EventLogQuery,
        sample: SampleId,
        range: &Range,
        analysable: &Analysable,
    ) -> Result<Option<f64>, CollaboratorError> {
        let query = LogQuery::new(analysable.id(), range.start, range.end).samples([sample]);
        let count = logs.count(&query)?;
        Ok(Some(binary_value(count > 0)))
    }
}

#[cfg(test)]
mod tests {
    use prognos_core::{
        AnalysableId, AnalysableKind, AnalysableSpan,
        memory::{CourseRecord, LogEntry, MemoryBackend},
    };

    use super::*;

    #[test]
    fn test_access_in_range() {
        let span = AnalysableSpan {
            id: AnalysableId(2),
            kind: AnalysableKind::Course,
            start: 0,
            end: 400,
        };
        let backend = MemoryBackend::new(AnalysableId(1))
            .with_course(CourseRecord::new(span).enrol(SampleId(1)).enrol(SampleId(2)))
            .with_log(LogEntry::new(AnalysableId(2), SampleId(1), 150, "course_viewed"));
        let analysable = Analysable::new(span, [(SampleId(1), Default::default())].into())
            .unwrap();

        let indicator = AnyCourseAccess;
        let first = Range::new(1, 0, 100);
        let second = Range::new(2, 100, 200);
        assert_eq!(
            indicator.value(&backend, SampleId(1), &first, &analysable).unwrap(),
            Some(-1.0)
        );
        assert_eq!(
            indicator.value(&backend, SampleId(1), &second, &analysable).unwrap(),
            Some(1.0)
        );
        assert_eq!(
            indicator.value(&backend, SampleId(2), &second, &analysable).unwrap(),
            Some(-1.0)
        );
        assert!(indicator.applies_to(AnalysableKind::Site));
    }
}

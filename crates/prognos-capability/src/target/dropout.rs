use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use prognos_core::{
    Analysable, AnalysableId, AnalysableKind, Label, SampleId, Timestamp, WEEK_SECS, YEAR_SECS,
    collaborator::{CollaboratorError, GradeItem, LogQuery},
    services::Services,
};

use super::{DROPOUT, RETAINED, Target, ValidationRejection};

/// Minimum log entries expected per week from each participating sample.
const LOGS_PER_WEEK: f64 = 5.0;

/// Normalized grade below which a sample without a pass threshold counts as dropped out.
const PASS_RATIO: f64 = 0.5;

/// Binary dropout label for a course.
///
/// # Validity Gates
///
/// Checked in order; the first failing gate is reported:
///
/// 1. The course has finished
/// 2. The course lasted at most one year
/// 3. Non-anonymous activity of the course's samples reaches
///    `weeks * (samples / 2) * 5` log entries (fractional weeks)
/// 4. There is a way to tell outcomes apart: completion tracking enabled with criteria, at
///    least one competency, or a numeric course grade item
///
/// # Label Cascade
///
/// The first applicable rule wins (`0` = retained, `1` = dropout):
///
/// 1. Completion enabled with criteria: `1 - completed`
/// 2. At least one competency: `1` unless proficient in all of them
/// 3. Course grade: `1` without a grade item, a grade record or a non-zero final grade;
///    otherwise `1 - passed` when a pass threshold exists, else `1` when the normalized grade
///    `(final - min) / (max - min)` is below 0.5
///
/// The course grade item is fetched once per course and run and memoized.
#[derive(Debug)]
pub struct CourseDropout {
    services: Services,
    grade_items: Mutex<HashMap<AnalysableId, Option<GradeItem>>>,
}

impl CourseDropout {
    pub const ID: &'static str = "target::course_dropout";

    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            services,
            grade_items: Mutex::new(HashMap::new()),
        }
    }

    fn course_grade_item(
        &self,
        analysable: AnalysableId,
    ) -> Result<Option<GradeItem>, CollaboratorError> {
        let mut grade_items = self
            .grade_items
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(item) = grade_items.get(&analysable) {
            return Ok(*item);
        }
        let item = self.services.grades.course_grade_item(analysable)?;
        grade_items.insert(analysable, item);
        Ok(item)
    }

    fn completion_tracked(&self, analysable: AnalysableId) -> Result<bool, CollaboratorError> {
        let completion = &self.services.completion;
        Ok(completion.is_enabled(analysable)? && completion.has_criteria(analysable)?)
    }

    #[expect(clippy::cast_precision_loss)]
    fn has_enough_logs(&self, analysable: &Analysable) -> Result<bool, CollaboratorError> {
        // Logs at the start instant do not count.
        let start = analysable.start().saturating_add(1);
        let query = LogQuery::new(analysable.id(), start, analysable.end())
            .samples(analysable.sample_ids());
        let logs = self.services.logs.count(&query)?;

        let weeks = analysable.duration() as f64 / WEEK_SECS as f64;
        let samples = analysable.sample_count() as f64;
        Ok(logs as f64 >= weeks * (samples / 2.0) * LOGS_PER_WEEK)
    }

    fn grade_label(
        &self,
        sample: SampleId,
        analysable: &Analysable,
    ) -> Result<Label, CollaboratorError> {
        let grades = &self.services.grades;
        let Some(item) = self.course_grade_item(analysable.id())? else {
            return Ok(DROPOUT);
        };
        // A zero final grade counts as no grade at all.
        let Some((grade, final_grade)) = grades
            .grade(&item, sample)?
            .and_then(|grade| grade.final_grade.map(|f| (grade, f)))
            .filter(|(_, f)| *f != 0.0)
        else {
            return Ok(DROPOUT);
        };

        if let Some(passed) = grades.is_passed(&grade) {
            return Ok(if passed { RETAINED } else { DROPOUT });
        }

        let (min, max) = grades.grade_bounds(&grade);
        if max <= min {
            return Ok(DROPOUT);
        }
        let normalized = (final_grade - min) / (max - min);
        Ok(if normalized < PASS_RATIO {
            DROPOUT
        } else {
            RETAINED
        })
    }
}

impl Target for CourseDropout {
    fn id(&self) -> &str {
        Self::ID
    }

    fn analysable_kind(&self) -> AnalysableKind {
        AnalysableKind::Course
    }

    fn is_linear(&self) -> bool {
        false
    }

    fn reset(&self) {
        self.grade_items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn validate(&self, analysable: &Analysable, now: Timestamp) -> Result<(), ValidationRejection> {
        if !analysable.is_finished(now) {
            return Err(ValidationRejection::NotFinished);
        }
        if analysable.duration() > YEAR_SECS {
            return Err(ValidationRejection::TooLong);
        }
        if !self.has_enough_logs(analysable)? {
            return Err(ValidationRejection::NotEnoughLogs);
        }

        let id = analysable.id();
        let completion = self.completion_tracked(id)?;
        let competencies = self.services.competencies.count_competencies(id)? > 0;
        let numeric_grade = self.course_grade_item(id)?.is_some_and(|item| item.numeric);
        if !completion && !competencies && !numeric_grade {
            return Err(ValidationRejection::NoOutcomeChannel);
        }
        Ok(())
    }

    fn label(&self, sample: SampleId, analysable: &Analysable) -> Result<Label, CollaboratorError> {
        let id = analysable.id();
        if self.completion_tracked(id)? {
            let complete = self.services.completion.is_complete(id, sample)?;
            return Ok(if complete { RETAINED } else { DROPOUT });
        }

        let total = self.services.competencies.count_competencies(id)?;
        if total > 0 {
            let proficient = self.services.competencies.count_proficient(id, sample)?;
            return Ok(if proficient < total { DROPOUT } else { RETAINED });
        }

        self.grade_label(sample, analysable)
    }

    fn notify(&self, sample: SampleId, prediction: Label, score: f64) {
        tracing::info!(
            target_id = Self::ID,
            %sample,
            prediction,
            score,
            "Dropout prediction available"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use prognos_core::{
        AnalysableSpan,
        collaborator::{Grade, GradeItemId},
        memory::{CourseRecord, LogEntry, MemoryBackend},
    };

    use super::*;

    const SITE: AnalysableId = AnalysableId(1);
    const COURSE: AnalysableId = AnalysableId(2);
    const END: Timestamp = 4 * WEEK_SECS;

    fn span(end: Timestamp) -> AnalysableSpan {
        AnalysableSpan {
            id: COURSE,
            kind: AnalysableKind::Course,
            start: 0,
            end,
        }
    }

    /// Two enrolled samples over four weeks need 4 * (2 / 2) * 5 = 20 log entries.
    fn course(end: Timestamp) -> CourseRecord {
        CourseRecord::new(span(end)).enrol(SampleId(1)).enrol(SampleId(2))
    }

    fn logs(count: u32) -> Vec<LogEntry> {
        (1..=count)
            .map(|i| LogEntry::new(COURSE, SampleId(1), Timestamp::from(i) * 60, "viewed"))
            .collect()
    }

    fn target(backend: MemoryBackend) -> CourseDropout {
        CourseDropout::new(Services::from_backend(Arc::new(backend)))
    }

    fn analysable(record: &CourseRecord) -> Analysable {
        Analysable::new(record.span, record.enrolments.clone()).unwrap()
    }

    fn numeric_item() -> GradeItem {
        GradeItem {
            id: GradeItemId(9),
            numeric: true,
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

    fn validate(
        record: CourseRecord,
        log_count: u32,
        now: Timestamp,
    ) -> Result<(), ValidationRejection> {
        let analysable = analysable(&record);
        let backend = MemoryBackend::new(SITE)
            .with_course(record)
            .with_logs(logs(log_count));
        target(backend).validate(&analysable, now)
    }

    fn label_of(record: CourseRecord, sample: SampleId) -> Label {
        let analysable = analysable(&record);
        let target = target(MemoryBackend::new(SITE).with_course(record));
        target.label(sample, &analysable).unwrap()
    }

    #[test]
    fn test_validate_accepts_valid_course() {
        let record = course(END).grade_item(numeric_item());
        assert_eq!(validate(record, 20, END), Ok(()));
    }

    #[test]
    fn test_validate_rejects_unfinished_course() {
        let record = course(END).grade_item(numeric_item());
        let rejection = validate(record, 20, END - 1).unwrap_err();
        assert_eq!(rejection, ValidationRejection::NotFinished);
        assert_eq!(rejection.to_string(), "Analysable is not yet finished");
    }

    #[test]
    fn test_validate_rejects_long_course() {
        let record = course(YEAR_SECS + 1).grade_item(numeric_item());
        assert_eq!(
            validate(record, 10_000, YEAR_SECS + 1),
            Err(ValidationRejection::TooLong)
        );
        let record = course(YEAR_SECS).grade_item(numeric_item());
        assert_ne!(
            validate(record, 10_000, YEAR_SECS),
            Err(ValidationRejection::TooLong),
            "exactly one year is allowed"
        );
    }

    #[test]
    fn test_validate_rejects_quiet_course() {
        let record = course(END).grade_item(numeric_item());
        assert_eq!(
            validate(record, 19, END),
            Err(ValidationRejection::NotEnoughLogs)
        );
    }

    #[test]
    fn test_validate_ignores_logs_at_start() {
        let mut entries = logs(19);
        entries.push(LogEntry::new(COURSE, SampleId(1), 0, "viewed"));
        let record = course(END).grade_item(numeric_item());
        let analysable = analysable(&record);
        let backend = MemoryBackend::new(SITE).with_course(record).with_logs(entries);
        assert_eq!(
            target(backend).validate(&analysable, END),
            Err(ValidationRejection::NotEnoughLogs),
            "a log at the start instant must not count"
        );
    }

    #[test]
    fn test_validate_requires_outcome_channel() {
        assert_eq!(
            validate(course(END), 20, END),
            Err(ValidationRejection::NoOutcomeChannel)
        );
        let scale_item = GradeItem {
            id: GradeItemId(9),
            numeric: false,
        };
        assert_eq!(
            validate(course(END).grade_item(scale_item), 20, END),
            Err(ValidationRejection::NoOutcomeChannel)
        );
        assert_eq!(
            validate(course(END).completion(true, false), 20, END),
            Err(ValidationRejection::NoOutcomeChannel),
            "completion without criteria is not a channel"
        );
        assert_eq!(validate(course(END).completion(true, true), 20, END), Ok(()));
        assert_eq!(validate(course(END).competencies(1), 20, END), Ok(()));
    }

    #[test]
    fn test_every_rejection_has_a_distinct_diagnostic() {
        let rejections = [
            ValidationRejection::NotFinished,
            ValidationRejection::TooLong,
            ValidationRejection::NotEnoughLogs,
            ValidationRejection::NoOutcomeChannel,
        ];
        let messages: std::collections::HashSet<_> =
            rejections.iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), rejections.len());
        assert!(messages.iter().all(|m| !m.is_empty()));
    }

    #[test]
    fn test_validate_reports_unavailable_data() {
        let record = course(END);
        let analysable = analysable(&record);
        let target = target(MemoryBackend::new(SITE));
        assert!(matches!(
            target.validate(&analysable, END),
            Err(ValidationRejection::DataUnavailable { .. })
        ));
    }

    #[test]
    fn test_label_by_completion() {
        let record = course(END).completion(true, true).complete(SampleId(1));
        assert_eq!(label_of(record.clone(), SampleId(1)), RETAINED);
        assert_eq!(label_of(record, SampleId(2)), DROPOUT);
    }

    #[test]
    fn test_completion_wins_over_competencies() {
        let record = course(END)
            .completion(true, true)
            .complete(SampleId(1))
            .competencies(2);
        assert_eq!(label_of(record, SampleId(1)), RETAINED);
    }

    #[test]
    fn test_label_by_competencies() {
        let record = course(END)
            .completion(false, true)
            .competencies(2)
            .proficient(SampleId(1), 1)
            .proficient(SampleId(2), 2);
        assert_eq!(label_of(record.clone(), SampleId(1)), DROPOUT);
        assert_eq!(label_of(record, SampleId(2)), RETAINED);
    }

    #[test]
    fn test_label_without_grade_data() {
        assert_eq!(label_of(course(END), SampleId(1)), DROPOUT, "no grade item");
        let record = course(END).grade_item(numeric_item());
        assert_eq!(label_of(record, SampleId(1)), DROPOUT, "no grade record");
        let record = course(END)
            .grade_item(numeric_item())
            .grade(SampleId(1), grade(None, None));
        assert_eq!(label_of(record, SampleId(1)), DROPOUT, "no final grade");
        let record = course(END)
            .grade_item(numeric_item())
            .grade(SampleId(1), Grade {
                final_grade: Some(0.0),
                min: -10.0,
                max: 10.0,
                pass: None,
            });
        assert_eq!(label_of(record, SampleId(1)), DROPOUT, "zero final grade");
    }

    #[test]
    fn test_label_by_pass_threshold() {
        let record = course(END)
            .grade_item(numeric_item())
            .grade(SampleId(1), grade(Some(30.0), Some(25.0)))
            .grade(SampleId(2), grade(Some(70.0), Some(80.0)));
        assert_eq!(label_of(record.clone(), SampleId(1)), RETAINED);
        assert_eq!(label_of(record, SampleId(2)), DROPOUT);
    }

    #[test]
    fn test_label_by_normalized_grade() {
        let record = course(END)
            .grade_item(numeric_item())
            .grade(SampleId(1), grade(Some(60.0), None))
            .grade(SampleId(2), grade(Some(40.0), None));
        assert_eq!(label_of(record.clone(), SampleId(1)), RETAINED);
        assert_eq!(label_of(record, SampleId(2)), DROPOUT);

        let record = course(END)
            .grade_item(numeric_item())
            .grade(SampleId(1), grade(Some(50.0), None));
        assert_eq!(label_of(record, SampleId(1)), RETAINED, "0.5 is a pass");
    }

    #[test]
    fn test_label_with_degenerate_bounds() {
        let record = course(END).grade_item(numeric_item()).grade(SampleId(1), Grade {
            final_grade: Some(5.0),
            min: 5.0,
            max: 5.0,
            pass: None,
        });
        assert_eq!(label_of(record, SampleId(1)), DROPOUT);
    }

    #[test]
    fn test_grade_item_is_memoized_until_reset() {
        let record = course(END).grade_item(numeric_item());
        let analysable = analysable(&record);
        let dropout = target(MemoryBackend::new(SITE).with_course(record));
        assert_eq!(dropout.course_grade_item(COURSE).unwrap(), Some(numeric_item()));

        // Swap the backend's answer behind the memo: the memo keeps the first answer.
        let mut memo = dropout.grade_items.lock().unwrap();
        memo.insert(COURSE, None);
        drop(memo);
        assert_eq!(dropout.label(SampleId(1), &analysable).unwrap(), DROPOUT);
        assert_eq!(dropout.course_grade_item(COURSE).unwrap(), None);

        dropout.reset();
        assert_eq!(dropout.course_grade_item(COURSE).unwrap(), Some(numeric_item()));
    }

    #[test]
    fn test_notify_never_fails() {
        let dropout = target(MemoryBackend::new(SITE));
        dropout.notify(SampleId(1), DROPOUT, 0.75);
        dropout.notify(SampleId(1), RETAINED, f64::NAN);
    }
}

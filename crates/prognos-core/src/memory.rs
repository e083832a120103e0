//! In-memory implementation of every collaborator.
//!
//! [`MemoryBackend`] holds a fixed set of courses and an activity log. It is the reference
//! backend for small deployments and the fixture every test in the workspace builds on.
//!
//! The site analysable spans from the earliest course start to the latest course end, its
//! samples are the union of all course enrolments, and log queries against it match the
//! entries of every course.
//!
//! # Example
//!
//! ```
//! use prognos_core::{
//!     AnalysableId, AnalysableKind, AnalysableSpan, SampleId,
//!     collaborator::{EventLogQuery, LogQuery},
//!     memory::{CourseRecord, LogEntry, MemoryBackend},
//! };
//!
//! let span = AnalysableSpan {
//!     id: AnalysableId(2),
//!     kind: AnalysableKind::Course,
//!     start: 0,
//!     end: 400,
//! };
//! let backend = MemoryBackend::new(AnalysableId(1))
//!     .with_course(CourseRecord::new(span).enrol(SampleId(10)))
//!     .with_log(LogEntry::new(AnalysableId(2), SampleId(10), 50, "course_viewed"));
//!
//! let query = LogQuery::new(AnalysableId(2), 0, 100).samples([SampleId(10)]);
//! assert_eq!(backend.count(&query).unwrap(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    Timestamp,
    analysable::{AnalysableId, AnalysableKind, AnalysableSpan, Enrolment, SampleId},
    collaborator::{
        AnalysableSource, CollaboratorError, CompetencyService, CompletionService, EventLogQuery,
        Grade, GradeItem, GradeService, LogQuery, SampleSource,
    },
};

/// One activity-log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub course: AnalysableId,
    pub sample: SampleId,
    pub time: Timestamp,
    pub kind: String,
    pub anonymous: bool,
}

impl LogEntry {
    #[must_use]
    pub fn new(course: AnalysableId, sample: SampleId, time: Timestamp, kind: &str) -> Self {
        Self {
            course,
            sample,
            time,
            kind: kind.to_owned(),
            anonymous: false,
        }
    }

    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

/// Everything the backend knows about one course.
#[derive(Debug, Clone)]
pub struct CourseRecord {
    pub span: AnalysableSpan,
    pub enrolments: BTreeMap<SampleId, Enrolment>,
    pub completion_enabled: bool,
    pub completion_has_criteria: bool,
    pub completed: BTreeSet<SampleId>,
    pub competencies: u32,
    pub proficient: BTreeMap<SampleId, u32>,
    pub grade_item: Option<GradeItem>,
    pub grades: BTreeMap<SampleId, Grade>,
}

impl CourseRecord {
    #[must_use]
    pub fn new(span: AnalysableSpan) -> Self {
        Self {
            span,
            enrolments: BTreeMap::new(),
            completion_enabled: false,
            completion_has_criteria: false,
            completed: BTreeSet::new(),
            competencies: 0,
            proficient: BTreeMap::new(),
            grade_item: None,
            grades: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn enrol(mut self, sample: SampleId) -> Self {
        self.enrolments.insert(sample, Enrolment::default());
        self
    }

    #[must_use]
    pub fn completion(mut self, enabled: bool, has_criteria: bool) -> Self {
        self.completion_enabled = enabled;
        self.completion_has_criteria = has_criteria;
        self
    }

    #[must_use]
    pub fn complete(mut self, sample: SampleId) -> Self {
        self.completed.insert(sample);
        self
    }

    #[must_use]
    pub fn competencies(mut self, count: u32) -> Self {
        self.competencies = count;
        self
    }

    #[must_use]
    pub fn proficient(mut self, sample: SampleId, count: u32) -> Self {
        self.proficient.insert(sample, count);
        self
    }

    #[must_use]
    pub fn grade_item(mut self, item: GradeItem) -> Self {
        self.grade_item = Some(item);
        self
    }

    #[must_use]
    pub fn grade(mut self, sample: SampleId, grade: Grade) -> Self {
        self.grades.insert(sample, grade);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    site: AnalysableId,
    courses: BTreeMap<AnalysableId, CourseRecord>,
    logs: Vec<LogEntry>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(site: AnalysableId) -> Self {
        Self {
            site,
            courses: BTreeMap::new(),
            logs: vec![],
        }
    }

    #[must_use]
    pub fn with_course(mut self, course: CourseRecord) -> Self {
        self.courses.insert(course.span.id, course);
        self
    }

    #[must_use]
    pub fn with_log(mut self, entry: LogEntry) -> Self {
        self.logs.push(entry);
        self
    }

    #[must_use]
    pub fn with_logs<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.logs.extend(entries);
        self
    }

    fn course(&self, id: AnalysableId) -> Result<&CourseRecord, CollaboratorError> {
        self.courses
            .get(&id)
            .ok_or(CollaboratorError::UnknownAnalysable { id })
    }

    fn matching_logs<'a>(&'a self, query: &'a LogQuery) -> impl Iterator<Item = &'a LogEntry> {
        let all_courses = query.analysable == self.site;
        self.logs.iter().filter(move |entry| {
            (all_courses || entry.course == query.analysable)
                && query.start <= entry.time
                && entry.time < query.end
                && entry.anonymous == query.anonymous
                && query.samples.contains(&entry.sample)
                && query.matches_kind(&entry.kind)
        })
    }

    fn check_known(&self, id: AnalysableId) -> Result<(), CollaboratorError> {
        if id == self.site || self.courses.contains_key(&id) {
            Ok(())
        } else {
            Err(CollaboratorError::UnknownAnalysable { id })
        }
    }
}

impl AnalysableSource for MemoryBackend {
    fn site(&self) -> Result<AnalysableSpan, CollaboratorError> {
        let start = self.courses.values().map(|c| c.span.start).min();
        let end = self.courses.values().map(|c| c.span.end).max();
        let (Some(start), Some(end)) = (start, end) else {
            return Err(CollaboratorError::Unavailable {
                service: "analysables",
                reason: "site has no courses".to_owned(),
            });
        };
        Ok(AnalysableSpan {
            id: self.site,
            kind: AnalysableKind::Site,
            start,
            end,
        })
    }

    fn courses(&self) -> Result<Vec<AnalysableSpan>, CollaboratorError> {
        Ok(self.courses.values().map(|c| c.span).collect())
    }
}

impl SampleSource for MemoryBackend {
    fn samples(
        &self,
        span: &AnalysableSpan,
    ) -> Result<BTreeMap<SampleId, Enrolment>, CollaboratorError> {
        if span.id == self.site {
            let mut samples = BTreeMap::new();
            for course in self.courses.values() {
                for (sample, enrolment) in &course.enrolments {
                    samples.entry(*sample).or_insert(*enrolment);
                }
            }
            return Ok(samples);
        }
        Ok(self.course(span.id)?.enrolments.clone())
    }
}

impl EventLogQuery for MemoryBackend {
    fn count(&self, query: &LogQuery) -> Result<u64, CollaboratorError> {
        self.check_known(query.analysable)?;
        Ok(self.matching_logs(query).count() as u64)
    }

    fn first_after(&self, query: &LogQuery) -> Result<Option<Timestamp>, CollaboratorError> {
        self.check_known(query.analysable)?;
        Ok(self.matching_logs(query).map(|entry| entry.time).min())
    }
}

impl CompletionService for MemoryBackend {
    fn is_enabled(&self, analysable: AnalysableId) -> Result<bool, CollaboratorError> {
        Ok(self.course(analysable)?.completion_enabled)
    }

    fn has_criteria(&self, analysable: AnalysableId) -> Result<bool, CollaboratorError> {
        Ok(self.course(analysable)?.completion_has_criteria)
    }

    fn is_complete(
        &self,
        analysable: AnalysableId,
        sample: SampleId,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.course(analysable)?.completed.contains(&sample))
    }
}

impl CompetencyService for MemoryBackend {
    fn count_competencies(&self, analysable: AnalysableId) -> Result<u32, CollaboratorError> {
        Ok(self.course(analysable)?.competencies)
    }

    fn count_proficient(
        &self,
        analysable: AnalysableId,
        sample: SampleId,
    ) -> Result<u32, CollaboratorError> {
        let course = self.course(analysable)?;
        Ok(course.proficient.get(&sample).copied().unwrap_or(0))
    }
}

impl GradeService for MemoryBackend {
    fn course_grade_item(
        &self,
        analysable: AnalysableId,
    ) -> Result<Option<GradeItem>, CollaboratorError> {
        Ok(self.course(analysable)?.grade_item)
    }

    fn grade(&self, item: &GradeItem, sample: SampleId) -> Result<Option<Grade>, CollaboratorError> {
        let grade = self
            .courses
            .values()
            .find(|course| course.grade_item.is_some_and(|i| i.id == item.id))
            .and_then(|course| course.grades.get(&sample).copied());
        Ok(grade)
    }
}

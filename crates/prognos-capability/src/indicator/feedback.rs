use prognos_core::{
    Analysable, AnalysableKind, Range, SampleId,
    collaborator::{CollaboratorError, EventLogQuery, LogQuery},
};

use super::{Indicator, binary_value};

/// Whether the sample viewed feedback after being graded in an activity kind.
///
/// The generic semantic is shared by every activity kind; variants only differ in the
/// activity kind they target and in which event kinds count as "feedback viewed" there.
///
/// # Value
///
/// - Locate the sample's first `mod_<kind>.user_graded` event within the range. Without one
///   the indicator does not apply (`None`).
/// - `1.0` if any feedback event occurs between that graded event and the range end
/// - `-1.0` otherwise
///
/// Applies to course analysables only.
#[derive(Debug, Clone)]
pub struct FeedbackViewed {
    id: String,
    name: String,
    activity_kind: String,
    graded_event_kind: String,
    feedback_event_kinds: Vec<String>,
}

impl FeedbackViewed {
    /// Namespace every variant's id lives under.
    pub const BASE_ID: &'static str = "indicator::feedback_viewed";

    #[must_use]
    pub fn new<I, S>(activity_kind: &str, feedback_event_kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: format!("{}::{activity_kind}", Self::BASE_ID),
            name: format!("Feedback Viewed ({activity_kind})"),
            activity_kind: activity_kind.to_owned(),
            graded_event_kind: format!("mod_{activity_kind}.user_graded"),
            feedback_event_kinds: feedback_event_kinds.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn assign() -> Self {
        Self::new("assign", ["mod_assign.feedback_viewed"])
    }

    #[must_use]
    pub fn quiz() -> Self {
        Self::new("quiz", ["mod_quiz.attempt_reviewed"])
    }

    /// Any view of the activity after grading counts as feedback viewed.
    #[must_use]
    pub fn lti() -> Self {
        Self::new("lti", ["mod_lti.course_module_viewed"])
    }

    #[must_use]
    pub fn activity_kind(&self) -> &str {
        &self.activity_kind
    }

    #[must_use]
    pub fn feedback_event_kinds(&self) -> &[String] {
        &self.feedback_event_kinds
    }
}

impl Indicator for FeedbackViewed {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, kind: AnalysableKind) -> bool {
        kind == AnalysableKind::Course
    }

    fn value(
        &self,
        logs: &dyn EventLogQuery,
        sample: SampleId,
        range: &Range,
        analysable: &Analysable,
    ) -> Result<Option<f64>, CollaboratorError> {
        let graded = LogQuery::new(analysable.id(), range.start, range.end)
            .samples([sample])
            .event_kinds([self.graded_event_kind.as_str()]);
        let Some(graded_at) = logs.first_after(&graded)? else {
            return Ok(None);
        };

        let viewed = LogQuery::new(analysable.id(), graded_at, range.end)
            .samples([sample])
            .event_kinds(&self.feedback_event_kinds);
        Ok(Some(binary_value(logs.count(&viewed)? > 0)))
    }
}

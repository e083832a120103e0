//! Per-analysable orchestration.
//!
//! An [`Analyser`] turns the analysables of one scope into range-scoped dataset artifacts:
//!
//! ```text
//! analysables (one site, or one per course)
//!     ↓ per analysable: samples → target gate → labels → ranges → indicator values
//! partial artifacts (one per range code), plus a status and message
//!     ↓ ok analysables only, one merge per range code
//! merged artifacts (DatasetMerger → DatasetStore)
//! ```
//!
//! # Status Tracking
//!
//! Every analysable ends in [`Status::Ok`] or [`Status::Error`] independently. A failing
//! analysable records its diagnostic in the message map and an empty artifact map, its
//! partial artifacts are left out of the merge, and its siblings carry on. Only failures that
//! make the whole run meaningless are returned as [`AnalyserError`].
//!
//! # Evaluation Mode
//!
//! With [`AnalyserOptions::evaluation`] set, the cached evaluation artifact of every range
//! code is deleted right before that code's merge, so the run replaces rather than
//! accumulates.

use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZero,
    panic, thread,
};

use prognos_capability::{
    indicator::SharedIndicator,
    range_strategy::SharedRangeStrategy,
    registry::CapabilityRegistry,
    target::{Target, ValidationRejection},
};
use prognos_core::{
    Analysable, AnalysableId, AnalysableKind, AnalysableSpan, DatasetArtifact, Label,
    RangeContractError, RowKey, RowRecord, SampleId, Timestamp, analysable::InvalidSpanError,
    check_ranges, collaborator::CollaboratorError, services::Services,
};

use crate::{config::AnalyserOptions, merger::DatasetMerger, store::StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Status {
    #[display("ok")]
    Ok,
    #[display("error")]
    Error,
}

/// Which analysables an [`Analyser`] processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyserScope {
    /// The site as a single analysable.
    SiteWide,
    /// Every course as its own analysable.
    PerSubject,
}

impl AnalyserScope {
    #[must_use]
    pub fn analysable_kind(self) -> AnalysableKind {
        match self {
            Self::SiteWide => AnalysableKind::Site,
            Self::PerSubject => AnalysableKind::Course,
        }
    }
}

/// Run-level failure. Per-analysable failures are reported in [`AnalysisResult`] instead.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum AnalyserError {
    #[display("failed to list analysables")]
    Analysables { source: CollaboratorError },
    #[display("range strategy `{code}` is not installed")]
    UnknownRangeStrategy { code: String },
    #[display("labels were requested but no target is configured")]
    MissingTarget,
    #[display("target `{target_id}` labels {expected} analysables, not {actual}")]
    TargetScopeMismatch {
        target_id: String,
        expected: AnalysableKind,
        actual: AnalysableKind,
    },
    #[display("failed to merge artifacts for range strategy `{range_code}`")]
    Merge {
        range_code: String,
        source: StoreError,
    },
}

/// Why one analysable produced no artifacts.
#[derive(Debug, derive_more::Display)]
enum AnalysableFailure {
    #[display("No samples")]
    NoSamples,
    #[display("No ranges")]
    NoRanges,
    #[display("{_0}")]
    Rejected(ValidationRejection),
    #[display("{_0}")]
    Collaborator(CollaboratorError),
    #[display("{_0}")]
    InvalidSpan(InvalidSpanError),
    #[display("range strategy `{code}` broke the range contract: {source}")]
    RangeContract {
        code: String,
        source: RangeContractError,
    },
}

impl AnalysableFailure {
    /// Whether the failure is an ordinary skip rather than a fault.
    fn is_skip(&self) -> bool {
        matches!(self, Self::NoSamples | Self::NoRanges | Self::Rejected(_))
    }
}

type Partials = BTreeMap<String, DatasetArtifact>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub status: BTreeMap<AnalysableId, Status>,
    pub messages: BTreeMap<AnalysableId, Option<String>>,
    /// Partial artifacts per analysable, by range code. Empty for analysables in error.
    pub artifacts: BTreeMap<AnalysableId, Partials>,
    /// Merged artifacts by range code.
    pub merged: BTreeMap<String, DatasetArtifact>,
}

impl AnalysisResult {
    #[must_use]
    pub fn status_of(&self, analysable: AnalysableId) -> Option<Status> {
        self.status.get(&analysable).copied()
    }

    #[must_use]
    pub fn message_of(&self, analysable: AnalysableId) -> Option<&str> {
        self.messages.get(&analysable)?.as_deref()
    }
}

/// Everything resolved once per run and shared by all analysables.
struct RunContext<'r> {
    target: Option<&'r dyn Target>,
    strategies: Vec<SharedRangeStrategy>,
    indicators: Vec<SharedIndicator>,
    now: Timestamp,
}

#[derive(Debug)]
pub struct Analyser<'a> {
    dataset_id: String,
    scope: AnalyserScope,
    services: &'a Services,
    registry: &'a CapabilityRegistry,
    merger: &'a DatasetMerger,
    target: Option<&'a dyn Target>,
    options: AnalyserOptions,
}

impl<'a> Analyser<'a> {
    /// Analyser over the site as one analysable.
    #[must_use]
    pub fn site_wide(
        dataset_id: &str,
        services: &'a Services,
        registry: &'a CapabilityRegistry,
        merger: &'a DatasetMerger,
    ) -> Self {
        Self::new(dataset_id, AnalyserScope::SiteWide, services, registry, merger)
    }

    /// Analyser over every course.
    #[must_use]
    pub fn per_subject(
        dataset_id: &str,
        services: &'a Services,
        registry: &'a CapabilityRegistry,
        merger: &'a DatasetMerger,
    ) -> Self {
        Self::new(dataset_id, AnalyserScope::PerSubject, services, registry, merger)
    }

    fn new(
        dataset_id: &str,
        scope: AnalyserScope,
        services: &'a Services,
        registry: &'a CapabilityRegistry,
        merger: &'a DatasetMerger,
    ) -> Self {
        Self {
            dataset_id: dataset_id.to_owned(),
            scope,
            services,
            registry,
            merger,
            target: None,
            options: AnalyserOptions::default(),
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: &'a dyn Target) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: AnalyserOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    #[must_use]
    pub fn scope(&self) -> AnalyserScope {
        self.scope
    }

    #[must_use]
    pub fn options(&self) -> &AnalyserOptions {
        &self.options
    }

    /// [`Self::analysable_data()`] with the configured `include_target`.
    pub fn run(&self) -> Result<AnalysisResult, AnalyserError> {
        self.analysable_data(self.options.include_target)
    }

    /// Processes every analysable of the scope and merges the results per range code.
    pub fn analysable_data(&self, include_target: bool) -> Result<AnalysisResult, AnalyserError> {
        let target = if include_target {
            Some(self.checked_target()?)
        } else {
            None
        };
        let ctx = RunContext {
            target,
            strategies: self.range_strategies()?,
            indicators: self.registry.get_all_indicators().values().cloned().collect(),
            now: self.options.now(),
        };
        let spans = self.analysable_spans()?;
        if let Some(target) = target {
            target.reset();
        }

        tracing::info!(
            dataset_id = %self.dataset_id,
            analysables = spans.len(),
            include_target,
            evaluation = self.options.evaluation,
            "Starting analysis"
        );

        let mut result = AnalysisResult::default();
        for (id, outcome) in self.process_all(&ctx, &spans) {
            match outcome {
                Ok(partials) => {
                    result.status.insert(id, Status::Ok);
                    result.messages.insert(id, None);
                    result.artifacts.insert(id, partials);
                }
                Err(failure) => {
                    result.status.insert(id, Status::Error);
                    result.messages.insert(id, Some(failure.to_string()));
                    result.artifacts.insert(id, Partials::new());
                }
            }
        }

        let codes = result
            .artifacts
            .values()
            .flat_map(BTreeMap::keys)
            .cloned()
            .collect::<BTreeSet<_>>();
        for code in codes {
            let merged = self
                .merge_code(&result, &code, include_target)
                .map_err(|source| AnalyserError::Merge {
                    range_code: code.clone(),
                    source,
                })?;
            result.merged.insert(code, merged);
        }
        Ok(result)
    }

    fn checked_target(&self) -> Result<&'a dyn Target, AnalyserError> {
        let target = self.target.ok_or(AnalyserError::MissingTarget)?;
        let actual = self.scope.analysable_kind();
        if target.analysable_kind() != actual {
            return Err(AnalyserError::TargetScopeMismatch {
                target_id: target.id().to_owned(),
                expected: target.analysable_kind(),
                actual,
            });
        }
        Ok(target)
    }

    fn range_strategies(&self) -> Result<Vec<SharedRangeStrategy>, AnalyserError> {
        let installed = self.registry.get_all_range_strategies();
        let Some(codes) = &self.options.range_strategies else {
            return Ok(installed.values().cloned().collect());
        };
        codes
            .iter()
            .map(|code| {
                installed
                    .get(code)
                    .cloned()
                    .ok_or_else(|| AnalyserError::UnknownRangeStrategy { code: code.clone() })
            })
            .collect()
    }

    fn analysable_spans(&self) -> Result<Vec<AnalysableSpan>, AnalyserError> {
        let analysables = &self.services.analysables;
        let spans = match self.scope {
            AnalyserScope::SiteWide => analysables.site().map(|site| vec![site]),
            AnalyserScope::PerSubject => analysables.courses(),
        };
        spans.map_err(|source| AnalyserError::Analysables { source })
    }

    fn process_all(
        &self,
        ctx: &RunContext<'_>,
        spans: &[AnalysableSpan],
    ) -> Vec<(AnalysableId, Result<Partials, AnalysableFailure>)> {
        if !self.options.parallel || spans.len() < 2 {
            return spans.iter().map(|span| self.process(ctx, span)).collect();
        }

        let workers = thread::available_parallelism().map_or(1, NonZero::get);
        let chunk_size = spans.len().div_ceil(workers);
        thread::scope(|s| {
            let handles = spans
                .chunks(chunk_size)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|span| self.process(ctx, span))
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|e| panic::resume_unwind(e)))
                .collect()
        })
    }

    fn process(
        &self,
        ctx: &RunContext<'_>,
        span: &AnalysableSpan,
    ) -> (AnalysableId, Result<Partials, AnalysableFailure>) {
        tracing::debug!(analysable = %span.id, kind = %span.kind, "Processing analysable");
        let outcome = self.process_analysable(ctx, span);
        match &outcome {
            Ok(partials) => {
                let ranges = partials.len();
                tracing::info!(analysable = %span.id, ranges, "Analysable processed");
            }
            Err(failure) if failure.is_skip() => {
                tracing::info!(analysable = %span.id, %failure, "Analysable skipped");
            }
            Err(failure) => {
                tracing::warn!(analysable = %span.id, %failure, "Analysable failed");
            }
        }
        (span.id, outcome)
    }

    fn process_analysable(
        &self,
        ctx: &RunContext<'_>,
        span: &AnalysableSpan,
    ) -> Result<Partials, AnalysableFailure> {
        let enrolments = self
            .services
            .samples
            .samples(span)
            .map_err(AnalysableFailure::Collaborator)?;
        let analysable =
            Analysable::new(*span, enrolments).map_err(AnalysableFailure::InvalidSpan)?;
        if analysable.sample_count() == 0 {
            return Err(AnalysableFailure::NoSamples);
        }

        let labels = match ctx.target {
            Some(target) => {
                target
                    .validate(&analysable, ctx.now)
                    .map_err(AnalysableFailure::Rejected)?;
                let labels = label_samples(target, &analysable)
                    .map_err(AnalysableFailure::Collaborator)?;
                Some(labels)
            }
            None => None,
        };

        let indicators = ctx
            .indicators
            .iter()
            .filter(|indicator| indicator.applies_to(analysable.kind()))
            .collect::<Vec<_>>();
        let columns = indicators
            .iter()
            .map(|indicator| indicator.id().to_owned())
            .collect::<BTreeSet<_>>();

        let mut partials = Partials::new();
        for strategy in &ctx.strategies {
            let code = strategy.code();
            let ranges = strategy.ranges(&analysable, ctx.now);
            check_ranges(&ranges).map_err(|source| AnalysableFailure::RangeContract {
                code: code.to_owned(),
                source,
            })?;
            if ranges.is_empty() {
                tracing::debug!(analysable = %analysable.id(), code, "No ranges from strategy");
                continue;
            }

            let mut rows = BTreeMap::new();
            for range in &ranges {
                for sample in analysable.sample_ids() {
                    let mut features = BTreeMap::new();
                    for indicator in &indicators {
                        let value = indicator
                            .value(self.services.logs.as_ref(), sample, range, &analysable)
                            .map_err(AnalysableFailure::Collaborator)?;
                        features.insert(indicator.id().to_owned(), value);
                    }
                    let key = RowKey {
                        analysable: analysable.id(),
                        sample,
                        range: range.index,
                    };
                    let label = labels.as_ref().and_then(|labels| labels.get(&sample).copied());
                    rows.insert(key, RowRecord { features, label });
                }
            }

            let artifact = DatasetArtifact::build(
                &self.dataset_id,
                code,
                labels.is_some(),
                columns.clone(),
                rows,
            );
            partials.insert(code.to_owned(), artifact);
        }

        if partials.is_empty() {
            return Err(AnalysableFailure::NoRanges);
        }
        Ok(partials)
    }

    fn merge_code(
        &self,
        result: &AnalysisResult,
        code: &str,
        include_target: bool,
    ) -> Result<DatasetArtifact, StoreError> {
        let evaluation = self.options.evaluation;
        if evaluation {
            self.merger.delete_evaluation_artifact(&self.dataset_id, code)?;
        }
        let partials = result
            .artifacts
            .values()
            .filter_map(|partials| partials.get(code));
        self.merger
            .merge(partials, &self.dataset_id, code, evaluation, include_target)
    }
}

fn label_samples(
    target: &dyn Target,
    analysable: &Analysable,
) -> Result<BTreeMap<SampleId, Label>, CollaboratorError> {
    analysable
        .sample_ids()
        .map(|sample| Ok((sample, target.label(sample, analysable)?)))
        .collect()
}

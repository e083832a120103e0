//! Dataset generation for the prognos analytics pipeline.
//!
//! This crate drives the per-analysable pipeline and persists its output:
//!
//! - [`analyser`] - [`Analyser`] runs every analysable of a scope through range strategies,
//!   indicators and the target, tracking an independent status per analysable
//! - [`merger`] - [`DatasetMerger`] merges partial artifacts into range-scoped artifacts, one
//!   merge at a time per key
//! - [`store`] - [`DatasetStore`](store::DatasetStore) persistence, in memory or as JSON files
//! - [`config`] - [`AnalyserOptions`] run options, loadable from JSON
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use prognos_analysis::{Analyser, AnalyserOptions, DatasetMerger, store::MemoryDatasetStore};
//! use prognos_capability::registry::CapabilityRegistry;
//! use prognos_core::{
//!     AnalysableId, AnalysableKind, AnalysableSpan, SampleId,
//!     memory::{CourseRecord, LogEntry, MemoryBackend},
//!     services::Services,
//! };
//!
//! let course = AnalysableSpan {
//!     id: AnalysableId(2),
//!     kind: AnalysableKind::Course,
//!     start: 0,
//!     end: 400,
//! };
//! let backend = MemoryBackend::new(AnalysableId(1))
//!     .with_course(CourseRecord::new(course).enrol(SampleId(10)))
//!     .with_log(LogEntry::new(AnalysableId(2), SampleId(10), 50, "course_viewed"));
//!
//! let services = Services::from_backend(Arc::new(backend));
//! let registry = CapabilityRegistry::builtin();
//! let merger = DatasetMerger::new(Arc::new(MemoryDatasetStore::new()));
//! let options = AnalyserOptions {
//!     range_strategies: Some(vec!["quarters".to_owned()]),
//!     now: Some(1_000),
//!     ..AnalyserOptions::default()
//! };
//!
//! let result = Analyser::per_subject("activity", &services, &registry, &merger)
//!     .with_options(options)
//!     .analysable_data(false)?;
//! assert_eq!(result.merged["quarters"].len(), 4);
//! # Ok::<(), prognos_analysis::AnalyserError>(())
//! ```

pub use self::{
    analyser::{AnalysisResult, Analyser, AnalyserError, AnalyserScope, Status},
    config::{AnalyserOptions, ConfigError},
    merger::DatasetMerger,
};

pub mod analyser;
pub mod config;
pub mod merger;
pub mod store;

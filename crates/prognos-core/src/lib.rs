//! Domain types and collaborator contracts for the prognos analytics pipeline.
//!
//! This crate is the leaf of the workspace. It defines what is being analysed and
//! how the pipeline talks to the outside world:
//!
//! - [`analysable`] - Time-bounded subjects (a whole site, or one course) with their samples
//! - [`dataset`] - Range-scoped dataset tables built from indicator values and labels
//! - [`range`] - Sub-intervals of an analysable's span and their ordering contract
//! - [`collaborator`] - Narrow traits for every external data source the pipeline reads
//! - [`services`] - A cloneable bundle of collaborator handles passed through the pipeline
//! - [`memory`] - [`MemoryBackend`](memory::MemoryBackend), an in-memory implementation of
//!   every collaborator used as reference backend and test fixture
//!
//! # Time
//!
//! All timestamps are UNIX seconds ([`Timestamp`]). Spans and ranges are half-open:
//! `[start, end)`.

pub use self::{
    analysable::{Analysable, AnalysableId, AnalysableKind, AnalysableSpan, Enrolment, SampleId},
    dataset::{ArtifactFormatError, DatasetArtifact, Label, Row, RowKey, RowRecord},
    range::{Range, RangeContractError, check_ranges},
};

pub mod analysable;
pub mod collaborator;
pub mod dataset;
pub mod memory;
pub mod range;
pub mod services;

/// UNIX timestamp in seconds.
pub type Timestamp = i64;

/// Seconds in one week.
pub const WEEK_SECS: Timestamp = 7 * 24 * 60 * 60;

/// Seconds in one (non-leap) year.
pub const YEAR_SECS: Timestamp = 365 * 24 * 60 * 60;

//! Pluggable capabilities and the registry that discovers them.
//!
//! The dataset pipeline is assembled from four capability families:
//!
//! 1. **Range strategies** ([`range_strategy`]) - Slice an analysable's span into ordered,
//!    non-overlapping ranges
//! 2. **Indicators** ([`indicator`]) - Compute one feature value for a sample within a range,
//!    or report that the feature does not apply
//! 3. **Targets** ([`target`]) - Decide whether an analysable can be labelled, and label each
//!    of its samples
//! 4. **Predictors** ([`predictor`]) - Opaque back-ends trained on and applied to dataset
//!    artifacts
//!
//! # Discovery
//!
//! Installed implementations are listed in an [`ExtensionTable`](registry::ExtensionTable):
//! a registration table mapping a fully-qualified name to the namespace it is installed under
//! and a factory (or no factory, for abstract bases). The
//! [`CapabilityRegistry`](registry::CapabilityRegistry) validates candidates, instantiates
//! them once, and caches the instances for its own lifetime.
//!
//! ```text
//! ExtensionTable (what is installed)
//!     ↓ validated and instantiated by
//! CapabilityRegistry (what is usable, cached)
//!     ↓ consumed by
//! Analyser (prognos-analysis)
//! ```
//!
//! # Failure Policies
//!
//! The two kinds of lookup fail differently:
//!
//! - The predictor is mandatory. An unknown, abstract or mistyped predictor name is a
//!   [`ConfigurationError`](registry::ConfigurationError).
//! - Indicators and range strategies are optional. Invalid candidates are left out of
//!   enumeration and single lookups return `None`, so one broken extension never halts a run.

pub mod indicator;
pub mod predictor;
pub mod range_strategy;
pub mod registry;
pub mod target;

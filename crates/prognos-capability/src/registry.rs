//! Extension discovery and the capability registry.
//!
//! # Extension Table
//!
//! An [`ExtensionTable`] records what is installed: each [`Extension`] has a fully-qualified
//! name (`"indicator::any_course_access"`), the [`Capability`] namespace it is installed
//! under, and a [`Factory`]. Abstract bases are installed without a factory; they are listed
//! but can never be instantiated.
//!
//! # Validity
//!
//! A name is valid for a capability when it is installed, has a factory, and the factory
//! produces that capability. The namespace only drives enumeration, so a candidate installed
//! under the indicator namespace whose factory builds a predictor is listed as an indicator
//! candidate and then rejected.
//!
//! # Caching
//!
//! [`CapabilityRegistry`] instantiates each valid name at most once and hands out the same
//! [`Arc`] on every later lookup, until [`CapabilityRegistry::clear_cache()`] is called.
//! Enumeration goes through the single-item lookups, so both paths share instances.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{
    indicator::{AnyCourseAccess, FeedbackViewed, SharedIndicator},
    predictor::{BaselinePredictor, SharedPredictor},
    range_strategy::{EqualSplit, FixedWidth, SharedRangeStrategy},
};

/// Predictor used when neither the caller nor the configuration names one.
pub const DEFAULT_PREDICTOR: &str = BaselinePredictor::ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Capability {
    #[display("predictor")]
    Predictor,
    #[display("range_strategy")]
    RangeStrategy,
    #[display("indicator")]
    Indicator,
}

/// The predictor could not be resolved. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ConfigurationError {
    #[display("predictor `{name}` is not installed")]
    UnknownPredictor { name: String },
    #[display("`{name}` is not a predictor")]
    NotAPredictor { name: String },
    #[display("predictor `{name}` is abstract")]
    AbstractPredictor { name: String },
}

#[derive(Clone)]
pub enum Factory {
    Predictor(Arc<dyn Fn() -> SharedPredictor + Send + Sync>),
    RangeStrategy(Arc<dyn Fn() -> SharedRangeStrategy + Send + Sync>),
    Indicator(Arc<dyn Fn() -> SharedIndicator + Send + Sync>),
}

impl Factory {
    #[must_use]
    pub fn predictor<F>(factory: F) -> Self
    where
        F: Fn() -> SharedPredictor + Send + Sync + 'static,
    {
        Self::Predictor(Arc::new(factory))
    }

    #[must_use]
    pub fn range_strategy<F>(factory: F) -> Self
    where
        F: Fn() -> SharedRangeStrategy + Send + Sync + 'static,
    {
        Self::RangeStrategy(Arc::new(factory))
    }

    #[must_use]
    pub fn indicator<F>(factory: F) -> Self
    where
        F: Fn() -> SharedIndicator + Send + Sync + 'static,
    {
        Self::Indicator(Arc::new(factory))
    }

    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::Predictor(_) => Capability::Predictor,
            Self::RangeStrategy(_) => Capability::RangeStrategy,
            Self::Indicator(_) => Capability::Indicator,
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Factory").field(&self.capability()).finish()
    }
}

#[derive(Debug, Clone)]
pub struct Extension {
    pub name: String,
    pub namespace: Capability,
    /// `None` for abstract bases.
    pub factory: Option<Factory>,
}

impl Extension {
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.factory.is_some()
    }

    #[must_use]
    pub fn provides(&self, capability: Capability) -> bool {
        self.factory
            .as_ref()
            .is_some_and(|factory| factory.capability() == capability)
    }
}

/// Source of installed extensions.
pub trait ExtensionDiscovery: fmt::Debug + Send + Sync {
    /// Every extension installed under `namespace`, ordered by name.
    fn extensions(&self, namespace: Capability) -> Vec<&Extension>;

    fn find(&self, name: &str) -> Option<&Extension>;
}

/// Registration table of installed extensions.
#[derive(Debug, Clone, Default)]
pub struct ExtensionTable {
    extensions: BTreeMap<String, Extension>,
}

impl ExtensionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reference implementation, plus the abstract bases.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .register_predictor(BaselinePredictor::ID, || -> SharedPredictor {
                Arc::new(BaselinePredictor::new())
            })
            .register_abstract("range_strategy::base", Capability::RangeStrategy)
            .register_range_strategy("range_strategy::quarters", || -> SharedRangeStrategy {
                Arc::new(EqualSplit::quarters())
            })
            .register_range_strategy("range_strategy::single_range", || -> SharedRangeStrategy {
                Arc::new(EqualSplit::single())
            })
            .register_range_strategy("range_strategy::weekly", || -> SharedRangeStrategy {
                Arc::new(FixedWidth::weekly())
            })
            .register_abstract(FeedbackViewed::BASE_ID, Capability::Indicator)
            .register_indicator("indicator::feedback_viewed::assign", || -> SharedIndicator {
                Arc::new(FeedbackViewed::assign())
            })
            .register_indicator("indicator::feedback_viewed::quiz", || -> SharedIndicator {
                Arc::new(FeedbackViewed::quiz())
            })
            .register_indicator("indicator::feedback_viewed::lti", || -> SharedIndicator {
                Arc::new(FeedbackViewed::lti())
            })
            .register_indicator(AnyCourseAccess::ID, || -> SharedIndicator {
                Arc::new(AnyCourseAccess)
            })
    }

    /// Installs `name` under `namespace`, replacing any earlier extension of that name.
    #[must_use]
    pub fn register(
        mut self,
        name: &str,
        namespace: Capability,
        factory: Option<Factory>,
    ) -> Self {
        self.extensions.insert(name.to_owned(), Extension {
            name: name.to_owned(),
            namespace,
            factory,
        });
        self
    }

    #[must_use]
    pub fn register_abstract(self, name: &str, namespace: Capability) -> Self {
        self.register(name, namespace, None)
    }

    #[must_use]
    pub fn register_predictor<F>(self, name: &str, factory: F) -> Self
    where
        F: Fn() -> SharedPredictor + Send + Sync + 'static,
    {
        self.register(name, Capability::Predictor, Some(Factory::predictor(factory)))
    }

    #[must_use]
    pub fn register_range_strategy<F>(self, name: &str, factory: F) -> Self
    where
        F: Fn() -> SharedRangeStrategy + Send + Sync + 'static,
    {
        let factory = Factory::range_strategy(factory);
        self.register(name, Capability::RangeStrategy, Some(factory))
    }

    #[must_use]
    pub fn register_indicator<F>(self, name: &str, factory: F) -> Self
    where
        F: Fn() -> SharedIndicator + Send + Sync + 'static,
    {
        self.register(name, Capability::Indicator, Some(Factory::indicator(factory)))
    }
}

impl ExtensionDiscovery for ExtensionTable {
    fn extensions(&self, namespace: Capability) -> Vec<&Extension> {
        self.extensions
            .values()
            .filter(|extension| extension.namespace == namespace)
            .collect()
    }

    fn find(&self, name: &str) -> Option<&Extension> {
        self.extensions.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Site-configured predictor; absent or empty selects [`DEFAULT_PREDICTOR`].
    pub predictor: Option<String>,
}

/// Validated, cached access to installed capabilities.
#[derive(Debug)]
pub struct CapabilityRegistry {
    discovery: Box<dyn ExtensionDiscovery>,
    config: RegistryConfig,
    predictors: Mutex<HashMap<String, SharedPredictor>>,
    range_strategies: Mutex<HashMap<String, SharedRangeStrategy>>,
    indicators: Mutex<HashMap<String, SharedIndicator>>,
    all_range_strategies: OnceLock<BTreeMap<String, SharedRangeStrategy>>,
    all_indicators: OnceLock<BTreeMap<String, SharedIndicator>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new<D>(discovery: D, config: RegistryConfig) -> Self
    where
        D: ExtensionDiscovery + 'static,
    {
        Self {
            discovery: Box::new(discovery),
            config,
            predictors: Mutex::default(),
            range_strategies: Mutex::default(),
            indicators: Mutex::default(),
            all_range_strategies: OnceLock::new(),
            all_indicators: OnceLock::new(),
        }
    }

    /// Registry over [`ExtensionTable::builtin()`] with the default configuration.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(ExtensionTable::builtin(), RegistryConfig::default())
    }

    /// Whether `name` is a concrete extension providing `capability`.
    #[must_use]
    pub fn is_valid(&self, name: &str, capability: Capability) -> bool {
        self.discovery
            .find(name)
            .is_some_and(|extension| extension.provides(capability))
    }

    /// Resolves the predictor named `name`, else the configured one, else [`DEFAULT_PREDICTOR`].
    pub fn get_predictor(&self, name: Option<&str>) -> Result<SharedPredictor, ConfigurationError> {
        let name = name
            .filter(|name| !name.is_empty())
            .or(self.config.predictor.as_deref().filter(|name| !name.is_empty()))
            .unwrap_or(DEFAULT_PREDICTOR);

        let mut predictors = self
            .predictors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(predictor) = predictors.get(name) {
            return Ok(Arc::clone(predictor));
        }

        let extension = self
            .discovery
            .find(name)
            .ok_or_else(|| ConfigurationError::UnknownPredictor {
                name: name.to_owned(),
            })?;
        let predictor = match &extension.factory {
            Some(Factory::Predictor(factory)) => factory(),
            Some(_) => {
                return Err(ConfigurationError::NotAPredictor {
                    name: name.to_owned(),
                });
            }
            None if extension.namespace == Capability::Predictor => {
                return Err(ConfigurationError::AbstractPredictor {
                    name: name.to_owned(),
                });
            }
            None => {
                return Err(ConfigurationError::NotAPredictor {
                    name: name.to_owned(),
                });
            }
        };
        tracing::debug!(name, "Predictor resolved");
        predictors.insert(name.to_owned(), Arc::clone(&predictor));
        Ok(predictor)
    }

    /// Every installed predictor, by name. Fails on the first invalid one.
    pub fn get_all_predictors(
        &self,
    ) -> Result<BTreeMap<String, SharedPredictor>, ConfigurationError> {
        self.discovery
            .extensions(Capability::Predictor)
            .into_iter()
            .map(|extension| {
                let predictor = self.get_predictor(Some(extension.name.as_str()))?;
                Ok((extension.name.clone(), predictor))
            })
            .collect()
    }

    /// Range strategy named `name`, or `None` if it is not a valid range strategy.
    #[must_use]
    pub fn get_range_strategy(&self, name: &str) -> Option<SharedRangeStrategy> {
        let mut cache = self
            .range_strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(strategy) = cache.get(name) {
            return Some(Arc::clone(strategy));
        }
        let Some(Factory::RangeStrategy(factory)) = self.concrete_factory(name) else {
            tracing::debug!(name, "Skipping invalid range strategy candidate");
            return None;
        };
        let strategy = factory();
        cache.insert(name.to_owned(), Arc::clone(&strategy));
        Some(strategy)
    }

    /// Indicator named `name`, or `None` if it is not a valid indicator.
    #[must_use]
    pub fn get_indicator(&self, name: &str) -> Option<SharedIndicator> {
        let mut cache = self
            .indicators
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(indicator) = cache.get(name) {
            return Some(Arc::clone(indicator));
        }
        let Some(Factory::Indicator(factory)) = self.concrete_factory(name) else {
            tracing::debug!(name, "Skipping invalid indicator candidate");
            return None;
        };
        let indicator = factory();
        cache.insert(name.to_owned(), Arc::clone(&indicator));
        Some(indicator)
    }

    /// Every valid range strategy, keyed by its code.
    #[must_use]
    pub fn get_all_range_strategies(&self) -> &BTreeMap<String, SharedRangeStrategy> {
        self.all_range_strategies.get_or_init(|| {
            self.discovery
                .extensions(Capability::RangeStrategy)
                .into_iter()
                .filter_map(|extension| self.get_range_strategy(&extension.name))
                .map(|strategy| (strategy.code().to_owned(), strategy))
                .collect()
        })
    }

    /// Every valid indicator, keyed by its registered name.
    #[must_use]
    pub fn get_all_indicators(&self) -> &BTreeMap<String, SharedIndicator> {
        self.all_indicators.get_or_init(|| {
            self.discovery
                .extensions(Capability::Indicator)
                .into_iter()
                .filter_map(|extension| {
                    let indicator = self.get_indicator(&extension.name)?;
                    Some((extension.name.clone(), indicator))
                })
                .collect()
        })
    }

    /// Drops every cached instance; later lookups instantiate afresh.
    pub fn clear_cache(&mut self) {
        self.predictors
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.range_strategies
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.indicators
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.all_range_strategies.take();
        self.all_indicators.take();
    }

    fn concrete_factory(&self, name: &str) -> Option<&Factory> {
        self.discovery.find(name)?.factory.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(table: ExtensionTable) -> CapabilityRegistry {
        CapabilityRegistry::new(table, RegistryConfig::default())
    }

    #[test]
    fn test_same_indicator_twice_is_identical() {
        let registry = CapabilityRegistry::builtin();
        let first = registry.get_indicator(AnyCourseAccess::ID).unwrap();
        let second = registry.get_indicator(AnyCourseAccess::ID).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let all = registry.get_all_indicators();
        assert!(
            Arc::ptr_eq(&first, &all[AnyCourseAccess::ID]),
            "enumeration must reuse the cached instance"
        );
    }

    #[test]
    fn test_abstract_candidates_are_not_found() {
        let registry = CapabilityRegistry::builtin();
        assert!(registry.get_indicator(FeedbackViewed::BASE_ID).is_none());
        assert!(registry.get_range_strategy("range_strategy::base").is_none());
        assert!(!registry.is_valid(FeedbackViewed::BASE_ID, Capability::Indicator));
        assert!(registry.get_indicator("indicator::missing").is_none());
    }

    #[test]
    fn test_builtin_enumeration() {
        let registry = CapabilityRegistry::builtin();
        let codes = registry
            .get_all_range_strategies()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(codes, ["quarters", "single_range", "weekly"]);

        let indicators = registry
            .get_all_indicators()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(indicators, [
            "indicator::any_course_access",
            "indicator::feedback_viewed::assign",
            "indicator::feedback_viewed::lti",
            "indicator::feedback_viewed::quiz",
        ]);
    }

    #[test]
    fn test_invalid_candidates_are_silently_excluded() {
        let table = ExtensionTable::new()
            .register_indicator(AnyCourseAccess::ID, || -> SharedIndicator {
                Arc::new(AnyCourseAccess)
            })
            .register_abstract("indicator::base", Capability::Indicator)
            .register(
                "indicator::mistyped",
                Capability::Indicator,
                Some(Factory::range_strategy(|| -> SharedRangeStrategy {
                    Arc::new(EqualSplit::quarters())
                })),
            )
            .register(
                "range_strategy::mistyped",
                Capability::RangeStrategy,
                Some(Factory::indicator(|| -> SharedIndicator {
                    Arc::new(AnyCourseAccess)
                })),
            );
        let registry = registry_with(table);

        let indicators = registry.get_all_indicators();
        assert_eq!(indicators.len(), 1);
        assert!(indicators.contains_key(AnyCourseAccess::ID));
        assert!(registry.get_all_range_strategies().is_empty());

        assert!(registry.get_indicator("indicator::mistyped").is_none());
        assert!(!registry.is_valid("indicator::mistyped", Capability::Indicator));
        assert!(registry.is_valid("indicator::mistyped", Capability::RangeStrategy));
    }

    #[test]
    fn test_indicators_are_enumerated_by_registered_name() {
        let table = ExtensionTable::new()
            .register_indicator("indicator::access::primary", || -> SharedIndicator {
                Arc::new(AnyCourseAccess)
            })
            .register_indicator("indicator::access::mirror", || -> SharedIndicator {
                Arc::new(AnyCourseAccess)
            });
        let registry = registry_with(table);

        let indicators = registry.get_all_indicators();
        assert_eq!(
            indicators.keys().cloned().collect::<Vec<_>>(),
            ["indicator::access::mirror", "indicator::access::primary"],
            "registrations sharing an id must both be enumerated"
        );
        assert!(indicators.values().all(|i| i.id() == AnyCourseAccess::ID));
    }

    #[test]
    fn test_unknown_predictor_is_configuration_error() {
        let registry = CapabilityRegistry::builtin();
        assert_eq!(
            registry.get_predictor(Some("predictor::missing")).unwrap_err(),
            ConfigurationError::UnknownPredictor {
                name: "predictor::missing".to_owned()
            }
        );
        assert!(matches!(
            registry.get_predictor(Some(AnyCourseAccess::ID)),
            Err(ConfigurationError::NotAPredictor { .. })
        ));

        let table =
            ExtensionTable::new().register_abstract("predictor::base", Capability::Predictor);
        assert!(matches!(
            registry_with(table).get_predictor(Some("predictor::base")),
            Err(ConfigurationError::AbstractPredictor { .. })
        ));
    }

    #[test]
    fn test_predictor_resolution_order() {
        let registry = CapabilityRegistry::builtin();
        let default = registry.get_predictor(None).unwrap();
        assert_eq!(default.id(), DEFAULT_PREDICTOR);
        assert!(Arc::ptr_eq(&default, &registry.get_predictor(Some("")).unwrap()));

        let config = RegistryConfig {
            predictor: Some("predictor::missing".to_owned()),
        };
        let registry = CapabilityRegistry::new(ExtensionTable::builtin(), config);
        assert!(
            registry.get_predictor(None).is_err(),
            "configured predictor is used when no name is given"
        );
        assert!(registry.get_predictor(Some(DEFAULT_PREDICTOR)).is_ok());
    }

    #[test]
    fn test_get_all_predictors() {
        let registry = CapabilityRegistry::builtin();
        let predictors = registry.get_all_predictors().unwrap();
        assert_eq!(predictors.len(), 1);
        assert!(Arc::ptr_eq(
            &predictors[DEFAULT_PREDICTOR],
            &registry.get_predictor(None).unwrap()
        ));

        let table =
            ExtensionTable::builtin().register_abstract("predictor::base", Capability::Predictor);
        assert!(registry_with(table).get_all_predictors().is_err());
    }

    #[test]
    fn test_clear_cache_instantiates_afresh() {
        let mut registry = CapabilityRegistry::builtin();
        let before = registry.get_indicator(AnyCourseAccess::ID).unwrap();
        let before_all = Arc::clone(&registry.get_all_range_strategies()["quarters"]);

        registry.clear_cache();

        let after = registry.get_indicator(AnyCourseAccess::ID).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(!Arc::ptr_eq(
            &before_all,
            &registry.get_all_range_strategies()["quarters"]
        ));
    }

    #[test]
    fn test_registry_config_deserializes() {
        let config: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RegistryConfig::default());
        let config: RegistryConfig =
            serde_json::from_str(r#"{"predictor":"predictor::baseline"}"#).unwrap();
        assert_eq!(config.predictor.as_deref(), Some(DEFAULT_PREDICTOR));
    }
}

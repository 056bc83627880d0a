use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::config::SentinelConfig;

use super::backend::PoseEstimator;
use super::backends::ScriptedEstimator;

/// Builds an estimator from the monitor configuration.
pub type EstimatorFactory = fn(&SentinelConfig) -> Result<Box<dyn PoseEstimator>>;

/// Registry of pose estimator backends, keyed by the name used in `pose.backend`.
///
/// Backends are registered as factories so that a model is only loaded for the
/// backend that is actually selected.
pub struct EstimatorRegistry {
    factories: HashMap<String, EstimatorFactory>,
}

impl EstimatorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("scripted", ScriptedEstimator::from_config);
        #[cfg(feature = "backend-tract")]
        registry.register("tract", super::backends::TractPoseEstimator::from_config);
        registry
    }

    /// Register a backend factory. Re-registering a name replaces it.
    pub fn register(&mut self, name: &str, factory: EstimatorFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the backend named by `config.pose.backend`.
    pub fn build(&self, config: &SentinelConfig) -> Result<Box<dyn PoseEstimator>> {
        let name = config.pose.backend.as_str();
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "pose backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        let mut estimator = factory(config)?;
        estimator.warm_up()?;
        Ok(estimator)
    }
}

impl Default for EstimatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

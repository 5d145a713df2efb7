use serde::{Deserialize, Serialize};
use vos_objects::VomConfig;
use vos_slots::RegistryConfig;

use crate::error::{RuntimeError, RuntimeResult};

/// Settings for the store the runtime creates for itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Record every store operation for later inspection.
    pub log: bool,
}

/// Top-level runtime configuration.
///
/// ```toml
/// [registry]
/// retention = "weak"
///
/// [vom]
/// cache_size = 100
///
/// [store]
/// log = false
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub registry: RegistryConfig,
    pub vom: VomConfig,
    pub store: StoreConfig,
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> RuntimeResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.vom.cache_size == 0 {
            return Err(RuntimeError::Config("vom.cache_size must be at least 1".into()));
        }
        Ok(())
    }
}

//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning knobs for the per-thread runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Check reachability before a `flat_map` rebind so that a selector
    /// closing a cycle is reported before the graph is modified.
    pub check_cycles: bool,

    /// Maximum number of propagation rounds per flush. Each round applies
    /// the writes that observers issued during the previous one.
    pub max_flush_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            check_cycles: true,
            max_flush_rounds: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_rounds == 0 {
            return Err(ConfigError::Invalid("max_flush_rounds must be at least 1"));
        }
        Ok(())
    }
}

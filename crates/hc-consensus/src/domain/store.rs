//! Shared weight configuration

use super::weights::WeightConfig;
use crate::error::ConfigError;
use parking_lot::RwLock;

/// Read-mostly holder for the active [`WeightConfig`].
///
/// Replacement is wholesale; readers see either the old or the new value.
#[derive(Debug, Default)]
pub struct WeightConfigStore {
    inner: RwLock<WeightConfig>,
}

impl WeightConfigStore {
    /// Create a store, validating the initial configuration
    pub fn new(initial: WeightConfig) -> Result<Self, ConfigError> {
        initial.validate()?;
        Ok(Self {
            inner: RwLock::new(initial),
        })
    }

    /// Snapshot of the active configuration
    pub fn get(&self) -> WeightConfig {
        *self.inner.read()
    }

    /// Replace the configuration; on error the previous value stays active
    pub fn set(&self, cfg: WeightConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        *self.inner.write() = cfg;
        tracing::info!(
            alpha = cfg.alpha,
            beta = cfg.beta,
            gamma = cfg.gamma,
            d_max = cfg.d_max,
            s_max = cfg.s_max,
            "[hc] weight config updated"
        );
        Ok(())
    }
}

//! Configuration types for the hybrid consensus engine

use crate::domain::{CircuitBreakerConfig, RewardConfig, ThresholdBands, WeightConfig};
use crate::error::ConfigError;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the engine and its production loops
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sub-block tick period
    pub sub_block_interval_ms: u64,

    /// Block boundary period
    pub block_interval_ms: u64,

    /// Sub-blocks that force an early block boundary
    pub max_sub_blocks_per_block: usize,

    /// Transactions picked per sub-block
    pub max_tx_per_sub_block: usize,

    /// Weights within this distance of the maximum count as tied
    pub tie_epsilon: f64,

    /// Threshold cut-offs between consensus modes
    pub threshold_bands: ThresholdBands,

    /// Upper bound on any single collaborator call
    pub collaborator_timeout_ms: u64,

    /// Grace period for the loops to exit before they are aborted
    pub stop_timeout_ms: u64,

    /// PoW blocks considered when retargeting
    pub retarget_window: usize,

    /// Initial PoW target is `2^initial_target_bits - 1`
    pub initial_target_bits: u32,

    /// Nonce budget for the default proof searcher
    pub pow_max_attempts: u64,

    /// Reward schedule
    pub rewards: RewardConfig,

    /// Collaborator circuit breaker
    pub circuit_breaker: CircuitBreakerConfig,

    /// Initial weight configuration
    pub weights: WeightConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sub_block_interval_ms: crate::SUB_BLOCK_INTERVAL_MS,
            block_interval_ms: crate::BLOCK_INTERVAL_MS,
            max_sub_blocks_per_block: crate::MAX_SUB_BLOCKS_PER_BLOCK,
            max_tx_per_sub_block: crate::MAX_TX_PER_SUB_BLOCK,
            tie_epsilon: 1e-6,
            threshold_bands: ThresholdBands::default(),
            collaborator_timeout_ms: 5_000,
            stop_timeout_ms: 10_000,
            retarget_window: 100,
            initial_target_bits: 240,
            pow_max_attempts: 50_000_000,
            rewards: RewardConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            weights: WeightConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `HC_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("[hc] ignoring unparseable {}={}", key, raw);
                    None
                }
            }
        }

        let mut config = Self::default();
        if let Some(v) = parse(&lookup, "HC_SUB_BLOCK_INTERVAL_MS") {
            config.sub_block_interval_ms = v;
        }
        if let Some(v) = parse(&lookup, "HC_BLOCK_INTERVAL_MS") {
            config.block_interval_ms = v;
        }
        if let Some(v) = parse(&lookup, "HC_MAX_SUB_BLOCKS_PER_BLOCK") {
            config.max_sub_blocks_per_block = v;
        }
        if let Some(v) = parse(&lookup, "HC_MAX_TX_PER_SUB_BLOCK") {
            config.max_tx_per_sub_block = v;
        }
        if let Some(v) = parse(&lookup, "HC_TIE_EPSILON") {
            config.tie_epsilon = v;
        }
        if let Some(v) = parse(&lookup, "HC_COLLABORATOR_TIMEOUT_MS") {
            config.collaborator_timeout_ms = v;
        }
        if let Some(v) = parse(&lookup, "HC_STOP_TIMEOUT_MS") {
            config.stop_timeout_ms = v;
        }
        if let Some(v) = parse(&lookup, "HC_RETARGET_WINDOW") {
            config.retarget_window = v;
        }
        if let Some(v) = parse(&lookup, "HC_INITIAL_TARGET_BITS") {
            config.initial_target_bits = v;
        }
        if let Some(v) = parse(&lookup, "HC_POW_MAX_ATTEMPTS") {
            config.pow_max_attempts = v;
        }
        config
    }

    /// Reject configurations the loops cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sub_block_interval_ms == 0 {
            return Err(ConfigError::invalid("sub_block_interval_ms", "must be > 0"));
        }
        if self.block_interval_ms == 0 {
            return Err(ConfigError::invalid("block_interval_ms", "must be > 0"));
        }
        if self.max_sub_blocks_per_block == 0 {
            return Err(ConfigError::invalid("max_sub_blocks_per_block", "must be > 0"));
        }
        if self.max_tx_per_sub_block == 0 {
            return Err(ConfigError::invalid("max_tx_per_sub_block", "must be > 0"));
        }
        if !self.tie_epsilon.is_finite() || self.tie_epsilon < 0.0 {
            return Err(ConfigError::invalid(
                "tie_epsilon",
                format!("must be finite and >= 0, got {}", self.tie_epsilon),
            ));
        }
        if self.collaborator_timeout_ms == 0 {
            return Err(ConfigError::invalid("collaborator_timeout_ms", "must be > 0"));
        }
        self.threshold_bands.validate()?;
        self.rewards.validate()?;
        self.weights.validate()?;
        Ok(())
    }

    /// Sub-block tick period
    pub fn sub_block_interval(&self) -> Duration {
        Duration::from_millis(self.sub_block_interval_ms)
    }

    /// Block boundary period
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    /// Collaborator call bound
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Loop exit grace period
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

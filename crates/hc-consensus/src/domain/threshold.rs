//! Switching threshold and consensus-mode bands

use super::weights::{normalize, Mechanism, WeightConfig};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Combined normalized pressure in `[0, 1]`.
///
/// `clamp(alpha * demand_norm + beta * stake_norm, 0, 1)` with the same
/// saturation as [`super::calculate_weights`].
pub fn compute_threshold(demand: f64, stake: f64, cfg: WeightConfig) -> f64 {
    let pressure = cfg.alpha * normalize(demand, cfg.d_max) + cfg.beta * normalize(stake, cfg.s_max);
    if pressure.is_nan() {
        return 0.0;
    }
    pressure.clamp(0.0, 1.0)
}

/// Threshold cut-offs between consensus modes
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdBands {
    /// Below this the network is quiet enough for pure sequencing
    pub poh_below: f64,
    /// Below this (and at or above `poh_below`) stake selection seals blocks
    pub pos_below: f64,
}

impl Default for ThresholdBands {
    fn default() -> Self {
        Self {
            poh_below: 0.33,
            pos_below: 0.66,
        }
    }
}

impl ThresholdBands {
    /// Require `0 <= poh_below <= pos_below <= 1`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.poh_below) {
            return Err(ConfigError::invalid("threshold_bands.poh_below", "must be in [0, 1]"));
        }
        if !in_unit(self.pos_below) {
            return Err(ConfigError::invalid("threshold_bands.pos_below", "must be in [0, 1]"));
        }
        if self.poh_below > self.pos_below {
            return Err(ConfigError::invalid(
                "threshold_bands",
                format!("poh_below {} exceeds pos_below {}", self.poh_below, self.pos_below),
            ));
        }
        Ok(())
    }

    /// Mechanism that seals a block at this threshold.
    ///
    /// Blocks are never sealed by PoH alone, so the PoH band seals via stake.
    pub fn sealing_mechanism(&self, threshold: f64) -> Mechanism {
        if threshold < self.pos_below {
            Mechanism::ProofOfStake
        } else {
            Mechanism::ProofOfWork
        }
    }
}

impl Mechanism {
    /// Consensus mode for a threshold reading
    pub fn from_threshold(threshold: f64, bands: &ThresholdBands) -> Self {
        if threshold < bands.poh_below {
            Self::ProofOfHistory
        } else if threshold < bands.pos_below {
            Self::ProofOfStake
        } else {
            Self::ProofOfWork
        }
    }
}

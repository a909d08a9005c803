//! Dynamic weight blending between PoW, PoS and PoH
//!
//! Demand and stake samples are normalized against their configured caps and
//! saturate at `1.0`, so out-of-range samples cannot destabilize the output.
//!
//! ```text
//! demand_norm = clamp(demand / d_max, 0, 1)
//! stake_norm  = clamp(stake  / s_max, 0, 1)
//!
//! raw_pow = alpha * demand_norm
//! raw_pos = beta  * stake_norm
//! raw_poh = gamma * (1 - max(demand_norm, stake_norm))
//!
//! weights = raw / sum(raw)        (equal split when sum == 0)
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tunable coefficients for weight and threshold calculation
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// PoW blending coefficient (scales demand pressure)
    pub alpha: f64,
    /// PoS blending coefficient (scales stake pressure)
    pub beta: f64,
    /// PoH blending coefficient (scales absence of pressure)
    pub gamma: f64,
    /// Demand normalization cap
    pub d_max: f64,
    /// Stake normalization cap
    pub s_max: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.5,
            gamma: 1.0,
            // One full sub-block worth of pending transactions saturates demand
            d_max: crate::MAX_TX_PER_SUB_BLOCK as f64,
            s_max: 1_000_000.0,
        }
    }
}

impl WeightConfig {
    /// Create a configuration without validating it
    pub fn new(alpha: f64, beta: f64, gamma: f64, d_max: f64, s_max: f64) -> Self {
        Self {
            alpha,
            beta,
            gamma,
            d_max,
            s_max,
        }
    }

    /// Check all fields are finite and non-negative and both caps are positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("d_max", self.d_max),
            ("s_max", self.s_max),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, format!("must be finite, got {value}")));
            }
            if value < 0.0 {
                return Err(ConfigError::invalid(field, format!("must be >= 0, got {value}")));
            }
        }
        if self.d_max == 0.0 {
            return Err(ConfigError::invalid("d_max", "must be > 0"));
        }
        if self.s_max == 0.0 {
            return Err(ConfigError::invalid("s_max", "must be > 0"));
        }
        Ok(())
    }
}

/// Block-production mechanism
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mechanism {
    /// Computational proof (nonce search)
    #[serde(rename = "pow")]
    ProofOfWork,
    /// Stake-weighted validator selection
    #[serde(rename = "pos")]
    ProofOfStake,
    /// Sequential ordering (sub-blocks)
    #[serde(rename = "poh")]
    ProofOfHistory,
}

impl Mechanism {
    /// Short lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProofOfWork => "pow",
            Self::ProofOfStake => "pos",
            Self::ProofOfHistory => "poh",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized weight vector; immutable once constructed
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// PoW share
    pub pow: f64,
    /// PoS share
    pub pos: f64,
    /// PoH share
    pub poh: f64,
}

impl Weights {
    /// Equal split used when the raw contributions sum to zero
    pub const EQUAL: Weights = Weights {
        pow: 1.0 / 3.0,
        pos: 1.0 / 3.0,
        poh: 1.0 / 3.0,
    };

    /// Share of a single mechanism
    pub fn get(&self, mechanism: Mechanism) -> f64 {
        match mechanism {
            Mechanism::ProofOfWork => self.pow,
            Mechanism::ProofOfStake => self.pos,
            Mechanism::ProofOfHistory => self.poh,
        }
    }

    /// Mechanism that authors the next unit of work.
    ///
    /// Any mechanism within `epsilon` of the maximum counts as tied. Ties go to
    /// PoH first, then PoS, so ambiguous readings keep the chain on the
    /// lowest-latency path.
    pub fn dominant(&self, epsilon: f64) -> Mechanism {
        let max = self.pow.max(self.pos).max(self.poh);
        if max - self.poh <= epsilon {
            Mechanism::ProofOfHistory
        } else if max - self.pos <= epsilon {
            Mechanism::ProofOfStake
        } else {
            Mechanism::ProofOfWork
        }
    }
}

/// Normalize a sample against its cap, saturating into `[0, 1]`.
///
/// NaN samples count as no pressure.
pub fn normalize(value: f64, cap: f64) -> f64 {
    let ratio = value / cap;
    if ratio.is_nan() {
        return 0.0;
    }
    ratio.clamp(0.0, 1.0)
}

/// Compute the weight vector for a demand/stake sample.
///
/// Pure and non-blocking. `cfg` is expected to satisfy
/// [`WeightConfig::validate`]; a degenerate sum falls back to [`Weights::EQUAL`].
pub fn calculate_weights(demand: f64, stake: f64, cfg: WeightConfig) -> Weights {
    let demand_norm = normalize(demand, cfg.d_max);
    let stake_norm = normalize(stake, cfg.s_max);

    let raw_pow = cfg.alpha * demand_norm;
    let raw_pos = cfg.beta * stake_norm;
    let raw_poh = cfg.gamma * (1.0 - demand_norm.max(stake_norm));

    // Scale by the largest term so huge coefficients cannot overflow the sum
    let max = raw_pow.max(raw_pos).max(raw_poh);
    if !max.is_finite() || max <= 0.0 {
        return Weights::EQUAL;
    }
    let (raw_pow, raw_pos, raw_poh) = (raw_pow / max, raw_pos / max, raw_poh / max);
    let sum = raw_pow + raw_pos + raw_poh;
    if !sum.is_finite() {
        return Weights::EQUAL;
    }

    Weights {
        pow: raw_pow / sum,
        pos: raw_pos / sum,
        poh: raw_poh / sum,
    }
}

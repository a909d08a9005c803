//! Block reward schedule and distribution

use super::entities::{Address, SubBlockHeader};
use crate::error::ConfigError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Reward schedule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward for the first halving era, in base units
    pub initial_reward: U256,
    /// Blocks per halving era
    pub halving_period: u64,
    /// Miner/proposer share in percent
    pub miner_percent: u8,
    /// Share split across sub-block validators, in percent
    pub validator_percent: u8,
    /// Receives the remainder
    pub treasury: Address,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            // 102.4 coins at 18 decimals
            initial_reward: U256::from(1024u64) * U256::exp10(17),
            halving_period: 200_000,
            miner_percent: 30,
            validator_percent: 30,
            treasury: [0u8; 20],
        }
    }
}

impl RewardConfig {
    /// Shares must leave a non-negative treasury remainder
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.halving_period == 0 {
            return Err(ConfigError::invalid("rewards.halving_period", "must be > 0"));
        }
        if u16::from(self.miner_percent) + u16::from(self.validator_percent) > 100 {
            return Err(ConfigError::invalid(
                "rewards",
                "miner_percent + validator_percent exceeds 100",
            ));
        }
        Ok(())
    }

    /// Total block reward at `height`
    pub fn reward_at(&self, height: u64) -> U256 {
        let halvings = height / self.halving_period.max(1);
        if halvings >= 256 {
            return U256::zero();
        }
        self.initial_reward >> (halvings as usize)
    }
}

/// Reward payout attached to a block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSplit {
    /// Total minted for this block
    pub total: U256,
    /// Proposer or miner
    pub proposer: (Address, U256),
    /// One entry per distinct sub-block validator
    pub validators: Vec<(Address, U256)>,
    /// Treasury payout, including rounding dust
    pub treasury: (Address, U256),
}

/// `percent`% of `amount`, rounded down, without overflowing at `U256::MAX`
fn percent_of(amount: U256, percent: u8) -> U256 {
    let hundred = U256::from(100u8);
    let percent = U256::from(percent);
    amount / hundred * percent + amount % hundred * percent / hundred
}

/// Distribute the reward for a block at `height`.
///
/// Validators are credited once each, in first-seen order. With no sub-block
/// validators their share goes to the treasury.
pub fn split(
    height: u64,
    proposer: Address,
    sub_headers: &[SubBlockHeader],
    cfg: &RewardConfig,
) -> RewardSplit {
    let total = cfg.reward_at(height);
    let miner_share = percent_of(total, cfg.miner_percent);
    let validator_pool = percent_of(total, cfg.validator_percent);

    let mut unique: Vec<Address> = Vec::new();
    for header in sub_headers {
        if !unique.contains(&header.validator) {
            unique.push(header.validator);
        }
    }

    let validators: Vec<(Address, U256)> = if unique.is_empty() {
        Vec::new()
    } else {
        let each = validator_pool / U256::from(unique.len());
        unique.into_iter().map(|v| (v, each)).collect()
    };

    let paid = validators
        .iter()
        .fold(miner_share, |acc, (_, amount)| acc + *amount);

    RewardSplit {
        total,
        proposer: (proposer, miner_share),
        validators,
        treasury: (cfg.treasury, total - paid),
    }
}

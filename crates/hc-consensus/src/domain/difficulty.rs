//! PoW target retargeting
//!
//! The target is a CEILING: a lower target is harder. When PoW blocks arrive
//! faster than the block interval the target shrinks, and when they arrive
//! slower it grows, by at most `MAX_ADJUSTMENT_FACTOR` per step.

use primitive_types::U256;
use std::collections::VecDeque;

/// Largest per-step change in either direction
pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;

/// Sliding-window target retargeter for PoW-sealed blocks
#[derive(Clone, Debug)]
pub struct TargetRetargeter {
    target: U256,
    window: usize,
    expected_interval_ms: u64,
    timestamps: VecDeque<u64>,
}

impl TargetRetargeter {
    /// Start from `2^initial_bits - 1`
    pub fn new(initial_bits: u32, window: usize, expected_interval_ms: u64) -> Self {
        Self {
            target: initial_target(initial_bits),
            window: window.max(2),
            expected_interval_ms: expected_interval_ms.max(1),
            timestamps: VecDeque::new(),
        }
    }

    /// Target the next PoW block must meet
    pub fn target(&self) -> U256 {
        self.target
    }

    /// Record a PoW block timestamp and rescale the target
    pub fn record(&mut self, timestamp_ms: u64) {
        self.timestamps.push_back(timestamp_ms);
        while self.timestamps.len() > self.window {
            self.timestamps.pop_front();
        }
        if self.timestamps.len() < 2 {
            return;
        }

        let (Some(&oldest), Some(&newest)) = (self.timestamps.front(), self.timestamps.back())
        else {
            return;
        };
        let intervals = (self.timestamps.len() - 1) as u64;
        let expected = intervals.saturating_mul(self.expected_interval_ms);
        let actual = newest
            .saturating_sub(oldest)
            .clamp(
                (expected / MAX_ADJUSTMENT_FACTOR).max(1),
                expected.saturating_mul(MAX_ADJUSTMENT_FACTOR),
            );

        self.target = scale(self.target, actual, expected);
        tracing::debug!(
            actual_ms = actual,
            expected_ms = expected,
            target = %self.target,
            "[hc] retargeted PoW"
        );
    }
}

/// `2^bits - 1`, saturating at `U256::MAX`
pub fn initial_target(bits: u32) -> U256 {
    if bits >= 256 {
        U256::MAX
    } else {
        U256::from(2).pow(U256::from(bits)) - U256::one()
    }
}

/// `target * actual / expected` without overflowing, never zero
fn scale(target: U256, actual: u64, expected: u64) -> U256 {
    if expected == 0 {
        return target;
    }
    let expected = U256::from(expected);
    let actual = U256::from(actual);
    let quotient = target / expected;
    let remainder = target % expected;
    let scaled = quotient
        .saturating_mul(actual)
        .saturating_add(remainder.saturating_mul(actual) / expected);
    scaled.max(U256::one())
}

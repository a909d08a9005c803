//! Production counters for the hybrid consensus engine

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector shared by both production loops
#[derive(Debug, Default)]
pub struct Metrics {
    /// Sub-blocks committed to the ledger
    pub sub_blocks_produced: AtomicU64,

    /// Sub-blocks authored under PoW or PoS because PoH was not dominant
    pub sub_blocks_handed_off: AtomicU64,

    /// Pending sub-blocks dropped for failing PoH verification
    pub sub_blocks_rejected: AtomicU64,

    /// Transactions carried by committed sub-blocks
    pub transactions_included: AtomicU64,

    /// Blocks sealed by stake
    pub blocks_pos: AtomicU64,

    /// Blocks sealed by work
    pub blocks_pow: AtomicU64,

    /// Production cycles that ended in a collaborator error
    pub cycles_failed: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed sub-block
    pub fn record_sub_block(&self, tx_count: u32) {
        self.sub_blocks_produced.fetch_add(1, Ordering::Relaxed);
        self.transactions_included
            .fetch_add(tx_count as u64, Ordering::Relaxed);
    }

    /// Record a sub-block authored by the dominant non-PoH mechanism
    pub fn record_handoff(&self) {
        self.sub_blocks_handed_off.fetch_add(1, Ordering::Relaxed);
    }

    /// Record dropped sub-blocks
    pub fn record_rejected(&self, count: u64) {
        self.sub_blocks_rejected.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a finalized block by sealing mechanism
    pub fn record_block(&self, mechanism: crate::Mechanism) {
        let counter = match mechanism {
            crate::Mechanism::ProofOfWork => &self.blocks_pow,
            _ => &self.blocks_pos,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed cycle
    pub fn record_failure(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sub_blocks_produced: self.sub_blocks_produced.load(Ordering::Relaxed),
            sub_blocks_handed_off: self.sub_blocks_handed_off.load(Ordering::Relaxed),
            sub_blocks_rejected: self.sub_blocks_rejected.load(Ordering::Relaxed),
            transactions_included: self.transactions_included.load(Ordering::Relaxed),
            blocks_pos: self.blocks_pos.load(Ordering::Relaxed),
            blocks_pow: self.blocks_pow.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`Metrics`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Sub-blocks committed
    pub sub_blocks_produced: u64,
    /// Sub-blocks handed off to PoW or PoS
    pub sub_blocks_handed_off: u64,
    /// Sub-blocks dropped at aggregation
    pub sub_blocks_rejected: u64,
    /// Transactions committed
    pub transactions_included: u64,
    /// Stake-sealed blocks
    pub blocks_pos: u64,
    /// Work-sealed blocks
    pub blocks_pow: u64,
    /// Failed cycles
    pub cycles_failed: u64,
}

impl MetricsSnapshot {
    /// Blocks finalized by either mechanism
    pub fn blocks_finalized(&self) -> u64 {
        self.blocks_pos + self.blocks_pow
    }

    /// Average transactions per committed sub-block
    pub fn avg_transactions_per_sub_block(&self) -> f64 {
        if self.sub_blocks_produced == 0 {
            return 0.0;
        }
        self.transactions_included as f64 / self.sub_blocks_produced as f64
    }
}

//! # Hybrid-Chain - Hybrid Consensus Engine
//!
//! Blends three block-production mechanisms into one decision procedure:
//!
//! - **PoW**: computational proof search, delegated to a [`ports::ProofSearcher`]
//! - **PoS**: stake-weighted validator selection, delegated to a [`ports::AuthorityRegistry`]
//! - **PoH**: low-latency sequential sub-blocks, produced by the engine itself
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Service (Outer)                                    │
//! │  - ConsensusEngine: lifecycle, start/stop/info      │
//! │  - Production loops: sub-block tick, block boundary │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports (Middle)                                     │
//! │  - Inbound: HybridConsensusApi                      │
//! │  - Outbound: Ledger, TransactionPool, Authority...  │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (Inner - Pure Logic)                        │
//! │  - calculate_weights / compute_threshold            │
//! │  - WeightConfigStore                                │
//! │  - PoH hashing, PoW retarget, reward schedule       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Critical Invariants
//!
//! 1. **Weights**: each component in `[0, 1]`, `pow + pos + poh == 1`
//! 2. **Threshold**: always in `[0, 1]`
//! 3. **WeightConfig**: finite, non-negative, `d_max > 0`, `s_max > 0`
//! 4. **Heights**: strictly increasing, advanced only after a ledger commit
//! 5. **Lifecycle**: start/stop are idempotent, no task outlives `stop()`
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let engine = ConsensusEngine::new(EngineConfig::default())?
//!     .with_ledger(ledger)
//!     .with_pool(pool)
//!     .with_authority(authority);
//!
//! engine.start().await?;
//! let status = engine.info().await;
//! engine.stop().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// In-memory and default collaborator implementations
pub mod adapters;
/// Domain models and pure consensus logic
pub mod domain;
/// Engine event definitions
pub mod events;
pub mod ports;
mod production;
pub mod service;

mod config;
mod error;
mod metrics;

pub use config::EngineConfig;
pub use error::{CollaboratorError, ConfigError, EngineError, LedgerError};
pub use metrics::{Metrics, MetricsSnapshot};

pub use domain::{
    calculate_weights, compute_threshold, Address, Block, BlockHeader, CircuitBreakerConfig,
    Hash, Mechanism, RewardConfig, RewardSplit, Seal, SubBlock, SubBlockHeader, ThresholdBands,
    WeightConfig, WeightConfigStore, Weights,
};

pub use ports::{
    Announcement, AuthorityRegistry, Broadcaster, EngineStatus, HybridConsensusApi, Ledger,
    Proof, ProofCandidate, ProofSearcher, SelectionCriteria, TransactionPool, ValidatorRole,
};

pub use events::{EngineEvent, LoopKind};

pub use service::ConsensusEngine;

/// Maximum sub-blocks aggregated into one block
pub const MAX_SUB_BLOCKS_PER_BLOCK: usize = 1_000;

/// Maximum transactions per sub-block
pub const MAX_TX_PER_SUB_BLOCK: usize = 5_000;

/// Default sub-block interval (1 second)
pub const SUB_BLOCK_INTERVAL_MS: u64 = 1_000;

/// Default block interval (15 minutes)
pub const BLOCK_INTERVAL_MS: u64 = 15 * 60 * 1_000;

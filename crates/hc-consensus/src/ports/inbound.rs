//! Inbound ports (driving side - API)

use crate::domain::{Mechanism, WeightConfig, Weights};
use crate::error::{ConfigError, EngineError};
use crate::metrics::MetricsSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Primary port: hybrid consensus engine
///
/// `start`/`stop` are idempotent and may be called from any task. The pure
/// queries never wait on the production loops.
#[async_trait]
pub trait HybridConsensusApi: Send + Sync {
    /// Spawn the production loops
    async fn start(&self) -> Result<(), EngineError>;

    /// Cancel and join the production loops
    async fn stop(&self) -> Result<(), EngineError>;

    /// Running flag and committed heights
    async fn info(&self) -> EngineStatus;

    /// Weights for a sample under the active configuration
    fn calculate_weights(&self, demand: f64, stake: f64) -> Weights;

    /// Threshold for a sample under the active configuration
    fn compute_threshold(&self, demand: f64, stake: f64) -> f64;

    /// Active weight configuration
    fn weight_config(&self) -> WeightConfig;

    /// Replace the weight configuration
    fn set_weight_config(&self, cfg: WeightConfig) -> Result<(), ConfigError>;
}

/// Engine status snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Production loops are running
    pub running: bool,
    /// Last committed sub-block height
    pub last_sub_block_height: u64,
    /// Last committed block height
    pub last_block_height: u64,
    /// Consensus mode chosen at the last block boundary
    pub mode: Option<Mechanism>,
    /// Live production tasks
    pub production_tasks: usize,
    /// Most recent cycle failure
    pub last_error: Option<String>,
    /// Production counters
    pub metrics: MetricsSnapshot,
}

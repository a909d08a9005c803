use crate::domain::Mechanism;
use serde::{Deserialize, Serialize};

/// Production loop that raised an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    /// PoH sub-block tick
    SubBlock,
    /// Block boundary
    Block,
}

/// Status event published on the engine's broadcast channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Production loops spawned
    Started,
    /// Production loops joined
    Stopped,
    /// Sub-block committed
    SubBlockProduced {
        /// Committed height
        height: u64,
        /// Transactions carried
        tx_count: u32,
    },
    /// Block committed
    BlockFinalized {
        /// Committed height
        height: u64,
        /// Sealing mechanism
        mechanism: Mechanism,
        /// Sub-blocks aggregated
        sub_blocks: usize,
    },
    /// Cycle aborted by a collaborator failure; the loop keeps running
    CycleFailed {
        /// Loop that failed
        loop_kind: LoopKind,
        /// Error message
        error: String,
        /// Whether the next cycle may succeed without intervention
        recoverable: bool,
    },
}

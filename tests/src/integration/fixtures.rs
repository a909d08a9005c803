//! Shared engine wiring and test doubles

use async_trait::async_trait;
use hc_consensus::adapters::{InMemoryLedger, InMemoryTxPool, RecordingBroadcaster, StaticAuthority};
use hc_consensus::{
    Address, Block, CircuitBreakerConfig, ConsensusEngine, EngineConfig, EngineEvent, Hash,
    Ledger, LedgerError, SubBlock, WeightConfig,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Millisecond-scale loops, unit weights and an easy PoW target
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        sub_block_interval_ms: 10,
        block_interval_ms: 60,
        weights: WeightConfig::new(1.0, 1.0, 1.0, 100.0, 100.0),
        initial_target_bits: 252,
        collaborator_timeout_ms: 500,
        stop_timeout_ms: 1_000,
        circuit_breaker: CircuitBreakerConfig {
            open_timeout_ms: 20,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Engine plus handles on its in-memory collaborators
pub struct Node {
    pub engine: ConsensusEngine,
    pub ledger: Arc<InMemoryLedger>,
    pub pool: Arc<InMemoryTxPool>,
    pub broadcaster: Arc<RecordingBroadcaster>,
}

/// Two validators sharing `stake` each
pub fn node(config: EngineConfig, stake: u64) -> Node {
    let ledger = Arc::new(InMemoryLedger::new());
    node_with_ledger(config, stake, ledger.clone(), ledger)
}

/// Same as [`node`] but with a custom ledger; `inspect` is the in-memory
/// chain the test reads back
pub fn node_with_ledger(
    config: EngineConfig,
    stake: u64,
    ledger: Arc<dyn Ledger>,
    inspect: Arc<InMemoryLedger>,
) -> Node {
    let pool = Arc::new(InMemoryTxPool::new());
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let validators: Vec<(Address, u64)> = vec![([0xA1; 20], stake), ([0xB2; 20], stake)];
    let engine = ConsensusEngine::new(config)
        .unwrap()
        .with_ledger(ledger)
        .with_pool(pool.clone())
        .with_authority(Arc::new(StaticAuthority::new(validators)))
        .with_broadcaster(broadcaster.clone());
    Node {
        engine,
        ledger: inspect,
        pool,
        broadcaster,
    }
}

/// Poll `cond` every few milliseconds; false if `within` elapses first
pub async fn wait_until(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Next event matching `pred`, skipping the rest; `None` on timeout or a
/// closed channel
pub async fn next_event(
    events: &mut broadcast::Receiver<EngineEvent>,
    within: Duration,
    pred: impl Fn(&EngineEvent) -> bool,
) -> Option<EngineEvent> {
    tokio::time::timeout(within, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Ledger whose appends never complete while `hang` is set
pub struct HangingLedger {
    pub inner: Arc<InMemoryLedger>,
    pub hang: AtomicBool,
}

impl HangingLedger {
    pub fn new(inner: Arc<InMemoryLedger>) -> Self {
        Self {
            inner,
            hang: AtomicBool::new(true),
        }
    }

    async fn stall(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Ledger for HangingLedger {
    async fn last_block_height(&self) -> Result<u64, LedgerError> {
        self.inner.last_block_height().await
    }

    async fn last_sub_block_height(&self) -> Result<u64, LedgerError> {
        self.inner.last_sub_block_height().await
    }

    async fn last_block_hash(&self) -> Result<Hash, LedgerError> {
        self.inner.last_block_hash().await
    }

    async fn append_sub_block(&self, sub_block: &SubBlock) -> Result<(), LedgerError> {
        self.stall().await;
        self.inner.append_sub_block(sub_block).await
    }

    async fn append_block(&self, block: &Block) -> Result<(), LedgerError> {
        self.stall().await;
        self.inner.append_block(block).await
    }
}

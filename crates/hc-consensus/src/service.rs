//! Consensus engine service
//!
//! Owns the collaborators, the shared production state and the two loop
//! tasks. An engine is an explicit value built by its composition root; there
//! is no process-wide handle.

use crate::adapters::Sha256ProofSearcher;
use crate::config::EngineConfig;
use crate::domain::{calculate_weights, compute_threshold, Mechanism, WeightConfig, Weights};
use crate::error::{CollaboratorError, ConfigError, EngineError, LedgerError};
use crate::events::EngineEvent;
use crate::metrics::MetricsSnapshot;
use crate::ports::{
    AuthorityRegistry, Broadcaster, EngineStatus, HybridConsensusApi, Ledger, ProofSearcher,
    TransactionPool,
};
use crate::production::{Collaborators, ProductionCycle, SharedState};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Decrements the live-task count when a loop future finishes or is aborted
struct TaskGuard(Arc<AtomicUsize>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Loop handles being joined by `stop`.
///
/// If the `stop` future is dropped mid-join, whatever is left is aborted
/// instead of detaching.
struct Draining<'a> {
    tasks: Vec<JoinHandle<()>>,
    running: &'a AtomicBool,
}

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Hybrid PoW/PoS/PoH consensus engine
pub struct ConsensusEngine {
    config: Arc<EngineConfig>,
    state: Arc<SharedState>,
    ledger: Option<Arc<dyn Ledger>>,
    pool: Option<Arc<dyn TransactionPool>>,
    authority: Option<Arc<dyn AuthorityRegistry>>,
    prover: Arc<dyn ProofSearcher>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    running: AtomicBool,
    live_tasks: Arc<AtomicUsize>,
}

impl ConsensusEngine {
    /// Create an idle engine; collaborators are attached with the `with_*` builders
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = Arc::new(SharedState::new(&config)?);
        let prover = Arc::new(Sha256ProofSearcher::new(config.pow_max_attempts));
        Ok(Self {
            config: Arc::new(config),
            state,
            ledger: None,
            pool: None,
            authority: None,
            prover,
            broadcaster: None,
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            running: AtomicBool::new(false),
            live_tasks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Attach the ledger
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Attach the transaction pool (demand source)
    pub fn with_pool(mut self, pool: Arc<dyn TransactionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Attach the authority registry (stake source)
    pub fn with_authority(mut self, authority: Arc<dyn AuthorityRegistry>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Replace the default [`Sha256ProofSearcher`]
    pub fn with_prover(mut self, prover: Arc<dyn ProofSearcher>) -> Self {
        self.prover = prover;
        self
    }

    /// Attach a broadcaster for sub-block and block announcements
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn missing_collaborators(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.ledger.is_none() {
            missing.push("ledger");
        }
        if self.pool.is_none() {
            missing.push("pool");
        }
        if self.authority.is_none() {
            missing.push("authority");
        }
        missing
    }

    fn collaborators(&self) -> Result<Collaborators, EngineError> {
        match (&self.ledger, &self.pool, &self.authority) {
            (Some(ledger), Some(pool), Some(authority)) => Ok(Collaborators {
                ledger: Arc::clone(ledger),
                pool: Arc::clone(pool),
                authority: Arc::clone(authority),
                prover: Arc::clone(&self.prover),
                broadcaster: self.broadcaster.clone(),
            }),
            _ => Err(EngineError::NotInitialized {
                missing: self.missing_collaborators(),
            }),
        }
    }

    fn spawn_loop<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.live_tasks.fetch_add(1, Ordering::SeqCst);
        let guard = TaskGuard(Arc::clone(&self.live_tasks));
        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        })
    }

    /// Spawn the sub-block and block loops.
    ///
    /// Calling `start` on a running engine is a no-op.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.shutdown.is_some() {
            debug!("[hc] start requested while running");
            return Ok(());
        }

        let collaborators = self.collaborators()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cycle = ProductionCycle::new(
            Arc::clone(&self.config),
            collaborators,
            Arc::clone(&self.state),
            shutdown_rx,
        );

        lifecycle
            .tasks
            .push(self.spawn_loop(cycle.clone().run_sub_block_loop()));
        lifecycle.tasks.push(self.spawn_loop(cycle.run_block_loop()));
        lifecycle.shutdown = Some(shutdown_tx);
        self.running.store(true, Ordering::SeqCst);

        let _ = self.state.events.send(EngineEvent::Started);
        info!(
            sub_block_interval_ms = self.config.sub_block_interval_ms,
            block_interval_ms = self.config.block_interval_ms,
            "[hc] consensus started"
        );
        Ok(())
    }

    /// Signal both loops and wait for them to exit.
    ///
    /// Loops still running after `stop_timeout_ms` are aborted and awaited, so
    /// no production task outlives this call. Dropping the returned future
    /// early aborts the loops not yet joined. Stopping an idle engine is a no-op.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(shutdown) = lifecycle.shutdown.take() else {
            debug!("[hc] stop requested while idle");
            return Ok(());
        };
        let _ = shutdown.send(true);

        let deadline = tokio::time::Instant::now() + self.config.stop_timeout();
        let mut draining = Draining {
            tasks: std::mem::take(&mut lifecycle.tasks),
            running: &self.running,
        };
        while let Some(task) = draining.tasks.first_mut() {
            match tokio::time::timeout_at(deadline, &mut *task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[hc] production task ended abnormally: {}", e),
                Err(_) => {
                    warn!(
                        "[hc] production task still running after {}ms, aborting",
                        self.config.stop_timeout_ms
                    );
                    task.abort();
                    let _ = task.await;
                }
            }
            draining.tasks.remove(0);
        }
        drop(draining);

        let _ = self.state.events.send(EngineEvent::Stopped);
        info!("[hc] consensus stopped");
        Ok(())
    }

    /// Height read from the ledger, never lower than a height already reported
    async fn observed_height<F>(&self, slot: &AtomicU64, read: Option<F>) -> u64
    where
        F: Future<Output = Result<u64, LedgerError>>,
    {
        let Some(read) = read else {
            return slot.load(Ordering::SeqCst);
        };
        match tokio::time::timeout(self.config.collaborator_timeout(), read).await {
            Ok(Ok(height)) => slot.fetch_max(height, Ordering::SeqCst).max(height),
            Ok(Err(e)) => {
                debug!("[hc] ledger height unavailable, using last observed: {}", e);
                slot.load(Ordering::SeqCst)
            }
            Err(_) => slot.load(Ordering::SeqCst),
        }
    }

    /// Running flag, committed heights and production counters
    pub async fn info(&self) -> EngineStatus {
        let sub_read = self.ledger.as_ref().map(|l| l.last_sub_block_height());
        let last_sub_block_height = self
            .observed_height(&self.state.sub_block_height, sub_read)
            .await;
        let block_read = self.ledger.as_ref().map(|l| l.last_block_height());
        let last_block_height = self
            .observed_height(&self.state.block_height, block_read)
            .await;

        EngineStatus {
            running: self.running.load(Ordering::SeqCst),
            last_sub_block_height,
            last_block_height,
            mode: *self.state.mode.read(),
            production_tasks: self.live_tasks.load(Ordering::SeqCst),
            last_error: self.state.last_error.read().clone(),
            metrics: self.state.metrics.snapshot(),
        }
    }

    /// True between a successful `start` and the matching `stop`
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Weights for a sample under the active configuration
    pub fn calculate_weights(&self, demand: f64, stake: f64) -> Weights {
        calculate_weights(demand, stake, self.state.weights.get())
    }

    /// Threshold for a sample under the active configuration
    pub fn compute_threshold(&self, demand: f64, stake: f64) -> f64 {
        compute_threshold(demand, stake, self.state.weights.get())
    }

    /// Active weight configuration
    pub fn weight_config(&self) -> WeightConfig {
        self.state.weights.get()
    }

    /// Replace the weight configuration; takes effect on the next cycle
    pub fn set_weight_config(&self, cfg: WeightConfig) -> Result<(), ConfigError> {
        self.state.weights.set(cfg)
    }

    /// Sample live demand and stake and return the resulting weights
    pub async fn adjust(&self) -> Result<Weights, EngineError> {
        let (Some(pool), Some(authority)) = (&self.pool, &self.authority) else {
            let missing = self
                .missing_collaborators()
                .into_iter()
                .filter(|name| *name != "ledger")
                .collect();
            return Err(EngineError::NotInitialized { missing });
        };

        let limit = self.config.collaborator_timeout();
        let timeout = |collaborator: &'static str| CollaboratorError::Timeout {
            collaborator,
            after_ms: self.config.collaborator_timeout_ms,
        };
        let demand = tokio::time::timeout(limit, pool.current_demand())
            .await
            .map_err(|_| timeout("pool"))?
            .map_err(CollaboratorError::Pool)?;
        let stake = tokio::time::timeout(limit, authority.current_stake())
            .await
            .map_err(|_| timeout("authority"))?
            .map_err(CollaboratorError::Authority)?;

        let weights = self.calculate_weights(demand, stake);
        info!(
            demand,
            stake,
            pow = weights.pow,
            pos = weights.pos,
            poh = weights.poh,
            "[hc] weights adjusted"
        );
        Ok(weights)
    }

    /// Consensus mode chosen at the last block boundary
    pub fn current_mode(&self) -> Option<Mechanism> {
        *self.state.mode.read()
    }

    /// Production counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot()
    }

    /// Committed sub-blocks waiting for the next block
    pub fn pending_sub_blocks(&self) -> usize {
        self.state.pending_len()
    }

    /// Subscribe to lifecycle and production events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.state.events.subscribe()
    }
}

impl Drop for ConsensusEngine {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut();
        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(true);
        }
        for task in lifecycle.tasks.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl HybridConsensusApi for ConsensusEngine {
    async fn start(&self) -> Result<(), EngineError> {
        ConsensusEngine::start(self).await
    }

    async fn stop(&self) -> Result<(), EngineError> {
        ConsensusEngine::stop(self).await
    }

    async fn info(&self) -> EngineStatus {
        ConsensusEngine::info(self).await
    }

    fn calculate_weights(&self, demand: f64, stake: f64) -> Weights {
        ConsensusEngine::calculate_weights(self, demand, stake)
    }

    fn compute_threshold(&self, demand: f64, stake: f64) -> f64 {
        ConsensusEngine::compute_threshold(self, demand, stake)
    }

    fn weight_config(&self) -> WeightConfig {
        ConsensusEngine::weight_config(self)
    }

    fn set_weight_config(&self, cfg: WeightConfig) -> Result<(), ConfigError> {
        ConsensusEngine::set_weight_config(self, cfg)
    }
}

//! Sub-block and block production
//!
//! Two loops share one [`SharedState`]:
//!
//! ```text
//! sub-block tick ──► sample ──► author by dominant ──► pick txs ──► PoH hash ──► ledger ──► pending
//!                                                                                             │
//! block boundary (interval, pending full, or PoW/PoS dominant) ◄──────────────────────────────┘
//!        │
//!        └──► sample ──► threshold ──► PoS select | PoW search ──► rewards ──► ledger
//! ```
//!
//! Every collaborator await is bounded by the collaborator timeout. Reads are
//! also raced against shutdown; ledger appends are not, so a committed unit is
//! always accounted for before the loop exits.

use crate::config::EngineConfig;
use crate::domain::hashing::{meets_target, pow_hash};
use crate::domain::rewards;
use crate::domain::{
    calculate_weights, compute_threshold, poh, sub_blocks_root, Block, BlockHeader,
    CircuitBreaker, Hash, Mechanism, Seal, SubBlock, SubBlockHeader, TargetRetargeter,
    WeightConfigStore, Weights,
};
use crate::error::{CollaboratorError, ConfigError};
use crate::events::{EngineEvent, LoopKind};
use crate::metrics::Metrics;
use crate::ports::{
    Announcement, AuthorityRegistry, Broadcaster, Ledger, ProofCandidate, ProofSearcher,
    SelectionCriteria, TransactionPool, ValidatorRole,
};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State shared by the engine and both production loops
pub(crate) struct SharedState {
    pub weights: WeightConfigStore,
    pub metrics: Metrics,
    pub events: broadcast::Sender<EngineEvent>,
    pub mode: RwLock<Option<Mechanism>>,
    pub last_error: RwLock<Option<String>>,
    /// Highest committed heights observed by this engine
    pub sub_block_height: AtomicU64,
    pub block_height: AtomicU64,
    pending: Mutex<VecDeque<SubBlock>>,
    /// Transactions picked for a sub-block whose commit failed
    carried: Mutex<Vec<Vec<u8>>>,
    last_poh: Mutex<Hash>,
    retarget: Mutex<TargetRetargeter>,
    breaker: CircuitBreaker,
    boundary: Notify,
}

impl SharedState {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            weights: WeightConfigStore::new(config.weights)?,
            metrics: Metrics::new(),
            events,
            mode: RwLock::new(None),
            last_error: RwLock::new(None),
            sub_block_height: AtomicU64::new(0),
            block_height: AtomicU64::new(0),
            pending: Mutex::new(VecDeque::new()),
            carried: Mutex::new(Vec::new()),
            last_poh: Mutex::new([0u8; 32]),
            retarget: Mutex::new(TargetRetargeter::new(
                config.initial_target_bits,
                config.retarget_window,
                config.block_interval_ms,
            )),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            boundary: Notify::new(),
        })
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

/// Collaborator handles attached to a running engine
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub pool: Arc<dyn TransactionPool>,
    pub authority: Arc<dyn AuthorityRegistry>,
    pub prover: Arc<dyn ProofSearcher>,
    pub broadcaster: Option<Arc<dyn Broadcaster>>,
}

/// Why a cycle ended early
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// Shutdown requested
    Cancelled,
    /// Collaborator failed; the loop continues on the next tick
    Failed(CollaboratorError),
}

impl From<CollaboratorError> for Interrupt {
    fn from(error: CollaboratorError) -> Self {
        Self::Failed(error)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SubBlockOutcome {
    Produced(u64),
    /// Nothing to sequence
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BlockOutcome {
    Finalized(u64, Mechanism),
    Idle,
}

/// Resolves once shutdown is signalled or the engine is dropped
pub(crate) async fn shutdown_signalled(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// One engine's production logic, cloned into each loop task
#[derive(Clone)]
pub(crate) struct ProductionCycle {
    config: Arc<EngineConfig>,
    collaborators: Collaborators,
    state: Arc<SharedState>,
    shutdown: watch::Receiver<bool>,
}

impl ProductionCycle {
    pub fn new(
        config: Arc<EngineConfig>,
        collaborators: Collaborators,
        state: Arc<SharedState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            collaborators,
            state,
            shutdown,
        }
    }

    fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Bounded collaborator read, raced against shutdown
    async fn call<T, E, F>(
        &self,
        collaborator: &'static str,
        fut: F,
        map_err: fn(E) -> CollaboratorError,
    ) -> Result<T, Interrupt>
    where
        F: Future<Output = Result<T, E>>,
    {
        if self.cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if !self.state.breaker.should_allow(collaborator) {
            return Err(CollaboratorError::CircuitOpen(collaborator).into());
        }

        let result = tokio::select! {
            biased;
            _ = shutdown_signalled(self.shutdown.clone()) => return Err(Interrupt::Cancelled),
            result = tokio::time::timeout(self.config.collaborator_timeout(), fut) => result,
        };
        self.settle(collaborator, result, map_err)
    }

    /// Bounded ledger append; runs to completion even if shutdown arrives
    async fn commit<F>(&self, fut: F) -> Result<(), Interrupt>
    where
        F: Future<Output = Result<(), crate::error::LedgerError>>,
    {
        if !self.state.breaker.should_allow("ledger") {
            return Err(CollaboratorError::CircuitOpen("ledger").into());
        }
        let result = tokio::time::timeout(self.config.collaborator_timeout(), fut).await;
        self.settle("ledger", result, CollaboratorError::Ledger)
    }

    fn settle<T, E>(
        &self,
        collaborator: &'static str,
        result: Result<Result<T, E>, tokio::time::error::Elapsed>,
        map_err: fn(E) -> CollaboratorError,
    ) -> Result<T, Interrupt> {
        match result {
            Ok(Ok(value)) => {
                self.state.breaker.record_success(collaborator);
                Ok(value)
            }
            Ok(Err(error)) => {
                self.state.breaker.record_failure(collaborator);
                Err(map_err(error).into())
            }
            Err(_) => {
                self.state.breaker.record_failure(collaborator);
                Err(CollaboratorError::Timeout {
                    collaborator,
                    after_ms: self.config.collaborator_timeout_ms,
                }
                .into())
            }
        }
    }

    /// Live demand/stake sample turned into weights and threshold
    async fn sample(&self) -> Result<(Weights, f64), Interrupt> {
        let demand = self
            .call("pool", self.collaborators.pool.current_demand(), CollaboratorError::Pool)
            .await?;
        let stake = self
            .call(
                "authority",
                self.collaborators.authority.current_stake(),
                CollaboratorError::Authority,
            )
            .await?;
        let cfg = self.state.weights.get();
        Ok((
            calculate_weights(demand, stake, cfg),
            compute_threshold(demand, stake, cfg),
        ))
    }

    async fn select(&self, role: ValidatorRole, height: u64) -> Result<crate::Address, Interrupt> {
        let criteria = SelectionCriteria { role, height };
        self.call(
            "authority",
            self.collaborators.authority.select_weighted(&criteria),
            CollaboratorError::Authority,
        )
        .await
    }

    /// Carried-over transactions topped up from the pool
    async fn collect_transactions(&self) -> Result<Vec<Vec<u8>>, Interrupt> {
        let mut transactions = std::mem::take(&mut *self.state.carried.lock());
        let room = self
            .config
            .max_tx_per_sub_block
            .saturating_sub(transactions.len());
        if room == 0 {
            return Ok(transactions);
        }

        match self
            .call("pool", self.collaborators.pool.pick(room), CollaboratorError::Pool)
            .await
        {
            Ok(mut picked) => {
                transactions.append(&mut picked);
                Ok(transactions)
            }
            Err(interrupt) => {
                self.carry(transactions);
                Err(interrupt)
            }
        }
    }

    fn carry(&self, mut transactions: Vec<Vec<u8>>) {
        if transactions.is_empty() {
            return;
        }
        let mut carried = self.state.carried.lock();
        transactions.append(&mut carried);
        *carried = transactions;
    }

    async fn announce(&self, announcement: Announcement) {
        let Some(broadcaster) = &self.collaborators.broadcaster else {
            return;
        };
        let result = tokio::time::timeout(
            self.config.collaborator_timeout(),
            broadcaster.announce(announcement),
        )
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[hc] announcement failed: {}", e),
            Err(_) => warn!("[hc] announcement timed out"),
        }
    }

    /// One sub-block tick.
    ///
    /// Pending transactions are always sequenced. When PoW or PoS outweighs
    /// PoH the sub-block is authored by that mechanism's validator (miner or
    /// proposer) and the block boundary closes early.
    pub async fn sub_block_cycle(&self) -> Result<SubBlockOutcome, Interrupt> {
        let (weights, _) = self.sample().await?;
        let dominant = weights.dominant(self.config.tie_epsilon);
        let role = match dominant {
            Mechanism::ProofOfHistory => ValidatorRole::Sequencer,
            Mechanism::ProofOfStake => ValidatorRole::Proposer,
            Mechanism::ProofOfWork => ValidatorRole::Miner,
        };

        let height = self
            .call(
                "ledger",
                self.collaborators.ledger.last_sub_block_height(),
                CollaboratorError::Ledger,
            )
            .await?
            + 1;
        let validator = self.select(role, height).await?;

        let transactions = self.collect_transactions().await?;
        if transactions.is_empty() {
            return Ok(SubBlockOutcome::Idle);
        }

        let timestamp_ms = now_ms();
        let prev_poh_hash = *self.state.last_poh.lock();
        let sub_block = SubBlock {
            header: SubBlockHeader {
                height,
                timestamp_ms,
                validator,
                prev_poh_hash,
                poh_hash: poh::compute(&prev_poh_hash, &transactions, timestamp_ms),
                tx_count: transactions.len() as u32,
            },
            transactions,
        };

        if let Err(interrupt) = self
            .commit(self.collaborators.ledger.append_sub_block(&sub_block))
            .await
        {
            self.carry(sub_block.transactions);
            return Err(interrupt);
        }

        let header = sub_block.header.clone();
        *self.state.last_poh.lock() = header.poh_hash;
        self.state.sub_block_height.fetch_max(height, Ordering::SeqCst);
        let pending = {
            let mut pending = self.state.pending.lock();
            pending.push_back(sub_block);
            pending.len()
        };
        let handed_off = dominant != Mechanism::ProofOfHistory;
        if handed_off {
            self.state.metrics.record_handoff();
            debug!(
                pow = weights.pow,
                pos = weights.pos,
                poh = weights.poh,
                "[hc] sub-block #{} handed off, {} dominant",
                height,
                dominant
            );
        }
        if handed_off || pending >= self.config.max_sub_blocks_per_block {
            self.state.boundary.notify_one();
        }

        self.state.metrics.record_sub_block(header.tx_count);
        self.state.publish(EngineEvent::SubBlockProduced {
            height,
            tx_count: header.tx_count,
        });
        debug!(
            height,
            tx_count = header.tx_count,
            "[hc] sub-block #{} sequenced | poh: {}",
            height,
            hex::encode(&header.poh_hash[..8])
        );
        self.announce(Announcement::SubBlock(header)).await;

        Ok(SubBlockOutcome::Produced(height))
    }

    /// Up to one block's worth of pending sub-blocks that pass PoH verification
    fn take_pending(&self) -> Vec<SubBlock> {
        let drained: Vec<SubBlock> = {
            let mut pending = self.state.pending.lock();
            let take = pending.len().min(self.config.max_sub_blocks_per_block);
            pending.drain(..take).collect()
        };
        let (valid, invalid): (Vec<SubBlock>, Vec<SubBlock>) =
            drained.into_iter().partition(poh::verify);
        if !invalid.is_empty() {
            self.state.metrics.record_rejected(invalid.len() as u64);
            for sub_block in &invalid {
                warn!(
                    height = sub_block.header.height,
                    "[hc] dropping sub-block with invalid PoH hash"
                );
            }
        }
        valid
    }

    fn requeue(&self, batch: Vec<SubBlock>) {
        let mut pending = self.state.pending.lock();
        for sub_block in batch.into_iter().rev() {
            pending.push_front(sub_block);
        }
    }

    /// One block boundary
    pub async fn block_cycle(&self) -> Result<BlockOutcome, Interrupt> {
        if self.state.pending_len() == 0 {
            return Ok(BlockOutcome::Idle);
        }

        let (weights, threshold) = self.sample().await?;
        let bands = &self.config.threshold_bands;
        let mode = Mechanism::from_threshold(threshold, bands);
        *self.state.mode.write() = Some(mode);
        let mechanism = bands.sealing_mechanism(threshold);

        let batch = self.take_pending();
        if batch.is_empty() {
            return Ok(BlockOutcome::Idle);
        }

        match self.finalize(&batch, weights, threshold, mechanism).await {
            Ok(block) => {
                self.publish_block(&block, mode).await;
                Ok(BlockOutcome::Finalized(block.header.height, mechanism))
            }
            Err(interrupt) => {
                self.requeue(batch);
                Err(interrupt)
            }
        }
    }

    async fn finalize(
        &self,
        batch: &[SubBlock],
        weights: Weights,
        threshold: f64,
        mechanism: Mechanism,
    ) -> Result<Block, Interrupt> {
        let ledger = &self.collaborators.ledger;
        let height = self
            .call("ledger", ledger.last_block_height(), CollaboratorError::Ledger)
            .await?
            + 1;
        let prev_hash = self
            .call("ledger", ledger.last_block_hash(), CollaboratorError::Ledger)
            .await?;

        let timestamp_ms = now_ms();
        let sub_headers: Vec<SubBlockHeader> = batch.iter().map(|sb| sb.header.clone()).collect();
        let root = sub_blocks_root(&sub_headers);

        let (proposer, seal) = match mechanism {
            Mechanism::ProofOfWork => {
                let miner = self.select(ValidatorRole::Miner, height).await?;
                let header_bytes =
                    BlockHeader::sealing_bytes(height, timestamp_ms, &prev_hash, &miner, &root);
                let target = self.state.retarget.lock().target();
                let candidate = ProofCandidate {
                    header_bytes: header_bytes.clone(),
                    target,
                    height,
                };
                let proof = self
                    .call(
                        "prover",
                        self.collaborators.prover.search_proof(candidate),
                        CollaboratorError::Computation,
                    )
                    .await?;
                if pow_hash(&header_bytes, proof.nonce) != proof.hash
                    || !meets_target(&proof.hash, target)
                {
                    return Err(CollaboratorError::Computation(format!(
                        "proof for height {height} does not meet target"
                    ))
                    .into());
                }
                (
                    miner,
                    Seal::Work {
                        nonce: proof.nonce,
                        pow_hash: proof.hash,
                        target,
                    },
                )
            }
            _ => {
                let validator = self.select(ValidatorRole::Proposer, height).await?;
                (validator, Seal::Stake { validator })
            }
        };

        let rewards = rewards::split(height, proposer, &sub_headers, &self.config.rewards);
        let block = Block {
            header: BlockHeader {
                height,
                timestamp_ms,
                prev_hash,
                proposer,
                sub_blocks_root: root,
                mechanism,
                seal,
            },
            sub_headers,
            rewards,
            weights,
            threshold,
        };

        self.commit(ledger.append_block(&block)).await?;

        self.state.block_height.fetch_max(height, Ordering::SeqCst);
        if mechanism == Mechanism::ProofOfWork {
            self.state.retarget.lock().record(timestamp_ms);
        }
        Ok(block)
    }

    async fn publish_block(&self, block: &Block, mode: Mechanism) {
        let header = &block.header;
        let block_hash = header.hash();
        self.state.metrics.record_block(header.mechanism);
        self.state.publish(EngineEvent::BlockFinalized {
            height: header.height,
            mechanism: header.mechanism,
            sub_blocks: block.sub_headers.len(),
        });

        info!(
            height = header.height,
            mechanism = %header.mechanism,
            threshold = block.threshold,
            "[hc] Block #{} finalized | {} sub-blocks | hash: {}",
            header.height,
            block.sub_headers.len(),
            hex::encode(&block_hash[..8])
        );

        let event = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            "subsystem_id": "hc",
            "event_type": "BlockFinalized",
            "correlation_id": uuid::Uuid::new_v4().to_string(),
            "block_hash": hex::encode(block_hash),
            "block_height": header.height,
            "metadata": {
                "mechanism": header.mechanism,
                "mode": mode,
                "threshold": block.threshold,
                "weights": block.weights,
                "sub_blocks": block.sub_headers.len(),
                "reward_total": block.rewards.total.to_string(),
            }
        });
        info!("EVENT_FLOW_JSON {}", event);

        self.announce(Announcement::Block(header.clone())).await;
    }

    fn report_failure(&self, loop_kind: LoopKind, error: CollaboratorError) {
        self.state.metrics.record_failure();
        let message = error.to_string();
        warn!(
            loop_kind = ?loop_kind,
            recoverable = error.is_recoverable(),
            "[hc] {:?} cycle skipped: {}",
            loop_kind,
            message
        );
        *self.state.last_error.write() = Some(message.clone());
        self.state.publish(EngineEvent::CycleFailed {
            loop_kind,
            error: message,
            recoverable: error.is_recoverable(),
        });
    }

    /// Sub-block loop: one cycle per tick until shutdown
    pub async fn run_sub_block_loop(self) {
        let period = self.config.sub_block_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("[hc] sub-block loop started (every {}ms)", self.config.sub_block_interval_ms);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(self.shutdown.clone()) => break,
                _ = ticker.tick() => {}
            }
            match self.sub_block_cycle().await {
                Ok(SubBlockOutcome::Produced(height)) => trace!(height, "[hc] tick produced"),
                Ok(outcome) => trace!(?outcome, "[hc] tick skipped"),
                Err(Interrupt::Cancelled) => break,
                Err(Interrupt::Failed(error)) => self.report_failure(LoopKind::SubBlock, error),
            }
        }
        info!("[hc] sub-block loop stopped");
    }

    /// Block loop: one cycle per interval, or early when pending fills up
    pub async fn run_block_loop(self) {
        let period = self.config.block_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("[hc] block loop started (every {}ms)", self.config.block_interval_ms);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(self.shutdown.clone()) => break,
                _ = ticker.tick() => {}
                _ = self.state.boundary.notified() => {
                    debug!("[hc] boundary signalled, sealing early");
                }
            }
            match self.block_cycle().await {
                Ok(BlockOutcome::Finalized(height, mechanism)) => {
                    trace!(height, %mechanism, "[hc] boundary closed")
                }
                Ok(BlockOutcome::Idle) => trace!("[hc] boundary with nothing pending"),
                Err(Interrupt::Cancelled) => break,
                Err(Interrupt::Failed(error)) => self.report_failure(LoopKind::Block, error),
            }
        }
        info!("[hc] block loop stopped");
    }
}

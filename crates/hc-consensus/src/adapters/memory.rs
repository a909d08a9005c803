//! In-memory collaborators
//!
//! Back the `hc` demo node and the integration tests. The ledger can be
//! switched into an unavailable state to exercise failure handling.

use crate::domain::hashing::sha256;
use crate::domain::{Address, Block, Hash, SubBlock};
use crate::error::LedgerError;
use crate::ports::{
    Announcement, AuthorityRegistry, Broadcaster, Ledger, SelectionCriteria, TransactionPool,
    ValidatorRole,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Chain {
    sub_blocks: Vec<SubBlock>,
    blocks: Vec<Block>,
}

/// Vec-backed ledger enforcing height continuity
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    chain: RwLock<Chain>,
    unavailable: AtomicBool,
}

impl InMemoryLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`LedgerError::Unavailable`] until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Committed blocks
    pub fn blocks(&self) -> Vec<Block> {
        self.chain.read().blocks.clone()
    }

    /// Committed sub-blocks
    pub fn sub_blocks(&self) -> Vec<SubBlock> {
        self.chain.read().sub_blocks.clone()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn last_block_height(&self) -> Result<u64, LedgerError> {
        self.check_available()?;
        Ok(self.chain.read().blocks.len() as u64)
    }

    async fn last_sub_block_height(&self) -> Result<u64, LedgerError> {
        self.check_available()?;
        Ok(self.chain.read().sub_blocks.len() as u64)
    }

    async fn last_block_hash(&self) -> Result<Hash, LedgerError> {
        self.check_available()?;
        Ok(self
            .chain
            .read()
            .blocks
            .last()
            .map(|b| b.header.hash())
            .unwrap_or([0u8; 32]))
    }

    async fn append_sub_block(&self, sub_block: &SubBlock) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut chain = self.chain.write();
        let expected = chain.sub_blocks.len() as u64 + 1;
        if sub_block.header.height != expected {
            return Err(LedgerError::HeightConflict {
                expected,
                got: sub_block.header.height,
            });
        }
        chain.sub_blocks.push(sub_block.clone());
        Ok(())
    }

    async fn append_block(&self, block: &Block) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut chain = self.chain.write();
        let expected = chain.blocks.len() as u64 + 1;
        if block.header.height != expected {
            return Err(LedgerError::HeightConflict {
                expected,
                got: block.header.height,
            });
        }
        let tip = chain.blocks.last().map(|b| b.header.hash()).unwrap_or([0u8; 32]);
        if block.header.prev_hash != tip {
            return Err(LedgerError::Rejected("prev_hash does not match tip".into()));
        }
        chain.blocks.push(block.clone());
        Ok(())
    }
}

/// FIFO transaction pool; demand is the queue depth
#[derive(Debug, Default)]
pub struct InMemoryTxPool {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl InMemoryTxPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transaction
    pub fn submit(&self, tx: Vec<u8>) {
        self.queue.lock().push_back(tx);
    }

    /// Pending transactions
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[async_trait]
impl TransactionPool for InMemoryTxPool {
    async fn current_demand(&self) -> Result<f64, String> {
        Ok(self.queue.lock().len() as f64)
    }

    async fn pick(&self, max: usize) -> Result<Vec<Vec<u8>>, String> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.len());
        Ok(queue.drain(..take).collect())
    }
}

/// Fixed validator set with deterministic stake-weighted selection
#[derive(Debug, Clone)]
pub struct StaticAuthority {
    validators: Vec<(Address, u64)>,
}

impl StaticAuthority {
    /// Validators and their stake
    pub fn new(validators: Vec<(Address, u64)>) -> Self {
        Self { validators }
    }

    fn total_stake(&self) -> u64 {
        self.validators
            .iter()
            .fold(0u64, |acc, (_, stake)| acc.saturating_add(*stake))
    }
}

#[async_trait]
impl AuthorityRegistry for StaticAuthority {
    async fn current_stake(&self) -> Result<f64, String> {
        Ok(self.total_stake() as f64)
    }

    async fn select_weighted(&self, criteria: &SelectionCriteria) -> Result<Address, String> {
        let total = self.total_stake();
        if total == 0 {
            return Err("no staked validators registered".into());
        }

        let role = match criteria.role {
            ValidatorRole::Sequencer => 0u8,
            ValidatorRole::Proposer => 1,
            ValidatorRole::Miner => 2,
        };
        let mut seed_input = vec![role];
        seed_input.extend_from_slice(&criteria.height.to_le_bytes());
        let seed = sha256(&seed_input);
        let mut word = [0u8; 8];
        word.copy_from_slice(&seed[..8]);
        let mut point = u64::from_le_bytes(word) % total;

        for (address, stake) in &self.validators {
            if point < *stake {
                return Ok(*address);
            }
            point -= stake;
        }
        Err("stake selection fell through".into())
    }
}

/// Broadcaster that keeps every announcement
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<Announcement>>,
}

impl RecordingBroadcaster {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Announcements so far, oldest first
    pub fn announcements(&self) -> Vec<Announcement> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn announce(&self, announcement: Announcement) -> Result<(), String> {
        self.sent.lock().push(announcement);
        Ok(())
    }
}

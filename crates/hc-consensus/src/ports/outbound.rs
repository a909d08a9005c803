//! Outbound ports (driven side - SPI)
//!
//! Every collaborator the engine drives. Implementations must be cancel-safe:
//! the production loops drop in-flight futures on shutdown or timeout.

use crate::domain::{Address, Block, BlockHeader, Hash, SubBlock, SubBlockHeader};
use crate::error::LedgerError;
use async_trait::async_trait;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Port: durable chain storage
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Height of the last committed block (0 if none)
    async fn last_block_height(&self) -> Result<u64, LedgerError>;

    /// Height of the last committed sub-block (0 if none)
    async fn last_sub_block_height(&self) -> Result<u64, LedgerError>;

    /// Hash of the last committed block header (zero hash if none)
    async fn last_block_hash(&self) -> Result<Hash, LedgerError>;

    /// Commit a sub-block; it must extend the sub-block tip by one
    async fn append_sub_block(&self, sub_block: &SubBlock) -> Result<(), LedgerError>;

    /// Commit a block; it must extend the block tip by one
    async fn append_block(&self, block: &Block) -> Result<(), LedgerError>;
}

/// Port: pending transaction source
#[async_trait]
pub trait TransactionPool: Send + Sync {
    /// Current demand sample (queue depth, fee pressure, ...)
    async fn current_demand(&self) -> Result<f64, String>;

    /// Remove and return up to `max` transactions in arrival order
    async fn pick(&self, max: usize) -> Result<Vec<Vec<u8>>, String>;
}

/// Role a validator is selected for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidatorRole {
    /// Orders a PoH sub-block
    Sequencer,
    /// Seals a block by stake
    Proposer,
    /// Seals a block by work
    Miner,
}

/// Selection request passed to the authority registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionCriteria {
    /// Role being filled
    pub role: ValidatorRole,
    /// Height of the unit being produced
    pub height: u64,
}

/// Port: validator set and stake
#[async_trait]
pub trait AuthorityRegistry: Send + Sync {
    /// Aggregate stake sample
    async fn current_stake(&self) -> Result<f64, String>;

    /// Stake-weighted validator choice for a role
    async fn select_weighted(&self, criteria: &SelectionCriteria) -> Result<Address, String>;
}

/// Proof-of-work search request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofCandidate {
    /// Header bytes covered by the seal
    pub header_bytes: Vec<u8>,
    /// Ceiling the double SHA-256 must meet
    pub target: U256,
    /// Height being sealed
    pub height: u64,
}

/// Proof-of-work result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proof {
    /// Winning nonce
    pub nonce: u64,
    /// Resulting hash
    pub hash: Hash,
}

/// Port: proof-of-work computation
#[async_trait]
pub trait ProofSearcher: Send + Sync {
    /// Find a nonce whose hash meets the candidate's target
    async fn search_proof(&self, candidate: ProofCandidate) -> Result<Proof, String>;
}

/// Unit announced to peers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Announcement {
    /// Newly committed sub-block
    SubBlock(SubBlockHeader),
    /// Newly finalized block
    Block(BlockHeader),
}

/// Port: peer gossip
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Announce a committed unit; failures never roll back the commit
    async fn announce(&self, announcement: Announcement) -> Result<(), String>;
}

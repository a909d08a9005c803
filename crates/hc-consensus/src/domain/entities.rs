//! Sub-blocks, blocks and their seals

use super::hashing::{merkle_root, sha256};
use super::rewards::RewardSplit;
use super::weights::{Mechanism, Weights};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// 32-byte hash
pub type Hash = [u8; 32];

/// 20-byte validator / account address
pub type Address = [u8; 20];

/// Header of a PoH-sequenced sub-block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBlockHeader {
    /// Sub-block height (strictly increasing)
    pub height: u64,
    /// Production time (Unix epoch milliseconds)
    pub timestamp_ms: u64,
    /// Validator chosen as sequencer for this tick
    pub validator: Address,
    /// PoH hash of the previous sub-block
    pub prev_poh_hash: Hash,
    /// PoH hash of this sub-block
    pub poh_hash: Hash,
    /// Number of transactions carried
    pub tx_count: u32,
}

impl SubBlockHeader {
    /// Canonical header hash
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(8 + 8 + 20 + 32 + 32 + 4);
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        buf.extend_from_slice(&self.validator);
        buf.extend_from_slice(&self.prev_poh_hash);
        buf.extend_from_slice(&self.poh_hash);
        buf.extend_from_slice(&self.tx_count.to_le_bytes());
        sha256(&buf)
    }
}

/// Sub-block with its transaction payloads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBlock {
    /// Header
    pub header: SubBlockHeader,
    /// Opaque transaction bytes, in PoH order
    pub transactions: Vec<Vec<u8>>,
}

/// How a block was sealed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Seal {
    /// Stake-weighted proposer signature slot
    Stake {
        /// Selected proposer
        validator: Address,
    },
    /// Proof of work
    Work {
        /// Winning nonce
        nonce: u64,
        /// Double SHA-256 of the sealing bytes and nonce
        pow_hash: Hash,
        /// Target ceiling the hash met
        target: U256,
    },
}

/// Header of a finalized block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height (strictly increasing)
    pub height: u64,
    /// Finalization time (Unix epoch milliseconds)
    pub timestamp_ms: u64,
    /// Hash of the previous block header
    pub prev_hash: Hash,
    /// Proposer (PoS) or miner (PoW)
    pub proposer: Address,
    /// Merkle root over included sub-block header hashes
    pub sub_blocks_root: Hash,
    /// Mechanism that sealed the block
    pub mechanism: Mechanism,
    /// Seal
    pub seal: Seal,
}

impl BlockHeader {
    /// Bytes covered by the seal (everything except the seal itself)
    pub fn sealing_bytes(
        height: u64,
        timestamp_ms: u64,
        prev_hash: &Hash,
        proposer: &Address,
        sub_blocks_root: &Hash,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 32 + 20 + 32);
        buf.extend_from_slice(&height.to_le_bytes());
        buf.extend_from_slice(&timestamp_ms.to_le_bytes());
        buf.extend_from_slice(prev_hash);
        buf.extend_from_slice(proposer);
        buf.extend_from_slice(sub_blocks_root);
        buf
    }

    /// Canonical header hash, including the seal
    pub fn hash(&self) -> Hash {
        let mut buf = Self::sealing_bytes(
            self.height,
            self.timestamp_ms,
            &self.prev_hash,
            &self.proposer,
            &self.sub_blocks_root,
        );
        match &self.seal {
            Seal::Stake { validator } => {
                buf.push(0);
                buf.extend_from_slice(validator);
            }
            Seal::Work {
                nonce,
                pow_hash,
                target,
            } => {
                buf.push(1);
                buf.extend_from_slice(&nonce.to_le_bytes());
                buf.extend_from_slice(pow_hash);
                let mut target_bytes = [0u8; 32];
                target.to_big_endian(&mut target_bytes);
                buf.extend_from_slice(&target_bytes);
            }
        }
        sha256(&buf)
    }
}

/// Finalized block handed to the ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Header
    pub header: BlockHeader,
    /// Headers of the aggregated sub-blocks, in height order
    pub sub_headers: Vec<SubBlockHeader>,
    /// Reward distribution applied on commit
    pub rewards: RewardSplit,
    /// Weights observed at the boundary
    pub weights: Weights,
    /// Threshold observed at the boundary
    pub threshold: f64,
}

/// Merkle root over a list of sub-block headers
pub fn sub_blocks_root(headers: &[SubBlockHeader]) -> Hash {
    let leaves: Vec<Hash> = headers.iter().map(SubBlockHeader::hash).collect();
    merkle_root(&leaves)
}

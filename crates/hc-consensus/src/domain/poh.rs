//! Proof-of-History sequencing
//!
//! Each sub-block chains onto its predecessor:
//! `poh = sha256(prev_poh || tx_1 || .. || tx_n || timestamp_ms_le)`.

use super::entities::{Hash, SubBlock};
use sha2::{Digest, Sha256};

/// PoH hash for a batch of transactions at `timestamp_ms`
pub fn compute(prev: &Hash, transactions: &[Vec<u8>], timestamp_ms: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    for tx in transactions {
        hasher.update(tx);
    }
    hasher.update(timestamp_ms.to_le_bytes());
    hasher.finalize().into()
}

/// Recompute a sub-block's PoH hash and compare it to its header
pub fn verify(sub_block: &SubBlock) -> bool {
    let header = &sub_block.header;
    header.tx_count as usize == sub_block.transactions.len()
        && compute(&header.prev_poh_hash, &sub_block.transactions, header.timestamp_ms)
            == header.poh_hash
}

//! Hashing helpers shared by PoH sequencing and PoW sealing

use super::entities::Hash;
use primitive_types::U256;
use sha2::{Digest, Sha256};

/// SHA-256 of `data`
#[inline]
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Double SHA-256 of `data`
#[inline]
pub fn sha256d(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// Big-endian interpretation of a hash
#[inline]
pub fn hash_to_u256(hash: &Hash) -> U256 {
    U256::from_big_endian(hash)
}

/// PoW hash of a header candidate with `nonce` appended little-endian
pub fn pow_hash(header_bytes: &[u8], nonce: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(header_bytes);
    hasher.update(nonce.to_le_bytes());
    let first: Hash = hasher.finalize().into();
    sha256(&first)
}

/// True if `hash` lies at or below the target ceiling
#[inline]
pub fn meets_target(hash: &Hash, target: U256) -> bool {
    hash_to_u256(hash) <= target
}

/// Commitment over an ordered list of sub-block header hashes.
///
/// An empty list commits to the zero hash.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                hasher.update(pair[0]);
                // Odd node is paired with itself
                hasher.update(pair.get(1).unwrap_or(&pair[0]));
                hasher.finalize().into()
            })
            .collect();
    }
    level[0]
}

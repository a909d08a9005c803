//! Default proof searcher: bounded double SHA-256 nonce search

use crate::domain::hashing::{meets_target, pow_hash};
use crate::ports::{Proof, ProofCandidate, ProofSearcher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CANCEL_CHECK_INTERVAL: u64 = 4_096;

/// CPU nonce search on tokio's blocking pool
#[derive(Clone, Debug)]
pub struct Sha256ProofSearcher {
    max_attempts: u64,
}

impl Sha256ProofSearcher {
    /// Give up after `max_attempts` nonces
    pub fn new(max_attempts: u64) -> Self {
        Self { max_attempts }
    }
}

/// Raises the flag when the awaiting future is dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn search(candidate: &ProofCandidate, max_attempts: u64, cancelled: &AtomicBool) -> Option<Proof> {
    for nonce in 0..max_attempts {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancelled.load(Ordering::Relaxed) {
            return None;
        }
        let hash = pow_hash(&candidate.header_bytes, nonce);
        if meets_target(&hash, candidate.target) {
            return Some(Proof { nonce, hash });
        }
    }
    None
}

#[async_trait]
impl ProofSearcher for Sha256ProofSearcher {
    async fn search_proof(&self, candidate: ProofCandidate) -> Result<Proof, String> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancelled));
        let max_attempts = self.max_attempts;
        let height = candidate.height;

        let found = tokio::task::spawn_blocking(move || search(&candidate, max_attempts, &cancelled))
            .await
            .map_err(|e| format!("proof search task failed: {e}"))?;

        found.ok_or_else(|| format!("no nonce below target after {max_attempts} attempts at height {height}"))
    }
}

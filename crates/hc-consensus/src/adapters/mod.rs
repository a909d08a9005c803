mod memory;
mod pow;

pub use memory::{InMemoryLedger, InMemoryTxPool, RecordingBroadcaster, StaticAuthority};
pub use pow::Sha256ProofSearcher;

//! Cross-module scenarios driven through [`hc_consensus::ConsensusEngine`]

pub mod fixtures;

mod failures;
mod lifecycle;
mod production;

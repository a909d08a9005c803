//! Domain layer - pure consensus logic
//!
//! Nothing here performs I/O or awaits. The production loops feed live
//! samples in and hand the results to the outbound ports.
//!
//! ## Calculations
//!
//! - [`calculate_weights`]: demand/stake sample to a PoW/PoS/PoH weight vector
//! - [`compute_threshold`]: demand/stake sample to a scalar switch threshold
//! - [`ThresholdBands`]: threshold to consensus mode and sealing mechanism
//!
//! ## Chain primitives
//!
//! - [`SubBlock`] / [`Block`]: PoH-sequenced units and their aggregation
//! - [`poh`]: sequential hash chain and its verification
//! - [`TargetRetargeter`]: PoW target ceiling tracking the block interval
//! - [`rewards`]: halving schedule and payout split

pub mod circuit_breaker;
pub mod difficulty;
mod entities;
pub mod hashing;
pub mod poh;
pub mod rewards;
mod store;
mod threshold;
mod weights;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use difficulty::TargetRetargeter;
pub use entities::*;
pub use rewards::{RewardConfig, RewardSplit};
pub use store::WeightConfigStore;
pub use threshold::{compute_threshold, ThresholdBands};
pub use weights::{calculate_weights, normalize, Mechanism, WeightConfig, Weights};

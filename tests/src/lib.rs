//! # Hybrid-Chain Test Suite
//!
//! ```text
//! tests/
//! ├── benches/          # criterion: weights, threshold, PoH, PoW search
//! └── src/integration/  # engine lifecycle and production against in-memory collaborators
//! ```
//!
//! ```bash
//! cargo test -p hc-tests integration::
//! cargo bench -p hc-tests
//! ```

pub mod integration;

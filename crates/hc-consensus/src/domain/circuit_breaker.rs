//! Circuit breaker for collaborator calls
//!
//! Keeps one circuit per collaborator (ledger, pool, authority, prover) so a
//! failing dependency makes production cycles fail fast instead of stacking
//! timeouts.
//!
//! ## States
//!
//! - **Closed**: calls flow through
//! - **Open**: calls fail fast until `open_timeout_ms` has passed
//! - **Half-Open**: probing recovery; one failure reopens

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Circuit breaker configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Half-open successes before closing
    pub success_threshold: u32,
    /// Time spent open before probing
    pub open_timeout_ms: u64,
    /// Disable to let every call through
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout_ms: 30_000,
            enabled: true,
        }
    }
}

/// Circuit state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing fast
    Open,
    /// Testing recovery
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

impl Circuit {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
        }
    }
}

/// Per-collaborator circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<&'static str, Circuit>>,
}

impl CircuitBreaker {
    /// Create a breaker with every circuit closed
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call to `collaborator` may proceed
    pub fn should_allow(&self, collaborator: &'static str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut circuits = self.circuits.lock();
        let circuit = circuits.entry(collaborator).or_insert_with(Circuit::closed);
        if circuit.state != CircuitState::Open {
            return true;
        }

        let open_for = Duration::from_millis(self.config.open_timeout_ms);
        match circuit.opened_at {
            Some(opened) if opened.elapsed() >= open_for => {
                circuit.state = CircuitState::HalfOpen;
                circuit.half_open_successes = 0;
                tracing::info!("[hc] circuit for {} half-open", collaborator);
                true
            }
            _ => false,
        }
    }

    /// Record a successful call
    pub fn record_success(&self, collaborator: &'static str) {
        if !self.config.enabled {
            return;
        }

        let mut circuits = self.circuits.lock();
        let circuit = circuits.entry(collaborator).or_insert_with(Circuit::closed);
        match circuit.state {
            CircuitState::Closed => circuit.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                if circuit.half_open_successes >= self.config.success_threshold {
                    *circuit = Circuit::closed();
                    tracing::info!("[hc] circuit for {} closed", collaborator);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self, collaborator: &'static str) {
        if !self.config.enabled {
            return;
        }

        let mut circuits = self.circuits.lock();
        let circuit = circuits.entry(collaborator).or_insert_with(Circuit::closed);
        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);

        let trip = match circuit.state {
            CircuitState::Closed => circuit.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if trip {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Instant::now());
            circuit.half_open_successes = 0;
            tracing::warn!(
                "[hc] circuit for {} opened after {} failures",
                collaborator,
                circuit.consecutive_failures
            );
        }
    }

    /// Current state of a collaborator's circuit
    pub fn state(&self, collaborator: &'static str) -> CircuitState {
        self.circuits
            .lock()
            .get(collaborator)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }
}

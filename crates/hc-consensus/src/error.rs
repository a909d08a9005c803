//! Error types for the hybrid consensus engine

use thiserror::Error;

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A field violates its invariant; the previous configuration stays active
    #[error("Invalid configuration: {field} {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors reported by the ledger collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Ledger cannot be reached or is not accepting writes
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Appended unit does not extend the current tip
    #[error("Height conflict: expected {expected}, got {got}")]
    HeightConflict {
        /// Height the ledger expected next
        expected: u64,
        /// Height that was submitted
        got: u64,
    },

    /// Ledger refused the unit for another reason
    #[error("Ledger rejected unit: {0}")]
    Rejected(String),
}

/// Failure of an external collaborator during a production cycle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    /// Ledger read or append failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Transaction pool failure
    #[error("Transaction pool error: {0}")]
    Pool(String),

    /// Authority registry failure
    #[error("Authority registry error: {0}")]
    Authority(String),

    /// Proof search failure
    #[error("Computation error: {0}")]
    Computation(String),

    /// Broadcast failure
    #[error("Broadcast error: {0}")]
    Broadcast(String),

    /// Call exceeded the configured collaborator timeout
    #[error("{collaborator} did not respond within {after_ms}ms")]
    Timeout {
        /// Collaborator name
        collaborator: &'static str,
        /// Timeout that elapsed
        after_ms: u64,
    },

    /// Circuit breaker is open for this collaborator
    #[error("Circuit open for {0}")]
    CircuitOpen(&'static str),
}

impl CollaboratorError {
    /// Check if the next cycle may reasonably succeed without operator action
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::CircuitOpen(_)
                | Self::Pool(_)
                | Self::Broadcast(_)
                | Self::Ledger(LedgerError::Unavailable(_))
        )
    }
}

/// Errors returned by the engine's lifecycle operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Start requested before the required collaborators were attached
    #[error("consensus not initialised: missing {}", missing.join(", "))]
    NotInitialized {
        /// Names of the collaborators that are missing
        missing: Vec<&'static str>,
    },

    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A collaborator failed on a synchronous request path
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

//! Error types for the recovery-wallet coordination client.
//!
//! This module defines all error types that can occur while coordinating
//! on-chain recovery-wallet state, split along the boundaries that matter to
//! callers: local validation, pre-submission simulation, post-submission
//! failure, read degradation, and best-effort reconciliation.

use thiserror::Error;

/// Main error type for recovery-wallet operations
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// A local precondition failed; never reaches the network
    #[error("Validation error: {0}")]
    Validation(String),

    /// The would-be transaction was rejected during dry-run, before submission
    #[error("Simulation rejected: {0}")]
    Simulation(String),

    /// The transaction was rejected or reverted after submission
    #[error("Submission failed: {0}")]
    Submission(String),

    /// A chain read failed after bounded retries
    #[error("Read error: {0}")]
    Read(String),

    /// Best-effort mirroring to external persistence failed (non-fatal)
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Error returned by the chain RPC endpoint
    #[error("Chain RPC error: {0}")]
    Rpc(String),

    /// Network communication error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Transaction not found on chain
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Confirmation wait exceeded the configured timeout
    #[error("Transaction timeout after {0} seconds")]
    TransactionTimeout(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Max retries exceeded
    #[error("Max retries ({0}) exceeded")]
    MaxRetriesExceeded(usize),

    /// Malformed response from the RPC endpoint
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Creation request not found or no longer pending
    #[error("Creation request not found: {0}")]
    RequestNotFound(u64),

    /// Another submission for the same logical operation is already in flight
    #[error("Operation already in flight")]
    OperationInFlight,

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Local storage I/O error
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Result type alias for recovery-wallet operations
pub type Result<T> = std::result::Result<T, RecoveryError>;

impl RecoveryError {
    /// Whether this error came from the simulate step rather than submission.
    ///
    /// Callers use this to distinguish "the contract would reject this" from
    /// "the network dropped it".
    pub fn is_simulation(&self) -> bool {
        matches!(self, RecoveryError::Simulation(_))
    }

    /// Whether this error should degrade to "no data" on the read path
    pub fn is_read_degradable(&self) -> bool {
        matches!(
            self,
            RecoveryError::Read(_)
                | RecoveryError::Network(_)
                | RecoveryError::Rpc(_)
                | RecoveryError::InvalidResponse(_)
                | RecoveryError::MaxRetriesExceeded(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecoveryError::Validation("threshold below minimum".to_string());
        assert_eq!(err.to_string(), "Validation error: threshold below minimum");
    }

    #[test]
    fn test_simulation_classification() {
        assert!(RecoveryError::Simulation("would revert".to_string()).is_simulation());
        assert!(!RecoveryError::Submission("dropped".to_string()).is_simulation());
    }

    #[test]
    fn test_read_degradable_classification() {
        assert!(RecoveryError::Read("rpc down".to_string()).is_read_degradable());
        assert!(RecoveryError::MaxRetriesExceeded(2).is_read_degradable());
        assert!(!RecoveryError::Validation("bad address".to_string()).is_read_degradable());
        assert!(!RecoveryError::Submission("reverted".to_string()).is_read_degradable());
    }
}

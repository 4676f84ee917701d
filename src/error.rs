//! Dispatch error taxonomy
//!
//! Only failures that stop work are errors. A ledger refusing a write or a
//! non-member read being denied are ordinary outcomes and travel in
//! [`crate::router::TransactionOutcome`] instead.

use web3::types::Address;

/// Fatal dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid privacy group: {0}")]
    InvalidGroup(String),

    #[error("Contract call issued without a deployed contract")]
    MissingContract,

    #[error("Node {node} unreachable at {endpoint}: {reason}")]
    TransportFailure {
        node: String,
        endpoint: String,
        reason: String,
    },

    #[error("ABI encoding error: {0}")]
    Encoding(String),

    #[error("Account {address:?} is used by both run {first} and run {second}")]
    SharedAccount {
        address: Address,
        first: usize,
        second: usize,
    },

    #[error("Run {run} did not finish: {reason}")]
    RunFailed { run: usize, reason: String },
}

impl DispatchError {
    /// Transport failures only end the affected node's remaining operations
    pub fn is_transport(&self) -> bool {
        matches!(self, DispatchError::TransportFailure { .. })
    }
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

//! Ledger client collaborator
//!
//! Network submission, `eth_call` execution and receipt polling sit behind
//! [`LedgerClient`]. The router only decides what to send and to whom.
pub mod memory;
pub mod web3_client;

use crate::node::NodeIdentity;
use crate::privacy::PrivacyGroup;
use serde::{Deserialize, Serialize};
use std::future::Future;
use web3::types::{Address, H256};

// Re-export main types
pub use memory::InMemoryLedger;
pub use web3_client::{LedgerConfig, Web3LedgerClient, Web3Provisioner};

/// Ledger client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Call execution failure: {0}")]
    CallExecution(String),

    #[error("No receipt for {0:?} before timeout")]
    ReceiptTimeout(H256),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// What the node returned for a contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResult {
    /// A write was accepted into the pool under this hash
    Submitted(H256),
    /// A read executed and returned this output
    Returned(Vec<u8>),
}

/// How a contract call should be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Transact,
    Read,
}

/// Processed transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub contract_address: Option<Address>,
    /// `false` when the transaction was mined but reverted
    pub success: bool,
}

/// Operations consumed from the underlying ledger client.
///
/// Every call is made against `creator`'s endpoint. Implementations must
/// report an empty `eth_call` output as [`LedgerError::CallExecution`], since
/// that is how a node without the private state answers.
pub trait LedgerClient: Send + Sync {
    fn deploy_contract(
        &self,
        creator: &NodeIdentity,
        group: &PrivacyGroup,
        bytecode: &[u8],
        constructor_args: &[u8],
    ) -> impl Future<Output = Result<H256, LedgerError>> + Send;

    fn call_contract(
        &self,
        contract: Address,
        creator: &NodeIdentity,
        group: &PrivacyGroup,
        data: Vec<u8>,
        mode: CallMode,
    ) -> impl Future<Output = Result<RawResult, LedgerError>> + Send;

    fn wait_for_receipt(
        &self,
        node: &NodeIdentity,
        tx_hash: H256,
    ) -> impl Future<Output = Result<Receipt, LedgerError>> + Send;
}

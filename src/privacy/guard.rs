//! Visibility guard
//!
//! Reads contract state from the querying node's own endpoint and turns the
//! ledger's refusal to execute against state it does not hold into
//! [`TransactionOutcome::VisibilityDenied`]. Membership is never checked
//! locally; the ledger is the authority.

use crate::contract::{ContractHandle, ContractQuery};
use crate::error::DispatchResult;
use crate::ledger::{LedgerClient, LedgerError};
use crate::node::NodeIdentity;
use crate::privacy::resolve;
use crate::router::{TransactionOutcome, TransactionRouter};
use web3::types::U256;

/// Guarded read of `query` as seen by `querying_node`
pub async fn read_guarded<L: LedgerClient>(
    router: &TransactionRouter<L>,
    contract: &ContractHandle,
    querying_node: &NodeIdentity,
    query: ContractQuery,
) -> DispatchResult<TransactionOutcome<U256>> {
    let group = resolve(querying_node, &[])?;

    match router.read(contract, querying_node, &group, query).await {
        Ok(value) => Ok(TransactionOutcome::Committed(value)),
        Err(LedgerError::CallExecution(reason)) => {
            log::info!(
                "{} cannot see {:?}: {}",
                querying_node.name,
                contract.address,
                reason
            );
            Ok(TransactionOutcome::VisibilityDenied(reason))
        }
        Err(other) => router.classify(querying_node, other),
    }
}

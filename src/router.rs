//! Transaction router
//!
//! Scopes every contract interaction to a privacy group, hands it to the
//! ledger client, and blocks until a terminal outcome is known. One attempt
//! per call; retries are the ledger client's business.

use crate::contract::{ContractCall, ContractHandle, ContractQuery, TokenDefinition};
use crate::error::{DispatchError, DispatchResult};
use crate::ledger::{CallMode, LedgerClient, LedgerError, RawResult, Receipt};
use crate::node::NodeIdentity;
use crate::privacy::{resolve, PrivacyGroup};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use web3::types::U256;

/// Terminal state of one contract interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Committed,
    Rejected,
    VisibilityDenied,
}

/// Tagged result of a submission or read.
///
/// `T` is the receipt for writes, the decoded value for reads, or the new
/// contract handle for deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome<T> {
    Committed(T),
    Rejected(String),
    VisibilityDenied(String),
}

impl<T> TransactionOutcome<T> {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            TransactionOutcome::Committed(_) => OutcomeStatus::Committed,
            TransactionOutcome::Rejected(_) => OutcomeStatus::Rejected,
            TransactionOutcome::VisibilityDenied(_) => OutcomeStatus::VisibilityDenied,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed(_))
    }

    pub fn committed(&self) -> Option<&T> {
        match self {
            TransactionOutcome::Committed(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TransactionOutcome<U> {
        match self {
            TransactionOutcome::Committed(value) => TransactionOutcome::Committed(f(value)),
            TransactionOutcome::Rejected(reason) => TransactionOutcome::Rejected(reason),
            TransactionOutcome::VisibilityDenied(reason) => TransactionOutcome::VisibilityDenied(reason),
        }
    }
}

/// Stateless dispatcher over a shared ledger client
pub struct TransactionRouter<L> {
    ledger: Arc<L>,
    bytecode: Arc<Vec<u8>>,
}

impl<L> Clone for TransactionRouter<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            bytecode: Arc::clone(&self.bytecode),
        }
    }
}

impl<L: LedgerClient> TransactionRouter<L> {
    /// `bytecode` is the compiled token, prepended to constructor arguments
    pub fn new(ledger: Arc<L>, bytecode: Vec<u8>) -> Self {
        Self {
            ledger,
            bytecode: Arc::new(bytecode),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Everything except a transport failure becomes a `Rejected` outcome
    pub fn classify<T>(&self, node: &NodeIdentity, err: LedgerError) -> DispatchResult<TransactionOutcome<T>> {
        match err {
            LedgerError::Transport(reason) => {
                log::error!("{} unreachable: {}", node.name, reason);
                Err(DispatchError::TransportFailure {
                    node: node.name.clone(),
                    endpoint: node.endpoint.clone(),
                    reason,
                })
            }
            other => {
                log::warn!("{} rejected: {}", node.name, other);
                Ok(TransactionOutcome::Rejected(other.to_string()))
            }
        }
    }

    /// Submits `operation` from `creator` scoped to `group`.
    ///
    /// `contract` is `None` only for a deployment.
    pub async fn submit(
        &self,
        contract: Option<&ContractHandle>,
        creator: &NodeIdentity,
        group: &PrivacyGroup,
        operation: &ContractCall,
    ) -> DispatchResult<TransactionOutcome<Receipt>> {
        if group.creator().address != creator.address {
            return Err(DispatchError::InvalidGroup(format!(
                "group resolved for {} but submitted by {}",
                group.creator().name,
                creator.name
            )));
        }

        log::info!("{} submitting {} for {} member key(s)", creator.name, operation, group.members().len());

        let submitted = match (operation, contract) {
            (ContractCall::Deploy(definition), _) => {
                self.ledger
                    .deploy_contract(creator, group, &self.bytecode, &definition.constructor_args())
                    .await
            }
            (call, Some(handle)) => {
                let data = call.calldata().ok_or_else(|| DispatchError::Encoding(call.to_string()))?;
                match self
                    .ledger
                    .call_contract(handle.address, creator, group, data, CallMode::Transact)
                    .await
                {
                    Ok(RawResult::Submitted(tx_hash)) => Ok(tx_hash),
                    Ok(RawResult::Returned(_)) => Err(LedgerError::Decode(
                        "node executed a transaction as a call".to_string(),
                    )),
                    Err(e) => Err(e),
                }
            }
            (_, None) => return Err(DispatchError::MissingContract),
        };

        let tx_hash = match submitted {
            Ok(tx_hash) => tx_hash,
            Err(e) => return self.classify(creator, e),
        };
        log::debug!("{} awaiting receipt for {:?}", creator.name, tx_hash);

        match self.ledger.wait_for_receipt(creator, tx_hash).await {
            Ok(receipt) if receipt.success => {
                log::info!("{:?} committed in block {}", tx_hash, receipt.block_number);
                Ok(TransactionOutcome::Committed(receipt))
            }
            Ok(receipt) => {
                log::warn!("{:?} reverted in block {}", tx_hash, receipt.block_number);
                Ok(TransactionOutcome::Rejected(format!("transaction {:?} reverted", tx_hash)))
            }
            Err(e) => self.classify(creator, e),
        }
    }

    /// Deploys the token privately between `creator` and `participants`
    pub async fn deploy(
        &self,
        creator: &NodeIdentity,
        participants: &[NodeIdentity],
        definition: TokenDefinition,
    ) -> DispatchResult<TransactionOutcome<ContractHandle>> {
        let group = resolve(creator, participants)?;
        let outcome = self
            .submit(None, creator, &group, &ContractCall::Deploy(definition))
            .await?;

        Ok(match outcome {
            TransactionOutcome::Committed(receipt) => match receipt.contract_address {
                Some(address) => TransactionOutcome::Committed(ContractHandle {
                    address,
                    creation_group: group,
                }),
                None => TransactionOutcome::Rejected(format!(
                    "receipt {:?} carries no contract address",
                    receipt.transaction_hash
                )),
            },
            TransactionOutcome::Rejected(reason) => TransactionOutcome::Rejected(reason),
            TransactionOutcome::VisibilityDenied(reason) => TransactionOutcome::VisibilityDenied(reason),
        })
    }

    /// Read-only call executed on `node`'s own endpoint.
    ///
    /// The ledger error is returned untouched so the caller decides how to
    /// classify it.
    pub async fn read(
        &self,
        contract: &ContractHandle,
        node: &NodeIdentity,
        group: &PrivacyGroup,
        query: ContractQuery,
    ) -> Result<U256, LedgerError> {
        log::debug!("{} reading {} from {:?}", node.name, query, contract.address);
        match self
            .ledger
            .call_contract(contract.address, node, group, query.calldata(), CallMode::Read)
            .await?
        {
            RawResult::Returned(output) => {
                ContractQuery::decode_output(&output).map_err(|e| LedgerError::Decode(e.to_string()))
            }
            RawResult::Submitted(tx_hash) => Err(LedgerError::Decode(format!(
                "node submitted {:?} for a read-only call",
                tx_hash
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::node::PublicKey;
    use web3::types::Address;

    fn node(name: &str, key: &str, byte: u8) -> NodeIdentity {
        NodeIdentity::new(
            name,
            Address::repeat_byte(byte),
            vec![PublicKey::from(key)],
            format!("http://{}:8545", name),
        )
    }

    fn definition(supply: u64) -> TokenDefinition {
        TokenDefinition {
            name: "Quorum Token".into(),
            symbol: "QT".into(),
            decimals: 8,
            initial_supply: U256::from(supply),
        }
    }

    fn network(nodes: &[&NodeIdentity]) -> TransactionRouter<InMemoryLedger> {
        let ledger = InMemoryLedger::new();
        for n in nodes {
            ledger.register_node(n.endpoint.clone(), n.public_keys[0].clone());
            ledger.import_account(&n.endpoint, n.address);
        }
        TransactionRouter::new(Arc::new(ledger), vec![0x60, 0x80])
    }

    #[tokio::test]
    async fn test_deploy_binds_creation_group() {
        let a = node("nodeA", "ka", 0xa);
        let b = node("nodeB", "kb", 0xb);
        let router = network(&[&a, &b]);

        let outcome = router.deploy(&a, &[b.clone()], definition(1_000)).await.unwrap();
        let handle = outcome.committed().unwrap();

        assert_eq!(handle.creation_group.members(), &[PublicKey::from("kb")]);
        assert_eq!(handle.creation_group.creator(), &a);
    }

    #[tokio::test]
    async fn test_submit_without_contract_fails() {
        let a = node("nodeA", "ka", 0xa);
        let router = network(&[&a]);
        let group = resolve(&a, &[]).unwrap();

        let err = router
            .submit(None, &a, &group, &ContractCall::Burn { amount: U256::one() })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingContract));
    }

    #[tokio::test]
    async fn test_group_must_belong_to_submitter() {
        let a = node("nodeA", "ka", 0xa);
        let b = node("nodeB", "kb", 0xb);
        let router = network(&[&a, &b]);
        let group = resolve(&a, &[]).unwrap();

        let err = router
            .submit(None, &b, &group, &ContractCall::Deploy(definition(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidGroup(_)));
    }

    #[tokio::test]
    async fn test_reverted_write_is_rejected() {
        let a = node("nodeA", "ka", 0xa);
        let b = node("nodeB", "kb", 0xb);
        let router = network(&[&a, &b]);
        let handle = router.deploy(&a, &[b.clone()], definition(10)).await.unwrap();
        let handle = handle.committed().unwrap().clone();

        let outcome = router
            .submit(
                Some(&handle),
                &a,
                &handle.creation_group,
                &ContractCall::Transfer { to: b.address, amount: U256::from(11u64) },
            )
            .await
            .unwrap();
        assert_eq!(outcome.status(), OutcomeStatus::Rejected);
    }

    #[tokio::test]
    async fn test_committed_transfer_changes_balance() {
        let a = node("nodeA", "ka", 0xa);
        let b = node("nodeB", "kb", 0xb);
        let router = network(&[&a, &b]);
        let handle = router.deploy(&a, &[b.clone()], definition(10)).await.unwrap();
        let handle = handle.committed().unwrap().clone();

        let outcome = router
            .submit(
                Some(&handle),
                &a,
                &handle.creation_group,
                &ContractCall::Transfer { to: b.address, amount: U256::from(4u64) },
            )
            .await
            .unwrap();
        assert!(outcome.is_committed());

        let own = resolve(&b, &[]).unwrap();
        let balance = router
            .read(&handle, &b, &own, ContractQuery::BalanceOf(b.address))
            .await
            .unwrap();
        assert_eq!(balance, U256::from(4u64));
    }

    #[tokio::test]
    async fn test_unreachable_creator_is_transport_failure() {
        let a = node("nodeA", "ka", 0xa);
        let router = network(&[]);

        let err = router.deploy(&a, &[], definition(1)).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_outcome_map_keeps_tag() {
        let denied: TransactionOutcome<u8> = TransactionOutcome::VisibilityDenied("x".into());
        assert_eq!(denied.map(|v| v as u32).status(), OutcomeStatus::VisibilityDenied);
        assert_eq!(TransactionOutcome::Committed(2u8).map(|v| v * 2), TransactionOutcome::Committed(4));
    }
}

//! Token operations facade
//!
//! Sequences the demonstration against the router and guard, keeps a shadow
//! of the balances the ledger should hold, and reports every outcome. It
//! owns no business rules beyond ordering and comparison.
pub mod report;

use crate::contract::{ContractCall, ContractHandle, ContractQuery, TokenDefinition};
use crate::error::{DispatchError, DispatchResult};
use crate::ledger::{LedgerClient, Receipt};
use crate::node::NodeIdentity;
use crate::privacy::read_guarded;
use crate::router::{TransactionOutcome, TransactionRouter};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use web3::types::{Address, U256};

pub use report::{BalanceSnapshot, IntegrityViolation, Operation, RunReport, StepRecord, StepStatus};

/// Token parameters and quantities used by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPlan {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub initial_supply: u64,
    pub participant_allocation: u64,
    pub outsider_allocation: u64,
    pub mint_quantity: u64,
    pub burn_quantity: u64,
}

impl Default for TokenPlan {
    fn default() -> Self {
        Self {
            name: "Quorum Token".to_string(),
            symbol: "QT".to_string(),
            decimals: 8,
            initial_supply: 1_000_000,
            participant_allocation: 100_000,
            outsider_allocation: 50_000,
            mint_quantity: 500_000,
            burn_quantity: 499_999,
        }
    }
}

impl TokenPlan {
    pub fn definition(&self) -> TokenDefinition {
        TokenDefinition {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            initial_supply: U256::from(self.initial_supply),
        }
    }
}

/// Who deploys, who is in the group, and who is left out
#[derive(Debug, Clone)]
pub struct Roster {
    pub creator: NodeIdentity,
    pub participants: Vec<NodeIdentity>,
    pub outsiders: Vec<NodeIdentity>,
}

impl Roster {
    /// First node creates, the last (given two or more) stays outside the
    /// group, everything in between participates.
    pub fn from_nodes(nodes: &[NodeIdentity]) -> DispatchResult<Self> {
        match nodes {
            [] => Err(DispatchError::InvalidGroup("no nodes supplied".to_string())),
            [creator] => Ok(Self {
                creator: creator.clone(),
                participants: vec![],
                outsiders: vec![],
            }),
            [creator, participants @ .., outsider] => Ok(Self {
                creator: creator.clone(),
                participants: participants.to_vec(),
                outsiders: vec![outsider.clone()],
            }),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &NodeIdentity> {
        std::iter::once(&self.creator)
            .chain(self.participants.iter())
            .chain(self.outsiders.iter())
    }
}

/// Balances the ledger should report, tracked from committed writes
#[derive(Debug, Default)]
struct Shadow {
    balances: HashMap<Address, U256>,
    total_supply: U256,
}

impl Shadow {
    fn balance(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    fn apply(&mut self, sender: Address, call: &ContractCall) {
        match call {
            ContractCall::Deploy(def) => {
                self.balances.insert(sender, def.initial_supply);
                self.total_supply = def.initial_supply;
            }
            ContractCall::Transfer { to, amount } => {
                let from = self.balance(&sender).saturating_sub(*amount);
                self.balances.insert(sender, from);
                let to_balance = self.balance(to);
                self.balances.insert(*to, to_balance + *amount);
            }
            ContractCall::Mint { to, amount } => {
                let to_balance = self.balance(to);
                self.balances.insert(*to, to_balance + *amount);
                self.total_supply += *amount;
            }
            ContractCall::Burn { amount } => {
                let balance = self.balance(&sender).saturating_sub(*amount);
                self.balances.insert(sender, balance);
                self.total_supply = self.total_supply.saturating_sub(*amount);
            }
        }
    }
}

/// Mutable bookkeeping for a single run
struct RunState<'r> {
    roster: &'r Roster,
    report: RunReport,
    shadow: Shadow,
    offline: HashSet<String>,
}

impl<'r> RunState<'r> {
    fn name_of(&self, address: &Address) -> String {
        self.roster
            .all()
            .find(|n| &n.address == address)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| format!("{:?}", address))
    }

    fn operation_for(&self, call: &ContractCall) -> Operation {
        match call {
            ContractCall::Deploy(def) => Operation::Deploy {
                name: def.name.clone(),
                symbol: def.symbol.clone(),
            },
            ContractCall::Transfer { to, amount } => Operation::Transfer {
                to: self.name_of(to),
                amount: amount.to_string(),
            },
            ContractCall::Mint { to, amount } => Operation::Mint {
                to: self.name_of(to),
                amount: amount.to_string(),
            },
            ContractCall::Burn { amount } => Operation::Burn { amount: amount.to_string() },
        }
    }

    fn push(&mut self, operation: Operation, node: &NodeIdentity, status: StepStatus, expected: StepStatus, detail: Option<String>) -> usize {
        self.report.steps.push(StepRecord {
            operation,
            node: node.name.clone(),
            status,
            expected,
            detail,
        });
        self.report.steps.len() - 1
    }

    fn violation(&mut self, step: usize, node: &NodeIdentity, message: String) {
        log::error!("integrity violation on {}: {}", node.name, message);
        self.report.violations.push(IntegrityViolation {
            step,
            node: node.name.clone(),
            message,
        });
    }

    /// Records a transport failure and marks the node as gone for the run
    fn record_unreachable(&mut self, operation: Operation, node: &NodeIdentity, expected: StepStatus, err: DispatchError) -> DispatchResult<()> {
        if !err.is_transport() {
            return Err(err);
        }
        self.offline.insert(node.endpoint.clone());
        self.push(operation, node, StepStatus::TransportFailure, expected, Some(err.to_string()));
        Ok(())
    }

    fn skip_if_offline(&mut self, operation: &Operation, node: &NodeIdentity, expected: StepStatus) -> bool {
        if self.offline.contains(&node.endpoint) {
            log::warn!("skipping {:?} on unreachable {}", operation, node.name);
            self.push(operation.clone(), node, StepStatus::Skipped, expected, None);
            return true;
        }
        false
    }
}

/// Runs the token demonstration over a shared ledger client
pub struct TokenDemo<L> {
    router: TransactionRouter<L>,
    plan: TokenPlan,
}

impl<L: LedgerClient> TokenDemo<L> {
    pub fn new(router: TransactionRouter<L>, plan: TokenPlan) -> Self {
        Self { router, plan }
    }

    /// Entry point: see [`Roster::from_nodes`] for how roles are assigned
    pub async fn run_demonstration(&self, nodes: &[NodeIdentity]) -> DispatchResult<RunReport> {
        let roster = Roster::from_nodes(nodes)?;
        self.run_with_roster(&roster).await
    }

    pub async fn run_with_roster(&self, roster: &Roster) -> DispatchResult<RunReport> {
        let mut run = RunState {
            roster,
            report: RunReport::default(),
            shadow: Shadow::default(),
            offline: HashSet::new(),
        };
        let creator = &roster.creator;

        let Some(handle) = self.deploy(&mut run).await? else {
            return Ok(run.report);
        };
        log::info!(
            "{} ({}) created at contract address {:?}, by account {:?}",
            self.plan.name,
            self.plan.symbol,
            handle.address,
            creator.address
        );
        run.report.token = Some(handle.address);

        for participant in &roster.participants {
            let call = ContractCall::Transfer {
                to: participant.address,
                amount: U256::from(self.plan.participant_allocation),
            };
            self.write(&mut run, &handle, &call, StepStatus::Committed).await?;
        }
        // Outsiders can be credited; they just cannot see it
        for outsider in &roster.outsiders {
            let call = ContractCall::Transfer {
                to: outsider.address,
                amount: U256::from(self.plan.outsider_allocation),
            };
            self.write(&mut run, &handle, &call, StepStatus::Committed).await?;
        }
        self.snapshot(&mut run, &handle).await?;

        log::info!("Increasing available supply by {}", self.plan.mint_quantity);
        let mint = ContractCall::Mint {
            to: creator.address,
            amount: U256::from(self.plan.mint_quantity),
        };
        self.write(&mut run, &handle, &mint, StepStatus::Committed).await?;
        self.snapshot(&mut run, &handle).await?;

        log::info!("Decreasing available supply by {}", self.plan.burn_quantity);
        let burn = ContractCall::Burn {
            amount: U256::from(self.plan.burn_quantity),
        };
        self.write(&mut run, &handle, &burn, StepStatus::Committed).await?;
        self.snapshot(&mut run, &handle).await?;

        // Burning more than exists must be refused by the contract
        let over_burn = ContractCall::Burn {
            amount: run.shadow.total_supply + U256::one(),
        };
        self.write(&mut run, &handle, &over_burn, StepStatus::Rejected).await?;

        if run.report.is_successful() {
            log::info!("demonstration completed with {} steps", run.report.steps.len());
        } else {
            log::warn!("demonstration finished with unexpected outcomes");
        }
        Ok(run.report)
    }

    async fn deploy(&self, run: &mut RunState<'_>) -> DispatchResult<Option<ContractHandle>> {
        let roster = run.roster;
        let definition = self.plan.definition();
        let call = ContractCall::Deploy(definition.clone());
        let operation = run.operation_for(&call);

        let outcome = match self
            .router
            .deploy(&roster.creator, &roster.participants, definition)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = err.to_string();
                run.record_unreachable(operation, &roster.creator, StepStatus::Committed, err)?;
                run.report.aborted = Some(reason);
                return Ok(None);
            }
        };

        match outcome {
            TransactionOutcome::Committed(handle) => {
                run.shadow.apply(roster.creator.address, &call);
                run.push(
                    operation,
                    &roster.creator,
                    StepStatus::Committed,
                    StepStatus::Committed,
                    Some(format!("{:?}", handle.address)),
                );
                Ok(Some(handle))
            }
            other => {
                let reason = match &other {
                    TransactionOutcome::Rejected(r) | TransactionOutcome::VisibilityDenied(r) => r.clone(),
                    TransactionOutcome::Committed(_) => String::new(),
                };
                run.push(operation, &roster.creator, other.status().into(), StepStatus::Committed, Some(reason.clone()));
                run.report.aborted = Some(format!("deployment failed: {}", reason));
                Ok(None)
            }
        }
    }

    async fn write(
        &self,
        run: &mut RunState<'_>,
        handle: &ContractHandle,
        call: &ContractCall,
        expected: StepStatus,
    ) -> DispatchResult<()> {
        let roster = run.roster;
        let creator = &roster.creator;
        let operation = run.operation_for(call);
        if run.skip_if_offline(&operation, creator, expected) {
            return Ok(());
        }

        let outcome: TransactionOutcome<Receipt> = match self
            .router
            .submit(Some(handle), creator, &handle.creation_group, call)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return run.record_unreachable(operation, creator, expected, err),
        };

        let status: StepStatus = outcome.status().into();
        let detail = match &outcome {
            TransactionOutcome::Committed(receipt) => format!("{:?}", receipt.transaction_hash),
            TransactionOutcome::Rejected(r) | TransactionOutcome::VisibilityDenied(r) => r.clone(),
        };
        if outcome.is_committed() {
            run.shadow.apply(creator.address, call);
        }
        let step = run.push(operation, creator, status, expected, Some(detail));

        if expected == StepStatus::Rejected && outcome.is_committed() {
            run.violation(step, creator, format!("{} committed but should have been refused", call));
        }
        Ok(())
    }

    /// Every node reads its own balance, the creator reads everyone else's,
    /// then the creator reads total supply
    async fn snapshot(&self, run: &mut RunState<'_>, handle: &ContractHandle) -> DispatchResult<()> {
        let roster = run.roster;
        log::info!("Getting token balances from every node");
        let mut balances = Vec::new();

        for node in roster.all() {
            let visible = handle.creation_group.is_open_to(node);
            let expected = if visible { StepStatus::Committed } else { StepStatus::VisibilityDenied };
            let operation = Operation::BalanceOf { owner: node.name.clone() };
            let shadow = run.shadow.balance(&node.address);

            let mut snapshot = BalanceSnapshot {
                node: node.name.clone(),
                address: node.address,
                status: StepStatus::Skipped,
                balance: None,
                expected: visible.then(|| shadow.to_string()),
            };

            if run.skip_if_offline(&operation, node, expected) {
                balances.push(snapshot);
                continue;
            }

            let outcome = match read_guarded(&self.router, handle, node, ContractQuery::BalanceOf(node.address)).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    run.record_unreachable(operation, node, expected, err)?;
                    snapshot.status = StepStatus::TransportFailure;
                    balances.push(snapshot);
                    continue;
                }
            };

            snapshot.status = outcome.status().into();
            let detail = match &outcome {
                TransactionOutcome::Committed(value) => value.to_string(),
                TransactionOutcome::Rejected(r) | TransactionOutcome::VisibilityDenied(r) => r.clone(),
            };
            let step = run.push(operation, node, snapshot.status, expected, Some(detail));

            match outcome {
                TransactionOutcome::Committed(value) => {
                    log::info!("{} balance: {}", node.name, value);
                    snapshot.balance = Some(value.to_string());
                    if !visible {
                        run.violation(
                            step,
                            node,
                            format!("non-member read its balance ({}) from a private contract", value),
                        );
                    } else if value != shadow {
                        run.violation(step, node, format!("balance {} but expected {}", value, shadow));
                    }
                }
                TransactionOutcome::VisibilityDenied(_) => {
                    log::info!("{} unable to view its balance as it was not included in token creation", node.name);
                }
                TransactionOutcome::Rejected(reason) => {
                    log::warn!("{} balance read rejected: {}", node.name, reason);
                }
            }
            balances.push(snapshot);
        }
        run.report.balances = balances;

        self.read_creator_view(run, handle).await?;
        self.read_supply(run, handle).await
    }

    /// The creator holds the whole contract, outsiders' balances included
    async fn read_creator_view(&self, run: &mut RunState<'_>, handle: &ContractHandle) -> DispatchResult<()> {
        let roster = run.roster;
        let creator = &roster.creator;
        let mut view = Vec::new();

        for owner in roster.all().skip(1) {
            let operation = Operation::BalanceOf { owner: owner.name.clone() };
            let shadow = run.shadow.balance(&owner.address);
            let mut snapshot = BalanceSnapshot {
                node: owner.name.clone(),
                address: owner.address,
                status: StepStatus::Skipped,
                balance: None,
                expected: Some(shadow.to_string()),
            };

            if run.skip_if_offline(&operation, creator, StepStatus::Committed) {
                view.push(snapshot);
                continue;
            }

            let query = ContractQuery::BalanceOf(owner.address);
            let outcome = match read_guarded(&self.router, handle, creator, query).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    run.record_unreachable(operation, creator, StepStatus::Committed, err)?;
                    snapshot.status = StepStatus::TransportFailure;
                    view.push(snapshot);
                    continue;
                }
            };

            snapshot.status = outcome.status().into();
            match outcome {
                TransactionOutcome::Committed(value) => {
                    log::info!("{} sees {} balance: {}", creator.name, owner.name, value);
                    let step = run.push(operation, creator, StepStatus::Committed, StepStatus::Committed, Some(value.to_string()));
                    snapshot.balance = Some(value.to_string());
                    if value != shadow {
                        run.violation(step, creator, format!("{} balance {} but expected {}", owner.name, value, shadow));
                    }
                }
                TransactionOutcome::Rejected(reason) | TransactionOutcome::VisibilityDenied(reason) => {
                    log::warn!("{} could not read {} balance: {}", creator.name, owner.name, reason);
                    run.push(operation, creator, snapshot.status, StepStatus::Committed, Some(reason));
                }
            }
            view.push(snapshot);
        }
        run.report.creator_view = view;
        Ok(())
    }

    async fn read_supply(&self, run: &mut RunState<'_>, handle: &ContractHandle) -> DispatchResult<()> {
        let roster = run.roster;
        let creator = &roster.creator;
        let operation = Operation::TotalSupply;
        if run.skip_if_offline(&operation, creator, StepStatus::Committed) {
            return Ok(());
        }

        let outcome = match read_guarded(&self.router, handle, creator, ContractQuery::TotalSupply).await {
            Ok(outcome) => outcome,
            Err(err) => return run.record_unreachable(operation, creator, StepStatus::Committed, err),
        };

        let expected_supply = run.shadow.total_supply;
        match outcome {
            TransactionOutcome::Committed(supply) => {
                log::info!("Available supply: {}", supply);
                let step = run.push(operation, creator, StepStatus::Committed, StepStatus::Committed, Some(supply.to_string()));
                run.report.total_supply = Some(supply.to_string());
                if supply != expected_supply {
                    run.violation(step, creator, format!("total supply {} but expected {}", supply, expected_supply));
                }
            }
            other => {
                let reason = match &other {
                    TransactionOutcome::Rejected(r) | TransactionOutcome::VisibilityDenied(r) => r.clone(),
                    TransactionOutcome::Committed(_) => String::new(),
                };
                run.push(operation, creator, other.status().into(), StepStatus::Committed, Some(reason));
            }
        }
        Ok(())
    }
}

/// Runs one demonstration per node set at the same time. Every run deploys
/// its own contract and must act through its own accounts.
pub async fn run_concurrently<L: LedgerClient + 'static>(
    router: TransactionRouter<L>,
    plan: TokenPlan,
    node_sets: Vec<Vec<NodeIdentity>>,
) -> DispatchResult<Vec<RunReport>> {
    let mut owners: HashMap<Address, usize> = HashMap::new();
    for (run, nodes) in node_sets.iter().enumerate() {
        for node in nodes {
            let first = *owners.entry(node.address).or_insert(run);
            if first != run {
                return Err(DispatchError::SharedAccount {
                    address: node.address,
                    first,
                    second: run,
                });
            }
        }
    }

    let mut handles = Vec::with_capacity(node_sets.len());
    for nodes in node_sets {
        let demo = TokenDemo::new(router.clone(), plan.clone());
        handles.push(tokio::spawn(async move { demo.run_demonstration(&nodes).await }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for (run, handle) in handles.into_iter().enumerate() {
        let report = handle
            .await
            .map_err(|e| DispatchError::RunFailed { run, reason: e.to_string() })??;
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountProvisioner;
    use crate::ledger::{CallMode, InMemoryLedger, LedgerError, RawResult};
    use crate::node::PublicKey;
    use crate::privacy::PrivacyGroup;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use web3::ethabi::{self, Token};
    use web3::types::H256;

    fn endpoint(name: &str) -> String {
        format!("http://{}:22000", name)
    }

    fn enclave_key(name: &str) -> PublicKey {
        PublicKey::new(format!("{}-enclave-key", name))
    }

    /// Fresh accounts on nodes already registered with `ledger`
    async fn accounts(ledger: &InMemoryLedger, names: &[&str], seed: u64) -> Vec<NodeIdentity> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut nodes = Vec::new();
        for name in names {
            nodes.push(
                ledger
                    .create_account(name, &endpoint(name), enclave_key(name), &mut rng)
                    .await
                    .unwrap(),
            );
        }
        nodes
    }

    async fn network(names: &[&str]) -> (Arc<InMemoryLedger>, Vec<NodeIdentity>) {
        let ledger = Arc::new(InMemoryLedger::new());
        for name in names {
            ledger.register_node(endpoint(name), enclave_key(name));
        }
        let nodes = accounts(&ledger, names, 99).await;
        (ledger, nodes)
    }

    fn demo<L: LedgerClient>(ledger: Arc<L>) -> TokenDemo<L> {
        TokenDemo::new(TransactionRouter::new(ledger, vec![0x60, 0x80]), TokenPlan::default())
    }

    fn balance(report: &RunReport, node: &str) -> Option<String> {
        report.balance_of(node).and_then(|b| b.balance.clone())
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (ledger, nodes) = network(&["nodeA", "nodeB", "nodeC", "nodeZ"]).await;
        let report = demo(ledger).run_demonstration(&nodes).await.unwrap();

        assert!(report.is_successful(), "{:#?}", report);
        assert!(report.token.is_some());
        assert!(report.violations.is_empty());

        assert_eq!(balance(&report, "nodeA").as_deref(), Some("750001"));
        assert_eq!(balance(&report, "nodeB").as_deref(), Some("100000"));
        assert_eq!(balance(&report, "nodeC").as_deref(), Some("100000"));
        assert_eq!(report.balance_of("nodeZ").unwrap().status, StepStatus::VisibilityDenied);
        assert_eq!(balance(&report, "nodeZ"), None);
        assert_eq!(report.total_supply.as_deref(), Some("1000001"));

        // three snapshots, each with one denied read from nodeZ
        let denied: Vec<_> = report.steps_with_status(StepStatus::VisibilityDenied).collect();
        assert_eq!(denied.len(), 3);
        assert!(denied.iter().all(|s| s.node == "nodeZ"));

        let last = report.steps.last().unwrap();
        assert_eq!(last.operation, Operation::Burn { amount: "1000002".into() });
        assert_eq!(last.status, StepStatus::Rejected);
    }

    #[tokio::test]
    async fn test_outsider_transfer_commits() {
        let (ledger, nodes) = network(&["nodeA", "nodeB", "nodeZ"]).await;
        let report = demo(ledger).run_demonstration(&nodes).await.unwrap();

        let to_z = report
            .steps
            .iter()
            .find(|s| s.operation == Operation::Transfer { to: "nodeZ".into(), amount: "50000".into() })
            .unwrap();
        assert_eq!(to_z.status, StepStatus::Committed);
    }

    #[tokio::test]
    async fn test_creator_only_group() {
        let (ledger, nodes) = network(&["nodeA", "nodeZ"]).await;
        let report = demo(ledger).run_demonstration(&nodes).await.unwrap();

        assert!(report.is_successful(), "{:#?}", report);
        assert_eq!(report.balance_of("nodeA").unwrap().status, StepStatus::Committed);
        assert_eq!(report.balance_of("nodeZ").unwrap().status, StepStatus::VisibilityDenied);
    }

    #[tokio::test]
    async fn test_single_node_run() {
        let (ledger, nodes) = network(&["nodeA"]).await;
        let report = demo(ledger).run_demonstration(&nodes).await.unwrap();

        assert!(report.is_successful(), "{:#?}", report);
        assert_eq!(report.balances.len(), 1);
        assert!(report.creator_view.is_empty());
    }

    #[tokio::test]
    async fn test_creator_sees_outsider_balance() {
        let (ledger, nodes) = network(&["nodeA", "nodeB", "nodeC", "nodeZ"]).await;
        let report = demo(ledger).run_demonstration(&nodes).await.unwrap();

        assert!(report.is_successful(), "{:#?}", report);
        let seen = report.creator_view_of("nodeZ").unwrap();
        assert_eq!(seen.status, StepStatus::Committed);
        assert_eq!(seen.balance.as_deref(), Some("50000"));
        assert_eq!(report.balance_of("nodeZ").unwrap().status, StepStatus::VisibilityDenied);

        assert_eq!(report.creator_view.len(), 3);
        assert_eq!(report.creator_view_of("nodeB").unwrap().balance.as_deref(), Some("100000"));

        // one creator read per other node, in each of the three snapshots
        let creator_reads = report
            .steps
            .iter()
            .filter(|s| s.node == "nodeA" && s.operation == Operation::BalanceOf { owner: "nodeZ".into() })
            .count();
        assert_eq!(creator_reads, 3);
    }

    #[tokio::test]
    async fn test_no_nodes_is_invalid() {
        let (ledger, _) = network(&[]).await;
        let err = demo(ledger).run_demonstration(&[]).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidGroup(_)));
    }

    #[tokio::test]
    async fn test_keyless_participant_is_fatal() {
        let (ledger, mut nodes) = network(&["nodeA", "nodeB", "nodeZ"]).await;
        nodes[1].public_keys.clear();

        let err = demo(ledger).run_demonstration(&nodes).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidGroup(_)));
    }

    #[tokio::test]
    async fn test_unreachable_creator_aborts_run() {
        let (ledger, nodes) = network(&["nodeA", "nodeB", "nodeZ"]).await;
        ledger.take_offline(&nodes[0].endpoint);

        let report = demo(ledger).run_demonstration(&nodes).await.unwrap();
        assert!(!report.is_successful());
        assert!(report.aborted.is_some());
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].status, StepStatus::TransportFailure);
    }

    #[tokio::test]
    async fn test_unreachable_participant_is_skipped_afterwards() {
        let (ledger, nodes) = network(&["nodeA", "nodeB", "nodeC", "nodeZ"]).await;
        ledger.take_offline(&nodes[2].endpoint);

        let report = demo(ledger).run_demonstration(&nodes).await.unwrap();
        assert!(!report.is_successful());
        assert!(report.aborted.is_none());

        let c_steps: Vec<StepStatus> = report
            .steps
            .iter()
            .filter(|s| s.node == "nodeC")
            .map(|s| s.status)
            .collect();
        assert_eq!(
            c_steps,
            vec![StepStatus::TransportFailure, StepStatus::Skipped, StepStatus::Skipped]
        );

        // the rest of the run is unaffected
        assert_eq!(balance(&report, "nodeB").as_deref(), Some("100000"));
        assert_eq!(report.total_supply.as_deref(), Some("1000001"));
        assert!(report.violations.is_empty());
    }

    #[tokio::test]
    async fn test_parallel_runs_are_independent() {
        let names = ["nodeA", "nodeB", "nodeC", "nodeZ"];
        let (ledger, nodes) = network(&names).await;
        let others = accounts(&ledger, &names, 100).await;
        let router = TransactionRouter::new(Arc::clone(&ledger), vec![0x60, 0x80]);

        let reports = run_concurrently(router, TokenPlan::default(), vec![nodes, others])
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(RunReport::is_successful), "{:#?}", reports);
        assert_ne!(reports[0].token, reports[1].token);
        assert_ne!(
            reports[0].balance_of("nodeA").unwrap().address,
            reports[1].balance_of("nodeA").unwrap().address
        );
        assert_eq!(balance(&reports[1], "nodeA").as_deref(), Some("750001"));
        assert_eq!(ledger.contract_count(), 2);
    }

    #[tokio::test]
    async fn test_runs_sharing_accounts_are_refused() {
        let (ledger, nodes) = network(&["nodeA", "nodeB", "nodeZ"]).await;
        let router = TransactionRouter::new(Arc::clone(&ledger), vec![0x60, 0x80]);

        let err = run_concurrently(router, TokenPlan::default(), vec![nodes.clone(), nodes])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SharedAccount { first: 0, second: 1, .. }));
        assert_eq!(ledger.contract_count(), 0);
    }

    /// Ledger that answers non-party reads with zero instead of failing
    struct LeakyLedger(InMemoryLedger);

    impl LedgerClient for LeakyLedger {
        async fn deploy_contract(
            &self,
            creator: &NodeIdentity,
            group: &PrivacyGroup,
            bytecode: &[u8],
            constructor_args: &[u8],
        ) -> Result<H256, LedgerError> {
            self.0.deploy_contract(creator, group, bytecode, constructor_args).await
        }

        async fn call_contract(
            &self,
            contract: Address,
            creator: &NodeIdentity,
            group: &PrivacyGroup,
            data: Vec<u8>,
            mode: CallMode,
        ) -> Result<RawResult, LedgerError> {
            match self.0.call_contract(contract, creator, group, data, mode).await {
                Err(LedgerError::CallExecution(_)) => {
                    Ok(RawResult::Returned(ethabi::encode(&[Token::Uint(U256::zero())])))
                }
                other => other,
            }
        }

        async fn wait_for_receipt(&self, node: &NodeIdentity, tx_hash: H256) -> Result<Receipt, LedgerError> {
            self.0.wait_for_receipt(node, tx_hash).await
        }
    }

    #[tokio::test]
    async fn test_committed_outsider_read_is_violation() {
        let (inner, nodes) = network(&["nodeA", "nodeB", "nodeZ"]).await;
        let inner = Arc::try_unwrap(inner).unwrap();
        let report = demo(Arc::new(LeakyLedger(inner))).run_demonstration(&nodes).await.unwrap();

        assert!(!report.is_successful());
        assert_eq!(report.violations.len(), 3);
        assert!(report.violations.iter().all(|v| v.node == "nodeZ"));
        assert_eq!(balance(&report, "nodeZ").as_deref(), Some("0"));
    }
}

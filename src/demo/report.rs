//! Run report types

use crate::router::OutcomeStatus;
use serde::{Deserialize, Serialize};
use web3::types::Address;

/// Operation attempted during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Deploy { name: String, symbol: String },
    Transfer { to: String, amount: String },
    Mint { to: String, amount: String },
    Burn { amount: String },
    BalanceOf { owner: String },
    TotalSupply,
}

/// How a step ended, including the ways it can fail to run at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Committed,
    Rejected,
    VisibilityDenied,
    TransportFailure,
    /// Not attempted because the acting node was already unreachable
    Skipped,
}

impl From<OutcomeStatus> for StepStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Committed => StepStatus::Committed,
            OutcomeStatus::Rejected => StepStatus::Rejected,
            OutcomeStatus::VisibilityDenied => StepStatus::VisibilityDenied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub operation: Operation,
    /// Node that submitted or queried
    pub node: String,
    pub status: StepStatus,
    pub expected: StepStatus,
    /// Transaction hash, returned value, or failure reason
    pub detail: Option<String>,
}

impl StepRecord {
    pub fn as_expected(&self) -> bool {
        self.status == self.expected
    }
}

/// One balance as seen by a single reader at the end of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub node: String,
    pub address: Address,
    pub status: StepStatus,
    /// Present only when the read committed
    pub balance: Option<String>,
    /// Shadow-ledger value, present for nodes that can see the contract
    pub expected: Option<String>,
}

/// Outcome that contradicts the privacy or accounting contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    /// Index into [`RunReport::steps`]
    pub step: usize,
    pub node: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub token: Option<Address>,
    pub steps: Vec<StepRecord>,
    /// Each node's read of its own balance
    pub balances: Vec<BalanceSnapshot>,
    /// The creator's read of every other node's balance
    pub creator_view: Vec<BalanceSnapshot>,
    pub total_supply: Option<String>,
    pub violations: Vec<IntegrityViolation>,
    /// Why the run stopped early, if it did
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn is_successful(&self) -> bool {
        self.aborted.is_none()
            && self.violations.is_empty()
            && self.steps.iter().all(StepRecord::as_expected)
    }

    pub fn steps_with_status(&self, status: StepStatus) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(move |s| s.status == status)
    }

    pub fn balance_of(&self, node: &str) -> Option<&BalanceSnapshot> {
        self.balances.iter().find(|b| b.node == node)
    }

    pub fn creator_view_of(&self, node: &str) -> Option<&BalanceSnapshot> {
        self.creator_view.iter().find(|b| b.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(status: StepStatus, expected: StepStatus) -> StepRecord {
        StepRecord {
            operation: Operation::TotalSupply,
            node: "nodeA".into(),
            status,
            expected,
            detail: None,
        }
    }

    #[test]
    fn test_success_requires_expected_outcomes() {
        let mut report = RunReport {
            steps: vec![
                step(StepStatus::Committed, StepStatus::Committed),
                step(StepStatus::VisibilityDenied, StepStatus::VisibilityDenied),
            ],
            ..Default::default()
        };
        assert!(report.is_successful());

        report.steps.push(step(StepStatus::Rejected, StepStatus::Committed));
        assert!(!report.is_successful());
    }

    #[test]
    fn test_violation_fails_run() {
        let report = RunReport {
            violations: vec![IntegrityViolation {
                step: 0,
                node: "nodeZ".into(),
                message: "committed read from non-member".into(),
            }],
            ..Default::default()
        };
        assert!(!report.is_successful());
    }

    #[test]
    fn test_operation_json_is_tagged() {
        let json = serde_json::to_value(Operation::Burn { amount: "499999".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "burn", "amount": "499999"}));
    }
}

// Core modules
pub mod node;
pub mod error;
pub mod privacy;
pub mod contract;
pub mod router;

// Collaborators and wiring
pub mod ledger;
pub mod accounts;
pub mod demo;
pub mod config;

// Re-export main types for easy access
pub use node::{NodeIdentity, PublicKey};
pub use error::{DispatchError, DispatchResult};
pub use privacy::{read_guarded, resolve, PrivacyGroup};
pub use contract::{ContractCall, ContractHandle, ContractQuery, TokenDefinition};
pub use router::{OutcomeStatus, TransactionOutcome, TransactionRouter};
pub use ledger::{InMemoryLedger, LedgerClient, LedgerConfig, LedgerError, Receipt, Web3LedgerClient, Web3Provisioner};
pub use accounts::AccountProvisioner;
pub use demo::{run_concurrently, Roster, RunReport, StepStatus, TokenDemo, TokenPlan};
pub use config::DemoConfig;

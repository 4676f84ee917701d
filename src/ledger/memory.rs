//! In-memory permissioned ledger
//!
//! Deterministic stand-in for a Quorum network. Each endpoint owns one
//! enclave key, private contract state is held only for the keys it was
//! created for, and the token contract's transfer/mint/burn rules are applied
//! on execution. A read from a node outside the group fails the way a
//! non-party Quorum node does: the call has no code to execute.

use super::{CallMode, LedgerClient, LedgerError, RawResult, Receipt};
use crate::accounts::AccountProvisioner;
use crate::contract::{ContractCall, ContractQuery, TokenDefinition};
use crate::node::{NodeIdentity, PublicKey};
use crate::privacy::PrivacyGroup;
use parking_lot::Mutex;
use rand::RngCore;
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, HashSet};
use web3::ethabi::{self, Token};
use web3::types::{Address, H256, U256};

#[derive(Debug, Clone)]
struct PrivateContract {
    owner: Address,
    /// Enclave keys holding this contract's state
    parties: Vec<PublicKey>,
    balances: HashMap<Address, U256>,
    total_supply: U256,
}

impl PrivateContract {
    fn balance(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    /// Applies a token call, returning whether it succeeded
    fn execute(&mut self, sender: Address, call: &ContractCall) -> bool {
        match call {
            ContractCall::Deploy(_) => false,
            ContractCall::Transfer { to, amount } => {
                let from_balance = self.balance(&sender);
                if from_balance < *amount {
                    return false;
                }
                self.balances.insert(sender, from_balance - *amount);
                let to_balance = self.balance(to);
                self.balances.insert(*to, to_balance + *amount);
                true
            }
            ContractCall::Mint { to, amount } => {
                if sender != self.owner {
                    return false;
                }
                let to_balance = self.balance(to);
                self.balances.insert(*to, to_balance + *amount);
                self.total_supply += *amount;
                true
            }
            ContractCall::Burn { amount } => {
                let balance = self.balance(&sender);
                if balance < *amount || self.total_supply < *amount {
                    return false;
                }
                self.balances.insert(sender, balance - *amount);
                self.total_supply -= *amount;
                true
            }
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    block_number: u64,
    tx_count: u64,
    enclaves: HashMap<String, PublicKey>,
    unreachable: HashSet<String>,
    /// Unlocked accounts and the endpoint holding each
    accounts: HashMap<Address, String>,
    contracts: HashMap<Address, PrivateContract>,
    receipts: HashMap<H256, Receipt>,
}

impl LedgerState {
    fn enclave_key(&self, endpoint: &str) -> Result<PublicKey, LedgerError> {
        if self.unreachable.contains(endpoint) {
            return Err(LedgerError::Transport(format!("connection refused: {}", endpoint)));
        }
        self.enclaves
            .get(endpoint)
            .cloned()
            .ok_or_else(|| LedgerError::Transport(format!("no node listening at {}", endpoint)))
    }

    fn next_hash(&mut self, sender: Address, data: &[u8]) -> H256 {
        self.tx_count += 1;
        let mut hasher = Keccak256::new();
        hasher.update(sender.as_bytes());
        hasher.update(self.tx_count.to_be_bytes());
        hasher.update(data);
        H256::from_slice(&hasher.finalize())
    }

    fn record(&mut self, tx_hash: H256, contract_address: Option<Address>, success: bool) {
        self.block_number += 1;
        self.receipts.insert(
            tx_hash,
            Receipt {
                transaction_hash: tx_hash,
                block_number: self.block_number,
                contract_address,
                success,
            },
        );
    }
}

/// Simulated multi-node private ledger
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a node at `endpoint` whose enclave manages `key`
    pub fn register_node(&self, endpoint: impl Into<String>, key: PublicKey) {
        self.state.lock().enclaves.insert(endpoint.into(), key);
    }

    /// Makes every later request to `endpoint` fail at the transport level
    pub fn take_offline(&self, endpoint: &str) {
        self.state.lock().unreachable.insert(endpoint.to_string());
    }

    /// Registers an account already unlocked on `endpoint`
    pub fn import_account(&self, endpoint: &str, address: Address) {
        self.state.lock().accounts.insert(address, endpoint.to_string());
    }

    pub fn contract_count(&self) -> usize {
        self.state.lock().contracts.len()
    }

    fn check_sender(state: &LedgerState, node: &NodeIdentity, group: &PrivacyGroup) -> Result<PublicKey, LedgerError> {
        let enclave = state.enclave_key(&node.endpoint)?;
        if state.accounts.get(&node.address) != Some(&node.endpoint) {
            return Err(LedgerError::Rpc(format!(
                "unknown account {:?} on {}",
                node.address, node.endpoint
            )));
        }
        if &enclave != group.signing_key() {
            return Err(LedgerError::Rpc(format!(
                "privateFrom {} is not managed by {}",
                group.signing_key(),
                node.endpoint
            )));
        }
        Ok(enclave)
    }
}

impl LedgerClient for InMemoryLedger {
    async fn deploy_contract(
        &self,
        creator: &NodeIdentity,
        group: &PrivacyGroup,
        bytecode: &[u8],
        constructor_args: &[u8],
    ) -> Result<H256, LedgerError> {
        let mut state = self.state.lock();
        let enclave = Self::check_sender(&state, creator, group)?;

        let definition = TokenDefinition::decode_constructor_args(constructor_args)
            .map_err(|e| LedgerError::Rpc(format!("invalid constructor arguments: {}", e)))?;

        let mut init_code = bytecode.to_vec();
        init_code.extend_from_slice(constructor_args);
        let tx_hash = state.next_hash(creator.address, &init_code);
        let address = Address::from_slice(&Keccak256::digest(tx_hash.as_bytes())[12..]);

        let mut parties = vec![enclave];
        parties.extend(group.members().iter().cloned());

        let mut balances = HashMap::new();
        balances.insert(creator.address, definition.initial_supply);
        state.contracts.insert(
            address,
            PrivateContract {
                owner: creator.address,
                parties,
                balances,
                total_supply: definition.initial_supply,
            },
        );
        state.record(tx_hash, Some(address), true);

        log::debug!("simulated deploy of {} at {:?}", definition.symbol, address);
        Ok(tx_hash)
    }

    async fn call_contract(
        &self,
        contract: Address,
        creator: &NodeIdentity,
        group: &PrivacyGroup,
        data: Vec<u8>,
        mode: CallMode,
    ) -> Result<RawResult, LedgerError> {
        let mut state = self.state.lock();

        match mode {
            CallMode::Read => {
                let enclave = state.enclave_key(&creator.endpoint)?;
                let empty = || {
                    LedgerError::CallExecution(format!(
                        "empty value (0x) returned from contract {:?} on {}",
                        contract, creator.endpoint
                    ))
                };
                let private = state
                    .contracts
                    .get(&contract)
                    .filter(|c| c.parties.contains(&enclave))
                    .ok_or_else(empty)?;

                let value = match ContractQuery::decode(&data) {
                    Some(ContractQuery::BalanceOf(owner)) => private.balance(&owner),
                    Some(ContractQuery::TotalSupply) => private.total_supply,
                    None => return Err(LedgerError::Rpc("execution reverted".to_string())),
                };
                Ok(RawResult::Returned(ethabi::encode(&[Token::Uint(value)])))
            }
            CallMode::Transact => {
                let enclave = Self::check_sender(&state, creator, group)?;
                let tx_hash = state.next_hash(creator.address, &data);

                let success = match (state.contracts.get_mut(&contract), ContractCall::decode(&data)) {
                    (Some(private), Some(call)) if private.parties.contains(&enclave) => {
                        private.execute(creator.address, &call)
                    }
                    _ => false,
                };
                state.record(tx_hash, None, success);
                Ok(RawResult::Submitted(tx_hash))
            }
        }
    }

    async fn wait_for_receipt(&self, node: &NodeIdentity, tx_hash: H256) -> Result<Receipt, LedgerError> {
        let state = self.state.lock();
        state.enclave_key(&node.endpoint)?;
        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or(LedgerError::ReceiptTimeout(tx_hash))
    }
}

impl AccountProvisioner for InMemoryLedger {
    async fn create_account<R: RngCore + Send>(
        &self,
        name: &str,
        endpoint: &str,
        public_key: PublicKey,
        rng: &mut R,
    ) -> Result<NodeIdentity, LedgerError> {
        let mut raw = [0u8; 20];
        rng.fill_bytes(&mut raw);
        let address = Address::from(raw);

        let mut state = self.state.lock();
        state.enclave_key(endpoint)?;
        state.accounts.insert(address, endpoint.to_string());
        log::info!("{} account {:?} created and unlocked", name, address);

        Ok(NodeIdentity::new(name, address, vec![public_key], endpoint))
    }
}

//! Quorum ledger client over the web3 HTTP transport
//!
//! Private transactions use Quorum's `eth_sendTransaction` extension carrying
//! `privateFrom`/`privateFor`. A transport is opened per call against the
//! acting node's endpoint.

use super::{CallMode, LedgerClient, LedgerError, RawResult, Receipt};
use crate::accounts::{generate_password, AccountProvisioner, PASSWORD_LENGTH};
use crate::node::{NodeIdentity, PublicKey};
use crate::privacy::PrivacyGroup;
use rand::RngCore;
use serde::Serialize;
use std::time::Duration;
use web3::{
    transports::Http,
    types::{Address, BlockId, BlockNumber, Bytes, CallRequest, H256, U256, U64},
    Transport, Web3,
};

/// ledger client configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub gas_limit: U256,
    /// Upper bound on the commit wait
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gas_limit: U256::from(4_700_000u64),
            receipt_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// `eth_sendTransaction` parameters with Quorum's private fields
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrivateTransactionRequest<'a> {
    from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Address>,
    gas: U256,
    data: Bytes,
    private_from: &'a str,
    private_for: Vec<&'a str>,
}

impl<'a> PrivateTransactionRequest<'a> {
    fn new(group: &'a PrivacyGroup, to: Option<Address>, gas: U256, data: Vec<u8>) -> Self {
        Self {
            from: group.creator().address,
            to,
            gas,
            data: Bytes(data),
            private_from: group.signing_key().as_str(),
            private_for: group.members().iter().map(PublicKey::as_str).collect(),
        }
    }
}

fn connect(endpoint: &str) -> Result<Web3<Http>, LedgerError> {
    let transport = Http::new(endpoint).map_err(map_web3_error)?;
    Ok(Web3::new(transport))
}

fn map_web3_error(err: web3::Error) -> LedgerError {
    let message = err.to_string();
    match err {
        web3::Error::Rpc(rpc) => LedgerError::Rpc(rpc.message),
        web3::Error::Decoder(msg) | web3::Error::InvalidResponse(msg) => LedgerError::Decode(msg),
        web3::Error::Unreachable | web3::Error::Transport(_) | web3::Error::Io(_) => {
            LedgerError::Transport(message)
        }
        _ => LedgerError::Rpc(message),
    }
}

/// ledger client talking JSON-RPC to each node
#[derive(Debug, Clone, Default)]
pub struct Web3LedgerClient {
    config: LedgerConfig,
}

impl Web3LedgerClient {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    /// Asks `endpoint` for its client version, failing if the node is down
    pub async fn client_version(&self, endpoint: &str) -> Result<String, LedgerError> {
        let web3 = connect(endpoint)?;
        web3.web3().client_version().await.map_err(map_web3_error)
    }

    async fn send_private(
        &self,
        node: &NodeIdentity,
        group: &PrivacyGroup,
        to: Option<Address>,
        data: Vec<u8>,
    ) -> Result<H256, LedgerError> {
        let web3 = connect(&node.endpoint)?;
        let request = PrivateTransactionRequest::new(group, to, self.config.gas_limit, data);
        let params = serde_json::to_value(&request).map_err(|e| LedgerError::Decode(e.to_string()))?;

        log::debug!(
            "eth_sendTransaction via {} privateFrom={} privateFor={:?}",
            node.endpoint,
            request.private_from,
            request.private_for
        );

        let value = web3
            .transport()
            .execute("eth_sendTransaction", vec![params])
            .await
            .map_err(map_web3_error)?;
        serde_json::from_value(value).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

impl LedgerClient for Web3LedgerClient {
    async fn deploy_contract(
        &self,
        creator: &NodeIdentity,
        group: &PrivacyGroup,
        bytecode: &[u8],
        constructor_args: &[u8],
    ) -> Result<H256, LedgerError> {
        let mut data = bytecode.to_vec();
        data.extend_from_slice(constructor_args);
        self.send_private(creator, group, None, data).await
    }

    async fn call_contract(
        &self,
        contract: Address,
        creator: &NodeIdentity,
        group: &PrivacyGroup,
        data: Vec<u8>,
        mode: CallMode,
    ) -> Result<RawResult, LedgerError> {
        match mode {
            CallMode::Transact => self
                .send_private(creator, group, Some(contract), data)
                .await
                .map(RawResult::Submitted),
            CallMode::Read => {
                let web3 = connect(&creator.endpoint)?;
                let request = CallRequest {
                    from: Some(creator.address),
                    to: Some(contract),
                    data: Some(Bytes(data)),
                    ..Default::default()
                };
                let output = web3
                    .eth()
                    .call(request, Some(BlockId::Number(BlockNumber::Latest)))
                    .await
                    .map_err(map_web3_error)?;

                // A node that is not party to the contract has no code for it
                if output.0.is_empty() {
                    return Err(LedgerError::CallExecution(format!(
                        "empty value (0x) returned from contract {:?} on {}",
                        contract, creator.endpoint
                    )));
                }
                Ok(RawResult::Returned(output.0))
            }
        }
    }

    async fn wait_for_receipt(&self, node: &NodeIdentity, tx_hash: H256) -> Result<Receipt, LedgerError> {
        let web3 = connect(&node.endpoint)?;
        let deadline = tokio::time::Instant::now() + self.config.receipt_timeout;

        loop {
            if let Some(receipt) = web3
                .eth()
                .transaction_receipt(tx_hash)
                .await
                .map_err(map_web3_error)?
            {
                return Ok(Receipt {
                    transaction_hash: receipt.transaction_hash,
                    block_number: receipt.block_number.unwrap_or_default().as_u64(),
                    contract_address: receipt.contract_address,
                    success: receipt.status == Some(U64::from(1)),
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::ReceiptTimeout(tx_hash));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// Account provisioning through the `personal` namespace
#[derive(Debug, Clone, Default)]
pub struct Web3Provisioner;

impl AccountProvisioner for Web3Provisioner {
    async fn create_account<R: RngCore + Send>(
        &self,
        name: &str,
        endpoint: &str,
        public_key: PublicKey,
        rng: &mut R,
    ) -> Result<NodeIdentity, LedgerError> {
        let password = generate_password(rng, PASSWORD_LENGTH);
        let web3 = connect(endpoint)?;

        let address = web3
            .personal()
            .new_account(&password)
            .await
            .map_err(map_web3_error)?;
        log::info!("{} account {:?} created", name, address);

        // Duration 0 keeps the account unlocked for the life of the node
        let unlocked = web3
            .personal()
            .unlock_account(address, &password, Some(0))
            .await
            .map_err(map_web3_error)?;
        if !unlocked {
            return Err(LedgerError::Rpc(format!("{} refused to unlock {:?}", endpoint, address)));
        }
        log::info!("{} account {:?} unlocked", name, address);

        Ok(NodeIdentity::new(name, address, vec![public_key], endpoint))
    }
}

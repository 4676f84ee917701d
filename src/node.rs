//! Node identities
//!
//! A node is one ledger participant: an unlocked account on its RPC endpoint
//! plus the enclave public keys it contributes to privacy groups.

use serde::{Deserialize, Serialize};
use std::fmt;
use web3::types::Address;

/// Enclave public key identifier (base64 in Tessera deployments, opaque here)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PublicKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Identity of a single node, immutable once provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Human readable label used in logs and reports
    pub name: String,
    /// Unlocked account on this node
    pub address: Address,
    /// Keys advertised for private transactions, primary key first
    pub public_keys: Vec<PublicKey>,
    /// RPC endpoint of the node
    pub endpoint: String,
}

impl NodeIdentity {
    pub fn new(
        name: impl Into<String>,
        address: Address,
        public_keys: Vec<PublicKey>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            public_keys,
            endpoint: endpoint.into(),
        }
    }

    /// The key used as `privateFrom` when this node submits
    pub fn primary_key(&self) -> Option<&PublicKey> {
        self.public_keys.first()
    }

    pub fn advertises(&self, key: &PublicKey) -> bool {
        self.public_keys.iter().any(|k| k == key)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?} @ {})", self.name, self.address, self.endpoint)
    }
}

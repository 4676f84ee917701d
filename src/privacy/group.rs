//! Privacy group resolution
//!
//! A group is the creator's signing identity plus the flattened enclave keys
//! of every participant, in the order the participants were given. The
//! ledger may treat differently ordered key lists as different groups, so no
//! sorting or deduplication happens here.

use crate::error::{DispatchError, DispatchResult};
use crate::node::{NodeIdentity, PublicKey};

/// Immutable set of identities allowed to see a private transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivacyGroup {
    creator: NodeIdentity,
    members: Vec<PublicKey>,
}

impl PrivacyGroup {
    pub fn creator(&self) -> &NodeIdentity {
        &self.creator
    }

    /// Keys sent as `privateFor`
    pub fn members(&self) -> &[PublicKey] {
        &self.members
    }

    /// Key sent as `privateFrom`
    pub fn signing_key(&self) -> &PublicKey {
        // resolve() rejects keyless creators
        &self.creator.public_keys[0]
    }

    pub fn contains_key(&self, key: &PublicKey) -> bool {
        self.members.iter().any(|k| k == key)
    }

    /// Whether `node` should be able to observe state scoped to this group.
    ///
    /// The creator always holds the state it submitted; any other node needs
    /// one of its keys among the members.
    pub fn is_open_to(&self, node: &NodeIdentity) -> bool {
        node.advertises(self.signing_key())
            || node.public_keys.iter().any(|k| self.contains_key(k))
    }
}

/// Derives the privacy group for `creator` submitting to `participants`.
///
/// The creator's keys are not folded into the members unless the creator is
/// also listed as a participant.
pub fn resolve(creator: &NodeIdentity, participants: &[NodeIdentity]) -> DispatchResult<PrivacyGroup> {
    if creator.public_keys.is_empty() {
        return Err(DispatchError::InvalidGroup(format!(
            "creator {} has no public keys",
            creator.name
        )));
    }

    if let Some(keyless) = participants.iter().find(|p| p.public_keys.is_empty()) {
        return Err(DispatchError::InvalidGroup(format!(
            "participant {} has no public keys",
            keyless.name
        )));
    }

    let members = participants
        .iter()
        .flat_map(|p| p.public_keys.iter().cloned())
        .collect();

    Ok(PrivacyGroup {
        creator: creator.clone(),
        members,
    })
}

//! Account provisioning collaborator
//!
//! Creates and unlocks one account per node. Randomness is passed in so
//! callers (and tests) control it.

use crate::ledger::LedgerError;
use crate::node::{NodeIdentity, PublicKey};
use rand::{Rng, RngCore};
use std::future::Future;

/// Alphabet used for generated account passwords
pub const PASSWORD_CHARS: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!+<>[]%,(){}.&@^?*$-";

pub const PASSWORD_LENGTH: usize = 16;

/// Random account password drawn from [`PASSWORD_CHARS`]
pub fn generate_password<R: RngCore + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| PASSWORD_CHARS[rng.gen_range(0..PASSWORD_CHARS.len())] as char)
        .collect()
}

pub trait AccountProvisioner: Send + Sync {
    /// Creates an account on `endpoint`, unlocks it, and returns the node
    /// identity advertising `public_key`.
    fn create_account<R: RngCore + Send>(
        &self,
        name: &str,
        endpoint: &str,
        public_key: PublicKey,
        rng: &mut R,
    ) -> impl Future<Output = Result<NodeIdentity, LedgerError>> + Send;
}

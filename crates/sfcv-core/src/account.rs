//! # Funded Accounts
//!
//! An [`Account`] is a fresh keypair funded from the payer. The suite never
//! mutates an account after creation except to attach the staker id the
//! contract derived for it.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::primitives::{Address, Amount, StakerId};

/// Signing credential for an account.
///
/// Opaque to the suite: it is handed back to the contract-call collaborator,
/// which signs with it. Zeroized on drop and redacted from `Debug`.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<String>);

impl SecretKey {
    /// Wrap a secret key string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Zeroizing::new(raw.into()))
    }

    /// Expose the secret for signing.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretKey::new)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// A funded account the suite can send transactions from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// On-chain address.
    pub address: Address,
    /// Signing credential; never serialized.
    #[serde(skip_serializing)]
    pub secret_key: SecretKey,
    /// Balance the account was funded with.
    pub balance: Amount,
    /// Staker id derived by the contract, once the account has staked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staker_id: Option<StakerId>,
}

impl Account {
    /// Create an account record for a freshly funded keypair.
    pub fn new(address: Address, secret_key: SecretKey, balance: Amount) -> Self {
        Self {
            address,
            secret_key,
            balance,
            staker_id: None,
        }
    }

    /// Attach the contract-derived staker id.
    pub fn attach_staker_id(&mut self, id: StakerId) {
        self.staker_id = Some(id);
    }
}

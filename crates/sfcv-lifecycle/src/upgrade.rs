//! # Proxy Upgrade
//!
//! The staking contract sits behind an upgradability proxy. Upgrading means
//! deploying a new implementation, finding the address it was created at,
//! and pointing the proxy there. Storage stays with the proxy.
//!
//! ## Steps
//!
//! 1. Read the proxy's current implementation.
//! 2. Deploy the new bytecode and log the deployment.
//! 3. List creation transactions in the last `lookback` blocks. Exactly one
//!    is expected, and it must be the deployment just logged.
//! 4. Take the new address from that transaction's receipt.
//! 5. Submit `upgradeTo(address)` on the proxy.
//! 6. Read the implementation again and require the new address.
//!
//! The coordinator does not rebind. The caller builds the post-upgrade
//! binding with [`ContractBinding::upgraded`] once this succeeds.
//!
//! After the swap, [`StorageMigrator`] runs `upgradeStakerStorage` for every
//! id up to `stakersLastID` so the new implementation's storage layout is
//! populated. Ids freed by withdrawal are included; the contract ignores
//! them.

use serde::Serialize;
use serde_json::json;

use sfcv_client::{ContractCaller, IncompatibleMethod};
use sfcv_core::{Account, Address, TxHash};

use crate::binding::ContractBinding;
use crate::error::UpgradeError;
use crate::reads;
use crate::txlog::{TxLog, DEPLOY_OPERATION};

/// What an upgrade changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeOutcome {
    pub previous_implementation: Address,
    pub new_implementation: Address,
    pub deploy_tx: TxHash,
    pub upgrade_tx: TxHash,
}

pub struct UpgradeCoordinator<'a, C> {
    caller: &'a C,
    lookback: u64,
}

impl<'a, C: ContractCaller> UpgradeCoordinator<'a, C> {
    /// `lookback` is how many recent blocks are searched for the deployment.
    pub fn new(caller: &'a C, lookback: u64) -> Self {
        Self { caller, lookback }
    }

    pub async fn upgrade(
        &self,
        binding: &ContractBinding,
        payer: &Account,
        bytecode: &[u8],
        log: &mut TxLog,
    ) -> Result<UpgradeOutcome, UpgradeError> {
        let proxy = binding.proxy();
        let previous_implementation = reads::implementation(self.caller, proxy).await?;
        tracing::info!(implementation = %previous_implementation, "implementation before upgrade");

        let deploy_tx = self.caller.deploy_contract(payer, bytecode).await?;
        log.append(deploy_tx, DEPLOY_OPERATION);
        tracing::info!(tx = %deploy_tx, bytes = bytecode.len(), "new implementation deployed");

        let candidates = self.caller.most_recent_transactions(self.lookback).await?;
        let candidate = match candidates.as_slice() {
            [] => {
                return Err(UpgradeError::NoCandidate {
                    lookback: self.lookback,
                })
            }
            [only] => *only,
            many => return Err(UpgradeError::AmbiguousCandidates(many.len())),
        };
        if candidate != deploy_tx {
            return Err(UpgradeError::UnknownDeployment {
                expected: deploy_tx,
                found: candidate,
            });
        }

        let receipt = self
            .caller
            .get_transaction_receipt(&candidate)
            .await?
            .ok_or(UpgradeError::MissingReceipt(candidate))?;
        if !receipt.status {
            return Err(UpgradeError::DeploymentFailed(candidate));
        }
        let new_implementation = receipt
            .contract_address
            .ok_or(UpgradeError::MissingContractAddress(candidate))?;

        let upgrade_tx = self
            .caller
            .submit_contract_call(proxy, "upgradeTo", &[json!(new_implementation)], payer, None)
            .await?;
        log.append(upgrade_tx, "upgradeTo");

        let actual = reads::implementation(self.caller, proxy).await?;
        if actual != new_implementation {
            return Err(UpgradeError::ImplementationMismatch {
                expected: new_implementation,
                actual,
            });
        }
        tracing::info!(from = %previous_implementation, to = %actual, "proxy upgraded");

        Ok(UpgradeOutcome {
            previous_implementation,
            new_implementation,
            deploy_tx,
            upgrade_tx,
        })
    }
}

// ── Storage migration ────────────────────────────────────────────────

/// Result of a storage migration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MigrationOutcome {
    /// `upgradeStakerStorage` ran for ids `1..=last_id`.
    Migrated {
        #[serde(rename = "lastId")]
        last_id: u64,
    },
    /// The running implementation has no migration entry point.
    Skipped { method: String, abi: String },
}

impl From<IncompatibleMethod> for MigrationOutcome {
    fn from(m: IncompatibleMethod) -> Self {
        Self::Skipped {
            method: m.method,
            abi: m.abi,
        }
    }
}

pub struct StorageMigrator<'a, C> {
    caller: &'a C,
}

impl<'a, C: ContractCaller> StorageMigrator<'a, C> {
    pub fn new(caller: &'a C) -> Self {
        Self { caller }
    }

    /// Migrate every staker id the contract has issued. An
    /// incompatible contract yields [`MigrationOutcome::Skipped`] rather than
    /// an error; anything else aborts the pass.
    pub async fn migrate(
        &self,
        binding: &ContractBinding,
        payer: &Account,
        log: &mut TxLog,
    ) -> Result<MigrationOutcome, UpgradeError> {
        let sfc = binding.sfc();
        let last_id = reads::stakers_last_id(self.caller, &sfc).await?;
        for id in 1..=last_id {
            let result = self
                .caller
                .submit_contract_call(&sfc, "upgradeStakerStorage", &[json!(id)], payer, None)
                .await;
            match result {
                Ok(hash) => log.append(hash, "upgradeStakerStorage"),
                Err(e) => {
                    if let Some(incompatible) = e.as_incompatible() {
                        tracing::warn!(%incompatible, "storage migration unavailable");
                        return Ok(incompatible.clone().into());
                    }
                    return Err(e.into());
                }
            }
        }
        tracing::info!(last_id, "staker storage migrated");
        Ok(MigrationOutcome::Migrated { last_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_migration_serializes_with_status() {
        let outcome = MigrationOutcome::from(IncompatibleMethod {
            method: "upgradeStakerStorage".into(),
            abi: "sfc-v1".into(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["abi"], "sfc-v1");
    }
}

//! # Epoch Advancer
//!
//! Seals epochs one at a time through `forceNewEpoch`. The contract refuses
//! to seal while an epoch is too young, which shows up as a revert; that
//! refusal is retried with exponential backoff up to
//! [`AdvancePolicy::max_retries`] times per epoch. Any other error, or
//! running out of retries, stops the advance and reports how far it got.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sfcv_client::ContractCaller;
use sfcv_core::{Account, Epoch};

use crate::binding::ContractBinding;
use crate::error::CouldNotAdvance;
use crate::reads;
use crate::txlog::TxLog;

/// Retry policy for sealing a single epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancePolicy {
    /// Retries per epoch after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for AdvancePolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl AdvancePolicy {
    /// Backoff before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Outcome of a successful advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceReport {
    pub requested: u64,
    pub advanced: u64,
    /// Sealed epoch read before the first seal.
    pub start_epoch: Epoch,
    /// Sealed epoch read after the last seal.
    pub end_epoch: Epoch,
    /// Refusals absorbed by retrying.
    pub retries: u32,
}

pub struct EpochAdvancer<'a, C> {
    caller: &'a C,
    policy: AdvancePolicy,
}

impl<'a, C: ContractCaller> EpochAdvancer<'a, C> {
    pub fn new(caller: &'a C, policy: AdvancePolicy) -> Self {
        Self { caller, policy }
    }

    /// Seal `epochs_needed` epochs, sending each `forceNewEpoch` from
    /// `sender`. Every mined seal is appended to `log`.
    pub async fn advance(
        &self,
        binding: &ContractBinding,
        sender: &Account,
        epochs_needed: u64,
        log: &mut TxLog,
    ) -> Result<AdvanceReport, CouldNotAdvance> {
        let sfc = binding.sfc();
        let failed = |advanced: u64, err: &dyn std::fmt::Display| CouldNotAdvance {
            requested: epochs_needed,
            advanced,
            last_error: err.to_string(),
        };

        let start_epoch = reads::current_sealed_epoch(self.caller, &sfc)
            .await
            .map_err(|e| failed(0, &e))?;

        let mut advanced = 0u64;
        let mut retries = 0u32;
        while advanced < epochs_needed {
            let mut attempt = 0u32;
            loop {
                match self
                    .caller
                    .submit_contract_call(&sfc, "forceNewEpoch", &[], sender, None)
                    .await
                {
                    Ok(hash) => {
                        log.append(hash, "forceNewEpoch");
                        advanced += 1;
                        break;
                    }
                    Err(e) if e.is_revert() && attempt < self.policy.max_retries => {
                        let delay = self.policy.delay(attempt);
                        tracing::warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "epoch not sealable yet, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        retries += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            advanced,
                            requested = epochs_needed,
                            error = %e,
                            "epoch advance failed"
                        );
                        return Err(failed(advanced, &e));
                    }
                }
            }
        }

        let end_epoch = reads::current_sealed_epoch(self.caller, &sfc)
            .await
            .map_err(|e| failed(advanced, &e))?;
        tracing::info!(%start_epoch, %end_epoch, advanced, retries, "epochs advanced");
        Ok(AdvanceReport {
            requested: epochs_needed,
            advanced,
            start_epoch,
            end_epoch,
            retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let policy = AdvancePolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay(80), Duration::from_millis(1_000));
    }

    #[test]
    fn policy_deserializes_partial_yaml() {
        let policy: AdvancePolicy = serde_yaml::from_str("max_retries: 2").unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay_ms, 200);
    }
}

//! # Lock Waiter
//!
//! Withdrawals unlock once both the epoch lock and the time lock have
//! elapsed since preparation. Chain time is the end time of the latest
//! sealed epoch, so time only becomes visible as epochs are sealed. The
//! waiter polls the chain and, when allowed, seals epochs itself, giving up
//! after [`WaitPolicy::max_wait_secs`] of wall-clock time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sfcv_client::{CallError, ContractCaller, ContractRef};
use sfcv_core::{Account, Epoch};

use crate::binding::ContractBinding;
use crate::epoch::{AdvancePolicy, EpochAdvancer};
use crate::error::LifecycleError;
use crate::reads::{self, LockPeriods};
use crate::txlog::TxLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitPolicy {
    /// Pause between polls while only the time lock is outstanding.
    pub poll_interval_ms: u64,
    /// Wall-clock budget for a single wait.
    pub max_wait_secs: u64,
    /// Seal epochs while waiting instead of relying on the network to.
    pub advance_epochs: bool,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            max_wait_secs: 300,
            advance_epochs: true,
        }
    }
}

/// A prepared withdrawal's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub deactivated_epoch: Epoch,
    pub deactivated_time: u64,
    pub periods: LockPeriods,
}

/// How far a lock is from elapsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub current_epoch: Epoch,
    pub chain_time: u64,
    pub epochs_remaining: u64,
    pub secs_remaining: u64,
}

impl LockStatus {
    pub fn is_elapsed(&self) -> bool {
        self.epochs_remaining == 0 && self.secs_remaining == 0
    }
}

impl Lock {
    /// Remaining lock given the chain's current epoch and time.
    pub fn status(&self, current_epoch: Epoch, chain_time: u64) -> LockStatus {
        let unlock_epoch = self
            .deactivated_epoch
            .number()
            .saturating_add(self.periods.epochs);
        let unlock_time = self.deactivated_time.saturating_add(self.periods.secs);
        LockStatus {
            current_epoch,
            chain_time,
            epochs_remaining: unlock_epoch.saturating_sub(current_epoch.number()),
            secs_remaining: unlock_time.saturating_sub(chain_time),
        }
    }
}

/// Read the chain's epoch and time and evaluate `lock` against them.
pub async fn lock_status<C: ContractCaller>(
    caller: &C,
    sfc: &ContractRef,
    lock: &Lock,
) -> Result<LockStatus, CallError> {
    let epoch = reads::current_sealed_epoch(caller, sfc).await?;
    let chain_time = reads::epoch_end_time(caller, sfc, epoch).await?;
    Ok(lock.status(epoch, chain_time))
}

pub struct LockWaiter<'a, C> {
    caller: &'a C,
    advancer: EpochAdvancer<'a, C>,
    policy: WaitPolicy,
}

impl<'a, C: ContractCaller> LockWaiter<'a, C> {
    pub fn new(caller: &'a C, advance: AdvancePolicy, policy: WaitPolicy) -> Self {
        Self {
            caller,
            advancer: EpochAdvancer::new(caller, advance),
            policy,
        }
    }

    /// Block until `lock` has elapsed. `entity` names what is being waited
    /// for in errors and logs.
    pub async fn wait_until_unlocked(
        &self,
        binding: &ContractBinding,
        sender: &Account,
        lock: &Lock,
        entity: &str,
        log: &mut TxLog,
    ) -> Result<LockStatus, LifecycleError> {
        let sfc = binding.sfc();
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.policy.max_wait_secs);
        let poll = Duration::from_millis(self.policy.poll_interval_ms);

        loop {
            let status = lock_status(self.caller, &sfc, lock).await?;
            if status.is_elapsed() {
                tracing::debug!(entity, epoch = %status.current_epoch, "lock elapsed");
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LifecycleError::LockTimeout {
                    entity: entity.to_string(),
                    max_wait_secs: self.policy.max_wait_secs,
                });
            }
            tracing::debug!(
                entity,
                epochs_remaining = status.epochs_remaining,
                secs_remaining = status.secs_remaining,
                "waiting for lock"
            );

            let sealed = if self.policy.advance_epochs && status.epochs_remaining > 0 {
                self.advancer
                    .advance(binding, sender, status.epochs_remaining, log)
                    .await
            } else {
                let pause = poll.min(Duration::from_secs(status.secs_remaining.max(1)));
                tokio::time::sleep(pause).await;
                if !self.policy.advance_epochs {
                    continue;
                }
                // Chain time moves with the next sealed epoch.
                self.advancer.advance(binding, sender, 1, log).await
            };

            // A refused seal is retried on the next poll until the deadline.
            if let Err(e) = sealed {
                if tokio::time::Instant::now() >= deadline {
                    return Err(e.into());
                }
                tracing::warn!(entity, error = %e, "epoch advance stalled, polling again");
                tokio::time::sleep(poll).await;
            }
        }
    }
}

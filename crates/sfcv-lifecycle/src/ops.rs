//! # Lifecycle Operations
//!
//! Every operation follows the same shape:
//!
//! 1. Check client-side preconditions against the registry and chain reads.
//!    A failed check returns [`LifecycleError::Rejected`] before anything is
//!    submitted, and the registry is left untouched.
//! 2. Resolve the staker id through the current binding and require that it
//!    is non-zero and matches the id recorded at creation.
//! 3. Submit the call and append its hash to the transaction log.
//! 4. Update the registry and, where the contract exposes the effect, read
//!    it back and assert it.
//!
//! The bulk helpers at the bottom compose these into the sequences the
//! scenarios run.

use serde_json::{json, Value};

use sfcv_client::ContractCaller;
use sfcv_core::{Account, Address, Amount, Epoch, StakerId, TxHash};

use crate::config::SuiteConfig;
use crate::epoch::{AdvanceReport, EpochAdvancer};
use crate::error::{ensure, LifecycleError, PreconditionError};
use crate::reads::{self, DelegationInfo, LockPeriods, StakerInfo};
use crate::registry::{DelegationHandle, EntityPhase, Progress, StakerHandle};
use crate::state::ScenarioState;
use crate::wait::{lock_status, Lock, LockWaiter};

fn rejected(
    operation: &'static str,
    entity: impl ToString,
    reason: PreconditionError,
) -> LifecycleError {
    LifecycleError::Rejected {
        operation,
        entity: entity.to_string(),
        reason,
    }
}

/// Withdrawn entities accept no further operations.
fn require_live(
    operation: &'static str,
    entity: impl ToString,
    progress: &Progress,
) -> Result<(), LifecycleError> {
    if progress.withdrawn {
        return Err(rejected(operation, entity, PreconditionError::AlreadyWithdrawn));
    }
    Ok(())
}

pub struct Operations<'a, C> {
    caller: &'a C,
    payer: &'a Account,
    config: &'a SuiteConfig,
}

impl<'a, C: ContractCaller> Operations<'a, C> {
    pub fn new(caller: &'a C, payer: &'a Account, config: &'a SuiteConfig) -> Self {
        Self {
            caller,
            payer,
            config,
        }
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    async fn submit(
        &self,
        state: &mut ScenarioState,
        method: &'static str,
        args: &[Value],
        sender: &Account,
        value: Option<Amount>,
    ) -> Result<TxHash, LifecycleError> {
        let hash = self
            .caller
            .submit_contract_call(&state.binding.sfc(), method, args, sender, value)
            .await?;
        state.log.append(hash, method);
        tracing::debug!(method, sender = %sender.address, tx = %hash, "submitted");
        Ok(hash)
    }

    /// Look up the id the contract currently maps `address` to.
    async fn lookup_id(
        &self,
        state: &ScenarioState,
        address: Address,
        entity: &dyn std::fmt::Display,
    ) -> Result<StakerId, LifecycleError> {
        state
            .binding
            .resolve_staker_id(self.caller, address)
            .await?
            .ok_or_else(|| {
                LifecycleError::AssertionFailed(format!(
                    "{entity}: {} returned 0 for {address}",
                    state.binding.id_lookup_method()
                ))
            })
    }

    /// Resolve a registered staker's id through the bound lookup and check
    /// it against the id recorded at creation.
    pub async fn resolve_id(
        &self,
        state: &ScenarioState,
        handle: StakerHandle,
    ) -> Result<StakerId, LifecycleError> {
        let record = state.registry.staker(handle)?;
        let resolved = self
            .lookup_id(state, record.account.address, &handle)
            .await?;
        if let Some(recorded) = record.staker_id {
            ensure(resolved == recorded, || {
                format!("{handle}: resolved id {resolved} differs from recorded id {recorded}")
            })?;
        }
        Ok(resolved)
    }

    /// The staker id a delegation points at, re-resolved through the
    /// staker's address when this run created the staker.
    async fn delegation_target(
        &self,
        state: &ScenarioState,
        handle: DelegationHandle,
    ) -> Result<StakerId, LifecycleError> {
        let record = state.registry.delegation(handle)?;
        let recorded = record.staker_id;
        if let Some(staker) = record.staker {
            if !state.registry.staker(staker)?.progress.withdrawn {
                let resolved = self.resolve_id(state, staker).await?;
                ensure(resolved == recorded, || {
                    format!("{handle}: staker id moved from {recorded} to {resolved}")
                })?;
                return Ok(resolved);
            }
        }
        Ok(recorded)
    }

    async fn current_epoch(&self, state: &ScenarioState) -> Result<Epoch, LifecycleError> {
        Ok(reads::current_sealed_epoch(self.caller, &state.binding.sfc()).await?)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn stakers_num(&self, state: &ScenarioState) -> Result<u64, LifecycleError> {
        Ok(reads::stakers_num(self.caller, &state.binding.sfc()).await?)
    }

    pub async fn staker_info(
        &self,
        state: &ScenarioState,
        handle: StakerHandle,
    ) -> Result<StakerInfo, LifecycleError> {
        let id = self.resolve_id(state, handle).await?;
        Ok(reads::staker_info(self.caller, &state.binding.sfc(), id).await?)
    }

    pub async fn delegation_info(
        &self,
        state: &ScenarioState,
        handle: DelegationHandle,
    ) -> Result<DelegationInfo, LifecycleError> {
        let id = self.delegation_target(state, handle).await?;
        let delegator = state.registry.delegation(handle)?.delegator.address;
        Ok(reads::delegation_info(self.caller, &state.binding.sfc(), delegator, id).await?)
    }

    pub async fn current_sealed_epoch(&self, state: &ScenarioState) -> Result<Epoch, LifecycleError> {
        self.current_epoch(state).await
    }

    pub async fn lock_periods(&self, state: &ScenarioState) -> Result<LockPeriods, LifecycleError> {
        Ok(reads::lock_periods(self.caller, &state.binding.sfc()).await?)
    }

    // ── Epochs ───────────────────────────────────────────────────────

    /// Seal `n` epochs from the payer account.
    pub async fn advance_epochs(
        &self,
        state: &mut ScenarioState,
        n: u64,
    ) -> Result<AdvanceReport, LifecycleError> {
        let advancer = EpochAdvancer::new(self.caller, self.config.advancer);
        Ok(advancer
            .advance(&state.binding, self.payer, n, &mut state.log)
            .await?)
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Fund a new account, stake from it, and register the staker with the
    /// id the contract derived.
    pub async fn create_stake(&self, state: &mut ScenarioState) -> Result<StakerHandle, LifecycleError> {
        let amounts = &self.config.amounts;
        let before = self.stakers_num(state).await?;
        let account = self
            .caller
            .fund_account(self.payer, amounts.staker_funding)
            .await?;
        self.submit(state, "createStake", &[json!("0x")], &account, Some(amounts.stake))
            .await?;

        let address = account.address;
        let handle = state.registry.register_staker(account, amounts.stake);
        let id = self.lookup_id(state, address, &handle).await?;
        state.registry.attach_id(handle, id)?;

        let after = self.stakers_num(state).await?;
        ensure(after == before + 1, || {
            format!("{handle}: stakers count went from {before} to {after}, expected +1")
        })?;
        tracing::info!(%handle, %id, %address, "staker created");
        Ok(handle)
    }

    /// Fund a new delegator and delegate to `staker`.
    pub async fn create_delegation(
        &self,
        state: &mut ScenarioState,
        staker: StakerHandle,
    ) -> Result<DelegationHandle, LifecycleError> {
        const OP: &str = "createDelegation";
        require_live(OP, staker, &state.registry.staker(staker)?.progress)?;
        let id = self.resolve_id(state, staker).await?;

        let amounts = &self.config.amounts;
        let delegator = self
            .caller
            .fund_account(self.payer, amounts.delegator_funding)
            .await?;
        self.submit(state, OP, &[json!(id.get())], &delegator, Some(amounts.delegation))
            .await?;
        let handle = state
            .registry
            .register_delegation(delegator, id, amounts.delegation);
        tracing::info!(%handle, %staker, %id, "delegation created");
        Ok(handle)
    }

    // ── Rewards ──────────────────────────────────────────────────────

    pub async fn claim_validator_rewards(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "claimValidatorRewards";
        let record = state.registry.staker(handle)?;
        require_live(OP, handle, &record.progress)?;
        let account = record.account.clone();
        self.resolve_id(state, handle).await?;

        let epochs = self.config.amounts.validator_reward_epochs;
        let hash = self.submit(state, OP, &[json!(epochs)], &account, None).await?;
        let epoch = self.current_epoch(state).await?;
        state.registry.mark_rewards_claimed(handle, epoch)?;
        Ok(hash)
    }

    pub async fn claim_delegation_rewards(
        &self,
        state: &mut ScenarioState,
        handle: DelegationHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "claimDelegationRewards";
        let record = state.registry.delegation(handle)?;
        require_live(OP, handle, &record.progress)?;
        let delegator = record.delegator.clone();
        let id = self.delegation_target(state, handle).await?;

        let epochs = self.config.amounts.delegation_reward_epochs;
        let hash = self
            .submit(state, OP, &[json!(epochs), json!(id.get())], &delegator, None)
            .await?;
        let epoch = self.current_epoch(state).await?;
        state.registry.mark_rewards_claimed(handle, epoch)?;
        Ok(hash)
    }

    // ── Prepare ──────────────────────────────────────────────────────

    /// Preparation needs claimed rewards and at least one epoch sealed since
    /// the claim.
    async fn check_preparable(
        &self,
        state: &ScenarioState,
        operation: &'static str,
        entity: &dyn std::fmt::Display,
        progress: &Progress,
    ) -> Result<Epoch, LifecycleError> {
        require_live(operation, entity, progress)?;
        if progress.prepared_to_withdraw() {
            return Err(rejected(operation, entity, PreconditionError::AlreadyPrepared));
        }
        let claimed_at = progress
            .rewards_claimed_at
            .ok_or_else(|| rejected(operation, entity, PreconditionError::RewardsNotClaimed))?;
        let current = self.current_epoch(state).await?;
        if current <= claimed_at {
            return Err(rejected(
                operation,
                entity,
                PreconditionError::NoEpochSinceClaim {
                    claimed_at,
                    current,
                },
            ));
        }
        Ok(current)
    }

    pub async fn prepare_to_withdraw_stake(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "prepareToWithdrawStake";
        let record = state.registry.staker(handle)?;
        let (account, progress) = (record.account.clone(), record.progress.clone());
        let epoch = self.check_preparable(state, OP, &handle, &progress).await?;
        self.resolve_id(state, handle).await?;

        let hash = self.submit(state, OP, &[], &account, None).await?;
        state.registry.mark_prepared(handle, epoch)?;
        tracing::info!(%handle, %epoch, "stake prepared to withdraw");
        Ok(hash)
    }

    pub async fn prepare_to_withdraw_delegation(
        &self,
        state: &mut ScenarioState,
        handle: DelegationHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "prepareToWithdrawDelegation";
        let record = state.registry.delegation(handle)?;
        let (delegator, progress) = (record.delegator.clone(), record.progress.clone());
        let epoch = self.check_preparable(state, OP, &handle, &progress).await?;
        let id = self.delegation_target(state, handle).await?;

        let hash = self
            .submit(state, OP, &[json!(id.get())], &delegator, None)
            .await?;
        state.registry.mark_prepared(handle, epoch)?;
        tracing::info!(%handle, %epoch, "delegation prepared to withdraw");
        Ok(hash)
    }

    // ── Withdraw ─────────────────────────────────────────────────────

    fn require_prepared(
        operation: &'static str,
        entity: &dyn std::fmt::Display,
        progress: &Progress,
    ) -> Result<(), LifecycleError> {
        require_live(operation, entity, progress)?;
        if progress.phase() != EntityPhase::PreparedToWithdraw {
            return Err(rejected(operation, entity, PreconditionError::NotPrepared));
        }
        Ok(())
    }

    async fn stake_lock(
        &self,
        state: &ScenarioState,
        handle: StakerHandle,
    ) -> Result<Lock, LifecycleError> {
        let info = self.staker_info(state, handle).await?;
        ensure(info.is_deactivated(), || {
            format!("{handle}: prepared locally but not deactivated on chain")
        })?;
        Ok(Lock {
            deactivated_epoch: info.deactivated_epoch,
            deactivated_time: info.deactivated_time,
            periods: self.lock_periods(state).await?,
        })
    }

    async fn delegation_lock(
        &self,
        state: &ScenarioState,
        handle: DelegationHandle,
    ) -> Result<Lock, LifecycleError> {
        let info = self.delegation_info(state, handle).await?;
        ensure(info.is_deactivated(), || {
            format!("{handle}: prepared locally but not deactivated on chain")
        })?;
        Ok(Lock {
            deactivated_epoch: info.deactivated_epoch,
            deactivated_time: info.deactivated_time,
            periods: self.lock_periods(state).await?,
        })
    }

    async fn require_unlocked(
        &self,
        state: &ScenarioState,
        operation: &'static str,
        entity: &dyn std::fmt::Display,
        lock: &Lock,
    ) -> Result<(), LifecycleError> {
        let status = lock_status(self.caller, &state.binding.sfc(), lock).await?;
        if !status.is_elapsed() {
            return Err(rejected(
                operation,
                entity,
                PreconditionError::LockNotElapsed {
                    epochs_remaining: status.epochs_remaining,
                    secs_remaining: status.secs_remaining,
                },
            ));
        }
        Ok(())
    }

    async fn wait_for(
        &self,
        state: &mut ScenarioState,
        lock: &Lock,
        entity: &dyn std::fmt::Display,
    ) -> Result<(), LifecycleError> {
        let waiter = LockWaiter::new(self.caller, self.config.advancer, self.config.waiter);
        let entity = entity.to_string();
        waiter
            .wait_until_unlocked(&state.binding, self.payer, lock, &entity, &mut state.log)
            .await?;
        Ok(())
    }

    /// Submit `withdrawStake` for a staker whose preconditions were checked,
    /// asserting the staker count drops by one.
    async fn execute_withdraw_stake(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
        operation: &'static str,
    ) -> Result<TxHash, LifecycleError> {
        let account = state.registry.staker(handle)?.account.clone();
        let id = self.resolve_id(state, handle).await?;
        let before = self.stakers_num(state).await?;
        let hash = self.submit(state, "withdrawStake", &[], &account, None).await?;
        state.registry.mark_withdrawn(handle)?;

        let after = self.stakers_num(state).await?;
        ensure(after + 1 == before, || {
            format!("{handle}: {operation} moved stakers count from {before} to {after}, expected -1")
        })?;
        tracing::info!(%handle, %id, operation, "stake withdrawn");
        Ok(hash)
    }

    /// Withdraw a prepared stake. Rejects without submitting while the lock
    /// has not elapsed.
    pub async fn withdraw_stake(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "withdrawStake";
        Self::require_prepared(OP, &handle, &state.registry.staker(handle)?.progress)?;
        let lock = self.stake_lock(state, handle).await?;
        self.require_unlocked(state, OP, &handle, &lock).await?;
        self.execute_withdraw_stake(state, handle, OP).await
    }

    /// Wait for the stake's lock to elapse, then withdraw.
    pub async fn withdraw_stake_when_unlocked(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "withdrawStake";
        Self::require_prepared(OP, &handle, &state.registry.staker(handle)?.progress)?;
        let lock = self.stake_lock(state, handle).await?;
        self.wait_for(state, &lock, &handle).await?;
        self.execute_withdraw_stake(state, handle, OP).await
    }

    async fn execute_withdraw_delegation(
        &self,
        state: &mut ScenarioState,
        handle: DelegationHandle,
    ) -> Result<TxHash, LifecycleError> {
        let delegator = state.registry.delegation(handle)?.delegator.clone();
        let id = self.delegation_target(state, handle).await?;
        let hash = self
            .submit(state, "withdrawDelegation", &[json!(id.get())], &delegator, None)
            .await?;
        state.registry.mark_withdrawn(handle)?;

        let info = self.delegation_info(state, handle).await?;
        ensure(info.amount == Amount::ZERO, || {
            format!("{handle}: delegation still holds {} after withdrawal", info.amount)
        })?;
        tracing::info!(%handle, %id, "delegation withdrawn");
        Ok(hash)
    }

    pub async fn withdraw_delegation(
        &self,
        state: &mut ScenarioState,
        handle: DelegationHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "withdrawDelegation";
        Self::require_prepared(OP, &handle, &state.registry.delegation(handle)?.progress)?;
        let lock = self.delegation_lock(state, handle).await?;
        self.require_unlocked(state, OP, &handle, &lock).await?;
        self.execute_withdraw_delegation(state, handle).await
    }

    pub async fn withdraw_delegation_when_unlocked(
        &self,
        state: &mut ScenarioState,
        handle: DelegationHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "withdrawDelegation";
        Self::require_prepared(OP, &handle, &state.registry.delegation(handle)?.progress)?;
        let lock = self.delegation_lock(state, handle).await?;
        self.wait_for(state, &lock, &handle).await?;
        self.execute_withdraw_delegation(state, handle).await
    }

    // ── Post-upgrade staker management ───────────────────────────────

    /// Add `delta` to a live stake and check the contract reports exactly
    /// the old amount plus `delta`.
    pub async fn increase_stake(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
        delta: Amount,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "increaseStake";
        let record = state.registry.staker(handle)?;
        require_live(OP, handle, &record.progress)?;
        let account = record.account.clone();

        let before = self.staker_info(state, handle).await?.stake_amount;
        let hash = self.submit(state, OP, &[], &account, Some(delta)).await?;
        let after = self.staker_info(state, handle).await?.stake_amount;

        let expected = before.checked_add(delta);
        ensure(expected == Some(after), || {
            format!("{handle}: stake went from {before} to {after} after increasing by {delta}")
        })?;
        state.registry.add_stake(handle, delta)?;
        tracing::info!(%handle, %before, %after, "stake increased");
        Ok(hash)
    }

    /// Move a staker to `new_account`. The call is signed by the staker's
    /// current account, and the id must be unchanged under the new address.
    pub async fn update_staker_sfc_address(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
        new_account: Account,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "updateStakerSfcAddress";
        let record = state.registry.staker(handle)?;
        require_live(OP, handle, &record.progress)?;
        let current = record.account.clone();
        let id = self.resolve_id(state, handle).await?;

        let hash = self
            .submit(state, OP, &[json!(new_account.address)], &current, None)
            .await?;
        let moved = self.lookup_id(state, new_account.address, &handle).await?;
        ensure(moved == id, || {
            format!(
                "{handle}: id changed from {id} to {moved} moving {} to {}",
                current.address, new_account.address
            )
        })?;

        let info = reads::staker_info(self.caller, &state.binding.sfc(), id).await?;
        ensure(info.sfc_address == new_account.address, || {
            format!("{handle}: contract reports address {}", info.sfc_address)
        })?;
        tracing::info!(
            %handle,
            %id,
            from = %current.address,
            to = %new_account.address,
            "staker address updated"
        );
        state.registry.replace_address(handle, new_account)?;
        Ok(hash)
    }

    /// Flag a staker as a cheater. Sent by the payer, which owns the
    /// contract.
    pub async fn mark_as_cheater(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "markAsCheater";
        require_live(OP, handle, &state.registry.staker(handle)?.progress)?;
        let id = self.resolve_id(state, handle).await?;
        let hash = self
            .submit(state, OP, &[json!(id.get())], self.payer, None)
            .await?;

        let info = reads::staker_info(self.caller, &state.binding.sfc(), id).await?;
        ensure(info.is_cheater, || format!("{handle}: cheater flag not set after {OP}"))?;
        state.registry.mark_cheater(handle)?;
        tracing::info!(%handle, %id, "staker marked as cheater");
        Ok(hash)
    }

    /// Apply the punishment withdrawal to a staker marked as a cheater. No
    /// preparation or lock applies.
    pub async fn punish(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<TxHash, LifecycleError> {
        const OP: &str = "punish";
        let record = state.registry.staker(handle)?;
        require_live(OP, handle, &record.progress)?;
        if !record.is_cheater {
            return Err(rejected(OP, handle, PreconditionError::NotACheater));
        }
        self.execute_withdraw_stake(state, handle, OP).await
    }

    // ── Bulk helpers ─────────────────────────────────────────────────

    /// Create `n` stakers and check the contract count grew by `n`.
    pub async fn create_stakes(
        &self,
        state: &mut ScenarioState,
        n: usize,
    ) -> Result<Vec<StakerHandle>, LifecycleError> {
        let before = self.stakers_num(state).await?;
        let mut handles = Vec::with_capacity(n);
        for _ in 0..n {
            handles.push(self.create_stake(state).await?);
        }
        let after = self.stakers_num(state).await?;
        ensure(after == before + n as u64, || {
            format!("stakers count went from {before} to {after} creating {n}")
        })?;
        Ok(handles)
    }

    /// Create `n` stakers and prepare the first `num_to_prepare` of them to
    /// withdraw.
    pub async fn create_stakes_and_prepare_to_withdraw(
        &self,
        state: &mut ScenarioState,
        n: usize,
        num_to_prepare: usize,
    ) -> Result<Vec<StakerHandle>, LifecycleError> {
        ensure(n > num_to_prepare, || {
            format!("cannot prepare {num_to_prepare} of {n} stakers")
        })?;
        let handles = self.create_stakes(state, n).await?;
        let to_prepare = &handles[..num_to_prepare];
        for &h in to_prepare {
            self.claim_validator_rewards(state, h).await?;
        }
        if !to_prepare.is_empty() {
            self.advance_epochs(state, 1).await?;
        }
        for &h in to_prepare {
            self.prepare_to_withdraw_stake(state, h).await?;
        }
        Ok(handles)
    }

    /// Create `per_staker` delegations to each of `stakers`.
    pub async fn create_delegations(
        &self,
        state: &mut ScenarioState,
        stakers: &[StakerHandle],
        per_staker: usize,
    ) -> Result<Vec<DelegationHandle>, LifecycleError> {
        let mut handles = Vec::with_capacity(stakers.len() * per_staker);
        for &staker in stakers {
            for _ in 0..per_staker {
                handles.push(self.create_delegation(state, staker).await?);
            }
        }
        Ok(handles)
    }

    /// Prepare up to `max_per_staker` not-yet-prepared delegations of each
    /// staker. Rewards are claimed for all of them before a single epoch is
    /// sealed and they are prepared together.
    pub async fn prepare_to_withdraw_delegations(
        &self,
        state: &mut ScenarioState,
        stakers: &[StakerHandle],
        max_per_staker: usize,
    ) -> Result<Vec<DelegationHandle>, LifecycleError> {
        let mut selected = Vec::new();
        for &staker in stakers {
            let live = state
                .registry
                .delegations_of(staker)
                .into_iter()
                .filter(|&d| {
                    state.registry.delegation(d).is_ok_and(|r| {
                        matches!(r.phase(), EntityPhase::Created | EntityPhase::RewardsClaimed)
                    })
                })
                .take(max_per_staker);
            selected.extend(live);
        }
        for &d in &selected {
            self.claim_delegation_rewards(state, d).await?;
        }
        if !selected.is_empty() {
            self.advance_epochs(state, 1).await?;
        }
        for &d in &selected {
            self.prepare_to_withdraw_delegation(state, d).await?;
        }
        Ok(selected)
    }

    /// Claim, seal an epoch, and prepare a stake.
    pub async fn collect_rewards_and_prepare_withdraw_stake(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<(), LifecycleError> {
        self.claim_validator_rewards(state, handle).await?;
        self.advance_epochs(state, 1).await?;
        self.prepare_to_withdraw_stake(state, handle).await?;
        Ok(())
    }

    /// Take a delegation through claim, prepare, lock, and withdrawal.
    pub async fn collect_rewards_and_withdraw_delegation(
        &self,
        state: &mut ScenarioState,
        handle: DelegationHandle,
    ) -> Result<(), LifecycleError> {
        self.advance_epochs(state, 1).await?;
        self.claim_delegation_rewards(state, handle).await?;
        self.advance_epochs(state, 1).await?;
        self.prepare_to_withdraw_delegation(state, handle).await?;
        self.withdraw_delegation_when_unlocked(state, handle).await?;
        Ok(())
    }

    pub async fn create_and_withdraw_delegation(
        &self,
        state: &mut ScenarioState,
        staker: StakerHandle,
    ) -> Result<DelegationHandle, LifecycleError> {
        let handle = self.create_delegation(state, staker).await?;
        self.collect_rewards_and_withdraw_delegation(state, handle)
            .await?;
        Ok(handle)
    }

    /// Increase a stake by the configured amount.
    pub async fn test_increase_stake(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<(), LifecycleError> {
        self.increase_stake(state, handle, self.config.amounts.stake_increase)
            .await?;
        Ok(())
    }

    /// Move a staker to a fresh address and back, checking the id at every
    /// step. The return leg is signed by the temporary account, so it is
    /// funded first.
    pub async fn test_change_staker_address(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<(), LifecycleError> {
        let start = self.resolve_id(state, handle).await?;
        let original = state.registry.staker(handle)?.account.clone();
        let temporary = self
            .caller
            .fund_account(self.payer, self.config.amounts.address_swap_funding)
            .await?;

        self.update_staker_sfc_address(state, handle, temporary).await?;
        self.update_staker_sfc_address(state, handle, original).await?;

        let end = self.resolve_id(state, handle).await?;
        ensure(end == start, || {
            format!("{handle}: id {start} became {end} after the address round trip")
        })?;
        Ok(())
    }

    pub async fn mark_staker_as_cheater_and_punish(
        &self,
        state: &mut ScenarioState,
        handle: StakerHandle,
    ) -> Result<(), LifecycleError> {
        self.mark_as_cheater(state, handle).await?;
        self.punish(state, handle).await?;
        Ok(())
    }
}

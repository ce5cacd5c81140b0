// SPDX-License-Identifier: BUSL-1.1
//! In-memory staking contract model.
//!
//! Storage lives in [`SfcStorage`], independent of the implementation that
//! runs against it. A proxy upgrade swaps the [`ContractVersion`] and leaves
//! stakers, delegations, and epochs untouched.
//!
//! The chain clock is logical: it moves forward by `epoch_duration_secs` each
//! time an epoch is sealed, and only then.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sfcv_client::CallError;
use sfcv_core::{Address, Amount};

/// Implementation generations the simulator can run behind the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractVersion {
    /// Pre-upgrade implementation; ids resolve through `sfcAddressToStakerID`.
    V1,
    /// Upgraded implementation; ids resolve through `getStakerID`.
    V2,
}

const SHARED_READS: &[&str] = &[
    "stakersNum",
    "stakersLastID",
    "stakers",
    "delegations",
    "currentSealedEpoch",
    "epochSnapshots",
    "stakeLockPeriodTime",
    "stakeLockPeriodEpochs",
];

const SHARED_WRITES: &[&str] = &[
    "createStake",
    "createDelegation",
    "claimValidatorRewards",
    "claimDelegationRewards",
    "prepareToWithdrawStake",
    "prepareToWithdrawDelegation",
    "withdrawStake",
    "withdrawDelegation",
    "forceNewEpoch",
];

const V2_WRITES: &[&str] = &[
    "increaseStake",
    "updateStakerSfcAddress",
    "markAsCheater",
    "upgradeStakerStorage",
];

impl ContractVersion {
    /// The view method that maps an address to its staker id.
    pub fn id_lookup_method(self) -> &'static str {
        match self {
            Self::V1 => "sfcAddressToStakerID",
            Self::V2 => "getStakerID",
        }
    }

    /// Whether `method` is a view on this version.
    pub fn is_read(self, method: &str) -> bool {
        SHARED_READS.contains(&method) || method == self.id_lookup_method()
    }

    /// Whether `method` is a state-changing call on this version.
    pub fn is_write(self, method: &str) -> bool {
        SHARED_WRITES.contains(&method)
            || (self == Self::V2 && V2_WRITES.contains(&method))
    }

    /// Whether this version exposes `method` at all.
    pub fn supports(self, method: &str) -> bool {
        self.is_read(method) || self.is_write(method)
    }
}

/// Lock periods applied between preparing and executing a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPeriods {
    /// Epochs that must be sealed after preparation.
    pub epochs: u64,
    /// Seconds of chain time that must pass after preparation.
    pub secs: u64,
}

/// Contract parameters fixed at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParams {
    pub lock: LockPeriods,
    pub min_stake: Amount,
    pub epoch_duration_secs: u64,
}

impl Default for ContractParams {
    fn default() -> Self {
        Self {
            lock: LockPeriods { epochs: 3, secs: 60 },
            min_stake: Amount::new(3_175_000),
            epoch_duration_secs: 30,
        }
    }
}

/// Who is calling and with how much value attached.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub sender: Address,
    pub value: Amount,
    /// Contract owner, allowed to run administrative methods.
    pub owner: Address,
}

#[derive(Debug, Clone)]
struct StakerSlot {
    sfc_address: Address,
    stake_amount: Amount,
    created_epoch: u64,
    created_time: u64,
    deactivated_epoch: u64,
    deactivated_time: u64,
    rewards_claimed_epoch: Option<u64>,
    is_cheater: bool,
    storage_upgraded: bool,
}

#[derive(Debug, Clone)]
struct DelegationSlot {
    amount: Amount,
    created_epoch: u64,
    deactivated_epoch: u64,
    deactivated_time: u64,
    rewards_claimed_epoch: Option<u64>,
}

/// Contract storage shared by every implementation behind the proxy.
#[derive(Debug)]
pub struct SfcStorage {
    params: ContractParams,
    stakers: BTreeMap<u64, StakerSlot>,
    ids_by_address: HashMap<Address, u64>,
    last_staker_id: u64,
    delegations: HashMap<(Address, u64), DelegationSlot>,
    current_sealed_epoch: u64,
    epoch_end_times: BTreeMap<u64, u64>,
    clock_secs: u64,
    pending_seal_failures: u32,
}

impl SfcStorage {
    /// Fresh storage with epoch 1 sealed at time zero.
    pub fn new(params: ContractParams) -> Self {
        let mut epoch_end_times = BTreeMap::new();
        epoch_end_times.insert(1, 0);
        Self {
            params,
            stakers: BTreeMap::new(),
            ids_by_address: HashMap::new(),
            last_staker_id: 0,
            delegations: HashMap::new(),
            current_sealed_epoch: 1,
            epoch_end_times,
            clock_secs: 0,
            pending_seal_failures: 0,
        }
    }

    pub fn params(&self) -> &ContractParams {
        &self.params
    }

    /// Current logical chain time in seconds.
    pub fn clock_secs(&self) -> u64 {
        self.clock_secs
    }

    /// Move the clock forward without sealing an epoch.
    pub fn advance_clock(&mut self, secs: u64) {
        self.clock_secs = self.clock_secs.saturating_add(secs);
    }

    /// The next `n` `forceNewEpoch` calls revert as "not sealable yet".
    pub fn fail_next_seals(&mut self, n: u32) {
        self.pending_seal_failures = n;
    }

    /// Number of stakers that have not withdrawn.
    pub fn active_stakers(&self) -> u64 {
        self.stakers.len() as u64
    }

    /// Whether `upgradeStakerStorage` ran for `id`.
    pub fn storage_upgraded(&self, id: u64) -> bool {
        self.stakers.get(&id).is_some_and(|s| s.storage_upgraded)
    }

    /// Execute a view method.
    pub fn read(
        &self,
        version: ContractVersion,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        match method {
            "stakersNum" => Ok(json!(self.active_stakers())),
            "stakersLastID" => Ok(json!(self.last_staker_id)),
            "stakers" => {
                let id: u64 = arg(method, args, 0)?;
                Ok(self.staker_view(id))
            }
            "delegations" => {
                let delegator: Address = arg(method, args, 0)?;
                let id: u64 = arg(method, args, 1)?;
                Ok(self.delegation_view(delegator, id))
            }
            "currentSealedEpoch" => Ok(json!(self.current_sealed_epoch)),
            "epochSnapshots" => {
                let epoch: u64 = arg(method, args, 0)?;
                let end_time = self.epoch_end_times.get(&epoch).copied().unwrap_or(0);
                Ok(json!({ "endTime": end_time }))
            }
            "stakeLockPeriodTime" => Ok(json!(self.params.lock.secs)),
            "stakeLockPeriodEpochs" => Ok(json!(self.params.lock.epochs)),
            m if m == version.id_lookup_method() => {
                let address: Address = arg(method, args, 0)?;
                Ok(json!(self.ids_by_address.get(&address).copied().unwrap_or(0)))
            }
            _ => Err(CallError::Rpc {
                method: method.to_string(),
                code: -32602,
                message: format!("{method} is not a view method"),
            }),
        }
    }

    /// Execute a state-changing method. Returns the amount paid out to the
    /// sender. Storage is left unchanged when an error is returned.
    pub fn execute(
        &mut self,
        version: ContractVersion,
        method: &str,
        args: &[Value],
        ctx: &CallContext,
    ) -> Result<Amount, CallError> {
        if !version.is_write(method) {
            return Err(CallError::Rpc {
                method: method.to_string(),
                code: -32602,
                message: format!("{method} is not a state-changing method"),
            });
        }
        match method {
            "createStake" => self.create_stake(ctx),
            "createDelegation" => {
                let id: u64 = arg(method, args, 0)?;
                self.create_delegation(ctx, id)
            }
            "claimValidatorRewards" => {
                let epoch = self.current_sealed_epoch;
                self.staker_slot_mut(method, ctx.sender)?.rewards_claimed_epoch = Some(epoch);
                Ok(Amount::ZERO)
            }
            "claimDelegationRewards" => {
                let id: u64 = arg(method, args, 1)?;
                let epoch = self.current_sealed_epoch;
                let slot = self.delegation_mut(method, ctx.sender, id)?;
                slot.rewards_claimed_epoch = Some(epoch);
                Ok(Amount::ZERO)
            }
            "prepareToWithdrawStake" => self.prepare_stake(method, ctx),
            "prepareToWithdrawDelegation" => {
                let id: u64 = arg(method, args, 0)?;
                self.prepare_delegation(method, ctx, id)
            }
            "withdrawStake" => self.withdraw_stake(method, ctx),
            "withdrawDelegation" => {
                let id: u64 = arg(method, args, 0)?;
                self.withdraw_delegation(method, ctx, id)
            }
            "forceNewEpoch" => self.seal_epoch(method),
            "increaseStake" => {
                if ctx.value == Amount::ZERO {
                    return Err(CallError::reverted(method, "zero value"));
                }
                let slot = self.staker_slot_mut(method, ctx.sender)?;
                if slot.deactivated_epoch != 0 {
                    return Err(CallError::reverted(method, "staker is deactivated"));
                }
                slot.stake_amount = slot
                    .stake_amount
                    .checked_add(ctx.value)
                    .ok_or_else(|| CallError::reverted(method, "stake overflow"))?;
                Ok(Amount::ZERO)
            }
            "updateStakerSfcAddress" => {
                let new_address: Address = arg(method, args, 0)?;
                self.update_sfc_address(method, ctx.sender, new_address)
            }
            "markAsCheater" => {
                only_owner(method, ctx)?;
                let id: u64 = arg(method, args, 0)?;
                let slot = self
                    .stakers
                    .get_mut(&id)
                    .ok_or_else(|| CallError::reverted(method, "staker doesn't exist"))?;
                slot.is_cheater = true;
                Ok(Amount::ZERO)
            }
            "upgradeStakerStorage" => {
                only_owner(method, ctx)?;
                let id: u64 = arg(method, args, 0)?;
                // Ids freed by withdrawal have nothing to migrate.
                if let Some(slot) = self.stakers.get_mut(&id) {
                    slot.storage_upgraded = true;
                }
                Ok(Amount::ZERO)
            }
            other => Err(CallError::incompatible(other, format!("{version:?}"))),
        }
    }

    fn staker_view(&self, id: u64) -> Value {
        match self.stakers.get(&id) {
            Some(s) => json!({
                "stakeAmount": s.stake_amount,
                "createdEpoch": s.created_epoch,
                "createdTime": s.created_time,
                "deactivatedEpoch": s.deactivated_epoch,
                "deactivatedTime": s.deactivated_time,
                "isCheater": s.is_cheater,
                "sfcAddress": s.sfc_address,
            }),
            None => json!({
                "stakeAmount": Amount::ZERO,
                "createdEpoch": 0,
                "createdTime": 0,
                "deactivatedEpoch": 0,
                "deactivatedTime": 0,
                "isCheater": false,
                "sfcAddress": Address::ZERO,
            }),
        }
    }

    fn delegation_view(&self, delegator: Address, id: u64) -> Value {
        let slot = self.delegations.get(&(delegator, id));
        json!({
            "amount": slot.map_or(Amount::ZERO, |d| d.amount),
            "createdEpoch": slot.map_or(0, |d| d.created_epoch),
            "deactivatedEpoch": slot.map_or(0, |d| d.deactivated_epoch),
            "deactivatedTime": slot.map_or(0, |d| d.deactivated_time),
        })
    }

    fn staker_of(&self, method: &str, address: Address) -> Result<u64, CallError> {
        self.ids_by_address
            .get(&address)
            .copied()
            .ok_or_else(|| CallError::reverted(method, "staker doesn't exist"))
    }

    fn staker_slot_mut(
        &mut self,
        method: &str,
        address: Address,
    ) -> Result<&mut StakerSlot, CallError> {
        let id = self.staker_of(method, address)?;
        self.stakers
            .get_mut(&id)
            .ok_or_else(|| CallError::reverted(method, "staker doesn't exist"))
    }

    fn delegation_mut(
        &mut self,
        method: &str,
        delegator: Address,
        id: u64,
    ) -> Result<&mut DelegationSlot, CallError> {
        self.delegations
            .get_mut(&(delegator, id))
            .ok_or_else(|| CallError::reverted(method, "delegation doesn't exist"))
    }

    fn create_stake(&mut self, ctx: &CallContext) -> Result<Amount, CallError> {
        let method = "createStake";
        if self.ids_by_address.contains_key(&ctx.sender) {
            return Err(CallError::reverted(method, "staker already exists"));
        }
        if ctx.value < self.params.min_stake {
            return Err(CallError::reverted(method, "insufficient amount"));
        }
        self.last_staker_id += 1;
        let id = self.last_staker_id;
        self.stakers.insert(
            id,
            StakerSlot {
                sfc_address: ctx.sender,
                stake_amount: ctx.value,
                created_epoch: self.current_sealed_epoch,
                created_time: self.clock_secs,
                deactivated_epoch: 0,
                deactivated_time: 0,
                rewards_claimed_epoch: None,
                is_cheater: false,
                storage_upgraded: false,
            },
        );
        self.ids_by_address.insert(ctx.sender, id);
        Ok(Amount::ZERO)
    }

    fn create_delegation(&mut self, ctx: &CallContext, id: u64) -> Result<Amount, CallError> {
        let method = "createDelegation";
        if ctx.value == Amount::ZERO {
            return Err(CallError::reverted(method, "insufficient amount"));
        }
        match self.stakers.get(&id) {
            None => return Err(CallError::reverted(method, "staker doesn't exist")),
            Some(s) if s.deactivated_epoch != 0 => {
                return Err(CallError::reverted(method, "staker is deactivated"))
            }
            Some(_) => {}
        }
        if self.delegations.contains_key(&(ctx.sender, id)) {
            return Err(CallError::reverted(method, "delegation already exists"));
        }
        self.delegations.insert(
            (ctx.sender, id),
            DelegationSlot {
                amount: ctx.value,
                created_epoch: self.current_sealed_epoch,
                deactivated_epoch: 0,
                deactivated_time: 0,
                rewards_claimed_epoch: None,
            },
        );
        Ok(Amount::ZERO)
    }

    fn prepare_stake(&mut self, method: &str, ctx: &CallContext) -> Result<Amount, CallError> {
        let (epoch, now) = (self.current_sealed_epoch, self.clock_secs);
        let slot = self.staker_slot_mut(method, ctx.sender)?;
        if slot.deactivated_epoch != 0 {
            return Err(CallError::reverted(method, "staker is deactivated"));
        }
        if slot.rewards_claimed_epoch.is_none() {
            return Err(CallError::reverted(method, "not all rewards claimed"));
        }
        slot.deactivated_epoch = epoch;
        slot.deactivated_time = now;
        Ok(Amount::ZERO)
    }

    fn prepare_delegation(
        &mut self,
        method: &str,
        ctx: &CallContext,
        id: u64,
    ) -> Result<Amount, CallError> {
        let (epoch, now) = (self.current_sealed_epoch, self.clock_secs);
        let slot = self.delegation_mut(method, ctx.sender, id)?;
        if slot.deactivated_epoch != 0 {
            return Err(CallError::reverted(method, "delegation is deactivated"));
        }
        if slot.rewards_claimed_epoch.is_none() {
            return Err(CallError::reverted(method, "not all rewards claimed"));
        }
        slot.deactivated_epoch = epoch;
        slot.deactivated_time = now;
        Ok(Amount::ZERO)
    }

    fn lock_elapsed(
        &self,
        deactivated_epoch: u64,
        deactivated_time: u64,
    ) -> Result<(), &'static str> {
        let lock = self.params.lock;
        if self.current_sealed_epoch < deactivated_epoch.saturating_add(lock.epochs) {
            return Err("not enough epochs passed");
        }
        if self.clock_secs < deactivated_time.saturating_add(lock.secs) {
            return Err("not enough time passed");
        }
        Ok(())
    }

    fn withdraw_stake(&mut self, method: &str, ctx: &CallContext) -> Result<Amount, CallError> {
        let id = self.staker_of(method, ctx.sender)?;
        let slot = self.staker_slot_mut(method, ctx.sender)?.clone();
        // A cheater forfeits the stake and skips the lock.
        if !slot.is_cheater {
            if slot.deactivated_epoch == 0 {
                return Err(CallError::reverted(method, "staker wasn't deactivated"));
            }
            self.lock_elapsed(slot.deactivated_epoch, slot.deactivated_time)
                .map_err(|reason| CallError::reverted(method, reason))?;
        }
        self.stakers.remove(&id);
        self.ids_by_address.remove(&ctx.sender);
        Ok(if slot.is_cheater {
            Amount::ZERO
        } else {
            slot.stake_amount
        })
    }

    fn withdraw_delegation(
        &mut self,
        method: &str,
        ctx: &CallContext,
        id: u64,
    ) -> Result<Amount, CallError> {
        let slot = self.delegation_mut(method, ctx.sender, id)?.clone();
        if slot.deactivated_epoch == 0 {
            return Err(CallError::reverted(method, "delegation wasn't deactivated"));
        }
        self.lock_elapsed(slot.deactivated_epoch, slot.deactivated_time)
            .map_err(|reason| CallError::reverted(method, reason))?;
        self.delegations.remove(&(ctx.sender, id));
        Ok(slot.amount)
    }

    fn seal_epoch(&mut self, method: &str) -> Result<Amount, CallError> {
        if self.pending_seal_failures > 0 {
            self.pending_seal_failures -= 1;
            return Err(CallError::reverted(method, "epoch is not sealable yet"));
        }
        self.current_sealed_epoch += 1;
        self.clock_secs = self
            .clock_secs
            .saturating_add(self.params.epoch_duration_secs);
        self.epoch_end_times
            .insert(self.current_sealed_epoch, self.clock_secs);
        Ok(Amount::ZERO)
    }

    fn update_sfc_address(
        &mut self,
        method: &str,
        sender: Address,
        new_address: Address,
    ) -> Result<Amount, CallError> {
        if new_address == sender {
            return Err(CallError::reverted(method, "the same address"));
        }
        if new_address.is_zero() || self.ids_by_address.contains_key(&new_address) {
            return Err(CallError::reverted(method, "address already used"));
        }
        self.staker_slot_mut(method, sender)?.sfc_address = new_address;
        if let Some(id) = self.ids_by_address.remove(&sender) {
            self.ids_by_address.insert(new_address, id);
        }
        Ok(Amount::ZERO)
    }
}

fn only_owner(method: &str, ctx: &CallContext) -> Result<(), CallError> {
    if ctx.sender != ctx.owner {
        return Err(CallError::reverted(method, "caller is not the owner"));
    }
    Ok(())
}

fn arg<T: DeserializeOwned>(method: &str, args: &[Value], index: usize) -> Result<T, CallError> {
    let raw = args
        .get(index)
        .cloned()
        .ok_or_else(|| CallError::reverted(method, format!("missing argument {index}")))?;
    serde_json::from_value(raw)
        .map_err(|e| CallError::reverted(method, format!("invalid argument {index}: {e}")))
}

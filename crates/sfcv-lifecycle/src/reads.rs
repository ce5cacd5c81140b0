//! Typed contract reads.

use serde::{Deserialize, Serialize};
use serde_json::json;

use sfcv_client::{decode, CallError, ContractCaller, ContractRef};
use sfcv_core::{Address, Amount, Epoch, StakerId};

/// Staker state as the contract reports it. A withdrawn or unknown id reads
/// back as all zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakerInfo {
    pub stake_amount: Amount,
    pub created_epoch: Epoch,
    pub deactivated_epoch: Epoch,
    pub deactivated_time: u64,
    pub is_cheater: bool,
    pub sfc_address: Address,
}

impl StakerInfo {
    /// Whether withdrawal has been prepared on chain.
    pub fn is_deactivated(&self) -> bool {
        self.deactivated_epoch.number() != 0
    }
}

/// Delegation state as the contract reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationInfo {
    pub amount: Amount,
    #[serde(default)]
    pub created_epoch: Epoch,
    pub deactivated_epoch: Epoch,
    pub deactivated_time: u64,
}

impl DelegationInfo {
    pub fn is_deactivated(&self) -> bool {
        self.deactivated_epoch.number() != 0
    }
}

/// Withdrawal lock periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockPeriods {
    pub epochs: u64,
    pub secs: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpochSnapshot {
    end_time: u64,
}

pub async fn stakers_num<C: ContractCaller>(caller: &C, sfc: &ContractRef) -> Result<u64, CallError> {
    let raw = caller.read_contract_state(sfc, "stakersNum", &[]).await?;
    decode("stakersNum", raw)
}

/// Highest staker id the contract has issued. Ids are never reused, so
/// withdrawn stakers leave gaps below it.
pub async fn stakers_last_id<C: ContractCaller>(
    caller: &C,
    sfc: &ContractRef,
) -> Result<u64, CallError> {
    let raw = caller.read_contract_state(sfc, "stakersLastID", &[]).await?;
    decode("stakersLastID", raw)
}

pub async fn staker_info<C: ContractCaller>(
    caller: &C,
    sfc: &ContractRef,
    id: StakerId,
) -> Result<StakerInfo, CallError> {
    let raw = caller
        .read_contract_state(sfc, "stakers", &[json!(id.get())])
        .await?;
    decode("stakers", raw)
}

pub async fn delegation_info<C: ContractCaller>(
    caller: &C,
    sfc: &ContractRef,
    delegator: Address,
    id: StakerId,
) -> Result<DelegationInfo, CallError> {
    let raw = caller
        .read_contract_state(sfc, "delegations", &[json!(delegator), json!(id.get())])
        .await?;
    decode("delegations", raw)
}

pub async fn current_sealed_epoch<C: ContractCaller>(
    caller: &C,
    sfc: &ContractRef,
) -> Result<Epoch, CallError> {
    let raw = caller
        .read_contract_state(sfc, "currentSealedEpoch", &[])
        .await?;
    decode("currentSealedEpoch", raw)
}

/// End time of a sealed epoch, in chain seconds.
pub async fn epoch_end_time<C: ContractCaller>(
    caller: &C,
    sfc: &ContractRef,
    epoch: Epoch,
) -> Result<u64, CallError> {
    let raw = caller
        .read_contract_state(sfc, "epochSnapshots", &[json!(epoch.number())])
        .await?;
    let snapshot: EpochSnapshot = decode("epochSnapshots", raw)?;
    Ok(snapshot.end_time)
}

pub async fn lock_periods<C: ContractCaller>(
    caller: &C,
    sfc: &ContractRef,
) -> Result<LockPeriods, CallError> {
    let secs = caller
        .read_contract_state(sfc, "stakeLockPeriodTime", &[])
        .await?;
    let epochs = caller
        .read_contract_state(sfc, "stakeLockPeriodEpochs", &[])
        .await?;
    Ok(LockPeriods {
        epochs: decode("stakeLockPeriodEpochs", epochs)?,
        secs: decode("stakeLockPeriodTime", secs)?,
    })
}

/// Address the proxy currently delegates to.
pub async fn implementation<C: ContractCaller>(
    caller: &C,
    proxy: &ContractRef,
) -> Result<Address, CallError> {
    let raw = caller
        .read_contract_state(proxy, "implementation", &[])
        .await?;
    decode("implementation", raw)
}

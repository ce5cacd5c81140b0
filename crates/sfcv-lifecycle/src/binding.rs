//! Contract bindings before and after the proxy upgrade.
//!
//! The staking contract keeps its address across the upgrade: the proxy
//! stays put and only the implementation behind it changes. What changes for
//! the suite is the ABI it talks through and the view that maps an address
//! to a staker id. Each variant of [`ContractBinding`] carries that lookup as
//! its own capability, so a caller cannot ask an upgraded contract the
//! pre-upgrade question by accident.

use serde::Serialize;
use serde_json::json;

use sfcv_client::{decode, AbiId, CallError, ContractCaller, ContractRef};
use sfcv_core::{Address, StakerId};

/// Where the contract lives and which ABIs address it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingTarget {
    /// Staking contract ABI.
    pub abi: AbiId,
    /// Proxy address the staking contract is reached through.
    pub address: Address,
    /// The proxy itself, for `implementation()` and `upgradeTo`.
    pub proxy: ContractRef,
}

/// The authoritative contract binding. Exactly one is in force at a time;
/// the orchestrator swaps it explicitly after an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "target", rename_all = "camelCase")]
pub enum ContractBinding {
    PreUpgrade(BindingTarget),
    PostUpgrade(BindingTarget),
}

impl ContractBinding {
    /// Bind to the contract as deployed before any upgrade.
    pub fn pre_upgrade(abi: AbiId, address: Address, proxy_abi: AbiId) -> Self {
        Self::PreUpgrade(BindingTarget {
            abi,
            address,
            proxy: ContractRef::new(proxy_abi, address),
        })
    }

    fn target(&self) -> &BindingTarget {
        match self {
            Self::PreUpgrade(t) | Self::PostUpgrade(t) => t,
        }
    }

    /// The staking contract reference calls should target.
    pub fn sfc(&self) -> ContractRef {
        let t = self.target();
        ContractRef::new(t.abi.clone(), t.address)
    }

    pub fn proxy(&self) -> &ContractRef {
        &self.target().proxy
    }

    pub fn abi(&self) -> &AbiId {
        &self.target().abi
    }

    pub fn is_upgraded(&self) -> bool {
        matches!(self, Self::PostUpgrade(_))
    }

    /// The view this binding uses to map an address to a staker id.
    pub fn id_lookup_method(&self) -> &'static str {
        match self {
            Self::PreUpgrade(_) => "sfcAddressToStakerID",
            Self::PostUpgrade(_) => "getStakerID",
        }
    }

    /// Resolve the staker id of `address`. `None` means the contract knows
    /// no staker there.
    pub async fn resolve_staker_id<C: ContractCaller>(
        &self,
        caller: &C,
        address: Address,
    ) -> Result<Option<StakerId>, CallError> {
        let method = self.id_lookup_method();
        let raw = caller
            .read_contract_state(&self.sfc(), method, &[json!(address)])
            .await?;
        let id: u64 = decode(method, raw)?;
        Ok(StakerId::from_raw(id))
    }

    /// The binding to use once the proxy runs the new implementation. Same
    /// address and proxy, new ABI, post-upgrade id lookup.
    pub fn upgraded(&self, new_abi: AbiId) -> Self {
        let t = self.target();
        Self::PostUpgrade(BindingTarget {
            abi: new_abi,
            address: t.address,
            proxy: t.proxy.clone(),
        })
    }
}

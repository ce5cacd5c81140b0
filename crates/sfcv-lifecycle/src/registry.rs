//! # Entity Registry
//!
//! Tracks every staker and delegation a run creates, with the ids the
//! contract derived for them and where each sits in its lifecycle:
//!
//! ```text
//! Created ──claim──▶ RewardsClaimed ──prepare──▶ PreparedToWithdraw ──withdraw──▶ Withdrawn
//! ```
//!
//! Entities are never removed. Withdrawn entities stay queryable so later
//! phases can tell what already happened. Address changes and stake
//! increases keep the staker id.

use std::fmt;

use serde::{Deserialize, Serialize};

use sfcv_core::{Account, Amount, Epoch, StakerId};

use crate::error::RegistryError;

// ── Handles ──────────────────────────────────────────────────────────

/// Opaque reference to a registered staker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StakerHandle(usize);

impl fmt::Display for StakerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "staker#{}", self.0)
    }
}

/// Opaque reference to a registered delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationHandle(usize);

impl fmt::Display for DelegationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delegation#{}", self.0)
    }
}

/// Either kind of handle, for operations common to both entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Staker(StakerHandle),
    Delegation(DelegationHandle),
}

impl From<StakerHandle> for Handle {
    fn from(h: StakerHandle) -> Self {
        Self::Staker(h)
    }
}

impl From<DelegationHandle> for Handle {
    fn from(h: DelegationHandle) -> Self {
        Self::Delegation(h)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staker(h) => fmt::Display::fmt(h, f),
            Self::Delegation(h) => fmt::Display::fmt(h, f),
        }
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────

/// Where an entity sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityPhase {
    Created,
    RewardsClaimed,
    PreparedToWithdraw,
    /// Terminal.
    Withdrawn,
}

impl EntityPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Withdrawn)
    }

    /// The canonical string name of this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::RewardsClaimed => "REWARDS_CLAIMED",
            Self::PreparedToWithdraw => "PREPARED_TO_WITHDRAW",
            Self::Withdrawn => "WITHDRAWN",
        }
    }
}

impl fmt::Display for EntityPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle flags shared by stakers and delegations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Sealed epoch at which rewards were last claimed.
    pub rewards_claimed_at: Option<Epoch>,
    /// Sealed epoch at which withdrawal was prepared.
    pub prepared_at: Option<Epoch>,
    pub withdrawn: bool,
}

impl Progress {
    pub fn phase(&self) -> EntityPhase {
        if self.withdrawn {
            EntityPhase::Withdrawn
        } else if self.prepared_at.is_some() {
            EntityPhase::PreparedToWithdraw
        } else if self.rewards_claimed_at.is_some() {
            EntityPhase::RewardsClaimed
        } else {
            EntityPhase::Created
        }
    }

    pub fn prepared_to_withdraw(&self) -> bool {
        self.prepared_at.is_some()
    }
}

/// A staker created by this run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakerRecord {
    pub handle: StakerHandle,
    /// Account currently bound to the staker id.
    pub account: Account,
    pub amount: Amount,
    pub staker_id: Option<StakerId>,
    #[serde(flatten)]
    pub progress: Progress,
    pub is_cheater: bool,
}

impl StakerRecord {
    pub fn phase(&self) -> EntityPhase {
        self.progress.phase()
    }
}

/// A delegation created by this run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRecord {
    pub handle: DelegationHandle,
    pub delegator: Account,
    pub staker_id: StakerId,
    /// The registered staker the delegation points at, if this run created
    /// it.
    pub staker: Option<StakerHandle>,
    pub amount: Amount,
    #[serde(flatten)]
    pub progress: Progress,
}

impl DelegationRecord {
    pub fn phase(&self) -> EntityPhase {
        self.progress.phase()
    }
}

/// A registered entity of either kind.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Staker(&'a StakerRecord),
    Delegation(&'a DelegationRecord),
}

impl EntityRef<'_> {
    pub fn phase(&self) -> EntityPhase {
        match self {
            Self::Staker(s) => s.phase(),
            Self::Delegation(d) => d.phase(),
        }
    }
}

/// Aggregate counts, captured into run reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub stakers: usize,
    pub active_stakers: usize,
    pub prepared_stakers: usize,
    pub withdrawn_stakers: usize,
    pub delegations: usize,
    pub withdrawn_delegations: usize,
}

// ── Registry ─────────────────────────────────────────────────────────

/// Per-run registry of stakers and delegations.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    stakers: Vec<StakerRecord>,
    delegations: Vec<DelegationRecord>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created staker. Its id is attached separately once
    /// the contract has derived it.
    pub fn register_staker(&mut self, account: Account, amount: Amount) -> StakerHandle {
        let handle = StakerHandle(self.stakers.len());
        self.stakers.push(StakerRecord {
            handle,
            account,
            amount,
            staker_id: None,
            progress: Progress::default(),
            is_cheater: false,
        });
        handle
    }

    /// Register a delegation to `staker_id`. Links it to the registered
    /// staker with that id, if there is one.
    pub fn register_delegation(
        &mut self,
        delegator: Account,
        staker_id: StakerId,
        amount: Amount,
    ) -> DelegationHandle {
        let staker = self
            .stakers
            .iter()
            .find(|s| s.staker_id == Some(staker_id))
            .map(|s| s.handle);
        let handle = DelegationHandle(self.delegations.len());
        self.delegations.push(DelegationRecord {
            handle,
            delegator,
            staker_id,
            staker,
            amount,
            progress: Progress::default(),
        });
        handle
    }

    pub fn staker(&self, handle: StakerHandle) -> Result<&StakerRecord, RegistryError> {
        self.stakers
            .get(handle.0)
            .ok_or_else(|| RegistryError::UnknownHandle(handle.to_string()))
    }

    pub fn delegation(&self, handle: DelegationHandle) -> Result<&DelegationRecord, RegistryError> {
        self.delegations
            .get(handle.0)
            .ok_or_else(|| RegistryError::UnknownHandle(handle.to_string()))
    }

    fn staker_mut(&mut self, handle: StakerHandle) -> Result<&mut StakerRecord, RegistryError> {
        self.stakers
            .get_mut(handle.0)
            .ok_or_else(|| RegistryError::UnknownHandle(handle.to_string()))
    }

    fn delegation_mut(
        &mut self,
        handle: DelegationHandle,
    ) -> Result<&mut DelegationRecord, RegistryError> {
        self.delegations
            .get_mut(handle.0)
            .ok_or_else(|| RegistryError::UnknownHandle(handle.to_string()))
    }

    fn progress_mut(&mut self, handle: Handle) -> Result<&mut Progress, RegistryError> {
        match handle {
            Handle::Staker(h) => self.staker_mut(h).map(|s| &mut s.progress),
            Handle::Delegation(h) => self.delegation_mut(h).map(|d| &mut d.progress),
        }
    }

    /// Look up any entity.
    pub fn find(&self, handle: impl Into<Handle>) -> Result<EntityRef<'_>, RegistryError> {
        match handle.into() {
            Handle::Staker(h) => self.staker(h).map(EntityRef::Staker),
            Handle::Delegation(h) => self.delegation(h).map(EntityRef::Delegation),
        }
    }

    /// Attach the contract-derived id to a staker and its account.
    pub fn attach_id(&mut self, handle: StakerHandle, id: StakerId) -> Result<(), RegistryError> {
        let record = self.staker_mut(handle)?;
        record.staker_id = Some(id);
        record.account.attach_staker_id(id);
        Ok(())
    }

    pub fn mark_rewards_claimed(
        &mut self,
        handle: impl Into<Handle>,
        epoch: Epoch,
    ) -> Result<(), RegistryError> {
        let handle = handle.into();
        let progress = self.progress_mut(handle)?;
        if progress.withdrawn {
            return Err(RegistryError::InvalidTransition {
                handle: handle.to_string(),
                from: EntityPhase::Withdrawn,
                to: EntityPhase::RewardsClaimed,
            });
        }
        progress.rewards_claimed_at = Some(epoch);
        Ok(())
    }

    /// Record that withdrawal was prepared at `epoch`. Requires claimed
    /// rewards.
    pub fn mark_prepared(
        &mut self,
        handle: impl Into<Handle>,
        epoch: Epoch,
    ) -> Result<(), RegistryError> {
        let handle = handle.into();
        let progress = self.progress_mut(handle)?;
        let from = progress.phase();
        if from != EntityPhase::RewardsClaimed {
            return Err(RegistryError::InvalidTransition {
                handle: handle.to_string(),
                from,
                to: EntityPhase::PreparedToWithdraw,
            });
        }
        progress.prepared_at = Some(epoch);
        Ok(())
    }

    /// Record a completed withdrawal. Requires a prepared entity, except for
    /// stakers marked as cheaters, which are punished from any live phase.
    pub fn mark_withdrawn(&mut self, handle: impl Into<Handle>) -> Result<(), RegistryError> {
        let handle = handle.into();
        let cheater = match handle {
            Handle::Staker(h) => self.staker(h)?.is_cheater,
            Handle::Delegation(_) => false,
        };
        let progress = self.progress_mut(handle)?;
        let from = progress.phase();
        let allowed = match from {
            EntityPhase::PreparedToWithdraw => true,
            EntityPhase::Withdrawn => false,
            _ => cheater,
        };
        if !allowed {
            return Err(RegistryError::InvalidTransition {
                handle: handle.to_string(),
                from,
                to: EntityPhase::Withdrawn,
            });
        }
        progress.withdrawn = true;
        Ok(())
    }

    pub fn mark_cheater(&mut self, handle: StakerHandle) -> Result<(), RegistryError> {
        self.staker_mut(handle)?.is_cheater = true;
        Ok(())
    }

    /// Rebind a staker to a new account. The staker id carries over.
    pub fn replace_address(
        &mut self,
        handle: StakerHandle,
        mut account: Account,
    ) -> Result<(), RegistryError> {
        let record = self.staker_mut(handle)?;
        if let Some(id) = record.staker_id {
            account.attach_staker_id(id);
        }
        record.account = account;
        Ok(())
    }

    /// Add `delta` to a staker's recorded stake.
    pub fn add_stake(&mut self, handle: StakerHandle, delta: Amount) -> Result<(), RegistryError> {
        let record = self.staker_mut(handle)?;
        record.amount = record.amount.checked_add(delta).unwrap_or(record.amount);
        Ok(())
    }

    pub fn stakers(&self) -> impl Iterator<Item = &StakerRecord> {
        self.stakers.iter()
    }

    pub fn delegations(&self) -> impl Iterator<Item = &DelegationRecord> {
        self.delegations.iter()
    }

    /// Stakers that have not withdrawn.
    pub fn active_stakers(&self) -> Vec<StakerHandle> {
        self.stakers
            .iter()
            .filter(|s| !s.progress.withdrawn)
            .map(|s| s.handle)
            .collect()
    }

    pub fn withdrawn_stakers(&self) -> Vec<StakerHandle> {
        self.stakers
            .iter()
            .filter(|s| s.progress.withdrawn)
            .map(|s| s.handle)
            .collect()
    }

    /// Stakers that are neither prepared nor withdrawn.
    pub fn not_prepared_stakers(&self) -> Vec<StakerHandle> {
        self.stakers
            .iter()
            .filter(|s| !s.progress.withdrawn && !s.progress.prepared_to_withdraw())
            .map(|s| s.handle)
            .collect()
    }

    /// Stakers prepared to withdraw but not yet withdrawn.
    pub fn prepared_stakers(&self) -> Vec<StakerHandle> {
        self.stakers
            .iter()
            .filter(|s| s.phase() == EntityPhase::PreparedToWithdraw)
            .map(|s| s.handle)
            .collect()
    }

    /// Delegations prepared to withdraw but not yet withdrawn.
    pub fn prepared_delegations(&self) -> Vec<DelegationHandle> {
        self.delegations
            .iter()
            .filter(|d| d.phase() == EntityPhase::PreparedToWithdraw)
            .map(|d| d.handle)
            .collect()
    }

    /// Delegations pointing at a registered staker.
    pub fn delegations_of(&self, staker: StakerHandle) -> Vec<DelegationHandle> {
        self.delegations
            .iter()
            .filter(|d| d.staker == Some(staker))
            .map(|d| d.handle)
            .collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            stakers: self.stakers.len(),
            active_stakers: self.active_stakers().len(),
            prepared_stakers: self.prepared_stakers().len(),
            withdrawn_stakers: self.withdrawn_stakers().len(),
            delegations: self.delegations.len(),
            withdrawn_delegations: self
                .delegations
                .iter()
                .filter(|d| d.progress.withdrawn)
                .count(),
        }
    }
}

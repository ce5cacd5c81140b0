//! # Scenario Orchestrator
//!
//! Runs a scenario as the ordered phases
//!
//! ```text
//! BEFORE_UPGRADE ──▶ UPGRADE ──▶ AFTER_UPGRADE ──▶ FINAL
//! ```
//!
//! threading one [`ScenarioState`] through them. Transitions are
//! unconditional: each phase runs when the previous one completed. The first
//! failing phase aborts the run and every later phase is reported as
//! skipped. A [`RunReport`] is always returned, with per-phase status and
//! an entity snapshot taken when each phase ended.
//!
//! ## Scenarios
//!
//! | Scenario | Phases run |
//! |---|---|
//! | [`Scenario::Full`] | all four |
//! | [`Scenario::Basic`] | all four, with the two-staker sequence |
//! | [`Scenario::BeforeUpgrade`] | BEFORE_UPGRADE only |
//! | [`Scenario::UpgradeOnly`] | UPGRADE only |
//!
//! FINAL is a no-op placeholder.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use sfcv_client::ContractCaller;
use sfcv_core::Account;

use crate::binding::ContractBinding;
use crate::config::SuiteConfig;
use crate::error::{ensure, LifecycleError};
use crate::ops::Operations;
use crate::registry::RegistrySnapshot;
use crate::state::{Notice, ScenarioState};
use crate::txlog::TxLog;
use crate::upgrade::{MigrationOutcome, StorageMigrator, UpgradeCoordinator, UpgradeOutcome};

// ── Phases ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    BeforeUpgrade,
    Upgrade,
    AfterUpgrade,
    Final,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Phase; 4] = [
        Phase::BeforeUpgrade,
        Phase::Upgrade,
        Phase::AfterUpgrade,
        Phase::Final,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeUpgrade => "BEFORE_UPGRADE",
            Self::Upgrade => "UPGRADE",
            Self::AfterUpgrade => "AFTER_UPGRADE",
            Self::Final => "FINAL",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Completed,
    Failed,
    /// Not part of the scenario, or not reached after an earlier failure.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Registry counts when the phase ended.
    pub entities: RegistrySnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Scenarios ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Stakers and delegations prepared before the upgrade, withdrawn and
    /// exercised after it.
    Full,
    /// Two stakers: one withdrawn before the upgrade, one after.
    Basic,
    /// The before-upgrade half of [`Scenario::Basic`], with no upgrade.
    BeforeUpgrade,
    /// Deploy, upgrade, and migrate storage only.
    UpgradeOnly,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Basic => "basic",
            Self::BeforeUpgrade => "before-upgrade",
            Self::UpgradeOnly => "upgrade-only",
        }
    }

    /// Whether this scenario runs `phase`.
    pub fn includes(&self, phase: Phase) -> bool {
        match self {
            Self::Full | Self::Basic => true,
            Self::BeforeUpgrade => phase == Phase::BeforeUpgrade,
            Self::UpgradeOnly => phase == Phase::Upgrade,
        }
    }

    /// Whether this scenario needs implementation bytecode.
    pub fn needs_bytecode(&self) -> bool {
        self.includes(Phase::Upgrade)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Report ───────────────────────────────────────────────────────────

/// Outcome of one run. Produced even when a phase aborts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub scenario: Scenario,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseOutcome>,
    /// Binding in force when the run ended.
    pub binding: ContractBinding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_stakers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<UpgradeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationOutcome>,
    pub notices: Vec<Notice>,
    pub transactions: TxLog,
    pub success: bool,
}

impl RunReport {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// The first failed phase, if any.
    pub fn failure(&self) -> Option<&PhaseOutcome> {
        self.phases
            .iter()
            .find(|p| p.status == PhaseStatus::Failed)
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────

pub struct Orchestrator<'a, C> {
    caller: &'a C,
    config: &'a SuiteConfig,
    payer: Account,
    bytecode: Option<Vec<u8>>,
}

impl<'a, C: ContractCaller> Orchestrator<'a, C> {
    pub fn new(caller: &'a C, config: &'a SuiteConfig, payer: Account) -> Self {
        Self {
            caller,
            config,
            payer,
            bytecode: None,
        }
    }

    /// Bytecode deployed by the upgrade phase.
    pub fn with_bytecode(mut self, bytecode: Vec<u8>) -> Self {
        self.bytecode = Some(bytecode);
        self
    }

    /// The binding a run starts from.
    pub fn initial_binding(&self) -> ContractBinding {
        let contract = &self.config.contract;
        ContractBinding::pre_upgrade(
            contract.abi.clone(),
            contract.address,
            contract.proxy_abi.clone(),
        )
    }

    fn ops(&self) -> Operations<'_, C> {
        Operations::new(self.caller, &self.payer, self.config)
    }

    /// Run `scenario` from a fresh state.
    pub async fn run(&self, scenario: Scenario) -> RunReport {
        self.run_with(scenario, ScenarioState::new(self.initial_binding()))
            .await
    }

    /// Run `scenario` from `state`.
    pub async fn run_with(&self, scenario: Scenario, state: ScenarioState) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, scenario = scenario.as_str());
        self.execute(run_id, scenario, state).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        scenario: Scenario,
        mut state: ScenarioState,
    ) -> RunReport {
        let started_at = Utc::now();
        tracing::info!("run started");

        let mut phases = Vec::with_capacity(Phase::ALL.len());
        let mut aborted = false;
        for phase in Phase::ALL {
            if aborted || !scenario.includes(phase) {
                phases.push(PhaseOutcome {
                    phase,
                    status: PhaseStatus::Skipped,
                    started_at: None,
                    finished_at: None,
                    entities: state.registry.snapshot(),
                    error: None,
                });
                continue;
            }

            let phase_started = Utc::now();
            tracing::info!(%phase, "phase started");
            let result = self.run_phase(scenario, phase, &mut state).await;
            let (status, error) = match result {
                Ok(()) => {
                    tracing::info!(%phase, "phase completed");
                    (PhaseStatus::Completed, None)
                }
                Err(e) => {
                    tracing::error!(%phase, error = %e, "phase failed");
                    aborted = true;
                    (PhaseStatus::Failed, Some(e.to_string()))
                }
            };
            phases.push(PhaseOutcome {
                phase,
                status,
                started_at: Some(phase_started),
                finished_at: Some(Utc::now()),
                entities: state.registry.snapshot(),
                error,
            });
        }

        let success = !aborted;
        tracing::info!(success, transactions = state.log.len(), "run finished");
        RunReport {
            run_id,
            scenario,
            started_at,
            finished_at: Utc::now(),
            phases,
            binding: state.binding,
            baseline_stakers: state.baseline_stakers,
            upgrade: state.upgrade,
            migration: state.migration,
            notices: state.notices,
            transactions: state.log,
            success,
        }
    }

    async fn run_phase(
        &self,
        scenario: Scenario,
        phase: Phase,
        state: &mut ScenarioState,
    ) -> Result<(), LifecycleError> {
        match (phase, scenario) {
            (Phase::BeforeUpgrade, Scenario::Full) => self.full_before_upgrade(state).await,
            (Phase::BeforeUpgrade, Scenario::Basic) => self.basic_before_upgrade(state).await,
            (Phase::BeforeUpgrade, _) => self.before_upgrade_only(state).await,
            (Phase::Upgrade, _) => self.upgrade(state).await,
            (Phase::AfterUpgrade, Scenario::Basic) => self.basic_after_upgrade(state).await,
            (Phase::AfterUpgrade, _) => self.full_after_upgrade(state).await,
            (Phase::Final, _) => Ok(()),
        }
    }

    async fn record_baseline(&self, state: &mut ScenarioState) -> Result<u64, LifecycleError> {
        let baseline = self.ops().stakers_num(state).await?;
        state.baseline_stakers = Some(baseline);
        tracing::info!(baseline, "stakers at start");
        Ok(baseline)
    }

    /// Require the contract's staker count to equal the baseline plus the
    /// stakers this run still has active.
    async fn check_stakers_count(&self, state: &ScenarioState) -> Result<(), LifecycleError> {
        let Some(baseline) = state.baseline_stakers else {
            return Ok(());
        };
        let active = state.registry.active_stakers().len() as u64;
        let actual = self.ops().stakers_num(state).await?;
        ensure(actual == baseline + active, || {
            format!("stakers count is {actual}, expected {baseline} + {active} active")
        })
    }

    // ── BEFORE_UPGRADE ───────────────────────────────────────────────

    async fn full_before_upgrade(&self, state: &mut ScenarioState) -> Result<(), LifecycleError> {
        let ops = self.ops();
        let sizes = &self.config.scenario;
        self.record_baseline(state).await?;

        ops.create_stakes_and_prepare_to_withdraw(state, sizes.stakers, sizes.stakers_to_prepare)
            .await?;

        // Delegating to a deactivated staker is refused, so delegations go
        // to the stakers that stay active.
        let targets = state.registry.not_prepared_stakers();
        ops.create_delegations(state, &targets, sizes.delegations_per_staker)
            .await?;
        ops.prepare_to_withdraw_delegations(state, &targets, sizes.delegations_per_staker)
            .await?;
        self.check_stakers_count(state).await
    }

    async fn basic_before_upgrade(&self, state: &mut ScenarioState) -> Result<(), LifecycleError> {
        let ops = self.ops();
        self.record_baseline(state).await?;
        let stakers = ops.create_stakes(state, 2).await?;

        match ops.create_and_withdraw_delegation(state, stakers[0]).await {
            Ok(_) => {}
            Err(e) if e.as_incompatible().is_some() => {
                state.notice("createAndWithdrawDelegation", &e);
            }
            Err(e) => return Err(e),
        }

        for &h in &stakers {
            ops.claim_validator_rewards(state, h).await?;
        }
        ops.advance_epochs(state, 1).await?;
        for &h in &stakers {
            ops.prepare_to_withdraw_stake(state, h).await?;
        }

        ops.advance_epochs(state, self.config.scenario.post_prepare_epochs)
            .await?;
        ops.withdraw_stake_when_unlocked(state, stakers[1]).await?;
        self.check_stakers_count(state).await
    }

    async fn before_upgrade_only(&self, state: &mut ScenarioState) -> Result<(), LifecycleError> {
        let ops = self.ops();
        self.record_baseline(state).await?;
        let stakers = ops.create_stakes(state, 2).await?;
        ops.create_and_withdraw_delegation(state, stakers[0]).await?;
        for &h in &stakers {
            ops.collect_rewards_and_prepare_withdraw_stake(state, h)
                .await?;
        }
        ops.advance_epochs(state, self.config.scenario.post_prepare_epochs)
            .await?;
        ops.withdraw_stake_when_unlocked(state, stakers[0]).await?;
        self.check_stakers_count(state).await
    }

    // ── UPGRADE ──────────────────────────────────────────────────────

    async fn upgrade(&self, state: &mut ScenarioState) -> Result<(), LifecycleError> {
        let bytecode = self
            .bytecode
            .as_deref()
            .ok_or_else(|| LifecycleError::AssertionFailed("no implementation bytecode".into()))?;

        let coordinator = UpgradeCoordinator::new(self.caller, self.config.upgrade.lookback_blocks);
        let outcome = coordinator
            .upgrade(&state.binding, &self.payer, bytecode, &mut state.log)
            .await?;
        state.upgrade = Some(outcome);
        state.binding = state
            .binding
            .upgraded(self.config.contract.upgraded_abi.clone());
        tracing::info!(abi = %state.binding.abi(), "rebound to upgraded contract");

        let migration = StorageMigrator::new(self.caller)
            .migrate(&state.binding, &self.payer, &mut state.log)
            .await?;
        if let MigrationOutcome::Skipped { method, abi } = &migration {
            state.notice("upgradeStakerStorage", format!("{method} not available on {abi}"));
        }
        state.migration = Some(migration);
        Ok(())
    }

    // ── AFTER_UPGRADE ────────────────────────────────────────────────

    /// Withdraw everything prepared before the upgrade under the new
    /// binding, then exercise the post-upgrade methods on the stakers that
    /// stayed active.
    async fn full_after_upgrade(&self, state: &mut ScenarioState) -> Result<(), LifecycleError> {
        let ops = self.ops();

        for d in state.registry.prepared_delegations() {
            ops.withdraw_delegation_when_unlocked(state, d).await?;
        }
        for s in state.registry.prepared_stakers() {
            ops.withdraw_stake_when_unlocked(state, s).await?;
        }
        self.check_stakers_count(state).await?;

        let active = state.registry.not_prepared_stakers();
        for &s in &active {
            // Same id under the post-upgrade lookup.
            ops.resolve_id(state, s).await?;
            ops.test_increase_stake(state, s).await?;
            ops.test_change_staker_address(state, s).await?;
        }

        if self.config.scenario.punish_cheater {
            if let Some(&cheater) = active.last() {
                ops.mark_staker_as_cheater_and_punish(state, cheater).await?;
            }
        }
        self.check_stakers_count(state).await
    }

    async fn basic_after_upgrade(&self, state: &mut ScenarioState) -> Result<(), LifecycleError> {
        let ops = self.ops();
        for s in state.registry.prepared_stakers() {
            ops.withdraw_stake_when_unlocked(state, s).await?;
        }
        self.check_stakers_count(state).await
    }
}

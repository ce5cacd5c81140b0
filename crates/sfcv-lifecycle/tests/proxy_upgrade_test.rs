//! Proxy upgrade, storage migration, and the post-upgrade operations.
//!
//! The deployment-identification failures are driven through a wrapper
//! collaborator that tampers with one answer of the in-memory chain.

use serde_json::Value;
use sfcv_client::{AbiId, CallError, ContractCaller, ContractRef, Receipt};
use sfcv_core::{Account, Amount, TxHash};
use sfcv_lifecycle::{
    AdvancePolicy, ContractBinding, EntityPhase, MigrationOutcome, Operations, PreconditionError,
    ScenarioState, StorageMigrator, SuiteConfig, TxLog, UpgradeCoordinator, UpgradeError,
    WaitPolicy,
};
use sfcv_stub::{ContractVersion, SimulatedChain, SFC_V1_BYTECODE, SFC_V2_BYTECODE};

fn fast_config() -> SuiteConfig {
    SuiteConfig {
        advancer: AdvancePolicy {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        waiter: WaitPolicy {
            poll_interval_ms: 1,
            max_wait_secs: 10,
            advance_epochs: true,
        },
        ..SuiteConfig::default()
    }
}

fn fresh_state(config: &SuiteConfig) -> ScenarioState {
    let contract = &config.contract;
    ScenarioState::new(ContractBinding::pre_upgrade(
        contract.abi.clone(),
        contract.address,
        contract.proxy_abi.clone(),
    ))
}

/// Upgrade to `bytecode` and rebind `state` to the upgraded ABI.
async fn upgrade<C: ContractCaller>(
    caller: &C,
    payer: &Account,
    state: &mut ScenarioState,
    bytecode: &[u8],
) -> Result<(), UpgradeError> {
    UpgradeCoordinator::new(caller, 100)
        .upgrade(&state.binding, payer, bytecode, &mut state.log)
        .await?;
    state.binding = state.binding.upgraded(AbiId::new("sfc-v2"));
    Ok(())
}

// ── Coordinator ──────────────────────────────────────────────────────

#[tokio::test]
async fn upgrade_swaps_implementation_and_keeps_ids() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let handles = ops.create_stakes(&mut state, 2).await.unwrap();
    let before = chain.implementation();

    let outcome = UpgradeCoordinator::new(&chain, 100)
        .upgrade(&state.binding, &payer, SFC_V2_BYTECODE, &mut state.log)
        .await
        .unwrap();
    assert_eq!(outcome.previous_implementation, before);
    assert_eq!(outcome.new_implementation, chain.implementation());
    assert_ne!(outcome.new_implementation, before);
    assert_eq!(chain.running_version(), ContractVersion::V2);
    assert_eq!(state.log.last_for("deploy").unwrap().hash, outcome.deploy_tx);
    assert_eq!(state.log.last().unwrap().hash, outcome.upgrade_tx);

    // The pre-upgrade lookup is gone.
    let err = ops.resolve_id(&state, handles[0]).await.unwrap_err();
    assert!(err.as_incompatible().is_some());

    state.binding = state.binding.upgraded(AbiId::new("sfc-v2"));
    assert_eq!(state.binding.id_lookup_method(), "getStakerID");
    for h in handles {
        let recorded = state.registry.staker(h).unwrap().staker_id.unwrap();
        assert_eq!(ops.resolve_id(&state, h).await.unwrap(), recorded);
    }
    assert_eq!(ops.stakers_num(&state).await.unwrap(), 2);
}

#[tokio::test]
async fn no_candidate_in_lookback_fails() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let mut log = TxLog::new();
    let binding = fresh_state(&fast_config()).binding;
    let before = chain.implementation();

    let err = UpgradeCoordinator::new(&chain, 0)
        .upgrade(&binding, &payer, SFC_V2_BYTECODE, &mut log)
        .await
        .unwrap_err();
    assert!(matches!(err, UpgradeError::NoCandidate { lookback: 0 }));
    assert_eq!(chain.implementation(), before);
}

#[tokio::test]
async fn ambiguous_candidates_fail() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let mut log = TxLog::new();
    let binding = fresh_state(&fast_config()).binding;
    let before = chain.implementation();

    // A deployment this run did not make.
    chain.deploy(&payer, SFC_V2_BYTECODE).unwrap();

    let err = UpgradeCoordinator::new(&chain, 100)
        .upgrade(&binding, &payer, SFC_V2_BYTECODE, &mut log)
        .await
        .unwrap_err();
    assert!(matches!(err, UpgradeError::AmbiguousCandidates(2)));
    assert_eq!(chain.implementation(), before);
    assert_eq!(chain.running_version(), ContractVersion::V1);
}

#[derive(Clone, Copy)]
enum Tamper {
    /// Report only a foreign creation transaction.
    ForeignCandidate,
    /// Know no receipts.
    NoReceipt,
    /// Strip the created address from receipts.
    NoContractAddress,
    /// Mark every receipt as failed.
    FailedStatus,
}

struct TamperedChain {
    chain: SimulatedChain,
    tamper: Tamper,
    foreign: TxHash,
}

impl ContractCaller for TamperedChain {
    async fn submit_contract_call(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
        sender: &Account,
        value: Option<Amount>,
    ) -> Result<TxHash, CallError> {
        self.chain
            .submit_contract_call(contract, method, args, sender, value)
            .await
    }

    async fn read_contract_state(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        self.chain.read_contract_state(contract, method, args).await
    }

    async fn get_transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, CallError> {
        let receipt = self.chain.get_transaction_receipt(hash).await?;
        Ok(match self.tamper {
            Tamper::NoReceipt => None,
            Tamper::NoContractAddress => receipt.map(|r| Receipt {
                contract_address: None,
                ..r
            }),
            Tamper::FailedStatus => receipt.map(|r| Receipt { status: false, ..r }),
            Tamper::ForeignCandidate => receipt,
        })
    }

    async fn most_recent_transactions(&self, depth: u64) -> Result<Vec<TxHash>, CallError> {
        match self.tamper {
            Tamper::ForeignCandidate => Ok(vec![self.foreign]),
            _ => self.chain.most_recent_transactions(depth).await,
        }
    }

    async fn fund_account(&self, payer: &Account, amount: Amount) -> Result<Account, CallError> {
        self.chain.fund_account(payer, amount).await
    }

    async fn deploy_contract(&self, sender: &Account, bytecode: &[u8]) -> Result<TxHash, CallError> {
        self.chain.deploy_contract(sender, bytecode).await
    }
}

async fn tampered_upgrade(tamper: Tamper) -> (UpgradeError, SimulatedChain, TxLog) {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let caller = TamperedChain {
        chain: chain.clone(),
        tamper,
        foreign: TxHash::from_bytes([0xee; 32]),
    };
    let mut log = TxLog::new();
    let binding = fresh_state(&fast_config()).binding;
    let err = UpgradeCoordinator::new(&caller, 100)
        .upgrade(&binding, &payer, SFC_V2_BYTECODE, &mut log)
        .await
        .unwrap_err();
    (err, chain, log)
}

#[tokio::test]
async fn foreign_candidate_is_not_our_deployment() {
    let (err, chain, log) = tampered_upgrade(Tamper::ForeignCandidate).await;
    match err {
        UpgradeError::UnknownDeployment { expected, found } => {
            assert_eq!(expected, log.last_for("deploy").unwrap().hash);
            assert_eq!(found, TxHash::from_bytes([0xee; 32]));
        }
        other => panic!("expected UnknownDeployment, got {other}"),
    }
    assert_eq!(chain.running_version(), ContractVersion::V1);
}

#[tokio::test]
async fn missing_receipt_fails() {
    let (err, chain, _) = tampered_upgrade(Tamper::NoReceipt).await;
    assert!(matches!(err, UpgradeError::MissingReceipt(_)));
    assert_eq!(chain.running_version(), ContractVersion::V1);
}

#[tokio::test]
async fn receipt_without_address_fails() {
    let (err, _, _) = tampered_upgrade(Tamper::NoContractAddress).await;
    assert!(matches!(err, UpgradeError::MissingContractAddress(_)));
}

#[tokio::test]
async fn failed_deployment_is_not_installed() {
    let (err, chain, _) = tampered_upgrade(Tamper::FailedStatus).await;
    assert!(matches!(err, UpgradeError::DeploymentFailed(_)));
    assert_eq!(chain.running_version(), ContractVersion::V1);
}

#[tokio::test]
async fn unrecognized_bytecode_surfaces_the_call_error() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let mut log = TxLog::new();
    let binding = fresh_state(&fast_config()).binding;
    let err = UpgradeCoordinator::new(&chain, 100)
        .upgrade(&binding, &payer, b"\x60\x80\x60\x40", &mut log)
        .await
        .unwrap_err();
    assert!(matches!(err, UpgradeError::Call(ref e) if e.is_revert()));
    assert!(log.is_empty());
}

// ── Storage migration ────────────────────────────────────────────────

#[tokio::test]
async fn migration_covers_every_staker() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let handles = ops.create_stakes(&mut state, 3).await.unwrap();
    upgrade(&chain, &payer, &mut state, SFC_V2_BYTECODE)
        .await
        .unwrap();

    let outcome = StorageMigrator::new(&chain)
        .migrate(&state.binding, &payer, &mut state.log)
        .await
        .unwrap();
    assert_eq!(outcome, MigrationOutcome::Migrated { last_id: 3 });
    for h in handles {
        let id = state.registry.staker(h).unwrap().staker_id.unwrap();
        assert!(chain.storage_upgraded(id.get()));
    }
}

#[tokio::test]
async fn migration_reaches_ids_above_the_active_count() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let handles = ops.create_stakes(&mut state, 2).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, handles[0])
        .await
        .unwrap();
    ops.withdraw_stake_when_unlocked(&mut state, handles[0])
        .await
        .unwrap();
    assert_eq!(chain.active_stakers(), 1);

    upgrade(&chain, &payer, &mut state, SFC_V2_BYTECODE)
        .await
        .unwrap();
    let outcome = StorageMigrator::new(&chain)
        .migrate(&state.binding, &payer, &mut state.log)
        .await
        .unwrap();

    assert_eq!(outcome, MigrationOutcome::Migrated { last_id: 2 });
    let survivor = state.registry.staker(handles[1]).unwrap().staker_id.unwrap();
    assert_eq!(survivor.get(), 2);
    assert!(chain.storage_upgraded(survivor.get()));
}

#[tokio::test]
async fn migration_is_skipped_when_the_implementation_lacks_it() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    ops.create_stakes(&mut state, 1).await.unwrap();
    // Re-installing the pre-upgrade implementation leaves no migration entry.
    upgrade(&chain, &payer, &mut state, SFC_V1_BYTECODE)
        .await
        .unwrap();

    let outcome = StorageMigrator::new(&chain)
        .migrate(&state.binding, &payer, &mut state.log)
        .await
        .unwrap();
    match outcome {
        MigrationOutcome::Skipped { method, abi } => {
            assert_eq!(method, "upgradeStakerStorage");
            assert_eq!(abi, "sfc-v1");
        }
        other => panic!("expected Skipped, got {other:?}"),
    }
    assert!(!chain.storage_upgraded(1));
}

// ── Post-upgrade operations ──────────────────────────────────────────

#[tokio::test]
async fn stake_prepared_before_upgrade_withdraws_after() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, h)
        .await
        .unwrap();
    upgrade(&chain, &payer, &mut state, SFC_V2_BYTECODE)
        .await
        .unwrap();

    ops.withdraw_stake_when_unlocked(&mut state, h).await.unwrap();
    assert_eq!(state.registry.staker(h).unwrap().phase(), EntityPhase::Withdrawn);
    assert_eq!(chain.active_stakers(), 0);
}

#[tokio::test]
async fn increase_stake_adds_exactly_the_delta() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    upgrade(&chain, &payer, &mut state, SFC_V2_BYTECODE)
        .await
        .unwrap();

    ops.increase_stake(&mut state, h, Amount::new(2)).await.unwrap();
    let expected = Amount::new(3_175_002);
    assert_eq!(ops.staker_info(&state, h).await.unwrap().stake_amount, expected);
    assert_eq!(state.registry.staker(h).unwrap().amount, expected);
}

#[tokio::test]
async fn address_round_trip_keeps_the_id() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    let original = state.registry.staker(h).unwrap().account.address;
    upgrade(&chain, &payer, &mut state, SFC_V2_BYTECODE)
        .await
        .unwrap();
    let id = ops.resolve_id(&state, h).await.unwrap();

    ops.test_change_staker_address(&mut state, h).await.unwrap();

    assert_eq!(state.registry.staker(h).unwrap().account.address, original);
    assert_eq!(ops.resolve_id(&state, h).await.unwrap(), id);
    assert_eq!(ops.staker_info(&state, h).await.unwrap().sfc_address, original);
    assert_eq!(
        state
            .log
            .records()
            .iter()
            .filter(|r| r.operation == "updateStakerSfcAddress")
            .count(),
        2
    );
}

#[tokio::test]
async fn moving_to_a_new_account_rebinds_the_registry() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    upgrade(&chain, &payer, &mut state, SFC_V2_BYTECODE)
        .await
        .unwrap();
    let id = ops.resolve_id(&state, h).await.unwrap();

    let target = chain.fund(&payer, Amount::new(1_000)).unwrap();
    let new_address = target.address;
    ops.update_staker_sfc_address(&mut state, h, target)
        .await
        .unwrap();
    assert_eq!(state.registry.staker(h).unwrap().account.address, new_address);
    assert_eq!(ops.resolve_id(&state, h).await.unwrap(), id);
}

#[tokio::test]
async fn cheater_is_punished_without_lock() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let handles = ops.create_stakes(&mut state, 2).await.unwrap();
    upgrade(&chain, &payer, &mut state, SFC_V2_BYTECODE)
        .await
        .unwrap();

    let err = ops.punish(&mut state, handles[0]).await.unwrap_err();
    assert_eq!(err.precondition(), Some(&PreconditionError::NotACheater));

    let epoch = ops.current_sealed_epoch(&state).await.unwrap();
    ops.mark_staker_as_cheater_and_punish(&mut state, handles[0])
        .await
        .unwrap();
    assert_eq!(ops.current_sealed_epoch(&state).await.unwrap(), epoch);

    let record = state.registry.staker(handles[0]).unwrap();
    assert!(record.is_cheater);
    assert_eq!(record.phase(), EntityPhase::Withdrawn);
    assert_eq!(chain.active_stakers(), 1);
    assert_eq!(state.registry.active_stakers(), vec![handles[1]]);
}

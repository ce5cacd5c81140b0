//! Lifecycle operations against the in-memory chain, before any upgrade.
//!
//! Covers staker and delegation creation, client-side preconditions,
//! withdrawal locks, epoch advancement with retry, and lock timeouts.

use serde_json::Value;
use sfcv_client::{CallError, ContractCaller, ContractRef, Receipt};
use sfcv_core::{Account, Amount, TxHash};
use sfcv_lifecycle::{
    AdvancePolicy, EntityPhase, EpochAdvancer, LifecycleError, Operations, PreconditionError,
    ScenarioState, SuiteConfig, WaitPolicy,
};
use sfcv_stub::{ContractParams, SimulatedChain, StubConfig};

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
    ScenarioState::new(sfcv_lifecycle::ContractBinding::pre_upgrade(
        contract.abi.clone(),
        contract.address,
        contract.proxy_abi.clone(),
    ))
}

// ── Creation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn creating_stakers_grows_count_and_assigns_ids() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let before = ops.stakers_num(&state).await.unwrap();
    let handles = ops.create_stakes(&mut state, 3).await.unwrap();
    let after = ops.stakers_num(&state).await.unwrap();

    assert_eq!(after, before + 3);
    let mut ids = Vec::new();
    for h in &handles {
        let record = state.registry.staker(*h).unwrap();
        let id = record.staker_id.expect("id attached at creation");
        assert!(id.get() > 0);
        assert_eq!(record.phase(), EntityPhase::Created);
        assert_eq!(ops.resolve_id(&state, *h).await.unwrap(), id);
        ids.push(id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "ids must be distinct");
    assert_eq!(
        state
            .log
            .records()
            .iter()
            .filter(|r| r.operation == "createStake")
            .count(),
        3
    );
}

#[tokio::test]
async fn staker_info_reflects_the_stake() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    let info = ops.staker_info(&state, h).await.unwrap();
    let record = state.registry.staker(h).unwrap();
    assert_eq!(info.stake_amount, config.amounts.stake);
    assert_eq!(info.sfc_address, record.account.address);
    assert!(!info.is_deactivated());
    assert!(!info.is_cheater);
}

#[tokio::test]
async fn delegation_links_to_the_staker_id() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let staker = ops.create_stake(&mut state).await.unwrap();
    let d = ops.create_delegation(&mut state, staker).await.unwrap();

    let record = state.registry.delegation(d).unwrap();
    assert_eq!(record.staker, Some(staker));
    assert_eq!(
        Some(record.staker_id),
        state.registry.staker(staker).unwrap().staker_id
    );
    assert_eq!(state.registry.delegations_of(staker), vec![d]);

    let info = ops.delegation_info(&state, d).await.unwrap();
    assert_eq!(info.amount, config.amounts.delegation);
    assert!(!info.is_deactivated());
}

// ── Preconditions ────────────────────────────────────────────────────

#[tokio::test]
async fn prepare_before_claim_is_rejected_without_submitting() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    let logged = state.log.len();
    let blocks = chain.block_number();

    let err = ops.prepare_to_withdraw_stake(&mut state, h).await.unwrap_err();
    assert_eq!(err.precondition(), Some(&PreconditionError::RewardsNotClaimed));
    assert_eq!(state.registry.staker(h).unwrap().phase(), EntityPhase::Created);
    assert_eq!(state.log.len(), logged);
    assert_eq!(chain.block_number(), blocks);
}

#[tokio::test]
async fn prepare_in_the_claim_epoch_is_rejected() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.claim_validator_rewards(&mut state, h).await.unwrap();
    let err = ops.prepare_to_withdraw_stake(&mut state, h).await.unwrap_err();
    assert!(matches!(
        err.precondition(),
        Some(PreconditionError::NoEpochSinceClaim { .. })
    ));
    assert_eq!(
        state.registry.staker(h).unwrap().phase(),
        EntityPhase::RewardsClaimed
    );

    ops.advance_epochs(&mut state, 1).await.unwrap();
    ops.prepare_to_withdraw_stake(&mut state, h).await.unwrap();
    assert_eq!(
        state.registry.staker(h).unwrap().phase(),
        EntityPhase::PreparedToWithdraw
    );
    assert!(ops.staker_info(&state, h).await.unwrap().is_deactivated());
}

#[tokio::test]
async fn preparing_twice_is_rejected() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, h)
        .await
        .unwrap();
    let err = ops.prepare_to_withdraw_stake(&mut state, h).await.unwrap_err();
    assert_eq!(err.precondition(), Some(&PreconditionError::AlreadyPrepared));
}

#[tokio::test]
async fn withdraw_without_prepare_is_rejected() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    let err = ops.withdraw_stake(&mut state, h).await.unwrap_err();
    assert_eq!(err.precondition(), Some(&PreconditionError::NotPrepared));
    assert_eq!(chain.active_stakers(), 1);
}

#[tokio::test]
async fn punish_requires_a_cheater() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    let err = ops.punish(&mut state, h).await.unwrap_err();
    assert_eq!(err.precondition(), Some(&PreconditionError::NotACheater));
    assert_eq!(chain.active_stakers(), 1);
}

// ── Withdrawal locks ─────────────────────────────────────────────────

#[tokio::test]
async fn withdraw_before_lock_is_rejected_then_succeeds() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, h)
        .await
        .unwrap();

    let logged = state.log.len();
    let err = ops.withdraw_stake(&mut state, h).await.unwrap_err();
    match err.precondition() {
        Some(PreconditionError::LockNotElapsed {
            epochs_remaining, ..
        }) => assert_eq!(*epochs_remaining, 3),
        other => panic!("expected LockNotElapsed, got {other:?}"),
    }
    assert_eq!(state.log.len(), logged);
    assert_eq!(
        state.registry.staker(h).unwrap().phase(),
        EntityPhase::PreparedToWithdraw
    );

    let periods = ops.lock_periods(&state).await.unwrap();
    ops.advance_epochs(&mut state, periods.epochs).await.unwrap();

    let before = ops.stakers_num(&state).await.unwrap();
    ops.withdraw_stake(&mut state, h).await.unwrap();
    assert_eq!(ops.stakers_num(&state).await.unwrap(), before - 1);
    assert_eq!(state.registry.staker(h).unwrap().phase(), EntityPhase::Withdrawn);

    let again = ops.withdraw_stake(&mut state, h).await.unwrap_err();
    assert_eq!(again.precondition(), Some(&PreconditionError::AlreadyWithdrawn));
}

#[tokio::test]
async fn waiting_seals_epochs_until_unlocked() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, h)
        .await
        .unwrap();
    let prepared_at = ops.current_sealed_epoch(&state).await.unwrap();

    ops.withdraw_stake_when_unlocked(&mut state, h).await.unwrap();
    let now = ops.current_sealed_epoch(&state).await.unwrap();
    assert!(now.since(prepared_at) >= 3);
    assert_eq!(chain.active_stakers(), 0);
}

#[tokio::test]
async fn waiting_outlasts_a_burst_of_refused_seals() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, h)
        .await
        .unwrap();

    // More refusals than one advance absorbs with its retries.
    let refusals = config.advancer.max_retries + 2;
    chain.fail_next_seals(refusals);

    ops.withdraw_stake_when_unlocked(&mut state, h).await.unwrap();
    assert_eq!(chain.active_stakers(), 0);
    assert_eq!(
        state.registry.staker(h).unwrap().phase(),
        EntityPhase::Withdrawn
    );
}

#[tokio::test]
async fn time_lock_alone_is_waited_out() {
    let chain = SimulatedChain::new(StubConfig {
        params: ContractParams {
            lock: sfcv_stub::LockPeriods {
                epochs: 1,
                secs: 300,
            },
            ..ContractParams::default()
        },
        ..StubConfig::default()
    });
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, h)
        .await
        .unwrap();
    let deactivated_time = ops.staker_info(&state, h).await.unwrap().deactivated_time;

    ops.withdraw_stake_when_unlocked(&mut state, h).await.unwrap();
    assert!(chain.clock_secs() >= deactivated_time + 300);
    assert_eq!(state.registry.staker(h).unwrap().phase(), EntityPhase::Withdrawn);
}

#[tokio::test]
async fn lock_wait_times_out_without_advancing() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let mut config = fast_config();
    config.waiter = WaitPolicy {
        poll_interval_ms: 1,
        max_wait_secs: 0,
        advance_epochs: false,
    };
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    ops.collect_rewards_and_prepare_withdraw_stake(&mut state, h)
        .await
        .unwrap();

    let err = ops.withdraw_stake_when_unlocked(&mut state, h).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockTimeout { max_wait_secs: 0, .. }));
    assert_eq!(
        state.registry.staker(h).unwrap().phase(),
        EntityPhase::PreparedToWithdraw
    );
    assert_eq!(chain.active_stakers(), 1);
}

#[tokio::test]
async fn delegation_full_lifecycle() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let staker = ops.create_stake(&mut state).await.unwrap();
    let d = ops
        .create_and_withdraw_delegation(&mut state, staker)
        .await
        .unwrap();

    assert_eq!(state.registry.delegation(d).unwrap().phase(), EntityPhase::Withdrawn);
    assert_eq!(ops.delegation_info(&state, d).await.unwrap().amount, Amount::ZERO);
    assert_eq!(state.registry.staker(staker).unwrap().phase(), EntityPhase::Created);
    assert_eq!(chain.active_stakers(), 1);
}

#[tokio::test]
async fn bulk_prepare_leaves_the_rest_active() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    ops.create_stakes_and_prepare_to_withdraw(&mut state, 3, 1)
        .await
        .unwrap();
    assert_eq!(state.registry.prepared_stakers().len(), 1);
    let remaining = state.registry.not_prepared_stakers();
    assert_eq!(remaining.len(), 2);

    let delegations = ops.create_delegations(&mut state, &remaining, 2).await.unwrap();
    assert_eq!(delegations.len(), 4);
    let prepared = ops
        .prepare_to_withdraw_delegations(&mut state, &remaining, 1)
        .await
        .unwrap();
    assert_eq!(prepared.len(), 2);
    assert_eq!(state.registry.prepared_delegations(), prepared);

    let err = ops
        .create_stakes_and_prepare_to_withdraw(&mut state, 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::AssertionFailed(_)));
}

#[tokio::test]
async fn increase_stake_is_incompatible_before_upgrade() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    let h = ops.create_stake(&mut state).await.unwrap();
    let err = ops
        .increase_stake(&mut state, h, Amount::new(2))
        .await
        .unwrap_err();
    let incompatible = err.as_incompatible().expect("incompatible method");
    assert_eq!(incompatible.method, "increaseStake");
    assert_eq!(incompatible.abi, "sfc-v1");
    assert_eq!(state.registry.staker(h).unwrap().amount, config.amounts.stake);
}

// ── Epoch advancement ────────────────────────────────────────────────

#[tokio::test]
async fn advancer_retries_refused_seals() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    chain.fail_next_seals(2);
    let report = ops.advance_epochs(&mut state, 3).await.unwrap();
    assert_eq!(report.advanced, 3);
    assert_eq!(report.retries, 2);
    assert_eq!(report.end_epoch.since(report.start_epoch), 3);
    assert_eq!(
        state
            .log
            .records()
            .iter()
            .filter(|r| r.operation == "forceNewEpoch")
            .count(),
        3
    );
}

#[tokio::test]
async fn advancer_gives_up_after_max_retries() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let ops = Operations::new(&chain, &payer, &config);
    let mut state = fresh_state(&config);

    chain.fail_next_seals(10);
    let err = ops.advance_epochs(&mut state, 2).await.unwrap_err();
    match err {
        LifecycleError::Advance(e) => {
            assert_eq!(e.requested, 2);
            assert_eq!(e.advanced, 0);
            assert!(e.last_error.contains("not sealable"));
        }
        other => panic!("expected CouldNotAdvance, got {other}"),
    }
}

/// Lets `allowed` seals through, then fails every further seal with a
/// transport-level error that is not retried.
struct SealBudget {
    chain: SimulatedChain,
    allowed: std::sync::atomic::AtomicU64,
}

impl ContractCaller for SealBudget {
    async fn submit_contract_call(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
        sender: &Account,
        value: Option<Amount>,
    ) -> Result<TxHash, CallError> {
        use std::sync::atomic::Ordering;
        if method == "forceNewEpoch" {
            let left = self.allowed.load(Ordering::SeqCst);
            if left == 0 {
                return Err(CallError::Rpc {
                    method: method.to_string(),
                    code: -32000,
                    message: "node unavailable".to_string(),
                });
            }
            self.allowed.store(left - 1, Ordering::SeqCst);
        }
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
        self.chain.get_transaction_receipt(hash).await
    }

    async fn most_recent_transactions(&self, depth: u64) -> Result<Vec<TxHash>, CallError> {
        self.chain.most_recent_transactions(depth).await
    }

    async fn fund_account(&self, payer: &Account, amount: Amount) -> Result<Account, CallError> {
        self.chain.fund_account(payer, amount).await
    }

    async fn deploy_contract(&self, sender: &Account, bytecode: &[u8]) -> Result<TxHash, CallError> {
        self.chain.deploy_contract(sender, bytecode).await
    }
}

#[tokio::test]
async fn advancer_reports_partial_progress() {
    let chain = SimulatedChain::default();
    let payer = chain.payer();
    let config = fast_config();
    let caller = SealBudget {
        chain: chain.clone(),
        allowed: std::sync::atomic::AtomicU64::new(2),
    };
    let state = fresh_state(&config);
    let mut log = sfcv_lifecycle::TxLog::new();

    let err = EpochAdvancer::new(&caller, config.advancer)
        .advance(&state.binding, &payer, 5, &mut log)
        .await
        .unwrap_err();
    assert_eq!(err.requested, 5);
    assert_eq!(err.advanced, 2);
    assert!(err.last_error.contains("node unavailable"));
    assert_eq!(log.len(), 2);
}

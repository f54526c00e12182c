//! End-to-end admission cycles through the engine with reference adapters.

use logos_adapters::{AlwaysFailExecutor, FlakyGenerator, InMemoryExecutor, ScriptedGenerator};
use logos_core::{
    AccountState, ActionExecutor, ActionOutcome, CandidateAction, CandidateGenerator, CycleStatus,
    DispatchReceipt, EngineConfig, LogosEngine, LogosError, RetryPolicy, RiskConfig, StateStore,
    StoreConfig, ValidatedAction,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Config with decay disabled and the autonomy threshold out of reach, so
/// risk arithmetic in assertions stays exact.
fn quiet_risk_config() -> EngineConfig {
    EngineConfig {
        risk: RiskConfig {
            initial_value: 0.05,
            autonomy_threshold: 10.0,
            hard_threshold: 10.5,
            decay_rate: 0.0,
        },
        ..EngineConfig::default()
    }
}

fn engine_with(config: EngineConfig, executor: Arc<dyn ActionExecutor>) -> LogosEngine {
    let generator: Arc<dyn CandidateGenerator> = Arc::new(ScriptedGenerator::new());
    LogosEngine::bootstrap(config, generator, executor)
}

fn mint_candidate(amount: f64) -> CandidateAction {
    CandidateAction::from_value(json!({
        "command": "mint", "user": "User_A", "currency": "USD", "amount": amount
    }))
}

#[tokio::test]
async fn scenario_small_mint_passes_unmodified() {
    let engine = engine_with(quiet_risk_config(), Arc::new(InMemoryExecutor::default()));

    let report = engine.handle_candidate(mint_candidate(100.0)).await;

    assert_eq!(report.status, CycleStatus::Success);
    assert!(report.trail.is_empty());
    let accounts = engine.accounts().await;
    assert!((accounts.balance("User_A", "USD") - 1100.0).abs() < 1e-9);
    // Risk moved by exactly the mint friction times the USD magnitude.
    assert!((engine.risk_value().await - (0.05 + 0.005 * 100.0)).abs() < 1e-9);
    assert_eq!(engine.audit_entries().await.len(), 1);
    assert!(engine.fully_verified().await);
}

#[tokio::test]
async fn scenario_oversized_mint_is_clamped() {
    let engine = engine_with(quiet_risk_config(), Arc::new(InMemoryExecutor::default()));

    let report = engine.handle_candidate(mint_candidate(1_000_000.0)).await;

    assert_eq!(report.status, CycleStatus::Success);
    assert!(report.trail.contains(&"AMOUNT_CLAMPED".to_string()));
    match report.action {
        ValidatedAction::Mint { amount, .. } => assert!((amount - 100.0).abs() < 1e-9),
        other => panic!("expected mint, got {:?}", other),
    }
    let accounts = engine.accounts().await;
    assert!((accounts.balance("User_A", "USD") - 1100.0).abs() < 1e-9);
}

#[tokio::test]
async fn scenario_autonomy_correction_fires_once() {
    let mut config = quiet_risk_config();
    // Post-dispatch risk lands at 0.06 + 0.4 = 0.46, just over the threshold.
    config.risk = RiskConfig {
        initial_value: 0.06,
        autonomy_threshold: 0.45,
        hard_threshold: 0.5,
        decay_rate: 0.0,
    };
    let engine = engine_with(config, Arc::new(InMemoryExecutor::default()));

    let report = engine.handle_candidate(mint_candidate(80.0)).await;

    assert_eq!(report.status, CycleStatus::Success);
    assert!((engine.risk_value().await - 0.23).abs() < 1e-9);
    assert_eq!(engine.autonomy_corrections().await, 1);
}

#[tokio::test]
async fn invalid_command_is_rejected_and_logged() {
    let engine = engine_with(quiet_risk_config(), Arc::new(InMemoryExecutor::default()));

    let report = engine
        .handle_candidate(CandidateAction::from_value(json!({
            "command": "drain_all_funds", "user": "User_A"
        })))
        .await;

    assert_eq!(report.status, CycleStatus::Rejected);
    assert!(report.detail.contains("INVALID_COMMAND"));
    // The rejection still produced exactly one audit entry and no mutation.
    let entries = engine.audit_entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].action.is_noop());
    assert_eq!(
        engine.accounts().await.balance("User_A", "USD"),
        AccountState::bootstrap_defaults().balance("User_A", "USD")
    );
}

#[tokio::test]
async fn forced_zero_mint_flows_through_dispatch_and_audit() {
    let engine = engine_with(quiet_risk_config(), Arc::new(InMemoryExecutor::default()));

    let report = engine.handle_candidate(mint_candidate(-500.0)).await;

    assert_eq!(report.status, CycleStatus::Success);
    assert!(report
        .trail
        .contains(&"AMOUNT_FORCED_TO_ZERO:amount".to_string()));
    let receipt = report.receipt.expect("dispatch ran");
    assert!(!receipt.mutated);
    assert_eq!(engine.accounts().await.balance("User_A", "USD"), 1000.0);
    assert_eq!(engine.audit_entries().await.len(), 1);
}

#[tokio::test]
async fn executor_failure_surfaces_as_core_execution_failure() {
    let engine = engine_with(
        quiet_risk_config(),
        Arc::new(AlwaysFailExecutor::new("settlement backend down")),
    );

    let report = engine.handle_candidate(mint_candidate(100.0)).await;

    assert_eq!(report.status, CycleStatus::CoreExecutionFailure);
    let entries = engine.audit_entries().await;
    assert_eq!(entries.len(), 1);
    assert!(matches!(entries[0].outcome, ActionOutcome::Failure { .. }));
    assert_eq!(engine.accounts().await.balance("User_A", "USD"), 1000.0);
    // Fixed execution-failure penalty, no dispatch cost.
    assert!((engine.risk_value().await - 0.10).abs() < 1e-9);
}

/// Executor that reports one amount but books another; the invariant
/// verifier must catch the divergence.
#[derive(Debug, Clone, Default)]
struct SkimmingExecutor {
    inner: InMemoryExecutor,
}

#[async_trait::async_trait]
impl ActionExecutor for SkimmingExecutor {
    async fn dispatch(
        &self,
        action: &ValidatedAction,
        accounts: &mut AccountState,
    ) -> Result<DispatchReceipt, LogosError> {
        let receipt = self.inner.dispatch(action, accounts).await?;
        if let ValidatedAction::Mint { user, currency, .. } = action {
            // Undeclared extra credit, invisible to the audit log.
            accounts.credit(user, currency, 7.0)?;
        }
        Ok(receipt)
    }
}

#[tokio::test]
async fn divergent_state_fails_verification_and_escalates_risk() {
    let engine = engine_with(quiet_risk_config(), Arc::new(SkimmingExecutor::default()));

    let report = engine.handle_candidate(mint_candidate(100.0)).await;

    assert_eq!(report.status, CycleStatus::VerificationFailed);
    // Nothing is rolled back; the divergent balance stands for investigation.
    assert!((engine.accounts().await.balance("User_A", "USD") - 1107.0).abs() < 1e-9);
    assert!(!engine.fully_verified().await);
    assert_eq!(engine.retained_snapshots().await, 1);
    // Verification penalty plus the dispatch cost.
    assert!((engine.risk_value().await - (0.05 + 0.1 + 0.5)).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn generator_outage_degrades_to_rejected_no_op() {
    let mut config = quiet_risk_config();
    config.retry = RetryPolicy {
        max_attempts: 2,
        base_backoff: Duration::from_millis(10),
    };
    let generator: Arc<dyn CandidateGenerator> = Arc::new(FlakyGenerator::new(
        10,
        json!({ "command": "mint", "user": "User_A", "currency": "USD", "amount": 50.0 }),
    ));
    let engine = LogosEngine::bootstrap(config, generator, Arc::new(InMemoryExecutor::default()));

    let report = engine.handle("mint fifty dollars").await;

    assert_eq!(report.status, CycleStatus::Rejected);
    assert!(report.detail.contains("GENERATOR_DECLINED"));
    assert_eq!(engine.accounts().await.balance("User_A", "USD"), 1000.0);
}

#[tokio::test(start_paused = true)]
async fn generator_recovers_within_retry_limit() {
    let mut config = quiet_risk_config();
    config.retry = RetryPolicy {
        max_attempts: 5,
        base_backoff: Duration::from_millis(10),
    };
    let generator: Arc<dyn CandidateGenerator> = Arc::new(FlakyGenerator::new(
        2,
        json!({ "command": "mint", "user": "User_A", "currency": "USD", "amount": 50.0 }),
    ));
    let engine = LogosEngine::bootstrap(config, generator, Arc::new(InMemoryExecutor::default()));

    let report = engine.handle("mint fifty dollars").await;

    assert_eq!(report.status, CycleStatus::Success);
    assert!((engine.accounts().await.balance("User_A", "USD") - 1050.0).abs() < 1e-9);
}

/// Executor that never completes; the dispatch timeout must cut it off.
#[derive(Debug, Clone)]
struct StuckExecutor;

#[async_trait::async_trait]
impl ActionExecutor for StuckExecutor {
    async fn dispatch(
        &self,
        _action: &ValidatedAction,
        _accounts: &mut AccountState,
    ) -> Result<DispatchReceipt, LogosError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(DispatchReceipt::no_effect("unreachable"))
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_executor_hits_dispatch_timeout() {
    let mut config = quiet_risk_config();
    config.store_config = StoreConfig {
        store: StateStore::Memory,
        dispatch_timeout: Duration::from_secs(5),
    };
    let engine = engine_with(config, Arc::new(StuckExecutor));

    let report = engine.handle_candidate(mint_candidate(10.0)).await;

    assert_eq!(report.status, CycleStatus::CoreExecutionFailure);
    assert!(report.detail.contains("timed out"));
}

#[tokio::test]
async fn transfer_to_external_recipient_verifies() {
    let engine = engine_with(quiet_risk_config(), Arc::new(InMemoryExecutor::default()));

    let report = engine
        .handle_candidate(CandidateAction::from_value(json!({
            "command": "transfer", "sender": "User_A", "recipient": "Gateway",
            "currency": "USD", "amount": 250.0
        })))
        .await;

    assert_eq!(report.status, CycleStatus::Success);
    let accounts = engine.accounts().await;
    assert!((accounts.balance("User_A", "USD") - 750.0).abs() < 1e-9);
    assert!(!accounts.contains_account("Gateway"));
    assert!(engine.fully_verified().await);
}

#[tokio::test]
async fn exchange_cycle_records_rate_and_verifies() {
    let engine = engine_with(quiet_risk_config(), Arc::new(InMemoryExecutor::default()));

    let report = engine
        .handle_candidate(CandidateAction::from_value(json!({
            "command": "exchange", "user": "User_A",
            "from_currency": "USD", "to_currency": "JPY", "from_amount": 100.0
        })))
        .await;

    assert_eq!(report.status, CycleStatus::Success);
    let entries = engine.audit_entries().await;
    assert_eq!(entries.len(), 1);
    let rate = entries[0].exchange_rate.expect("rate persisted");
    assert!((rate - 130.0).abs() < 1e-9);
    let accounts = engine.accounts().await;
    assert!((accounts.balance("User_A", "JPY") - 13_000.0).abs() < 1e-9);
    assert!(engine.fully_verified().await);
}

#[tokio::test]
async fn administrative_reset_clears_everything_together() {
    let engine = engine_with(quiet_risk_config(), Arc::new(InMemoryExecutor::default()));
    engine.handle_candidate(mint_candidate(100.0)).await;
    assert_eq!(engine.audit_entries().await.len(), 1);

    engine.reset().await;

    assert_eq!(engine.accounts().await.balance("User_A", "USD"), 1000.0);
    assert!((engine.risk_value().await - 0.05).abs() < 1e-9);
    assert!(engine.audit_entries().await.is_empty());
    assert_eq!(engine.retained_snapshots().await, 0);
}

#[tokio::test]
async fn state_survives_engine_restart_via_json_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("logos-state.json");

    let mut config = quiet_risk_config();
    config.store_config.store = StateStore::json_file(&path);
    let engine = engine_with(config.clone(), Arc::new(InMemoryExecutor::default()));
    engine.handle_candidate(mint_candidate(100.0)).await;
    drop(engine);

    let rebuilt = engine_with(config, Arc::new(InMemoryExecutor::default()));
    assert!((rebuilt.accounts().await.balance("User_A", "USD") - 1100.0).abs() < 1e-9);
    assert!((rebuilt.risk_value().await - 0.55).abs() < 1e-9);
    assert_eq!(rebuilt.audit_entries().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn decay_floors_at_zero_across_cycles() {
    let mut config = quiet_risk_config();
    config.risk = RiskConfig {
        initial_value: 0.02,
        autonomy_threshold: 10.0,
        hard_threshold: 10.5,
        decay_rate: 0.015,
    };
    let engine = engine_with(config, Arc::new(InMemoryExecutor::default()));

    // Rejected cycles carry no dispatch cost, so only decay applies.
    let rejected = CandidateAction::from_value(json!({ "command": "bogus" }));
    engine.handle_candidate(rejected.clone()).await;
    assert!((engine.risk_value().await - 0.005).abs() < 1e-9);
    engine.handle_candidate(rejected.clone()).await;
    assert_eq!(engine.risk_value().await, 0.0);
    engine.handle_candidate(rejected).await;
    assert_eq!(engine.risk_value().await, 0.0);
}

#[tokio::test]
async fn high_tension_refuses_mint_outright() {
    let mut config = quiet_risk_config();
    config.risk = RiskConfig {
        initial_value: 0.6,
        autonomy_threshold: 0.45,
        hard_threshold: 0.5,
        decay_rate: 0.0,
    };
    let engine = engine_with(config, Arc::new(InMemoryExecutor::default()));

    let report = engine.handle_candidate(mint_candidate(10.0)).await;

    assert_eq!(report.status, CycleStatus::Rejected);
    assert!(report.detail.contains("TENSION_TOO_HIGH"));
    assert_eq!(engine.accounts().await.balance("User_A", "USD"), 1000.0);
}

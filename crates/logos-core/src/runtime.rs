use crate::accounts::{AccountState, RateTable};
use crate::audit::{AuditConfig, AuditLog, AuditLogEntry, AuditPipeline, VerificationReport};
use crate::error::LogosError;
use crate::executor::ActionExecutor;
use crate::filter::{CorrectionFilter, FilterConfig};
use crate::flow::CycleStageMachine;
use crate::generator::{generate_with_retry, summarize_state, CandidateGenerator, RetryPolicy};
use crate::risk::{RiskConfig, RiskLedger, RiskWeights};
use crate::storage::{PersistedState, StateStore};
use crate::types::{
    ActionOutcome, CandidateAction, CycleReport, CycleStatus, NoOpReason, ValidatedAction,
    ALLOWED_COMMANDS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Engine configuration bundling every sub-component's policy.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub filter: FilterConfig,
    pub risk: RiskConfig,
    pub weights: RiskWeights,
    pub audit: AuditConfig,
    pub retry: RetryPolicy,
    pub rates: RateTable,
    pub store_config: StoreConfig,
}

/// Dispatch/persistence knobs that have no natural home in a sub-config.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub store: StateStore,
    /// Hard timeout so a stuck executor cannot hold the cycle lock forever.
    pub dispatch_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store: StateStore::Memory,
            dispatch_timeout: Duration::from_secs(5),
        }
    }
}

/// Mutable session state: the unit of mutual exclusion for one cycle.
struct CoreState {
    accounts: AccountState,
    risk: RiskLedger,
    audit: AuditPipeline,
}

/// Orchestrates the admission cycle:
/// snapshot -> filter -> dispatch -> log -> verify -> risk check.
///
/// Exactly one cycle runs at a time against the engine's state. The candidate
/// generator call is the only suspension point and is awaited without the
/// cycle lock; the lock is re-acquired before the filter reads risk and the
/// executor touches balances. If a concurrent cycle landed in between, the
/// invariant verifier is what detects any divergence.
pub struct LogosEngine {
    state: AsyncMutex<CoreState>,
    generator: Arc<dyn CandidateGenerator>,
    executor: Arc<dyn ActionExecutor>,
    filter: CorrectionFilter,
    weights: RiskWeights,
    rates: RateTable,
    retry: RetryPolicy,
    dispatch_timeout: Duration,
    store: StateStore,
}

impl LogosEngine {
    /// Build the engine, hydrating persisted state or falling back to the
    /// documented defaults.
    pub fn bootstrap(
        config: EngineConfig,
        generator: Arc<dyn CandidateGenerator>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        let EngineConfig {
            filter,
            risk,
            weights,
            audit,
            retry,
            rates,
            store_config,
        } = config;

        let (accounts, risk_ledger, log) = match store_config.store.load() {
            Some(persisted) => (
                persisted.accounts,
                RiskLedger::with_value(risk, persisted.risk_value),
                AuditLog::from_entries(persisted.log),
            ),
            None => {
                tracing::info!(backend = store_config.store.label(), "Starting from default state");
                (
                    AccountState::bootstrap_defaults(),
                    RiskLedger::new(risk),
                    AuditLog::new(),
                )
            }
        };

        Self {
            state: AsyncMutex::new(CoreState {
                accounts,
                risk: risk_ledger,
                audit: AuditPipeline::with_log(audit, log),
            }),
            generator,
            executor,
            filter: CorrectionFilter::new(filter),
            weights,
            rates,
            retry,
            dispatch_timeout: store_config.dispatch_timeout,
            store: store_config.store,
        }
    }

    /// Full admission path: free text -> candidate -> orchestrated cycle.
    ///
    /// Never returns an error; every failure mode is a `CycleStatus`.
    pub async fn handle(&self, input: &str) -> CycleReport {
        let summary = {
            let state = self.state.lock().await;
            summarize_state(&state.accounts, state.risk.value())
        };

        // Suspension point: the generator is awaited without the cycle lock.
        let candidate = generate_with_retry(
            self.generator.as_ref(),
            &self.retry,
            input,
            &summary,
            &ALLOWED_COMMANDS,
        )
        .await;

        self.handle_candidate(candidate).await
    }

    /// Run one cycle for an already-produced candidate action.
    pub async fn handle_candidate(&self, candidate: CandidateAction) -> CycleReport {
        let trace_id = CycleReport::new_trace_id();
        let mut state = self.state.lock().await;

        let report = match self.run_cycle(&mut state, &candidate, &trace_id).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(trace_id = %trace_id, error = %err, "Cycle hit fatal boundary");
                // Best effort: the risk check still runs on fatal failures.
                Self::risk_check(&mut state, &self.weights, 0.0, false);
                CycleReport {
                    trace_id: trace_id.clone(),
                    status: CycleStatus::Fatal,
                    action: ValidatedAction::NoOp {
                        reason: NoOpReason::ParseFailure,
                    },
                    trail: Vec::new(),
                    receipt: None,
                    detail: err.to_string(),
                }
            }
        };

        self.persist_best_effort(&state);
        report
    }

    async fn run_cycle(
        &self,
        state: &mut CoreState,
        candidate: &CandidateAction,
        trace_id: &str,
    ) -> Result<CycleReport, LogosError> {
        let mut machine = CycleStageMachine::new(trace_id);

        machine.mark_snapshot()?;
        let snapshot_ref = state
            .audit
            .capture_snapshot(&state.accounts, state.risk.value());

        machine.mark_filter()?;
        let corrected = self.filter.correct(candidate, &state.risk.signal());
        tracing::info!(
            trace_id,
            command = corrected.action.command_name(),
            trail = ?corrected.trail,
            "Candidate filtered"
        );

        if let ValidatedAction::NoOp { reason } = corrected.action {
            machine.mark_rejected()?;
            state.audit.append_entry(
                trace_id,
                corrected.action.clone(),
                corrected.trail.clone(),
                ActionOutcome::Success,
                &state.accounts,
                state.risk.value(),
                &snapshot_ref,
                None,
            );

            machine.mark_verify()?;
            let verification = state.audit.verify_window(&snapshot_ref, &state.accounts);
            Self::apply_verification_penalty(state, &self.weights, &verification);

            machine.mark_risk_check()?;
            Self::risk_check(state, &self.weights, 0.0, false);
            machine.mark_done()?;

            return Ok(CycleReport {
                trace_id: trace_id.to_string(),
                status: CycleStatus::Rejected,
                action: corrected.action,
                trail: corrected.trail,
                receipt: None,
                detail: format!("rejected: {}", reason.as_str()),
            });
        }

        machine.mark_dispatch()?;
        let dispatched = tokio::time::timeout(
            self.dispatch_timeout,
            self.executor.dispatch(&corrected.action, &mut state.accounts),
        )
        .await;

        let (outcome, receipt, dispatch_failure) = match dispatched {
            Ok(Ok(receipt)) => (ActionOutcome::Success, Some(receipt), None),
            Ok(Err(err)) => {
                tracing::warn!(trace_id, error = %err, "Dispatch failed");
                (
                    ActionOutcome::Failure {
                        detail: err.to_string(),
                    },
                    None,
                    Some(err.to_string()),
                )
            }
            Err(_) => {
                let err = LogosError::DispatchTimeout(self.dispatch_timeout.as_millis() as u64);
                tracing::warn!(trace_id, error = %err, "Dispatch timed out");
                (
                    ActionOutcome::Failure {
                        detail: err.to_string(),
                    },
                    None,
                    Some(err.to_string()),
                )
            }
        };

        machine.mark_log()?;
        let exchange_rate = receipt
            .as_ref()
            .and_then(|receipt| receipt.exchange_fill)
            .map(|fill| fill.rate);
        state.audit.append_entry(
            trace_id,
            corrected.action.clone(),
            corrected.trail.clone(),
            outcome,
            &state.accounts,
            state.risk.value(),
            &snapshot_ref,
            exchange_rate,
        );

        machine.mark_verify()?;
        let verification = state.audit.verify_window(&snapshot_ref, &state.accounts);
        Self::apply_verification_penalty(state, &self.weights, &verification);

        machine.mark_risk_check()?;
        let dispatch_cost = match &receipt {
            Some(receipt) if receipt.mutated => {
                self.dispatch_cost(&corrected.action).unwrap_or_else(|err| {
                    tracing::warn!(trace_id, error = %err, "Dispatch cost unavailable");
                    0.0
                })
            }
            _ => 0.0,
        };
        Self::risk_check(state, &self.weights, dispatch_cost, dispatch_failure.is_some());
        machine.mark_done()?;

        let (status, detail) = if let Some(failure) = dispatch_failure {
            (CycleStatus::CoreExecutionFailure, failure)
        } else if !verification.ok {
            (
                CycleStatus::VerificationFailed,
                format!("{} balance divergence(s)", verification.divergences.len()),
            )
        } else {
            (
                CycleStatus::Success,
                receipt
                    .as_ref()
                    .map(|receipt| receipt.detail.clone())
                    .unwrap_or_default(),
            )
        };

        tracing::info!(trace_id, status = ?status, "Cycle complete");
        Ok(CycleReport {
            trace_id: trace_id.to_string(),
            status,
            action: corrected.action,
            trail: corrected.trail,
            receipt,
            detail,
        })
    }

    /// Weighted dispatch cost: USD-equivalent magnitude times the per-action
    /// friction coefficient.
    fn dispatch_cost(&self, action: &ValidatedAction) -> Result<f64, LogosError> {
        match action {
            ValidatedAction::Mint {
                currency, amount, ..
            } => Ok(self.rates.usd_equivalent(currency, *amount)? * self.weights.mint_friction),
            ValidatedAction::Transfer {
                currency, amount, ..
            } => Ok(self.rates.usd_equivalent(currency, *amount)? * self.weights.transfer_friction),
            ValidatedAction::Exchange {
                from_currency,
                from_amount,
                ..
            } => Ok(self.rates.usd_equivalent(from_currency, *from_amount)?
                * self.weights.exchange_friction),
            ValidatedAction::NoOp { .. } => Ok(0.0),
        }
    }

    fn apply_verification_penalty(
        state: &mut CoreState,
        weights: &RiskWeights,
        verification: &VerificationReport,
    ) {
        if !verification.ok {
            state.risk.increase(weights.verification_failure_penalty);
        }
    }

    /// RISK_CHECK stage: accrue dispatch cost, decay once, then self-correct
    /// at most once if the autonomy threshold was crossed.
    fn risk_check(
        state: &mut CoreState,
        weights: &RiskWeights,
        dispatch_cost: f64,
        execution_failed: bool,
    ) {
        state.risk.increase(dispatch_cost);
        if execution_failed {
            state.risk.increase(weights.execution_failure_penalty);
        }
        state.risk.decay(1);
        if state.risk.above_autonomy_threshold() {
            state.risk.autonomy_correct();
        }
    }

    fn persist_best_effort(&self, state: &CoreState) {
        let snapshot = PersistedState {
            accounts: state.accounts.clone(),
            risk_value: state.risk.value(),
            log: state.audit.log().entries().to_vec(),
        };
        if let Err(err) = self.store.save(&snapshot) {
            tracing::error!(backend = self.store.label(), error = %err,
                "State persistence failed; cycle result stands");
        }
    }

    /// Administrative reset: accounts, risk ledger, audit log, and snapshot
    /// history reset together as one atomic unit.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.accounts = AccountState::bootstrap_defaults();
        state.risk.reset();
        state.audit.reset();
        self.persist_best_effort(&state);
        tracing::info!("Administrative reset complete");
    }

    pub async fn accounts(&self) -> AccountState {
        self.state.lock().await.accounts.clone()
    }

    pub async fn risk_value(&self) -> f64 {
        self.state.lock().await.risk.value()
    }

    pub async fn autonomy_corrections(&self) -> usize {
        self.state.lock().await.risk.corrections().len()
    }

    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.state.lock().await.audit.log().entries().to_vec()
    }

    pub async fn verified_to(&self) -> usize {
        self.state.lock().await.audit.log().verified_to()
    }

    pub async fn retained_snapshots(&self) -> usize {
        self.state.lock().await.audit.snapshot_count()
    }

    /// True when no unverified log window remains.
    pub async fn fully_verified(&self) -> bool {
        let state = self.state.lock().await;
        state.audit.log().verified_to() == state.audit.log().len()
    }
}

//! Reference adapters for the Logos admission core: deterministic candidate
//! generators and an in-memory domain action executor.

#![deny(unsafe_code)]

use async_trait::async_trait;
use logos_core::{
    AccountState, ActionExecutor, CandidateAction, CandidateGenerator, DispatchReceipt,
    ExchangeFill, LogosError, RateTable, ValidatedAction,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};

/// Deterministic phrase-to-candidate generator for local runs and tests.
///
/// Rules are matched in insertion order against the raw input; the first
/// matching substring wins. Unmatched input degrades to a no-operation
/// payload, the same contract a production language-model backend has.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    rules: Vec<(String, Value)>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, phrase: impl Into<String>, candidate: Value) -> Self {
        self.rules.push((phrase.into(), candidate));
        self
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        input: &str,
        _state_summary: &str,
        _allowed_commands: &[&str],
    ) -> Result<CandidateAction, LogosError> {
        for (phrase, candidate) in &self.rules {
            if input.contains(phrase.as_str()) {
                return Ok(CandidateAction::from_value(candidate.clone()));
            }
        }
        tracing::debug!(input, "No scripted rule matched; declining");
        Ok(CandidateAction::no_operation())
    }
}

/// Fails a fixed number of times before yielding its payload. Drives the
/// orchestrator's retry/backoff policy in tests.
#[derive(Debug)]
pub struct FlakyGenerator {
    remaining_failures: AtomicU32,
    payload: Value,
}

impl FlakyGenerator {
    pub fn new(failures: u32, payload: Value) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            payload,
        }
    }
}

#[async_trait]
impl CandidateGenerator for FlakyGenerator {
    async fn generate(
        &self,
        _input: &str,
        _state_summary: &str,
        _allowed_commands: &[&str],
    ) -> Result<CandidateAction, LogosError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LogosError::Generator(format!(
                "simulated outage ({remaining} failures left)"
            )));
        }
        Ok(CandidateAction::from_value(self.payload.clone()))
    }
}

/// In-memory domain action executor over a USD-pegged rate table.
///
/// Validation happens before any balance mutation, so a failed dispatch
/// leaves account state untouched. Zero-amount actions succeed without
/// effect so neutralized candidates still reach the audit log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutor {
    rates: RateTable,
}

impl InMemoryExecutor {
    pub fn new(rates: RateTable) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl ActionExecutor for InMemoryExecutor {
    async fn dispatch(
        &self,
        action: &ValidatedAction,
        accounts: &mut AccountState,
    ) -> Result<DispatchReceipt, LogosError> {
        match action {
            ValidatedAction::Mint {
                user,
                currency,
                amount,
            } => {
                if !self.rates.supports(currency) {
                    return Err(LogosError::UnsupportedCurrency(currency.clone()));
                }
                if !accounts.contains_account(user) {
                    return Err(LogosError::UnknownAccount(user.clone()));
                }
                if *amount == 0.0 {
                    return Ok(DispatchReceipt::no_effect("zero-amount mint"));
                }
                accounts.credit(user, currency, *amount)?;
                Ok(DispatchReceipt::mutated(format!(
                    "minted {amount} {currency} for {user}"
                )))
            }
            ValidatedAction::Transfer {
                sender,
                recipient,
                currency,
                amount,
            } => {
                if !self.rates.supports(currency) {
                    return Err(LogosError::UnsupportedCurrency(currency.clone()));
                }
                if *amount == 0.0 {
                    return Ok(DispatchReceipt::no_effect("zero-amount transfer"));
                }
                accounts.debit(sender, currency, *amount)?;
                // Recipients outside the ledger are external: the debit
                // stands without a matching internal credit.
                if accounts.contains_account(recipient) {
                    accounts.credit(recipient, currency, *amount)?;
                }
                Ok(DispatchReceipt::mutated(format!(
                    "transferred {amount} {currency} from {sender} to {recipient}"
                )))
            }
            ValidatedAction::Exchange {
                user,
                from_currency,
                to_currency,
                from_amount,
            } => {
                if from_currency == to_currency {
                    return Err(LogosError::SameCurrencyExchange(from_currency.clone()));
                }
                let rate = self.rates.conversion_rate(from_currency, to_currency)?;
                if *from_amount == 0.0 {
                    return Ok(DispatchReceipt::no_effect("zero-amount exchange"));
                }
                accounts.debit(user, from_currency, *from_amount)?;
                let to_amount = from_amount * rate;
                accounts.credit(user, to_currency, to_amount)?;
                Ok(DispatchReceipt::mutated(format!(
                    "exchanged {from_amount} {from_currency} into {to_amount} {to_currency} for {user}"
                ))
                .with_exchange_fill(ExchangeFill { to_amount, rate }))
            }
            ValidatedAction::NoOp { reason } => Ok(DispatchReceipt::no_effect(format!(
                "no-op ({})",
                reason.as_str()
            ))),
        }
    }
}

/// Executor that always fails with a fixed reason; chaos-testing aid.
#[derive(Debug, Clone)]
pub struct AlwaysFailExecutor {
    reason: String,
}

impl AlwaysFailExecutor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ActionExecutor for AlwaysFailExecutor {
    async fn dispatch(
        &self,
        _action: &ValidatedAction,
        _accounts: &mut AccountState,
    ) -> Result<DispatchReceipt, LogosError> {
        Err(LogosError::InvariantViolation(self.reason.clone()))
    }
}

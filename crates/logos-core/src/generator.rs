use crate::accounts::AccountState;
use crate::error::LogosError;
use crate::types::CandidateAction;
use async_trait::async_trait;
use std::time::Duration;

/// Free-text to candidate-action generator (external collaborator).
///
/// Implementations must not block indefinitely; callers wrap them in
/// `generate_with_retry` which guarantees a no-op fallback.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate(
        &self,
        input: &str,
        state_summary: &str,
        allowed_commands: &[&str],
    ) -> Result<CandidateAction, LogosError>;
}

/// Bounded retry policy for generator calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// Call the generator under the retry policy, degrading to a canonical
/// no-operation payload rather than propagating the failure.
pub async fn generate_with_retry(
    generator: &dyn CandidateGenerator,
    policy: &RetryPolicy,
    input: &str,
    state_summary: &str,
    allowed_commands: &[&str],
) -> CandidateAction {
    for attempt in 0..policy.max_attempts.max(1) {
        match generator
            .generate(input, state_summary, allowed_commands)
            .await
        {
            Ok(candidate) => return candidate,
            Err(err) => {
                tracing::warn!(attempt, error = %err, "Candidate generator attempt failed");
                if attempt + 1 < policy.max_attempts.max(1) {
                    tokio::time::sleep(policy.backoff_for(attempt)).await;
                }
            }
        }
    }
    tracing::warn!("Candidate generator exhausted retries; degrading to no-op");
    CandidateAction::no_operation()
}

/// Compact account/risk summary handed to the generator as context.
pub fn summarize_state(accounts: &AccountState, risk_value: f64) -> String {
    let mut parts: Vec<String> = Vec::new();
    for account in accounts.account_ids() {
        if let Some(holdings) = accounts.holdings(account) {
            let balances = holdings
                .iter()
                .filter(|(_, balance)| **balance != 0.0)
                .map(|(currency, balance)| format!("{currency} {balance:.2}"))
                .collect::<Vec<_>>()
                .join(", ");
            if balances.is_empty() {
                parts.push(format!("{account}: empty"));
            } else {
                parts.push(format!("{account}: {balances}"));
            }
        }
    }
    format!("accounts[{}] risk={risk_value:.4}", parts.join("; "))
}

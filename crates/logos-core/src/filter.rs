use crate::risk::RiskSignal;
use crate::types::{
    CandidateAction, CorrectedAction, NoOpReason, ValidatedAction, COMMAND_EXCHANGE, COMMAND_MINT,
    COMMAND_NO_OPERATION, COMMAND_TRANSFER,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Static correction filter policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub supported_currencies: BTreeSet<String>,
    pub default_currency: String,
    /// Per-currency mint ceilings; currencies not listed use the default.
    pub mint_ceilings: BTreeMap<String, f64>,
    pub default_mint_ceiling: f64,
    /// Fraction of the ceiling a clamped mint is reduced to.
    pub clamp_fraction: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let supported_currencies = ["USD", "JPY", "EUR", "BTC", "ETH", "MATIC"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut mint_ceilings = BTreeMap::new();
        mint_ceilings.insert("USD".to_string(), 1000.0);
        mint_ceilings.insert("JPY".to_string(), 100_000.0);
        mint_ceilings.insert("BTC".to_string(), 0.01);
        Self {
            supported_currencies,
            default_currency: "USD".to_string(),
            mint_ceilings,
            default_mint_ceiling: 500.0,
            clamp_fraction: 0.1,
        }
    }
}

impl FilterConfig {
    pub fn mint_ceiling(&self, currency: &str) -> f64 {
        self.mint_ceilings
            .get(currency)
            .copied()
            .unwrap_or(self.default_mint_ceiling)
    }
}

/// Sanitizes an untrusted candidate action into a validated action.
///
/// Pure and deterministic: the same candidate and risk signal always produce
/// the same output, and no input ever makes it fail. Rejections come back as
/// canonical no-ops with a reason, lossy corrections as trail annotations.
#[derive(Debug, Clone, Default)]
pub struct CorrectionFilter {
    config: FilterConfig,
}

impl CorrectionFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn correct(&self, candidate: &CandidateAction, risk: &RiskSignal) -> CorrectedAction {
        let Some(command) = candidate.command() else {
            tracing::debug!("Candidate without command field rejected");
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };

        match command {
            COMMAND_NO_OPERATION => CorrectedAction::rejected(NoOpReason::GeneratorDeclined),
            COMMAND_MINT => self.correct_mint(candidate, risk),
            COMMAND_TRANSFER => self.correct_transfer(candidate),
            COMMAND_EXCHANGE => self.correct_exchange(candidate),
            other => {
                tracing::debug!(command = other, "Candidate command outside whitelist");
                CorrectedAction::rejected(NoOpReason::InvalidCommand)
            }
        }
    }

    fn correct_mint(&self, candidate: &CandidateAction, risk: &RiskSignal) -> CorrectedAction {
        let Some(user) = candidate.str_field("user") else {
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };
        let mut trail = Vec::new();
        let currency = self.sanitize_currency(candidate, "currency", &mut trail);
        let Some(currency) = currency else {
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };
        let mut amount = sanitize_amount(candidate, "amount", &mut trail);

        // Mint safety gate: over-ceiling requests and elevated risk both
        // funnel here; past the hard threshold the whole act is refused.
        let ceiling = self.config.mint_ceiling(&currency);
        let high_tension = risk.value > risk.autonomy_threshold * 0.5;
        if amount > ceiling || high_tension {
            if risk.value > risk.hard_threshold {
                tracing::warn!(
                    user,
                    currency,
                    amount,
                    risk = risk.value,
                    "Mint refused: tension above hard threshold"
                );
                return CorrectedAction {
                    action: ValidatedAction::NoOp {
                        reason: NoOpReason::TensionTooHigh,
                    },
                    trail,
                };
            }
            let clamped = amount.min(ceiling * self.config.clamp_fraction);
            if clamped < amount {
                tracing::warn!(user, currency, amount, clamped, "Mint amount clamped");
                amount = clamped;
                trail.push("AMOUNT_CLAMPED".to_string());
            }
        }

        CorrectedAction {
            action: ValidatedAction::Mint {
                user: user.to_string(),
                currency,
                amount,
            },
            trail,
        }
    }

    fn correct_transfer(&self, candidate: &CandidateAction) -> CorrectedAction {
        let (Some(sender), Some(recipient)) = (
            candidate.str_field("sender"),
            candidate.str_field("recipient"),
        ) else {
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };
        let mut trail = Vec::new();
        let Some(currency) = self.sanitize_currency(candidate, "currency", &mut trail) else {
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };
        let amount = sanitize_amount(candidate, "amount", &mut trail);

        CorrectedAction {
            action: ValidatedAction::Transfer {
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                currency,
                amount,
            },
            trail,
        }
    }

    fn correct_exchange(&self, candidate: &CandidateAction) -> CorrectedAction {
        let Some(user) = candidate.str_field("user") else {
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };
        let mut trail = Vec::new();
        let Some(from_currency) = self.sanitize_currency(candidate, "from_currency", &mut trail)
        else {
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };
        let Some(to_currency) = self.sanitize_currency(candidate, "to_currency", &mut trail) else {
            return CorrectedAction::rejected(NoOpReason::ParseFailure);
        };
        let from_amount = sanitize_amount(candidate, "from_amount", &mut trail);

        CorrectedAction {
            action: ValidatedAction::Exchange {
                user: user.to_string(),
                from_currency,
                to_currency,
                from_amount,
            },
            trail,
        }
    }

    /// Missing currency fields are structural failures; present-but-unknown
    /// codes are forced to the default currency and annotated.
    fn sanitize_currency(
        &self,
        candidate: &CandidateAction,
        field: &str,
        trail: &mut Vec<String>,
    ) -> Option<String> {
        let raw = candidate.str_field(field)?;
        if self.config.supported_currencies.contains(raw) {
            Some(raw.to_string())
        } else {
            trail.push(format!("CURRENCY_FORCED:{field}"));
            Some(self.config.default_currency.clone())
        }
    }
}

/// Non-numeric or negative amounts are neutralized to zero so the action
/// still flows through dispatch and audit without effect.
fn sanitize_amount(candidate: &CandidateAction, field: &str, trail: &mut Vec<String>) -> f64 {
    match candidate.amount_field(field) {
        Some(amount) if amount >= 0.0 && amount.is_finite() => amount,
        _ => {
            trail.push(format!("AMOUNT_FORCED_TO_ZERO:{field}"));
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_risk() -> RiskSignal {
        RiskSignal {
            value: 0.05,
            autonomy_threshold: 0.45,
            hard_threshold: 0.5,
        }
    }

    fn candidate(value: serde_json::Value) -> CandidateAction {
        CandidateAction::from_value(value)
    }

    #[test]
    fn unknown_command_is_rejected() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(
            &candidate(serde_json::json!({ "command": "drain_all_funds" })),
            &low_risk(),
        );
        assert_eq!(
            result.action,
            ValidatedAction::NoOp {
                reason: NoOpReason::InvalidCommand
            }
        );
    }

    #[test]
    fn missing_command_is_a_parse_failure() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(&candidate(serde_json::json!({ "amount": 5 })), &low_risk());
        assert_eq!(
            result.action,
            ValidatedAction::NoOp {
                reason: NoOpReason::ParseFailure
            }
        );
    }

    #[test]
    fn generator_declined_passthrough() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(&CandidateAction::no_operation(), &low_risk());
        assert_eq!(
            result.action,
            ValidatedAction::NoOp {
                reason: NoOpReason::GeneratorDeclined
            }
        );
    }

    #[test]
    fn unsupported_currency_is_forced_to_default() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(
            &candidate(serde_json::json!({
                "command": "mint", "user": "User_A", "currency": "DOGE", "amount": 10.0
            })),
            &low_risk(),
        );
        assert_eq!(
            result.action,
            ValidatedAction::Mint {
                user: "User_A".to_string(),
                currency: "USD".to_string(),
                amount: 10.0,
            }
        );
        assert!(result.trail.contains(&"CURRENCY_FORCED:currency".to_string()));
    }

    #[test]
    fn negative_amount_is_forced_to_zero() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(
            &candidate(serde_json::json!({
                "command": "mint", "user": "User_A", "currency": "USD", "amount": -50.0
            })),
            &low_risk(),
        );
        assert_eq!(
            result.action,
            ValidatedAction::Mint {
                user: "User_A".to_string(),
                currency: "USD".to_string(),
                amount: 0.0,
            }
        );
        assert!(result
            .trail
            .contains(&"AMOUNT_FORCED_TO_ZERO:amount".to_string()));
    }

    #[test]
    fn non_numeric_amount_is_forced_to_zero() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(
            &candidate(serde_json::json!({
                "command": "transfer", "sender": "User_A", "recipient": "User_B",
                "currency": "USD", "amount": "a million"
            })),
            &low_risk(),
        );
        assert_eq!(
            result.action,
            ValidatedAction::Transfer {
                sender: "User_A".to_string(),
                recipient: "User_B".to_string(),
                currency: "USD".to_string(),
                amount: 0.0,
            }
        );
    }

    #[test]
    fn oversized_mint_is_clamped_to_ceiling_fraction() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(
            &candidate(serde_json::json!({
                "command": "mint", "user": "User_A", "currency": "USD", "amount": 1_000_000.0
            })),
            &low_risk(),
        );
        match result.action {
            ValidatedAction::Mint { amount, .. } => assert!((amount - 100.0).abs() < 1e-9),
            other => panic!("expected mint, got {:?}", other),
        }
        assert!(result.trail.contains(&"AMOUNT_CLAMPED".to_string()));
    }

    #[test]
    fn mint_within_ceiling_and_low_risk_is_untouched() {
        let filter = CorrectionFilter::default();
        let result = filter.correct(
            &candidate(serde_json::json!({
                "command": "mint", "user": "User_A", "currency": "USD", "amount": 100.0
            })),
            &low_risk(),
        );
        assert_eq!(
            result.action,
            ValidatedAction::Mint {
                user: "User_A".to_string(),
                currency: "USD".to_string(),
                amount: 100.0,
            }
        );
        assert!(result.trail.is_empty());
    }

    #[test]
    fn mint_above_hard_threshold_is_refused() {
        let filter = CorrectionFilter::default();
        let risk = RiskSignal {
            value: 0.6,
            autonomy_threshold: 0.45,
            hard_threshold: 0.5,
        };
        let result = filter.correct(
            &candidate(serde_json::json!({
                "command": "mint", "user": "User_A", "currency": "USD", "amount": 10.0
            })),
            &risk,
        );
        assert_eq!(
            result.action,
            ValidatedAction::NoOp {
                reason: NoOpReason::TensionTooHigh
            }
        );
    }

    #[test]
    fn elevated_but_subcritical_risk_clamps_small_mints() {
        let filter = CorrectionFilter::default();
        let risk = RiskSignal {
            value: 0.3,
            autonomy_threshold: 0.45,
            hard_threshold: 0.5,
        };
        let result = filter.correct(
            &candidate(serde_json::json!({
                "command": "mint", "user": "User_A", "currency": "USD", "amount": 400.0
            })),
            &risk,
        );
        match result.action {
            ValidatedAction::Mint { amount, .. } => assert!((amount - 100.0).abs() < 1e-9),
            other => panic!("expected mint, got {:?}", other),
        }
    }

    #[test]
    fn filter_is_deterministic() {
        let filter = CorrectionFilter::default();
        let payload = serde_json::json!({
            "command": "exchange", "user": "User_A",
            "from_currency": "USD", "to_currency": "ZZZ", "from_amount": 25.0
        });
        let first = filter.correct(&candidate(payload.clone()), &low_risk());
        let second = filter.correct(&candidate(payload), &low_risk());
        assert_eq!(first.action, second.action);
        assert_eq!(first.trail, second.trail);
    }
}

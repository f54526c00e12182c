use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk ledger thresholds and decay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub initial_value: f64,
    /// Soft threshold: crossing it triggers one autonomy correction per cycle.
    pub autonomy_threshold: f64,
    /// Stricter rejection sub-threshold: above it the correction filter
    /// refuses new mint actions rather than clamping them.
    pub hard_threshold: f64,
    /// Subtracted once per orchestrated cycle, floored at zero.
    pub decay_rate: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_value: 0.05,
            autonomy_threshold: 0.45,
            hard_threshold: 0.5,
            decay_rate: 0.01,
        }
    }
}

/// Friction coefficients applied to the USD-equivalent magnitude of a
/// dispatched action, plus fixed penalties for failure modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Minting carries the highest friction.
    pub mint_friction: f64,
    pub transfer_friction: f64,
    pub exchange_friction: f64,
    /// Added when reconciliation diverges from actual state.
    pub verification_failure_penalty: f64,
    /// Added when the executor fails and the action had no measurable magnitude.
    pub execution_failure_penalty: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            mint_friction: 0.005,
            transfer_friction: 0.002,
            exchange_friction: 0.001,
            verification_failure_penalty: 0.1,
            execution_failure_penalty: 0.05,
        }
    }
}

/// Read-only view of the ledger handed to the correction filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSignal {
    pub value: f64,
    pub autonomy_threshold: f64,
    pub hard_threshold: f64,
}

/// Record of one autonomy self-correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyCorrection {
    pub fired_at: DateTime<Utc>,
    pub value_before: f64,
    pub value_after: f64,
}

/// Scalar risk metric with decay and threshold-triggered self-correction.
///
/// Initialized once per session and mutated only through `increase`, `decay`,
/// and `autonomy_correct`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLedger {
    value: f64,
    config: RiskConfig,
    corrections: Vec<AutonomyCorrection>,
}

impl RiskLedger {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            value: config.initial_value.max(0.0),
            config,
            corrections: Vec::new(),
        }
    }

    /// Rehydrate from a persisted value, keeping configured thresholds.
    pub fn with_value(config: RiskConfig, value: f64) -> Self {
        Self {
            value: value.max(0.0),
            config,
            corrections: Vec::new(),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn signal(&self) -> RiskSignal {
        RiskSignal {
            value: self.value,
            autonomy_threshold: self.config.autonomy_threshold,
            hard_threshold: self.config.hard_threshold,
        }
    }

    pub fn corrections(&self) -> &[AutonomyCorrection] {
        &self.corrections
    }

    /// Add a non-negative weighted cost for a just-dispatched action.
    pub fn increase(&mut self, weighted_cost: f64) {
        let cost = weighted_cost.max(0.0);
        if cost > 0.0 {
            self.value += cost;
            tracing::debug!(cost, value = self.value, "Risk increased");
        }
    }

    /// Subtract `decay_rate * ticks`, floored at zero.
    pub fn decay(&mut self, ticks: u32) {
        self.value = (self.value - self.config.decay_rate * f64::from(ticks)).max(0.0);
    }

    pub fn above_autonomy_threshold(&self) -> bool {
        self.value >= self.config.autonomy_threshold
    }

    /// Forcibly halve the value and record the correction.
    ///
    /// The correction itself incurs no additional risk cost. Callers enforce
    /// the once-per-cycle policy; this method only performs the halving.
    pub fn autonomy_correct(&mut self) -> AutonomyCorrection {
        let before = self.value;
        self.value *= 0.5;
        let correction = AutonomyCorrection {
            fired_at: Utc::now(),
            value_before: before,
            value_after: self.value,
        };
        tracing::warn!(
            value_before = before,
            value_after = self.value,
            "Autonomy correction fired"
        );
        self.corrections.push(correction.clone());
        correction
    }

    /// Administrative reset back to the configured initial value.
    pub fn reset(&mut self) {
        self.value = self.config.initial_value.max(0.0);
        self.corrections.clear();
    }
}

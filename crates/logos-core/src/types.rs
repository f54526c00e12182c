use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Command names the correction filter admits.
pub const COMMAND_MINT: &str = "mint";
pub const COMMAND_TRANSFER: &str = "transfer";
pub const COMMAND_EXCHANGE: &str = "exchange";
pub const COMMAND_NO_OPERATION: &str = "no_operation";

/// The closed command set advertised to candidate generators.
pub const ALLOWED_COMMANDS: [&str; 3] = [COMMAND_MINT, COMMAND_TRANSFER, COMMAND_EXCHANGE];

/// Untrusted structured payload produced by a candidate generator.
///
/// Nothing about the shape is guaranteed: the command field may be missing,
/// amounts may be strings or negative, currencies may be unknown. Only the
/// correction filter reads this type; it is created per request and consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAction(Value);

impl CandidateAction {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Degraded-generator payload: the canonical no-operation shape.
    pub fn no_operation() -> Self {
        Self(serde_json::json!({ "command": COMMAND_NO_OPERATION }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn command(&self) -> Option<&str> {
        self.0.get("command").and_then(Value::as_str)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Numeric field as given, without sanitization. `None` when absent or
    /// not representable as f64 (the filter decides what to force it to).
    pub fn amount_field(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }
}

/// Why the filter replaced a candidate with a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoOpReason {
    ParseFailure,
    InvalidCommand,
    TensionTooHigh,
    GeneratorDeclined,
}

impl NoOpReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseFailure => "PARSE_FAILURE",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::TensionTooHigh => "TENSION_TOO_HIGH",
            Self::GeneratorDeclined => "GENERATOR_DECLINED",
        }
    }
}

/// Fully type-checked action admitted by the correction filter.
///
/// Variants carry only their required fields and are never mutated after
/// creation. Unknown commands cannot reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ValidatedAction {
    Mint {
        user: String,
        currency: String,
        amount: f64,
    },
    Transfer {
        sender: String,
        recipient: String,
        currency: String,
        amount: f64,
    },
    Exchange {
        user: String,
        from_currency: String,
        to_currency: String,
        from_amount: f64,
    },
    NoOp {
        reason: NoOpReason,
    },
}

impl ValidatedAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Mint { .. } => COMMAND_MINT,
            Self::Transfer { .. } => COMMAND_TRANSFER,
            Self::Exchange { .. } => COMMAND_EXCHANGE,
            Self::NoOp { .. } => COMMAND_NO_OPERATION,
        }
    }
}

/// Filter output: the admitted action plus the lossy-correction trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectedAction {
    pub action: ValidatedAction,
    /// Ordered annotations such as `CURRENCY_FORCED:currency`,
    /// `AMOUNT_FORCED_TO_ZERO:amount`, `AMOUNT_CLAMPED`.
    pub trail: Vec<String>,
}

impl CorrectedAction {
    pub fn clean(action: ValidatedAction) -> Self {
        Self {
            action,
            trail: Vec::new(),
        }
    }

    pub fn rejected(reason: NoOpReason) -> Self {
        Self {
            action: ValidatedAction::NoOp { reason },
            trail: Vec::new(),
        }
    }
}

/// Dispatch outcome recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failure { detail: String },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Exchange fill details captured at dispatch time.
///
/// The rate is persisted so the invariant verifier can replay the exchange
/// exactly instead of re-deriving market state at verification time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFill {
    pub to_amount: f64,
    /// Units of target currency credited per unit of source currency.
    pub rate: f64,
}

/// Receipt returned by the domain action executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReceipt {
    /// False for neutralized actions (forced-zero amounts, no-ops).
    pub mutated: bool,
    pub detail: String,
    pub exchange_fill: Option<ExchangeFill>,
}

impl DispatchReceipt {
    pub fn no_effect(detail: impl Into<String>) -> Self {
        Self {
            mutated: false,
            detail: detail.into(),
            exchange_fill: None,
        }
    }

    pub fn mutated(detail: impl Into<String>) -> Self {
        Self {
            mutated: true,
            detail: detail.into(),
            exchange_fill: None,
        }
    }

    pub fn with_exchange_fill(mut self, fill: ExchangeFill) -> Self {
        self.exchange_fill = Some(fill);
        self
    }
}

/// Terminal status of one orchestrated cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Success,
    Rejected,
    CoreExecutionFailure,
    VerificationFailed,
    Fatal,
}

/// Public result of the orchestrator. The orchestrator never throws; every
/// failure mode is represented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub trace_id: String,
    pub status: CycleStatus,
    pub action: ValidatedAction,
    pub trail: Vec<String>,
    pub receipt: Option<DispatchReceipt>,
    pub detail: String,
}

impl CycleReport {
    pub fn new_trace_id() -> String {
        Uuid::new_v4().to_string()
    }
}

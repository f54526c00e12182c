use thiserror::Error;

/// Logos core errors.
///
/// Filter-level outcomes (parse failure, policy rejection) are never errors;
/// they resolve to `NoOp` actions. This enum covers the executor's typed
/// failures plus infrastructure faults.
#[derive(Debug, Error)]
pub enum LogosError {
    #[error("Unknown account '{0}'")]
    UnknownAccount(String),

    #[error("Insufficient {currency} balance for '{account}': have {available}, need {requested}")]
    InsufficientBalance {
        account: String,
        currency: String,
        available: f64,
        requested: f64,
    },

    #[error("Exchange source and target must differ (both '{0}')")]
    SameCurrencyExchange(String),

    #[error("Unsupported currency '{0}'")]
    UnsupportedCurrency(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Candidate generator failed: {0}")]
    Generator(String),

    #[error("Dispatch timed out after {0}ms")]
    DispatchTimeout(u64),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Audit log error: {0}")]
    AuditLog(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LogosError {
    pub fn stage_violation(expected: &str, actual: &str) -> Self {
        Self::InvariantViolation(format!(
            "stage order violation: expected '{}', got '{}'",
            expected, actual
        ))
    }
}

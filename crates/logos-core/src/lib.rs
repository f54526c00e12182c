//! Logos command-admission and audit core.
//!
//! This crate mediates between an untrusted, free-form instruction source and
//! state-mutating domain operations: a deterministic correction filter
//! sanitizes candidate actions, a decaying risk ledger self-throttles, and an
//! audit pipeline snapshots state, appends an immutable execution log, and
//! reconciles expected against actual balances after every cycle.

#![deny(unsafe_code)]

pub mod accounts;
pub mod audit;
pub mod error;
pub mod executor;
pub mod filter;
pub mod flow;
pub mod generator;
pub mod risk;
pub mod runtime;
pub mod storage;
pub mod types;

pub use accounts::{AccountState, RateTable};
pub use audit::{
    state_fingerprint, AuditConfig, AuditLog, AuditLogEntry, AuditPipeline, AuditSnapshot,
    Divergence, InvariantVerifier, SnapshotHistory, VerificationReport,
};
pub use error::LogosError;
pub use executor::ActionExecutor;
pub use filter::{CorrectionFilter, FilterConfig};
pub use flow::{CycleStage, CycleStageMachine};
pub use generator::{generate_with_retry, summarize_state, CandidateGenerator, RetryPolicy};
pub use risk::{AutonomyCorrection, RiskConfig, RiskLedger, RiskSignal, RiskWeights};
pub use runtime::{EngineConfig, LogosEngine, StoreConfig};
pub use storage::{PersistedState, StateStore};
pub use types::{
    ActionOutcome, CandidateAction, CorrectedAction, CycleReport, CycleStatus, DispatchReceipt,
    ExchangeFill, NoOpReason, ValidatedAction, ALLOWED_COMMANDS, COMMAND_EXCHANGE, COMMAND_MINT,
    COMMAND_NO_OPERATION, COMMAND_TRANSFER,
};

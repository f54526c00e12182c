use crate::error::LogosError;

/// Stages of one orchestrated admission cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Initialized,
    Snapshot,
    Filter,
    Dispatch,
    Log,
    Verify,
    RiskCheck,
    Done,
}

impl CycleStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Snapshot => "snapshot",
            Self::Filter => "filter",
            Self::Dispatch => "dispatch",
            Self::Log => "log",
            Self::Verify => "verify",
            Self::RiskCheck => "risk_check",
            Self::Done => "done",
        }
    }
}

/// Enforces snapshot->filter->dispatch->log->verify->risk_check->done ordering.
///
/// Dispatch may be skipped only through the explicit rejection transition, so
/// a rejected action still reaches the log stage and never silently drops.
#[derive(Debug, Clone)]
pub struct CycleStageMachine {
    trace_id: String,
    stage: CycleStage,
}

impl CycleStageMachine {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            stage: CycleStage::Initialized,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    pub fn mark_snapshot(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::Initialized, CycleStage::Snapshot)
    }

    pub fn mark_filter(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::Snapshot, CycleStage::Filter)
    }

    pub fn mark_dispatch(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::Filter, CycleStage::Dispatch)
    }

    /// Rejection path: the filter produced a no-op, dispatch is skipped and
    /// the cycle moves straight to logging.
    pub fn mark_rejected(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::Filter, CycleStage::Log)
    }

    pub fn mark_log(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::Dispatch, CycleStage::Log)
    }

    pub fn mark_verify(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::Log, CycleStage::Verify)
    }

    pub fn mark_risk_check(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::Verify, CycleStage::RiskCheck)
    }

    pub fn mark_done(&mut self) -> Result<(), LogosError> {
        self.advance(CycleStage::RiskCheck, CycleStage::Done)
    }

    fn advance(&mut self, expected: CycleStage, next: CycleStage) -> Result<(), LogosError> {
        if self.stage != expected {
            return Err(LogosError::stage_violation(
                expected.name(),
                self.stage.name(),
            ));
        }
        self.stage = next;
        Ok(())
    }
}

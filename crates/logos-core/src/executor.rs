use crate::accounts::AccountState;
use crate::error::LogosError;
use crate::types::{DispatchReceipt, ValidatedAction};
use async_trait::async_trait;

/// Domain action executor (external collaborator).
///
/// The executor is the only component allowed to mutate account state. It
/// must treat zero-amount actions as no-effect successes so neutralized
/// candidates still flow through dispatch and audit, and it must surface the
/// typed errors in `LogosError` (unknown account, insufficient balance,
/// same-currency exchange, unsupported currency) instead of panicking.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn dispatch(
        &self,
        action: &ValidatedAction,
        accounts: &mut AccountState,
    ) -> Result<DispatchReceipt, LogosError>;
}

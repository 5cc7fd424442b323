use kiara_core::error::CoreError;
use kiara_providers::ProviderError;

use crate::store::StoreError;

/// Errors from one dispatch attempt.
///
/// Every variant raised after credits were reserved has already been
/// refunded by the time the caller sees it.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Client-side problems: unknown model, validation, credits, rate limit.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Upstream failure, timeout, cancellation, or provider misconfiguration.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The provider reported success but no output could be extracted.
    #[error("Provider returned no outputs")]
    NormalizationMiss { task_id: Option<String> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Upstream task id, when the failure happened after submission.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Provider(e) => e.task_id(),
            Self::NormalizationMiss { task_id } => task_id.as_deref(),
            _ => None,
        }
    }
}

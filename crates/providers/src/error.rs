use kiara_core::error::CoreError;

/// Errors from upstream provider calls and job supervision.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, per-call timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider message, or the raw body when none could be extracted.
        message: String,
    },

    /// 2xx response whose body carries a failure code.
    #[error("Provider rejected the request: {message}")]
    Rejected { code: Option<i64>, message: String },

    /// The response body did not have the expected shape.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The provider reported the job as failed.
    #[error("Job {task_id} failed: {message}")]
    JobFailed { task_id: String, message: String },

    /// The provider reported the job as canceled.
    #[error("Job {task_id} was canceled by the provider")]
    JobCanceled { task_id: String },

    /// The job did not reach a terminal state within the poll budget.
    #[error("Job {task_id} timed out after {elapsed_secs}s")]
    TimedOut { task_id: String, elapsed_secs: u64 },

    /// The caller went away; provider work was abandoned.
    #[error("Generation canceled by caller")]
    Canceled { task_id: Option<String> },

    /// Missing credentials, workflow id, or node assignments.
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// Job state machine violation.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ProviderError {
    /// Upstream task id, when the failure happened after submission.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::JobFailed { task_id, .. }
            | Self::JobCanceled { task_id }
            | Self::TimedOut { task_id, .. } => Some(task_id),
            Self::Canceled { task_id } => task_id.as_deref(),
            _ => None,
        }
    }
}

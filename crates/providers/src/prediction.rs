//! Async-poll adapter for Replicate-style predictions.
//!
//! Submission posts `{input}` (or `{version, input}` when the endpoint is
//! pinned as `owner/model:version`) and returns a prediction id. Providers
//! that honor `Prefer: wait` may answer with a finished prediction, which
//! completes immediately.

use async_trait::async_trait;
use kiara_core::normalize::normalize;
use kiara_core::registry::ProviderKind;
use serde_json::{json, Value};

use crate::adapter::{JobHandle, JobRequest, PollStatus, ProviderAdapter};
use crate::error::ProviderError;
use crate::http::{first_id, ServiceClient};

const STATUS_SUCCEEDED: &str = "succeeded";
const STATUS_FAILED: &str = "failed";
const STATUS_CANCELED: &str = "canceled";

/// Adapter for prediction-style queues.
pub struct PredictionAdapter {
    http: ServiceClient,
}

impl PredictionAdapter {
    pub fn new(http: ServiceClient) -> Self {
        Self { http }
    }

    /// Map a prediction object onto a poll observation.
    fn interpret(prediction: &Value) -> PollStatus {
        match prediction.get("status").and_then(Value::as_str) {
            Some(STATUS_SUCCEEDED) => PollStatus::Succeeded {
                output_urls: normalize(prediction),
            },
            Some(STATUS_FAILED) => PollStatus::Failed {
                message: prediction
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("prediction failed")
                    .to_string(),
            },
            Some(STATUS_CANCELED) => PollStatus::Canceled,
            _ => PollStatus::Pending,
        }
    }
}

/// Split `owner/model:version` into the create path and request body.
fn create_call(endpoint: &str, input: &Value) -> (String, Value) {
    match endpoint.split_once(':') {
        Some((_, version)) => (
            "predictions".to_string(),
            json!({ "version": version, "input": input }),
        ),
        None => (
            format!("models/{}/predictions", endpoint.trim_matches('/')),
            json!({ "input": input }),
        ),
    }
}

#[async_trait]
impl ProviderAdapter for PredictionAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AsyncPoll
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ProviderError> {
        let JobRequest::Http { endpoint, body } = request else {
            return Err(ProviderError::Configuration(
                "prediction providers take an HTTP request body".into(),
            ));
        };

        let (path, payload) = create_call(endpoint, body);
        let prediction = self
            .http
            .post_json_with(&path, &payload, &[("Prefer", "wait")])
            .await?;

        let task_id = first_id(&prediction, &["id"]).ok_or_else(|| {
            ProviderError::InvalidResponse("prediction response has no id".into())
        })?;

        match Self::interpret(&prediction) {
            PollStatus::Succeeded { output_urls } => Ok(JobHandle::Completed {
                task_id: Some(task_id),
                output_urls,
            }),
            PollStatus::Failed { message } => Err(ProviderError::JobFailed { task_id, message }),
            PollStatus::Canceled => Err(ProviderError::JobCanceled { task_id }),
            PollStatus::Pending => {
                tracing::debug!(task_id = %task_id, "Prediction queued");
                Ok(JobHandle::Pending { task_id })
            }
        }
    }

    async fn check_status(&self, task_id: &str) -> Result<PollStatus, ProviderError> {
        let prediction = self.http.get_json(&format!("predictions/{task_id}")).await?;
        Ok(Self::interpret(&prediction))
    }
}

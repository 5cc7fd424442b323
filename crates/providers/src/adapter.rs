//! The provider adapter seam.

use async_trait::async_trait;
use kiara_core::registry::{ModelConfig, ProviderKind, ProviderService};
use kiara_core::template::NodeAssignment;
use serde_json::Value;

use crate::direct::DirectSyncAdapter;
use crate::error::ProviderError;
use crate::http::{AuthScheme, ServiceClient};
use crate::prediction::PredictionAdapter;
use crate::settings::ProviderSettings;
use crate::workflow::WorkflowAdapter;

/// A fully-built provider request.
#[derive(Debug, Clone)]
pub enum JobRequest {
    /// Semantic JSON body posted to a model endpoint.
    Http { endpoint: String, body: Value },
    /// Node-graph workflow execution.
    Workflow {
        workflow_id: String,
        assignments: Vec<NodeAssignment>,
    },
}

/// What a submission returned.
#[derive(Debug, Clone, PartialEq)]
pub enum JobHandle {
    /// The provider answered synchronously with outputs.
    Completed {
        task_id: Option<String>,
        output_urls: Vec<String>,
    },
    /// The provider queued the job; poll `task_id`.
    Pending { task_id: String },
}

/// One status-check observation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Pending,
    Succeeded { output_urls: Vec<String> },
    Failed { message: String },
    Canceled,
}

/// One upstream wire protocol.
///
/// `output_urls` may be empty; the caller decides whether that is an error.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Send the job to the provider.
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ProviderError>;

    /// Issue exactly one status check for a pending job.
    async fn check_status(&self, task_id: &str) -> Result<PollStatus, ProviderError>;
}

/// Build the adapter for `model`, binding it to its service credentials.
///
/// Fails with [`ProviderError::Configuration`] when the service has no API
/// key.
pub fn build_adapter(
    client: &reqwest::Client,
    settings: &ProviderSettings,
    model: &ModelConfig,
) -> Result<Box<dyn ProviderAdapter>, ProviderError> {
    let service = settings.service(model.service);
    let auth = match (model.provider, model.service) {
        (ProviderKind::NodeGraph, _) => AuthScheme::Body,
        (_, ProviderService::Fal) => AuthScheme::Key,
        _ => AuthScheme::Bearer,
    };
    let http = ServiceClient::new(client.clone(), service, auth, settings.http_timeout)?;

    Ok(match model.provider {
        ProviderKind::DirectSync => Box::new(DirectSyncAdapter::new(http, model.success_code)),
        ProviderKind::AsyncPoll => Box::new(PredictionAdapter::new(http)),
        ProviderKind::NodeGraph => Box::new(WorkflowAdapter::new(http)),
    })
}

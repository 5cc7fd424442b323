//! Node-graph adapter for RunningHub-style workflow execution.
//!
//! Every call is a POST carrying `apiKey` in the body and answered with an
//! envelope `{code, msg, data}` where `code == 0` means success. A task is
//! created from `{workflowId, nodeInfoList}`, polled via the status
//! endpoint, and its files are listed by the outputs endpoint once it
//! succeeds.

use async_trait::async_trait;
use kiara_core::normalize::collect_urls;
use kiara_core::registry::ProviderKind;
use serde_json::{json, Value};

use crate::adapter::{JobHandle, JobRequest, PollStatus, ProviderAdapter};
use crate::error::ProviderError;
use crate::http::{first_id, provider_message, ServiceClient};

const CREATE_PATH: &str = "task/openapi/create";
const STATUS_PATH: &str = "task/openapi/status";
const OUTPUTS_PATH: &str = "task/openapi/outputs";

const SUCCESS_STATUSES: &[&str] = &["SUCCESS", "SUCCEEDED", "COMPLETED", "FINISHED"];
const FAILURE_STATUSES: &[&str] = &["FAILED", "FAIL", "ERROR"];
const CANCEL_STATUSES: &[&str] = &["CANCELED", "CANCELLED"];

/// Adapter for workflow-execution providers.
pub struct WorkflowAdapter {
    http: ServiceClient,
}

impl WorkflowAdapter {
    pub fn new(http: ServiceClient) -> Self {
        Self { http }
    }

    /// POST `payload` plus the API key and unwrap the `{code, msg, data}`
    /// envelope.
    async fn call(&self, path: &str, mut payload: Value) -> Result<Value, ProviderError> {
        if let Value::Object(obj) = &mut payload {
            obj.insert("apiKey".into(), Value::String(self.http.api_key().to_string()));
        }
        let envelope = self.http.post_json(path, &payload).await?;

        let code = envelope.get("code").and_then(code_as_i64);
        if code != Some(0) {
            return Err(ProviderError::Rejected {
                code,
                message: provider_message(&envelope)
                    .unwrap_or_else(|| "unknown workflow error".to_string()),
            });
        }
        Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// Envelope codes arrive as numbers or numeric strings.
fn code_as_i64(code: &Value) -> Option<i64> {
    match code {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Status text from a bare string or an object field, upper-cased.
fn normalize_status(data: &Value) -> String {
    let raw = match data {
        Value::String(s) => Some(s.as_str()),
        _ => ["status", "taskStatus", "state", "task_state"]
            .iter()
            .find_map(|k| data.get(*k).and_then(Value::as_str)),
    };
    raw.unwrap_or_default().trim().to_uppercase()
}

/// Failure detail from a status payload.
fn failure_detail(data: &Value) -> String {
    ["errorMessage", "error_message", "nodeMessage", "message"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or("Workflow execution failed")
        .to_string()
}

#[async_trait]
impl ProviderAdapter for WorkflowAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::NodeGraph
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ProviderError> {
        let JobRequest::Workflow {
            workflow_id,
            assignments,
        } = request
        else {
            return Err(ProviderError::Configuration(
                "node-graph providers take a workflow request".into(),
            ));
        };
        if workflow_id.trim().is_empty() {
            return Err(ProviderError::Configuration("workflow id is missing".into()));
        }
        if assignments.is_empty() {
            return Err(ProviderError::Configuration(
                "workflow has no node assignments".into(),
            ));
        }

        let data = self
            .call(
                CREATE_PATH,
                json!({ "workflowId": workflow_id, "nodeInfoList": assignments }),
            )
            .await?;

        let task_id = first_id(&data, &["taskId", "task_id", "id"]).ok_or_else(|| {
            ProviderError::InvalidResponse("workflow create returned no task id".into())
        })?;
        tracing::debug!(task_id = %task_id, workflow_id = %workflow_id, "Workflow task created");
        Ok(JobHandle::Pending { task_id })
    }

    async fn check_status(&self, task_id: &str) -> Result<PollStatus, ProviderError> {
        let data = self.call(STATUS_PATH, json!({ "taskId": task_id })).await?;
        let status = normalize_status(&data);

        if SUCCESS_STATUSES.contains(&status.as_str()) {
            let outputs = self.call(OUTPUTS_PATH, json!({ "taskId": task_id })).await?;
            return Ok(PollStatus::Succeeded {
                output_urls: collect_urls(&outputs),
            });
        }
        if FAILURE_STATUSES.contains(&status.as_str()) {
            return Ok(PollStatus::Failed {
                message: failure_detail(&data),
            });
        }
        if CANCEL_STATUSES.contains(&status.as_str()) {
            return Ok(PollStatus::Canceled);
        }
        Ok(PollStatus::Pending)
    }
}

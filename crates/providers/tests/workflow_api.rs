mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use kiara_core::template::NodeAssignment;
use kiara_providers::{execute, JobRequest, ProviderError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn graph_model() -> kiara_core::registry::ModelConfig {
    common::model(json!({
        "model_id": "kiara-z-max",
        "provider": "node-graph",
        "service": "runninghub",
        "endpoint_template": "",
        "node_graph": { "workflow_id": "1987" },
        "cost": { "base": 20 }
    }))
}

fn request() -> JobRequest {
    JobRequest::Workflow {
        workflow_id: "1987".into(),
        assignments: vec![NodeAssignment::new("6", "text", json!("a fox"))],
    }
}

async fn mount_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/task/openapi/create"))
        .and(body_partial_json(json!({
            "apiKey": "test-api-key",
            "workflowId": "1987",
            "nodeInfoList": [{ "nodeId": "6", "fieldName": "text", "fieldValue": "a fox" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "success",
            "data": { "taskId": 1_900_000_001_i64, "taskStatus": "QUEUED" }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn workflow_runs_to_success_and_collects_outputs() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    Mock::given(method("POST"))
        .and(path("/task/openapi/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": "RUNNING" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/task/openapi/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "status": "success" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/task/openapi/outputs"))
        .and(body_partial_json(json!({ "taskId": "1900000001" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": [
                { "fileUrl": "https://rh-cdn/1.png", "fileType": "png" },
                { "fileUrl": "https://rh-cdn/1.png", "fileType": "png" },
                { "fileUrl": "https://rh-cdn/2.png", "fileType": "png" }
            ]
        })))
        .mount(&server)
        .await;

    let adapter = common::adapter(&server.uri(), &graph_model());
    let outcome = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.task_id.as_deref(), Some("1900000001"));
    assert_eq!(
        outcome.output_urls,
        vec!["https://rh-cdn/1.png", "https://rh-cdn/2.png"]
    );
}

#[tokio::test]
async fn workflow_failure_reports_node_message() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    Mock::given(method("POST"))
        .and(path("/task/openapi/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "taskStatus": "FAILED", "nodeMessage": "LoRA not found" }
        })))
        .mount(&server)
        .await;

    let adapter = common::adapter(&server.uri(), &graph_model());
    let err = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_matches!(err, ProviderError::JobFailed { message, .. } if message == "LoRA not found");
}

#[tokio::test]
async fn non_zero_envelope_code_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/task/openapi/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 421,
            "msg": "TASK_QUEUE_MAXED"
        })))
        .mount(&server)
        .await;

    let adapter = common::adapter(&server.uri(), &graph_model());
    let err = adapter.submit(&request()).await.unwrap_err();

    assert_matches!(
        err,
        ProviderError::Rejected { code: Some(421), message } if message == "TASK_QUEUE_MAXED"
    );
}

#[tokio::test]
async fn empty_assignments_never_reach_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = common::adapter(&server.uri(), &graph_model());
    let err = adapter
        .submit(&JobRequest::Workflow {
            workflow_id: "1987".into(),
            assignments: vec![],
        })
        .await
        .unwrap_err();

    assert_matches!(err, ProviderError::Configuration(_));
}

#[tokio::test]
async fn cancellation_aborts_polling() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    Mock::given(method("POST"))
        .and(path("/task/openapi/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 0, "data": "RUNNING" }))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let adapter = common::adapter(&server.uri(), &graph_model());
    let err = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_secs(5)),
        &cancel,
    )
    .await
    .unwrap_err();

    assert_matches!(err, ProviderError::Canceled { task_id: Some(id) } if id == "1900000001");
}

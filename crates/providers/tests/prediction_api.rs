mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use kiara_providers::{execute, JobRequest, ProviderError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ltx_model() -> kiara_core::registry::ModelConfig {
    common::model(json!({
        "model_id": "ltx-video",
        "provider": "async-poll",
        "service": "replicate",
        "endpoint_template": "lightricks/ltx-video",
        "cost": { "base": 10 }
    }))
}

fn request() -> JobRequest {
    JobRequest::Http {
        endpoint: "lightricks/ltx-video".into(),
        body: json!({ "prompt": "a fox" }),
    }
}

async fn mount_create(server: &MockServer, status: &str) {
    Mock::given(method("POST"))
        .and(path("/models/lightricks/ltx-video/predictions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(header("Prefer", "wait"))
        .and(body_json(json!({ "input": { "prompt": "a fox" } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p1",
            "status": status,
            "output": null
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn prediction_succeeds_after_polling() {
    let server = MockServer::start().await;
    mount_create(&server, "starting").await;
    Mock::given(method("GET"))
        .and(path("/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1", "status": "processing" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p1",
            "status": "succeeded",
            "output": "https://replicate.delivery/out.mp4"
        })))
        .mount(&server)
        .await;

    let model = ltx_model();
    let adapter = common::adapter(&server.uri(), &model);
    let outcome = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.task_id.as_deref(), Some("p1"));
    assert_eq!(outcome.output_urls, vec!["https://replicate.delivery/out.mp4"]);
    assert_eq!(outcome.polls, 2);
}

#[tokio::test]
async fn prediction_failed_after_two_polls() {
    let server = MockServer::start().await;
    mount_create(&server, "starting").await;
    Mock::given(method("GET"))
        .and(path("/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1", "status": "processing" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p1",
            "status": "failed",
            "error": "CUDA out of memory"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let model = ltx_model();
    let adapter = common::adapter(&server.uri(), &model);
    let err = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_matches!(
        err,
        ProviderError::JobFailed { task_id, message } if task_id == "p1" && message == "CUDA out of memory"
    );
}

#[tokio::test]
async fn finished_submission_completes_without_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p2",
            "status": "succeeded",
            "output": ["https://replicate.delivery/a.png"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let model = ltx_model();
    let adapter = common::adapter(&server.uri(), &model);
    let outcome = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.polls, 0);
    assert_eq!(outcome.output_urls, vec!["https://replicate.delivery/a.png"]);
}

#[tokio::test]
async fn never_terminal_prediction_times_out() {
    let server = MockServer::start().await;
    mount_create(&server, "starting").await;
    Mock::given(method("GET"))
        .and(path("/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1", "status": "processing" })))
        .mount(&server)
        .await;

    let model = ltx_model();
    let adapter = common::adapter(&server.uri(), &model);
    let err = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_millis(150)),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_matches!(err, ProviderError::TimedOut { task_id, .. } if task_id == "p1");
}

#[tokio::test]
async fn status_check_error_ends_loop_without_retry() {
    let server = MockServer::start().await;
    mount_create(&server, "starting").await;
    Mock::given(method("GET"))
        .and(path("/predictions/p1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let model = ltx_model();
    let adapter = common::adapter(&server.uri(), &model);
    let err = execute(
        adapter.as_ref(),
        &request(),
        &common::fast_polls(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_matches!(err, ProviderError::Api { status: 503, message } if message == "upstream down");
}

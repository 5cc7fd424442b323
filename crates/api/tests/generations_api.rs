//! Integration tests for generation dispatch and history endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, get_auth, post_json_auth, token, USER};
use kiara_db::repositories::CreditRepo;
use serde_json::json;
use sqlx::PgPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_flux_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "req-1",
            "images": [{ "url": "https://fal.media/out.png" }]
        })))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn generations_require_a_token(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get(app, "/api/v1/generations").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
    assert_eq!(json["error"], "Missing Authorization header");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn forged_token_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get_auth(app, "/api/v1/generations", "not-a-jwt").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid or expired token");
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_model_touches_no_ledger(pool: PgPool) {
    CreditRepo::grant(&pool, USER, 100).await.unwrap();
    let app = common::build_test_app(pool.clone());

    let response = post_json_auth(
        app,
        "/api/v1/generations",
        json!({ "model_id": "does-not-exist", "prompt": "a fox" }),
        &token(USER),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "MODEL_NOT_FOUND");

    assert_eq!(CreditRepo::balance(&pool, USER).await.unwrap(), 100);
    assert!(CreditRepo::list_for_user(&pool, USER).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn malformed_body_returns_400_json(pool: PgPool) {
    CreditRepo::grant(&pool, USER, 100).await.unwrap();
    let app = common::build_test_app(pool.clone());

    let response = post_json_auth(
        app,
        "/api/v1/generations",
        json!({ "model_id": "flux-dev", "prompt": 42 }),
        &token(USER),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(json["error"].is_string());

    assert_eq!(CreditRepo::balance(&pool, USER).await.unwrap(), 100);
    assert!(CreditRepo::list_for_user(&pool, USER).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn insufficient_credits_returns_402(pool: PgPool) {
    CreditRepo::grant(&pool, USER, 4).await.unwrap();
    let app = common::build_test_app(pool.clone());

    let response = post_json_auth(
        app,
        "/api/v1/generations",
        json!({ "model_id": "flux-dev", "prompt": "a fox" }),
        &token(USER),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INSUFFICIENT_CREDITS");
    assert_eq!(json["details"]["balance"], 4);
    assert_eq!(json["details"]["required"], 10);

    assert_eq!(CreditRepo::balance(&pool, USER).await.unwrap(), 4);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn successful_generation_is_charged_and_recorded(pool: PgPool) {
    let server = MockServer::start().await;
    mock_flux_success(&server).await;
    CreditRepo::grant(&pool, USER, 25).await.unwrap();
    let app = common::build_test_app_with_provider(pool.clone(), &server.uri());
    let bearer = token(USER);

    let response = post_json_auth(
        app.clone(),
        "/api/v1/generations",
        json!({ "model_id": "flux-dev", "prompt": "a fox", "num_images": 1 }),
        &bearer,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["task_id"], "req-1");
    assert_eq!(json["output_urls"], json!(["https://fal.media/out.png"]));
    assert_eq!(json["credits_used"], 10);
    let generation_id = json["generation_id"].as_i64().unwrap();

    assert_eq!(CreditRepo::balance(&pool, USER).await.unwrap(), 15);
    let ledger = CreditRepo::list_for_generation(&pool, generation_id)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind, "reserve");
    assert_eq!(ledger[0].amount, -10);

    // Fetch the record.
    let uri = format!("/api/v1/generations/{generation_id}");
    let response = get_auth(app.clone(), &uri, &bearer).await;
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["data"]["status"], "completed");
    assert_eq!(record["data"]["model_id"], "flux-dev");
    assert_eq!(record["data"]["provider_task_id"], "req-1");
    assert_eq!(record["data"]["credits_cost"], 10);

    // Other users cannot see it.
    let response = get_auth(app.clone(), &uri, &token(USER + 1)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // History listing.
    let response = get_auth(app, "/api/v1/generations?limit=5", &bearer).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 5);
    assert_eq!(page["offset"], 0);
    assert_eq!(page["data"][0]["id"], generation_id);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn provider_failure_refunds_and_marks_failed(pool: PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "GPU pool exhausted" })),
        )
        .mount(&server)
        .await;
    CreditRepo::grant(&pool, USER, 25).await.unwrap();
    let app = common::build_test_app_with_provider(pool.clone(), &server.uri());
    let bearer = token(USER);

    let response = post_json_auth(
        app.clone(),
        "/api/v1/generations",
        json!({ "model_id": "flux-dev", "prompt": "a fox" }),
        &bearer,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PROVIDER_ERROR");

    assert_eq!(CreditRepo::balance(&pool, USER).await.unwrap(), 25);
    let ledger = CreditRepo::list_for_user(&pool, USER).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.iter().map(|t| t.amount).sum::<i64>(), 0);

    let response = get_auth(app, "/api/v1/generations", &bearer).await;
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["status"], "failed");
    assert_eq!(page["data"][0]["output_urls"], json!([]));
}

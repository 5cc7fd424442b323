#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use kiara_core::registry::ModelRegistry;
use kiara_core::types::DbId;
use kiara_pipeline::{GenerationGateway, PgGenerationStore, RateLimit};
use kiara_providers::{PollConfig, ProviderSettings};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use kiara_api::auth::jwt::{Claims, JwtConfig};
use kiara_api::config::ServerConfig;
use kiara_api::router::build_app_router;
use kiara_api::state::AppState;

pub const USER: DbId = 42;

/// Nothing listens here; requests that reach a provider fail fast.
const UNREACHABLE_PROVIDER: &str = "http://127.0.0.1:9";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and no rate limit.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        model_registry_path: PathBuf::from("config/models.json"),
        rate_limit: RateLimit::disabled(),
        jwt: JwtConfig {
            secret: "test-secret-for-integration-tests".to_string(),
        },
    }
}

/// Small catalog: one synchronous image model and one polled video model.
pub fn test_registry() -> ModelRegistry {
    let doc = json!({ "models": [
        {
            "model_id": "flux-dev",
            "display_name": "FLUX.1 [dev]",
            "provider": "direct-sync",
            "service": "fal",
            "endpoint_template": "fal-ai/flux/dev",
            "param_schema": {
                "num_images": { "type": "integer", "minimum": 1, "maximum": 4 }
            },
            "max_images": 4,
            "cost": { "base": 10 }
        },
        {
            "model_id": "ltx-video",
            "provider": "async-poll",
            "service": "replicate",
            "endpoint_template": "lightricks/ltx-video",
            "cost": { "base": 25 }
        }
    ]});
    ModelRegistry::from_json(&doc.to_string()).unwrap()
}

/// Build the full application router with providers that are never reached.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_provider(pool, UNREACHABLE_PROVIDER)
}

/// Build the full application router with every provider pointed at
/// `provider_base_url`.
///
/// Uses the production [`build_app_router`] so integration tests exercise
/// the same middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery).
pub fn build_test_app_with_provider(pool: PgPool, provider_base_url: &str) -> Router {
    let config = test_config();

    let mut providers = ProviderSettings::for_base_url(provider_base_url, "test-api-key");
    providers.poll = PollConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    };

    let gateway = GenerationGateway::new(
        Arc::new(test_registry()),
        Arc::new(PgGenerationStore::new(pool.clone())),
        providers,
        reqwest::Client::new(),
        config.rate_limit,
    );

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        gateway,
        tasks: TaskTracker::new(),
    };

    build_app_router(state, &config)
}

/// Bearer token for `user_id`, signed with the test secret as the account
/// service would sign it.
pub fn token(user_id: DbId) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        exp: now + 15 * 60,
        iat: Some(now),
        jti: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(test_config().jwt.secret.as_bytes()),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(app: Router, uri: &str, body: Value, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

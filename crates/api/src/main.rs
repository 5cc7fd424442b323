use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kiara_core::registry::ModelRegistry;
use kiara_pipeline::{GenerationGateway, PgGenerationStore};
use kiara_providers::ProviderSettings;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiara_api::config::ServerConfig;
use kiara_api::router::build_app_router;
use kiara_api::state::AppState;

const DEFAULT_LOG_FILTER: &str =
    "kiara_api=debug,kiara_pipeline=debug,kiara_providers=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let providers = ProviderSettings::from_env();
    tracing::info!(
        poll_interval_ms = providers.poll.interval.as_millis() as u64,
        poll_timeout_secs = providers.poll.timeout.as_secs(),
        "Loaded provider settings",
    );

    // --- Model registry ---
    let registry = ModelRegistry::load(&config.model_registry_path)
        .unwrap_or_else(|e| panic!("Failed to load model registry: {e}"));
    tracing::info!(
        path = %config.model_registry_path.display(),
        models = registry.len(),
        "Model registry loaded",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = kiara_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    kiara_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    kiara_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Gateway ---
    let gateway = GenerationGateway::new(
        Arc::new(registry),
        Arc::new(PgGenerationStore::new(pool.clone())),
        providers,
        reqwest::Client::new(),
        config.rate_limit,
    );

    // --- App state ---
    let tasks = TaskTracker::new();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        gateway,
        tasks: tasks.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!(
        in_flight = tasks.len(),
        "Server stopped accepting connections, settling in-flight generations",
    );
    tasks.close();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, tasks.wait()).await.is_err() {
        tracing::warn!(
            remaining = tasks.len(),
            "Shutdown timeout elapsed with generations still in flight",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

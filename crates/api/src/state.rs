use std::sync::Arc;

use kiara_pipeline::GenerationGateway;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: kiara_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Generation dispatch pipeline.
    pub gateway: GenerationGateway,
    /// Detached dispatch tasks; drained on shutdown so every reservation settles.
    pub tasks: TaskTracker,
}

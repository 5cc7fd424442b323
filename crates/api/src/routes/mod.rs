pub mod generations;
pub mod health;
pub mod models;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /models                      active model catalog (public)
///
/// /generations                 dispatch (POST), list own (GET)
/// /generations/{id}            fetch own record
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/models", models::router())
        .nest("/generations", generations::router())
}

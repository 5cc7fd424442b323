//! Route definitions for generations.
//!
//! ```text
//! POST   /        create_generation
//! GET    /        list_generations
//! GET    /{id}    get_generation
//! ```

use axum::routing::get;
use axum::Router;

use crate::handlers::generations;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(generations::list_generations).post(generations::create_generation),
        )
        .route("/{id}", get(generations::get_generation))
}

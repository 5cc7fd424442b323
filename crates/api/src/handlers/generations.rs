//! Handlers for generation dispatch and history.
//!
//! Routes:
//! - `POST /generations`      -- dispatch a generation
//! - `GET  /generations`      -- list the caller's generations
//! - `GET  /generations/{id}` -- fetch one of the caller's generations

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use kiara_core::error::CoreError;
use kiara_core::request::GenerationRequest;
use kiara_core::types::DbId;
use kiara_db::models::generation::GenerationRecord;
use kiara_db::repositories::GenerationRecordRepo;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::PaginationParams;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

/// Body of a successful `POST /generations`.
#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub success: bool,
    pub generation_id: DbId,
    pub task_id: Option<String>,
    pub output_urls: Vec<String>,
    pub credits_used: i64,
}

/// POST /api/v1/generations
///
/// The dispatch runs on a tracked task so that it always settles the
/// reservation. If this handler is dropped (client disconnect, request
/// timeout) the drop guard cancels the token and the task refunds.
pub async fn create_generation(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> AppResult<Json<GenerationResponse>> {
    let Json(request) = body?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let gateway = state.gateway.clone();
    let user_id = user.user_id;
    let task = state
        .tasks
        .spawn(async move { gateway.dispatch(user_id, request, cancel).await });

    let result = task
        .await
        .map_err(|e| AppError::InternalError(format!("generation task failed: {e}")))??;

    Ok(Json(GenerationResponse {
        success: true,
        generation_id: result.generation_id,
        task_id: result.task_id,
        output_urls: result.output_urls,
        credits_used: result.credits_used,
    }))
}

/// GET /api/v1/generations/{id}
pub async fn get_generation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<GenerationRecord>>> {
    let record = GenerationRecordRepo::find_for_user(&state.pool, id, user.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Generation",
            id,
        }))?;
    Ok(Json(DataResponse { data: record }))
}

/// GET /api/v1/generations?limit=&offset=
pub async fn list_generations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<PageResponse<GenerationRecord>>> {
    let (limit, offset) = (params.limit(), params.offset());
    let data = GenerationRecordRepo::list_for_user(&state.pool, user.user_id, limit, offset).await?;
    let total = GenerationRecordRepo::count_for_user(&state.pool, user.user_id).await?;
    Ok(Json(PageResponse {
        data,
        total,
        limit,
        offset,
    }))
}

//! Model catalog.

use axum::extract::State;
use axum::Json;
use kiara_core::registry::{ModelConfig, ParamSchema, ProviderKind};
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

/// Public view of one registry entry. Credentials, endpoints, and workflow
/// wiring stay server-side.
#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub model_id: String,
    pub display_name: String,
    pub provider: ProviderKind,
    pub param_schema: ParamSchema,
    pub variants: Vec<String>,
    pub default_variant: Option<String>,
    pub max_images: Option<u32>,
    pub supports_reference_images: bool,
    pub max_reference_images: Option<usize>,
    /// Base credit cost before parameter multipliers.
    pub base_cost: i64,
}

impl From<&ModelConfig> for ModelSummary {
    fn from(model: &ModelConfig) -> Self {
        Self {
            model_id: model.model_id.clone(),
            display_name: model
                .display_name
                .clone()
                .unwrap_or_else(|| model.model_id.clone()),
            provider: model.provider,
            param_schema: model.param_schema.clone(),
            variants: model.variants.keys().cloned().collect(),
            default_variant: model.default_variant.clone(),
            max_images: model.max_images,
            supports_reference_images: model.supports_reference_images,
            max_reference_images: model.max_reference_images,
            base_cost: model.cost.base,
        }
    }
}

/// GET /api/v1/models -- active models, sorted by id.
pub async fn list_models(State(state): State<AppState>) -> Json<DataResponse<Vec<ModelSummary>>> {
    let data = state
        .gateway
        .registry()
        .list()
        .into_iter()
        .map(ModelSummary::from)
        .collect();
    Json(DataResponse { data })
}

//! Generation record model and DTOs.

use kiara_core::job::GenerationStatus;
use kiara_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `generation_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationRecord {
    pub id: DbId,
    pub user_id: DbId,
    pub model_id: String,
    pub prompt: String,
    pub enhanced_prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub reference_images: Vec<String>,
    /// Coerced parameters actually sent to the provider.
    pub params: serde_json::Value,
    pub provider_task_id: Option<String>,
    pub status: String,
    pub output_urls: Vec<String>,
    pub credits_cost: i64,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl GenerationRecord {
    /// Parsed status. Unknown values (never written by the gateway) read as
    /// `None`.
    pub fn status(&self) -> Option<GenerationStatus> {
        GenerationStatus::parse(&self.status)
    }
}

/// DTO for inserting a record once credits are reserved.
#[derive(Debug, Clone)]
pub struct CreateGenerationRecord {
    pub user_id: DbId,
    pub model_id: String,
    pub prompt: String,
    pub enhanced_prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub reference_images: Vec<String>,
    pub params: serde_json::Value,
    pub credits_cost: i64,
}

/// DTO for the single terminal update of a record.
#[derive(Debug, Clone)]
pub struct FinishGenerationRecord {
    pub status: GenerationStatus,
    pub provider_task_id: Option<String>,
    pub output_urls: Vec<String>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

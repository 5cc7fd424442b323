//! Repository for the `generation_records` table.

use kiara_core::job::GenerationStatus;
use kiara_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::generation::{
    CreateGenerationRecord, FinishGenerationRecord, GenerationRecord,
};

const COLUMNS: &str = "\
    id, user_id, model_id, prompt, enhanced_prompt, negative_prompt, \
    reference_images, params, provider_task_id, status, output_urls, \
    credits_cost, error_message, duration_ms, created_at, updated_at, completed_at";

/// Provides insert, terminal update, and read access for generation records.
pub struct GenerationRecordRepo;

impl GenerationRecordRepo {
    /// Insert a record in `processing` state.
    pub async fn create(
        pool: &PgPool,
        input: &CreateGenerationRecord,
    ) -> Result<GenerationRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_records \
                (user_id, model_id, prompt, enhanced_prompt, negative_prompt, \
                 reference_images, params, credits_cost, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationRecord>(&query)
            .bind(input.user_id)
            .bind(&input.model_id)
            .bind(&input.prompt)
            .bind(&input.enhanced_prompt)
            .bind(&input.negative_prompt)
            .bind(&input.reference_images)
            .bind(&input.params)
            .bind(input.credits_cost)
            .bind(GenerationStatus::Processing.as_str())
            .fetch_one(pool)
            .await
    }

    /// Write the terminal outcome. Only a `processing` record is updated;
    /// returns `None` if the record is missing or already finished.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        input: &FinishGenerationRecord,
    ) -> Result<Option<GenerationRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_records SET \
                 status = $2, \
                 provider_task_id = COALESCE($3, provider_task_id), \
                 output_urls = $4, \
                 error_message = $5, \
                 duration_ms = $6, \
                 completed_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationRecord>(&query)
            .bind(id)
            .bind(input.status.as_str())
            .bind(&input.provider_task_id)
            .bind(&input.output_urls)
            .bind(&input.error_message)
            .bind(input.duration_ms)
            .fetch_optional(pool)
            .await
    }

    /// Find a record owned by `user_id`.
    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<GenerationRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_records WHERE id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, GenerationRecord>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's records, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GenerationRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_records \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, GenerationRecord>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Total number of records owned by a user.
    pub async fn count_for_user(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM generation_records WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Number of records a user created after `since`. Drives rate limiting.
    pub async fn count_since(
        pool: &PgPool,
        user_id: DbId,
        since: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM generation_records WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }
}

//! Persistence seam used by the gateway.

use async_trait::async_trait;
use kiara_core::types::{DbId, Timestamp};
use kiara_db::models::credit::CreditTransaction;
use kiara_db::models::generation::{
    CreateGenerationRecord, FinishGenerationRecord, GenerationRecord,
};
use kiara_db::repositories::{CreditRepo, GenerationRecordRepo, ReserveOutcome};
use kiara_db::DbPool;

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A ledger constraint (one reserve/refund per generation) was violated.
    #[error("Ledger conflict: {0}")]
    Conflict(String),
}

/// Ledger and generation-record operations the gateway depends on.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Records created by `user_id` at or after `since`.
    async fn count_recent(&self, user_id: DbId, since: Timestamp) -> Result<i64, StoreError>;

    /// Atomic check-and-deduct plus a `reserve` ledger row.
    async fn reserve(
        &self,
        user_id: DbId,
        cost: i64,
        description: &str,
    ) -> Result<ReserveOutcome, StoreError>;

    /// Atomic credit-back plus a `refund` ledger row.
    async fn refund(
        &self,
        user_id: DbId,
        amount: i64,
        generation_id: Option<DbId>,
        description: &str,
    ) -> Result<CreditTransaction, StoreError>;

    /// Attach a ledger row to its generation record.
    async fn link(&self, transaction_id: DbId, generation_id: DbId) -> Result<bool, StoreError>;

    async fn insert_record(
        &self,
        input: &CreateGenerationRecord,
    ) -> Result<GenerationRecord, StoreError>;

    /// Single terminal update of a record.
    async fn finish_record(
        &self,
        id: DbId,
        input: &FinishGenerationRecord,
    ) -> Result<Option<GenerationRecord>, StoreError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgGenerationStore {
    pool: DbPool,
}

impl PgGenerationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Unique violations on the ledger become [`StoreError::Conflict`].
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl GenerationStore for PgGenerationStore {
    async fn count_recent(&self, user_id: DbId, since: Timestamp) -> Result<i64, StoreError> {
        Ok(GenerationRecordRepo::count_since(&self.pool, user_id, since).await?)
    }

    async fn reserve(
        &self,
        user_id: DbId,
        cost: i64,
        description: &str,
    ) -> Result<ReserveOutcome, StoreError> {
        Ok(CreditRepo::reserve(&self.pool, user_id, cost, description).await?)
    }

    async fn refund(
        &self,
        user_id: DbId,
        amount: i64,
        generation_id: Option<DbId>,
        description: &str,
    ) -> Result<CreditTransaction, StoreError> {
        CreditRepo::refund(&self.pool, user_id, amount, generation_id, description)
            .await
            .map_err(classify)
    }

    async fn link(&self, transaction_id: DbId, generation_id: DbId) -> Result<bool, StoreError> {
        CreditRepo::link(&self.pool, transaction_id, generation_id)
            .await
            .map_err(classify)
    }

    async fn insert_record(
        &self,
        input: &CreateGenerationRecord,
    ) -> Result<GenerationRecord, StoreError> {
        Ok(GenerationRecordRepo::create(&self.pool, input).await?)
    }

    async fn finish_record(
        &self,
        id: DbId,
        input: &FinishGenerationRecord,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(GenerationRecordRepo::finish(&self.pool, id, input).await?)
    }
}

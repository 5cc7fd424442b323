//! Repository for the `user_credits` and `credit_transactions` tables.
//!
//! Every balance change is paired with a ledger row inside one database
//! transaction. Reservations use a conditional `UPDATE` so concurrent
//! requests from the same user can never drive the balance negative.

use kiara_core::types::DbId;
use sqlx::PgPool;

use crate::models::credit::{CreditTransaction, KIND_REFUND, KIND_RESERVE};

const TX_COLUMNS: &str = "\
    id, user_id, generation_id, kind, amount, balance_after, description, created_at";

/// Result of a reservation attempt.
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    /// Credits were deducted; carries the `reserve` ledger row.
    Reserved(CreditTransaction),
    /// Balance too low. Nothing was deducted.
    Insufficient { balance: i64 },
}

/// Provides atomic balance mutations and ledger queries.
pub struct CreditRepo;

impl CreditRepo {
    /// Current balance. Users without a balance row have zero credits.
    pub async fn balance(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT credits FROM user_credits WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }

    /// Add credits to a user's balance, creating the row if needed.
    ///
    /// Returns the new balance. Top-ups are not part of the generation
    /// ledger and write no transaction row.
    pub async fn grant(pool: &PgPool, user_id: DbId, amount: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO user_credits (user_id, credits) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET credits = user_credits.credits + EXCLUDED.credits \
             RETURNING credits",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(pool)
        .await
    }

    /// Atomically deduct `cost` and append a `reserve` row.
    ///
    /// The deduction only happens when `credits >= cost`; otherwise the
    /// transaction is rolled back and the current balance is reported.
    pub async fn reserve(
        pool: &PgPool,
        user_id: DbId,
        cost: i64,
        description: &str,
    ) -> Result<ReserveOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO user_credits (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let remaining: Option<i64> = sqlx::query_scalar(
            "UPDATE user_credits SET credits = credits - $2 \
             WHERE user_id = $1 AND credits >= $2 \
             RETURNING credits",
        )
        .bind(user_id)
        .bind(cost)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance_after) = remaining else {
            let balance: i64 =
                sqlx::query_scalar("SELECT credits FROM user_credits WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(ReserveOutcome::Insufficient { balance });
        };

        let query = format!(
            "INSERT INTO credit_transactions (user_id, kind, amount, balance_after, description) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {TX_COLUMNS}"
        );
        let entry = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(KIND_RESERVE)
            .bind(-cost)
            .bind(balance_after)
            .bind(description)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved(entry))
    }

    /// Atomically credit `amount` back and append a `refund` row.
    ///
    /// A second refund for the same generation violates
    /// `uq_credit_transactions_refund_generation` and rolls back.
    pub async fn refund(
        pool: &PgPool,
        user_id: DbId,
        amount: i64,
        generation_id: Option<DbId>,
        description: &str,
    ) -> Result<CreditTransaction, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let balance_after: i64 = sqlx::query_scalar(
            "INSERT INTO user_credits (user_id, credits) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET credits = user_credits.credits + EXCLUDED.credits \
             RETURNING credits",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO credit_transactions \
                (user_id, generation_id, kind, amount, balance_after, description) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {TX_COLUMNS}"
        );
        let entry = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(generation_id)
            .bind(KIND_REFUND)
            .bind(amount)
            .bind(balance_after)
            .bind(description)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// Attach a ledger row to the generation record it paid for.
    ///
    /// Returns `true` if the row was updated. Rows already linked are left
    /// untouched.
    pub async fn link(
        pool: &PgPool,
        transaction_id: DbId,
        generation_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE credit_transactions SET generation_id = $2 \
             WHERE id = $1 AND generation_id IS NULL",
        )
        .bind(transaction_id)
        .bind(generation_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All ledger rows for one generation, oldest first.
    pub async fn list_for_generation(
        pool: &PgPool,
        generation_id: DbId,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {TX_COLUMNS} FROM credit_transactions \
             WHERE generation_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(generation_id)
            .fetch_all(pool)
            .await
    }

    /// All ledger rows for one user, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {TX_COLUMNS} FROM credit_transactions \
             WHERE user_id = $1 ORDER BY id DESC"
        );
        sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}

//! Credit balance and ledger rows.

use kiara_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// Ledger entry kind for a pre-call deduction.
pub const KIND_RESERVE: &str = "reserve";
/// Ledger entry kind for a failure refund.
pub const KIND_REFUND: &str = "refund";

/// A row from the `user_credits` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserCredits {
    pub user_id: DbId,
    pub credits: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the append-only `credit_transactions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditTransaction {
    pub id: DbId,
    pub user_id: DbId,
    pub generation_id: Option<DbId>,
    pub kind: String,
    /// Negative for reservations, positive for refunds.
    pub amount: i64,
    pub balance_after: i64,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

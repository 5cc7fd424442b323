//! Credit ledger coordination: rate limiting, reservation, and refunds.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kiara_core::error::CoreError;
use kiara_core::types::DbId;
use kiara_db::repositories::ReserveOutcome;

use crate::error::DispatchError;
use crate::store::GenerationStore;

/// Per-user request budget over a sliding window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Zero disables the check.
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn disabled() -> Self {
        Self {
            max_requests: 0,
            window: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0 && !self.window.is_zero()
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
        }
    }
}

/// Reject the request when `user_id` already has `max_requests` records
/// inside the window.
pub async fn check_rate_limit(
    store: &dyn GenerationStore,
    user_id: DbId,
    limit: &RateLimit,
) -> Result<(), DispatchError> {
    if !limit.is_enabled() {
        return Ok(());
    }
    let window = chrono::Duration::from_std(limit.window)
        .map_err(|e| CoreError::Internal(format!("invalid rate-limit window: {e}")))?;
    let recent = store.count_recent(user_id, Utc::now() - window).await?;
    if recent >= i64::from(limit.max_requests) {
        tracing::info!(user_id, recent, max = limit.max_requests, "Rate limit exceeded");
        return Err(CoreError::RateLimited {
            retry_after_secs: limit.window.as_secs().max(1),
        }
        .into());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Open,
    Committed,
    Refunded,
}

/// Credits held for one generation attempt.
///
/// Settles exactly once: [`finalize_success`](Self::finalize_success) keeps
/// the charge, [`refund`](Self::refund) returns it. Later calls are no-ops.
pub struct CreditReservation {
    store: Arc<dyn GenerationStore>,
    user_id: DbId,
    cost: i64,
    transaction_id: DbId,
    generation_id: Option<DbId>,
    state: Settlement,
}

impl CreditReservation {
    /// Atomically deduct `cost` from `user_id`.
    pub async fn reserve(
        store: Arc<dyn GenerationStore>,
        user_id: DbId,
        cost: i64,
        description: &str,
    ) -> Result<Self, DispatchError> {
        match store.reserve(user_id, cost, description).await? {
            ReserveOutcome::Reserved(entry) => {
                tracing::debug!(
                    user_id,
                    cost,
                    balance_after = entry.balance_after,
                    "Credits reserved",
                );
                Ok(Self {
                    store,
                    user_id,
                    cost,
                    transaction_id: entry.id,
                    generation_id: None,
                    state: Settlement::Open,
                })
            }
            ReserveOutcome::Insufficient { balance } => Err(CoreError::InsufficientCredits {
                balance,
                required: cost,
            }
            .into()),
        }
    }

    /// Attach the reserve entry to its generation record.
    ///
    /// Failures are logged; the charge itself is already durable.
    pub async fn link(&mut self, generation_id: DbId) {
        self.generation_id = Some(generation_id);
        match self.store.link(self.transaction_id, generation_id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                transaction_id = self.transaction_id,
                generation_id,
                "Reserve entry was already linked",
            ),
            Err(e) => tracing::error!(
                error = %e,
                transaction_id = self.transaction_id,
                generation_id,
                "Failed to link reserve entry",
            ),
        }
    }

    /// Keep the charge. No ledger mutation.
    pub fn finalize_success(&mut self) {
        if self.state == Settlement::Open {
            self.state = Settlement::Committed;
        }
    }

    /// Return the reserved credits. Runs at most once; a failed refund is
    /// logged and does not change the caller's error.
    pub async fn refund(&mut self, reason: &str) {
        if self.state != Settlement::Open {
            return;
        }
        self.state = Settlement::Refunded;

        let description = format!("Refund: {reason}");
        match self
            .store
            .refund(self.user_id, self.cost, self.generation_id, &description)
            .await
        {
            Ok(entry) => tracing::info!(
                user_id = self.user_id,
                generation_id = ?self.generation_id,
                amount = self.cost,
                balance_after = entry.balance_after,
                "Credits refunded",
            ),
            Err(e) => tracing::error!(
                error = %e,
                user_id = self.user_id,
                generation_id = ?self.generation_id,
                amount = self.cost,
                "Credit refund failed",
            ),
        }
    }
}

impl Drop for CreditReservation {
    fn drop(&mut self) {
        if self.state == Settlement::Open {
            tracing::warn!(
                user_id = self.user_id,
                transaction_id = self.transaction_id,
                cost = self.cost,
                "Credit reservation dropped without settlement",
            );
        }
    }
}

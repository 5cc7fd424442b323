//! In-memory [`GenerationStore`] for tests and local experiments.
//!
//! Mirrors the PostgreSQL semantics that matter to the gateway: reservations
//! never overdraw, and a generation gets at most one reserve and one refund.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use kiara_core::job::GenerationStatus;
use kiara_core::types::{DbId, Timestamp};
use kiara_db::models::credit::{CreditTransaction, KIND_REFUND, KIND_RESERVE};
use kiara_db::models::generation::{
    CreateGenerationRecord, FinishGenerationRecord, GenerationRecord,
};
use kiara_db::repositories::ReserveOutcome;

use crate::store::{GenerationStore, StoreError};

#[derive(Default)]
struct State {
    balances: HashMap<DbId, i64>,
    transactions: Vec<CreditTransaction>,
    records: Vec<GenerationRecord>,
}

/// Mutex-guarded store. Each operation is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `credits` for `user_id`.
    pub fn with_balance(user_id: DbId, credits: i64) -> Self {
        let store = Self::new();
        store.lock().balances.insert(user_id, credits);
        store
    }

    pub fn balance(&self, user_id: DbId) -> i64 {
        self.lock().balances.get(&user_id).copied().unwrap_or(0)
    }

    pub fn transactions(&self) -> Vec<CreditTransaction> {
        self.lock().transactions.clone()
    }

    pub fn records(&self) -> Vec<GenerationRecord> {
        self.lock().records.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl State {
    fn push_transaction(
        &mut self,
        user_id: DbId,
        generation_id: Option<DbId>,
        kind: &str,
        amount: i64,
        balance_after: i64,
        description: &str,
    ) -> CreditTransaction {
        let entry = CreditTransaction {
            id: self.transactions.len() as DbId + 1,
            user_id,
            generation_id,
            kind: kind.to_string(),
            amount,
            balance_after,
            description: Some(description.to_string()),
            created_at: Utc::now(),
        };
        self.transactions.push(entry.clone());
        entry
    }

    fn has_entry(&self, generation_id: DbId, kind: &str, except: Option<DbId>) -> bool {
        self.transactions.iter().any(|t| {
            t.generation_id == Some(generation_id) && t.kind == kind && Some(t.id) != except
        })
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn count_recent(&self, user_id: DbId, since: Timestamp) -> Result<i64, StoreError> {
        let state = self.lock();
        Ok(state
            .records
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .count() as i64)
    }

    async fn reserve(
        &self,
        user_id: DbId,
        cost: i64,
        description: &str,
    ) -> Result<ReserveOutcome, StoreError> {
        let mut state = self.lock();
        let balance = state.balances.get(&user_id).copied().unwrap_or(0);
        if balance < cost {
            return Ok(ReserveOutcome::Insufficient { balance });
        }
        let balance_after = balance - cost;
        state.balances.insert(user_id, balance_after);
        let entry =
            state.push_transaction(user_id, None, KIND_RESERVE, -cost, balance_after, description);
        Ok(ReserveOutcome::Reserved(entry))
    }

    async fn refund(
        &self,
        user_id: DbId,
        amount: i64,
        generation_id: Option<DbId>,
        description: &str,
    ) -> Result<CreditTransaction, StoreError> {
        let mut state = self.lock();
        if let Some(id) = generation_id {
            if state.has_entry(id, KIND_REFUND, None) {
                return Err(StoreError::Conflict(format!(
                    "generation {id} already refunded"
                )));
            }
        }
        let balance_after = state.balances.get(&user_id).copied().unwrap_or(0) + amount;
        state.balances.insert(user_id, balance_after);
        Ok(state.push_transaction(
            user_id,
            generation_id,
            KIND_REFUND,
            amount,
            balance_after,
            description,
        ))
    }

    async fn link(&self, transaction_id: DbId, generation_id: DbId) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(kind) = state
            .transactions
            .iter()
            .find(|t| t.id == transaction_id && t.generation_id.is_none())
            .map(|t| t.kind.clone())
        else {
            return Ok(false);
        };
        if state.has_entry(generation_id, &kind, Some(transaction_id)) {
            return Err(StoreError::Conflict(format!(
                "generation {generation_id} already has a {kind} entry"
            )));
        }
        if let Some(t) = state.transactions.iter_mut().find(|t| t.id == transaction_id) {
            t.generation_id = Some(generation_id);
        }
        Ok(true)
    }

    async fn insert_record(
        &self,
        input: &CreateGenerationRecord,
    ) -> Result<GenerationRecord, StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let record = GenerationRecord {
            id: state.records.len() as DbId + 1,
            user_id: input.user_id,
            model_id: input.model_id.clone(),
            prompt: input.prompt.clone(),
            enhanced_prompt: input.enhanced_prompt.clone(),
            negative_prompt: input.negative_prompt.clone(),
            reference_images: input.reference_images.clone(),
            params: input.params.clone(),
            provider_task_id: None,
            status: GenerationStatus::Processing.as_str().to_string(),
            output_urls: Vec::new(),
            credits_cost: input.credits_cost,
            error_message: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn finish_record(
        &self,
        id: DbId,
        input: &FinishGenerationRecord,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        let mut state = self.lock();
        let Some(record) = state
            .records
            .iter_mut()
            .find(|r| r.id == id && r.status == GenerationStatus::Processing.as_str())
        else {
            return Ok(None);
        };
        let now = Utc::now();
        record.status = input.status.as_str().to_string();
        if input.provider_task_id.is_some() {
            record.provider_task_id = input.provider_task_id.clone();
        }
        record.output_urls = input.output_urls.clone();
        record.error_message = input.error_message.clone();
        record.duration_ms = Some(input.duration_ms);
        record.updated_at = now;
        record.completed_at = Some(now);
        Ok(Some(record.clone()))
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use super::models::{stacked_expiry, CreditOutcome, PendingPayment, ProcessedTransfer};
use super::store::PaymentStore;
use crate::error::AppResult;

/// Non-durable store backed by in-process maps.
///
/// All three tables live behind one mutex, so the credit step observes and
/// mutates them atomically just like the Postgres transaction does. Used by
/// the test suite and usable as a backend where durability is not required.
pub struct MemoryPaymentStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    pending: HashMap<i64, PendingPayment>,
    processed: HashMap<String, ProcessedTransfer>,
    subscriptions: HashMap<i64, DateTime<Utc>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryState::default()),
        }
    }

    pub fn processed_count(&self) -> usize {
        self.inner.lock().processed.len()
    }
}

impl Default for MemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn upsert_pending(&self, payment: PendingPayment) -> AppResult<()> {
        self.inner.lock().pending.insert(payment.user_id, payment);
        Ok(())
    }

    async fn get_pending(&self, user_id: i64) -> AppResult<Option<PendingPayment>> {
        Ok(self.inner.lock().pending.get(&user_id).cloned())
    }

    async fn list_active_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<PendingPayment>> {
        let state = self.inner.lock();
        let mut active: Vec<PendingPayment> = state
            .pending
            .values()
            .filter(|p| p.is_active(now))
            .cloned()
            .collect();
        active.sort_by_key(|p| p.created_at);
        Ok(active)
    }

    async fn remove_pending(&self, user_id: i64) -> AppResult<()> {
        self.inner.lock().pending.remove(&user_id);
        Ok(())
    }

    async fn take_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<PendingPayment>> {
        let mut state = self.inner.lock();
        let expired_ids: Vec<i64> = state
            .pending
            .values()
            .filter(|p| !p.is_active(now))
            .map(|p| p.user_id)
            .collect();
        let mut expired = Vec::with_capacity(expired_ids.len());
        for user_id in expired_ids {
            if let Some(payment) = state.pending.remove(&user_id) {
                expired.push(payment);
            }
        }
        Ok(expired)
    }

    async fn subscription_expiry(&self, user_id: i64) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.inner.lock().subscriptions.get(&user_id).copied())
    }

    async fn credit_transfer(
        &self,
        transfer_id: &str,
        user_id: i64,
        now: DateTime<Utc>,
        period: Duration,
    ) -> AppResult<CreditOutcome> {
        let mut state = self.inner.lock();

        if state.processed.contains_key(transfer_id) {
            return Ok(CreditOutcome::AlreadyProcessed);
        }
        state.processed.insert(
            transfer_id.to_string(),
            ProcessedTransfer {
                transfer_id: transfer_id.to_string(),
                user_id,
                matched_at: now,
            },
        );

        let current = state.subscriptions.get(&user_id).copied();
        let new_expiry = stacked_expiry(now, current, period);
        state.subscriptions.insert(user_id, new_expiry);
        state.pending.remove(&user_id);

        Ok(CreditOutcome::Credited { new_expiry })
    }
}

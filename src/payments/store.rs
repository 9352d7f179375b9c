use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::models::{CreditOutcome, PendingPayment};
use crate::error::AppResult;

/// Storage seam for the three reconciliation tables: pending payments,
/// processed transfers and subscriptions.
///
/// Only the reconciliation engine and the payment service mutate these
/// tables; everything else reads subscriptions through
/// [`PaymentStore::subscription_expiry`] and must tolerate staleness of up
/// to one tick interval.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert or overwrite the outstanding request for a user.
    /// A user holds at most one pending payment at a time.
    async fn upsert_pending(&self, payment: PendingPayment) -> AppResult<()>;

    async fn get_pending(&self, user_id: i64) -> AppResult<Option<PendingPayment>>;

    /// Exactly the rows with `expires_at > now`, oldest first
    async fn list_active_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<PendingPayment>>;

    async fn remove_pending(&self, user_id: i64) -> AppResult<()>;

    /// Delete and return every pending payment with `expires_at <= now`,
    /// so the caller can recycle their fingerprint offsets
    async fn take_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<PendingPayment>>;

    async fn subscription_expiry(&self, user_id: i64) -> AppResult<Option<DateTime<Utc>>>;

    /// Atomically credit one observed transfer.
    ///
    /// Records `transfer_id` with a constrained insert; if the id is already
    /// recorded the call is a no-op returning
    /// [`CreditOutcome::AlreadyProcessed`]. On a first-time insert the
    /// subscription is extended by `period` under the stacking rule and the
    /// user's pending payment is removed, all within the same transactional
    /// boundary as the insert. The constrained insert is the only
    /// coordination point between engine instances polling the same address.
    async fn credit_transfer(
        &self,
        transfer_id: &str,
        user_id: i64,
        now: DateTime<Utc>,
        period: Duration,
    ) -> AppResult<CreditOutcome>;
}

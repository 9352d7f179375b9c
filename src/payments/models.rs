use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// One outstanding invoice awaiting a matching transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PendingPayment {
    pub user_id: i64,
    /// Exact amount the requester must transfer: base price + unique offset
    #[serde(with = "rust_decimal::serde::float")]
    pub fingerprint_amount: rust_decimal::Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingPayment {
    /// A request is only matchable while it has not expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// One externally-observed transfer that has already been credited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProcessedTransfer {
    pub transfer_id: String,
    pub user_id: i64,
    pub matched_at: DateTime<Utc>,
}

/// A user's current access window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Result of attempting to credit one observed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// First time this transfer was seen; the subscription was extended
    Credited { new_expiry: DateTime<Utc> },
    /// Transfer id already recorded, nothing was changed
    AlreadyProcessed,
}

/// Stacking rule for subscription renewal.
///
/// A renewal extends from the later of "now" or the current expiry: a user
/// who renews early keeps the unused time, a user who renews after lapsing
/// gets no retroactive credit for the gap. The result is never in the past.
pub fn stacked_expiry(
    now: DateTime<Utc>,
    current: Option<DateTime<Utc>>,
    period: Duration,
) -> DateTime<Utc> {
    let start = current.filter(|expiry| *expiry > now).unwrap_or(now);
    start + period
}

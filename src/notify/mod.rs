// Payment confirmation callbacks
pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::AppResult;
pub use telegram::TelegramNotifier;

/// Callback invoked after a successful credit so the messaging collaborator
/// can inform the user. Fire-and-forget: the engine logs a failed delivery
/// and moves on, it never fails the reconciliation tick.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn payment_confirmed(&self, user_id: i64, new_expiry: DateTime<Utc>) -> AppResult<()>;
}

/// Default notifier: records the confirmation in the service log only
pub struct LogNotifier;

#[async_trait]
impl PaymentNotifier for LogNotifier {
    async fn payment_confirmed(&self, user_id: i64, new_expiry: DateTime<Utc>) -> AppResult<()> {
        info!(
            "✅ Payment confirmed for user {}: subscription now expires {}",
            user_id,
            new_expiry.format("%Y-%m-%d %H:%M")
        );
        Ok(())
    }
}

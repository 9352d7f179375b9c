use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::fingerprint::OffsetPool;
use crate::payments::{PaymentStore, PendingPayment, Subscription};

/// What the user is told to do: transfer exactly `amount` to `address`
/// before `expires_at`
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInstructions {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub address: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_price: Decimal,
    pub merchant_address: String,
    pub pending_ttl: Duration,
}

impl ServiceConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_price: config.base_price,
            merchant_address: config.merchant_address.clone(),
            pending_ttl: config.pending_ttl(),
        }
    }
}

/// Operations exposed to the messaging/command collaborator
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    offsets: Arc<OffsetPool>,
    config: ServiceConfig,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        offsets: Arc<OffsetPool>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            offsets,
            config,
        }
    }

    /// Issue payment instructions for a user.
    ///
    /// A user who already holds a still-valid fingerprint gets the same
    /// amount back with a refreshed expiry instead of a new offset, so
    /// re-requesting never invalidates instructions already shown to them.
    pub async fn request_payment(&self, user_id: i64) -> AppResult<PaymentInstructions> {
        let now = Utc::now();

        if let Some(existing) = self.store.get_pending(user_id).await? {
            if existing.is_active(now) {
                let refreshed = PendingPayment {
                    expires_at: now + self.config.pending_ttl,
                    ..existing
                };
                self.store.upsert_pending(refreshed.clone()).await?;
                return Ok(self.instructions(&refreshed));
            }
            // Lapsed request the tick sweep has not collected yet: retire it
            // here so its offset recycles before we mint a new one.
            self.store.remove_pending(user_id).await?;
            self.offsets
                .release(existing.fingerprint_amount - self.config.base_price);
        }

        let offset = self.offsets.acquire()?;
        let payment = PendingPayment {
            user_id,
            fingerprint_amount: self.config.base_price + offset,
            created_at: now,
            expires_at: now + self.config.pending_ttl,
        };

        if let Err(e) = self.store.upsert_pending(payment.clone()).await {
            // The row never landed, so the offset must go back in the pool.
            self.offsets.release(offset);
            return Err(e);
        }

        info!(
            "🧾 Payment request issued to user {}: {} until {}",
            user_id, payment.fingerprint_amount, payment.expires_at
        );
        Ok(self.instructions(&payment))
    }

    /// Read-only access check; tolerates staleness of up to one tick
    pub async fn subscription_status(&self, user_id: i64) -> AppResult<Option<Subscription>> {
        let expiry = self.store.subscription_expiry(user_id).await?;
        Ok(expiry.map(|expires_at| Subscription {
            user_id,
            expires_at,
        }))
    }

    fn instructions(&self, payment: &PendingPayment) -> PaymentInstructions {
        PaymentInstructions {
            amount: payment.fingerprint_amount,
            address: self.config.merchant_address.clone(),
            expires_at: payment.expires_at,
        }
    }
}

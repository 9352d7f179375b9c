use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::models::{stacked_expiry, CreditOutcome, PendingPayment};
use super::store::PaymentStore;
use crate::error::AppResult;

/// Postgres-backed store - the source of truth for reconciliation state
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn upsert_pending(&self, payment: PendingPayment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_payments (user_id, fingerprint_amount, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                fingerprint_amount = EXCLUDED.fingerprint_amount,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(payment.user_id)
        .bind(payment.fingerprint_amount)
        .bind(payment.created_at)
        .bind(payment.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_pending(&self, user_id: i64) -> AppResult<Option<PendingPayment>> {
        let payment = sqlx::query_as::<_, PendingPayment>(
            r#"
            SELECT user_id, fingerprint_amount, created_at, expires_at
            FROM pending_payments
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn list_active_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<PendingPayment>> {
        let payments = sqlx::query_as::<_, PendingPayment>(
            r#"
            SELECT user_id, fingerprint_amount, created_at, expires_at
            FROM pending_payments
            WHERE expires_at > $1
            ORDER BY created_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    async fn remove_pending(&self, user_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM pending_payments WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn take_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<PendingPayment>> {
        let expired = sqlx::query_as::<_, PendingPayment>(
            r#"
            DELETE FROM pending_payments
            WHERE expires_at <= $1
            RETURNING user_id, fingerprint_amount, created_at, expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(expired)
    }

    async fn subscription_expiry(&self, user_id: i64) -> AppResult<Option<DateTime<Utc>>> {
        let expiry = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT expires_at FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(expiry)
    }

    async fn credit_transfer(
        &self,
        transfer_id: &str,
        user_id: i64,
        now: DateTime<Utc>,
        period: Duration,
    ) -> AppResult<CreditOutcome> {
        let mut tx = self.pool.begin().await?;

        // The unique constraint on transfer_id is the coordination point:
        // whichever engine instance lands this insert first owns the credit.
        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_transfers (transfer_id, user_id, matched_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (transfer_id) DO NOTHING
            "#,
        )
        .bind(transfer_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CreditOutcome::AlreadyProcessed);
        }

        let current = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT expires_at FROM subscriptions WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let new_expiry = stacked_expiry(now, current, period);

        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(user_id)
        .bind(new_expiry)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pending_payments WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CreditOutcome::Credited { new_expiry })
    }
}

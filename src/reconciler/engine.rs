use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::fingerprint::OffsetPool;
use crate::notify::PaymentNotifier;
use crate::payments::{CreditOutcome, PaymentStore, PendingPayment};
use crate::scanner::{ChainScanner, InboundTransfer, ScanOutcome};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub base_price: Decimal,
    /// Matching tolerance for rounding in the token's base-unit
    /// representation; must stay strictly below the allocator's offset step
    /// or one transfer could satisfy two different fingerprints
    pub match_epsilon: Decimal,
    /// Access window granted per successful payment
    pub subscription_period: Duration,
}

impl ReconcilerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_price: config.base_price,
            match_epsilon: dec!(0.0001),
            subscription_period: config.subscription_period(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            base_price: dec!(100),
            match_epsilon: dec!(0.0001),
            subscription_period: Duration::days(30),
        }
    }
}

/// What one reconciliation pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub expired: usize,
    pub transfers_seen: usize,
    pub matched: usize,
    /// Transfers skipped because their id was already credited
    pub duplicates: usize,
}

/// Matches observed inbound transfers against outstanding payment requests.
///
/// Sole writer of all three reconciliation tables. Each pending payment
/// moves `OUTSTANDING -> MATCHED` (exactly once, through the atomic credit)
/// or `OUTSTANDING -> EXPIRED`; both are terminal.
pub struct ReconciliationEngine {
    store: Arc<dyn PaymentStore>,
    scanner: Arc<dyn ChainScanner>,
    notifier: Arc<dyn PaymentNotifier>,
    offsets: Arc<OffsetPool>,
    config: ReconcilerConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        scanner: Arc<dyn ChainScanner>,
        notifier: Arc<dyn PaymentNotifier>,
        offsets: Arc<OffsetPool>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            scanner,
            notifier,
            offsets,
            config,
        }
    }

    /// One reconciliation pass. Never propagates errors - every failure is
    /// logged and either retried next tick or skipped, so the scheduler
    /// cannot crash.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();

        // Expired fingerprints are never honored. Drop them before matching
        // and recycle their offsets.
        match self.store.take_expired_pending(now).await {
            Ok(expired) => {
                summary.expired = expired.len();
                for payment in expired {
                    info!(
                        "⌛ Payment request for user {} expired unmatched",
                        payment.user_id
                    );
                    self.offsets
                        .release(payment.fingerprint_amount - self.config.base_price);
                }
            }
            Err(e) => error!("failed to sweep expired payment requests: {}", e),
        }

        let mut active = match self.store.list_active_pending(now).await {
            Ok(active) => active,
            Err(e) => {
                error!("failed to load pending payments: {}", e);
                return summary;
            }
        };
        if active.is_empty() {
            // Nothing to match; skip the explorer round-trip entirely.
            return summary;
        }

        let transfers = match self.scanner.recent_transfers().await {
            ScanOutcome::Transfers(transfers) => transfers,
            ScanOutcome::Unavailable(reason) => {
                warn!("explorer query failed, retrying next tick: {}", reason);
                Vec::new()
            }
            ScanOutcome::Malformed(reason) => {
                error!("explorer response malformed: {}", reason);
                Vec::new()
            }
        };
        summary.transfers_seen = transfers.len();

        for transfer in &transfers {
            self.apply_transfer(transfer, &mut active, now, &mut summary)
                .await;
        }

        summary
    }

    /// Try to settle one observed transfer against the outstanding requests.
    /// Failures are contained here so one bad pair never blocks the rest of
    /// the tick.
    async fn apply_transfer(
        &self,
        transfer: &InboundTransfer,
        active: &mut Vec<PendingPayment>,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) {
        let candidates: Vec<usize> = active
            .iter()
            .enumerate()
            .filter(|(_, pending)| {
                (transfer.amount - pending.fingerprint_amount).abs() <= self.config.match_epsilon
            })
            .map(|(index, _)| index)
            .collect();

        let Some(&index) = candidates.first() else {
            return;
        };
        if candidates.len() > 1 {
            // The allocator guarantees this cannot happen; seeing it means
            // uniqueness was violated somewhere. First match wins.
            warn!(
                "transfer {} of {} matches {} outstanding fingerprints, crediting the first",
                transfer.transfer_id,
                transfer.amount,
                candidates.len()
            );
        }
        let pending = active[index].clone();

        match self
            .store
            .credit_transfer(
                &transfer.transfer_id,
                pending.user_id,
                now,
                self.config.subscription_period,
            )
            .await
        {
            Ok(CreditOutcome::Credited { new_expiry }) => {
                summary.matched += 1;
                active.remove(index);
                self.offsets
                    .release(pending.fingerprint_amount - self.config.base_price);
                info!(
                    "💰 Transfer {} matched user {}: subscription extended to {}",
                    transfer.transfer_id, pending.user_id, new_expiry
                );
                if let Err(e) = self
                    .notifier
                    .payment_confirmed(pending.user_id, new_expiry)
                    .await
                {
                    warn!(
                        "confirmation delivery failed for user {}: {}",
                        pending.user_id, e
                    );
                }
            }
            Ok(CreditOutcome::AlreadyProcessed) => {
                // Explorer pages overlap between ticks; this is the normal
                // idempotent suppression path, not an error.
                summary.duplicates += 1;
                debug!("transfer {} already credited", transfer.transfer_id);
            }
            Err(e) => {
                // The processed-transfers insert did not commit, so the next
                // tick retries this pair with no double-credit risk.
                error!(
                    "failed to credit transfer {} for user {}: {}",
                    transfer.transfer_id, pending.user_id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::{AppError, AppResult, ScannerError};
    use crate::fingerprint::DEFAULT_OFFSET_CAPACITY;
    use crate::payments::MemoryPaymentStore;

    struct StaticScanner {
        outcome: Mutex<ScanOutcome>,
        calls: AtomicUsize,
    }

    impl StaticScanner {
        fn with_transfers(transfers: Vec<InboundTransfer>) -> Self {
            Self {
                outcome: Mutex::new(ScanOutcome::Transfers(transfers)),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_outcome(outcome: ScanOutcome) -> Self {
            Self {
                outcome: Mutex::new(outcome),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainScanner for StaticScanner {
        async fn recent_transfers(&self) -> ScanOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.lock().clone()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        confirmed: Mutex<Vec<(i64, DateTime<Utc>)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                confirmed: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn confirmations(&self) -> Vec<(i64, DateTime<Utc>)> {
            self.confirmed.lock().clone()
        }
    }

    #[async_trait]
    impl PaymentNotifier for RecordingNotifier {
        async fn payment_confirmed(
            &self,
            user_id: i64,
            new_expiry: DateTime<Utc>,
        ) -> AppResult<()> {
            self.confirmed.lock().push((user_id, new_expiry));
            if self.fail {
                return Err(AppError::ExternalError("delivery failed".to_string()));
            }
            Ok(())
        }
    }

    struct Harness {
        engine: ReconciliationEngine,
        store: Arc<MemoryPaymentStore>,
        offsets: Arc<OffsetPool>,
        scanner: Arc<StaticScanner>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness_with(scanner: StaticScanner, notifier: RecordingNotifier) -> Harness {
        let store = Arc::new(MemoryPaymentStore::new());
        let offsets = Arc::new(OffsetPool::new(DEFAULT_OFFSET_CAPACITY));
        let scanner = Arc::new(scanner);
        let notifier = Arc::new(notifier);
        let engine = ReconciliationEngine::new(
            store.clone(),
            scanner.clone(),
            notifier.clone(),
            offsets.clone(),
            ReconcilerConfig::default(),
        );
        Harness {
            engine,
            store,
            offsets,
            scanner,
            notifier,
        }
    }

    fn harness(transfers: Vec<InboundTransfer>) -> Harness {
        harness_with(
            StaticScanner::with_transfers(transfers),
            RecordingNotifier::default(),
        )
    }

    fn transfer(id: &str, amount: Decimal) -> InboundTransfer {
        InboundTransfer {
            transfer_id: id.to_string(),
            to_address: "TMerchant".to_string(),
            amount,
            token_symbol: "USDT".to_string(),
        }
    }

    /// Allocate a fingerprint and persist the pending request, the way the
    /// payment service does
    async fn add_pending(h: &Harness, user_id: i64, now: DateTime<Utc>) -> PendingPayment {
        let offset = h.offsets.acquire().unwrap();
        let payment = PendingPayment {
            user_id,
            fingerprint_amount: dec!(100) + offset,
            created_at: now,
            expires_at: now + Duration::hours(24),
        };
        h.store.upsert_pending(payment.clone()).await.unwrap();
        payment
    }

    #[tokio::test]
    async fn test_matching_transfer_credits_subscription() {
        let now = Utc::now();
        let h = harness(vec![transfer("tx-1", dec!(100.001))]);
        add_pending(&h, 7, now).await;

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary.matched, 1);
        assert_eq!(
            h.store.subscription_expiry(7).await.unwrap(),
            Some(now + Duration::days(30))
        );
        assert!(h.store.get_pending(7).await.unwrap().is_none());
        assert_eq!(h.store.processed_count(), 1);
        assert_eq!(h.offsets.outstanding(), 0);
        assert_eq!(h.notifier.confirmations(), vec![(7, now + Duration::days(30))]);
    }

    #[tokio::test]
    async fn test_replayed_transfer_id_never_credits_twice() {
        let now = Utc::now();
        let h = harness(vec![transfer("tx-1", dec!(100.001))]);
        add_pending(&h, 7, now).await;

        h.engine.run_tick(now).await;
        let expiry_after_first = h.store.subscription_expiry(7).await.unwrap();

        // User 7's offset was recycled; user 8 now holds the same
        // fingerprint while the explorer window still contains tx-1.
        add_pending(&h, 8, now).await;
        let summary = h.engine.run_tick(now + Duration::minutes(1)).await;

        assert_eq!(summary.matched, 0);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(h.store.subscription_expiry(7).await.unwrap(), expiry_after_first);
        assert_eq!(h.store.subscription_expiry(8).await.unwrap(), None);
        // User 8's request stays outstanding for a genuinely new transfer.
        assert!(h.store.get_pending(8).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_renewal_stacks_on_remaining_time() {
        let now = Utc::now();
        let h = harness(vec![transfer("tx-2", dec!(100.001))]);

        // Existing subscription with 10 days left.
        h.store
            .credit_transfer("tx-seed", 7, now - Duration::days(20), Duration::days(30))
            .await
            .unwrap();
        add_pending(&h, 7, now).await;

        h.engine.run_tick(now).await;

        assert_eq!(
            h.store.subscription_expiry(7).await.unwrap(),
            Some(now + Duration::days(40))
        );
    }

    #[tokio::test]
    async fn test_duplicate_fingerprint_credits_exactly_one_user() {
        let now = Utc::now();
        let h = harness(vec![transfer("tx-1", dec!(100.001))]);

        // Simulated allocator defect: both users hold the same fingerprint.
        for (user_id, minutes_ago) in [(1, 10), (2, 5)] {
            h.store
                .upsert_pending(PendingPayment {
                    user_id,
                    fingerprint_amount: dec!(100.001),
                    created_at: now - Duration::minutes(minutes_ago),
                    expires_at: now + Duration::hours(24),
                })
                .await
                .unwrap();
        }

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary.matched, 1);
        // First evaluated (oldest request) wins; the other stays pending.
        assert!(h.store.subscription_expiry(1).await.unwrap().is_some());
        assert!(h.store.subscription_expiry(2).await.unwrap().is_none());
        assert!(h.store.get_pending(2).await.unwrap().is_some());
        assert_eq!(h.notifier.confirmations().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_fingerprint_is_never_honored() {
        let now = Utc::now();
        let h = harness(vec![transfer("tx-1", dec!(100.001))]);

        // User 3's request expired yesterday; user 4 keeps the tick busy so
        // the explorer is actually queried.
        h.store
            .upsert_pending(PendingPayment {
                user_id: 3,
                fingerprint_amount: dec!(100.001),
                created_at: now - Duration::hours(48),
                expires_at: now - Duration::hours(24),
            })
            .await
            .unwrap();
        h.store
            .upsert_pending(PendingPayment {
                user_id: 4,
                fingerprint_amount: dec!(100.002),
                created_at: now,
                expires_at: now + Duration::hours(24),
            })
            .await
            .unwrap();

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary.expired, 1);
        assert_eq!(summary.matched, 0);
        assert_eq!(h.store.subscription_expiry(3).await.unwrap(), None);
        assert_eq!(h.store.processed_count(), 0);
    }

    #[tokio::test]
    async fn test_amount_outside_epsilon_changes_nothing() {
        let now = Utc::now();
        let h = harness(vec![
            transfer("tx-1", dec!(100.0013)), // 0.0003 off, beyond epsilon
            transfer("tx-2", dec!(99.999)),
        ]);
        add_pending(&h, 7, now).await;

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary.matched, 0);
        assert_eq!(h.store.processed_count(), 0);
        assert!(h.store.get_pending(7).await.unwrap().is_some());
        assert_eq!(h.store.subscription_expiry(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rounding_within_epsilon_still_matches() {
        let now = Utc::now();
        let h = harness(vec![transfer("tx-1", dec!(100.0011))]);
        add_pending(&h, 7, now).await; // fingerprint 100.001

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary.matched, 1);
    }

    #[tokio::test]
    async fn test_no_pending_skips_the_explorer_call() {
        let now = Utc::now();
        let h = harness(vec![transfer("tx-1", dec!(100.001))]);

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary, TickSummary::default());
        assert_eq!(h.scanner.calls(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_explorer_is_retried_next_tick() {
        let now = Utc::now();
        let h = harness_with(
            StaticScanner::with_outcome(ScanOutcome::Unavailable(ScannerError::Unreachable(
                "connection refused".to_string(),
            ))),
            RecordingNotifier::default(),
        );
        add_pending(&h, 7, now).await;

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary.matched, 0);
        assert_eq!(summary.transfers_seen, 0);
        assert_eq!(h.scanner.calls(), 1);
        // The request survives untouched for the next tick.
        assert!(h.store.get_pending(7).await.unwrap().is_some());

        *h.scanner.outcome.lock() =
            ScanOutcome::Transfers(vec![transfer("tx-1", dec!(100.001))]);
        let summary = h.engine.run_tick(now + Duration::seconds(30)).await;
        assert_eq!(summary.matched, 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_block_crediting() {
        let now = Utc::now();
        let h = harness_with(
            StaticScanner::with_transfers(vec![transfer("tx-1", dec!(100.001))]),
            RecordingNotifier::failing(),
        );
        add_pending(&h, 7, now).await;

        let summary = h.engine.run_tick(now).await;

        assert_eq!(summary.matched, 1);
        assert!(h.store.subscription_expiry(7).await.unwrap().is_some());
    }
}

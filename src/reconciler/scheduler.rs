use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::engine::ReconciliationEngine;

/// Drives the reconciliation engine on a fixed interval.
///
/// At most one tick is in flight at a time: the tick body is awaited to
/// completion before the next interval fire, and missed fires are delayed
/// rather than bursted, so the match loop never races itself.
pub struct ReconcilerScheduler {
    tick_interval: Duration,
    engine: Arc<ReconciliationEngine>,
}

impl ReconcilerScheduler {
    pub fn new(tick_interval: Duration, engine: Arc<ReconciliationEngine>) -> Self {
        Self {
            tick_interval,
            engine,
        }
    }

    /// Start the reconciliation loop (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let tick_interval = self.tick_interval;

        tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let summary = engine.run_tick(Utc::now()).await;
                if summary.matched > 0 || summary.expired > 0 {
                    info!(
                        "🔄 Reconciliation tick: {} matched, {} expired, {} transfers seen",
                        summary.matched, summary.expired, summary.transfers_seen
                    );
                } else {
                    debug!("reconciliation tick: nothing to settle");
                }
            }
        })
    }
}

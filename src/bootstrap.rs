use std::{sync::Arc, time::Duration};

use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    fingerprint::{OffsetPool, DEFAULT_OFFSET_CAPACITY},
    notify::{LogNotifier, PaymentNotifier, TelegramNotifier},
    payments::{PaymentStore, PgPaymentStore},
    reconciler::{ReconcilerConfig, ReconcilerScheduler, ReconciliationEngine},
    scanner::{ChainScanner, TronScanClient},
    service::{PaymentService, ServiceConfig},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;

    let store: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(pool.clone()));

    // Fingerprint pool: offsets held by requests that survived a restart
    // must not be issued again.
    let offsets = Arc::new(OffsetPool::new(DEFAULT_OFFSET_CAPACITY));
    let active = store.list_active_pending(Utc::now()).await?;
    offsets.restore(
        active
            .iter()
            .map(|payment| payment.fingerprint_amount - config.base_price),
    );
    info!(
        "✅ Fingerprint pool restored: {} offsets outstanding",
        offsets.outstanding()
    );

    let scanner: Arc<dyn ChainScanner> = Arc::new(TronScanClient::from_config(config)?);
    info!(
        "✅ Explorer client initialized for {} transfers to {}",
        config.token_symbol, config.merchant_address
    );

    let notifier: Arc<dyn PaymentNotifier> = match &config.telegram_bot_token {
        Some(token) => {
            info!("✅ Telegram confirmation notifier enabled");
            Arc::new(TelegramNotifier::new(token.clone()))
        }
        None => {
            info!("ℹ️ TELEGRAM_BOT_TOKEN not set - confirmations logged only");
            Arc::new(LogNotifier)
        }
    };

    // Reconciliation engine + scheduler
    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        scanner,
        notifier,
        offsets.clone(),
        ReconcilerConfig::from_config(config),
    ));
    let scheduler = ReconcilerScheduler::new(
        Duration::from_secs(config.tick_interval_secs),
        engine,
    );
    let _reconciler_task = scheduler.start();
    info!(
        "✅ Reconciliation scheduler started (every {}s)",
        config.tick_interval_secs
    );

    let service = Arc::new(PaymentService::new(
        store,
        offsets,
        ServiceConfig::from_config(config),
    ));
    info!("✅ Payment service initialized");

    Ok(AppState { service })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}

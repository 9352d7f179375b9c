mod api;
mod bootstrap;
mod config;
mod error;
mod fingerprint;
mod notify;
mod payments;
mod reconciler;
mod scanner;
mod server;
mod service;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug,paywatch=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("🚀 Starting subscription payment reconciliation service");

    // Load configuration
    dotenv::dotenv().ok();
    let config = config::Config::from_env()?;

    let state = bootstrap::initialize_app_state(&config).await?;

    // Create HTTP server
    let app = server::create_app(state).await;

    // Run the Server
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}

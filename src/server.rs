use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{health_check, request_payment, subscription_status, AppState};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/payments/request", post(request_payment))
                .route("/subscriptions/:user_id", get(subscription_status)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use tracing::info;

use super::models::{PaymentRequest, SubscriptionStatusResponse};
use crate::error::AppResult;
use crate::service::{PaymentInstructions, PaymentService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentService>,
}

/// Allocate a fingerprint amount and return payment instructions
/// POST /api/v1/payments/request
pub async fn request_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> AppResult<Json<PaymentInstructions>> {
    info!("Payment requested by user {}", request.user_id);

    let instructions = state.service.request_payment(request.user_id).await?;
    Ok(Json(instructions))
}

/// Current subscription expiry for a user, for access-control checks
/// GET /api/v1/subscriptions/:user_id
pub async fn subscription_status(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<SubscriptionStatusResponse>> {
    let subscription = state.service.subscription_status(user_id).await?;
    let active = subscription
        .as_ref()
        .is_some_and(|sub| sub.is_active(Utc::now()));

    Ok(Json(SubscriptionStatusResponse {
        user_id,
        expires_at: subscription.map(|sub| sub.expires_at),
        active,
    }))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

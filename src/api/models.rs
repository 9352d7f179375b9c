use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub user_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

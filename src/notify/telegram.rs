use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::PaymentNotifier;
use crate::error::{AppError, AppResult};

/// Sends payment confirmations straight to the user's chat via the
/// Telegram Bot API
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest {
    chat_id: i64,
    text: String,
    parse_mode: &'static str,
}

impl TelegramNotifier {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: Client::new(),
            api_base: "https://api.telegram.org".to_string(),
            bot_token,
        }
    }
}

#[async_trait]
impl PaymentNotifier for TelegramNotifier {
    async fn payment_confirmed(&self, user_id: i64, new_expiry: DateTime<Utc>) -> AppResult<()> {
        let request = SendMessageRequest {
            chat_id: user_id,
            text: format!(
                "✅ *Payment confirmed!*\n📅 Subscription expires: `{}`",
                new_expiry.format("%Y-%m-%d %H:%M")
            ),
            parse_mode: "Markdown",
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalError(format!(
                "Telegram API error: {}",
                error_text
            )));
        }

        info!("📨 Confirmation message delivered to user {}", user_id);
        Ok(())
    }
}

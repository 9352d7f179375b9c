use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Base URL of the TronScan-compatible explorer API
    pub tronscan_api_url: String,
    /// Merchant address that receives subscription payments
    pub merchant_address: String,
    pub token_symbol: String,
    pub base_price: Decimal,
    pub scan_page_limit: u32,
    pub scan_timeout_secs: u64,
    pub tick_interval_secs: u64,
    pub pending_ttl_hours: i64,
    pub subscription_days: i64,
    /// Enables the Telegram confirmation notifier when set
    pub telegram_bot_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/paywatch".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            tronscan_api_url: std::env::var("TRONSCAN_API_URL")
                .unwrap_or_else(|_| "https://apilist.tronscan.org".to_string()),
            merchant_address: std::env::var("USDT_ADDRESS").map_err(|_| {
                config::ConfigError::Message("USDT_ADDRESS must be set".to_string())
            })?,
            token_symbol: std::env::var("TOKEN_SYMBOL").unwrap_or_else(|_| "USDT".to_string()),
            base_price: parse_var("BASE_PRICE", Decimal::from(100))?,
            scan_page_limit: parse_var("SCAN_PAGE_LIMIT", 20)?,
            scan_timeout_secs: parse_var("SCAN_TIMEOUT_SECS", 10)?,
            tick_interval_secs: parse_var("TICK_INTERVAL_SECS", 30)?,
            pending_ttl_hours: parse_var("PENDING_TTL_HOURS", 24)?,
            subscription_days: parse_var("SUBSCRIPTION_DAYS", 30)?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
        })
    }

    /// How long a payment request stays matchable
    pub fn pending_ttl(&self) -> Duration {
        Duration::hours(self.pending_ttl_hours)
    }

    /// Access window granted per successful payment
    pub fn subscription_period(&self) -> Duration {
        Duration::days(self.subscription_days)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, config::ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            config::ConfigError::Message(format!("{} is not a valid value for {}", raw, name))
        }),
        Err(_) => Ok(default),
    }
}

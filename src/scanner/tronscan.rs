use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use super::models::{InboundTransfer, ScanOutcome, TransferPage};
use super::ChainScanner;
use crate::config::Config;
use crate::error::{AppResult, ScannerError};

/// Read-only client for a TronScan-compatible explorer API.
///
/// Queries the most recent inbound TRC-20 transfers to the merchant address.
/// Carries no "already seen" state - deduplication is entirely the
/// reconciliation engine's concern.
pub struct TronScanClient {
    client: Client,
    base_url: String,
    merchant_address: String,
    token_symbol: String,
    page_limit: u32,
}

impl TronScanClient {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            config.tronscan_api_url.clone(),
            config.merchant_address.clone(),
            config.token_symbol.clone(),
            config.scan_page_limit,
            Duration::from_secs(config.scan_timeout_secs),
        )
    }

    pub fn new(
        base_url: String,
        merchant_address: String,
        token_symbol: String,
        page_limit: u32,
        timeout: Duration,
    ) -> AppResult<Self> {
        // A short timeout keeps a slow explorer from stalling the tick loop.
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            merchant_address,
            token_symbol,
            page_limit,
        })
    }
}

#[async_trait]
impl ChainScanner for TronScanClient {
    async fn recent_transfers(&self) -> ScanOutcome {
        let url = format!("{}/api/token_trc20/transfers", self.base_url);

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("limit", self.page_limit.to_string()),
                ("direction", "in".to_string()),
                ("relatedAddress", self.merchant_address.clone()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return ScanOutcome::Unavailable(ScannerError::Unreachable(e.to_string()));
            }
        };

        if !response.status().is_success() {
            return ScanOutcome::Unavailable(ScannerError::BadStatus(response.status().as_u16()));
        }

        let page: TransferPage = match response.json().await {
            Ok(page) => page,
            Err(e) => {
                return ScanOutcome::Malformed(ScannerError::UnexpectedShape(format!(
                    "undecodable transfer page: {}",
                    e
                )));
            }
        };

        ScanOutcome::Transfers(collect_inbound(
            page,
            &self.token_symbol,
            &self.merchant_address,
        ))
    }
}

/// Keep only transfers of the expected token arriving at the merchant
/// address. A single bad record is skipped with a warning rather than
/// discarding the rest of the page.
fn collect_inbound(page: TransferPage, token_symbol: &str, merchant_address: &str) -> Vec<InboundTransfer> {
    let mut inbound = Vec::new();

    for raw in page.token_transfers {
        if raw.token_info.symbol != token_symbol || raw.to_address != merchant_address {
            continue;
        }
        match raw.amount() {
            Ok(amount) => inbound.push(InboundTransfer {
                transfer_id: raw.transaction_id,
                to_address: raw.to_address,
                amount,
                token_symbol: raw.token_info.symbol,
            }),
            Err(e) => warn!("skipping malformed transfer {}: {}", raw.transaction_id, e),
        }
    }

    inbound
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_page() -> TransferPage {
        serde_json::from_str(
            r#"{
                "token_transfers": [
                    {
                        "transaction_id": "tx-aaa",
                        "to_address": "TMerchant",
                        "quant": "100001000",
                        "tokenInfo": {"symbol": "USDT", "decimals": 6}
                    },
                    {
                        "transaction_id": "tx-bbb",
                        "to_address": "TMerchant",
                        "quant": "50000000",
                        "tokenInfo": {"symbol": "TRX", "decimals": 6}
                    },
                    {
                        "transaction_id": "tx-ccc",
                        "to_address": "TSomeoneElse",
                        "quant": "100002000",
                        "tokenInfo": {"symbol": "USDT", "decimals": 6}
                    },
                    {
                        "transaction_id": "tx-ddd",
                        "to_address": "TMerchant",
                        "quant": "bogus",
                        "tokenInfo": {"symbol": "USDT", "decimals": 6}
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_collect_filters_token_address_and_bad_records() {
        let inbound = collect_inbound(sample_page(), "USDT", "TMerchant");

        // tx-bbb is the wrong token, tx-ccc the wrong address and tx-ddd
        // unparseable; only tx-aaa survives.
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].transfer_id, "tx-aaa");
        assert_eq!(inbound[0].amount, dec!(100.001));
    }

    #[test]
    fn test_missing_transfer_list_decodes_as_empty_page() {
        let page: TransferPage = serde_json::from_str(r#"{"total": 0}"#).unwrap();
        assert!(collect_inbound(page, "USDT", "TMerchant").is_empty());
    }
}

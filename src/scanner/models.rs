use rust_decimal::Decimal;
use serde::Deserialize;

pub use crate::error::ScannerError;

/// One inbound token transfer observed at the merchant address
#[derive(Debug, Clone, PartialEq)]
pub struct InboundTransfer {
    /// Globally unique per on-chain event, supplied by the explorer
    pub transfer_id: String,
    pub to_address: String,
    pub amount: Decimal,
    pub token_symbol: String,
}

/// Result of one explorer query.
///
/// "No transfers" is a success with an empty list; a failed query and a
/// response we could not interpret are distinct outcomes so the engine (and
/// the tests) can treat each path on its own terms. None of them carries
/// partial data - a failed query never fabricates transfers.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Transfers(Vec<InboundTransfer>),
    /// Network error, timeout or non-success HTTP status; retried next tick
    Unavailable(ScannerError),
    /// Response parsed but not the expected shape; a defect worth logging
    Malformed(ScannerError),
}

/// Raw explorer payload: page of TRC-20 transfer events
#[derive(Debug, Deserialize)]
pub struct TransferPage {
    #[serde(default)]
    pub token_transfers: Vec<RawTransfer>,
}

#[derive(Debug, Deserialize)]
pub struct RawTransfer {
    pub transaction_id: String,
    pub to_address: String,
    /// Transferred magnitude in the token's smallest unit; the explorer
    /// serializes it as either a string or a bare number
    pub quant: serde_json::Value,
    #[serde(rename = "tokenInfo")]
    pub token_info: TokenInfo,
}

#[derive(Debug, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u32,
}

impl RawTransfer {
    /// Token amount in whole units: `quant / 10^decimals`
    pub fn amount(&self) -> Result<Decimal, ScannerError> {
        let quant = match &self.quant {
            serde_json::Value::String(s) => s.parse::<Decimal>(),
            serde_json::Value::Number(n) => n.to_string().parse::<Decimal>(),
            other => {
                return Err(ScannerError::UnexpectedShape(format!(
                    "quant is neither string nor number: {}",
                    other
                )))
            }
        }
        .map_err(|e| ScannerError::UnexpectedShape(format!("unparseable quant: {}", e)))?;

        let decimals = self.token_info.decimals;
        if decimals > 28 {
            return Err(ScannerError::UnexpectedShape(format!(
                "token decimals out of range: {}",
                decimals
            )));
        }

        let mut scaled = quant;
        scaled
            .set_scale(scaled.scale() + decimals)
            .map_err(|e| ScannerError::UnexpectedShape(format!("quant out of range: {}", e)))?;
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(quant: serde_json::Value, decimals: u32) -> RawTransfer {
        RawTransfer {
            transaction_id: "abc".to_string(),
            to_address: "TMerchant".to_string(),
            quant,
            token_info: TokenInfo {
                symbol: "USDT".to_string(),
                decimals,
            },
        }
    }

    #[test]
    fn test_amount_from_string_quant() {
        let transfer = raw(serde_json::json!("100001000"), 6);
        assert_eq!(transfer.amount().unwrap(), dec!(100.001));
    }

    #[test]
    fn test_amount_from_numeric_quant() {
        let transfer = raw(serde_json::json!(100002000u64), 6);
        assert_eq!(transfer.amount().unwrap(), dec!(100.002));
    }

    #[test]
    fn test_amount_rejects_garbage_quant() {
        let transfer = raw(serde_json::json!({"nested": true}), 6);
        assert!(transfer.amount().is_err());

        let transfer = raw(serde_json::json!("not-a-number"), 6);
        assert!(transfer.amount().is_err());
    }
}

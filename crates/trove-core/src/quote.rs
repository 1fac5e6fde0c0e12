//! Stable-asset sell quote against USDC from the off-chain swap-quote API.
//!
//! The quote is the snapshot's secondary reference price: what the market
//! currently pays for a fixed-size stable-asset sale, after network costs.

use alloy::primitives::{Address, U256};
use eyre::{eyre, Context, Result};
use serde::{Deserialize, Serialize};
use trove_chain::contracts::addresses;

use crate::types::{units_to_f64, SwapQuote};

/// USDC on the secondary chain.
const ETH_USDC: Address = alloy::primitives::address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");

const STABLE_DECIMALS: u8 = 18;
const USDC_DECIMALS: u8 = 6;

/// Sale size used for the reference quote, in whole stable-asset units.
pub const DEFAULT_QUOTE_SELL_AMOUNT: u64 = 100_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest {
    sell_token: String,
    buy_token: String,
    from: String,
    kind: String,
    sell_amount_before_fee: String,
    partially_fillable: bool,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    quote: QuoteAmounts,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteAmounts {
    sell_amount: String,
    buy_amount: String,
}

/// Client for the swap-quote REST API.
pub struct QuoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl QuoteClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Quotes selling `amount` whole stable-asset units for USDC.
    ///
    /// # Errors
    /// Returns error if the request fails or the response is malformed.
    #[tracing::instrument(skip(self), fields(amount))]
    pub async fn stable_sell_quote(&self, amount: u64) -> Result<SwapQuote> {
        let sell_amount = U256::from(amount) * U256::from(10u64).pow(U256::from(STABLE_DECIMALS));
        let request = QuoteRequest {
            sell_token: format!("{:#x}", addresses::STABLE_TOKEN),
            buy_token: format!("{:#x}", ETH_USDC),
            from: format!("{:#x}", addresses::BRIDGE_CUSTODIAN),
            kind: "sell".to_string(),
            sell_amount_before_fee: sell_amount.to_string(),
            partially_fillable: true,
        };

        let response = self
            .http
            .post(format!("{}/api/v1/quote", self.base_url))
            .json(&request)
            .send()
            .await
            .wrap_err("quote API request failed")?;

        if !response.status().is_success() {
            return Err(eyre!("quote API returned status {}", response.status()));
        }

        let body: QuoteResponse = response
            .json()
            .await
            .wrap_err("failed to parse quote API response")?;

        Ok(SwapQuote {
            sell_amount: parse_units(&body.quote.sell_amount, STABLE_DECIMALS)?,
            buy_amount: parse_units(&body.quote.buy_amount, USDC_DECIMALS)?,
        })
    }
}

fn parse_units(raw: &str, decimals: u8) -> Result<f64> {
    let value: U256 = raw
        .parse()
        .wrap_err_with(|| format!("quote amount is not a decimal integer: {raw}"))?;
    units_to_f64(value, decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_response_deserializes_api_shape() {
        let body = r#"{
            "quote": {
                "sellToken": "0xdd468a1ddc392dcdbef6db6e34e89aa338f9f186",
                "buyToken": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                "sellAmount": "100000000000000000000000",
                "buyAmount": "99850000000",
                "kind": "sell"
            },
            "expiration": "2026-08-07T12:00:00Z"
        }"#;

        let parsed: QuoteResponse = serde_json::from_str(body).expect("shape should parse");
        assert_eq!(
            parse_units(&parsed.quote.sell_amount, STABLE_DECIMALS).unwrap(),
            100_000.0
        );
        assert_eq!(
            parse_units(&parsed.quote.buy_amount, USDC_DECIMALS).unwrap(),
            99_850.0
        );
    }

    #[test]
    fn parse_units_rejects_garbage() {
        assert!(parse_units("not-a-number", 18).is_err());
    }
}

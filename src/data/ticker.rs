//! 24h rolling ticker over plain REST.

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::config::BINANCE;
use crate::domain::Ticker;
use crate::error::{EngineError, Result};

/// Binance serves every number in this payload as a string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24hRaw {
    last_price: String,
    quote_volume: String,
    price_change_percent: String,
    high_price: String,
    low_price: String,
}

impl Ticker24hRaw {
    fn parse(&self, symbol: &str) -> Result<Ticker> {
        let field = |name: &str, raw: &str| {
            raw.parse::<f64>().map_err(|_| EngineError::MalformedData {
                symbol: symbol.to_string(),
                interval: None,
                reason: format!("ticker field {} = {:?} is not a number", name, raw),
            })
        };
        Ok(Ticker {
            last_price: field("lastPrice", &self.last_price)?,
            quote_volume: field("quoteVolume", &self.quote_volume)?,
            price_change_percent: field("priceChangePercent", &self.price_change_percent)?,
            high: field("highPrice", &self.high_price)?,
            low: field("lowPrice", &self.low_price)?,
        })
    }
}

pub struct TickerClient {
    client: reqwest::Client,
    base_url: String,
}

impl TickerClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE.rest.base_url)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(BINANCE.client.timeout_ms))
            .build()
            .map_err(|e| EngineError::config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let url = format!("{}{}", self.base_url, BINANCE.rest.ticker_24h_path);
        log::debug!("Fetching 24h ticker: {}?symbol={}", url, symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| EngineError::TransientNetwork(format!("{} ticker request failed: {}", symbol, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(EngineError::RateLimited {
                context: format!("{} ticker: HTTP {}", symbol, status),
                retry_after,
            });
        }
        if status.is_server_error() {
            return Err(EngineError::TransientNetwork(format!("{} ticker: HTTP {}", symbol, status)));
        }
        if !status.is_success() {
            return Err(EngineError::Upstream(format!("{} ticker: HTTP {}", symbol, status)));
        }

        let raw: Ticker24hRaw = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedData {
                symbol: symbol.to_string(),
                interval: None,
                reason: format!("ticker body: {}", e),
            })?;
        raw.parse(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binance_payload() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "priceChange": "-94.99999800",
            "priceChangePercent": "-0.095",
            "lastPrice": "99905.00000000",
            "highPrice": "100500.00000000",
            "lowPrice": "98000.00000000",
            "quoteVolume": "15.30000000",
            "count": 76
        }"#;
        let raw: Ticker24hRaw = serde_json::from_str(json).unwrap();
        let ticker = raw.parse("BTCUSDT").unwrap();
        assert_eq!(ticker.last_price, 99_905.0);
        assert_eq!(ticker.price_change_percent, -0.095);
        assert_eq!(ticker.quote_volume, 15.3);
        assert_eq!(ticker.high, 100_500.0);
    }

    #[test]
    fn non_numeric_field_is_malformed_data() {
        let raw = Ticker24hRaw {
            last_price: "n/a".to_string(),
            quote_volume: "1".to_string(),
            price_change_percent: "0".to_string(),
            high_price: "1".to_string(),
            low_price: "1".to_string(),
        };
        let err = raw.parse("X").unwrap_err();
        assert!(matches!(
            &err,
            EngineError::MalformedData { symbol, interval: None, .. } if symbol == "X"
        ));
        assert_eq!(
            err.to_string(),
            "malformed data for X: ticker field lastPrice = \"n/a\" is not a number"
        );
    }
}

use async_trait::async_trait;
use binance_sdk::spot::rest_api::RestApi;

use crate::config::Interval;
use crate::data::{TickerClient, bn_kline};
use crate::domain::{Candle, SymbolInterval, Ticker};
use crate::error::Result;

/// Abstract interface for fetching market data.
///
/// Implementations return candles oldest first and already validated. Rate
/// limiting is the caller's job.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// The most recent `limit` candles for a symbol at an interval.
    async fn fetch_candles(&self, symbol: &str, interval: Interval, limit: usize)
    -> Result<Vec<Candle>>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker>;
}

pub struct BinanceProvider {
    rest_client: RestApi,
    ticker: TickerClient,
}

impl BinanceProvider {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rest_client: bn_kline::configure_binance_client()?,
            ticker: TickerClient::new()?,
        })
    }
}

#[async_trait]
impl CandleSource for BinanceProvider {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let pair = SymbolInterval::new(symbol, interval);
        bn_kline::load_klines(&self.rest_client, &pair, limit).await
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.ticker.fetch_ticker(symbol).await
    }
}

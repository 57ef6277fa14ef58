use {
    crate::{
        config::Interval,
        domain::Ticker,
        models::{MarketMetrics, MarketSignal, TimeframeSignal},
    },
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, fmt},
};

/// Everything the engine knows about one symbol.
/// Held behind an `Arc` in the store and replaced wholesale on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    /// Not provided by the exchange feed; stays `None` unless an upstream source fills it.
    pub market_cap: Option<f64>,
    /// Last 24h snapshot from the candle source (warm-up).
    pub ticker: Option<Ticker>,
    pub last_tick_ms: Option<i64>,
    pub metrics: BTreeMap<Interval, MarketMetrics>,
    /// Timeframes with enough history to be scored. Others are absent, not neutral.
    pub timeframe_signals: BTreeMap<Interval, TimeframeSignal>,
    pub latest_signal: Option<MarketSignal>,
}

impl MarketState {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: 0.0,
            volume: 0.0,
            market_cap: None,
            ticker: None,
            last_tick_ms: None,
            metrics: BTreeMap::new(),
            timeframe_signals: BTreeMap::new(),
            latest_signal: None,
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trend = self
            .latest_signal
            .as_ref()
            .map(|s| s.overall_trend.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} px={:.6} vol={:.2} tfs={} trend={}",
            self.symbol,
            self.price,
            self.volume,
            self.metrics.len(),
            trend,
        )
    }
}

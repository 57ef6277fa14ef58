use serde::{Deserialize, Serialize};

/// 24h rolling snapshot for a symbol, as served by the candle source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub last_price: f64,
    pub quote_volume: f64,
    pub price_change_percent: f64,
    pub high: f64,
    pub low: f64,
}

/// One live event from the tick stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub event_time_ms: i64,
}

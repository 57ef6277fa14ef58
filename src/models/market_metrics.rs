use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// RSI at the three configured lookbacks. Every value lies in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    pub short: f64,
    pub medium: f64,
    pub long: f64,
}

impl Momentum {
    pub const NEUTRAL: Self = Self {
        short: 50.0,
        medium: 50.0,
        long: 50.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Average volume of the most recent window.
    pub value: f64,
    /// Change of `value` against the preceding window, in %.
    pub change_pct: f64,
    pub trend: VolumeTrend,
}

/// Indicators for one (symbol, timeframe), derived wholesale from a candle window.
/// Never patched in place: each cycle produces a fresh value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub price_change_pct: f64,
    pub volatility_pct: f64,
    pub drawdown_pct: f64,
    pub momentum: Momentum,
    pub volume_profile: VolumeProfile,
    /// Open time of the newest candle the metrics were computed from.
    pub last_update: i64,
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::Display;

use crate::config::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrendClass {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MomentumHorizon {
    Short,
    Medium,
    Long,
}

/// Evidence tag recorded whenever a scoring factor fires.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendReason {
    PriceIncrease,
    PriceDecrease,
    #[strum(to_string = "rsi_bullish({horizon})")]
    RsiBullish { horizon: MomentumHorizon },
    #[strum(to_string = "rsi_bearish({horizon})")]
    RsiBearish { horizon: MomentumHorizon },
    #[strum(to_string = "rsi_overbought({horizon})")]
    RsiOverbought { horizon: MomentumHorizon },
    #[strum(to_string = "rsi_oversold({horizon})")]
    RsiOversold { horizon: MomentumHorizon },
    IncreasingVolume,
    DecreasingVolume,
    HighVolatility,
    ExcessiveDrawdown,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub classification: TrendClass,
    pub reasons: BTreeSet<TrendReason>,
}

/// The verdict for one timeframe in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeSignal {
    pub timeframe: Interval,
    /// |price change %| over the window.
    pub strength: f64,
    /// Net score the classification was derived from.
    pub score: f64,
    pub confirmed_at: i64,
    pub price_at_signal: f64,
    pub trend: TrendAssessment,
    pub volume: f64,
    pub price_change_pct: f64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VolatilityProfile {
    Low,
    Medium,
    High,
    Extreme,
}

/// Per-symbol roll-up of every timeframe that had enough history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignal {
    pub symbol: String,
    pub timestamp: i64,
    pub signals: Vec<TimeframeSignal>,
    pub overall_strength: f64,
    pub is_valid: bool,
    pub volatility_profile: VolatilityProfile,
    /// Share of non-neutral timeframes that agree with the majority, in [0, 1].
    pub trend_consistency: f64,
    pub overall_trend: TrendClass,
}

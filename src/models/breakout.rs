use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::Interval;
use crate::models::{Momentum, TrendClass, VolumeProfile};

/// Magnitude bucket. Ordered, so `>=` compares severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BreakoutType {
    Short,
    Medium,
    Large,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BreakoutDirection {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutAlert {
    pub symbol: String,
    pub timestamp: i64,
    pub breakout_type: BreakoutType,
    pub current_price: f64,
    /// Close of the last candle still inside the channel.
    pub price_at_breakout: f64,
    pub percentage_move: f64,
    pub timeframe: Interval,
    pub direction: BreakoutDirection,
    pub trend: TrendClass,
    pub volume_profile: VolumeProfile,
    pub momentum: Momentum,
}

mod breakout;
mod market_metrics;
mod market_state;
mod signal;

pub use breakout::{BreakoutAlert, BreakoutDirection, BreakoutType};
pub use market_metrics::{MarketMetrics, Momentum, VolumeProfile, VolumeTrend};
pub use market_state::MarketState;
pub use signal::{
    MarketSignal, MomentumHorizon, TimeframeSignal, TrendAssessment, TrendClass, TrendReason,
    VolatilityProfile,
};

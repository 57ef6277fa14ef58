//! Configuration module for the market analysis engine.

// Can all be private now because we have a public re-export.
mod analysis;
mod binance;
mod debug;
mod engine;
mod types;

// Re-export commonly used items
pub use analysis::{
    AlertConfig, BreakoutConfig, BreakoutThresholds, DEFAULT_TIMEFRAMES, HorizonWeights,
    METRICS, MetricsConfig, MomentumPeriods, SIGNAL, SignalConfig, TimeframeConfig,
};
pub use binance::BINANCE;
pub use debug::DF;
pub use engine::{EngineConfig, SchedulerConfig, StreamConfig};
pub use types::Interval;

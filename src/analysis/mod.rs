// Pure analysis: candles in, metrics/signals/breakouts out. No I/O here.
pub mod breakout;
pub mod metrics;
pub mod patterns;
pub mod signal;

pub use breakout::{BreakoutCandidate, BreakoutDetector, Channel};
pub use metrics::{compute_metrics, validate_window};
pub use patterns::detect_pattern;
pub use signal::{
    aggregate, build_timeframe_signal, detect_timeframe_signal, score_timeframe,
    volatility_profile,
};

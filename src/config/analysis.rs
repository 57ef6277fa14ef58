//! Analysis and computation configuration

use serde::{Deserialize, Serialize};

use crate::config::Interval;
use crate::models::BreakoutType;
use crate::utils::TimeUtils;

/// Per-interval thresholds. Longer horizons tolerate larger moves, so every field
/// must strictly increase with interval duration (checked by `EngineConfig::validate`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeConfig {
    pub interval: Interval,
    /// Minimum |price change %| over the window for the move to count.
    pub price_change_threshold: f64,
    /// Scales annualised volatility and the volume-change threshold.
    pub volatility_multiplier: f64,
    /// Annualised volatility % above which the score is penalised.
    pub volatility_threshold: f64,
    /// Drawdown % above which the score is penalised.
    pub max_drawdown: f64,
}

/// RSI lookback periods for the three momentum horizons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumPeriods {
    pub short: usize,
    pub medium: usize,
    pub long: usize,
}

impl MomentumPeriods {
    pub fn longest(&self) -> usize {
        self.short.max(self.medium).max(self.long)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub momentum: MomentumPeriods,
    /// Candles in each half of the volume comparison (recent vs preceding).
    pub volume_window: usize,
    /// Volume change % that counts as increasing/decreasing, before timeframe scaling.
    pub volume_change_pct: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        METRICS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonWeights {
    pub short: f64,
    pub medium: f64,
    pub long: f64,
}

/// Weights and cutoffs of the net-score model. All of it is tunable;
/// the defaults are a reasonable starting point, not a contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub rsi_weights: HorizonWeights,
    /// RSI at or above this counts as bullish momentum.
    pub rsi_bullish: f64,
    /// RSI at or below this counts as bearish momentum.
    pub rsi_bearish: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub volume_weight: f64,
    /// Upper bound on |price-change contribution|.
    pub price_weight_cap: f64,
    pub volatility_penalty: f64,
    pub drawdown_penalty: f64,
    pub pattern_bonus: f64,
    pub bullish_score: f64,
    pub bearish_score: f64,
    /// Timeframes that must agree with the majority trend for a valid market signal.
    pub min_confirmations: usize,
    /// Ratio of volatility to the timeframe's threshold at which the profile becomes
    /// medium, high and extreme respectively.
    pub volatility_buckets: [f64; 3],
}

impl Default for SignalConfig {
    fn default() -> Self {
        SIGNAL
    }
}

/// Ascending % moves (from the pre-breakout close) that start each magnitude bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakoutThresholds {
    pub short: f64,
    pub medium: f64,
    pub large: f64,
    pub extreme: f64,
}

impl BreakoutThresholds {
    pub fn classify(&self, move_pct: f64) -> Option<BreakoutType> {
        let m = move_pct.abs();
        if m >= self.extreme {
            Some(BreakoutType::Extreme)
        } else if m >= self.large {
            Some(BreakoutType::Large)
        } else if m >= self.medium {
            Some(BreakoutType::Medium)
        } else if m >= self.short {
            Some(BreakoutType::Short)
        } else {
            None
        }
    }

    pub(crate) fn as_array(&self) -> [f64; 4] {
        [self.short, self.medium, self.large, self.extreme]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    /// Timeframes whose candle windows are scanned for breakouts.
    pub timeframes: Vec<Interval>,
    /// Closes used for the channel (excluding the candle under test).
    pub lookback: usize,
    /// Band half-width in standard deviations.
    pub band_k: f64,
    pub volume_multiplier: f64,
    /// Closes (including the latest) used for the max/min expansion ratio.
    pub expansion_window: usize,
    pub expansion_threshold: f64,
    pub thresholds: BreakoutThresholds,
    pub cooldown_ms: i64,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![Interval::M5, Interval::H1],
            lookback: 20,
            band_k: 2.0,
            volume_multiplier: 1.5,
            expansion_window: 5,
            expansion_threshold: 1.02,
            thresholds: BreakoutThresholds {
                short: 1.0,
                medium: 3.0,
                large: 5.0,
                extreme: 10.0,
            },
            cooldown_ms: TimeUtils::MS_IN_15_MIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum spacing between two forwarded alerts for the same symbol.
    pub cooldown_ms: i64,
    /// Breakouts smaller than this are dropped before the cooldown is consulted.
    pub min_breakout: BreakoutType,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: TimeUtils::MS_IN_30_MIN,
            min_breakout: BreakoutType::Medium,
        }
    }
}

pub const METRICS: MetricsConfig = MetricsConfig {
    momentum: MomentumPeriods {
        short: 14,
        medium: 30,
        long: 50,
    },
    volume_window: 5,
    volume_change_pct: 20.0,
};

pub const SIGNAL: SignalConfig = SignalConfig {
    // Faster horizons react first, so they carry more weight.
    rsi_weights: HorizonWeights {
        short: 3.0,
        medium: 2.0,
        long: 1.0,
    },
    rsi_bullish: 55.0,
    rsi_bearish: 45.0,
    rsi_overbought: 70.0,
    rsi_oversold: 30.0,
    volume_weight: 2.0,
    price_weight_cap: 2.0,
    volatility_penalty: 1.0,
    drawdown_penalty: 1.0,
    pattern_bonus: 1.0,
    bullish_score: 3.0,
    bearish_score: -3.0,
    min_confirmations: 2,
    volatility_buckets: [0.5, 1.0, 2.0],
};

/// Default monitored timeframes: 5m / 1h / 4h / 1d.
pub const DEFAULT_TIMEFRAMES: [TimeframeConfig; 4] = [
    TimeframeConfig {
        interval: Interval::M5,
        price_change_threshold: 0.5,
        volatility_multiplier: 1.0,
        volatility_threshold: 60.0,
        max_drawdown: 2.0,
    },
    TimeframeConfig {
        interval: Interval::H1,
        price_change_threshold: 1.5,
        volatility_multiplier: 1.2,
        volatility_threshold: 75.0,
        max_drawdown: 5.0,
    },
    TimeframeConfig {
        interval: Interval::H4,
        price_change_threshold: 3.0,
        volatility_multiplier: 1.5,
        volatility_threshold: 90.0,
        max_drawdown: 10.0,
    },
    TimeframeConfig {
        interval: Interval::D1,
        price_change_threshold: 5.0,
        volatility_multiplier: 2.0,
        volatility_threshold: 120.0,
        max_drawdown: 20.0,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakout_buckets_are_ascending() {
        let t = BreakoutConfig::default().thresholds;
        assert_eq!(t.classify(0.5), None);
        assert_eq!(t.classify(1.0), Some(BreakoutType::Short));
        assert_eq!(t.classify(-4.0), Some(BreakoutType::Medium));
        assert_eq!(t.classify(8.0), Some(BreakoutType::Large));
        assert_eq!(t.classify(12.5), Some(BreakoutType::Extreme));
    }
}

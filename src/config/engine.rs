//! Runtime configuration: what to monitor and how hard to poll.
//!
//! Everything here can come from a TOML file; anything omitted falls back to the
//! compiled-in defaults. `validate` runs before any task is scheduled.

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::config::analysis::{
    AlertConfig, BreakoutConfig, DEFAULT_TIMEFRAMES, MetricsConfig, SignalConfig,
    TimeframeConfig,
};
use crate::config::{BINANCE, Interval};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Candles requested per fetch.
    pub candle_limit: usize,
    /// Floor for the per-pair polling period.
    pub min_poll_interval_ms: u64,
    /// Upper bound on fetches in flight across all pairs.
    pub max_concurrent_fetches: usize,
    /// Request weight budget per limiter window.
    pub weight_limit: u32,
    pub limiter_window_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            candle_limit: BINANCE.limits.klines_window as usize,
            min_poll_interval_ms: 5_000,
            max_concurrent_fetches: 8,
            weight_limit: BINANCE.limits.weight_limit_minute,
            limiter_window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub enabled: bool,
    /// Combined-stream endpoint; stream names are appended.
    pub base_url: String,
    /// Seed price/volume from the 24h ticker before connecting.
    pub warm_up: bool,
    /// Ticks are coalesced for this long before being written to the store.
    pub batch_window_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: BINANCE.ws.combined_base_url.to_string(),
            warm_up: true,
            batch_window_ms: 50,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            max_reconnect_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    #[serde(deserialize_with = "timeframes_from_table")]
    pub timeframes: Vec<TimeframeConfig>,
    pub metrics: MetricsConfig,
    pub signal: SignalConfig,
    pub breakout: BreakoutConfig,
    pub alerts: AlertConfig,
    pub scheduler: SchedulerConfig,
    pub stream: StreamConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframes: DEFAULT_TIMEFRAMES.to_vec(),
            metrics: MetricsConfig::default(),
            signal: SignalConfig::default(),
            breakout: BreakoutConfig::default(),
            alerts: AlertConfig::default(),
            scheduler: SchedulerConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

/// Thresholds as written in TOML, keyed by interval (`[timeframes.5m]`).
#[derive(Deserialize)]
struct TimeframeRow {
    price_change_threshold: f64,
    volatility_multiplier: f64,
    volatility_threshold: f64,
    max_drawdown: f64,
}

fn timeframes_from_table<'de, D>(deserializer: D) -> std::result::Result<Vec<TimeframeConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    // Unknown keys fail inside Interval's Deserialize impl.
    let table = BTreeMap::<Interval, TimeframeRow>::deserialize(deserializer)?;
    Ok(table
        .into_iter()
        .map(|(interval, row)| TimeframeConfig {
            interval,
            price_change_threshold: row.price_change_threshold,
            volatility_multiplier: row.volatility_multiplier,
            volatility_threshold: row.volatility_threshold,
            max_drawdown: row.max_drawdown,
        })
        .collect())
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: EngineConfig =
            toml::from_str(raw).map_err(|e| EngineError::config(e.to_string()))?;
        config.normalise();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Upper-cases symbols and drops duplicates, keeping first occurrence.
    pub fn normalise(&mut self) {
        let mut seen = HashSet::new();
        self.symbols = self
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        self.timeframes.sort_by_key(|tf| tf.interval);
    }

    pub fn timeframe(&self, interval: Interval) -> Option<&TimeframeConfig> {
        self.timeframes.iter().find(|tf| tf.interval == interval)
    }

    /// Candles a timeframe needs before its signal is trusted.
    pub fn required_history(&self) -> usize {
        self.metrics.momentum.longest() + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(EngineError::config("no symbols configured"));
        }
        if self.timeframes.is_empty() {
            return Err(EngineError::config("no timeframes configured"));
        }

        for pair in self.timeframes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.interval >= b.interval {
                return Err(EngineError::config(format!(
                    "timeframes must be unique and sorted, found {} before {}",
                    a.interval, b.interval
                )));
            }
            let checks = [
                ("price_change_threshold", a.price_change_threshold, b.price_change_threshold),
                ("volatility_multiplier", a.volatility_multiplier, b.volatility_multiplier),
                ("volatility_threshold", a.volatility_threshold, b.volatility_threshold),
                ("max_drawdown", a.max_drawdown, b.max_drawdown),
            ];
            for (name, shorter, longer) in checks {
                if shorter >= longer {
                    return Err(EngineError::config(format!(
                        "{} must strictly increase with interval: {}={} vs {}={}",
                        name, a.interval, shorter, b.interval, longer
                    )));
                }
            }
        }
        if self.timeframes.iter().any(|tf| {
            tf.price_change_threshold <= 0.0
                || tf.volatility_multiplier <= 0.0
                || tf.volatility_threshold <= 0.0
                || tf.max_drawdown <= 0.0
        }) {
            return Err(EngineError::config("timeframe thresholds must be positive"));
        }

        let m = &self.metrics.momentum;
        if m.short == 0 || m.short >= m.medium || m.medium >= m.long {
            return Err(EngineError::config(
                "momentum periods must satisfy 0 < short < medium < long",
            ));
        }
        if self.metrics.volume_window == 0 {
            return Err(EngineError::config("volume_window must be positive"));
        }

        let s = &self.signal;
        if !(0.0..=100.0).contains(&s.rsi_oversold)
            || s.rsi_oversold > s.rsi_bearish
            || s.rsi_bearish >= s.rsi_bullish
            || s.rsi_bullish > s.rsi_overbought
            || s.rsi_overbought > 100.0
        {
            return Err(EngineError::config(
                "RSI bands must satisfy oversold <= bearish < bullish <= overbought within [0,100]",
            ));
        }
        if s.bullish_score <= 0.0 || s.bearish_score >= 0.0 {
            return Err(EngineError::config(
                "bullish_score must be positive and bearish_score negative",
            ));
        }
        if s.min_confirmations == 0 {
            return Err(EngineError::config("min_confirmations must be at least 1"));
        }
        let [low, mid, high] = s.volatility_buckets;
        if !(0.0 < low && low < mid && mid < high) {
            return Err(EngineError::config(
                "volatility_buckets must be positive and strictly increasing",
            ));
        }

        let b = &self.breakout;
        if b.lookback < 2 || b.expansion_window < 2 {
            return Err(EngineError::config(
                "breakout lookback and expansion_window need at least 2 candles",
            ));
        }
        let t = b.thresholds.as_array();
        if t[0] <= 0.0 || t.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::config(
                "breakout thresholds must be positive and strictly increasing",
            ));
        }
        if b.band_k <= 0.0 || b.volume_multiplier <= 0.0 || b.expansion_threshold < 1.0 {
            return Err(EngineError::config(
                "breakout band_k/volume_multiplier must be positive, expansion_threshold >= 1",
            ));
        }
        if let Some(missing) = b.timeframes.iter().find(|i| self.timeframe(**i).is_none()) {
            return Err(EngineError::config(format!(
                "breakout timeframe {} is not a monitored timeframe",
                missing
            )));
        }
        if b.cooldown_ms < 0 || self.alerts.cooldown_ms < 0 {
            return Err(EngineError::config("cooldowns cannot be negative"));
        }

        let sc = &self.scheduler;
        let needed = self.required_history().max(b.lookback + 2);
        if sc.candle_limit < needed {
            return Err(EngineError::config(format!(
                "candle_limit {} is below the {} candles the indicators need",
                sc.candle_limit, needed
            )));
        }
        if sc.max_concurrent_fetches == 0 || sc.weight_limit == 0 || sc.limiter_window_ms == 0 {
            return Err(EngineError::config(
                "scheduler concurrency, weight limit and limiter window must be positive",
            ));
        }

        let st = &self.stream;
        if st.enabled && (st.initial_backoff_ms == 0 || st.initial_backoff_ms > st.max_backoff_ms)
        {
            return Err(EngineError::config(
                "stream backoff must satisfy 0 < initial_backoff_ms <= max_backoff_ms",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let raw = r#"
            symbols = ["btcusdt", "solusdt", "BTCUSDT"]

            [timeframes.15m]
            price_change_threshold = 1.0
            volatility_multiplier = 1.0
            volatility_threshold = 50.0
            max_drawdown = 3.0

            [timeframes.4h]
            price_change_threshold = 4.0
            volatility_multiplier = 2.0
            volatility_threshold = 90.0
            max_drawdown = 12.0

            [alerts]
            cooldown_ms = 60000

            [breakout]
            timeframes = ["15m"]
        "#;
        let config = EngineConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.symbols, vec!["BTCUSDT", "SOLUSDT"]);
        let intervals: Vec<Interval> = config.timeframes.iter().map(|t| t.interval).collect();
        assert_eq!(intervals, vec![Interval::M15, Interval::H4]);
        assert_eq!(config.alerts.cooldown_ms, 60_000);
        assert_eq!(config.signal, SignalConfig::default());
    }

    #[test]
    fn unknown_interval_key_is_rejected() {
        let raw = r#"
            [timeframes.7m]
            price_change_threshold = 1.0
            volatility_multiplier = 1.0
            volatility_threshold = 50.0
            max_drawdown = 3.0
        "#;
        let err = EngineConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, EngineError::ConfigValidation(msg) if msg.contains("7m")));
    }

    #[test]
    fn non_monotonic_thresholds_are_rejected() {
        let mut config = EngineConfig::default();
        config.timeframes[2].max_drawdown = 1.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EngineError::ConfigValidation(msg) if msg.contains("max_drawdown")));
    }

    #[test]
    fn breakout_timeframe_must_be_monitored() {
        let mut config = EngineConfig::default();
        config.breakout.timeframes = vec![Interval::M15];
        assert!(config.validate().is_err());
    }
}

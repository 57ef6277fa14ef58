//! Channel breakouts: a close leaving a Bollinger-style band, confirmed by volume
//! and a short-window volatility expansion.

use std::collections::HashMap;

use crate::config::{BreakoutConfig, Interval};
use crate::domain::Candle;
use crate::models::{BreakoutAlert, BreakoutDirection, BreakoutType, MarketMetrics, TrendClass};
use crate::utils::{mean, mean_and_sample_stddev, percent_change};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

impl Channel {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// A breakout that passed every confirmation, before cooldown is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutCandidate {
    pub direction: BreakoutDirection,
    pub breakout_type: BreakoutType,
    pub percentage_move: f64,
    pub current_price: f64,
    pub price_at_breakout: f64,
    pub channel: Channel,
}

/// Owns the per-symbol breakout cooldown. Entries are overwritten, never evicted.
#[derive(Debug)]
pub struct BreakoutDetector {
    config: BreakoutConfig,
    last_alert_ms: HashMap<String, i64>,
    /// Open time of the candle that last alerted, per (symbol, timeframe).
    /// A candle is polled more than once while it is still forming.
    alerted_candle: HashMap<(String, Interval), i64>,
}

impl BreakoutDetector {
    pub fn new(config: BreakoutConfig) -> Self {
        Self {
            config,
            last_alert_ms: HashMap::new(),
            alerted_candle: HashMap::new(),
        }
    }

    pub fn watches(&self, interval: Interval) -> bool {
        self.config.timeframes.contains(&interval)
    }

    /// SMA ± k·σ of the `lookback` closes that precede the latest candle.
    pub fn channel(&self, candles: &[Candle]) -> Option<Channel> {
        let n = candles.len();
        if n < self.config.lookback + 1 {
            return None;
        }
        let closes: Vec<f64> = candles[n - 1 - self.config.lookback..n - 1]
            .iter()
            .map(|c| c.close)
            .collect();
        let (middle, stddev) = mean_and_sample_stddev(&closes);
        let width = self.config.band_k * stddev;
        Some(Channel {
            middle,
            upper: middle + width,
            lower: middle - width,
        })
    }

    /// Applies every confirmation to the latest candle. Ignores cooldown.
    pub fn evaluate(&self, candles: &[Candle], trend: TrendClass) -> Option<BreakoutCandidate> {
        let cfg = &self.config;
        let n = candles.len();
        if n < cfg.expansion_window.max(2) {
            return None;
        }
        let channel = self.channel(candles)?;
        let latest = &candles[n - 1];
        let prev = &candles[n - 2];

        let direction = if latest.close > channel.upper {
            BreakoutDirection::Bullish
        } else if latest.close < channel.lower {
            BreakoutDirection::Bearish
        } else {
            return None;
        };

        // Only the crossing candle counts; a close already outside is a continuation.
        if !channel.contains(prev.close) {
            return None;
        }

        let volumes: Vec<f64> = candles[n - 1 - cfg.lookback..n - 1]
            .iter()
            .map(|c| c.volume)
            .collect();
        if latest.volume <= mean(&volumes) * cfg.volume_multiplier {
            return None;
        }

        let recent = &candles[n - cfg.expansion_window..];
        let max_close = recent.iter().map(|c| c.close).fold(f64::NEG_INFINITY, f64::max);
        let min_close = recent.iter().map(|c| c.close).fold(f64::INFINITY, f64::min);
        if min_close <= 0.0 || max_close / min_close <= cfg.expansion_threshold {
            return None;
        }

        let consistent = match direction {
            BreakoutDirection::Bullish => trend != TrendClass::Bearish,
            BreakoutDirection::Bearish => trend != TrendClass::Bullish,
        };
        if !consistent {
            return None;
        }

        let percentage_move = percent_change(prev.close, latest.close);
        let breakout_type = cfg.thresholds.classify(percentage_move)?;

        Some(BreakoutCandidate {
            direction,
            breakout_type,
            percentage_move,
            current_price: latest.close,
            price_at_breakout: prev.close,
            channel,
        })
    }

    pub fn in_cooldown(&self, symbol: &str, now_ms: i64) -> bool {
        self.last_alert_ms
            .get(symbol)
            .is_some_and(|last| now_ms - last < self.config.cooldown_ms)
    }

    /// Evaluates the window and, if it fires outside the symbol's cooldown on a
    /// candle that has not alerted yet, stamps both and returns the alert.
    pub fn detect(
        &mut self,
        symbol: &str,
        timeframe: Interval,
        candles: &[Candle],
        trend: TrendClass,
        metrics: &MarketMetrics,
        now_ms: i64,
    ) -> Option<BreakoutAlert> {
        let candidate = self.evaluate(candles, trend)?;
        let candle_ms = candles.last()?.timestamp_ms;
        let key = (symbol.to_string(), timeframe);
        if self.alerted_candle.get(&key) == Some(&candle_ms) {
            log::debug!("Breakout on {}@{} already alerted for this candle", symbol, timeframe);
            return None;
        }
        if self.in_cooldown(symbol, now_ms) {
            log::debug!(
                "Breakout on {}@{} suppressed by detector cooldown ({:+.2}%)",
                symbol,
                timeframe,
                candidate.percentage_move
            );
            return None;
        }
        self.last_alert_ms.insert(symbol.to_string(), now_ms);
        self.alerted_candle.insert(key, candle_ms);

        Some(BreakoutAlert {
            symbol: symbol.to_string(),
            timestamp: now_ms,
            breakout_type: candidate.breakout_type,
            current_price: candidate.current_price,
            price_at_breakout: candidate.price_at_breakout,
            percentage_move: candidate.percentage_move,
            timeframe,
            direction: candidate.direction,
            trend,
            volume_profile: metrics.volume_profile,
            momentum: metrics.momentum,
        })
    }
}

//! Net-score trend classification per timeframe, and the per-symbol roll-up.
//!
//! Both halves are pure: the same inputs always give the same output, so a
//! `MarketSignal` can be recomputed from any store snapshot.

use std::collections::BTreeSet;

use crate::analysis::patterns::detect_pattern;
use crate::config::{SignalConfig, TimeframeConfig};
use crate::domain::Candle;
use crate::error::{EngineError, Result};
use crate::models::{
    MarketMetrics, MarketSignal, MarketState, MomentumHorizon, TimeframeSignal, TrendAssessment,
    TrendClass, TrendReason, VolatilityProfile, VolumeTrend,
};

/// Raw output of the scoring model before it is wrapped in a `TimeframeSignal`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeScore {
    pub score: f64,
    pub reasons: BTreeSet<TrendReason>,
}

/// Adds up every factor that fired. See `SignalConfig` for the weights.
pub fn score_timeframe(
    metrics: &MarketMetrics,
    candles: &[Candle],
    timeframe: &TimeframeConfig,
    config: &SignalConfig,
) -> TimeframeScore {
    let mut score = 0.0;
    let mut reasons = BTreeSet::new();

    let horizons = [
        (MomentumHorizon::Short, metrics.momentum.short, config.rsi_weights.short),
        (MomentumHorizon::Medium, metrics.momentum.medium, config.rsi_weights.medium),
        (MomentumHorizon::Long, metrics.momentum.long, config.rsi_weights.long),
    ];
    for (horizon, rsi, weight) in horizons {
        if rsi >= config.rsi_bullish {
            score += weight;
            reasons.insert(if rsi >= config.rsi_overbought {
                TrendReason::RsiOverbought { horizon }
            } else {
                TrendReason::RsiBullish { horizon }
            });
        } else if rsi <= config.rsi_bearish {
            score -= weight;
            reasons.insert(if rsi <= config.rsi_oversold {
                TrendReason::RsiOversold { horizon }
            } else {
                TrendReason::RsiBearish { horizon }
            });
        }
    }

    match metrics.volume_profile.trend {
        VolumeTrend::Increasing => {
            score += config.volume_weight;
            reasons.insert(TrendReason::IncreasingVolume);
        }
        VolumeTrend::Decreasing => {
            score -= config.volume_weight;
            reasons.insert(TrendReason::DecreasingVolume);
        }
        VolumeTrend::Stable => {}
    }

    let change = metrics.price_change_pct;
    if change.abs() >= timeframe.price_change_threshold {
        let magnitude = (change.abs() / timeframe.price_change_threshold).min(config.price_weight_cap);
        if change > 0.0 {
            score += magnitude;
            reasons.insert(TrendReason::PriceIncrease);
        } else {
            score -= magnitude;
            reasons.insert(TrendReason::PriceDecrease);
        }
    }

    if let Some((reason, direction)) = detect_pattern(candles) {
        match direction {
            TrendClass::Bullish => score += config.pattern_bonus,
            TrendClass::Bearish => score -= config.pattern_bonus,
            TrendClass::Neutral => {}
        }
        reasons.insert(reason);
    }

    if metrics.drawdown_pct > timeframe.max_drawdown {
        score -= config.drawdown_penalty;
        reasons.insert(TrendReason::ExcessiveDrawdown);
    }

    // Pulls the score toward zero from either side, never across it.
    if metrics.volatility_pct > timeframe.volatility_threshold {
        reasons.insert(TrendReason::HighVolatility);
        if score > 0.0 {
            score = (score - config.volatility_penalty).max(0.0);
        } else if score < 0.0 {
            score = (score + config.volatility_penalty).min(0.0);
        }
    }

    TimeframeScore { score, reasons }
}

pub fn classify(score: f64, config: &SignalConfig) -> TrendClass {
    if score >= config.bullish_score {
        TrendClass::Bullish
    } else if score <= config.bearish_score {
        TrendClass::Bearish
    } else {
        TrendClass::Neutral
    }
}

/// Scores the window without checking how much history it covers.
pub fn build_timeframe_signal(
    metrics: &MarketMetrics,
    candles: &[Candle],
    timeframe: &TimeframeConfig,
    config: &SignalConfig,
) -> TimeframeSignal {
    let TimeframeScore { score, reasons } = score_timeframe(metrics, candles, timeframe, config);
    let last = candles.last();

    TimeframeSignal {
        timeframe: timeframe.interval,
        strength: metrics.price_change_pct.abs(),
        score,
        confirmed_at: metrics.last_update,
        price_at_signal: last.map(|c| c.close).unwrap_or_default(),
        trend: TrendAssessment {
            classification: classify(score, config),
            reasons,
        },
        volume: last.map(|c| c.volume).unwrap_or_default(),
        price_change_pct: metrics.price_change_pct,
    }
}

/// Like `build_timeframe_signal`, but refuses windows shorter than `required_history`.
/// Such timeframes are left out of aggregation rather than counted as neutral.
pub fn detect_timeframe_signal(
    metrics: &MarketMetrics,
    candles: &[Candle],
    timeframe: &TimeframeConfig,
    config: &SignalConfig,
    required_history: usize,
) -> Result<TimeframeSignal> {
    if candles.len() < required_history {
        return Err(EngineError::InsufficientHistory {
            have: candles.len(),
            need: required_history,
        });
    }
    Ok(build_timeframe_signal(metrics, candles, timeframe, config))
}

/// Rolls the symbol's scored timeframes into one `MarketSignal`.
/// Returns `None` when no configured timeframe has a signal yet.
pub fn aggregate(
    state: &MarketState,
    timeframes: &[TimeframeConfig],
    config: &SignalConfig,
) -> Option<MarketSignal> {
    let included: Vec<(&TimeframeConfig, &TimeframeSignal)> = timeframes
        .iter()
        .filter_map(|tf| state.timeframe_signals.get(&tf.interval).map(|s| (tf, s)))
        .collect();

    if included.is_empty() {
        return None;
    }

    let mut bullish = 0usize;
    let mut bearish = 0usize;
    let mut overall_strength = 0.0;
    for (_, signal) in &included {
        match signal.trend.classification {
            TrendClass::Bullish => {
                bullish += 1;
                overall_strength += signal.strength;
            }
            TrendClass::Bearish => {
                bearish += 1;
                overall_strength -= signal.strength;
            }
            TrendClass::Neutral => {}
        }
    }

    let (overall_trend, majority) = if bullish > bearish {
        (TrendClass::Bullish, bullish)
    } else if bearish > bullish {
        (TrendClass::Bearish, bearish)
    } else {
        (TrendClass::Neutral, bullish)
    };

    let directional = bullish + bearish;
    let trend_consistency = if directional == 0 {
        0.0
    } else {
        majority as f64 / directional as f64
    };

    let is_valid = overall_trend != TrendClass::Neutral
        && majority >= config.min_confirmations
        && trend_consistency > 0.5;

    let volatility_ratios: Vec<f64> = included
        .iter()
        .filter_map(|(tf, _)| {
            state
                .metrics
                .get(&tf.interval)
                .map(|m| m.volatility_pct / tf.volatility_threshold)
        })
        .collect();
    let avg_ratio = crate::utils::mean(&volatility_ratios);

    Some(MarketSignal {
        symbol: state.symbol.clone(),
        timestamp: included
            .iter()
            .map(|(_, s)| s.confirmed_at)
            .max()
            .unwrap_or_default(),
        signals: included.iter().map(|(_, s)| (*s).clone()).collect(),
        overall_strength,
        is_valid,
        volatility_profile: volatility_profile(avg_ratio, config),
        trend_consistency,
        overall_trend,
    })
}

pub fn volatility_profile(ratio: f64, config: &SignalConfig) -> VolatilityProfile {
    let [medium, high, extreme] = config.volatility_buckets;
    if ratio >= extreme {
        VolatilityProfile::Extreme
    } else if ratio >= high {
        VolatilityProfile::High
    } else if ratio >= medium {
        VolatilityProfile::Medium
    } else {
        VolatilityProfile::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::metrics::compute_metrics;
    use crate::analysis::metrics::tests::{flat_series, rising_series, tf_5m};
    use crate::config::{DEFAULT_TIMEFRAMES, Interval, METRICS, SIGNAL};

    fn signal_with(interval: Interval, class: TrendClass, strength: f64, at: i64) -> TimeframeSignal {
        TimeframeSignal {
            timeframe: interval,
            strength,
            score: 0.0,
            confirmed_at: at,
            price_at_signal: 100.0,
            trend: TrendAssessment {
                classification: class,
                reasons: BTreeSet::new(),
            },
            volume: 1.0,
            price_change_pct: strength,
        }
    }

    fn state_with(signals: &[TimeframeSignal]) -> MarketState {
        let mut state = MarketState::new("BTCUSDT");
        let metrics = compute_metrics(&flat_series(60), &tf_5m(), &METRICS);
        for s in signals {
            state.metrics.insert(s.timeframe, metrics);
            state.timeframe_signals.insert(s.timeframe, s.clone());
        }
        state
    }

    #[test]
    fn flat_series_is_neutral() {
        let candles = flat_series(60);
        let metrics = compute_metrics(&candles, &tf_5m(), &METRICS);
        let signal = build_timeframe_signal(&metrics, &candles, &tf_5m(), &SIGNAL);
        assert_eq!(signal.price_change_pct, 0.0);
        assert_eq!(signal.trend.classification, TrendClass::Neutral);
        assert!(signal.trend.reasons.is_empty());
    }

    #[test]
    fn steadily_rising_series_is_bullish() {
        let candles = rising_series(20, 0.5);
        let metrics = compute_metrics(&candles, &tf_5m(), &METRICS);
        assert!(metrics.momentum.short > 60.0);
        assert!(metrics.momentum.medium > 60.0);
        assert!(metrics.price_change_pct > tf_5m().price_change_threshold);

        let signal = build_timeframe_signal(&metrics, &candles, &tf_5m(), &SIGNAL);
        assert_eq!(signal.trend.classification, TrendClass::Bullish);
        assert_eq!(signal.strength, metrics.price_change_pct);
        assert!(signal.trend.reasons.contains(&TrendReason::PriceIncrease));
        assert!(
            signal
                .trend
                .reasons
                .contains(&TrendReason::RsiOverbought {
                    horizon: MomentumHorizon::Short
                })
        );
    }

    #[test]
    fn short_window_is_insufficient_history() {
        let candles = rising_series(20, 0.5);
        let metrics = compute_metrics(&candles, &tf_5m(), &METRICS);
        let err = detect_timeframe_signal(&metrics, &candles, &tf_5m(), &SIGNAL, 51).unwrap_err();
        assert_eq!(err, EngineError::InsufficientHistory { have: 20, need: 51 });

        let candles = rising_series(60, 0.5);
        let metrics = compute_metrics(&candles, &tf_5m(), &METRICS);
        assert!(detect_timeframe_signal(&metrics, &candles, &tf_5m(), &SIGNAL, 51).is_ok());
    }

    #[test]
    fn volatility_penalty_never_flips_the_sign() {
        let candles = rising_series(20, 0.5);
        let mut metrics = compute_metrics(&candles, &tf_5m(), &METRICS);
        metrics.volatility_pct = tf_5m().volatility_threshold * 10.0;
        let config = SignalConfig {
            volatility_penalty: 100.0,
            ..SIGNAL
        };
        let score = score_timeframe(&metrics, &candles, &tf_5m(), &config);
        assert_eq!(score.score, 0.0);
        assert!(score.reasons.contains(&TrendReason::HighVolatility));
    }

    #[test]
    fn aggregation_requires_confirmations_and_consistency() {
        let tfs = DEFAULT_TIMEFRAMES;
        let state = state_with(&[
            signal_with(Interval::M5, TrendClass::Bullish, 2.0, 10),
            signal_with(Interval::H1, TrendClass::Bullish, 3.0, 30),
            signal_with(Interval::H4, TrendClass::Bearish, 1.0, 20),
        ]);
        let s = aggregate(&state, &tfs, &SIGNAL).unwrap();
        assert_eq!(s.overall_trend, TrendClass::Bullish);
        assert!((s.overall_strength - 4.0).abs() < 1e-12);
        assert!((s.trend_consistency - 2.0 / 3.0).abs() < 1e-12);
        assert!(s.is_valid);
        assert_eq!(s.timestamp, 30);
        assert_eq!(s.signals.len(), 3);

        let single = state_with(&[
            signal_with(Interval::M5, TrendClass::Bullish, 2.0, 10),
            signal_with(Interval::H1, TrendClass::Neutral, 0.1, 10),
        ]);
        let s = aggregate(&single, &tfs, &SIGNAL).unwrap();
        assert_eq!(s.overall_trend, TrendClass::Bullish);
        assert!(!s.is_valid, "one confirming timeframe is below the minimum");

        let split = state_with(&[
            signal_with(Interval::M5, TrendClass::Bullish, 2.0, 10),
            signal_with(Interval::H1, TrendClass::Bullish, 2.0, 10),
            signal_with(Interval::H4, TrendClass::Bearish, 2.0, 10),
            signal_with(Interval::D1, TrendClass::Bearish, 2.0, 10),
        ]);
        let s = aggregate(&split, &tfs, &SIGNAL).unwrap();
        assert_eq!(s.overall_trend, TrendClass::Neutral);
        assert!(!s.is_valid);
    }

    #[test]
    fn timeframes_without_signals_are_excluded() {
        let mut state = state_with(&[signal_with(Interval::M5, TrendClass::Bullish, 2.0, 10)]);
        // metrics present but no signal: insufficient history
        let metrics = compute_metrics(&flat_series(10), &tf_5m(), &METRICS);
        state.metrics.insert(Interval::H1, metrics);
        let s = aggregate(&state, &DEFAULT_TIMEFRAMES, &SIGNAL).unwrap();
        assert_eq!(s.signals.len(), 1);
        assert_eq!(s.trend_consistency, 1.0);

        assert!(aggregate(&MarketState::new("ETHUSDT"), &DEFAULT_TIMEFRAMES, &SIGNAL).is_none());
    }

    #[test]
    fn aggregation_is_idempotent() {
        let state = state_with(&[
            signal_with(Interval::M5, TrendClass::Bearish, 2.0, 10),
            signal_with(Interval::H1, TrendClass::Bearish, 3.0, 30),
        ]);
        let first = aggregate(&state, &DEFAULT_TIMEFRAMES, &SIGNAL);
        let second = aggregate(&state, &DEFAULT_TIMEFRAMES, &SIGNAL);
        assert_eq!(first, second);
    }

    #[test]
    fn volatility_profile_buckets_are_monotonic() {
        let ratios = [0.0, 0.49, 0.5, 0.99, 1.0, 1.99, 2.0, 50.0];
        let profiles: Vec<VolatilityProfile> =
            ratios.iter().map(|r| volatility_profile(*r, &SIGNAL)).collect();
        assert!(profiles.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(profiles[0], VolatilityProfile::Low);
        assert_eq!(profiles[7], VolatilityProfile::Extreme);
    }
}

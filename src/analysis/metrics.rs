//! Indicator maths. Everything here is a pure function of a candle window.

use itertools::Itertools;

use crate::config::{MetricsConfig, MomentumPeriods, TimeframeConfig};
use crate::domain::{Candle, SymbolInterval};
use crate::error::{EngineError, Result};
use crate::models::{MarketMetrics, Momentum, VolumeProfile, VolumeTrend};
use crate::utils::{mean, mean_and_sample_stddev, percent_change};

/// Recomputes every metric for the window. Callers should run `validate_window` first.
pub fn compute_metrics(
    candles: &[Candle],
    timeframe: &TimeframeConfig,
    config: &MetricsConfig,
) -> MarketMetrics {
    MarketMetrics {
        price_change_pct: price_change_pct(candles),
        volatility_pct: volatility_pct(candles, timeframe),
        drawdown_pct: drawdown_pct(candles),
        momentum: momentum(candles, &config.momentum),
        volume_profile: volume_profile(candles, timeframe, config),
        last_update: candles.last().map(|c| c.timestamp_ms).unwrap_or_default(),
    }
}

/// Rejects windows the indicators cannot be trusted on: empty, unordered,
/// duplicated timestamps, or non-finite / non-positive prices.
pub fn validate_window(pair: &SymbolInterval, candles: &[Candle]) -> Result<()> {
    let malformed = |reason: String| EngineError::MalformedData {
        symbol: pair.symbol.clone(),
        interval: Some(pair.interval),
        reason,
    };

    if candles.is_empty() {
        return Err(malformed("empty candle window".to_string()));
    }
    if let Some((idx, _)) = candles.iter().find_position(|c| !c.is_well_formed()) {
        return Err(malformed(format!("candle {} has invalid prices or volume", idx)));
    }
    if let Some((a, b)) = candles
        .iter()
        .tuple_windows()
        .find(|(a, b)| a.timestamp_ms >= b.timestamp_ms)
    {
        return Err(malformed(format!(
            "timestamps not strictly ascending ({} then {})",
            a.timestamp_ms, b.timestamp_ms
        )));
    }
    Ok(())
}

/// (last close - first close) / first close, in %. Needs two candles.
pub fn price_change_pct(candles: &[Candle]) -> f64 {
    match (candles.first(), candles.last()) {
        (Some(first), Some(last)) if candles.len() >= 2 => percent_change(first.close, last.close),
        _ => 0.0,
    }
}

/// Annualised sample volatility of log returns, scaled by the timeframe multiplier, in %.
pub fn volatility_pct(candles: &[Candle], timeframe: &TimeframeConfig) -> f64 {
    let returns: Vec<f64> = candles
        .iter()
        .tuple_windows()
        // A zero close would divide by zero (or take ln(0)); skip that return.
        .filter(|(a, b)| a.close > 0.0 && b.close > 0.0)
        .map(|(a, b)| (b.close / a.close).ln())
        .filter(|r| r.is_finite())
        .collect();

    if returns.len() < 2 {
        return 0.0;
    }

    let (_, stddev) = mean_and_sample_stddev(&returns);
    stddev * timeframe.interval.periods_per_year().sqrt() * timeframe.volatility_multiplier * 100.0
}

/// Largest decline from the running peak of `high` to a subsequent `low`, in %.
pub fn drawdown_pct(candles: &[Candle]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for candle in candles {
        // Peak only ever rises within a window.
        peak = peak.max(candle.high);
        if peak > 0.0 {
            worst = worst.max((peak - candle.low) / peak * 100.0);
        }
    }
    worst
}

/// RSI over the last `period` close-to-close deltas (fewer if the window is shorter),
/// using simple averages of gains and losses.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if closes.len() < 2 || period == 0 {
        return 50.0;
    }
    let deltas = period.min(closes.len() - 1);
    let window = &closes[closes.len() - deltas - 1..];

    let (gains, losses) = window
        .iter()
        .tuple_windows()
        .map(|(a, b)| b - a)
        .fold((0.0, 0.0), |(g, l), d| {
            if d > 0.0 { (g + d, l) } else { (g, l - d) }
        });

    let avg_gain = gains / deltas as f64;
    let avg_loss = losses / deltas as f64;

    let value = if avg_loss <= 0.0 {
        // No movement at all is neither overbought nor oversold.
        if avg_gain <= 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };

    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        50.0
    }
}

pub fn momentum(candles: &[Candle], periods: &MomentumPeriods) -> Momentum {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    Momentum {
        short: rsi(&closes, periods.short),
        medium: rsi(&closes, periods.medium),
        long: rsi(&closes, periods.long),
    }
}

/// Average volume of the last `volume_window` candles against the window before it.
/// The change threshold scales with the timeframe's volatility multiplier.
pub fn volume_profile(
    candles: &[Candle],
    timeframe: &TimeframeConfig,
    config: &MetricsConfig,
) -> VolumeProfile {
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let window = config.volume_window.max(1);

    let recent_start = volumes.len().saturating_sub(window);
    let recent = &volumes[recent_start..];
    let prior = &volumes[recent_start.saturating_sub(window)..recent_start];

    let value = mean(recent);
    if prior.is_empty() {
        return VolumeProfile {
            value,
            change_pct: 0.0,
            trend: VolumeTrend::Stable,
        };
    }

    let change_pct = percent_change(mean(prior), value);
    let threshold = config.volume_change_pct * timeframe.volatility_multiplier;
    let trend = if change_pct >= threshold {
        VolumeTrend::Increasing
    } else if change_pct <= -threshold {
        VolumeTrend::Decreasing
    } else {
        VolumeTrend::Stable
    };

    VolumeProfile {
        value,
        change_pct,
        trend,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{DEFAULT_TIMEFRAMES, Interval, METRICS};

    pub(crate) fn tf_5m() -> TimeframeConfig {
        DEFAULT_TIMEFRAMES[0]
    }

    pub(crate) fn candle_at(i: usize, open: f64, close: f64, volume: f64) -> Candle {
        let high = open.max(close) * 1.001;
        let low = open.min(close) * 0.999;
        Candle::new(i as i64 * 300_000, open, high, low, close, volume)
    }

    pub(crate) fn series_from_closes(closes: &[f64], volume: f64) -> Vec<Candle> {
        let mut prev = closes.first().copied().unwrap_or(100.0);
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let candle = candle_at(i, prev, c, volume);
                prev = c;
                candle
            })
            .collect()
    }

    pub(crate) fn rising_series(n: usize, step_pct: f64) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 * (1.0 + step_pct / 100.0).powi(i as i32))
            .collect();
        series_from_closes(&closes, 1_000.0)
    }

    pub(crate) fn flat_series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64 * 300_000, 100.0, 100.0, 100.0, 100.0, 1_000.0))
            .collect()
    }

    /// Deterministic pseudo-random walk (LCG) so the property checks are repeatable.
    fn random_walk(seed: u64, n: usize) -> Vec<Candle> {
        let mut state = seed;
        let mut price = 100.0;
        let mut closes = Vec::with_capacity(n);
        for _ in 0..n {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let r = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
            price = (price * (1.0 + r * 0.08)).max(0.01);
            closes.push(price);
        }
        series_from_closes(&closes, 500.0)
    }

    #[test]
    fn rsi_stays_within_bounds_for_random_walks() {
        for seed in 1..200u64 {
            let candles = random_walk(seed, 5 + (seed as usize % 90));
            let m = momentum(&candles, &METRICS.momentum);
            for v in [m.short, m.medium, m.long] {
                assert!((0.0..=100.0).contains(&v), "seed {} gave rsi {}", seed, v);
            }
        }
    }

    #[test]
    fn rsi_extremes() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0, 4.0], 14), 100.0);
        assert_eq!(rsi(&[4.0, 3.0, 2.0, 1.0], 14), 0.0);
        assert_eq!(rsi(&[5.0; 20], 14), 50.0);
        assert_eq!(rsi(&[5.0], 14), 50.0);
        // two gains of 1, one loss of 1 => rs = 2 => 66.67
        let v = rsi(&[10.0, 11.0, 10.0, 11.0], 3);
        assert!((v - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn flat_series_has_no_change() {
        let candles = flat_series(30);
        let m = compute_metrics(&candles, &tf_5m(), &METRICS);
        assert_eq!(m.price_change_pct, 0.0);
        assert_eq!(m.volatility_pct, 0.0);
        assert_eq!(m.drawdown_pct, 0.0);
        assert_eq!(m.momentum, Momentum::NEUTRAL);
        assert_eq!(m.volume_profile.trend, VolumeTrend::Stable);
    }

    #[test]
    fn price_change_needs_two_candles() {
        assert_eq!(price_change_pct(&flat_series(1)), 0.0);
        assert_eq!(price_change_pct(&[]), 0.0);
        let candles = series_from_closes(&[100.0, 90.0, 110.0], 1.0);
        assert!((price_change_pct(&candles) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_is_non_negative_and_tracks_running_peak() {
        for seed in 1..100u64 {
            assert!(drawdown_pct(&random_walk(seed, 40)) >= 0.0);
        }

        // Peak of 120 is set at index 1; everything after stays below it.
        let c = |t: i64, high: f64, low: f64| Candle::new(t, low, high, low, low, 1.0);
        let original = vec![c(0, 100.0, 95.0), c(1, 120.0, 110.0), c(2, 115.0, 90.0), c(3, 112.0, 108.0)];
        // Swapping the last two keeps the running-peak sequence (100, 120, 120, 120).
        let swapped = vec![original[0], original[1], original[3], original[2]];
        assert!((drawdown_pct(&original) - 25.0).abs() < 1e-9);
        assert_eq!(drawdown_pct(&original), drawdown_pct(&swapped));
    }

    #[test]
    fn volatility_skips_zero_closes() {
        let mut candles = rising_series(10, 1.0);
        candles[4].close = 0.0;
        let v = volatility_pct(&candles, &tf_5m());
        assert!(v.is_finite());
        assert!(v >= 0.0);
    }

    #[test]
    fn volatility_is_annualised_and_scaled() {
        let candles = series_from_closes(&[100.0, 101.0, 100.0, 101.0, 100.0], 1.0);
        let daily = TimeframeConfig {
            interval: Interval::D1,
            volatility_multiplier: 2.0,
            ..DEFAULT_TIMEFRAMES[3]
        };
        let returns: Vec<f64> = [(101.0f64 / 100.0).ln(), (100.0f64 / 101.0).ln()]
            .iter()
            .cycle()
            .take(4)
            .copied()
            .collect();
        let (_, sd) = mean_and_sample_stddev(&returns);
        let expected = sd * 365f64.sqrt() * 2.0 * 100.0;
        assert!((volatility_pct(&candles, &daily) - expected).abs() < 1e-9);
    }

    #[test]
    fn volume_profile_classifies_trend() {
        let mut candles = flat_series(10);
        for c in candles.iter_mut().skip(5) {
            c.volume = 2_000.0;
        }
        let p = volume_profile(&candles, &tf_5m(), &METRICS);
        assert_eq!(p.trend, VolumeTrend::Increasing);
        assert!((p.change_pct - 100.0).abs() < 1e-9);
        assert_eq!(p.value, 2_000.0);

        for c in candles.iter_mut().skip(5) {
            c.volume = 500.0;
        }
        assert_eq!(volume_profile(&candles, &tf_5m(), &METRICS).trend, VolumeTrend::Decreasing);
    }

    #[test]
    fn malformed_windows_are_rejected() {
        let pair = SymbolInterval::new("BTCUSDT", Interval::M5);
        assert!(validate_window(&pair, &[]).is_err());

        let mut candles = rising_series(5, 1.0);
        validate_window(&pair, &candles).unwrap();

        candles[2].timestamp_ms = candles[1].timestamp_ms;
        assert!(matches!(
            validate_window(&pair, &candles),
            Err(EngineError::MalformedData { .. })
        ));

        let mut candles = rising_series(5, 1.0);
        candles[3].close = f64::NAN;
        assert!(validate_window(&pair, &candles).is_err());
    }
}

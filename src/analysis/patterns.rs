//! Candlestick patterns over the last two or three candles.

use crate::domain::{Candle, CandleType};
use crate::models::{TrendClass, TrendReason};

/// Middle candle of a star must have a body smaller than this share of the first body.
const STAR_BODY_RATIO: f64 = 0.3;

/// Returns the most recent pattern found, if any, with the direction it points to.
/// Three-candle stars take precedence over two-candle engulfing.
pub fn detect_pattern(candles: &[Candle]) -> Option<(TrendReason, TrendClass)> {
    if let [.., first, middle, last] = candles {
        if let Some(found) = star(first, middle, last) {
            return Some(found);
        }
    }
    if let [.., prev, last] = candles {
        return engulfing(prev, last);
    }
    None
}

fn engulfing(prev: &Candle, last: &Candle) -> Option<(TrendReason, TrendClass)> {
    if last.body_size() <= prev.body_size() {
        return None;
    }
    match (prev.get_type(), last.get_type()) {
        (CandleType::Bearish, CandleType::Bullish)
            if last.open <= prev.close && last.close >= prev.open =>
        {
            Some((TrendReason::BullishEngulfing, TrendClass::Bullish))
        }
        (CandleType::Bullish, CandleType::Bearish)
            if last.open >= prev.close && last.close <= prev.open =>
        {
            Some((TrendReason::BearishEngulfing, TrendClass::Bearish))
        }
        _ => None,
    }
}

fn star(first: &Candle, middle: &Candle, last: &Candle) -> Option<(TrendReason, TrendClass)> {
    let first_body = first.body_size();
    if first_body <= f64::EPSILON || middle.body_size() >= first_body * STAR_BODY_RATIO {
        return None;
    }
    match (first.get_type(), last.get_type()) {
        (CandleType::Bearish, CandleType::Bullish)
            if middle.body_range().1 <= first.close && last.close > first.body_mid() =>
        {
            Some((TrendReason::MorningStar, TrendClass::Bullish))
        }
        (CandleType::Bullish, CandleType::Bearish)
            if middle.body_range().0 >= first.close && last.close < first.body_mid() =>
        {
            Some((TrendReason::EveningStar, TrendClass::Bearish))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(open: f64, close: f64) -> Candle {
        Candle::new(0, open, open.max(close) + 0.5, open.min(close) - 0.5, close, 1.0)
    }

    #[test]
    fn bullish_engulfing() {
        let candles = [c(105.0, 102.0), c(101.5, 106.0)];
        assert_eq!(
            detect_pattern(&candles),
            Some((TrendReason::BullishEngulfing, TrendClass::Bullish))
        );
    }

    #[test]
    fn bearish_engulfing() {
        let candles = [c(100.0, 103.0), c(103.5, 99.0)];
        assert_eq!(
            detect_pattern(&candles),
            Some((TrendReason::BearishEngulfing, TrendClass::Bearish))
        );
    }

    #[test]
    fn morning_and_evening_star() {
        let morning = [c(110.0, 100.0), c(99.5, 99.0), c(100.0, 108.0)];
        assert_eq!(
            detect_pattern(&morning),
            Some((TrendReason::MorningStar, TrendClass::Bullish))
        );

        let evening = [c(100.0, 110.0), c(110.5, 111.0), c(110.0, 102.0)];
        assert_eq!(
            detect_pattern(&evening),
            Some((TrendReason::EveningStar, TrendClass::Bearish))
        );
    }

    #[test]
    fn steady_trend_has_no_pattern() {
        let candles = [c(100.0, 101.0), c(101.0, 102.0), c(102.0, 103.0)];
        assert_eq!(detect_pattern(&candles), None);
        assert_eq!(detect_pattern(&candles[..1]), None);
    }
}

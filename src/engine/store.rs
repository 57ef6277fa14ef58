use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::Interval;
use crate::domain::{Tick, Ticker};
use crate::models::{MarketMetrics, MarketSignal, MarketState, TimeframeSignal};

/// Result of one scheduler cycle, written to the store in a single swap.
#[derive(Debug, Clone)]
pub struct TimeframeUpdate {
    pub interval: Interval,
    pub metrics: MarketMetrics,
    /// `None` when the window was too short to score; clears any older signal.
    pub signal: Option<TimeframeSignal>,
    pub last_close: f64,
}

/// Symbol-keyed map of `Arc<MarketState>`.
///
/// Writers clone the current state, modify the clone and swap the pointer, so a
/// reader holding an `Arc` never sees a half-applied update. Writes to symbols
/// that are not registered are dropped.
#[derive(Debug, Clone, Default)]
pub struct MarketStateStore {
    inner: Arc<RwLock<HashMap<String, Arc<MarketState>>>>,
}

impl MarketStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, symbol: &str) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(symbol.to_string())
            .or_insert_with(|| Arc::new(MarketState::new(symbol)));
    }

    pub fn remove(&self, symbol: &str) -> Option<Arc<MarketState>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<MarketState>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    /// Every state, sorted by symbol.
    pub fn all(&self) -> Vec<Arc<MarketState>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<_> = map.values().cloned().collect();
        states.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        states
    }

    fn update<F>(&self, symbol: &str, f: F) -> Option<Arc<MarketState>>
    where
        F: FnOnce(&mut MarketState),
    {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let slot = map.get_mut(symbol)?;
        let mut next = MarketState::clone(slot);
        f(&mut next);
        *slot = Arc::new(next);
        Some(slot.clone())
    }

    /// Applies a flushed tick batch. Ticks older than the last one applied are ignored.
    pub fn apply_ticks<I>(&self, ticks: I) -> usize
    where
        I: IntoIterator<Item = Tick>,
    {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut applied = 0;
        for tick in ticks {
            let Some(slot) = map.get_mut(&tick.symbol) else {
                continue;
            };
            if slot.last_tick_ms.is_some_and(|last| tick.event_time_ms < last) {
                continue;
            }
            let mut next = MarketState::clone(slot);
            next.price = tick.price;
            next.volume = tick.volume;
            next.last_tick_ms = Some(tick.event_time_ms);
            *slot = Arc::new(next);
            applied += 1;
        }
        applied
    }

    /// Stores a 24h snapshot. Seeds price/volume only if no live tick has landed yet.
    pub fn apply_ticker(&self, symbol: &str, ticker: Ticker) -> Option<Arc<MarketState>> {
        self.update(symbol, |state| {
            state.ticker = Some(ticker);
            if state.last_tick_ms.is_none() {
                state.price = ticker.last_price;
                state.volume = ticker.quote_volume;
            }
        })
    }

    pub fn apply_timeframe(&self, symbol: &str, update: TimeframeUpdate) -> Option<Arc<MarketState>> {
        self.update(symbol, |state| {
            state.metrics.insert(update.interval, update.metrics);
            match update.signal {
                Some(signal) => {
                    state.timeframe_signals.insert(update.interval, signal);
                }
                None => {
                    state.timeframe_signals.remove(&update.interval);
                }
            }
            // Without a live feed the latest close is the best price we have.
            if state.last_tick_ms.is_none() && state.ticker.is_none() {
                state.price = update.last_close;
            }
        })
    }

    pub fn set_latest_signal(&self, symbol: &str, signal: MarketSignal) -> Option<Arc<MarketState>> {
        self.update(symbol, |state| state.latest_signal = Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Momentum, VolumeProfile, VolumeTrend};

    fn tick(symbol: &str, price: f64, t: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            volume: 10.0,
            event_time_ms: t,
        }
    }

    fn metrics(change: f64) -> MarketMetrics {
        MarketMetrics {
            price_change_pct: change,
            volatility_pct: 0.0,
            drawdown_pct: 0.0,
            momentum: Momentum::NEUTRAL,
            volume_profile: VolumeProfile {
                value: 0.0,
                change_pct: 0.0,
                trend: VolumeTrend::Stable,
            },
            last_update: 0,
        }
    }

    #[test]
    fn ticks_touch_price_only() {
        let store = MarketStateStore::new();
        store.register("BTCUSDT");
        store.apply_timeframe(
            "BTCUSDT",
            TimeframeUpdate {
                interval: Interval::M5,
                metrics: metrics(1.0),
                signal: None,
                last_close: 99.0,
            },
        );
        assert_eq!(store.apply_ticks(vec![tick("BTCUSDT", 101.0, 5), tick("ETHUSDT", 1.0, 5)]), 1);

        let state = store.get("BTCUSDT").unwrap();
        assert_eq!(state.price, 101.0);
        assert_eq!(state.metrics[&Interval::M5].price_change_pct, 1.0);
    }

    #[test]
    fn stale_ticks_are_ignored() {
        let store = MarketStateStore::new();
        store.register("BTCUSDT");
        store.apply_ticks(vec![tick("BTCUSDT", 101.0, 10)]);
        store.apply_ticks(vec![tick("BTCUSDT", 50.0, 9)]);
        assert_eq!(store.get("BTCUSDT").unwrap().price, 101.0);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let store = MarketStateStore::new();
        store.register("BTCUSDT");
        let before = store.get("BTCUSDT").unwrap();
        store.apply_ticks(vec![tick("BTCUSDT", 101.0, 1)]);
        assert_eq!(before.price, 0.0);
        assert_eq!(store.get("BTCUSDT").unwrap().price, 101.0);
    }

    #[test]
    fn ticker_does_not_override_live_price() {
        let store = MarketStateStore::new();
        store.register("BTCUSDT");
        let ticker = Ticker {
            last_price: 90.0,
            quote_volume: 1e6,
            price_change_percent: -1.0,
            high: 95.0,
            low: 89.0,
        };
        store.apply_ticker("BTCUSDT", ticker);
        assert_eq!(store.get("BTCUSDT").unwrap().price, 90.0);

        store.apply_ticks(vec![tick("BTCUSDT", 91.0, 1)]);
        store.apply_ticker("BTCUSDT", ticker);
        let state = store.get("BTCUSDT").unwrap();
        assert_eq!(state.price, 91.0);
        assert_eq!(state.ticker, Some(ticker));
    }

    #[test]
    fn writes_to_removed_symbols_are_dropped() {
        let store = MarketStateStore::new();
        store.register("BTCUSDT");
        store.remove("BTCUSDT");
        assert!(store.set_latest_signal("BTCUSDT", sample_signal()).is_none());
        assert!(store.all().is_empty());
    }

    fn sample_signal() -> MarketSignal {
        use crate::models::{TrendClass, VolatilityProfile};
        MarketSignal {
            symbol: "BTCUSDT".to_string(),
            timestamp: 0,
            signals: Vec::new(),
            overall_strength: 0.0,
            is_valid: false,
            volatility_profile: VolatilityProfile::Low,
            trend_consistency: 0.0,
            overall_trend: TrendClass::Neutral,
        }
    }
}

//! Alert gating and fan-out.
//!
//! Signals and breakouts pass a validity gate, then a per-symbol cooldown, and
//! only then reach subscribers through the injected `AlertBus`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{AlertConfig, DF};
use crate::models::{BreakoutAlert, MarketSignal};

pub const ALERT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast channels for the two alert kinds. Cloning shares the channels.
#[derive(Debug, Clone)]
pub struct AlertBus {
    signals: broadcast::Sender<MarketSignal>,
    breakouts: broadcast::Sender<BreakoutAlert>,
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(ALERT_CHANNEL_CAPACITY)
    }
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let (signals, _) = broadcast::channel(capacity);
        let (breakouts, _) = broadcast::channel(capacity);
        Self { signals, breakouts }
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<MarketSignal> {
        self.signals.subscribe()
    }

    pub fn subscribe_breakouts(&self) -> broadcast::Receiver<BreakoutAlert> {
        self.breakouts.subscribe()
    }

    /// Returns how many subscribers received it. Zero subscribers is not an error.
    fn publish_signal(&self, signal: MarketSignal) -> usize {
        self.signals.send(signal).unwrap_or(0)
    }

    fn publish_breakout(&self, alert: BreakoutAlert) -> usize {
        self.breakouts.send(alert).unwrap_or(0)
    }

    /// Runs `callback` for every published signal until the bus is dropped.
    pub fn on_signal<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(MarketSignal) + Send + 'static,
    {
        spawn_listener(self.subscribe_signals(), "signal", callback)
    }

    pub fn on_breakout<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(BreakoutAlert) + Send + 'static,
    {
        spawn_listener(self.subscribe_breakouts(), "breakout", callback)
    }
}

fn spawn_listener<T, F>(mut rx: broadcast::Receiver<T>, kind: &'static str, callback: F) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(item) => callback(item),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("{} listener lagged, skipped {} alerts", kind, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Forwarded,
    /// Valid, but the symbol alerted less than a cooldown ago.
    Suppressed { remaining_ms: i64 },
    /// Failed the validity gate; the cooldown is untouched.
    Rejected,
}

/// One cooldown clock per symbol, shared by signals and breakouts.
#[derive(Debug)]
pub struct AlertDispatcher {
    config: AlertConfig,
    bus: AlertBus,
    last_alert_ms: Mutex<HashMap<String, i64>>,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig, bus: AlertBus) -> Self {
        Self {
            config,
            bus,
            last_alert_ms: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &AlertBus {
        &self.bus
    }

    /// Checks and stamps the cooldown in one step.
    fn try_stamp(&self, symbol: &str, now_ms: i64) -> DispatchOutcome {
        let mut map = self
            .last_alert_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = map.get(symbol) {
            let elapsed = now_ms - last;
            if elapsed < self.config.cooldown_ms {
                return DispatchOutcome::Suppressed {
                    remaining_ms: self.config.cooldown_ms - elapsed,
                };
            }
        }
        map.insert(symbol.to_string(), now_ms);
        DispatchOutcome::Forwarded
    }

    pub fn dispatch_signal(&self, signal: &MarketSignal, now_ms: i64) -> DispatchOutcome {
        if !signal.is_valid {
            return DispatchOutcome::Rejected;
        }
        let outcome = self.try_stamp(&signal.symbol, now_ms);
        match outcome {
            DispatchOutcome::Forwarded => {
                let receivers = self.bus.publish_signal(signal.clone());
                log::info!(
                    "📣 {} {} signal (strength {:.2}, consistency {:.0}%) -> {} subscribers",
                    signal.symbol,
                    signal.overall_trend,
                    signal.overall_strength,
                    signal.trend_consistency * 100.0,
                    receivers
                );
            }
            DispatchOutcome::Suppressed { remaining_ms } if DF.log_suppressed_alerts => {
                log::info!(
                    "{} signal suppressed, cooldown {}s left",
                    signal.symbol,
                    remaining_ms / 1000
                );
            }
            _ => {}
        }
        outcome
    }

    pub fn dispatch_breakout(&self, alert: &BreakoutAlert, now_ms: i64) -> DispatchOutcome {
        if alert.breakout_type < self.config.min_breakout {
            return DispatchOutcome::Rejected;
        }
        let outcome = self.try_stamp(&alert.symbol, now_ms);
        match outcome {
            DispatchOutcome::Forwarded => {
                let receivers = self.bus.publish_breakout(alert.clone());
                log::info!(
                    "🚀 {} {} {} breakout on {} ({:+.2}%) -> {} subscribers",
                    alert.symbol,
                    alert.direction,
                    alert.breakout_type,
                    alert.timeframe,
                    alert.percentage_move,
                    receivers
                );
            }
            DispatchOutcome::Suppressed { remaining_ms } if DF.log_suppressed_alerts => {
                log::info!(
                    "{} breakout suppressed, cooldown {}s left",
                    alert.symbol,
                    remaining_ms / 1000
                );
            }
            _ => {}
        }
        outcome
    }
}

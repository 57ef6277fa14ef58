use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::data::{CandleSource, GlobalRateLimiter, TickIngestor};
use crate::error::Result;
use crate::models::{BreakoutAlert, MarketSignal, MarketState};

use super::alerts::{AlertBus, AlertDispatcher};
use super::scheduler::{self, SchedulerContext, SymbolTasks};
use super::status::{EngineStatus, StreamStatus};
use super::store::MarketStateStore;

pub struct MarketEngine {
    config: Arc<EngineConfig>,
    store: MarketStateStore,
    bus: AlertBus,
    limiter: GlobalRateLimiter,

    /// Running scheduler tasks, keyed by symbol.
    symbols: Mutex<HashMap<String, SymbolTasks>>,

    stream_status: watch::Receiver<StreamStatus>,
    stream_cancel: watch::Sender<bool>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
}

impl MarketEngine {
    /// Validates the config, then spawns the polling tasks and, if enabled, the
    /// tick stream. Must be called from inside a Tokio runtime.
    pub fn start(config: EngineConfig, source: Arc<dyn CandleSource>) -> Result<Self> {
        let mut config = config;
        config.normalise();
        config.validate()?;
        let config = Arc::new(config);

        let store = MarketStateStore::new();
        for symbol in &config.symbols {
            store.register(symbol);
        }

        let bus = AlertBus::default();
        let limiter = GlobalRateLimiter::new(
            config.scheduler.weight_limit,
            Duration::from_millis(config.scheduler.limiter_window_ms),
        );
        let dispatcher = Arc::new(AlertDispatcher::new(config.alerts.clone(), bus.clone()));
        let ctx = SchedulerContext::new(
            config.clone(),
            source.clone(),
            store.clone(),
            limiter.clone(),
            dispatcher,
        );

        let symbols = config
            .symbols
            .iter()
            .map(|symbol| (symbol.clone(), scheduler::spawn_symbol(&ctx, symbol)))
            .collect();

        let initial = if config.stream.enabled {
            StreamStatus::Connecting
        } else {
            StreamStatus::Disabled
        };
        let (status_tx, stream_status) = watch::channel(initial);
        let (stream_cancel, cancel_rx) = watch::channel(false);

        let stream_task = config.stream.enabled.then(|| {
            let ingestor = TickIngestor::new(
                config.symbols.clone(),
                config.stream.clone(),
                store.clone(),
                source,
                limiter.clone(),
                status_tx,
            );
            tokio::spawn(async move {
                if let Err(e) = ingestor.run(cancel_rx).await {
                    log::error!("Tick stream stopped: {}", e);
                }
            })
        });

        log::info!(
            "Market engine started: {} symbols x {} timeframes, stream {}",
            config.symbols.len(),
            config.timeframes.len(),
            if config.stream.enabled { "on" } else { "off" }
        );

        Ok(Self {
            config,
            store,
            bus,
            limiter,
            symbols: Mutex::new(symbols),
            stream_status,
            stream_cancel,
            stream_task: Mutex::new(stream_task),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Latest snapshot for a symbol. The returned state never changes underneath the caller.
    pub fn get_market_state(&self, symbol: &str) -> Option<Arc<MarketState>> {
        self.store.get(&symbol.to_uppercase())
    }

    pub fn market_states(&self) -> Vec<Arc<MarketState>> {
        self.store.all()
    }

    pub fn on_signal<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(MarketSignal) + Send + 'static,
    {
        self.bus.on_signal(callback)
    }

    pub fn on_breakout<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(BreakoutAlert) + Send + 'static,
    {
        self.bus.on_breakout(callback)
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<MarketSignal> {
        self.bus.subscribe_signals()
    }

    pub fn subscribe_breakouts(&self) -> broadcast::Receiver<BreakoutAlert> {
        self.bus.subscribe_breakouts()
    }

    pub fn stream_status(&self) -> watch::Receiver<StreamStatus> {
        self.stream_status.clone()
    }

    pub async fn status(&self) -> EngineStatus {
        let (used_weight, weight_limit) = self.limiter.used_weight().await;
        let mut symbols: Vec<String> = self
            .symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        symbols.sort();
        EngineStatus {
            stream: *self.stream_status.borrow(),
            rate_limit_exhausted_for: self.limiter.exhausted_for().await,
            used_weight,
            weight_limit,
            symbols,
        }
    }

    /// Stops polling a symbol and drops its state. Returns false if it was not monitored.
    /// The tick stream keeps its subscription; ticks for the symbol are ignored.
    pub async fn stop_symbol(&self, symbol: &str) -> bool {
        let symbol = symbol.to_uppercase();
        let tasks = self
            .symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&symbol);
        let Some(tasks) = tasks else {
            return false;
        };
        tasks.stop().await;
        self.store.remove(&symbol);
        log::info!("Stopped monitoring {}", symbol);
        true
    }

    /// Cancels every task and waits for them to finish.
    pub async fn shutdown(&self) {
        let all: Vec<(String, SymbolTasks)> = self
            .symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, tasks) in &all {
            tasks.cancel();
        }
        for (_, tasks) in all {
            tasks.stop().await;
        }

        self.stream_cancel.send_replace(true);
        let stream_task = self
            .stream_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = stream_task {
            if let Err(e) = task.await {
                log::error!("Tick stream task ended abnormally: {}", e);
            }
        }
        log::info!("Market engine shut down");
    }
}

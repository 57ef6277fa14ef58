//! Polling tasks, one per (symbol, timeframe), and a per-symbol aggregator.
//!
//! Each cycle: limiter -> fetch -> metrics -> store -> timeframe signal -> report.
//! Failed cycles report too. The aggregator waits until every timeframe of its
//! symbol has attempted once, then re-aggregates on each report and runs
//! breakout detection on the reporting window.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::analysis::{
    BreakoutDetector, aggregate, compute_metrics, detect_timeframe_signal, validate_window,
};
use crate::config::{BINANCE, DF, EngineConfig, Interval, SchedulerConfig, TimeframeConfig};
use crate::data::{CandleSource, GlobalRateLimiter};
use crate::domain::{Candle, SymbolInterval};
use crate::engine::alerts::AlertDispatcher;
use crate::engine::store::{MarketStateStore, TimeframeUpdate};
use crate::error::{EngineError, Result};
use crate::models::{MarketMetrics, TrendClass};
use crate::trace_time;
use crate::utils::now_timestamp_ms;

/// Half a candle, but never faster than the configured floor.
pub fn poll_period(interval: Interval, config: &SchedulerConfig) -> Duration {
    let half = interval.duration() / 2;
    half.max(Duration::from_millis(config.min_poll_interval_ms))
}

/// What a finished cycle tells the aggregator. `window` is `None` when the cycle failed.
#[derive(Debug, Clone)]
pub(crate) struct CycleReport {
    pub interval: Interval,
    pub window: Option<CycleWindow>,
}

#[derive(Debug, Clone)]
pub(crate) struct CycleWindow {
    pub candles: Arc<Vec<Candle>>,
    pub metrics: MarketMetrics,
}

/// Everything a polling task shares with its siblings.
#[derive(Clone)]
pub(crate) struct SchedulerContext {
    pub config: Arc<EngineConfig>,
    pub source: Arc<dyn CandleSource>,
    pub store: MarketStateStore,
    pub limiter: GlobalRateLimiter,
    pub fetch_permits: Arc<Semaphore>,
    pub dispatcher: Arc<AlertDispatcher>,
}

impl SchedulerContext {
    pub fn new(
        config: Arc<EngineConfig>,
        source: Arc<dyn CandleSource>,
        store: MarketStateStore,
        limiter: GlobalRateLimiter,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(config.scheduler.max_concurrent_fetches));
        Self {
            config,
            source,
            store,
            limiter,
            fetch_permits,
            dispatcher,
        }
    }
}

/// Running tasks of one symbol. Dropping the handle does not stop them; call `cancel`.
pub(crate) struct SymbolTasks {
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SymbolTasks {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancels and waits for every task to reach its exit point.
    pub async fn stop(self) {
        self.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Scheduler task ended abnormally: {}", e);
            }
        }
    }
}

pub(crate) fn spawn_symbol(ctx: &SchedulerContext, symbol: &str) -> SymbolTasks {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (report_tx, report_rx) = mpsc::channel(ctx.config.timeframes.len().max(1) * 4);

    let mut tasks: Vec<JoinHandle<()>> = ctx
        .config
        .timeframes
        .iter()
        .map(|tf| {
            tokio::spawn(run_timeframe(
                ctx.clone(),
                SymbolInterval::new(symbol, tf.interval),
                *tf,
                report_tx.clone(),
                cancel_rx.clone(),
            ))
        })
        .collect();
    drop(report_tx);

    tasks.push(tokio::spawn(run_aggregator(
        ctx.clone(),
        symbol.to_string(),
        report_rx,
        cancel_rx,
    )));

    log::info!(
        "Scheduled {} on {} timeframes",
        symbol,
        ctx.config.timeframes.len()
    );
    SymbolTasks {
        cancel: cancel_tx,
        tasks,
    }
}

async fn run_timeframe(
    ctx: SchedulerContext,
    pair: SymbolInterval,
    timeframe: TimeframeConfig,
    reports: mpsc::Sender<CycleReport>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_period(pair.interval, &ctx.config.scheduler));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }
        if *cancel.borrow() {
            break;
        }

        let fetched = fetch_window(&ctx, &pair).await;
        // The fetch was allowed to finish; its result is not.
        if *cancel.borrow() {
            log::debug!("{} cancelled mid-fetch, discarding window", pair);
            break;
        }

        let window = match fetched.and_then(|candles| process_window(&ctx, &pair, &timeframe, candles)) {
            Ok(window) => Some(window),
            Err(e) => {
                handle_cycle_error(&ctx, &pair, e).await;
                None
            }
        };
        let report = CycleReport {
            interval: pair.interval,
            window,
        };
        if reports.send(report).await.is_err() {
            break;
        }
    }
    log::debug!("{} polling stopped", pair);
}

async fn fetch_window(ctx: &SchedulerContext, pair: &SymbolInterval) -> Result<Vec<Candle>> {
    let _permit = ctx
        .fetch_permits
        .acquire()
        .await
        .map_err(|_| EngineError::Upstream("fetch semaphore closed".to_string()))?;
    ctx.limiter
        .acquire(BINANCE.limits.kline_call_weight, &pair.to_string())
        .await?;
    ctx.source
        .fetch_candles(&pair.symbol, pair.interval, ctx.config.scheduler.candle_limit)
        .await
}

/// Validates, scores and stores one window. A short window still updates metrics
/// but clears the timeframe's signal.
fn process_window(
    ctx: &SchedulerContext,
    pair: &SymbolInterval,
    timeframe: &TimeframeConfig,
    candles: Vec<Candle>,
) -> Result<CycleWindow> {
    validate_window(pair, &candles)?;

    let (metrics, signal) = trace_time!(format!("cycle {}", pair), 2_000, {
        let metrics = compute_metrics(&candles, timeframe, &ctx.config.metrics);
        let signal = match detect_timeframe_signal(
            &metrics,
            &candles,
            timeframe,
            &ctx.config.signal,
            ctx.config.required_history(),
        ) {
            Ok(signal) => Some(signal),
            Err(EngineError::InsufficientHistory { have, need }) => {
                log::debug!("{} has {}/{} candles, not scoring yet", pair, have, need);
                None
            }
            Err(e) => return Err(e),
        };
        (metrics, signal)
    });

    if DF.log_scheduler_cycles {
        log::info!(
            "[cycle] {} chg={:+.2}% vol={:.1}% dd={:.2}% trend={}",
            pair,
            metrics.price_change_pct,
            metrics.volatility_pct,
            metrics.drawdown_pct,
            signal
                .as_ref()
                .map(|s| s.trend.classification.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    let last_close = candles.last().map(|c| c.close).unwrap_or_default();
    ctx.store.apply_timeframe(
        &pair.symbol,
        TimeframeUpdate {
            interval: pair.interval,
            metrics,
            signal,
            last_close,
        },
    );

    Ok(CycleWindow {
        candles: Arc::new(candles),
        metrics,
    })
}

async fn handle_cycle_error(ctx: &SchedulerContext, pair: &SymbolInterval, err: EngineError) {
    match err {
        EngineError::RateLimited {
            context,
            retry_after,
        } => {
            log::warn!("{} rate limited ({}), backing off", pair, context);
            ctx.limiter.penalize(retry_after).await;
        }
        EngineError::RateLimitExhausted { remaining } => {
            log::debug!(
                "{} skipped, limiter exhausted for {:.1}s",
                pair,
                remaining.as_secs_f64()
            );
        }
        EngineError::TransientNetwork(_) | EngineError::MalformedData { .. } => {
            log::warn!("{} cycle skipped: {}", pair, err);
        }
        other => log::error!("{} cycle failed: {}", pair, other),
    }
}

async fn run_aggregator(
    ctx: SchedulerContext,
    symbol: String,
    mut reports: mpsc::Receiver<CycleReport>,
    mut cancel: watch::Receiver<bool>,
) {
    let expected: BTreeSet<Interval> = ctx.config.timeframes.iter().map(|tf| tf.interval).collect();
    let mut reported: BTreeSet<Interval> = BTreeSet::new();
    let mut detector = BreakoutDetector::new(ctx.config.breakout.clone());

    loop {
        let report = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            report = reports.recv() => match report {
                Some(report) => report,
                None => break,
            },
        };
        if *cancel.borrow() {
            break;
        }

        reported.insert(report.interval);
        if reported != expected {
            continue;
        }
        let Some(state) = ctx.store.get(&symbol) else {
            break;
        };

        let now = now_timestamp_ms();
        let signal = aggregate(&state, &ctx.config.timeframes, &ctx.config.signal);
        let trend = signal
            .as_ref()
            .map(|s| s.overall_trend)
            .unwrap_or(TrendClass::Neutral);

        if let Some(signal) = signal {
            if DF.log_aggregation {
                log::info!(
                    "[aggregate] {} {} strength={:.2} consistency={:.2} valid={}",
                    symbol,
                    signal.overall_trend,
                    signal.overall_strength,
                    signal.trend_consistency,
                    signal.is_valid
                );
            }
            ctx.store.set_latest_signal(&symbol, signal.clone());
            ctx.dispatcher.dispatch_signal(&signal, now);
        }

        let Some(window) = report.window else {
            continue;
        };
        if detector.watches(report.interval) {
            if let Some(alert) = detector.detect(
                &symbol,
                report.interval,
                &window.candles,
                trend,
                &window.metrics,
                now,
            ) {
                ctx.dispatcher.dispatch_breakout(&alert, now);
            }
        }
    }
    log::debug!("{} aggregator stopped", symbol);
}

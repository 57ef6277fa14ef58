use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::config::{BINANCE, DF, StreamConfig};
use crate::data::{CandleSource, GlobalRateLimiter};
use crate::domain::Tick;
use crate::engine::{MarketStateStore, StreamStatus};
use crate::error::{EngineError, Result};

/// Combined-stream envelope; the `stream` name is not needed.
#[derive(Debug, Deserialize)]
struct CombinedStream<T> {
    data: T,
}

/// `<symbol>@miniTicker` payload. Numbers arrive as strings.
#[derive(Debug, Deserialize)]
struct MiniTickerEvent {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "q")]
    quote_volume: String,
}

fn build_combined_stream_url(base_url: &str, symbols: &[String]) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|symbol| format!("{}{}", symbol.to_lowercase(), BINANCE.ws.stream_suffix))
        .collect();
    format!("{}{}", base_url, streams.join("/"))
}

pub(crate) fn parse_mini_ticker(text: &str) -> Option<Tick> {
    let event = serde_json::from_str::<CombinedStream<MiniTickerEvent>>(text)
        .map(|w| w.data)
        .or_else(|_| serde_json::from_str::<MiniTickerEvent>(text))
        .ok()?;
    let price = event.close.parse::<f64>().ok().filter(|p| p.is_finite() && *p > 0.0)?;
    let volume = event.quote_volume.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(Tick {
        symbol: event.symbol.to_uppercase(),
        price,
        volume,
        event_time_ms: event.event_time,
    })
}

/// Latest tick per symbol since the last flush.
#[derive(Debug, Default)]
pub(crate) struct TickBatch {
    pending: HashMap<String, Tick>,
}

impl TickBatch {
    pub(crate) fn push(&mut self, tick: Tick) {
        match self.pending.get(&tick.symbol) {
            Some(existing) if existing.event_time_ms > tick.event_time_ms => {}
            _ => {
                self.pending.insert(tick.symbol.clone(), tick);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<Tick> {
        self.pending.drain().map(|(_, tick)| tick).collect()
    }
}

/// Delay before reconnect attempt `attempt` (1-based): doubles from the initial value up to the cap.
pub(crate) fn backoff_delay(config: &StreamConfig, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(
        config
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(config.max_backoff_ms),
    )
}

enum SessionEnd {
    Cancelled,
    Closed { was_connected: bool },
    Failed { was_connected: bool, reason: String },
}

/// Feeds live price/volume into the store from the combined mini-ticker stream.
pub struct TickIngestor {
    symbols: Vec<String>,
    config: StreamConfig,
    store: MarketStateStore,
    source: Arc<dyn CandleSource>,
    limiter: GlobalRateLimiter,
    status_tx: watch::Sender<StreamStatus>,
}

impl TickIngestor {
    pub fn new(
        symbols: Vec<String>,
        config: StreamConfig,
        store: MarketStateStore,
        source: Arc<dyn CandleSource>,
        limiter: GlobalRateLimiter,
        status_tx: watch::Sender<StreamStatus>,
    ) -> Self {
        Self {
            symbols,
            config,
            store,
            source,
            limiter,
            status_tx,
        }
    }

    fn set_status(&self, status: StreamStatus) {
        self.status_tx.send_replace(status);
    }

    /// Seeds every symbol from the 24h ticker. Failures are logged and skipped.
    pub async fn warm_up(&self) {
        if DF.log_price_stream_updates {
            log::info!(">>> PriceStream: Warming up {} symbols via REST...", self.symbols.len());
        }
        let mut updated = 0;
        for symbol in &self.symbols {
            if let Err(e) = self
                .limiter
                .acquire(BINANCE.limits.ticker_call_weight, symbol)
                .await
            {
                log::warn!(">>> PriceStream: warm-up stopped early: {}", e);
                break;
            }
            match self.source.fetch_ticker(symbol).await {
                Ok(ticker) => {
                    if self.store.apply_ticker(symbol, ticker).is_some() {
                        updated += 1;
                    }
                }
                Err(EngineError::RateLimited { context, retry_after }) => {
                    log::warn!(">>> PriceStream: warm-up rate limited ({})", context);
                    self.limiter.penalize(retry_after).await;
                    break;
                }
                Err(e) => log::warn!(">>> PriceStream: warm-up failed for {}: {}", symbol, e),
            }
        }
        log::info!(
            ">>> PriceStream: Warmup complete. Updated {}/{} symbols.",
            updated,
            self.symbols.len()
        );
    }

    /// Warm-up, then the stream with reconnects until cancelled or out of attempts.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) -> Result<()> {
        if self.config.warm_up {
            // Warm-up can sit in the limiter for a whole window.
            tokio::select! {
                _ = self.warm_up() => {}
                _ = cancel.changed() => return Ok(()),
            }
        }

        let url = build_combined_stream_url(&self.config.base_url, &self.symbols);
        let mut attempt: u32 = 0;
        self.set_status(StreamStatus::Connecting);

        loop {
            if *cancel.borrow() {
                return Ok(());
            }
            if DF.log_price_stream_updates {
                log::info!("Attempting connection to Binance Stream...");
            }

            let (was_connected, reason) = match self.run_session(&url, &mut cancel).await {
                SessionEnd::Cancelled => return Ok(()),
                SessionEnd::Closed { was_connected } => {
                    log::warn!("WebSocket closed normally. Reconnecting...");
                    (was_connected, None)
                }
                SessionEnd::Failed { was_connected, reason } => (was_connected, Some(reason)),
            };

            if was_connected {
                attempt = 0;
            }
            attempt += 1;
            if attempt > self.config.max_reconnect_attempts {
                log::error!(
                    "WebSocket giving up after {} reconnect attempts",
                    self.config.max_reconnect_attempts
                );
                self.set_status(StreamStatus::Failed);
                return Err(EngineError::StreamDisconnected {
                    attempts: self.config.max_reconnect_attempts,
                });
            }

            let delay = backoff_delay(&self.config, attempt);
            if let Some(reason) = reason {
                log::error!(
                    "WebSocket connection failed: {}. Retrying in {:.1}s...",
                    reason,
                    delay.as_secs_f64()
                );
            }
            self.set_status(StreamStatus::Reconnecting { attempt });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => {}
            }
        }
    }

    async fn run_session(&self, url: &str, cancel: &mut watch::Receiver<bool>) -> SessionEnd {
        let ws_stream = tokio::select! {
            res = connect_async(url) => match res {
                Ok((ws_stream, _)) => ws_stream,
                Err(e) => return SessionEnd::Failed { was_connected: false, reason: e.to_string() },
            },
            _ = cancel.changed() => return SessionEnd::Cancelled,
        };
        self.set_status(StreamStatus::Connected);
        log::info!("Connected to Binance stream for {} symbols", self.symbols.len());

        let (_write, mut read) = ws_stream.split();
        let mut batch = TickBatch::default();
        let mut flush = tokio::time::interval(Duration::from_millis(self.config.batch_window_ms.max(1)));
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                _ = cancel.changed() => break SessionEnd::Cancelled,
                _ = flush.tick() => {
                    if !batch.is_empty() {
                        let applied = self.store.apply_ticks(batch.drain());
                        if DF.log_price_stream_updates {
                            log::info!("[tick-batch] applied {} ticks", applied);
                        }
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match parse_mini_ticker(text.as_str()) {
                        Some(tick) => batch.push(tick),
                        None => log::warn!("⚠️ Failed to parse WebSocket JSON message"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        break SessionEnd::Closed { was_connected: true };
                    }
                    Some(Err(e)) => {
                        break SessionEnd::Failed { was_connected: true, reason: e.to_string() };
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        // Whatever arrived before the drop is still the freshest data we have.
        if !batch.is_empty() {
            self.store.apply_ticks(batch.drain());
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::tests::ScriptedSource;

    /// A local address nothing listens on.
    fn closed_ws_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("ws://127.0.0.1:{}/stream?streams=", port)
    }

    fn ingestor(config: StreamConfig, limiter: GlobalRateLimiter) -> (TickIngestor, watch::Receiver<StreamStatus>) {
        let (status_tx, status_rx) = watch::channel(StreamStatus::Connecting);
        let store = MarketStateStore::new();
        store.register("BTCUSDT");
        let ingestor = TickIngestor::new(
            vec!["BTCUSDT".to_string()],
            config,
            store,
            Arc::new(ScriptedSource::default()),
            limiter,
            status_tx,
        );
        (ingestor, status_rx)
    }

    #[test]
    fn combined_url_lists_every_symbol() {
        let url = build_combined_stream_url(
            BINANCE.ws.combined_base_url,
            &["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        );
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@miniTicker/ethusdt@miniTicker"
        );
    }

    #[test]
    fn parses_wrapped_and_raw_events() {
        let wrapped = r#"{"stream":"btcusdt@miniTicker","data":{"e":"24hrMiniTicker","E":1700000000000,"s":"BTCUSDT","c":"43000.5","o":"42000","h":"43100","l":"41900","v":"1200","q":"51000000"}}"#;
        let tick = parse_mini_ticker(wrapped).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 43_000.5);
        assert_eq!(tick.volume, 51_000_000.0);
        assert_eq!(tick.event_time_ms, 1_700_000_000_000);

        let raw = r#"{"e":"24hrMiniTicker","E":5,"s":"ethusdt","c":"2000","q":"10"}"#;
        assert_eq!(parse_mini_ticker(raw).unwrap().symbol, "ETHUSDT");

        assert!(parse_mini_ticker(r#"{"result":null,"id":1}"#).is_none());
        assert!(parse_mini_ticker(r#"{"E":5,"s":"X","c":"0","q":"10"}"#).is_none());
    }

    #[test]
    fn batch_keeps_latest_per_symbol() {
        let tick = |s: &str, p: f64, t: i64| Tick {
            symbol: s.to_string(),
            price: p,
            volume: 1.0,
            event_time_ms: t,
        };
        let mut batch = TickBatch::default();
        batch.push(tick("BTCUSDT", 1.0, 1));
        batch.push(tick("BTCUSDT", 3.0, 3));
        batch.push(tick("BTCUSDT", 2.0, 2));
        batch.push(tick("ETHUSDT", 9.0, 1));

        let mut drained = batch.drain();
        drained.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].price, 3.0);
        assert!(batch.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_reconnect_attempts() {
        let config = StreamConfig {
            base_url: closed_ws_url(),
            warm_up: false,
            max_reconnect_attempts: 2,
            ..StreamConfig::default()
        };
        let (ingestor, status_rx) = ingestor(config, GlobalRateLimiter::new(100, Duration::from_secs(60)));
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let err = ingestor.run(cancel_rx).await.unwrap_err();
        assert!(matches!(err, EngineError::StreamDisconnected { attempts: 2 }));
        assert_eq!(*status_rx.borrow(), StreamStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_warm_up_waiting_on_the_limiter() {
        let window = Duration::from_secs(60);
        let limiter = GlobalRateLimiter::new(2, window);
        limiter.acquire(2, "saturate").await.unwrap();
        let config = StreamConfig {
            base_url: closed_ws_url(),
            ..StreamConfig::default()
        };
        let (ingestor, _status_rx) = ingestor(config, limiter);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        let task = tokio::spawn(ingestor.run(cancel_rx));
        tokio::task::yield_now().await;
        cancel_tx.send_replace(true);

        assert!(task.await.unwrap().is_ok());
        assert!(started.elapsed() < window);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let config = StreamConfig {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 5_000,
            ..StreamConfig::default()
        };
        let delays: Vec<u64> = (1..=5)
            .map(|a| backoff_delay(&config, a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 5_000, 5_000]);
        assert_eq!(backoff_delay(&config, 200).as_millis(), 5_000);
    }
}

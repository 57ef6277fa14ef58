use std::time::Duration;

use thiserror::Error;

use crate::config::Interval;

/// Every failure the engine can observe, grouped by how it is handled.
///
/// Per-cycle errors never leave their (symbol, timeframe) unit: the scheduler logs
/// them and moves on. Only `ConfigValidation` is fatal, and only at start-up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Network blip or 5xx. Retried on the next scheduled cycle.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Upstream answered 429 (or our own limiter refused). Cycle deferred.
    #[error("rate limited: {context}")]
    RateLimited {
        context: String,
        retry_after: Option<Duration>,
    },

    /// The shared limiter is in a hard back-off window; the cycle is skipped.
    #[error("rate limiter exhausted for another {remaining:?}")]
    RateLimitExhausted { remaining: Duration },

    /// Candle windows carry their interval; ticker payloads have none.
    #[error(
        "malformed data for {symbol}{}: {reason}",
        .interval.map(|i| format!(" {}", i)).unwrap_or_default()
    )]
    MalformedData {
        symbol: String,
        interval: Option<Interval>,
        reason: String,
    },

    #[error("insufficient history: have {have} candles, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("tick stream disconnected after {attempts} reconnect attempts")]
    StreamDisconnected { attempts: u32 },

    #[error("invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

impl EngineError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

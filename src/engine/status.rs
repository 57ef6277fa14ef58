use std::fmt;
use std::time::Duration;

/// Health of the live tick stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Stream turned off in config.
    Disabled,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Gave up after the configured number of reconnect attempts.
    Failed,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Disabled => write!(f, "disabled"),
            StreamStatus::Connecting => write!(f, "connecting"),
            StreamStatus::Connected => write!(f, "connected"),
            StreamStatus::Reconnecting { attempt } => write!(f, "reconnecting (#{})", attempt),
            StreamStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub stream: StreamStatus,
    /// Remaining penalty if the rate limiter is refusing requests.
    pub rate_limit_exhausted_for: Option<Duration>,
    pub used_weight: u32,
    pub weight_limit: u32,
    pub symbols: Vec<String>,
}

impl EngineStatus {
    pub fn is_degraded(&self) -> bool {
        self.stream == StreamStatus::Failed || self.rate_limit_exhausted_for.is_some()
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream={} weight={}/{} symbols={}",
            self.stream,
            self.used_weight,
            self.weight_limit,
            self.symbols.len()
        )?;
        if let Some(remaining) = self.rate_limit_exhausted_for {
            write!(f, " rate-limited for {:.1}s", remaining.as_secs_f64())?;
        }
        Ok(())
    }
}

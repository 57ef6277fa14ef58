//! Debugging feature flags.

pub struct LogFlags {
    /// Emit verbose logging for live tick stream connections and batches.
    pub log_price_stream_updates: bool,

    /// Log every scheduler cycle (fetch, metrics, signal).
    pub log_scheduler_cycles: bool,

    /// Log per-symbol aggregation results, including neutral ones.
    pub log_aggregation: bool,

    /// Log alerts that were held back by a cooldown.
    pub log_suppressed_alerts: bool,

    /// Activate trace_time macro (for cool scope-level timing)
    pub log_performance: bool,
}

pub const DF: LogFlags = LogFlags {
    log_price_stream_updates: false,
    log_scheduler_cycles: false,
    log_aggregation: false,
    log_suppressed_alerts: true,
    log_performance: false,
};

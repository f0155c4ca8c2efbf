//! Debugging feature flags.

pub struct LogFlags {
    /// Per-gap and per-page progress while backfilling.
    pub log_gap_fill: bool,

    /// Emit verbose logging for live stream connections and ticks.
    pub log_live_stream: bool,

    /// Request/response traffic through the workers.
    pub log_worker: bool,

    /// Activate trace_time macro (for cool scope-level timing)
    pub log_performance: bool,
}

pub const DF: LogFlags = LogFlags {
    log_gap_fill: true,
    log_live_stream: false,
    log_worker: false,
    log_performance: false,
};

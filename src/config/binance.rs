//! Binance REST and websocket settings

/// Kline page size and the request-weight budget it is charged against.
pub struct RestLimits {
    /// Largest klines page the exchange serves.
    pub page_limit: i32,
    /// Weight allowed per wall-clock minute.
    pub minute_weight_budget: u32,
    pub kline_weight: u32,
}

pub struct StreamConfig {
    /// Single-stream endpoint; `<symbol>@kline_<interval>` is appended.
    pub base_url: &'static str,
    pub initial_backoff_sec: u64,
    pub max_backoff_sec: u64,
}

/// Handed to the connector's REST configuration builder.
pub struct RestClientConfig {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
}

pub struct BinanceConfig {
    pub limits: RestLimits,
    pub stream: StreamConfig,
    pub client: RestClientConfig,
}

pub const BINANCE: BinanceConfig = BinanceConfig {
    limits: RestLimits {
        page_limit: 1000,
        minute_weight_budget: 6000,
        kline_weight: 2,
    },
    stream: StreamConfig {
        base_url: "wss://stream.binance.com:9443/ws/",
        initial_backoff_sec: 1,
        max_backoff_sec: 300,
    },
    client: RestClientConfig {
        timeout_ms: 5000,
        retries: 5,
        backoff_ms: 5000,
    },
};

/// REST constraints: kline window size, weight budget, call costs.
pub struct RestLimits {
    pub klines_window: i32,
    pub weight_limit_minute: u32,
    pub kline_call_weight: u32,
    pub ticker_call_weight: u32,
}

pub struct RestConfig {
    pub base_url: &'static str,
    pub ticker_24h_path: &'static str,
}

pub struct WsConfig {
    pub combined_base_url: &'static str,
    pub stream_suffix: &'static str,
}

pub struct ClientDefaults {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
}

pub struct BinanceConfig {
    pub limits: RestLimits,
    pub rest: RestConfig,
    pub ws: WsConfig,
    pub client: ClientDefaults,
}

pub const BINANCE: BinanceConfig = BinanceConfig {
    limits: RestLimits {
        klines_window: 120,
        weight_limit_minute: 6000,
        kline_call_weight: 2,
        ticker_call_weight: 2,
    },
    rest: RestConfig {
        base_url: "https://api.binance.com",
        ticker_24h_path: "/api/v3/ticker/24hr",
    },
    ws: WsConfig {
        combined_base_url: "wss://stream.binance.com:9443/stream?streams=",
        stream_suffix: "@miniTicker",
    },
    client: ClientDefaults {
        timeout_ms: 5000,
        // The scheduler retries on its own cadence, so the SDK should fail fast.
        retries: 0,
        backoff_ms: 1000,
    },
};

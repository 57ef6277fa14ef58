mod bn_kline;
mod price_stream;
mod provider;
mod rate_limiter;
mod ticker;

pub use {
    price_stream::TickIngestor,
    provider::{BinanceProvider, CandleSource},
    rate_limiter::GlobalRateLimiter,
    ticker::TickerClient,
};

use {
    binance_sdk::{
        config::ConfigurationRestApi,
        errors::{self, ConnectorError as connection_error},
        spot::{
            SpotRestApi,
            rest_api::{KlinesIntervalEnum, KlinesItemInner, KlinesParams, RestApi},
        },
    },
    std::convert::TryFrom,
};

use crate::{
    analysis::validate_window,
    config::{BINANCE, Interval},
    domain::{Candle, SymbolInterval},
    error::{EngineError, Result},
};

pub fn kline_interval(interval: Interval) -> KlinesIntervalEnum {
    match interval {
        Interval::M1 => KlinesIntervalEnum::Interval1m,
        Interval::M3 => KlinesIntervalEnum::Interval3m,
        Interval::M5 => KlinesIntervalEnum::Interval5m,
        Interval::M15 => KlinesIntervalEnum::Interval15m,
        Interval::M30 => KlinesIntervalEnum::Interval30m,
        Interval::H1 => KlinesIntervalEnum::Interval1h,
        Interval::H2 => KlinesIntervalEnum::Interval2h,
        Interval::H4 => KlinesIntervalEnum::Interval4h,
        Interval::H6 => KlinesIntervalEnum::Interval6h,
        Interval::H8 => KlinesIntervalEnum::Interval8h,
        Interval::H12 => KlinesIntervalEnum::Interval12h,
        Interval::D1 => KlinesIntervalEnum::Interval1d,
        Interval::D3 => KlinesIntervalEnum::Interval3d,
        Interval::W1 => KlinesIntervalEnum::Interval1w,
    }
}

/// One kline row as Binance sends it. Prices arrive as strings; any that fail
/// to parse stay `None` and are rejected in `into_candle`.
#[derive(Debug, PartialEq)]
pub struct BNKline {
    pub open_timestamp_ms: i64,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub close_price: Option<f64>,
    pub base_asset_volume: Option<f64>,
}

fn kline_item_to_float(item: Option<KlinesItemInner>) -> Option<f64> {
    item.and_then(|inner| {
        if let KlinesItemInner::String(s) = inner {
            s.parse::<f64>().ok()
        } else {
            None
        }
    })
}

impl TryFrom<Vec<KlinesItemInner>> for BNKline {
    type Error = String;

    fn try_from(row: Vec<KlinesItemInner>) -> std::result::Result<Self, Self::Error> {
        let mut items = row.into_iter();
        let open_timestamp_ms = match items.next() {
            Some(KlinesItemInner::Integer(a)) => a,
            Some(_) => return Err("open_time is not an integer".to_string()),
            None => return Err("empty kline row".to_string()),
        };

        Ok(BNKline {
            open_timestamp_ms,
            open_price: kline_item_to_float(items.next()),
            high_price: kline_item_to_float(items.next()),
            low_price: kline_item_to_float(items.next()),
            close_price: kline_item_to_float(items.next()),
            base_asset_volume: kline_item_to_float(items.next()),
        })
    }
}

impl BNKline {
    fn into_candle(self) -> std::result::Result<Candle, String> {
        match (
            self.open_price,
            self.high_price,
            self.low_price,
            self.close_price,
            self.base_asset_volume,
        ) {
            (Some(open), Some(high), Some(low), Some(close), Some(volume)) => Ok(Candle::new(
                self.open_timestamp_ms,
                open,
                high,
                low,
                close,
                volume,
            )),
            _ => Err(format!(
                "kline at {} has missing or unparsable fields",
                self.open_timestamp_ms
            )),
        }
    }
}

/// Converts raw rows into a validated, ascending candle window.
pub fn convert_klines(
    pair: &SymbolInterval,
    rows: Vec<Vec<KlinesItemInner>>,
) -> Result<Vec<Candle>> {
    let malformed = |reason: String| EngineError::MalformedData {
        symbol: pair.symbol.clone(),
        interval: Some(pair.interval),
        reason,
    };
    let candles = rows
        .into_iter()
        .map(|row| BNKline::try_from(row).and_then(BNKline::into_candle))
        .collect::<std::result::Result<Vec<Candle>, String>>()
        .map_err(malformed)?;
    validate_window(pair, &candles)?;
    Ok(candles)
}

pub fn configure_binance_client() -> Result<RestApi> {
    let rest_conf = ConfigurationRestApi::builder()
        .timeout(BINANCE.client.timeout_ms)
        .retries(BINANCE.client.retries)
        .backoff(BINANCE.client.backoff_ms)
        .build()
        .map_err(|e| EngineError::config(format!("binance client: {}", e)))?;
    Ok(SpotRestApi::production(rest_conf))
}

/// Maps SDK failures onto the engine's error taxonomy.
pub(crate) fn classify_error(pair: &SymbolInterval, e: anyhow::Error) -> EngineError {
    let Some(conn_err) = e.downcast_ref::<errors::ConnectorError>() else {
        log::error!("An unexpected error occurred for {}: {:#}", pair, e);
        return EngineError::Upstream(format!("{}: {:#}", pair, e));
    };
    match conn_err {
        connection_error::TooManyRequestsError(msg) => {
            log::warn!("{} Rate limit exceeded. {}", pair, msg);
            EngineError::RateLimited {
                context: format!("{}: {}", pair, msg),
                retry_after: None,
            }
        }
        connection_error::RateLimitBanError(msg) => {
            log::error!("{} IP address banned due to excessive rate limits. {}", pair, msg);
            EngineError::RateLimited {
                context: format!("{}: {}", pair, msg),
                retry_after: None,
            }
        }
        errors::ConnectorError::ServerError { msg, status_code } => {
            log::warn!("{} Server error: {} (status code: {:?})", pair, msg, status_code);
            EngineError::TransientNetwork(format!("{}: {}", pair, msg))
        }
        errors::ConnectorError::NetworkError(msg) => {
            log::warn!("{} Network error: {}", pair, msg);
            EngineError::TransientNetwork(format!("{}: {}", pair, msg))
        }
        connection_error::BadRequestError(msg) | connection_error::ConnectorClientError(msg) => {
            log::error!("{} Client error: check request parameters. {}", pair, msg);
            EngineError::Upstream(format!("{}: {}", pair, msg))
        }
        other => {
            log::error!("{} Unexpected connector error: {:?}", pair, other);
            EngineError::Upstream(format!("{}: {}", pair, other))
        }
    }
}

/// Fetches the most recent `limit` klines, oldest first.
pub async fn load_klines(
    rest_client: &RestApi,
    pair: &SymbolInterval,
    limit: usize,
) -> Result<Vec<Candle>> {
    let params = KlinesParams::builder(pair.bn_name().to_string(), kline_interval(pair.interval))
        .limit(limit as i32)
        .build()
        .map_err(|e| EngineError::Upstream(format!("{}: bad kline params: {}", pair, e)))?;

    let rows = match rest_client.klines(params).await {
        Ok(r) => r.data().await.map_err(|e| classify_error(pair, e.into()))?,
        Err(e) => return Err(classify_error(pair, e)),
    };
    convert_klines(pair, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: i64, o: &str, h: &str, l: &str, c: &str, v: &str) -> Vec<KlinesItemInner> {
        vec![
            KlinesItemInner::Integer(ts),
            KlinesItemInner::String(o.to_string()),
            KlinesItemInner::String(h.to_string()),
            KlinesItemInner::String(l.to_string()),
            KlinesItemInner::String(c.to_string()),
            KlinesItemInner::String(v.to_string()),
            KlinesItemInner::Integer(ts + 299_999),
            KlinesItemInner::String("0".to_string()),
        ]
    }

    #[test]
    fn rows_become_candles() {
        let pair = SymbolInterval::new("BTCUSDT", Interval::M5);
        let candles = convert_klines(
            &pair,
            vec![
                row(0, "100", "101", "99", "100.5", "12"),
                row(300_000, "100.5", "102", "100", "101.5", "8"),
            ],
        )
        .unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 101.5);
        assert_eq!(candles[0].volume, 12.0);
    }

    #[test]
    fn unparsable_price_is_malformed() {
        let pair = SymbolInterval::new("BTCUSDT", Interval::M5);
        let err = convert_klines(&pair, vec![row(0, "100", "oops", "99", "100", "1")]).unwrap_err();
        assert!(err.to_string().starts_with("malformed data for BTCUSDT 5m:"));
        assert!(matches!(err, EngineError::MalformedData { symbol, .. } if symbol == "BTCUSDT"));
    }

    #[test]
    fn every_interval_maps() {
        use strum::IntoEnumIterator;
        for interval in Interval::iter() {
            let _ = kline_interval(interval);
        }
    }
}

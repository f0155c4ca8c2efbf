use {
    anyhow::{Result, anyhow},
    binance_sdk::{
        config::ConfigurationRestApi,
        errors::{self, ConnectorError as connection_error},
        spot::{
            SpotRestApi,
            rest_api::{KlinesIntervalEnum, KlinesItemInner, KlinesParams, RestApi},
        },
    },
    std::{convert::TryFrom, error::Error, fmt},
};

use crate::{
    config::BINANCE,
    domain::{BucketUnit, Candle, Range, SeriesKey},
    utils::Timestamp,
};

/// Maps a series onto Binance's fixed interval set.
pub fn interval_for(key: &SeriesKey) -> Result<KlinesIntervalEnum> {
    use BucketUnit as U;
    match (key.multiplier, key.unit) {
        (1, U::Minute) => Ok(KlinesIntervalEnum::Interval1m),
        (3, U::Minute) => Ok(KlinesIntervalEnum::Interval3m),
        (5, U::Minute) => Ok(KlinesIntervalEnum::Interval5m),
        (15, U::Minute) => Ok(KlinesIntervalEnum::Interval15m),
        (30, U::Minute) => Ok(KlinesIntervalEnum::Interval30m),
        (1, U::Hour) => Ok(KlinesIntervalEnum::Interval1h),
        (2, U::Hour) => Ok(KlinesIntervalEnum::Interval2h),
        (4, U::Hour) => Ok(KlinesIntervalEnum::Interval4h),
        (6, U::Hour) => Ok(KlinesIntervalEnum::Interval6h),
        (8, U::Hour) => Ok(KlinesIntervalEnum::Interval8h),
        (12, U::Hour) => Ok(KlinesIntervalEnum::Interval12h),
        (1, U::Day) => Ok(KlinesIntervalEnum::Interval1d),
        (3, U::Day) => Ok(KlinesIntervalEnum::Interval3d),
        (1, U::Week) => Ok(KlinesIntervalEnum::Interval1w),
        (1, U::Month) => Ok(KlinesIntervalEnum::Interval1M),
        _ => Err(anyhow!("{} has no Binance interval", key)),
    }
}

/// The stream-name form of an interval, e.g. `15m` or `1M`.
pub fn interval_code(key: &SeriesKey) -> Result<String> {
    interval_for(key)?;
    let unit = match key.unit {
        BucketUnit::Minute => "m",
        BucketUnit::Hour => "h",
        BucketUnit::Day => "d",
        BucketUnit::Week => "w",
        _ => "M",
    };
    Ok(format!("{}{}", key.multiplier, unit))
}

#[derive(Debug, PartialEq)]
pub struct BNKline {
    pub open_timestamp_ms: i64,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub close_price: Option<f64>,
    pub base_asset_volume: Option<f64>,
    pub trades: Option<i64>,
}

#[derive(Debug)]
pub enum BNKlineError {
    InvalidLength,
    InvalidType(String),
    ConnectionFailed(String),
}

impl fmt::Display for BNKlineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            BNKlineError::InvalidLength => write!(f, "Invalid length"),
            BNKlineError::InvalidType(string) => write!(f, "Invalid type: {}", string),
            BNKlineError::ConnectionFailed(msg) => {
                write!(f, "Binance API connection failed: {}.", msg)
            }
        }
    }
}

impl Error for BNKlineError {}

fn string_item_to_float(item: Option<KlinesItemInner>) -> Option<f64> {
    item.and_then(|inner| match inner {
        KlinesItemInner::String(s) => s.parse::<f64>().ok(),
        _ => None,
    })
}

fn integer_item(item: Option<KlinesItemInner>) -> Option<i64> {
    item.and_then(|inner| match inner {
        KlinesItemInner::Integer(n) => Some(n),
        _ => None,
    })
}

impl TryFrom<Vec<KlinesItemInner>> for BNKline {
    type Error = BNKlineError;

    fn try_from(vec_inner_klines: Vec<KlinesItemInner>) -> Result<Self, Self::Error> {
        let mut items = vec_inner_klines.into_iter();
        let open_timestamp_ms = match items.next().ok_or(BNKlineError::InvalidLength)? {
            KlinesItemInner::Integer(a) => a,
            _ => return Err(BNKlineError::InvalidType("open_time".to_string())),
        };

        let open_price = string_item_to_float(items.next());
        let high_price = string_item_to_float(items.next());
        let low_price = string_item_to_float(items.next());
        let close_price = string_item_to_float(items.next());
        let base_asset_volume = string_item_to_float(items.next());
        let _close_time = items.next();
        let _quote_asset_volume = items.next();
        let trades = integer_item(items.next());

        Ok(BNKline {
            open_timestamp_ms,
            open_price,
            high_price,
            low_price,
            close_price,
            base_asset_volume,
            trades,
        })
    }
}

impl BNKline {
    /// Every kline we keep is closed; the forming one is dropped before conversion.
    pub fn into_candle(self, key: &SeriesKey) -> Candle {
        Candle::new(
            key.clone(),
            self.open_timestamp_ms,
            self.open_price.unwrap_or_default(),
            self.high_price.unwrap_or_default(),
            self.low_price.unwrap_or_default(),
            self.close_price.unwrap_or_default(),
            self.base_asset_volume.unwrap_or_default(),
        )
        .with_trades(self.trades.unwrap_or_default().max(0) as u64)
    }
}

pub fn configure_binance_client() -> Result<RestApi> {
    let config = &BINANCE.client;
    let rest_conf = ConfigurationRestApi::builder()
        .timeout(config.timeout_ms)
        .retries(config.retries)
        .backoff(config.backoff_ms)
        .build()?;
    Ok(SpotRestApi::production(rest_conf))
}

fn log_connector_error(key: &SeriesKey, conn_err: &errors::ConnectorError) {
    match conn_err {
        connection_error::ConnectorClientError(msg) => {
            log::error!("{} Client error: Check your request parameters. {}", key, msg);
        }
        connection_error::TooManyRequestsError(msg) => {
            log::warn!("{} Rate limit exceeded. Please wait and try again. {}", key, msg);
        }
        connection_error::RateLimitBanError(msg) => {
            log::error!("{} IP address banned due to excessive rate limits. {}", key, msg);
        }
        errors::ConnectorError::ServerError { msg, status_code } => {
            log::error!("{} Server error: {} (status code: {:?})", key, msg, status_code);
        }
        errors::ConnectorError::NetworkError(msg) => {
            log::error!("{} Network error: Check your internet connection. {}", key, msg);
        }
        errors::ConnectorError::NotFoundError(msg) => {
            log::error!("{} Resource not found. {}", key, msg);
        }
        connection_error::BadRequestError(msg) => {
            log::warn!("{} Bad request: Verify your input parameters. {}", key, msg);
        }
        other => {
            log::error!("Unexpected ConnectionError variant: {:?}", other);
        }
    }
}

/// One klines request: at most `limit` klines opening inside `range`, oldest first.
pub async fn fetch_klines_page(
    rest_client: &RestApi,
    key: &SeriesKey,
    range: Range,
    limit: usize,
) -> Result<Vec<BNKline>> {
    let limit = limit.clamp(1, BINANCE.limits.page_limit as usize) as i32;
    // Binance treats endTime as inclusive.
    let end_time: Option<Timestamp> = Some(range.to - 1);
    let start_time: Option<Timestamp> = Some(range.from);

    let params = KlinesParams::builder(key.instrument.clone(), interval_for(key)?)
        .limit(limit)
        .start_time(start_time)
        .end_time(end_time)
        .build()?;

    let data = match rest_client.klines(params).await {
        Ok(r) => r.data().await?,
        Err(e) => {
            let message = if let Some(conn_err) = e.downcast_ref::<errors::ConnectorError>() {
                log_connector_error(key, conn_err);
                conn_err.to_string()
            } else {
                log::error!("An unexpected error occurred for {}: {:#}", key, e);
                e.to_string()
            };
            return Err(anyhow::Error::new(BNKlineError::ConnectionFailed(message))
                .context(format!("Binance klines call failed for {}", key)));
        }
    };

    data.into_iter()
        .map(BNKline::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::Error::new(e).context(format!("{} convert_klines failed", key)))
}

/// Drops any kline whose bucket has not closed by `now`.
pub fn drop_forming(key: &SeriesKey, klines: Vec<BNKline>, now: Timestamp) -> Vec<BNKline> {
    let current_bucket = key.align(now);
    klines
        .into_iter()
        .filter(|k| k.open_timestamp_ms < current_bucket)
        .collect()
}

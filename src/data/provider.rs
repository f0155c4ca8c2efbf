use {
    anyhow::Result,
    async_trait::async_trait,
};

use crate::{
    config::{BINANCE, DF},
    data::{
        GlobalRateLimiter,
        bn_kline::{configure_binance_client, drop_forming, fetch_klines_page},
    },
    domain::{Candle, Range, SeriesKey},
    utils::{Timestamp, now_timestamp_ms},
};

/// Remote source of closed candles.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Largest page a single `fetch` can return.
    fn page_limit(&self) -> usize;

    /// At most `limit` closed candles with time in `range`, ascending.
    /// A short page means nothing further exists in the range yet.
    async fn fetch(&self, key: &SeriesKey, range: Range, limit: usize) -> Result<Vec<Candle>>;

    /// Time of the first candle the source has for `key`, if any.
    async fn first_candle_time(&self, key: &SeriesKey) -> Result<Option<Timestamp>>;
}

pub struct BinanceProvider {
    limiter: GlobalRateLimiter,
}

impl BinanceProvider {
    pub fn new(limiter: GlobalRateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl CandleProvider for BinanceProvider {
    fn page_limit(&self) -> usize {
        BINANCE.limits.page_limit as usize
    }

    async fn fetch(&self, key: &SeriesKey, range: Range, limit: usize) -> Result<Vec<Candle>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let rest_client = configure_binance_client()?;
        self.limiter
            .acquire(BINANCE.limits.kline_weight, &key.to_string())
            .await;

        let klines = fetch_klines_page(&rest_client, key, range, limit).await?;
        let received = klines.len();
        let klines = drop_forming(key, klines, now_timestamp_ms());

        if DF.log_gap_fill && klines.len() != received {
            log::debug!("{}: dropped forming candle from page", key);
        }

        Ok(klines.into_iter().map(|k| k.into_candle(key)).collect())
    }

    async fn first_candle_time(&self, key: &SeriesKey) -> Result<Option<Timestamp>> {
        let rest_client = configure_binance_client()?;
        self.limiter
            .acquire(BINANCE.limits.kline_weight, &key.to_string())
            .await;

        let everything = Range::ordered(0, now_timestamp_ms());
        let first = fetch_klines_page(&rest_client, key, everything, 1).await?;
        Ok(first.first().map(|k| k.open_timestamp_ms))
    }
}

use {
    crate::{domain::SeriesKey, utils::Timestamp},
    serde::{Deserialize, Serialize},
};

/// One OHLCV bucket. `time` is the bucket start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub time: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// False only for the still-forming bucket delivered by the live feed.
    pub closed: bool,
    pub trades: u64,
    pub series_key: SeriesKey,
}

impl Candle {
    pub fn new(
        series_key: SeriesKey,
        time: Timestamp,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Candle {
            time,
            open,
            high,
            low,
            close,
            volume,
            closed: true,
            trades: 0,
            series_key,
        }
    }

    pub fn with_trades(mut self, trades: u64) -> Self {
        self.trades = trades;
        self
    }

    pub fn forming(mut self) -> Self {
        self.closed = false;
        self
    }
}

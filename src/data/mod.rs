// Candle acquisition: local store, remote source, gap filling and range planning
pub mod bn_kline;
mod gap_fill;
pub mod price_stream;
mod provider;
mod range_planner;
mod rate_limiter;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use gap_fill::{FillStage, FilledSeries, GapFillEngine, find_missing_ranges};
pub use price_stream::{ConnectionStatus, LiveCandleFeed};
pub use provider::{BinanceProvider, CandleProvider};
pub use range_planner::{ChartMode, RangePlanner, VisibleBars};
pub use rate_limiter::GlobalRateLimiter;
pub use storage::{CandleStore, MemoryStorage, SqliteStorage};

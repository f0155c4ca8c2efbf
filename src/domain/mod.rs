// Domain types and value objects
mod candle;
mod range;
mod series_key;

pub use candle::Candle;
pub use range::{Gap, Range};
pub use series_key::{BucketUnit, SeriesKey};

use {
    crate::{
        error::EngineError,
        utils::{Timestamp, add_units, align_to_bucket, diff_in_units},
    },
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
    strum_macros::{Display, EnumString},
};

/// Calendar unit a bucket is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum BucketUnit {
    #[strum(serialize = "m")]
    #[serde(rename = "m")]
    Minute,
    #[strum(serialize = "H")]
    #[serde(rename = "H")]
    Hour,
    #[strum(serialize = "D")]
    #[serde(rename = "D")]
    Day,
    #[strum(serialize = "W")]
    #[serde(rename = "W")]
    Week,
    #[strum(serialize = "M")]
    #[serde(rename = "M")]
    Month,
    #[strum(serialize = "Q")]
    #[serde(rename = "Q")]
    Quarter,
    #[strum(serialize = "Y")]
    #[serde(rename = "Y")]
    Year,
}

/// Identifies one candle series, e.g. `BTCUSDT-15-m`.
///
/// Serialized as its string form so it can key both the store and worker messages.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeriesKey {
    pub instrument: String,
    pub multiplier: u32,
    pub unit: BucketUnit,
}

impl SeriesKey {
    pub fn new(instrument: impl Into<String>, multiplier: u32, unit: BucketUnit) -> Self {
        Self {
            instrument: instrument.into(),
            multiplier: multiplier.max(1),
            unit,
        }
    }

    /// Moves `ts` by `buckets` whole buckets (negative goes back).
    pub fn step(&self, ts: Timestamp, buckets: i64) -> Timestamp {
        add_units(self.unit, ts, buckets.saturating_mul(self.multiplier as i64))
    }

    /// Start of the bucket containing `ts`.
    pub fn align(&self, ts: Timestamp) -> Timestamp {
        align_to_bucket(self.unit, self.multiplier, ts)
    }

    /// First bucket start at or after `ts`.
    pub fn align_up(&self, ts: Timestamp) -> Timestamp {
        let floor = self.align(ts);
        if floor < ts { self.step(floor, 1) } else { floor }
    }

    /// Whole buckets between two timestamps, ignoring order.
    pub fn buckets_between(&self, a: Timestamp, b: Timestamp) -> i64 {
        diff_in_units(self.unit, a, b).abs() / self.multiplier as i64
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.instrument, self.multiplier, self.unit)
    }
}

impl FromStr for SeriesKey {
    type Err = EngineError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidRange(format!("malformed series key '{text}'"));

        // Instrument names may contain dashes, so split from the right.
        let mut parts = text.rsplitn(3, '-');
        let unit = parts.next().ok_or_else(invalid)?;
        let multiplier = parts.next().ok_or_else(invalid)?;
        let instrument = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        let unit = BucketUnit::from_str(unit).map_err(|_| invalid())?;
        let multiplier: u32 = multiplier.parse().map_err(|_| invalid())?;
        if multiplier == 0 {
            return Err(invalid());
        }

        Ok(Self {
            instrument: instrument.to_string(),
            multiplier,
            unit,
        })
    }
}

impl TryFrom<String> for SeriesKey {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeriesKey> for String {
    fn from(key: SeriesKey) -> Self {
        key.to_string()
    }
}

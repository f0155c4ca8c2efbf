use {
    crate::{
        domain::SeriesKey,
        error::EngineError,
        utils::{Timestamp, epoch_ms_to_utc_minutes},
    },
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Half-open time window `[from, to)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub from: Timestamp,
    pub to: Timestamp,
}

impl Range {
    pub fn new(from: Timestamp, to: Timestamp) -> Result<Self, EngineError> {
        if from > to {
            return Err(EngineError::InvalidRange(format!(
                "from ({from}) is after to ({to})"
            )));
        }
        Ok(Self { from, to })
    }

    /// Builds a range from two bounds in either order.
    pub(crate) fn ordered(a: Timestamp, b: Timestamp) -> Self {
        Self {
            from: a.min(b),
            to: a.max(b),
        }
    }

    /// Re-checks a range that arrived through deserialization.
    pub fn validated(self) -> Result<Self, EngineError> {
        Self::new(self.from, self.to)
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.from <= ts && ts < self.to
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            epoch_ms_to_utc_minutes(self.from),
            epoch_ms_to_utc_minutes(self.to)
        )
    }
}

/// A run of consecutive missing buckets; both ends are bucket starts and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub first: Timestamp,
    pub last: Timestamp,
}

impl Gap {
    /// The half-open window that covers every bucket in the gap.
    pub fn as_range(&self, key: &SeriesKey) -> Range {
        Range::ordered(self.first, key.step(self.last, 1))
    }

    pub fn bucket_count(&self, key: &SeriesKey) -> i64 {
        key.buckets_between(self.first, self.last) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BucketUnit;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(Range::new(10, 10).is_ok());
        assert!(matches!(Range::new(11, 10), Err(EngineError::InvalidRange(_))));
        assert!(Range { from: 5, to: 1 }.validated().is_err());
    }

    #[test]
    fn containment_is_half_open() {
        let range = Range::new(0, 60_000).unwrap();
        assert!(range.contains(0));
        assert!(range.contains(59_999));
        assert!(!range.contains(60_000));
        assert!(Range::new(3, 3).unwrap().is_empty());
    }

    #[test]
    fn gap_range_covers_its_last_bucket() {
        let key = SeriesKey::new("X", 1, BucketUnit::Minute);
        let gap = Gap {
            first: 3 * 60_000,
            last: 4 * 60_000,
        };
        assert_eq!(gap.as_range(&key), Range::new(3 * 60_000, 5 * 60_000).unwrap());
        assert_eq!(gap.bucket_count(&key), 2);
    }
}

use {
    crate::{analysis::RingBuffer, error::EngineError},
    serde::{Deserialize, Serialize},
};

/// Whether the window has seen `period` values yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum AverageMode {
    Warming { count: usize, sum: f64 },
    Ready { sum: f64 },
}

/// Simple moving average maintained in O(1) per value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingAverage {
    window: RingBuffer<f64>,
    mode: AverageMode,
}

impl RollingAverage {
    pub fn new(period: usize) -> Self {
        Self {
            window: RingBuffer::new(period),
            mode: AverageMode::Warming { count: 0, sum: 0.0 },
        }
    }

    pub fn period(&self) -> usize {
        self.window.capacity()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.mode, AverageMode::Ready { .. })
    }

    /// Current average, once the warm-up is over.
    pub fn current(&self) -> Option<f64> {
        match self.mode {
            AverageMode::Ready { sum } => Some(sum / self.period() as f64),
            AverageMode::Warming { .. } => None,
        }
    }

    /// Feeds one value. Returns `None` until `period` values have been seen.
    pub fn next(&mut self, value: f64) -> Option<f64> {
        let period = self.period() as f64;
        match self.mode {
            AverageMode::Warming { count, sum } => {
                self.window.push(value);
                let sum = sum + value;
                if self.window.is_filled() {
                    self.mode = AverageMode::Ready { sum };
                    Some(sum / period)
                } else {
                    self.mode = AverageMode::Warming {
                        count: count + 1,
                        sum,
                    };
                    None
                }
            }
            AverageMode::Ready { sum } => {
                let evicted = self.window.push(value).unwrap_or(0.0);
                let sum = sum - evicted + value;
                self.mode = AverageMode::Ready { sum };
                Some(sum / period)
            }
        }
    }

    /// The average `next(value)` would return, without committing `value`.
    pub fn moment_value(&self, value: f64) -> Result<f64, EngineError> {
        match self.mode {
            AverageMode::Ready { sum } => {
                let oldest = self.window.peek().copied().unwrap_or(0.0);
                Ok((sum - oldest + value) / self.period() as f64)
            }
            AverageMode::Warming { count, .. } => Err(EngineError::NotInitialized(format!(
                "moving average has {count} of {} values",
                self.period()
            ))),
        }
    }
}

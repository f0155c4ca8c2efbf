use {
    crate::{
        analysis::{RollingAverage, RollingStdDev},
        error::EngineError,
    },
    serde::{Deserialize, Serialize},
};

/// One set of volatility bands around a moving average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bands {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
    pub std_dev: f64,
}

impl Bands {
    fn around(middle: f64, std_dev: f64, multiplier: f64) -> Self {
        Self {
            lower: middle - multiplier * std_dev,
            middle,
            upper: middle + multiplier * std_dev,
            std_dev,
        }
    }

    /// Band width relative to the middle line.
    pub fn bandwidth(&self) -> f64 {
        (self.upper - self.lower) / self.middle
    }
}

/// Bollinger bands: `middle ± multiplier * σ` over a rolling window of closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandCalculator {
    multiplier: f64,
    average: RollingAverage,
    std_dev: RollingStdDev,
}

impl BandCalculator {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self {
            multiplier,
            average: RollingAverage::new(period),
            std_dev: RollingStdDev::new(period),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.average.is_ready()
    }

    /// Feeds one close. The deviation window only starts filling once the
    /// average is ready, so σ reaches a full window `period` bars later.
    pub fn next(&mut self, close: f64) -> Option<Bands> {
        let middle = self.average.next(close)?;
        let std_dev = self.std_dev.next(close, middle);
        Some(Bands::around(middle, std_dev, self.multiplier))
    }

    /// Bands for a hypothetical close, leaving the calculator unchanged.
    pub fn moment_value(&mut self, close: f64) -> Result<Bands, EngineError> {
        let middle = self.average.moment_value(close)?;
        let std_dev = self.std_dev.moment_value(close, middle);
        Ok(Bands::around(middle, std_dev, self.multiplier))
    }
}

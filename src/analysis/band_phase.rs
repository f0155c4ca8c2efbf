use {
    crate::{
        analysis::{BandCalculator, Bands, RingBuffer},
        config::AnalysisConfig,
        error::EngineError,
        utils::{Timestamp, finite_min_max, nz},
    },
    serde::{Deserialize, Serialize},
    strum_macros::Display,
};

/// Regime of the band envelope. Serialized as its number (1..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Phase {
    /// Bandwidth pinned near the bottom of its recent range.
    Squeeze = 1,
    /// Upper band rising while the lower band falls.
    Divergence = 2,
    /// Both bands moving the same way.
    Trending = 3,
    /// Upper band falling while the lower band rises.
    Contraction = 4,
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase as u8
    }
}

impl TryFrom<u8> for Phase {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Phase::Squeeze),
            2 => Ok(Phase::Divergence),
            3 => Ok(Phase::Trending),
            4 => Ok(Phase::Contraction),
            other => Err(EngineError::InvalidState(format!("unknown phase {other}"))),
        }
    }
}

/// Band values kept for comparing consecutive bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandResult {
    pub time: Timestamp,
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Per-bar output of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandRow {
    pub time: Timestamp,
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
    pub volatility: Option<f64>,
    pub phase: Option<Phase>,
}

/// How the envelope moved from one bar to the next.
struct BandMove {
    upper_up: bool,
    upper_down: bool,
    lower_up: bool,
    lower_down: bool,
    contracting: bool,
}

impl BandMove {
    fn between(previous: &BandResult, current: &BandResult) -> Self {
        Self {
            upper_up: current.upper >= previous.upper,
            upper_down: current.upper <= previous.upper,
            lower_up: current.lower >= previous.lower,
            lower_down: current.lower <= previous.lower,
            contracting: current.upper < previous.upper && current.lower > previous.lower,
        }
    }

    fn divergence(&self) -> Option<Phase> {
        (self.upper_up && self.lower_down).then_some(Phase::Divergence)
    }

    fn trending(&self) -> Option<Phase> {
        ((self.upper_up && self.lower_up) || (self.upper_down && self.lower_down))
            .then_some(Phase::Trending)
    }

    fn contraction(&self) -> Option<Phase> {
        self.contracting.then_some(Phase::Contraction)
    }
}

/// Bands plus a bandwidth-based volatility score and a phase state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandPhaseTracker {
    bands: BandCalculator,
    last_bands: RingBuffer<BandResult>,
    bandwidth_history: RingBuffer<f64>,
    last_delta: Option<f64>,
    last_phase: Option<Phase>,
    squeeze_threshold: f64,
}

impl BandPhaseTracker {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            bands: BandCalculator::new(config.band_period, config.band_multiplier),
            last_bands: RingBuffer::new(2),
            bandwidth_history: RingBuffer::new(config.band_period),
            last_delta: None,
            last_phase: None,
            squeeze_threshold: config.squeeze_threshold,
        }
    }

    pub fn last_phase(&self) -> Option<Phase> {
        self.last_phase
    }

    /// Feeds one close. `None` while the bands are still warming up.
    pub fn next(&mut self, time: Timestamp, close: f64) -> Option<BandRow> {
        let bands = self.bands.next(close)?;
        Some(self.record(time, bands))
    }

    /// Bands for a hypothetical close. Volatility and phase are left out
    /// since they only advance on committed bars.
    pub fn moment_value(&mut self, time: Timestamp, close: f64) -> Result<BandRow, EngineError> {
        let bands = self.bands.moment_value(close)?;
        Ok(BandRow {
            time,
            lower: bands.lower,
            middle: bands.middle,
            upper: bands.upper,
            volatility: None,
            phase: None,
        })
    }

    fn record(&mut self, time: Timestamp, bands: Bands) -> BandRow {
        self.last_bands.push(BandResult {
            time,
            middle: bands.middle,
            upper: bands.upper,
            lower: bands.lower,
        });
        let volatility = self.volatility_score(&bands);
        let phase = volatility.and_then(|score| self.classify(score));

        BandRow {
            time,
            lower: bands.lower,
            middle: bands.middle,
            upper: bands.upper,
            volatility,
            phase,
        }
    }

    /// Where the current bandwidth sits within its recent range, smoothed over two bars.
    /// Ranges from 0 (at the recent low) to 1 (at the recent high).
    fn volatility_score(&mut self, bands: &Bands) -> Option<f64> {
        let bandwidth = bands.bandwidth();
        self.bandwidth_history.push(bandwidth);

        let delta = match finite_min_max(self.bandwidth_history.iter()) {
            Some((lowest, highest)) => nz((bandwidth - highest) / (highest - lowest)),
            None => 0.0,
        };
        let score = self
            .last_delta
            .map(|last_delta| nz((last_delta + delta) / 2.0) + 1.0);
        self.last_delta = Some(delta);
        score
    }

    fn classify(&mut self, volatility: f64) -> Option<Phase> {
        if !self.last_bands.is_filled() {
            return None;
        }
        let mut pair: Vec<BandResult> = self.last_bands.iter().copied().collect();
        pair.sort_by_key(|b| b.time);
        let [previous, current] = pair.as_slice() else {
            return None;
        };

        let moved = BandMove::between(previous, current);
        let squeeze = (volatility < self.squeeze_threshold).then_some(Phase::Squeeze);

        let phase = match self.last_phase {
            Some(Phase::Squeeze) => moved.divergence(),
            Some(Phase::Divergence) => moved.trending(),
            Some(Phase::Trending) => moved.contraction().or_else(|| moved.divergence()),
            Some(Phase::Contraction) => squeeze
                .or_else(|| moved.divergence())
                .or_else(|| moved.trending()),
            None => squeeze
                .or_else(|| moved.divergence())
                .or_else(|| moved.trending())
                .or_else(|| moved.contraction()),
        }
        .or(self.last_phase);

        self.last_phase = phase;
        phase
    }
}

use {
    crate::{
        analysis::{BandPhaseTracker, Phase, RollingAverage},
        config::AnalysisConfig,
        domain::Candle,
        error::EngineError,
        trace_time,
        utils::Timestamp,
    },
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
    pub time: Timestamp,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPoint {
    pub time: Timestamp,
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasePoint {
    pub time: Timestamp,
    pub phase: Phase,
}

/// Indicator output, one series per indicator, each in candle order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRows {
    pub volume: Vec<TimeValue>,
    pub bands: Vec<BandPoint>,
    pub volatility: Vec<TimeValue>,
    pub phases: Vec<PhasePoint>,
}

impl AnalysisRows {
    pub fn is_empty(&self) -> bool {
        self.volume.is_empty()
            && self.bands.is_empty()
            && self.volatility.is_empty()
            && self.phases.is_empty()
    }

    /// Appends rows from a later batch.
    pub fn extend(&mut self, later: AnalysisRows) {
        self.volume.extend(later.volume);
        self.bands.extend(later.bands);
        self.volatility.extend(later.volatility);
        self.phases.extend(later.phases);
    }
}

/// Everything needed to continue the indicators from where a batch ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerState {
    pub band_phase: BandPhaseTracker,
    pub volume_average: RollingAverage,
}

/// Provisional values for a candle that has not closed yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub time: Timestamp,
    pub bands: BandPoint,
    pub volume_average: Option<f64>,
}

impl AnalyzerState {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            band_phase: BandPhaseTracker::new(config),
            volume_average: RollingAverage::new(config.volume_period),
        }
    }

    fn step(&mut self, candle: &Candle, rows: &mut AnalysisRows) {
        if let Some(row) = self.band_phase.next(candle.time, candle.close) {
            rows.bands.push(BandPoint {
                time: row.time,
                upper: row.upper,
                middle: row.middle,
                lower: row.lower,
            });
            if let Some(value) = row.volatility {
                rows.volatility.push(TimeValue {
                    time: row.time,
                    value,
                });
            }
            if let Some(phase) = row.phase {
                rows.phases.push(PhasePoint {
                    time: row.time,
                    phase,
                });
            }
        }
        if let Some(value) = self.volume_average.next(candle.volume) {
            rows.volume.push(TimeValue {
                time: candle.time,
                value,
            });
        }
    }

    /// Indicator values for a forming candle. Nothing is committed.
    pub fn preview(&self, candle: &Candle) -> Result<PreviewRow, EngineError> {
        // Moment values roll themselves back; work on a copy to keep `&self`.
        let mut band_phase = self.band_phase.clone();
        let row = band_phase.moment_value(candle.time, candle.close)?;
        Ok(PreviewRow {
            time: candle.time,
            bands: BandPoint {
                time: row.time,
                upper: row.upper,
                middle: row.middle,
                lower: row.lower,
            },
            volume_average: self.volume_average.moment_value(candle.volume).ok(),
        })
    }
}

/// Result of one batch: the rows it produced and the state to carry forward.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub rows: AnalysisRows,
    pub state: AnalyzerState,
}

/// Stateless entry point: all continuity lives in the [`AnalyzerState`] passed in and out.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn fresh_state(&self) -> AnalyzerState {
        AnalyzerState::new(&self.config)
    }

    /// Runs `candles` (in time order) through the indicators, starting from
    /// `previous` or from a fresh state.
    pub fn analyze(&self, previous: Option<AnalyzerState>, candles: &[Candle]) -> Analysis {
        let mut state = previous.unwrap_or_else(|| self.fresh_state());
        let mut rows = AnalysisRows::default();

        trace_time!("analyze batch", 2000, {
            for candle in candles {
                state.step(candle, &mut rows);
            }
        });

        Analysis { rows, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ANALYSIS,
        domain::{BucketUnit, SeriesKey},
    };

    fn small_config() -> AnalysisConfig {
        AnalysisConfig {
            band_period: 5,
            volume_period: 4,
            ..ANALYSIS
        }
    }

    fn candles(count: usize) -> Vec<Candle> {
        let key = SeriesKey::new("BTCUSDT", 1, BucketUnit::Minute);
        (0..count)
            .map(|i| {
                let x = i as f64;
                let close = 100.0 + (x * 0.7).sin() * 5.0 + x * 0.1;
                Candle::new(
                    key.clone(),
                    i as i64 * 60_000,
                    close - 0.5,
                    close + 1.0,
                    close - 1.0,
                    close,
                    10.0 + (x * 1.3).cos().abs() * 3.0,
                )
            })
            .collect()
    }

    #[test]
    fn split_batches_match_one_batch() {
        let analyzer = Analyzer::new(small_config());
        let all = candles(40);

        let whole = analyzer.analyze(None, &all);

        for split in [1, 3, 4, 5, 17, 39] {
            let first = analyzer.analyze(None, &all[..split]);
            // Carry the state across a serialization boundary like the worker does.
            let json = serde_json::to_string(&first.state).unwrap();
            let carried: AnalyzerState = serde_json::from_str(&json).unwrap();
            let second = analyzer.analyze(Some(carried), &all[split..]);

            let mut rows = first.rows;
            rows.extend(second.rows);
            assert_eq!(rows, whole.rows, "split at {split}");
            assert_eq!(second.state, whole.state, "split at {split}");
        }
    }

    #[test]
    fn warm_up_lengths_follow_periods() {
        let analyzer = Analyzer::new(small_config());
        let out = analyzer.analyze(None, &candles(10));
        // Bands from the 5th candle, volume average from the 4th.
        assert_eq!(out.rows.bands.len(), 6);
        assert_eq!(out.rows.bands[0].time, 4 * 60_000);
        assert_eq!(out.rows.volume.len(), 7);
        // Volatility and phase need one more bar than the bands.
        assert_eq!(out.rows.volatility.len(), 5);
        assert_eq!(out.rows.phases.len(), 5);
    }

    #[test]
    fn preview_requires_warm_state() {
        let analyzer = Analyzer::new(small_config());
        let all = candles(6);
        let cold = analyzer.analyze(None, &all[..2]);
        assert!(matches!(
            cold.state.preview(&all[2]),
            Err(EngineError::NotInitialized(_))
        ));

        let warm = analyzer.analyze(None, &all[..5]);
        let before = warm.state.clone();
        let preview = warm.state.preview(&all[5]).unwrap();
        assert_eq!(warm.state, before);

        let committed = analyzer.analyze(Some(warm.state), &all[5..]);
        let band = committed.rows.bands[0];
        assert_eq!(preview.bands, band);
        assert_eq!(preview.volume_average, Some(committed.rows.volume[0].value));
    }

    #[test]
    fn empty_batch_returns_state_unchanged() {
        let analyzer = Analyzer::new(small_config());
        let warm = analyzer.analyze(None, &candles(8));
        let again = analyzer.analyze(Some(warm.state.clone()), &[]);
        assert!(again.rows.is_empty());
        assert_eq!(again.state, warm.state);
    }
}

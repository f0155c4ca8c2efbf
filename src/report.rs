//! Terminal rendering of a series' latest indicator values.

use std::collections::HashMap;

use tabled::{Table, Tabled, settings::Style};

use crate::analysis::{BandPoint, Phase, PreviewRow};
use crate::engine::SeriesState;
use crate::utils::{Timestamp, epoch_ms_to_utc_minutes};

const MISSING: &str = "-";

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct IndicatorRow {
    #[tabled(rename = "Time (UTC)")]
    pub time: String,
    #[tabled(rename = "Close")]
    pub close: String,
    #[tabled(rename = "Lower")]
    pub lower: String,
    #[tabled(rename = "Middle")]
    pub middle: String,
    #[tabled(rename = "Upper")]
    pub upper: String,
    #[tabled(rename = "Volatility")]
    pub volatility: String,
    #[tabled(rename = "Phase")]
    pub phase: String,
    #[tabled(rename = "Vol MA")]
    pub volume_average: String,
}

fn num(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{v:.4}"))
}

fn phase_label(phase: Option<Phase>) -> String {
    phase.map_or_else(|| MISSING.to_string(), |p| format!("{} {}", p as u8, p))
}

/// The newest `count` closed candles joined with their indicator values.
pub fn indicator_rows(state: &SeriesState, count: usize) -> Vec<IndicatorRow> {
    let bands: HashMap<Timestamp, &BandPoint> =
        state.rows.bands.iter().map(|b| (b.time, b)).collect();
    let volatility: HashMap<Timestamp, f64> = state
        .rows
        .volatility
        .iter()
        .map(|v| (v.time, v.value))
        .collect();
    let phases: HashMap<Timestamp, Phase> =
        state.rows.phases.iter().map(|p| (p.time, p.phase)).collect();
    let volume: HashMap<Timestamp, f64> =
        state.rows.volume.iter().map(|v| (v.time, v.value)).collect();

    let skip = state.len().saturating_sub(count);
    state
        .candles()
        .skip(skip)
        .map(|candle| {
            let band = bands.get(&candle.time);
            IndicatorRow {
                time: epoch_ms_to_utc_minutes(candle.time),
                close: num(Some(candle.close)),
                lower: num(band.map(|b| b.lower)),
                middle: num(band.map(|b| b.middle)),
                upper: num(band.map(|b| b.upper)),
                volatility: num(volatility.get(&candle.time).copied()),
                phase: phase_label(phases.get(&candle.time).copied()),
                volume_average: num(volume.get(&candle.time).copied()),
            }
        })
        .collect()
}

/// Row for the forming candle, marked with `*`.
pub fn preview_row(close: f64, preview: &PreviewRow) -> IndicatorRow {
    IndicatorRow {
        time: format!("{} *", epoch_ms_to_utc_minutes(preview.time)),
        close: num(Some(close)),
        lower: num(Some(preview.bands.lower)),
        middle: num(Some(preview.bands.middle)),
        upper: num(Some(preview.bands.upper)),
        volatility: MISSING.to_string(),
        phase: MISSING.to_string(),
        volume_average: num(preview.volume_average),
    }
}

pub fn render_table(rows: &[IndicatorRow]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::Analyzer,
        config::{ANALYSIS, AnalysisConfig},
        data::testing::ScriptedExchange,
        domain::{BucketUnit, SeriesKey},
        utils::TimeUtils,
    };

    const MIN: i64 = TimeUtils::MS_IN_MIN;
    const T0: i64 = 1_700_000_000_000 - 1_700_000_000_000 % TimeUtils::MS_IN_H;

    fn analyzed_series(candle_count: i64) -> SeriesState {
        let key = SeriesKey::new("ETHUSDT", 1, BucketUnit::Minute);
        let candles: Vec<_> = (0..candle_count)
            .map(|m| ScriptedExchange::candle_at(&key, T0 + m * MIN))
            .collect();
        let analyzer = Analyzer::new(AnalysisConfig {
            band_period: 4,
            volume_period: 3,
            ..ANALYSIS
        });

        let mut state = SeriesState::new(key);
        state.merge_candles(candles);
        let loaded = state.begin_start("report".into());
        let analysis = analyzer.analyze(None, &loaded);
        state.finish_analysis(analysis.rows, analysis.state, true);
        state
    }

    #[test]
    fn keeps_only_the_newest_rows() {
        let state = analyzed_series(30);
        let rows = indicator_rows(&state, 5);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].time, epoch_ms_to_utc_minutes(T0 + 29 * MIN));
        assert!(rows.iter().all(|r| r.middle != MISSING && r.volume_average != MISSING));
    }

    #[test]
    fn warm_up_rows_show_placeholders() {
        let state = analyzed_series(3);
        let rows = indicator_rows(&state, 10);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].middle, MISSING);
        assert_eq!(rows[0].phase, MISSING);
        assert_ne!(rows[2].volume_average, MISSING);
    }

    #[test]
    fn renders_headers() {
        let state = analyzed_series(10);
        let table = render_table(&indicator_rows(&state, 3));
        assert!(table.contains("Time (UTC)"));
        assert!(table.contains("Vol MA"));
        assert_eq!(table.lines().count(), 3 + 4);
    }
}

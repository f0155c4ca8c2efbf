#![allow(clippy::collapsible_if)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod report;
pub mod utils;

use std::{sync::Arc, thread, time::Duration};

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate};
use clap::Parser;
use tokio::runtime::Runtime;

// Re-export commonly used types outside of crate
pub use analysis::{Analyzer, AnalyzerState};
pub use config::{ANALYSIS, PERSISTENCE};
pub use data::{CandleProvider, CandleStore, GapFillEngine, RangePlanner};
pub use domain::{BucketUnit, Candle, Range, SeriesKey};
pub use engine::{ChartEngine, EngineEvent};
pub use error::{EngineError, EngineResult};

use crate::data::LiveCandleFeed;
use crate::report::{indicator_rows, preview_row, render_table};
use crate::utils::{Timestamp, epoch_ms_to_utc, now_timestamp_ms};

const WORKER_TIMEOUT: Duration = Duration::from_secs(300);
const LIVE_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Series as <instrument>-<multiplier>-<unit>, e.g. BTCUSDT-1-H
    #[arg(default_value = "BTCUSDT-1-H")]
    pub series: SeriesKey,

    /// SQLite candle cache
    #[arg(long, default_value = PERSISTENCE.db_path)]
    pub db_path: String,

    /// Centre the initial window on this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_utc)]
    pub anchor: Option<Timestamp>,

    /// Skip onboarding discovery and assume the series starts here
    #[arg(long, value_parser = parse_utc)]
    pub onboard: Option<Timestamp>,

    /// Indicator rows to print
    #[arg(long, default_value_t = 20)]
    pub rows: usize,

    /// Keep following the live kline stream
    #[arg(long, default_value_t = false)]
    pub live: bool,
}

fn parse_utc(s: &str) -> Result<Timestamp, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| format!("'{s}' is neither RFC 3339 nor YYYY-MM-DD"))
}

/// Loads the planned window for `key` and runs a full analysis over it.
pub fn load_and_analyze(
    engine: &mut ChartEngine,
    key: &SeriesKey,
    range: Range,
    timeout: Duration,
) -> Result<()> {
    engine.request_candles(key, range)?;
    match engine.wait_event(timeout) {
        Some(EngineEvent::CandlesLoaded { added, total, .. }) => {
            log::info!("{}: {} candle(s) loaded ({} new to the chart)", key, total, added);
        }
        Some(EngineEvent::Failed { error, .. }) => return Err(error.into()),
        Some(other) => bail!("unexpected event while loading {key}: {other:?}"),
        None => bail!("timed out loading {key}"),
    }

    engine.request_analysis(key)?;
    match engine.wait_event(timeout) {
        Some(EngineEvent::Analyzed { .. }) => Ok(()),
        Some(EngineEvent::Failed { error, .. }) => Err(error.into()),
        Some(other) => bail!("unexpected event while analyzing {key}: {other:?}"),
        None => bail!("timed out analyzing {key}"),
    }
}

fn print_latest(engine: &ChartEngine, key: &SeriesKey, count: usize) {
    if let Some(state) = engine.get_series(key) {
        println!("{}", render_table(&indicator_rows(state, count)));
    }
}

/// CLI entry point: plan, load, analyze, print, then optionally follow live.
pub fn run(
    cli: Cli,
    rt: &Runtime,
    store: Arc<dyn CandleStore>,
    provider: Arc<dyn CandleProvider>,
) -> Result<()> {
    let key = cli.series.clone();
    rt.block_on(store.initialize())?;

    let onboard = match cli.onboard {
        Some(ts) => ts,
        None => match rt.block_on(provider.first_candle_time(&key))? {
            Some(ts) => ts,
            None => bail!("no candles available for {key}"),
        },
    };

    let planner = RangePlanner::new(&key, onboard, now_timestamp_ms());
    let range = planner.initial_range(cli.anchor);
    log::info!(
        "{}: onboard {}, loading {}",
        key,
        epoch_ms_to_utc(planner.onboard()),
        range
    );

    let gap_fill = GapFillEngine::new(store, provider);
    let mut engine = ChartEngine::new(rt.handle().clone(), gap_fill, Analyzer::new(ANALYSIS));
    load_and_analyze(&mut engine, &key, range, WORKER_TIMEOUT)?;
    print_latest(&engine, &key, cli.rows);

    if !cli.live {
        return Ok(());
    }

    let feed = LiveCandleFeed::spawn(key.clone(), engine.live_sender())?;
    log::info!("Following {} live (Ctrl-C to stop)", feed.key());
    loop {
        for event in engine.process_live_data() {
            if let EngineEvent::LiveTick {
                candle,
                preview: Some(preview),
                ..
            } = event
            {
                println!("{}", render_table(&[preview_row(candle.close, &preview)]));
            }
        }
        for event in engine.poll_events() {
            match event {
                EngineEvent::Analyzed { key, .. } => print_latest(&engine, &key, 1),
                EngineEvent::Failed { key, error, .. } => log::error!("{}: {}", key, error),
                _ => {}
            }
        }
        thread::sleep(LIVE_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AnalysisConfig,
        data::{MemoryStorage, testing::ScriptedExchange},
        utils::TimeUtils,
    };

    const MIN: i64 = TimeUtils::MS_IN_MIN;
    const T0: i64 = 1_700_000_000_000 - 1_700_000_000_000 % TimeUtils::MS_IN_H;

    #[test]
    fn parses_cli_arguments() {
        let cli = Cli::parse_from([
            "bandscope",
            "ETHUSDT-15-m",
            "--anchor",
            "2024-03-01",
            "--rows",
            "5",
            "--live",
        ]);
        assert_eq!(cli.series, SeriesKey::new("ETHUSDT", 15, BucketUnit::Minute));
        assert_eq!(cli.anchor, Some(1_709_251_200_000));
        assert_eq!(cli.rows, 5);
        assert!(cli.live);
        assert_eq!(cli.db_path, PERSISTENCE.db_path);

        assert!(Cli::try_parse_from(["bandscope", "ETHUSDT-15-x"]).is_err());
        assert!(Cli::try_parse_from(["bandscope", "--onboard", "soon"]).is_err());
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(
            parse_utc("2024-03-01T02:00:00+02:00"),
            Ok(1_709_251_200_000)
        );
    }

    #[test]
    fn loads_and_analyzes_planned_window() {
        let rt = Runtime::new().unwrap();
        let key = SeriesKey::new("BTCUSDT", 1, BucketUnit::Minute);
        let now = T0 + 4_000 * MIN;
        let exchange = ScriptedExchange::new(key.clone(), T0, now, 1_000);
        let gap_fill = GapFillEngine::new(Arc::new(MemoryStorage::new()), Arc::new(exchange));
        let analyzer = Analyzer::new(AnalysisConfig {
            band_period: 20,
            volume_period: 20,
            ..ANALYSIS
        });
        let mut engine = ChartEngine::new(rt.handle().clone(), gap_fill, analyzer);

        let range = RangePlanner::new(&key, T0, now).initial_range(None);
        load_and_analyze(&mut engine, &key, range, Duration::from_secs(10)).unwrap();

        let state = engine.get_series(&key).unwrap();
        assert_eq!(state.len(), 3_000);
        assert_eq!(state.first_time(), Some(T0 + 1_000 * MIN));
        assert_eq!(state.rows.bands.len(), 3_000 - 19);
        assert!(state.analyzer_state.is_some());
    }
}

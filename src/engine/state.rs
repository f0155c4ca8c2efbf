use std::collections::BTreeMap;

use crate::analysis::{AnalysisRows, AnalyzerState};
use crate::domain::{Candle, Range, SeriesKey};
use crate::engine::messages::CorrelationId;
use crate::error::EngineError;
use crate::utils::{AppInstant, Timestamp};

/// What a live candle did to the series.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    /// Replaced the provisional bucket.
    Forming,
    /// Closed a bucket that was appended to the series.
    Closed,
    /// Older than the newest closed candle.
    Stale,
    /// Arrived past a hole; `Range` is what must be loaded first.
    Detached(Range),
}

/// Everything the caller keeps for one series.
#[derive(Debug, Clone)]
pub struct SeriesState {
    pub key: SeriesKey,
    candles: BTreeMap<Timestamp, Candle>,
    /// Provisional bucket from the live feed.
    pub forming: Option<Candle>,

    /// Indicator rows accumulated across batches.
    pub rows: AnalysisRows,
    pub analyzer_state: Option<AnalyzerState>,
    analyzed_through: Option<Timestamp>,
    analyzing_through: Option<Timestamp>,

    /// Latest outstanding requests; responses with other ids are stale.
    pub pending_fetch: Option<CorrelationId>,
    pub pending_analysis: Option<CorrelationId>,

    pub last_error: Option<EngineError>,
    pub last_update_time: AppInstant,
}

impl SeriesState {
    pub fn new(key: SeriesKey) -> Self {
        Self {
            key,
            candles: BTreeMap::new(),
            forming: None,
            rows: AnalysisRows::default(),
            analyzer_state: None,
            analyzed_through: None,
            analyzing_through: None,
            pending_fetch: None,
            pending_analysis: None,
            last_error: None,
            last_update_time: AppInstant::now(),
        }
    }

    pub fn candles(&self) -> impl Iterator<Item = &Candle> {
        self.candles.values()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first_time(&self) -> Option<Timestamp> {
        self.candles.keys().next().copied()
    }

    pub fn last_time(&self) -> Option<Timestamp> {
        self.candles.keys().next_back().copied()
    }

    /// Merges fetched candles by time. Returns how many were new.
    pub fn merge_candles(&mut self, fetched: Vec<Candle>) -> usize {
        let before = self.candles.len();
        for candle in fetched {
            self.candles.insert(candle.time, candle);
        }
        if let (Some(forming), Some(last)) = (&self.forming, self.last_time()) {
            if forming.time <= last {
                self.forming = None;
            }
        }
        self.last_update_time = AppInstant::now();
        self.candles.len() - before
    }

    pub fn apply_live(&mut self, candle: Candle) -> LiveUpdate {
        if let Some(last) = self.last_time() {
            if candle.time <= last {
                return LiveUpdate::Stale;
            }
            let expected = self.key.step(last, 1);
            if candle.time > expected {
                return LiveUpdate::Detached(Range::ordered(expected, self.key.step(candle.time, 1)));
            }
        }

        self.last_update_time = AppInstant::now();
        if candle.closed {
            self.forming = None;
            self.candles.insert(candle.time, candle);
            LiveUpdate::Closed
        } else {
            self.forming = Some(candle);
            LiveUpdate::Forming
        }
    }

    /// Marks the start of a full analysis and returns every loaded candle.
    pub(crate) fn begin_start(&mut self, id: CorrelationId) -> Vec<Candle> {
        self.pending_analysis = Some(id);
        self.analyzing_through = self.last_time();
        self.candles.values().cloned().collect()
    }

    /// Closed candles the analyzer has not seen, if an update can go out now.
    pub(crate) fn begin_update(&mut self, id: CorrelationId) -> Option<(AnalyzerState, Vec<Candle>)> {
        if self.pending_analysis.is_some() {
            return None;
        }
        let state = self.analyzer_state.clone()?;
        let through = self.analyzed_through?;
        let unseen: Vec<Candle> = self
            .candles
            .range(through + 1..)
            .map(|(_, c)| c.clone())
            .collect();
        if unseen.is_empty() {
            return None;
        }
        self.pending_analysis = Some(id);
        self.analyzing_through = self.last_time();
        Some((state, unseen))
    }

    /// Applies a finished analysis; `replace` drops rows from earlier batches.
    pub(crate) fn finish_analysis(&mut self, rows: AnalysisRows, state: AnalyzerState, replace: bool) {
        if replace {
            self.rows = rows;
        } else {
            self.rows.extend(rows);
        }
        self.analyzer_state = Some(state);
        self.analyzed_through = self.analyzing_through.take();
        self.pending_analysis = None;
        self.last_error = None;
        self.last_update_time = AppInstant::now();
    }
}

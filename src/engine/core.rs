use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::analysis::{AnalysisRows, Analyzer, PreviewRow};
use crate::config::DF;
use crate::data::GapFillEngine;
use crate::domain::{Candle, Range, SeriesKey};
use crate::error::{EngineError, EngineResult};
use crate::utils::AppInstant;

use super::messages::{
    AnalyzeKind, AnalyzerRequest, AnalyzerResponse, CandleRequest, CandleResponse, CorrelationId,
    WorkerResponse,
};
use super::state::{LiveUpdate, SeriesState};
use super::worker;

/// Something the caller should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CandlesLoaded {
        key: SeriesKey,
        correlation_id: CorrelationId,
        added: usize,
        total: usize,
    },
    Analyzed {
        key: SeriesKey,
        correlation_id: CorrelationId,
        kind: AnalyzeKind,
        /// Rows produced by this batch only.
        rows: AnalysisRows,
    },
    LiveTick {
        key: SeriesKey,
        candle: Candle,
        /// Uncommitted indicator values for a forming candle.
        preview: Option<PreviewRow>,
    },
    Failed {
        key: SeriesKey,
        correlation_id: CorrelationId,
        error: EngineError,
    },
}

pub struct ChartEngine {
    /// Registry of all series
    pub series: HashMap<SeriesKey, SeriesState>,

    // Live Data Channels
    live_rx: Receiver<Candle>,
    live_tx: Sender<Candle>,

    candle_tx: Sender<CandleRequest>,
    analyzer_tx: Sender<AnalyzerRequest>,
    response_rx: Receiver<WorkerResponse>,

    in_flight: HashMap<CorrelationId, SeriesKey>,
    _workers: Vec<JoinHandle<()>>,
}

impl ChartEngine {
    /// Spawns both workers. `handle` drives the store and provider futures.
    pub fn new(handle: Handle, gap_fill: GapFillEngine, analyzer: Analyzer) -> Self {
        let (live_tx, live_rx) = channel();
        let (candle_tx, candle_rx) = channel::<CandleRequest>();
        let (analyzer_tx, analyzer_rx) = channel::<AnalyzerRequest>();
        let (response_tx, response_rx) = channel::<WorkerResponse>();

        let workers = vec![
            worker::spawn_candle_worker(handle, gap_fill, candle_rx, response_tx.clone()),
            worker::spawn_analyzer_worker(analyzer, analyzer_rx, response_tx),
        ];

        Self {
            series: HashMap::new(),
            live_rx,
            live_tx,
            candle_tx,
            analyzer_tx,
            response_rx,
            in_flight: HashMap::new(),
            _workers: workers,
        }
    }

    /// Hand this to a live feed.
    pub fn live_sender(&self) -> Sender<Candle> {
        self.live_tx.clone()
    }

    pub fn get_series(&self, key: &SeriesKey) -> Option<&SeriesState> {
        self.series.get(key)
    }

    /// Loads `range` through the gap-fill worker. Supersedes any fetch still
    /// in flight for the same series.
    pub fn request_candles(&mut self, key: &SeriesKey, range: Range) -> EngineResult<CorrelationId> {
        let range = range.validated()?;
        let correlation_id = CorrelationId::new();

        self.candle_tx
            .send(CandleRequest::FetchCandles {
                correlation_id: correlation_id.clone(),
                series_key: key.clone(),
                from: range.from,
                to: range.to,
            })
            .map_err(|_| EngineError::WorkerUnavailable("candle worker stopped".to_string()))?;

        let state = self
            .series
            .entry(key.clone())
            .or_insert_with(|| SeriesState::new(key.clone()));
        if let Some(previous) = state.pending_fetch.replace(correlation_id.clone()) {
            self.in_flight.remove(&previous);
        }
        self.in_flight.insert(correlation_id.clone(), key.clone());

        if DF.log_worker {
            log::info!("[{}] requested {} {}", correlation_id, key, range);
        }
        Ok(correlation_id)
    }

    /// Analyzes every loaded candle from scratch.
    pub fn request_analysis(&mut self, key: &SeriesKey) -> EngineResult<CorrelationId> {
        let state = self
            .series
            .get_mut(key)
            .ok_or_else(|| EngineError::NotInitialized(format!("no candles loaded for {key}")))?;

        let correlation_id = CorrelationId::new();
        if let Some(previous) = state.pending_analysis.take() {
            self.in_flight.remove(&previous);
        }
        let candles = state.begin_start(correlation_id.clone());

        let request = AnalyzerRequest::Analyze {
            correlation_id: correlation_id.clone(),
            kind: AnalyzeKind::Start,
            candles,
            previous_state: None,
        };
        if self.analyzer_tx.send(request).is_err() {
            let error = EngineError::WorkerUnavailable("analyzer worker stopped".to_string());
            state.pending_analysis = None;
            state.last_error = Some(error.clone());
            return Err(error);
        }
        self.in_flight.insert(correlation_id.clone(), key.clone());
        Ok(correlation_id)
    }

    /// Sends closed candles the analyzer has not seen, if nothing is pending.
    fn dispatch_update(&mut self, key: &SeriesKey) {
        let Some(state) = self.series.get_mut(key) else {
            return;
        };
        let correlation_id = CorrelationId::new();
        let Some((previous_state, candles)) = state.begin_update(correlation_id.clone()) else {
            return;
        };

        let request = AnalyzerRequest::Analyze {
            correlation_id: correlation_id.clone(),
            kind: AnalyzeKind::Update,
            candles,
            previous_state: Some(previous_state),
        };
        if self.analyzer_tx.send(request).is_err() {
            log::error!("Analyzer worker stopped; {} left without update", key);
            state.pending_analysis = None;
            state.last_error = Some(EngineError::WorkerUnavailable(
                "analyzer worker stopped".to_string(),
            ));
            return;
        }
        self.in_flight.insert(correlation_id, key.clone());
    }

    /// Drains every worker response already received.
    pub fn poll_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            events.extend(self.handle_response(response));
        }
        events
    }

    /// Blocks until a current (non-stale) response arrives or `timeout` passes.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<EngineEvent> {
        let deadline = AppInstant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(AppInstant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => {
                    if let Some(event) = self.handle_response(response) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    /// Merges queued live candles. Closed candles trigger an `update` analysis.
    pub fn process_live_data(&mut self) -> Vec<EngineEvent> {
        let mut updates = Vec::new();
        while let Ok(candle) = self.live_rx.try_recv() {
            updates.push(candle);
        }

        let mut events = Vec::new();
        let mut closed_keys: Vec<SeriesKey> = Vec::new();
        let mut holes: Vec<(SeriesKey, Range)> = Vec::new();

        for candle in updates {
            let key = candle.series_key.clone();
            let Some(state) = self.series.get_mut(&key) else {
                continue;
            };

            match state.apply_live(candle.clone()) {
                LiveUpdate::Forming => {
                    let preview = state
                        .analyzer_state
                        .as_ref()
                        .and_then(|s| s.preview(&candle).ok());
                    events.push(EngineEvent::LiveTick {
                        key,
                        candle,
                        preview,
                    });
                }
                LiveUpdate::Closed => {
                    if DF.log_live_stream {
                        log::info!("ENGINE: candle closed for {} at {}", key, candle.time);
                    }
                    if !closed_keys.contains(&key) {
                        closed_keys.push(key.clone());
                    }
                    events.push(EngineEvent::LiveTick {
                        key,
                        candle,
                        preview: None,
                    });
                }
                LiveUpdate::Detached(range) => {
                    if state.pending_fetch.is_none() && !holes.iter().any(|(k, _)| k == &key) {
                        holes.push((key, range));
                    }
                }
                LiveUpdate::Stale => {}
            }
        }

        for key in closed_keys {
            self.dispatch_update(&key);
        }
        for (key, range) in holes {
            if let Err(e) = self.request_candles(&key, range) {
                log::error!("Could not fill live hole for {}: {}", key, e);
            }
        }
        events
    }

    /// Indicator values for the forming candle, if any.
    pub fn preview(&self, key: &SeriesKey) -> EngineResult<Option<PreviewRow>> {
        let state = self
            .series
            .get(key)
            .ok_or_else(|| EngineError::NotInitialized(format!("unknown series {key}")))?;
        let (Some(forming), Some(analyzer_state)) = (&state.forming, &state.analyzer_state) else {
            return Ok(None);
        };
        analyzer_state.preview(forming).map(Some)
    }

    // --- INTERNAL LOGIC ---

    fn handle_response(&mut self, response: WorkerResponse) -> Option<EngineEvent> {
        let correlation_id = match &response {
            WorkerResponse::Candles(r) => r.correlation_id().clone(),
            WorkerResponse::Analysis(r) => r.correlation_id().clone(),
        };
        let Some(key) = self.in_flight.remove(&correlation_id) else {
            if DF.log_worker {
                log::info!("[{}] discarding stale response", correlation_id);
            }
            return None;
        };
        let state = self.series.get_mut(&key)?;

        match response {
            WorkerResponse::Candles(CandleResponse::CandlesFetched { candles, .. }) => {
                state.pending_fetch = None;
                state.last_error = None;
                let added = state.merge_candles(candles);
                let total = state.len();
                self.dispatch_update(&key);
                Some(EngineEvent::CandlesLoaded {
                    key,
                    correlation_id,
                    added,
                    total,
                })
            }
            WorkerResponse::Analysis(AnalyzerResponse::Analyzed {
                kind,
                rows,
                new_state,
                ..
            }) => {
                state.finish_analysis(rows.clone(), new_state, kind == AnalyzeKind::Start);
                // Candles that closed while this batch was running.
                self.dispatch_update(&key);
                Some(EngineEvent::Analyzed {
                    key,
                    correlation_id,
                    kind,
                    rows,
                })
            }
            WorkerResponse::Candles(CandleResponse::Failed { error, .. }) => {
                log::error!("Candle worker failed for {}: {}", key, error);
                state.pending_fetch = None;
                state.last_error = Some(error.clone());
                Some(EngineEvent::Failed {
                    key,
                    correlation_id,
                    error,
                })
            }
            WorkerResponse::Analysis(AnalyzerResponse::Failed { error, .. }) => {
                log::error!("Analyzer failed for {}: {}", key, error);
                state.pending_analysis = None;
                state.last_error = Some(error.clone());
                Some(EngineEvent::Failed {
                    key,
                    correlation_id,
                    error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ANALYSIS, AnalysisConfig},
        data::{MemoryStorage, testing::ScriptedExchange},
        domain::BucketUnit,
        utils::TimeUtils,
    };
    use std::sync::Arc;
    use tokio::runtime::Runtime;

    const MIN: i64 = TimeUtils::MS_IN_MIN;
    const T0: i64 = 1_700_000_000_000 - 1_700_000_000_000 % TimeUtils::MS_IN_H;
    const WAIT: Duration = Duration::from_secs(5);

    fn key() -> SeriesKey {
        SeriesKey::new("BTCUSDT", 1, BucketUnit::Minute)
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(AnalysisConfig {
            band_period: 4,
            volume_period: 3,
            ..ANALYSIS
        })
    }

    fn engine(rt: &Runtime, exchange: ScriptedExchange) -> ChartEngine {
        let gap_fill = GapFillEngine::new(Arc::new(MemoryStorage::new()), Arc::new(exchange));
        ChartEngine::new(rt.handle().clone(), gap_fill, analyzer())
    }

    fn window(from: i64, to: i64) -> Range {
        Range::new(T0 + from * MIN, T0 + to * MIN).unwrap()
    }

    /// An engine whose workers have already gone away.
    fn orphaned_engine() -> ChartEngine {
        let (live_tx, live_rx) = channel();
        let (candle_tx, _) = channel();
        let (analyzer_tx, _) = channel();
        let (_, response_rx) = channel();
        ChartEngine {
            series: HashMap::new(),
            live_rx,
            live_tx,
            candle_tx,
            analyzer_tx,
            response_rx,
            in_flight: HashMap::new(),
            _workers: Vec::new(),
        }
    }

    #[test]
    fn dead_analyzer_does_not_leave_series_pending() {
        let mut engine = orphaned_engine();
        let k = key();
        let mut state = SeriesState::new(k.clone());
        state.merge_candles((0..5).map(|m| ScriptedExchange::candle_at(&k, T0 + m * MIN)).collect());
        engine.series.insert(k.clone(), state);

        assert!(matches!(
            engine.request_analysis(&k),
            Err(EngineError::WorkerUnavailable(_))
        ));
        let series = engine.get_series(&k).unwrap();
        assert!(series.pending_analysis.is_none());
        assert!(matches!(
            series.last_error,
            Some(EngineError::WorkerUnavailable(_))
        ));
        assert!(engine.in_flight.is_empty());

        assert!(matches!(
            engine.request_candles(&k, window(0, 10)),
            Err(EngineError::WorkerUnavailable(_))
        ));
        assert!(engine.get_series(&k).unwrap().pending_fetch.is_none());
    }

    #[test]
    fn superseded_fetch_is_discarded() {
        let rt = Runtime::new().unwrap();
        let mut engine = engine(&rt, ScriptedExchange::new(key(), T0, T0 + 500 * MIN, 100));

        let stale = engine.request_candles(&key(), window(0, 10)).unwrap();
        let latest = engine.request_candles(&key(), window(100, 130)).unwrap();
        assert_ne!(stale, latest);

        match engine.wait_event(WAIT) {
            Some(EngineEvent::CandlesLoaded {
                correlation_id,
                added,
                total,
                ..
            }) => {
                assert_eq!(correlation_id, latest);
                assert_eq!(added, 30);
                assert_eq!(total, 30);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(engine.poll_events().is_empty());
        let series = engine.get_series(&key()).unwrap();
        assert_eq!(series.first_time(), Some(T0 + 100 * MIN));
        assert!(series.pending_fetch.is_none());
    }

    #[test]
    fn invalid_range_is_rejected_before_dispatch() {
        let rt = Runtime::new().unwrap();
        let mut engine = engine(&rt, ScriptedExchange::new(key(), T0, T0 + 500 * MIN, 100));
        let inverted = Range {
            from: T0 + MIN,
            to: T0,
        };
        assert!(matches!(
            engine.request_candles(&key(), inverted),
            Err(EngineError::InvalidRange(_))
        ));
        assert!(engine.get_series(&key()).is_none());
        assert!(matches!(
            engine.request_analysis(&key()),
            Err(EngineError::NotInitialized(_))
        ));
    }

    #[test]
    fn fetch_failure_is_reported_and_recorded() {
        let rt = Runtime::new().unwrap();
        let exchange = ScriptedExchange::new(key(), T0, T0 + 500 * MIN, 100).failing_on(1);
        let mut engine = engine(&rt, exchange);

        let id = engine.request_candles(&key(), window(0, 50)).unwrap();
        match engine.wait_event(WAIT) {
            Some(EngineEvent::Failed {
                correlation_id,
                error,
                ..
            }) => {
                assert_eq!(correlation_id, id);
                assert!(matches!(error, EngineError::FetchFailed { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(engine.get_series(&key()).unwrap().last_error.is_some());
    }

    #[test]
    fn load_analyze_then_follow_live_candles() {
        let rt = Runtime::new().unwrap();
        let mut engine = engine(&rt, ScriptedExchange::new(key(), T0, T0 + 500 * MIN, 100));
        let k = key();

        engine.request_candles(&k, window(0, 200)).unwrap();
        assert!(matches!(
            engine.wait_event(WAIT),
            Some(EngineEvent::CandlesLoaded { added: 200, .. })
        ));

        engine.request_analysis(&k).unwrap();
        let Some(EngineEvent::Analyzed { kind, rows, .. }) = engine.wait_event(WAIT) else {
            panic!("start analysis did not finish");
        };
        assert_eq!(kind, AnalyzeKind::Start);
        let loaded: Vec<Candle> = engine.get_series(&k).unwrap().candles().cloned().collect();
        assert_eq!(rows, analyzer().analyze(None, &loaded).rows);

        let live = engine.live_sender();
        let next = ScriptedExchange::candle_at(&k, T0 + 200 * MIN);
        live.send(next.clone().forming()).unwrap();
        let ticks = engine.process_live_data();
        assert_eq!(ticks.len(), 1);
        let EngineEvent::LiveTick { preview, .. } = &ticks[0] else {
            panic!("expected a tick");
        };
        assert_eq!(preview.as_ref().map(|p| p.time), Some(T0 + 200 * MIN));
        assert!(engine.preview(&k).unwrap().is_some());

        live.send(next.clone()).unwrap();
        engine.process_live_data();
        let Some(EngineEvent::Analyzed { kind, rows, .. }) = engine.wait_event(WAIT) else {
            panic!("update analysis did not finish");
        };
        assert_eq!(kind, AnalyzeKind::Update);
        assert_eq!(rows.bands.len(), 1);
        assert_eq!(rows.bands[0].time, next.time);

        let mut all = loaded;
        all.push(next);
        let series = engine.get_series(&k).unwrap();
        assert_eq!(series.len(), 201);
        assert_eq!(series.analyzer_state, Some(analyzer().analyze(None, &all).state));
        assert!(engine.preview(&k).unwrap().is_none());
    }

    #[test]
    fn live_candle_past_a_hole_loads_the_hole() {
        let rt = Runtime::new().unwrap();
        let mut engine = engine(&rt, ScriptedExchange::new(key(), T0, T0 + 500 * MIN, 100));
        let k = key();

        engine.request_candles(&k, window(0, 20)).unwrap();
        engine.wait_event(WAIT);

        engine
            .live_sender()
            .send(ScriptedExchange::candle_at(&k, T0 + 25 * MIN))
            .unwrap();
        assert!(engine.process_live_data().is_empty());
        assert!(engine.get_series(&k).unwrap().pending_fetch.is_some());

        assert!(matches!(
            engine.wait_event(WAIT),
            Some(EngineEvent::CandlesLoaded {
                added: 6,
                total: 26,
                ..
            })
        ));
    }
}

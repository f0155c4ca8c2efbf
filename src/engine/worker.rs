use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use tokio::runtime::Handle;

use crate::analysis::Analyzer;
use crate::config::DF;
use crate::data::GapFillEngine;
use crate::domain::Range;
use crate::error::EngineError;
use crate::utils::AppInstant;

use super::messages::{
    AnalyzeKind, AnalyzerRequest, AnalyzerResponse, CandleRequest, CandleResponse,
};

/// Handles one fetch request end to end.
pub async fn process_candle_request(engine: &GapFillEngine, req: CandleRequest) -> CandleResponse {
    let CandleRequest::FetchCandles {
        correlation_id,
        series_key,
        from,
        to,
    } = req;

    let outcome = match Range::new(from, to) {
        Ok(range) => engine.fill(&series_key, range).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(filled) => {
            if DF.log_worker {
                log::info!(
                    "[{}] {}: {} candle(s), {} fetch call(s), {} new",
                    correlation_id,
                    series_key,
                    filled.candles.len(),
                    filled.fetch_calls,
                    filled.persisted
                );
            }
            CandleResponse::CandlesFetched {
                correlation_id,
                candles: filled.candles,
            }
        }
        Err(error) => {
            log::error!("[{}] {}: {}", correlation_id, series_key, error);
            CandleResponse::Failed {
                correlation_id,
                error,
            }
        }
    }
}

/// Runs one analysis request. Pure: the outcome depends only on the request.
pub fn process_analyze_request(analyzer: &Analyzer, req: AnalyzerRequest) -> AnalyzerResponse {
    let AnalyzerRequest::Analyze {
        correlation_id,
        kind,
        candles,
        previous_state,
    } = req;

    let previous = match (kind, previous_state) {
        (AnalyzeKind::Start, _) => None,
        (AnalyzeKind::Update, Some(state)) => Some(state),
        (AnalyzeKind::Update, None) => {
            return AnalyzerResponse::Failed {
                correlation_id,
                error: EngineError::NotInitialized(
                    "update requested without a previous analyzer state".to_string(),
                ),
            };
        }
    };

    let start = AppInstant::now();
    let analysis = analyzer.analyze(previous, &candles);
    if DF.log_worker {
        log::info!(
            "[{}] analyzed {} candle(s) in {:?}",
            correlation_id,
            candles.len(),
            start.elapsed()
        );
    }

    AnalyzerResponse::Analyzed {
        correlation_id,
        kind,
        rows: analysis.rows,
        new_state: analysis.state,
    }
}

/// Serves fetch requests one at a time on a dedicated thread, driving the
/// async store and provider through `handle`.
pub fn spawn_candle_worker<R>(
    handle: Handle,
    engine: GapFillEngine,
    rx: Receiver<CandleRequest>,
    tx: Sender<R>,
) -> JoinHandle<()>
where
    R: From<CandleResponse> + Send + 'static,
{
    thread::spawn(move || {
        while let Ok(req) = rx.recv() {
            let response = handle.block_on(process_candle_request(&engine, req));
            if tx.send(response.into()).is_err() {
                break;
            }
        }
    })
}

pub fn spawn_analyzer_worker<R>(
    analyzer: Analyzer,
    rx: Receiver<AnalyzerRequest>,
    tx: Sender<R>,
) -> JoinHandle<()>
where
    R: From<AnalyzerResponse> + Send + 'static,
{
    thread::spawn(move || {
        while let Ok(req) = rx.recv() {
            let response = process_analyze_request(&analyzer, req);
            if tx.send(response.into()).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::AnalyzerState,
        config::{ANALYSIS, AnalysisConfig},
        data::{MemoryStorage, testing::ScriptedExchange},
        domain::{BucketUnit, SeriesKey},
        engine::messages::CorrelationId,
        utils::TimeUtils,
    };
    use std::{sync::Arc, sync::mpsc::channel, time::Duration};

    const MIN: i64 = TimeUtils::MS_IN_MIN;
    const T0: i64 = 1_700_000_000_000 - 1_700_000_000_000 % TimeUtils::MS_IN_H;

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

    #[test]
    fn update_without_state_is_rejected() {
        let response = process_analyze_request(
            &analyzer(),
            AnalyzerRequest::Analyze {
                correlation_id: "u".into(),
                kind: AnalyzeKind::Update,
                candles: Vec::new(),
                previous_state: None,
            },
        );
        assert!(matches!(
            response,
            AnalyzerResponse::Failed {
                error: EngineError::NotInitialized(_),
                ..
            }
        ));
    }

    #[test]
    fn start_ignores_supplied_state() {
        let candles: Vec<_> = (0..6)
            .map(|m| ScriptedExchange::candle_at(&key(), T0 + m * MIN))
            .collect();
        let warm = analyzer().analyze(None, &candles).state;

        let fresh = process_analyze_request(
            &analyzer(),
            AnalyzerRequest::Analyze {
                correlation_id: "a".into(),
                kind: AnalyzeKind::Start,
                candles: candles.clone(),
                previous_state: None,
            },
        );
        let seeded = process_analyze_request(
            &analyzer(),
            AnalyzerRequest::Analyze {
                correlation_id: "a".into(),
                kind: AnalyzeKind::Start,
                candles,
                previous_state: Some(warm),
            },
        );
        assert_eq!(fresh, seeded);
    }

    #[test]
    fn candle_worker_answers_in_order() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let exchange = Arc::new(ScriptedExchange::new(key(), T0, T0 + 1_000 * MIN, 100));
        let engine = GapFillEngine::new(Arc::new(MemoryStorage::new()), exchange);

        let (req_tx, req_rx) = channel();
        let (resp_tx, resp_rx) = channel::<CandleResponse>();
        let worker = spawn_candle_worker(rt.handle().clone(), engine, req_rx, resp_tx);

        let ids = [CorrelationId::new(), CorrelationId::new()];
        req_tx
            .send(CandleRequest::FetchCandles {
                correlation_id: ids[0].clone(),
                series_key: key(),
                from: T0,
                to: T0 + 30 * MIN,
            })
            .unwrap();
        req_tx
            .send(CandleRequest::FetchCandles {
                correlation_id: ids[1].clone(),
                series_key: key(),
                from: T0 + 10 * MIN,
                to: T0,
            })
            .unwrap();

        let first = resp_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        match first {
            CandleResponse::CandlesFetched {
                correlation_id,
                candles,
            } => {
                assert_eq!(correlation_id, ids[0]);
                assert_eq!(candles.len(), 30);
            }
            other => panic!("unexpected {other:?}"),
        }

        let second = resp_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.correlation_id(), &ids[1]);
        assert!(matches!(
            second,
            CandleResponse::Failed {
                error: EngineError::InvalidRange(_),
                ..
            }
        ));

        drop(req_tx);
        worker.join().unwrap();
    }

    #[test]
    fn analyzer_worker_round_trips_state() {
        let (req_tx, req_rx) = channel();
        let (resp_tx, resp_rx) = channel::<AnalyzerResponse>();
        let worker = spawn_analyzer_worker(analyzer(), req_rx, resp_tx);

        let candles: Vec<_> = (0..10)
            .map(|m| ScriptedExchange::candle_at(&key(), T0 + m * MIN))
            .collect();
        req_tx
            .send(AnalyzerRequest::Analyze {
                correlation_id: "first".into(),
                kind: AnalyzeKind::Start,
                candles: candles[..8].to_vec(),
                previous_state: None,
            })
            .unwrap();
        let AnalyzerResponse::Analyzed { new_state, .. } =
            resp_rx.recv_timeout(Duration::from_secs(5)).unwrap()
        else {
            panic!("start failed");
        };

        req_tx
            .send(AnalyzerRequest::Analyze {
                correlation_id: "second".into(),
                kind: AnalyzeKind::Update,
                candles: candles[8..].to_vec(),
                previous_state: Some(new_state),
            })
            .unwrap();
        let AnalyzerResponse::Analyzed {
            rows, new_state, ..
        } = resp_rx.recv_timeout(Duration::from_secs(5)).unwrap()
        else {
            panic!("update failed");
        };

        let whole = analyzer().analyze(None, &candles);
        assert_eq!(new_state, whole.state);
        assert_eq!(rows.bands.len(), 2);
        assert_ne!(new_state, AnalyzerState::new(&ANALYSIS));

        drop(req_tx);
        worker.join().unwrap();
    }
}

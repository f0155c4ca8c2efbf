mod core;
mod messages;
mod state;
mod worker;

pub use core::{ChartEngine, EngineEvent};
pub use messages::{
    AnalyzeKind, AnalyzerRequest, AnalyzerResponse, CandleRequest, CandleResponse, CorrelationId,
    WorkerResponse,
};
pub use state::{LiveUpdate, SeriesState};
pub use worker::{
    process_analyze_request, process_candle_request, spawn_analyzer_worker, spawn_candle_worker,
};

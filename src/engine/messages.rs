use {
    crate::{
        analysis::{AnalysisRows, AnalyzerState},
        domain::{Candle, SeriesKey},
        error::EngineError,
        utils::Timestamp,
    },
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Pairs a response with the request that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sent to the candle worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CandleRequest {
    #[serde(rename_all = "camelCase")]
    FetchCandles {
        correlation_id: CorrelationId,
        series_key: SeriesKey,
        from: Timestamp,
        to: Timestamp,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CandleResponse {
    #[serde(rename_all = "camelCase")]
    CandlesFetched {
        correlation_id: CorrelationId,
        candles: Vec<Candle>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        correlation_id: CorrelationId,
        error: EngineError,
    },
}

impl CandleResponse {
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            CandleResponse::CandlesFetched { correlation_id, .. }
            | CandleResponse::Failed { correlation_id, .. } => correlation_id,
        }
    }
}

/// `Start` analyzes from scratch; `Update` continues from a previous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzeKind {
    Start,
    Update,
}

/// Sent to the analyzer worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AnalyzerRequest {
    #[serde(rename_all = "camelCase")]
    Analyze {
        correlation_id: CorrelationId,
        kind: AnalyzeKind,
        candles: Vec<Candle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_state: Option<AnalyzerState>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AnalyzerResponse {
    #[serde(rename_all = "camelCase")]
    Analyzed {
        correlation_id: CorrelationId,
        kind: AnalyzeKind,
        rows: AnalysisRows,
        new_state: AnalyzerState,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        correlation_id: CorrelationId,
        error: EngineError,
    },
}

impl AnalyzerResponse {
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            AnalyzerResponse::Analyzed { correlation_id, .. }
            | AnalyzerResponse::Failed { correlation_id, .. } => correlation_id,
        }
    }
}

/// Anything a worker can send back, so callers can wait on a single channel.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    Candles(CandleResponse),
    Analysis(AnalyzerResponse),
}

impl From<CandleResponse> for WorkerResponse {
    fn from(response: CandleResponse) -> Self {
        WorkerResponse::Candles(response)
    }
}

impl From<AnalyzerResponse> for WorkerResponse {
    fn from(response: AnalyzerResponse) -> Self {
        WorkerResponse::Analysis(response)
    }
}

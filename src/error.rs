//! Error types surfaced by the gap-fill engine and the indicator pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Range;

/// Failures that cross a worker boundary, so they stay `Clone` and serializable.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum EngineError {
    /// The remote source failed while backfilling `range`.
    #[error("Fetch failed for {series_key} in {range}: {message}")]
    #[serde(rename_all = "camelCase")]
    FetchFailed {
        series_key: String,
        range: Range,
        message: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// An incremental calculator was asked for a value before its warm-up completed.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// An exported calculator state could not be restored.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A worker thread has gone away.
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// `from > to`, or a series key that does not parse.
    #[error("Invalid range: {0}")]
    InvalidRange(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

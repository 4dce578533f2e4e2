//! Error types for holidays-sync.
//!
//! Fetch and parse errors are per-country and recoverable; the orchestrator
//! skips the country and carries on. Store errors end the sync attempt.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain one country's payload from the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No connectivity, DNS failure, refused connection or timeout.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The API answered with something other than 200.
    #[error("server returned status {status}")]
    ServerError { status: u16 },

    /// 200 with a zero-length body.
    #[error("server returned an empty body")]
    EmptyResponse,

    /// The request was never sent because its parameters were invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure to turn a payload into holiday records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("holiday entry {index} under '{group}' is missing `{field}`")]
    MissingField {
        field: &'static str,
        group: String,
        index: usize,
    },
}

/// The persistence layer could not complete an operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("store unavailable: I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot (de)serialization error.
    #[error("store unavailable: snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Errors from wiring the engine together (opening the store, reading settings).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] holidays_core::SettingsError),
}

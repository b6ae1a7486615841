use std::time::Duration;

use thiserror::Error;

/// Failure to turn a raw record payload into JSON.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure talking to the seen registry. A conditional check failure is not
/// an error and never surfaces here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("seen registry unavailable: {0}")]
    Unavailable(String),
    #[error("seen registry call timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything that can make a single raw record fail. Scoped to that record only.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),
    #[error(transparent)]
    RegistryUnavailable(#[from] RegistryError),
}

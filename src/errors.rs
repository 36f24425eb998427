//! Error types for the matching core.
//!
//! Only `ConfigError` is ever returned as an `Err` from the public API.
//! `ValidationError` and `FetchError` are converted by the orchestrator into
//! result states and audit entries, so callers branch on `MatchResult`
//! instead of handling errors per track.

use std::time::Duration;

use thiserror::Error;

/// Malformed input track. Fatal for that track only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("track title is empty")]
    EmptyTitle,
    #[error("track bpm is not a positive finite number: {0}")]
    InvalidBpm(f64),
    #[error("track year is out of range: {0}")]
    InvalidYear(i32),
}

/// Failure reported by (or on behalf of) the fetch collaborator.
/// Always recoverable: recorded in the audit trail, never propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("fetch timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },
    #[error("catalog backend error: {0}")]
    Backend(String),
    #[error("fetch collaborator panicked: {0}")]
    Panicked(String),
}

impl From<rusqlite::Error> for FetchError {
    fn from(e: rusqlite::Error) -> Self {
        FetchError::Backend(e.to_string())
    }
}

/// Rejected `MatchConfig` field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("n-gram window is invalid: k_min={k_min}, k_max={k_max} (need 1 <= k_min <= k_max)")]
    InvalidWindow { k_min: usize, k_max: usize },
    #[error("early_exit_score_threshold must be within [0, 100], got {0}")]
    InvalidThreshold(f64),
    #[error("{field} must be at least 1")]
    ZeroLimit { field: &'static str },
    #[error("fetch_timeout_ms must be positive")]
    ZeroTimeout,
    #[error("score weight `{field}` is invalid: {value}")]
    InvalidWeight { field: &'static str, value: f64 },
    #[error("key adjacency table entry `{0}` is not a recognised key")]
    UnknownKey(String),
    #[error("mix keyword table contains an empty keyword")]
    EmptyKeyword,
    #[error("stopword list contains an empty entry")]
    EmptyStopword,
}

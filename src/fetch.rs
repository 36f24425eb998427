//! The candidate-fetch capability consumed by the orchestrator.
//!
//! Implementations own all network / catalog concerns (HTTP, parsing,
//! caching, retry and backoff). The orchestrator only observes success or
//! failure per query, so a fetcher must not retry silently past `timeout`.

use std::time::Duration;

use crate::errors::FetchError;
use crate::models::Candidate;

/// Shared by every orchestrator run on a playlist, so it must be safe for
/// concurrent use.
pub trait CandidateFetcher: Send + Sync {
    fn fetch(&self, query: &str, timeout: Duration) -> Result<Vec<Candidate>, FetchError>;
}

impl<F> CandidateFetcher for F
where
    F: Fn(&str, Duration) -> Result<Vec<Candidate>, FetchError> + Send + Sync,
{
    fn fetch(&self, query: &str, timeout: Duration) -> Result<Vec<Candidate>, FetchError> {
        self(query, timeout)
    }
}

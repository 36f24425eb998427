//! Per-track query loop with early exit.
//!
//! State machine:
//! `Idle -> Querying(i) -> Evaluating(i) -> {Querying(i+1) | EarlyExit(i) | Exhausted | Cancelled}`,
//! or `Idle -> Error` when the track fails validation.
//!
//! Queries run strictly in priority order. Fetch failures (errors, panics,
//! late responses) become audit entries and never abort the track.
//! Cancellation is checked only between queries.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::MatchConfig;
use crate::errors::{ConfigError, FetchError, ValidationError};
use crate::fetch::CandidateFetcher;
use crate::mix::MixParser;
use crate::models::{
    Candidate, ConfidenceLabel, MatchResult, MatchStatus, MixInfo, NormalizedTrack, Query,
    QueryAudit, ScoredCandidate, Track,
};
use crate::normalize::TextNormalizer;
use crate::query::QueryGenerator;
use crate::scoring::ScoringEngine;
use crate::telemetry::{QueryEvent, TelemetrySink};

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Idle,
    Querying(usize),
    Evaluating(usize),
    EarlyExit(usize),
    Exhausted,
    Cancelled,
    Error,
}

impl MatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MatchState::EarlyExit(_) | MatchState::Exhausted | MatchState::Cancelled | MatchState::Error
        )
    }
}

/// Reject tracks the core cannot match.
pub fn validate_track(track: &Track) -> Result<(), ValidationError> {
    if track.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if let Some(bpm) = track.bpm {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ValidationError::InvalidBpm(bpm));
        }
    }
    if let Some(year) = track.year {
        if !(1..=9999).contains(&year) {
            return Err(ValidationError::InvalidYear(year));
        }
    }
    Ok(())
}

/// Everything derived from a track before the first query.
#[derive(Debug, Clone)]
pub struct MatchPlan {
    pub normalized: NormalizedTrack,
    pub mix_info: MixInfo,
    pub queries: Vec<Query>,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct MatchOrchestrator<'a> {
    config: MatchConfig,
    normalizer: TextNormalizer,
    parser: MixParser,
    generator: QueryGenerator,
    engine: ScoringEngine,
    fetcher: &'a dyn CandidateFetcher,
    telemetry: Option<&'a dyn TelemetrySink>,
}

impl<'a> MatchOrchestrator<'a> {
    /// Validate the configuration and bind the fetch capability.
    pub fn new(config: MatchConfig, fetcher: &'a dyn CandidateFetcher) -> Result<Self, ConfigError> {
        config.validate()?;
        let normalizer = TextNormalizer::new(&config.stopwords);
        let parser = MixParser::new(&config.mix_keyword_table);
        let engine = ScoringEngine::from_config(&config)?;
        Ok(Self {
            generator: QueryGenerator::new(normalizer.clone()),
            normalizer,
            parser,
            engine,
            config,
            fetcher,
            telemetry: None,
        })
    }

    pub fn with_telemetry(mut self, sink: &'a dyn TelemetrySink) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Validate and derive the normalized track, mix info and query list.
    pub fn plan(&self, track: &Track) -> Result<MatchPlan, ValidationError> {
        validate_track(track)?;
        let mix_info = self.parser.parse(&track.title);
        let normalized = NormalizedTrack::build(track, &mix_info, &self.normalizer);
        let queries = self.generator.make_queries(
            &normalized,
            &mix_info,
            self.config.k_min,
            self.config.k_max,
        );
        let queries = QueryGenerator::limit(queries, self.config.max_queries_per_track);
        Ok(MatchPlan { normalized, mix_info, queries })
    }

    /// Match one track. Always returns exactly one result.
    pub fn run(&self, track: &Track, cancel: &CancellationToken) -> MatchResult {
        self.run_observed(track, cancel, |_| {})
    }

    /// `run`, reporting every state the machine enters to `on_state`.
    pub fn run_observed<F>(&self, track: &Track, cancel: &CancellationToken, mut on_state: F) -> MatchResult
    where
        F: FnMut(MatchState),
    {
        let mut enter = |state: MatchState| {
            if state.is_terminal() {
                debug!(track = %track.title, ?state, "match finished");
            } else {
                trace!(track = %track.title, ?state, "state");
            }
            on_state(state);
        };
        enter(MatchState::Idle);

        let plan = match self.plan(track) {
            Ok(plan) => plan,
            Err(e) => {
                debug!(track = %track.title, error = %e, "track rejected");
                enter(MatchState::Error);
                return MatchResult::invalid(e.to_string());
            }
        };
        let MatchPlan { normalized, mix_info, queries } = plan;
        let eligible = mix_info.is_early_exit_eligible();
        let timeout = self.config.fetch_timeout();

        let mut all_candidates: Vec<ScoredCandidate> = Vec::new();
        let mut queries_audit: Vec<QueryAudit> = Vec::with_capacity(queries.len());
        let mut best: Option<usize> = None;
        let mut evaluated = 0usize;
        let mut early_exit_query_index = None;
        let mut cancelled = false;

        for (i, query) in queries.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            enter(MatchState::Querying(i));

            let started = Instant::now();
            let outcome = self.fetch_guarded(&query.text, timeout);
            let elapsed = started.elapsed();
            let outcome = match outcome {
                Ok(_) if elapsed > timeout => Err(FetchError::Timeout { elapsed, limit: timeout }),
                other => other,
            };

            enter(MatchState::Evaluating(i));
            let audit = match outcome {
                Ok(candidates) => {
                    let found = candidates.len();
                    let take = found.min(self.config.max_candidates_per_query);
                    for candidate in &candidates[..take] {
                        let scored = self.engine.score(&normalized, &mix_info, candidate, i);
                        // Strictly greater: earlier discoveries win ties
                        let better = best.map_or(true, |b| scored.total_score > all_candidates[b].total_score);
                        if better {
                            best = Some(all_candidates.len());
                        }
                        all_candidates.push(scored);
                    }
                    evaluated += take;
                    debug!(
                        query = %query.text,
                        query_type = query.query_type.as_str(),
                        found,
                        scored = take,
                        "query complete"
                    );
                    QueryAudit {
                        query: query.text.clone(),
                        query_type: query.query_type,
                        candidates_found: found,
                        candidates_scored: take,
                        failed: false,
                        error: None,
                        elapsed_ms: elapsed.as_millis() as u64,
                    }
                }
                Err(e) => {
                    warn!(query = %query.text, error = %e, "fetch failed");
                    QueryAudit {
                        query: query.text.clone(),
                        query_type: query.query_type,
                        candidates_found: 0,
                        candidates_scored: 0,
                        failed: true,
                        error: Some(e.to_string()),
                        elapsed_ms: elapsed.as_millis() as u64,
                    }
                }
            };

            if let Some(sink) = self.telemetry {
                sink.record(&QueryEvent {
                    track_title: track.title.clone(),
                    query_text: audit.query.clone(),
                    query_type: audit.query_type,
                    query_index: i,
                    execution_time: elapsed,
                    candidates_found: audit.candidates_found,
                    failed: audit.failed,
                });
            }
            queries_audit.push(audit);

            if let Some(b) = best.map(|b| &all_candidates[b]) {
                if eligible
                    && b.confidence_label == ConfidenceLabel::Exact
                    && b.total_score >= self.config.early_exit_score_threshold
                    && evaluated >= self.config.min_candidates_for_early_exit
                {
                    info!(
                        track = %track.title,
                        query_index = i,
                        score = b.total_score,
                        confidence = b.confidence_label.as_str(),
                        skipped = queries.len() - i - 1,
                        "early exit"
                    );
                    early_exit_query_index = Some(i);
                    break;
                }
            }
        }

        let best = best.map(|b| all_candidates[b].clone());
        let status = if cancelled {
            enter(MatchState::Cancelled);
            MatchStatus::Cancelled
        } else {
            match early_exit_query_index {
                Some(i) => enter(MatchState::EarlyExit(i)),
                None => enter(MatchState::Exhausted),
            }
            if best.is_some() {
                MatchStatus::Matched
            } else {
                MatchStatus::Unmatched
            }
        };

        MatchResult {
            status,
            best,
            all_candidates,
            queries_audit,
            queries_planned: queries.len(),
            early_exit: early_exit_query_index.is_some(),
            early_exit_query_index,
            error: None,
        }
    }

    /// Call the collaborator, converting a panic into a fetch failure.
    fn fetch_guarded(&self, query: &str, timeout: Duration) -> Result<Vec<Candidate>, FetchError> {
        catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch(query, timeout))).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(FetchError::Panicked(message))
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchStatus, QueryType};
    use crate::telemetry::QueryMetrics;
    use std::sync::atomic::AtomicUsize;

    type FetchResult = Result<Vec<Candidate>, FetchError>;

    fn ghosts_track() -> Track {
        Track::new("Ghosts n Stuff (Original Mix)", "deadmau5")
            .with_key("A Minor")
            .with_year(2008)
    }

    fn perfect_ghosts(url: &str) -> Candidate {
        Candidate {
            title: "Ghosts n Stuff (Original Mix)".to_string(),
            artists: vec!["deadmau5".to_string()],
            label: Some("mau5trap".to_string()),
            release_year: Some(2008),
            key: Some("8A".to_string()),
            bpm: Some(128.0),
            url: url.to_string(),
        }
    }

    fn plain(title: &str, url: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            artists: vec!["deadmau5".to_string()],
            url: url.to_string(),
            ..Candidate::default()
        }
    }

    #[test]
    fn test_failures_then_perfect_match_exits_early() {
        let calls = AtomicUsize::new(0);
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(FetchError::Backend("503".to_string())),
                _ => Ok(vec![perfect_ghosts("https://catalog.example/ghosts")]),
            }
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let result = orch.run(&ghosts_track(), &CancellationToken::new());

        assert_eq!(result.queries_planned, 4);
        assert_eq!(result.queries_audit.len(), 3);
        assert!(result.queries_audit[0].failed);
        assert!(result.queries_audit[1].failed);
        assert!(!result.queries_audit[2].failed);
        assert_eq!(result.queries_audit[2].candidates_found, 1);
        assert_eq!(result.status, MatchStatus::Matched);
        assert!(result.early_exit);
        assert_eq!(result.early_exit_query_index, Some(2));
        assert_eq!(result.queries_skipped(), 1);
        let best = result.best.unwrap();
        assert_eq!(best.total_score, 100.0);
        assert_eq!(best.query_index, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_state_sequence() {
        let calls = AtomicUsize::new(0);
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(FetchError::Backend("503".to_string())),
                _ => Ok(vec![perfect_ghosts("https://catalog.example/ghosts")]),
            }
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let mut states = Vec::new();
        orch.run_observed(&ghosts_track(), &CancellationToken::new(), |s| states.push(s));
        assert_eq!(
            states,
            vec![
                MatchState::Idle,
                MatchState::Querying(0),
                MatchState::Evaluating(0),
                MatchState::Querying(1),
                MatchState::Evaluating(1),
                MatchState::Querying(2),
                MatchState::Evaluating(2),
                MatchState::EarlyExit(2),
            ]
        );
        assert!(states.last().unwrap().is_terminal());
        assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!MatchState::Idle.is_terminal());
        assert!(!MatchState::Querying(0).is_terminal());
        assert!(!MatchState::Evaluating(3).is_terminal());
        assert!(MatchState::EarlyExit(1).is_terminal());
        assert!(MatchState::Exhausted.is_terminal());
        assert!(MatchState::Cancelled.is_terminal());
        assert!(MatchState::Error.is_terminal());
    }

    #[test]
    fn test_empty_title_is_error_without_queries() {
        let calls = AtomicUsize::new(0);
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let result = orch.run(&Track::new("", "deadmau5"), &CancellationToken::new());
        assert_eq!(result.status, MatchStatus::Error);
        assert!(result.queries_audit.is_empty());
        assert!(result.error.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut states = Vec::new();
        orch.run_observed(&Track::new("   ", ""), &CancellationToken::new(), |s| states.push(s));
        assert_eq!(states, vec![MatchState::Idle, MatchState::Error]);
    }

    #[test]
    fn test_invalid_bpm_and_year_rejected() {
        assert_eq!(
            validate_track(&Track::new("Strobe", "deadmau5").with_bpm(-1.0)),
            Err(ValidationError::InvalidBpm(-1.0))
        );
        assert_eq!(
            validate_track(&Track::new("Strobe", "deadmau5").with_year(0)),
            Err(ValidationError::InvalidYear(0))
        );
        assert!(validate_track(&Track::new("Strobe", "").with_bpm(128.0).with_year(2009)).is_ok());
    }

    #[test]
    fn test_zero_candidates_everywhere_is_unmatched() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult { Ok(Vec::new()) };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let result = orch.run(&ghosts_track(), &CancellationToken::new());
        assert_eq!(result.status, MatchStatus::Unmatched);
        assert!(result.best.is_none());
        assert!(!result.early_exit);
        assert_eq!(result.early_exit_query_index, None);
        assert_eq!(result.queries_audit.len(), result.queries_planned);
        assert!(result.queries_audit.iter().all(|a| !a.failed && a.candidates_found == 0));
    }

    #[test]
    fn test_perfect_first_hit_skips_remaining_queries() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            Ok(vec![perfect_ghosts("https://catalog.example/ghosts")])
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let result = orch.run(&ghosts_track(), &CancellationToken::new());
        assert!(result.early_exit);
        assert_eq!(result.early_exit_query_index, Some(0));
        assert_eq!(result.queries_audit.len(), 1);
        assert!(result.queries_audit.len() < result.queries_planned);
    }

    #[test]
    fn test_unparseable_mix_never_exits_early() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            let mut c = plain("Strobe", "https://catalog.example/strobe");
            c.key = Some("8A".to_string());
            c.release_year = Some(2009);
            Ok(vec![c])
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let track = Track::new("Strobe (Tech Mix)", "deadmau5").with_key("8A").with_year(2009);
        let result = orch.run(&track, &CancellationToken::new());
        assert_eq!(result.status, MatchStatus::Matched);
        assert!(!result.early_exit);
        assert_eq!(result.best.as_ref().unwrap().confidence_label, ConfidenceLabel::Exact);
        assert_eq!(result.queries_audit.len(), result.queries_planned);
    }

    #[test]
    fn test_min_candidates_for_early_exit() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            Ok(vec![perfect_ghosts("https://catalog.example/ghosts")])
        };
        let config = MatchConfig { min_candidates_for_early_exit: 2, ..MatchConfig::default() };
        let orch = MatchOrchestrator::new(config, &fetcher).unwrap();
        let result = orch.run(&ghosts_track(), &CancellationToken::new());
        assert_eq!(result.early_exit_query_index, Some(1));
        // Same candidate discovered twice; the first discovery stays best
        assert_eq!(result.best.unwrap().query_index, 0);
    }

    #[test]
    fn test_cancel_before_start() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult { Ok(Vec::new()) };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = orch.run(&ghosts_track(), &token);
        assert_eq!(result.status, MatchStatus::Cancelled);
        assert!(result.queries_audit.is_empty());
    }

    #[test]
    fn test_cancel_mid_fetch_keeps_in_flight_result() {
        let token = CancellationToken::new();
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            token.cancel();
            Ok(vec![plain("Ghosts n Stuff", "https://catalog.example/1")])
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let result = orch.run(&ghosts_track(), &token);
        assert_eq!(result.status, MatchStatus::Cancelled);
        assert_eq!(result.queries_audit.len(), 1);
        assert_eq!(result.all_candidates.len(), 1);
        assert!(result.best.is_some());
        assert!(!result.early_exit);
    }

    #[test]
    fn test_panicking_fetcher_is_a_failure() {
        let calls = AtomicUsize::new(0);
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("catalog client exploded");
            }
            Ok(Vec::new())
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let result = orch.run(&ghosts_track(), &CancellationToken::new());
        assert_eq!(result.status, MatchStatus::Unmatched);
        assert!(result.queries_audit[0].failed);
        let error = result.queries_audit[0].error.as_deref().unwrap();
        assert!(error.contains("catalog client exploded"), "{}", error);
        assert_eq!(result.queries_audit.len(), result.queries_planned);
    }

    #[test]
    fn test_late_response_counts_as_timeout() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            std::thread::sleep(Duration::from_millis(30));
            Ok(vec![perfect_ghosts("https://catalog.example/ghosts")])
        };
        let config = MatchConfig { fetch_timeout_ms: 1, ..MatchConfig::default() };
        let orch = MatchOrchestrator::new(config, &fetcher).unwrap();
        let result = orch.run(&Track::new("Strobe", "deadmau5"), &CancellationToken::new());
        assert_eq!(result.status, MatchStatus::Unmatched);
        assert!(result.all_candidates.is_empty());
        assert!(result.queries_audit.iter().all(|a| a.failed));
        assert!(result.queries_audit[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_candidates_truncated_per_query() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            Ok((0..5)
                .map(|i| plain("Unrelated Song", &format!("https://catalog.example/{i}")))
                .collect())
        };
        let config = MatchConfig { max_candidates_per_query: 2, ..MatchConfig::default() };
        let orch = MatchOrchestrator::new(config, &fetcher).unwrap();
        let result = orch.run(&Track::new("Strobe", "deadmau5"), &CancellationToken::new());
        assert_eq!(result.queries_audit[0].candidates_found, 5);
        assert_eq!(result.queries_audit[0].candidates_scored, 2);
        assert_eq!(result.all_candidates.len(), 2 * result.queries_audit.len());
    }

    #[test]
    fn test_ties_keep_first_discovered() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult {
            Ok(vec![
                plain("Strobe Something", "https://catalog.example/first"),
                plain("Strobe Something", "https://catalog.example/second"),
            ])
        };
        let orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let result = orch.run(&Track::new("Strobe", "deadmau5"), &CancellationToken::new());
        assert_eq!(result.best.unwrap().candidate.url, "https://catalog.example/first");
    }

    #[test]
    fn test_query_limit_applied() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult { Ok(Vec::new()) };
        let config = MatchConfig { max_queries_per_track: 2, ..MatchConfig::default() };
        let orch = MatchOrchestrator::new(config, &fetcher).unwrap();
        let result = orch.run(&ghosts_track(), &CancellationToken::new());
        assert_eq!(result.queries_planned, 2);
        assert_eq!(result.queries_audit[0].query_type, QueryType::Priority);
        assert_eq!(result.queries_audit[1].query_type, QueryType::TitleOnly);
    }

    #[test]
    fn test_telemetry_does_not_change_result() {
        let fetcher = |q: &str, _t: Duration| -> FetchResult {
            if q.contains("stuff") {
                Ok(vec![plain("Ghosts n Stuff", "https://catalog.example/1")])
            } else {
                Err(FetchError::Backend("down".to_string()))
            }
        };
        let metrics = QueryMetrics::new();
        let plain_orch = MatchOrchestrator::new(MatchConfig::default(), &fetcher).unwrap();
        let observed = MatchOrchestrator::new(MatchConfig::default(), &fetcher)
            .unwrap()
            .with_telemetry(&metrics);

        let mut a = plain_orch.run(&ghosts_track(), &CancellationToken::new());
        let mut b = observed.run(&ghosts_track(), &CancellationToken::new());
        // Timings differ between runs
        let zero = |r: &mut MatchResult| r.queries_audit.iter_mut().for_each(|q| q.elapsed_ms = 0);
        zero(&mut a);
        zero(&mut b);
        assert_eq!(a, b);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_attempts, b.queries_audit.len());
        assert_eq!(snap.total_failures, b.queries_audit.iter().filter(|q| q.failed).count());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fetcher = |_q: &str, _t: Duration| -> FetchResult { Ok(Vec::new()) };
        let config = MatchConfig { k_min: 5, k_max: 1, ..MatchConfig::default() };
        assert!(MatchOrchestrator::new(config, &fetcher).is_err());
    }
}

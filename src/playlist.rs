//! Playlist-level matching on a bounded worker pool.
//!
//! Each track gets its own orchestrator run; runs share nothing but the
//! fetch capability (and telemetry sink) bound to the orchestrator.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::models::{ConfidenceLabel, MatchResult, MatchStatus, Track};
use crate::orchestrator::{CancellationToken, MatchOrchestrator};
use crate::progress::tick;

/// How often hidden progress bars emit a log line
const PROGRESS_LOG_INTERVAL: u64 = 100;

/// Match every track, returning results in playlist order.
///
/// `workers == 0` uses rayon's default (one thread per core). Tracks not
/// yet started when `cancel` fires still get a `Cancelled` result.
pub fn match_playlist(
    orchestrator: &MatchOrchestrator<'_>,
    tracks: &[Track],
    workers: usize,
    cancel: &CancellationToken,
    progress: Option<&ProgressBar>,
) -> Result<Vec<MatchResult>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to build matching thread pool")?;

    let results: Vec<MatchResult> = pool.install(|| {
        tracks
            .par_iter()
            .map(|track| {
                let result = orchestrator.run(track, cancel);
                if let Some(pb) = progress {
                    tick(pb, "match", PROGRESS_LOG_INTERVAL);
                }
                result
            })
            .collect()
    });
    Ok(results)
}

// ============================================================================
// Matching Statistics
// ============================================================================

/// Aggregate statistics for one playlist run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchingStats {
    pub total_tracks: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub errors: usize,
    pub cancelled: usize,

    // Query economy
    pub early_exits: usize,
    pub queries_planned: usize,
    pub queries_issued: usize,
    pub queries_failed: usize,
    pub queries_skipped: usize,

    // Best-candidate confidence
    pub confidence_exact: usize,
    pub confidence_high: usize,
    pub confidence_medium: usize,
    pub confidence_low: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl MatchingStats {
    pub fn from_results(results: &[MatchResult], elapsed: Duration) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.record(result);
        }
        stats.elapsed_seconds = elapsed.as_secs_f64();
        stats
    }

    pub fn record(&mut self, result: &MatchResult) {
        self.total_tracks += 1;
        match result.status {
            MatchStatus::Matched => self.matched += 1,
            MatchStatus::Unmatched => self.unmatched += 1,
            MatchStatus::Error => self.errors += 1,
            MatchStatus::Cancelled => self.cancelled += 1,
        }
        if result.early_exit {
            self.early_exits += 1;
        }
        self.queries_planned += result.queries_planned;
        self.queries_issued += result.queries_audit.len();
        self.queries_failed += result.queries_audit.iter().filter(|q| q.failed).count();
        self.queries_skipped += result.queries_skipped();

        match result.confidence() {
            Some(ConfidenceLabel::Exact) => self.confidence_exact += 1,
            Some(ConfidenceLabel::High) => self.confidence_high += 1,
            Some(ConfidenceLabel::Medium) => self.confidence_medium += 1,
            Some(ConfidenceLabel::Low) => self.confidence_low += 1,
            None => {}
        }
    }

    /// Calculate match rate as a percentage
    pub fn match_rate(&self) -> f64 {
        if self.total_tracks == 0 {
            0.0
        } else {
            100.0 * self.matched as f64 / self.total_tracks as f64
        }
    }

    /// Share of planned queries never sent, as a percentage
    pub fn query_savings(&self) -> f64 {
        if self.queries_planned == 0 {
            0.0
        } else {
            100.0 * self.queries_skipped as f64 / self.queries_planned as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
        Ok(())
    }
}

/// Run a playlist and collect its stats in one call.
pub fn match_playlist_with_stats(
    orchestrator: &MatchOrchestrator<'_>,
    tracks: &[Track],
    workers: usize,
    cancel: &CancellationToken,
    progress: Option<&ProgressBar>,
) -> Result<(Vec<MatchResult>, MatchingStats)> {
    let start = Instant::now();
    let results = match_playlist(orchestrator, tracks, workers, cancel, progress)?;
    let stats = MatchingStats::from_results(&results, start.elapsed());
    Ok((results, stats))
}

// ============================================================================
// TESTS
// ============================================================================

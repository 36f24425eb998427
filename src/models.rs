//! Core data models for playlist-to-catalog matching.
//!
//! This module contains the input, intermediate and result types shared by
//! the normalizer, mix parser, query generator, scoring engine and
//! orchestrator.

use serde::{Deserialize, Serialize};

// ============================================================================
// Input Models
// ============================================================================

/// Playlist entry to resolve. Caller-owned and never mutated by the core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    /// Possibly multi-value, e.g. "Dimitri Vegas & Like Mike, Tiësto"
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub year: Option<i32>,
    /// Free-form key, e.g. "A Minor", "8A", "F# maj"
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub bpm: Option<f64>,
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }
}

// ============================================================================
// Mix Models
// ============================================================================

/// Release edit classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixType {
    Original,
    Extended,
    RadioEdit,
    Remix,
    Dub,
    Vip,
    Unknown,
}

impl MixType {
    /// Canonical annotation text, e.g. "Original Mix".
    pub fn label(self) -> &'static str {
        match self {
            MixType::Original => "Original Mix",
            MixType::Extended => "Extended Mix",
            MixType::RadioEdit => "Radio Edit",
            MixType::Remix => "Remix",
            MixType::Dub => "Dub",
            MixType::Vip => "VIP",
            MixType::Unknown => "Unknown Mix",
        }
    }

    /// Types that credit a remixer and deserve their own queries.
    pub fn is_remix_like(self) -> bool {
        matches!(self, MixType::Remix | MixType::Dub | MixType::Vip)
    }
}

/// Result of parsing a title's mix annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MixInfo {
    pub mix_type: MixType,
    /// Order-preserving, case-insensitively unique
    pub remixer_names: Vec<String>,
    pub clean_title: String,
    /// True when two phrases imply conflicting mix types
    pub ambiguous: bool,
    /// Raw annotation text as found in the title (None = untagged title)
    pub phrase: Option<String>,
}

// ============================================================================
// Normalized Track
// ============================================================================

/// Normalized view of a `Track`, computed once per match run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTrack {
    /// Clean title as written (mix phrase removed), used for query text
    pub clean_title: String,
    /// Primary artist as written; empty when the artist field is degenerate
    pub primary_artist: String,
    /// Credited artists as written, in order
    pub artists: Vec<String>,
    /// Credited artists followed by remixers, case-insensitively unique
    pub merged_artists: Vec<String>,
    pub title_norm: String,
    pub title_tokens: Vec<String>,
    /// Credited artists, normalized and space-joined
    pub artist_norm: String,
    /// Merged artists, normalized and space-joined
    pub merged_artist_norm: String,
    pub year: Option<i32>,
    pub key: Option<String>,
    pub bpm: Option<f64>,
}

impl NormalizedTrack {
    pub fn has_artist(&self) -> bool {
        !self.primary_artist.is_empty()
    }
}

// ============================================================================
// Query Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Priority,
    Remix,
    NGram,
    TitleOnly,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Priority => "priority",
            QueryType::Remix => "remix",
            QueryType::NGram => "n_gram",
            QueryType::TitleOnly => "title_only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    pub text: String,
    /// Lower is tried first; equals the position in the query list
    pub priority_index: usize,
    pub query_type: QueryType,
}

// ============================================================================
// Candidate Models
// ============================================================================

/// Catalog record returned by the fetch collaborator.
/// Only `title` and `url` are guaranteed; absent metadata stays `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub bpm: Option<f64>,
    pub url: String,
}

/// Categorical confidence bucket derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    /// score >= 95, early-exit eligible
    Exact,
    /// 85 <= score < 95
    High,
    /// 70 <= score < 85
    Medium,
    /// score < 70, flag for manual review
    Low,
}

impl ConfidenceLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLabel::Exact => "exact",
            ConfidenceLabel::High => "high",
            ConfidenceLabel::Medium => "medium",
            ConfidenceLabel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// 0.0 to 1.0
    pub text_similarity: f64,
    pub key_bonus: f64,
    pub year_bonus: f64,
    /// Negative on a clear mix mismatch
    pub mix_bonus: f64,
    /// Always within [0, 100]
    pub total_score: f64,
    pub confidence_label: ConfidenceLabel,
    /// Index of the query that surfaced this candidate
    pub query_index: usize,
}

// ============================================================================
// Result Models
// ============================================================================

/// One query attempt in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAudit {
    pub query: String,
    pub query_type: QueryType,
    /// Raw count returned by the collaborator (0 when failed)
    pub candidates_found: usize,
    /// Count actually scored after `max_candidates_per_query`
    pub candidates_scored: usize,
    pub failed: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Unmatched,
    Error,
    Cancelled,
}

/// Outcome of matching a single track. Every track yields exactly one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub status: MatchStatus,
    pub best: Option<ScoredCandidate>,
    /// In discovery order (query order, then result order)
    pub all_candidates: Vec<ScoredCandidate>,
    pub queries_audit: Vec<QueryAudit>,
    pub queries_planned: usize,
    pub early_exit: bool,
    /// Some only when `early_exit` is true
    pub early_exit_query_index: Option<usize>,
    /// Validation message when `status == Error`
    pub error: Option<String>,
}

impl MatchResult {
    pub fn invalid(message: String) -> Self {
        Self {
            status: MatchStatus::Error,
            best: None,
            all_candidates: Vec::new(),
            queries_audit: Vec::new(),
            queries_planned: 0,
            early_exit: false,
            early_exit_query_index: None,
            error: Some(message),
        }
    }

    pub fn confidence(&self) -> Option<ConfidenceLabel> {
        self.best.as_ref().map(|b| b.confidence_label)
    }

    /// Queries planned but never sent (early exit or cancellation)
    pub fn queries_skipped(&self) -> usize {
        self.queries_planned.saturating_sub(self.queries_audit.len())
    }
}

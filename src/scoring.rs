//! Candidate scoring.
//!
//! The composite score is built from four components:
//! - Text similarity of clean title + artists (best artist variant on each side)
//! - Key bonus (exact or harmonically near)
//! - Year bonus (exact or off by one)
//! - Mix bonus (matching edit, or a penalty for the wrong edit)
//!
//! Scoring is pure: the same (track, candidate) pair always yields the same
//! `ScoredCandidate`.

use crate::config::{MatchConfig, ScoreWeights};
use crate::errors::ConfigError;
use crate::keys::{KeyAdjacency, KeyRelation};
use crate::mix::{merge_with_artists, MixParser};
use crate::models::{
    Candidate, ConfidenceLabel, MixInfo, MixType, NormalizedTrack, ScoredCandidate,
};
use crate::normalize::{token_similarity, TextNormalizer};

// ============================================================================
// Confidence Bands
// ============================================================================

pub const EXACT_THRESHOLD: f64 = 95.0;
pub const HIGH_THRESHOLD: f64 = 85.0;
pub const MEDIUM_THRESHOLD: f64 = 70.0;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

pub fn confidence_label(total_score: f64) -> ConfidenceLabel {
    if total_score >= EXACT_THRESHOLD {
        ConfidenceLabel::Exact
    } else if total_score >= HIGH_THRESHOLD {
        ConfidenceLabel::High
    } else if total_score >= MEDIUM_THRESHOLD {
        ConfidenceLabel::Medium
    } else {
        ConfidenceLabel::Low
    }
}

// ============================================================================
// Scoring Engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    normalizer: TextNormalizer,
    parser: MixParser,
    adjacency: KeyAdjacency,
    weights: ScoreWeights,
}

impl ScoringEngine {
    pub fn new(
        normalizer: TextNormalizer,
        parser: MixParser,
        adjacency: KeyAdjacency,
        weights: ScoreWeights,
    ) -> Self {
        Self { normalizer, parser, adjacency, weights }
    }

    pub fn from_config(config: &MatchConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            TextNormalizer::new(&config.stopwords),
            MixParser::new(&config.mix_keyword_table),
            KeyAdjacency::from_table(&config.key_adjacency_table)?,
            config.weights.clone(),
        ))
    }

    /// Score one candidate against the track. `query_index` is the query
    /// that surfaced it and only feeds tie-breaking downstream.
    pub fn score(
        &self,
        track: &NormalizedTrack,
        mix_info: &MixInfo,
        candidate: &Candidate,
        query_index: usize,
    ) -> ScoredCandidate {
        let candidate_mix = self.parser.parse(&candidate.title);

        let text_similarity = self.text_similarity(track, candidate, &candidate_mix);
        let key_bonus = self.key_bonus(track.key.as_deref(), candidate.key.as_deref());
        let year_bonus = self.year_bonus(track.year, candidate.release_year);
        let mix_bonus = self.mix_bonus(mix_info, &candidate_mix);

        let raw = self.weights.text * text_similarity + key_bonus + year_bonus + mix_bonus;
        let total_score = if raw.is_finite() {
            raw.clamp(MIN_SCORE, MAX_SCORE)
        } else {
            MIN_SCORE
        };
        debug_assert!((MIN_SCORE..=MAX_SCORE).contains(&total_score));

        ScoredCandidate {
            candidate: candidate.clone(),
            text_similarity,
            key_bonus,
            year_bonus,
            mix_bonus,
            total_score,
            confidence_label: confidence_label(total_score),
            query_index,
        }
    }

    /// Best similarity of "clean title + artists" over the original and
    /// remixer-merged artist lists of both sides.
    fn text_similarity(
        &self,
        track: &NormalizedTrack,
        candidate: &Candidate,
        candidate_mix: &MixInfo,
    ) -> f64 {
        let candidate_title = self.normalizer.normalize(&candidate_mix.clean_title);

        let candidate_artists: Vec<String> = candidate
            .artists
            .iter()
            .flat_map(|a| self.normalizer.split_artists(a))
            .filter(|a| !self.normalizer.is_degenerate_artist(a))
            .collect();
        let candidate_merged = merge_with_artists(candidate_mix, &candidate_artists);

        let track_variants = [&track.artist_norm, &track.merged_artist_norm];
        let candidate_variants = [
            self.normalizer.normalize_artists(&candidate_artists),
            self.normalizer.normalize_artists(&candidate_merged),
        ];

        let mut best: f64 = 0.0;
        for track_artist in track_variants {
            let left = join_norm(&track.title_norm, track_artist);
            for candidate_artist in &candidate_variants {
                let right = join_norm(&candidate_title, candidate_artist);
                best = best.max(token_similarity(&left, &right));
            }
        }
        best
    }

    pub fn key_bonus(&self, track_key: Option<&str>, candidate_key: Option<&str>) -> f64 {
        match self.adjacency.relation(track_key, candidate_key) {
            Some(KeyRelation::Exact) => self.weights.key_exact,
            Some(KeyRelation::Near) => self.weights.key_near,
            Some(KeyRelation::Unrelated) | None => 0.0,
        }
    }

    pub fn year_bonus(&self, track_year: Option<i32>, candidate_year: Option<i32>) -> f64 {
        match (track_year, candidate_year) {
            (Some(a), Some(b)) => match a.abs_diff(b) {
                0 => self.weights.year_exact,
                1 => self.weights.year_adjacent,
                _ => 0.0,
            },
            _ => 0.0,
        }
    }

    /// Neutral unless both titles carry an understood annotation.
    pub fn mix_bonus(&self, track_mix: &MixInfo, candidate_mix: &MixInfo) -> f64 {
        if track_mix.phrase.is_none() || candidate_mix.phrase.is_none() {
            return 0.0;
        }
        let unclear = |m: &MixInfo| m.ambiguous || m.mix_type == MixType::Unknown;
        if unclear(track_mix) || unclear(candidate_mix) {
            return 0.0;
        }
        if track_mix.mix_type != candidate_mix.mix_type {
            return self.weights.mix_mismatch;
        }
        // Same remix type by different remixers is a different record
        if track_mix.mix_type.is_remix_like()
            && !track_mix.remixer_names.is_empty()
            && !candidate_mix.remixer_names.is_empty()
            && !self.remixers_overlap(track_mix, candidate_mix)
        {
            return self.weights.mix_mismatch;
        }
        self.weights.mix_match
    }

    fn remixers_overlap(&self, a: &MixInfo, b: &MixInfo) -> bool {
        a.remixer_names.iter().any(|x| {
            let x = self.normalizer.normalize(x);
            b.remixer_names.iter().any(|y| self.normalizer.normalize(y) == x)
        })
    }
}

fn join_norm(title: &str, artists: &str) -> String {
    match (title.is_empty(), artists.is_empty()) {
        (_, true) => title.to_string(),
        (true, false) => artists.to_string(),
        (false, false) => format!("{} {}", title, artists),
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Immutable matching configuration.
//!
//! Built once per run (defaults, or deserialized by the binary) and handed to
//! `MatchOrchestrator::new`, which validates it and never mutates it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::keys::{default_adjacency_table, parse_key};
use crate::mix::default_keyword_table;
use crate::models::MixType;

/// Weights combining the score components into the 0-100 composite.
/// With the defaults a perfect pair (similarity 1.0, exact key, exact year,
/// matching mix) scores exactly 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Multiplier for text similarity (0.0-1.0)
    pub text: f64,
    pub key_exact: f64,
    pub key_near: f64,
    pub year_exact: f64,
    /// Off by exactly one year
    pub year_adjacent: f64,
    pub mix_match: f64,
    /// Applied on a clear mismatch; must be <= 0
    pub mix_mismatch: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            text: 85.0,
            key_exact: 5.0,
            key_near: 2.5,
            year_exact: 5.0,
            year_adjacent: 2.5,
            mix_match: 5.0,
            mix_mismatch: -20.0,
        }
    }
}

impl ScoreWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        let positives = [
            ("text", self.text),
            ("key_exact", self.key_exact),
            ("key_near", self.key_near),
            ("year_exact", self.year_exact),
            ("year_adjacent", self.year_adjacent),
            ("mix_match", self.mix_match),
        ];
        for (field, value) in positives {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { field, value });
            }
        }
        if !self.mix_mismatch.is_finite() || self.mix_mismatch > 0.0 {
            return Err(ConfigError::InvalidWeight {
                field: "mix_mismatch",
                value: self.mix_mismatch,
            });
        }
        // Partial bonuses may not outrank the full ones
        if self.key_near > self.key_exact {
            return Err(ConfigError::InvalidWeight { field: "key_near", value: self.key_near });
        }
        if self.year_adjacent > self.year_exact {
            return Err(ConfigError::InvalidWeight {
                field: "year_adjacent",
                value: self.year_adjacent,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Shortest n-gram window (tokens)
    pub k_min: usize,
    /// Longest n-gram window (tokens)
    pub k_max: usize,
    pub early_exit_score_threshold: f64,
    pub min_candidates_for_early_exit: usize,
    pub max_candidates_per_query: usize,
    pub max_queries_per_track: usize,
    pub fetch_timeout_ms: u64,
    pub stopwords: Vec<String>,
    /// Camelot key -> harmonically near keys
    pub key_adjacency_table: BTreeMap<String, Vec<String>>,
    /// Lowercase keyword -> mix type
    pub mix_keyword_table: BTreeMap<String, MixType>,
    pub weights: ScoreWeights,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 4,
            early_exit_score_threshold: 95.0,
            min_candidates_for_early_exit: 1,
            max_candidates_per_query: 25,
            max_queries_per_track: 12,
            fetch_timeout_ms: 10_000,
            stopwords: ["the", "feat", "ft", "featuring"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            key_adjacency_table: default_adjacency_table(),
            mix_keyword_table: default_keyword_table(),
            weights: ScoreWeights::default(),
        }
    }
}

impl MatchConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k_min == 0 || self.k_min > self.k_max {
            return Err(ConfigError::InvalidWindow {
                k_min: self.k_min,
                k_max: self.k_max,
            });
        }
        if !(0.0..=100.0).contains(&self.early_exit_score_threshold) {
            return Err(ConfigError::InvalidThreshold(self.early_exit_score_threshold));
        }
        let limits = [
            ("min_candidates_for_early_exit", self.min_candidates_for_early_exit),
            ("max_candidates_per_query", self.max_candidates_per_query),
            ("max_queries_per_track", self.max_queries_per_track),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { field });
            }
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.stopwords.iter().any(|w| w.trim().is_empty()) {
            return Err(ConfigError::EmptyStopword);
        }
        for (key, near) in &self.key_adjacency_table {
            for k in std::iter::once(key).chain(near.iter()) {
                if parse_key(k).is_none() {
                    return Err(ConfigError::UnknownKey(k.clone()));
                }
            }
        }
        if self.mix_keyword_table.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::EmptyKeyword);
        }
        self.weights.validate()
    }
}

// ============================================================================
// TESTS
// ============================================================================

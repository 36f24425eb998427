//! Search query generation.
//!
//! Query order: priority (artist + clean title), one per remixer, n-gram
//! windows of the title (longest first), then a title-only fallback.
//! Queries are deduplicated on their normalized text, first occurrence wins.

use rustc_hash::FxHashSet;

use crate::models::{MixInfo, NormalizedTrack, Query, QueryType};
use crate::normalize::TextNormalizer;

#[derive(Debug, Clone, Default)]
pub struct QueryGenerator {
    normalizer: TextNormalizer,
}

/// Accumulates queries in priority order, dropping normalized duplicates.
struct QueryList<'a> {
    normalizer: &'a TextNormalizer,
    seen: FxHashSet<String>,
    queries: Vec<Query>,
}

impl<'a> QueryList<'a> {
    fn new(normalizer: &'a TextNormalizer) -> Self {
        Self { normalizer, seen: FxHashSet::default(), queries: Vec::new() }
    }

    fn push(&mut self, text: String, query_type: QueryType) {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let key = self.normalizer.normalize(&text);
        // The priority query is always kept, even if it normalizes to nothing
        if key.is_empty() && !self.queries.is_empty() {
            return;
        }
        if !self.seen.insert(key) {
            return;
        }
        self.queries.push(Query {
            text,
            priority_index: self.queries.len(),
            query_type,
        });
    }
}

impl QueryGenerator {
    pub fn new(normalizer: TextNormalizer) -> Self {
        Self { normalizer }
    }

    /// Build the ordered, duplicate-free query list for a track.
    /// Deterministic: the same inputs always give the same list.
    pub fn make_queries(
        &self,
        track: &NormalizedTrack,
        mix_info: &MixInfo,
        k_min: usize,
        k_max: usize,
    ) -> Vec<Query> {
        let mut list = QueryList::new(&self.normalizer);
        let title = track.clean_title.trim();

        // 1. Priority
        if track.has_artist() {
            list.push(format!("{} {}", track.primary_artist, title), QueryType::Priority);
        } else {
            list.push(title.to_string(), QueryType::Priority);
        }

        // 2. One per remixer
        if mix_info.mix_type.is_remix_like() {
            for remixer in &mix_info.remixer_names {
                list.push(format!("{} {}", remixer, title), QueryType::Remix);
            }
        }

        // 3. N-gram windows, longest first, left to right
        if track.has_artist() && k_min > 0 {
            let tokens = &track.title_tokens;
            let longest = k_max.min(tokens.len());
            for window in (k_min..=longest).rev() {
                for gram in tokens.windows(window) {
                    list.push(
                        format!("{} {}", track.primary_artist, gram.join(" ")),
                        QueryType::NGram,
                    );
                }
            }
        }

        // 4. Title-only fallback
        list.push(title.to_string(), QueryType::TitleOnly);

        list.queries
    }

    /// Truncate to `max` queries. The title-only fallback, when present,
    /// stays as the last query.
    pub fn limit(mut queries: Vec<Query>, max: usize) -> Vec<Query> {
        if queries.len() <= max {
            return queries;
        }
        let fallback = match queries.last() {
            Some(q) if q.query_type == QueryType::TitleOnly && max > 1 => queries.pop(),
            _ => None,
        };
        queries.truncate(max - usize::from(fallback.is_some()));
        queries.extend(fallback);
        for (i, q) in queries.iter_mut().enumerate() {
            q.priority_index = i;
        }
        queries
    }
}

// ============================================================================
// TESTS
// ============================================================================

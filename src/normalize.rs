//! Text normalization and fuzzy similarity for track-to-candidate matching.
//! Shared by the query generator (dedup keys) and the scoring engine.
//!
//! CRITICAL: query dedup and scoring both key off `normalize`. Any change here
//! shifts which queries are issued and how candidates score. Run tests after changes.

use std::collections::BTreeSet;

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;

use crate::mix::merge_with_artists;
use crate::models::{MixInfo, NormalizedTrack, Track};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Multi-artist separator pattern.
/// Matches: , ; & • × a spaced " / " and the words feat, ft, featuring, vs, x.
/// A bare slash ("AC/DC") and a capital X ("Malcolm X Band") belong to the name.
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[,;&•×]|\s/\s|\s(?:feat\.?|ft\.?|featuring|(?-i:x)|vs\.?)\s)\s*").unwrap()
});

/// Leading "feat." credit without surrounding whitespace, e.g. "Artist feat.Other"
pub static FEAT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:feat\.?|ft\.?|featuring)\s+").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Placeholder artist values that carry no information.
const DEGENERATE_ARTISTS: &[&str] = &[
    "unknown",
    "unknown artist",
    "various",
    "various artists",
    "va",
    "n a",
    "none",
];

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during normalization.
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "Tiësto" → "tiesto"
pub fn fold_to_ascii(s: &str) -> String {
    // First strip diacritics via NFKD decomposition
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    // Then transliterate any remaining non-ASCII (Cyrillic, Hebrew, CJK, etc.)
    any_ascii(&stripped).to_lowercase()
}

/// Convert curly quotes and typographic dashes to their ASCII forms.
pub fn normalize_punctuation(s: &str) -> String {
    let result = s
        .replace(['\u{2018}', '\u{2019}', '\u{00B4}', '\u{0060}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2010}', '\u{2011}', '\u{2013}', '\u{2014}'], "-");
    MULTI_SPACE.replace_all(&result, " ").to_string()
}

/// Replace punctuation with spaces, keeping word-internal '-' and '.'
/// ("jay-z", "st.germain") and eliding word-internal apostrophes ("don't" → "dont").
fn strip_punctuation(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            out.push(c);
            continue;
        }
        let internal = i > 0
            && i + 1 < chars.len()
            && chars[i - 1].is_alphanumeric()
            && chars[i + 1].is_alphanumeric();
        match c {
            '-' | '.' if internal => out.push(c),
            '\'' if internal => {}
            _ => out.push(' '),
        }
    }
    out
}

// ============================================================================
// SIMILARITY
// ============================================================================

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Levenshtein ratio after sorting tokens: robust to word reordering.
pub fn token_sort_ratio(a: &[&str], b: &[&str]) -> f64 {
    let mut sa = a.to_vec();
    let mut sb = b.to_vec();
    sa.sort_unstable();
    sb.sort_unstable();
    ratio(&sa.join(" "), &sb.join(" "))
}

/// Token-set ratio: compares the shared tokens against each side's remainder,
/// so a title that is a token subset of the other scores highly.
pub fn token_set_ratio(a: &[&str], b: &[&str]) -> f64 {
    let sa: BTreeSet<&str> = a.iter().copied().collect();
    let sb: BTreeSet<&str> = b.iter().copied().collect();

    let common: Vec<&str> = sa.intersection(&sb).copied().collect();
    let only_a: Vec<&str> = sa.difference(&sb).copied().collect();
    let only_b: Vec<&str> = sb.difference(&sa).copied().collect();

    let t0 = common.join(" ");
    let join = |rest: &[&str]| -> String {
        match (t0.is_empty(), rest.is_empty()) {
            (_, true) => t0.clone(),
            (true, false) => rest.join(" "),
            (false, false) => format!("{} {}", t0, rest.join(" ")),
        }
    };
    let t1 = join(&only_a);
    let t2 = join(&only_b);

    ratio(&t0, &t1).max(ratio(&t0, &t2)).max(ratio(&t1, &t2))
}

/// Similarity of two already-normalized strings (0.0 to 1.0).
/// Mean of token-sort and token-set ratios; symmetric and deterministic.
pub fn token_similarity(a_norm: &str, b_norm: &str) -> f64 {
    if a_norm == b_norm {
        return 1.0;
    }
    let ta: Vec<&str> = a_norm.split_whitespace().collect();
    let tb: Vec<&str> = b_norm.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return if ta.is_empty() && tb.is_empty() { 1.0 } else { 0.0 };
    }
    let score = (token_sort_ratio(&ta, &tb) + token_set_ratio(&ta, &tb)) / 2.0;
    score.clamp(0.0, 1.0)
}

// ============================================================================
// TEXT NORMALIZER
// ============================================================================

/// Canonicalizes strings for comparison. Pure: holds only the stopword list.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stopwords: FxHashSet<String>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(["the", "feat", "ft", "featuring"])
    }
}

impl TextNormalizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stopwords = stopwords
            .into_iter()
            .flat_map(|w| {
                strip_punctuation(&fold_to_ascii(w.as_ref()))
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { stopwords }
    }

    /// Fold diacritics, lowercase, strip punctuation, collapse whitespace and
    /// drop stopwords. Idempotent: `normalize(normalize(x)) == normalize(x)`.
    pub fn normalize(&self, text: &str) -> String {
        let folded = fold_to_ascii(&normalize_punctuation(text));
        strip_punctuation(&folded)
            .split_whitespace()
            .filter(|token| !self.stopwords.contains(*token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Normalized tokens in their original order.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.normalize(text)
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Fuzzy similarity of two raw strings (0.0 to 1.0).
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        token_similarity(&self.normalize(a), &self.normalize(b))
    }

    /// Split a multi-artist field into display names, order-preserving and
    /// case-insensitively unique.
    /// e.g., "Dimitri Vegas & Like Mike, Tiësto" → ["Dimitri Vegas", "Like Mike", "Tiësto"]
    pub fn split_artists(&self, text: &str) -> Vec<String> {
        let unbracketed = text.replace(['(', ')', '[', ']'], " ");
        let unbracketed = normalize_punctuation(unbracketed.trim());
        let mut seen = FxHashSet::default();
        ARTIST_SEPARATOR
            .split(&unbracketed)
            .map(|name| FEAT_PREFIX.replace(name.trim(), "").trim().to_string())
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.to_lowercase()))
            .collect()
    }

    /// Empty or placeholder artist ("Unknown", "Various Artists", "VA", ...).
    pub fn is_degenerate_artist(&self, artist: &str) -> bool {
        let norm = self.normalize(artist);
        norm.is_empty() || DEGENERATE_ARTISTS.contains(&norm.as_str())
    }

    /// Normalize each name and join with single spaces.
    pub fn normalize_artists(&self, artists: &[String]) -> String {
        artists
            .iter()
            .map(|a| self.normalize(a))
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// NORMALIZED TRACK
// ============================================================================

impl NormalizedTrack {
    /// Derive the normalized view of a track from its parsed mix annotation.
    pub fn build(track: &Track, mix_info: &MixInfo, normalizer: &TextNormalizer) -> Self {
        let artists: Vec<String> = normalizer
            .split_artists(&track.artist)
            .into_iter()
            .filter(|a| !normalizer.is_degenerate_artist(a))
            .collect();
        let primary_artist = artists.first().cloned().unwrap_or_default();
        let merged_artists = merge_with_artists(mix_info, &artists);

        let title_norm = normalizer.normalize(&mix_info.clean_title);
        let title_tokens = title_norm.split_whitespace().map(str::to_string).collect();

        Self {
            clean_title: mix_info.clean_title.clone(),
            primary_artist,
            artist_norm: normalizer.normalize_artists(&artists),
            merged_artist_norm: normalizer.normalize_artists(&merged_artists),
            artists,
            merged_artists,
            title_norm,
            title_tokens,
            year: track.year,
            key: track.key.clone(),
            bpm: track.bpm,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Edit/remix annotation parsing.
//!
//! Finds mix phrases in a title ("(Original Mix)", "[Artist Remix]",
//! " - Radio Edit"), classifies them against a keyword table and extracts
//! remixer credits. The remaining text is the clean title used for queries
//! and scoring.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use crate::models::{MixInfo, MixType};
use crate::normalize::MULTI_SPACE;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Innermost bracketed phrase: "(Original Mix)", "[Artist Remix]"
pub static BRACKET_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\(\[]([^\(\)\[\]]*)[\)\]]").unwrap());

/// Trailing dash suffix after the last " - ": "Strobe - Extended Mix"
pub static DASH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\S)\s+[-–—]\s+(.+)$").unwrap());

/// Featured-artist phrase: "(feat. Someone)", "[ft. Other]"
pub static FEAT_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:feat\.?|ft\.?|featuring)\s+\S").unwrap());

/// Separators between remixer credits inside one phrase.
pub static REMIXER_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[&,]|\b(?:feat|ft|featuring|vs)\b\.?)\s*").unwrap()
});

/// Words that mark a phrase as a mix annotation even when no keyword matches.
const GENERIC_MIX_WORDS: &[&str] = &["mix", "edit", "version"];

/// Trailing words stripped from remixer credits ("Artist Extended Remix" → "Artist").
const NAME_MODIFIERS: &[&str] = &[
    "extended", "club", "radio", "original", "short", "special", "official", "mix", "edit",
    "version",
];

// ============================================================================
// KEYWORD TABLE
// ============================================================================

/// Default keyword → mix type table. Keywords are lowercase and matched on
/// whole words; the rightmost (then longest) keyword in a phrase wins.
pub fn default_keyword_table() -> BTreeMap<String, MixType> {
    let entries: &[(&str, MixType)] = &[
        ("original mix", MixType::Original),
        ("original version", MixType::Original),
        ("original", MixType::Original),
        ("album version", MixType::Original),
        ("extended mix", MixType::Extended),
        ("extended version", MixType::Extended),
        ("extended edit", MixType::Extended),
        ("extended", MixType::Extended),
        ("club mix", MixType::Extended),
        ("radio edit", MixType::RadioEdit),
        ("radio mix", MixType::RadioEdit),
        ("radio version", MixType::RadioEdit),
        ("single edit", MixType::RadioEdit),
        ("single version", MixType::RadioEdit),
        ("short edit", MixType::RadioEdit),
        ("remix", MixType::Remix),
        ("rework", MixType::Remix),
        ("bootleg", MixType::Remix),
        ("flip", MixType::Remix),
        ("re-edit", MixType::Remix),
        ("edit", MixType::Remix),
        ("dub mix", MixType::Dub),
        ("dub", MixType::Dub),
        ("vip mix", MixType::Vip),
        ("vip", MixType::Vip),
    ];
    entries
        .iter()
        .map(|(k, t)| (k.to_string(), *t))
        .collect()
}

// ============================================================================
// FREE FUNCTIONS
// ============================================================================

/// Union remixer credits into the artist list: original artists first,
/// case-insensitive dedup, first-seen order.
pub fn merge_with_artists(mix_info: &MixInfo, artists: &[String]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    artists
        .iter()
        .chain(mix_info.remixer_names.iter())
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// A confident match may only end the query loop when the annotation was
/// understood: a known mix type and no conflicting phrases.
pub fn is_early_exit_eligible(mix_info: &MixInfo) -> bool {
    mix_info.mix_type != MixType::Unknown && !mix_info.ambiguous
}

fn push_unique(names: &mut Vec<String>, name: String) {
    let lower = name.to_lowercase();
    if !names.iter().any(|n| n.to_lowercase() == lower) {
        names.push(name);
    }
}

impl MixInfo {
    pub fn is_early_exit_eligible(&self) -> bool {
        is_early_exit_eligible(self)
    }

    /// Canonical annotation for this mix, e.g. "Dimitri Vegas & Like Mike Remix".
    /// None for untagged titles.
    pub fn annotation(&self) -> Option<String> {
        self.phrase.as_ref()?;
        match self.mix_type {
            MixType::Unknown => self.phrase.clone(),
            t if t.is_remix_like() && !self.remixer_names.is_empty() => {
                Some(format!("{} {}", self.remixer_names.join(" & "), t.label()))
            }
            t => Some(t.label().to_string()),
        }
    }

    /// Clean title with the canonical annotation re-attached.
    pub fn display_title(&self) -> String {
        match self.annotation() {
            Some(annotation) => format!("{} ({})", self.clean_title, annotation),
            None => self.clean_title.clone(),
        }
    }
}

// ============================================================================
// MIX PARSER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PhraseMatch {
    mix_type: MixType,
    remixers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MixParser {
    /// (keyword tokens, type), longest keyword first
    keywords: Vec<(Vec<String>, MixType)>,
}

impl Default for MixParser {
    fn default() -> Self {
        Self::new(&default_keyword_table())
    }
}

impl MixParser {
    pub fn new(table: &BTreeMap<String, MixType>) -> Self {
        let mut keywords: Vec<(Vec<String>, MixType)> = table
            .iter()
            .map(|(k, t)| {
                let tokens = k.split_whitespace().map(|w| w.to_lowercase()).collect();
                (tokens, *t)
            })
            .filter(|(tokens, _): &(Vec<String>, MixType)| !tokens.is_empty())
            .collect();
        keywords.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { keywords }
    }

    /// Parse the mix annotation(s) out of a title.
    pub fn parse(&self, title: &str) -> MixInfo {
        let title = title.trim();
        let mut found: Vec<PhraseMatch> = Vec::new();
        let mut phrases: Vec<String> = Vec::new();

        // Bracketed phrases: strip mix and feat phrases, keep everything else
        let mut remaining = String::with_capacity(title.len());
        let mut last = 0;
        for caps in BRACKET_PHRASE.captures_iter(title) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let inner = inner.as_str().trim();
            let strip = if FEAT_PHRASE.is_match(inner) {
                true
            } else if let Some(m) = self.classify(inner) {
                found.push(m);
                phrases.push(inner.to_string());
                true
            } else {
                false
            };
            if strip {
                remaining.push_str(&title[last..whole.start()]);
                remaining.push(' ');
                last = whole.end();
            }
        }
        remaining.push_str(&title[last..]);

        // Dash suffix: only when it reads as a mix annotation
        let dash_split = DASH_SUFFIX.captures(remaining.trim()).and_then(|caps| {
            let head = caps.get(1)?.as_str().to_string();
            let suffix = caps.get(2)?.as_str().trim().to_string();
            self.classify(&suffix).map(|m| (head, suffix, m))
        });
        if let Some((head, suffix, m)) = dash_split {
            found.push(m);
            phrases.push(suffix);
            remaining = head;
        }

        let mut clean_title = MULTI_SPACE.replace_all(remaining.trim(), " ").to_string();
        if clean_title.is_empty() {
            clean_title = MULTI_SPACE.replace_all(title, " ").to_string();
        }

        let mut remixer_names: Vec<String> = Vec::new();
        for m in &found {
            for name in &m.remixers {
                push_unique(&mut remixer_names, name.clone());
            }
        }

        let distinct: FxHashSet<MixType> = found.iter().map(|m| m.mix_type).collect();
        let (mix_type, ambiguous) = match distinct.len() {
            0 => (MixType::Original, false),
            1 => (found[0].mix_type, false),
            _ => (MixType::Unknown, true),
        };

        MixInfo {
            mix_type,
            remixer_names,
            clean_title,
            ambiguous,
            phrase: if phrases.is_empty() { None } else { Some(phrases.join("; ")) },
        }
    }

    /// Classify one phrase. None when it is not a mix annotation.
    fn classify(&self, phrase: &str) -> Option<PhraseMatch> {
        let tokens: Vec<&str> = phrase.split_whitespace().collect();
        let lower: Vec<String> = tokens
            .iter()
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
                    .to_lowercase()
            })
            .collect();

        // (start, len, type) of the rightmost keyword occurrence
        let mut best: Option<(usize, usize, MixType)> = None;
        for (kw, mix_type) in &self.keywords {
            let len = kw.len();
            if len > lower.len() {
                continue;
            }
            let Some(start) = (0..=lower.len() - len)
                .rev()
                .find(|&s| lower[s..s + len] == kw[..])
            else {
                continue;
            };
            let end = start + len;
            let better = match best {
                None => true,
                Some((b_start, b_len, _)) => {
                    let b_end = b_start + b_len;
                    end > b_end || (end == b_end && len > b_len)
                }
            };
            if better {
                best = Some((start, len, *mix_type));
            }
        }

        let Some((start, len, mut mix_type)) = best else {
            if lower.iter().any(|t| GENERIC_MIX_WORDS.contains(&t.as_str())) {
                return Some(PhraseMatch { mix_type: MixType::Unknown, remixers: Vec::new() });
            }
            return None;
        };

        let prefix = tokens[..start].join(" ");
        // "Remix by Someone"
        let by_credit = match lower.get(start + len).map(String::as_str) {
            Some("by") => tokens[start + len + 1..].join(" "),
            _ => String::new(),
        };

        // A bare "(Edit)" is a short edit; "Artist Edit" is a re-edit
        if lower[start..start + len] == ["edit"] && prefix.is_empty() && by_credit.is_empty() {
            mix_type = MixType::RadioEdit;
        }

        let mut remixers = Vec::new();
        if mix_type.is_remix_like() {
            let credit = if prefix.is_empty() { by_credit } else { prefix };
            for name in REMIXER_SEPARATOR.split(&credit) {
                let name = strip_trailing_modifiers(name.trim());
                if !name.is_empty() {
                    push_unique(&mut remixers, name);
                }
            }
        }

        Some(PhraseMatch { mix_type, remixers })
    }
}

fn strip_trailing_modifiers(name: &str) -> String {
    let mut words: Vec<&str> = name.split_whitespace().collect();
    while words.len() > 1 {
        let last = words[words.len() - 1].to_lowercase();
        if NAME_MODIFIERS.contains(&last.as_str()) {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(title: &str) -> MixInfo {
        MixParser::default().parse(title)
    }

    #[test]
    fn test_original_mix() {
        let info = parse("Strobe (Original Mix)");
        assert_eq!(info.mix_type, MixType::Original);
        assert_eq!(info.clean_title, "Strobe");
        assert!(info.remixer_names.is_empty());
        assert!(!info.ambiguous);
        assert_eq!(info.phrase.as_deref(), Some("Original Mix"));
    }

    #[test]
    fn test_remix_with_two_remixers() {
        let info = parse("Opus (Dimitri Vegas & Like Mike Remix)");
        assert_eq!(info.mix_type, MixType::Remix);
        assert_eq!(info.remixer_names, vec!["Dimitri Vegas", "Like Mike"]);
        assert_eq!(info.clean_title, "Opus");
    }

    #[test]
    fn test_merged_artists_contain_remixers() {
        let info = parse("Opus (Dimitri Vegas & Like Mike Remix)");
        let merged = merge_with_artists(&info, &["Eric Prydz".to_string()]);
        assert_eq!(merged, vec!["Eric Prydz", "Dimitri Vegas", "Like Mike"]);
    }

    #[test]
    fn test_merge_dedups_case_insensitively() {
        let info = parse("Song (Artist A, artist b Remix)");
        assert_eq!(info.remixer_names, vec!["Artist A", "artist b"]);
        let merged = merge_with_artists(&info, &["ARTIST B".to_string(), "Other".to_string()]);
        assert_eq!(merged, vec!["ARTIST B", "Other", "Artist A"]);
    }

    #[test]
    fn test_remixer_feat_split_and_dedup() {
        let info = parse("Track [Alpha feat. Beta & alpha Remix]");
        assert_eq!(info.remixer_names, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_untagged_title_is_original() {
        let info = parse("Strobe");
        assert_eq!(info.mix_type, MixType::Original);
        assert_eq!(info.phrase, None);
        assert_eq!(info.clean_title, "Strobe");
        assert!(info.is_early_exit_eligible());
    }

    #[test]
    fn test_keyword_classification() {
        assert_eq!(parse("A (Extended Mix)").mix_type, MixType::Extended);
        assert_eq!(parse("A (Club Mix)").mix_type, MixType::Extended);
        assert_eq!(parse("A (Radio Edit)").mix_type, MixType::RadioEdit);
        assert_eq!(parse("A (Edit)").mix_type, MixType::RadioEdit);
        assert_eq!(parse("A (Dub Mix)").mix_type, MixType::Dub);
        assert_eq!(parse("A (VIP)").mix_type, MixType::Vip);
        assert_eq!(parse("A (Tech Mix)").mix_type, MixType::Unknown);
    }

    #[test]
    fn test_rightmost_keyword_wins() {
        let info = parse("Levels (Skrillex Extended Remix)");
        assert_eq!(info.mix_type, MixType::Remix);
        assert_eq!(info.remixer_names, vec!["Skrillex"]);
    }

    #[test]
    fn test_named_edit_is_remix() {
        let info = parse("Hypnotized (Purple Disco Machine Edit)");
        assert_eq!(info.mix_type, MixType::Remix);
        assert_eq!(info.remixer_names, vec!["Purple Disco Machine"]);
    }

    #[test]
    fn test_dub_and_vip_credit_names() {
        let info = parse("Track (Someone Dub)");
        assert_eq!(info.mix_type, MixType::Dub);
        assert_eq!(info.remixer_names, vec!["Someone"]);
        let info = parse("Track (Artist VIP Mix)");
        assert_eq!(info.mix_type, MixType::Vip);
        assert_eq!(info.remixer_names, vec!["Artist"]);
    }

    #[test]
    fn test_remix_by_credit() {
        let info = parse("Track (Remix by Someone Else)");
        assert_eq!(info.mix_type, MixType::Remix);
        assert_eq!(info.remixer_names, vec!["Someone Else"]);
    }

    #[test]
    fn test_dash_suffix() {
        let info = parse("Strobe - Extended Mix");
        assert_eq!(info.mix_type, MixType::Extended);
        assert_eq!(info.clean_title, "Strobe");

        let info = parse("Song - Jay-Z Remix");
        assert_eq!(info.mix_type, MixType::Remix);
        assert_eq!(info.remixer_names, vec!["Jay-Z"]);
        assert_eq!(info.clean_title, "Song");
    }

    #[test]
    fn test_non_mix_dash_suffix_kept() {
        let info = parse("Song - Live at Wembley");
        assert_eq!(info.mix_type, MixType::Original);
        assert_eq!(info.clean_title, "Song - Live at Wembley");
        assert_eq!(info.phrase, None);
    }

    #[test]
    fn test_non_mix_parenthetical_kept_feat_stripped() {
        let info = parse("Intro (Interlude) (feat. Someone)");
        assert_eq!(info.clean_title, "Intro (Interlude)");
        assert_eq!(info.mix_type, MixType::Original);
    }

    #[test]
    fn test_conflicting_phrases_are_ambiguous() {
        let info = parse("Anthem (Original Mix) [Someone Remix]");
        assert!(info.ambiguous);
        assert_eq!(info.mix_type, MixType::Unknown);
        assert_eq!(info.clean_title, "Anthem");
        assert!(!info.is_early_exit_eligible());
    }

    #[test]
    fn test_repeated_same_type_is_not_ambiguous() {
        let info = parse("Anthem (Extended Mix) [Extended]");
        assert!(!info.ambiguous);
        assert_eq!(info.mix_type, MixType::Extended);
    }

    #[test]
    fn test_unknown_mix_not_eligible() {
        let info = parse("A (Tech Mix)");
        assert!(!info.ambiguous);
        assert!(!is_early_exit_eligible(&info));
    }

    #[test]
    fn test_annotation_only_title_keeps_text() {
        let info = parse("(Original Mix)");
        assert_eq!(info.clean_title, "(Original Mix)");
        assert_eq!(info.mix_type, MixType::Original);
    }

    #[test]
    fn test_round_trip_annotation() {
        for title in [
            "Strobe (Original Mix)",
            "Opus (Dimitri Vegas & Like Mike Remix)",
            "Strobe - Radio Edit",
            "Ghosts n Stuff (Extended Mix)",
            "Track (Someone Dub)",
            "Bonus (VIP)",
            "Plain Title",
        ] {
            let first = parse(title);
            let rebuilt = first.display_title();
            let second = parse(&rebuilt);
            assert_eq!(second.mix_type, first.mix_type, "{}", title);
            assert_eq!(second.clean_title, first.clean_title, "{}", title);
            assert_eq!(second.remixer_names, first.remixer_names, "{}", title);
        }
        assert_eq!(parse("Strobe (Original Mix)").display_title(), "Strobe (Original Mix)");
    }

    #[test]
    fn test_custom_keyword_table() {
        let mut table = BTreeMap::new();
        table.insert("festival mix".to_string(), MixType::Extended);
        let parser = MixParser::new(&table);
        assert_eq!(parser.parse("Song (Festival Mix)").mix_type, MixType::Extended);
        // "remix" isn't in this table; the generic word rule does not apply either
        assert_eq!(parser.parse("Song (X Remix)").mix_type, MixType::Original);
    }
}

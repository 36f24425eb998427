//! Musical key parsing and the harmonic "near key" table.
//!
//! Keys are mapped onto the Camelot wheel (1A-12A minor, 1B-12B major).
//! Accepted notations: Camelot ("8A"), Open Key ("1m", "1d") and standard
//! ("A Minor", "Am", "A min", "F# maj", "F♯", "Bb").

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CamelotKey {
    pub number: u8,
    /// 'A' = minor, 'B' = major
    pub letter: char,
}

impl CamelotKey {
    /// Same number, other letter
    pub fn relative(self) -> CamelotKey {
        CamelotKey {
            number: self.number,
            letter: if self.letter == 'A' { 'B' } else { 'A' },
        }
    }

    /// Step around the wheel (±1 is a perfect fifth)
    pub fn step(self, delta: i32) -> CamelotKey {
        let number = ((self.number as i32 - 1 + delta).rem_euclid(12) + 1) as u8;
        CamelotKey { number, letter: self.letter }
    }
}

impl std::fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.number, self.letter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRelation {
    Exact,
    Near,
    Unrelated,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse any supported notation into a Camelot key.
pub fn parse_key(raw: &str) -> Option<CamelotKey> {
    parse_camelot_key(raw)
        .or_else(|| parse_open_key(raw))
        .or_else(|| standard_key_to_camelot(raw))
}

pub fn parse_camelot_key(raw: &str) -> Option<CamelotKey> {
    let trimmed = raw.trim().to_ascii_uppercase();
    if trimmed.len() < 2 || !trimmed.is_ascii() {
        return None;
    }
    let (number, letter_str) = trimmed.split_at(trimmed.len() - 1);
    let letter = letter_str.chars().next()?;
    if letter != 'A' && letter != 'B' {
        return None;
    }
    let number: u8 = number.trim().parse().ok()?;
    if !(1..=12).contains(&number) {
        return None;
    }
    Some(CamelotKey { number, letter })
}

/// Open Key notation: 1m = A minor = 8A, 1d = C major = 8B.
pub fn parse_open_key(raw: &str) -> Option<CamelotKey> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.len() < 2 || !trimmed.is_ascii() {
        return None;
    }
    let (number, suffix) = trimmed.split_at(trimmed.len() - 1);
    let letter = match suffix {
        "m" => 'A',
        "d" => 'B',
        _ => return None,
    };
    let number: u8 = number.trim().parse().ok()?;
    if !(1..=12).contains(&number) {
        return None;
    }
    Some(CamelotKey {
        number: (number + 6) % 12 + 1,
        letter,
    })
}

pub fn standard_key_to_camelot(raw: &str) -> Option<CamelotKey> {
    let normalized = raw.trim().replace('\u{266F}', "#").replace('\u{266D}', "b");
    if normalized.is_empty() || !normalized.is_ascii() {
        return None;
    }
    let lower = normalized.to_ascii_lowercase();

    let (root_raw, is_minor) = if lower.ends_with("minor") && normalized.len() > 5 {
        (&normalized[..normalized.len() - 5], true)
    } else if lower.ends_with("min") && normalized.len() > 3 {
        (&normalized[..normalized.len() - 3], true)
    } else if lower.ends_with('m') && normalized.len() > 1 {
        (&normalized[..normalized.len() - 1], true)
    } else if lower.ends_with("major") && normalized.len() > 5 {
        (&normalized[..normalized.len() - 5], false)
    } else if lower.ends_with("maj") && normalized.len() > 3 {
        (&normalized[..normalized.len() - 3], false)
    } else {
        (normalized.as_str(), false)
    };
    let root = normalize_key_root(root_raw)?;

    let (number, letter) = if is_minor {
        match root.as_str() {
            "G#" | "Ab" => (1, 'A'),
            "D#" | "Eb" => (2, 'A'),
            "A#" | "Bb" => (3, 'A'),
            "F" => (4, 'A'),
            "C" => (5, 'A'),
            "G" => (6, 'A'),
            "D" => (7, 'A'),
            "A" => (8, 'A'),
            "E" => (9, 'A'),
            "B" => (10, 'A'),
            "F#" | "Gb" => (11, 'A'),
            "C#" | "Db" => (12, 'A'),
            _ => return None,
        }
    } else {
        match root.as_str() {
            "B" => (1, 'B'),
            "F#" | "Gb" => (2, 'B'),
            "C#" | "Db" => (3, 'B'),
            "G#" | "Ab" => (4, 'B'),
            "D#" | "Eb" => (5, 'B'),
            "A#" | "Bb" => (6, 'B'),
            "F" => (7, 'B'),
            "C" => (8, 'B'),
            "G" => (9, 'B'),
            "D" => (10, 'B'),
            "A" => (11, 'B'),
            "E" => (12, 'B'),
            _ => return None,
        }
    };
    Some(CamelotKey { number, letter })
}

fn normalize_key_root(root: &str) -> Option<String> {
    let stripped: String = root.chars().filter(|ch| !ch.is_whitespace()).collect();
    let mut chars = stripped.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if !matches!(letter, 'A' | 'B' | 'C' | 'D' | 'E' | 'F' | 'G') {
        return None;
    }

    let accidental = chars.next();
    if chars.next().is_some() {
        return None;
    }

    match accidental {
        Some('#') => Some(format!("{letter}#")),
        Some('b') | Some('B') => Some(format!("{letter}b")),
        Some(_) => None,
        None => Some(letter.to_string()),
    }
}

// ============================================================================
// Adjacency Table
// ============================================================================

/// Default near-key table: relative major/minor plus both perfect-fifth
/// neighbours for each of the 24 keys.
pub fn default_adjacency_table() -> BTreeMap<String, Vec<String>> {
    let mut table = BTreeMap::new();
    for letter in ['A', 'B'] {
        for number in 1..=12u8 {
            let key = CamelotKey { number, letter };
            let near = vec![
                key.relative().to_string(),
                key.step(1).to_string(),
                key.step(-1).to_string(),
            ];
            table.insert(key.to_string(), near);
        }
    }
    table
}

/// Symmetric near-key lookup built from a configured table.
#[derive(Debug, Clone, Default)]
pub struct KeyAdjacency {
    near: FxHashMap<CamelotKey, FxHashSet<CamelotKey>>,
}

impl KeyAdjacency {
    pub fn from_table(table: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut near: FxHashMap<CamelotKey, FxHashSet<CamelotKey>> = FxHashMap::default();
        for (raw, neighbours) in table {
            let key = parse_key(raw).ok_or_else(|| ConfigError::UnknownKey(raw.clone()))?;
            for raw_n in neighbours {
                let n = parse_key(raw_n).ok_or_else(|| ConfigError::UnknownKey(raw_n.clone()))?;
                if n == key {
                    continue;
                }
                near.entry(key).or_default().insert(n);
                near.entry(n).or_default().insert(key);
            }
        }
        Ok(Self { near })
    }

    pub fn is_near(&self, a: CamelotKey, b: CamelotKey) -> bool {
        self.near.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// None when either key is missing or blank.
    pub fn relation(&self, a: Option<&str>, b: Option<&str>) -> Option<KeyRelation> {
        let a = a.map(str::trim).filter(|s| !s.is_empty())?;
        let b = b.map(str::trim).filter(|s| !s.is_empty())?;

        match (parse_key(a), parse_key(b)) {
            (Some(ka), Some(kb)) if ka == kb => Some(KeyRelation::Exact),
            (Some(ka), Some(kb)) if self.is_near(ka, kb) => Some(KeyRelation::Near),
            (Some(_), Some(_)) => Some(KeyRelation::Unrelated),
            // Unparseable notation: only textual equality counts
            _ => {
                let fold = |s: &str| -> String {
                    s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
                };
                if fold(a) == fold(b) {
                    Some(KeyRelation::Exact)
                } else {
                    Some(KeyRelation::Unrelated)
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CamelotKey {
        parse_key(s).unwrap()
    }

    #[test]
    fn test_parse_camelot() {
        assert_eq!(parse_key("8A"), Some(CamelotKey { number: 8, letter: 'A' }));
        assert_eq!(parse_key(" 12b "), Some(CamelotKey { number: 12, letter: 'B' }));
        assert_eq!(parse_key("13A"), None);
    }

    #[test]
    fn test_parse_standard_notation() {
        assert_eq!(key("A Minor"), key("8A"));
        assert_eq!(key("Am"), key("8A"));
        assert_eq!(key("A min"), key("8A"));
        assert_eq!(key("C"), key("8B"));
        assert_eq!(key("C Major"), key("8B"));
        assert_eq!(key("F# maj"), key("2B"));
        assert_eq!(key("F\u{266F} Minor"), key("11A"));
        assert_eq!(key("Bb"), key("6B"));
        assert_eq!(parse_key("H minor"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn test_parse_open_key() {
        assert_eq!(key("1m"), key("8A"));
        assert_eq!(key("1d"), key("8B"));
        assert_eq!(key("6m"), key("1A"));
    }

    #[test]
    fn test_step_wraps_around_wheel() {
        assert_eq!(key("12A").step(1), key("1A"));
        assert_eq!(key("1B").step(-1), key("12B"));
    }

    #[test]
    fn test_default_table_covers_all_keys() {
        let table = default_adjacency_table();
        assert_eq!(table.len(), 24);
        assert_eq!(table["8A"], vec!["8B", "9A", "7A"]);
    }

    #[test]
    fn test_relations() {
        let adj = KeyAdjacency::from_table(&default_adjacency_table()).unwrap();
        assert_eq!(adj.relation(Some("A Minor"), Some("8A")), Some(KeyRelation::Exact));
        // Relative major
        assert_eq!(adj.relation(Some("Am"), Some("C")), Some(KeyRelation::Near));
        // Perfect fifth neighbours
        assert_eq!(adj.relation(Some("8A"), Some("9A")), Some(KeyRelation::Near));
        assert_eq!(adj.relation(Some("8A"), Some("7A")), Some(KeyRelation::Near));
        // Diagonal is not near in the default table
        assert_eq!(adj.relation(Some("8A"), Some("9B")), Some(KeyRelation::Unrelated));
        assert_eq!(adj.relation(Some("8A"), None), None);
        assert_eq!(adj.relation(None, Some("8A")), None);
        assert_eq!(adj.relation(Some("  "), Some("8A")), None);
    }

    #[test]
    fn test_relation_is_symmetric_for_custom_table() {
        let mut table = BTreeMap::new();
        table.insert("1A".to_string(), vec!["5A".to_string()]);
        let adj = KeyAdjacency::from_table(&table).unwrap();
        assert!(adj.is_near(key("1A"), key("5A")));
        assert!(adj.is_near(key("5A"), key("1A")));
        assert!(!adj.is_near(key("1A"), key("2A")));
    }

    #[test]
    fn test_unparseable_keys_compare_textually() {
        let adj = KeyAdjacency::default();
        assert_eq!(adj.relation(Some("atonal"), Some("Atonal")), Some(KeyRelation::Exact));
        assert_eq!(adj.relation(Some("atonal"), Some("8A")), Some(KeyRelation::Unrelated));
    }
}

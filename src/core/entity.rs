//! Dictionary-driven entity placeholders.
//!
//! An entity dictionary maps source-side surface forms to a translation and
//! a type. [`EntityMatcher::replace`] swaps every dictionary hit in a
//! sentence for a placeholder such as `<--plhd-PN-0/>` and returns the
//! placeholder → translation pairs so they can be restored after
//! translation.
//!
//! # Dictionary Format
//!
//! ```text
//! New York;纽约;LOC
//! Alice;爱丽丝;
//! ```
//!
//! One `entity;entity;type` triple per line. The first column is the key
//! unless the matcher is built reversed. An empty type becomes `PN`.
//!
//! Keys and text are compared after Unicode lowercasing, one character at a
//! time. Placeholders replace the original-case span of the text.

use std::path::Path;
use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, BuildError, MatchKind};
use log::debug;
use rustc_hash::FxHashMap;

use super::encoder::CodecError;
use super::merges::FormatError;

const DEFAULT_ENTITY_TYPE: &str = "PN";

/// Default cut-off for [`FrequencyFilter`].
pub const DEFAULT_RARE_PERCENTAGE: f64 = 0.9;

/// Translation and type for one dictionary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub value: String,
    pub kind: String,
}

/// Placeholder text and the entity translation it stands for.
pub type Replacement = (String, String);

/// Keeps only matches whose surface form is rare in a frequency-ordered
/// word list.
///
/// A surface form passes when it appears in the list and its first position
/// divided by the list length is above `percentage`.
#[derive(Debug, Clone)]
pub struct FrequencyFilter {
    positions: FxHashMap<String, usize>,
    total: usize,
    percentage: f64,
}

impl FrequencyFilter {
    /// `words` must be ordered from most to least frequent.
    pub fn new<I, S>(words: I, percentage: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut positions = FxHashMap::default();
        let mut total = 0;
        for word in words {
            positions.entry(word.into()).or_insert(total);
            total += 1;
        }
        Self {
            positions,
            total,
            percentage,
        }
    }

    pub fn keeps(&self, surface: &str) -> bool {
        match self.positions.get(surface) {
            Some(&pos) => pos as f64 / self.total as f64 > self.percentage,
            None => false,
        }
    }
}

/// Lowercased text plus, for every byte of it, the byte span of the source
/// character it came from.
struct FoldedText {
    text: String,
    spans: Vec<(usize, usize)>,
}

impl FoldedText {
    fn new(source: &str) -> Self {
        let mut text = String::with_capacity(source.len());
        let mut spans = Vec::with_capacity(source.len());
        for (start, ch) in source.char_indices() {
            let span = (start, start + ch.len_utf8());
            for lower in ch.to_lowercase() {
                text.push(lower);
                spans.extend(std::iter::repeat(span).take(lower.len_utf8()));
            }
        }
        Self { text, spans }
    }

    /// Source byte range covering folded bytes `start..end` (non-empty).
    fn source_range(&self, start: usize, end: usize) -> (usize, usize) {
        (self.spans[start].0, self.spans[end - 1].1)
    }
}

fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Explicitly owned entity dictionary with an Aho-Corasick matcher.
///
/// Matching is Unicode case-insensitive, leftmost-longest and
/// non-overlapping. The automaton is built on first use and rebuilt after
/// [`add_entity`](Self::add_entity).
#[derive(Debug, Default)]
pub struct EntityMatcher {
    keys: Vec<String>,
    entities: Vec<Entity>,
    index: FxHashMap<String, usize>,
    automaton: OnceLock<Result<AhoCorasick, BuildError>>,
}

impl EntityMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse dictionary text. With `reverse`, the second column is the key.
    pub fn parse(text: &str, reverse: bool) -> Result<Self, FormatError> {
        let mut matcher = Self::new();

        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(';').collect();
            let [first, second, kind] = fields.as_slice() else {
                return Err(FormatError::EntityLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            let (key, value) = if reverse {
                (second, first)
            } else {
                (first, second)
            };
            matcher.add_entity(key, value, kind);
        }

        debug!("loaded {} entity entries", matcher.len());
        Ok(matcher)
    }

    /// Load a dictionary file from disk.
    pub fn from_file(path: impl AsRef<Path>, reverse: bool) -> Result<Self, FormatError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, reverse)
    }

    /// Add or replace one entry. Keys are lowercased; empty keys are ignored.
    pub fn add_entity(&mut self, key: &str, value: &str, kind: &str) {
        let key = fold_case(key);
        if key.is_empty() {
            return;
        }
        let entity = Entity {
            value: value.to_string(),
            kind: kind.to_string(),
        };

        match self.index.get(&key) {
            Some(&idx) => self.entities[idx] = entity,
            None => {
                self.index.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.entities.push(entity);
                self.automaton = OnceLock::new();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Look up an entry by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&Entity> {
        self.index
            .get(&fold_case(key))
            .map(|&idx| &self.entities[idx])
    }

    fn automaton(&self) -> Result<&AhoCorasick, CodecError> {
        self.automaton
            .get_or_init(|| {
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&self.keys)
            })
            .as_ref()
            .map_err(|err| CodecError::Matcher(err.clone()))
    }

    /// Replace every entity occurrence in `text` with a typed placeholder.
    ///
    /// Placeholders are numbered per type from 0 within one call.
    pub fn replace(&self, text: &str) -> Result<(String, Vec<Replacement>), CodecError> {
        self.replace_filtered(text, None)
    }

    /// Like [`replace`](Self::replace), but with a `filter` only matches
    /// whose original-case surface form it keeps are replaced. Skipped
    /// matches stay in the text and do not consume a placeholder number.
    pub fn replace_filtered(
        &self,
        text: &str,
        filter: Option<&FrequencyFilter>,
    ) -> Result<(String, Vec<Replacement>), CodecError> {
        if self.is_empty() {
            return Ok((text.to_string(), Vec::new()));
        }
        let automaton = self.automaton()?;
        let folded = FoldedText::new(text);

        let mut output = String::with_capacity(text.len());
        let mut found = Vec::new();
        let mut counters: FxHashMap<&str, usize> = FxHashMap::default();
        let mut last = 0;

        for m in automaton.find_iter(&folded.text) {
            let (start, end) = folded.source_range(m.start(), m.end());
            // A match that starts inside an already replaced character.
            if start < last {
                continue;
            }
            if filter.is_some_and(|f| !f.keeps(&text[start..end])) {
                continue;
            }

            let entity = &self.entities[m.pattern().as_usize()];
            let kind = if entity.kind.is_empty() {
                DEFAULT_ENTITY_TYPE
            } else {
                entity.kind.as_str()
            };
            let counter = counters.entry(kind).or_insert(0);
            let placeholder = format!("<--plhd-{kind}-{counter}/>");
            *counter += 1;

            output.push_str(&text[last..start]);
            output.push_str(&placeholder);
            found.push((placeholder, entity.value.clone()));
            last = end;
        }
        output.push_str(&text[last..]);

        Ok((output, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICT: &str = "New York;纽约;LOC\nYork;约克;LOC\nAlice;爱丽丝;\n";

    #[test]
    fn test_parse_and_lookup() {
        let matcher = EntityMatcher::parse(DICT, false).unwrap();
        assert_eq!(matcher.len(), 3);
        assert_eq!(matcher.get("new york").map(|e| e.value.as_str()), Some("纽约"));

        let reversed = EntityMatcher::parse(DICT, true).unwrap();
        assert_eq!(reversed.get("纽约").map(|e| e.value.as_str()), Some("New York"));
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        let err = EntityMatcher::parse("a;b;c\na;b\n", false).unwrap_err();
        assert!(matches!(err, FormatError::EntityLine { line: 2, .. }));
    }

    #[test]
    fn test_replace_leftmost_longest() {
        let matcher = EntityMatcher::parse(DICT, false).unwrap();
        let (text, found) = matcher
            .replace("alice flew to new york and York")
            .unwrap();
        assert_eq!(
            text,
            "<--plhd-PN-0/> flew to <--plhd-LOC-0/> and <--plhd-LOC-1/>"
        );
        assert_eq!(
            found,
            vec![
                ("<--plhd-PN-0/>".to_string(), "爱丽丝".to_string()),
                ("<--plhd-LOC-0/>".to_string(), "纽约".to_string()),
                ("<--plhd-LOC-1/>".to_string(), "约克".to_string()),
            ]
        );
    }

    #[test]
    fn test_add_entity_rebuilds_matcher() {
        let mut matcher = EntityMatcher::new();
        assert_eq!(matcher.replace("Bob").unwrap().0, "Bob");

        matcher.add_entity("Bob", "鲍勃", "PER");
        let (text, found) = matcher.replace("hi Bob").unwrap();
        assert_eq!(text, "hi <--plhd-PER-0/>");
        assert_eq!(found.len(), 1);

        matcher.add_entity("bob", "宝宝", "PER");
        assert_eq!(matcher.len(), 1);
        assert_eq!(matcher.replace("Bob").unwrap().1[0].1, "宝宝");
    }

    #[test]
    fn test_non_ascii_capitals_match() {
        let matcher = EntityMatcher::parse("Élysée;爱丽舍;LOC\nÖsterreich;奥地利;LOC\n", false).unwrap();
        let (text, found) = matcher.replace("visit Élysée in Österreich").unwrap();
        assert_eq!(text, "visit <--plhd-LOC-0/> in <--plhd-LOC-1/>");
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].1, "奥地利");

        let (text, found) = matcher.replace("ÉLYSÉE, élysée").unwrap();
        assert_eq!(text, "<--plhd-LOC-0/>, <--plhd-LOC-1/>");
        assert_eq!(found.len(), 2);
        assert_eq!(matcher.get("ÖSTERREICH").map(|e| e.value.as_str()), Some("奥地利"));
    }

    #[test]
    fn test_length_changing_lowercase_keeps_offsets() {
        // `İ` lowercases to two characters, three bytes.
        let matcher = EntityMatcher::parse("İstanbul;伊斯坦布尔;LOC\nAnkara;安卡拉;LOC\n", false).unwrap();
        let (text, found) = matcher.replace("İstanbul → Ankara").unwrap();
        assert_eq!(text, "<--plhd-LOC-0/> → <--plhd-LOC-1/>");
        assert_eq!(found[0].1, "伊斯坦布尔");
        assert_eq!(found[1].1, "安卡拉");
    }

    #[test]
    fn test_frequency_filter() {
        let ranked: Vec<String> = (0..10).map(|i| format!("w{i}")).chain(["Alice".to_string()]).collect();
        let filter = FrequencyFilter::new(ranked, DEFAULT_RARE_PERCENTAGE);
        assert!(filter.keeps("Alice"));
        assert!(!filter.keeps("w0"));
        assert!(!filter.keeps("alice"));
        assert!(!filter.keeps("Bob"));

        let matcher = EntityMatcher::parse("Alice;爱丽丝;\nBob;鲍勃;\n", false).unwrap();
        let (text, found) = matcher
            .replace_filtered("Bob met Alice", Some(&filter))
            .unwrap();
        assert_eq!(text, "Bob met <--plhd-PN-0/>");
        assert_eq!(found, vec![("<--plhd-PN-0/>".to_string(), "爱丽丝".to_string())]);
    }
}

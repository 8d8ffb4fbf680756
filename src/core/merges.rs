//! Merge-table loading for learned BPE codes.
//!
//! A codes file lists symbol pairs in the order they were learned. The line
//! index of a pair is its priority: lower values are merged first.
//!
//! # Codes Format
//!
//! ```text
//! #version: 0.2
//! l o
//! lo w
//! e r</w>
//! ```
//!
//! The optional `#version:` header selects how a word's initial symbols are
//! built:
//! - `0.1`: the end-of-word marker `</w>` is a separate trailing symbol
//! - `0.2`: the marker is fused onto the word's final character
//!
//! Headerless files are read as `0.2` by [`MergeTable::parse`]; use
//! [`MergeTable::parse_with_default`] for legacy `0.1` codes without a header.

use std::collections::hash_map::Entry;
use std::fmt;
use std::path::Path;

use log::{debug, warn};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Internal sentinel marking the end of a word during merging.
pub const END_OF_WORD: &str = "</w>";

/// Errors raised while reading codes, vocabulary or entity files.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("line {line}: expected two whitespace-separated symbols, got {content:?}")]
    MergeLine { line: usize, content: String },
    #[error("invalid version header: {content:?}")]
    VersionHeader { content: String },
    #[error("unsupported codes version: {0}")]
    UnsupportedVersion(String),
    #[error("line {line}: expected `token frequency`, got {content:?}")]
    VocabLine { line: usize, content: String },
    #[error("line {line}: expected `entity;entity;type`, got {content:?}")]
    EntityLine { line: usize, content: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Format version of a codes file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodesVersion {
    /// `</w>` appended as its own symbol.
    V0_1,
    /// `</w>` fused onto the final character.
    V0_2,
}

impl CodesVersion {
    /// Parse a `#version: X.Y` header line.
    ///
    /// Trailing `.0` groups are ignored, so `0.2.0` reads as `0.2`.
    pub fn from_header(line: &str) -> Result<Self, FormatError> {
        let header_error = || FormatError::VersionHeader {
            content: line.to_string(),
        };

        let field = line.split_whitespace().last().ok_or_else(header_error)?;

        let mut trimmed = field;
        while let Some(pos) = trimmed.rfind('.') {
            let tail = &trimmed[pos + 1..];
            if tail.is_empty() || !tail.bytes().all(|b| b == b'0') {
                break;
            }
            trimmed = &trimmed[..pos];
        }

        let parts = trimmed
            .split('.')
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| header_error())?;

        match parts.as_slice() {
            [0, 1] => Ok(Self::V0_1),
            [0, 2] => Ok(Self::V0_2),
            _ => Err(FormatError::UnsupportedVersion(field.to_string())),
        }
    }
}

impl fmt::Display for CodesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V0_1 => f.write_str("0.1"),
            Self::V0_2 => f.write_str("0.2"),
        }
    }
}

/// A single merge rule, addressed by interned symbol ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Merge {
    pub rank: u32,
    pub merged: u32,
}

/// Immutable pair → priority table, plus the reverse map used for
/// vocabulary-constrained splitting.
///
/// Every symbol that appears in a rule (left side, right side, and the
/// concatenation) is interned to a `u32` id so the merge loop can compare
/// pairs without allocating.
#[derive(Debug, Clone)]
pub struct MergeTable {
    version: CodesVersion,
    symbols: FxHashMap<String, u32>,
    merges: FxHashMap<(u32, u32), Merge>,
    reverse: FxHashMap<String, (String, String)>,
    ambiguous: usize,
}

impl MergeTable {
    /// Parse codes text. Headerless input is treated as version `0.2`.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        Self::parse_with_default(text, CodesVersion::V0_2)
    }

    /// Parse codes text, using `default_version` when there is no header.
    pub fn parse_with_default(
        text: &str,
        default_version: CodesVersion,
    ) -> Result<Self, FormatError> {
        let mut version = default_version;
        let mut pairs = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            if idx == 0 && line.starts_with("#version:") {
                version = CodesVersion::from_header(line)?;
                continue;
            }

            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (None, _, _) => continue,
                (Some(left), Some(right), None) => pairs.push((left, right)),
                _ => {
                    return Err(FormatError::MergeLine {
                        line: idx + 1,
                        content: line.to_string(),
                    })
                }
            }
        }

        Ok(Self::from_pairs(version, pairs))
    }

    /// Load a codes file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Build a table from pairs given in priority order.
    ///
    /// The first occurrence of a pair fixes its priority; later duplicates
    /// are ignored. When two pairs concatenate to the same surface string,
    /// the reverse map keeps the earlier (higher priority) one.
    pub fn from_pairs<I, S>(version: CodesVersion, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut table = Self {
            version,
            symbols: FxHashMap::default(),
            merges: FxHashMap::default(),
            reverse: FxHashMap::default(),
            ambiguous: 0,
        };
        let mut first_collision: Option<String> = None;

        for (rank, (left, right)) in pairs.into_iter().enumerate() {
            let (left, right) = (left.as_ref(), right.as_ref());
            let left_id = table.intern(left);
            let right_id = table.intern(right);
            if table.merges.contains_key(&(left_id, right_id)) {
                continue;
            }

            let merged_text = format!("{left}{right}");
            let merged = table.intern(&merged_text);
            table.merges.insert(
                (left_id, right_id),
                Merge {
                    rank: rank as u32,
                    merged,
                },
            );

            match table.reverse.entry(merged_text) {
                Entry::Vacant(slot) => {
                    slot.insert((left.to_string(), right.to_string()));
                }
                Entry::Occupied(slot) => {
                    table.ambiguous += 1;
                    first_collision.get_or_insert_with(|| slot.key().clone());
                }
            }
        }

        if let Some(surface) = first_collision {
            warn!(
                "{} merge pair(s) concatenate to an existing merged symbol (first: {:?}); \
                 reverse splits use the highest-priority pair",
                table.ambiguous, surface
            );
        }
        debug!(
            "loaded {} merge rules (codes version {})",
            table.merges.len(),
            table.version
        );

        table
    }

    fn intern(&mut self, symbol: &str) -> u32 {
        if let Some(&id) = self.symbols.get(symbol) {
            return id;
        }
        let id = self.symbols.len() as u32;
        self.symbols.insert(symbol.to_string(), id);
        id
    }

    /// Codes format version.
    pub fn version(&self) -> CodesVersion {
        self.version
    }

    /// Number of distinct merge rules.
    pub fn len(&self) -> usize {
        self.merges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }

    /// Priority of the pair `(left, right)`, or `None` if it never merges.
    pub fn rank(&self, left: &str, right: &str) -> Option<u32> {
        let left = self.symbol_id(left)?;
        let right = self.symbol_id(right)?;
        self.merge(left, right).map(|m| m.rank)
    }

    /// The pair that produced `merged`, if any.
    pub fn split(&self, merged: &str) -> Option<(&str, &str)> {
        self.reverse
            .get(merged)
            .map(|(left, right)| (left.as_str(), right.as_str()))
    }

    /// Number of pairs whose concatenation collided with an earlier pair.
    pub fn ambiguous_merges(&self) -> usize {
        self.ambiguous
    }

    #[inline]
    pub(crate) fn symbol_id(&self, symbol: &str) -> Option<u32> {
        self.symbols.get(symbol).copied()
    }

    #[inline]
    pub(crate) fn merge(&self, left: u32, right: u32) -> Option<Merge> {
        self.merges.get(&(left, right)).copied()
    }
}

/// An empty `0.2` table: every segment splits into characters.
impl Default for MergeTable {
    fn default() -> Self {
        Self::from_pairs(CodesVersion::V0_2, std::iter::empty::<(&str, &str)>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header() {
        let table = MergeTable::parse("#version: 0.2\nl o\nlo w\n").unwrap();
        assert_eq!(table.version(), CodesVersion::V0_2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rank("l", "o"), Some(0));
        assert_eq!(table.rank("lo", "w"), Some(1));
        assert_eq!(table.rank("o", "w"), None);
    }

    #[test]
    fn test_headerless_defaults() {
        let table = MergeTable::parse("a b\n").unwrap();
        assert_eq!(table.version(), CodesVersion::V0_2);

        let legacy = MergeTable::parse_with_default("a b\n", CodesVersion::V0_1).unwrap();
        assert_eq!(legacy.version(), CodesVersion::V0_1);
        assert_eq!(legacy.rank("a", "b"), Some(0));
    }

    #[test]
    fn test_version_header_trailing_zeros() {
        assert_eq!(
            CodesVersion::from_header("#version: 0.1.0").unwrap(),
            CodesVersion::V0_1
        );
        assert_eq!(
            CodesVersion::from_header("#version: 0.2.00").unwrap(),
            CodesVersion::V0_2
        );
        assert!(matches!(
            CodesVersion::from_header("#version: 0.3"),
            Err(FormatError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            CodesVersion::from_header("#version: zero"),
            Err(FormatError::VersionHeader { .. })
        ));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let table = MergeTable::parse("a b\nc d\na b\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rank("a", "b"), Some(0));
        assert_eq!(table.rank("c", "d"), Some(1));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = MergeTable::parse("#version: 0.2\na b\nabc\n").unwrap_err();
        match err {
            FormatError::MergeLine { line, content } => {
                assert_eq!(line, 3);
                assert_eq!(content, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(MergeTable::parse("a b c\n").is_err());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let table = MergeTable::parse("a b\n\nb c\n").unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.rank("a", "b") < table.rank("b", "c"));
    }

    #[test]
    fn test_reverse_map() {
        let table = MergeTable::parse("a b\nab c</w>\n").unwrap();
        assert_eq!(table.split("ab"), Some(("a", "b")));
        assert_eq!(table.split("abc</w>"), Some(("ab", "c</w>")));
        assert_eq!(table.split("abc"), None);
        assert_eq!(table.ambiguous_merges(), 0);
    }

    #[test]
    fn test_reverse_collision_keeps_earliest() {
        let table = MergeTable::parse("ab c\na bc\n").unwrap();
        assert_eq!(table.split("abc"), Some(("ab", "c")));
        assert_eq!(table.ambiguous_merges(), 1);
        // Both pairs still merge.
        assert_eq!(table.rank("a", "bc"), Some(1));
    }
}

//! Vocabulary loading and construction utilities.
//!
//! A vocabulary file holds one `token frequency` pair per line, separated by
//! a tab or a space:
//!
//! ```text
//! the@@	120394
//! low	5321
//! er	4410
//! ```
//!
//! Word-internal subwords are stored with the separator attached (`the@@`),
//! word-final subwords bare (`low`). The encoder checks units against the
//! vocabulary in the matching form.

use std::io::{self, BufRead, Write};
use std::path::Path;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use super::merges::FormatError;

/// Set of in-vocabulary subword strings.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entries: FxHashSet<String>,
}

impl Vocabulary {
    /// Parse vocabulary text, keeping entries with `frequency >= threshold`.
    ///
    /// With no threshold every entry is kept.
    pub fn parse(text: &str, threshold: Option<u64>) -> Result<Self, FormatError> {
        let mut entries = FxHashSet::default();
        let mut dropped = 0usize;

        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (token, frequency) = parse_count_line(line, idx + 1, true)?;
            if threshold.map_or(true, |min| frequency >= min) {
                entries.insert(token.to_string());
            } else {
                dropped += 1;
            }
        }

        debug!(
            "loaded vocabulary: {} entries kept, {} below threshold",
            entries.len(),
            dropped
        );
        Ok(Self { entries })
    }

    /// Load a vocabulary file from disk.
    pub fn from_file(path: impl AsRef<Path>, threshold: Option<u64>) -> Result<Self, FormatError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, threshold)
    }

    /// Build a vocabulary directly from tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains(token)
    }

    /// Whether `unit` is covered in the form it would be emitted in:
    /// bare when it ends a segment, otherwise followed by `separator`.
    pub fn covers(&self, unit: &str, final_unit: bool, separator: &str) -> bool {
        if final_unit {
            self.entries.contains(unit)
        } else {
            let mut joined = String::with_capacity(unit.len() + separator.len());
            joined.push_str(unit);
            joined.push_str(separator);
            self.entries.contains(joined.as_str())
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a `token count` line. `strict` rejects extra fields.
fn parse_count_line(line: &str, line_no: usize, strict: bool) -> Result<(&str, u64), FormatError> {
    let bad_line = || FormatError::VocabLine {
        line: line_no,
        content: line.to_string(),
    };

    let mut fields = line.split_whitespace();
    let token = fields.next().ok_or_else(bad_line)?;
    let count = fields
        .next()
        .ok_or_else(bad_line)?
        .parse::<u64>()
        .map_err(|_| bad_line())?;
    if strict && fields.next().is_some() {
        return Err(bad_line());
    }
    Ok((token, count))
}

/// Count whitespace-separated tokens over a text stream.
pub fn count_tokens<R: BufRead>(reader: R) -> io::Result<FxHashMap<String, u64>> {
    let mut counts = FxHashMap::default();
    for line in reader.lines() {
        let line = line?;
        for token in line.split_whitespace() {
            *counts.entry(token.to_string()).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Read a `token count` dictionary. Fields after the count are ignored;
/// a repeated token keeps its last count.
pub fn read_counts(text: &str) -> Result<FxHashMap<String, u64>, FormatError> {
    let mut counts = FxHashMap::default();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (token, count) = parse_count_line(line, idx + 1, false)?;
        counts.insert(token.to_string(), count);
    }
    Ok(counts)
}

/// Filter and order a token count table.
///
/// Entries below `min_frequency` are dropped (when it is non-zero), the rest
/// are sorted by count then token, both descending, and truncated to
/// `max_size` when given and non-zero.
pub fn cut_vocabulary(
    counts: FxHashMap<String, u64>,
    min_frequency: u64,
    max_size: Option<usize>,
) -> Vec<(String, u64)> {
    let total = counts.len();
    let mut entries: Vec<(String, u64)> = counts
        .into_iter()
        .filter(|&(_, count)| min_frequency == 0 || count >= min_frequency)
        .collect();
    debug!(
        "{} unique tokens, {} with frequency >= {}",
        total,
        entries.len(),
        min_frequency
    );

    entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    if let Some(max) = max_size.filter(|&max| max > 0) {
        entries.truncate(max);
    }
    entries
}

/// Write entries as `token<TAB>count` lines.
pub fn write_counts<W: Write>(mut writer: W, entries: &[(String, u64)]) -> io::Result<()> {
    for (token, count) in entries {
        writeln!(writer, "{token}\t{count}")?;
    }
    writer.flush()
}

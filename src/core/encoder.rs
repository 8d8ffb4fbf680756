use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use super::bpe::encode_segment;
use super::cache::SegmentCache;
use super::decoder::{decode, decode_line, DEFAULT_SEPARATOR};
use super::glossary::Glossary;
use super::merges::{FormatError, MergeTable};
use super::vocab::Vocabulary;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("Invalid input word {word:?}: {reason}")]
    Input { word: String, reason: &'static str },
    #[error("Aho-Corasick build error: {0}")]
    Matcher(#[from] aho_corasick::BuildError),
}

/// File-based configuration for [`Bpe::from_config`].
#[derive(Debug, Clone)]
pub struct BpeConfig {
    /// Learned merge codes.
    pub codes: PathBuf,
    /// Optional `token frequency` vocabulary restricting the output units.
    pub vocabulary: Option<PathBuf>,
    /// Entries below this frequency are ignored.
    pub vocabulary_threshold: Option<u64>,
    /// Optional file of protected literals, one per line.
    pub glossary: Option<PathBuf>,
    /// Protect the pipeline's placeholder symbols.
    pub reserved_symbols: bool,
    pub separator: String,
    /// `None` keeps every segment for the lifetime of the encoder.
    pub cache_capacity: Option<usize>,
}

impl BpeConfig {
    pub fn new(codes: impl Into<PathBuf>) -> Self {
        Self {
            codes: codes.into(),
            vocabulary: None,
            vocabulary_threshold: None,
            glossary: None,
            reserved_symbols: true,
            separator: DEFAULT_SEPARATOR.to_string(),
            cache_capacity: None,
        }
    }
}

/// Reversible BPE subword codec.
///
/// Holds a merge table, an optional vocabulary and a glossary, all
/// read-only and shared via `Arc`, plus a segment cache that only grows
/// (unless a capacity is set).
///
/// # Concurrency
///
/// `Bpe` is `Sync`: one instance can serve many threads, which then share
/// its cache behind a mutex. Cloning is cheap and gives the clone its own
/// empty cache, so a worker pool can also hold one clone per worker. The
/// output does not depend on which of the two is used.
///
/// # Example
///
/// ```ignore
/// let table = MergeTable::parse("l o\nlo w\n")?;
/// let bpe = Bpe::new(table);
/// assert_eq!(bpe.encode_word("low")?, vec!["lo@@", "w"]);
/// assert_eq!(bpe.decode_str("lo@@ w"), "low");
/// ```
pub struct Bpe {
    table: Arc<MergeTable>,
    vocabulary: Option<Arc<Vocabulary>>,
    glossary: Arc<Glossary>,
    separator: String,
    cache: SegmentCache,
}

impl Bpe {
    /// Codec with the default separator, no vocabulary and no glossary.
    pub fn new(table: MergeTable) -> Self {
        Self {
            table: Arc::new(table),
            vocabulary: None,
            glossary: Arc::new(Glossary::default()),
            separator: DEFAULT_SEPARATOR.to_string(),
            cache: SegmentCache::unbounded(),
        }
    }

    /// Load codes, vocabulary and glossary files described by `config`.
    pub fn from_config(config: &BpeConfig) -> Result<Self, CodecError> {
        let table = MergeTable::from_file(&config.codes)?;

        let glossary = match &config.glossary {
            Some(path) => Glossary::from_file(path, config.reserved_symbols)?,
            None if config.reserved_symbols => Glossary::reserved()?,
            None => Glossary::default(),
        };

        let mut bpe = Self::new(table)
            .with_separator(config.separator.clone())
            .with_glossary(glossary);

        if let Some(path) = &config.vocabulary {
            let vocab = Vocabulary::from_file(path, config.vocabulary_threshold)?;
            bpe = bpe.with_vocabulary(vocab);
        }
        if let Some(capacity) = config.cache_capacity {
            bpe = bpe.with_cache_capacity(capacity);
        }

        Ok(bpe)
    }

    /// Set the subword separator (default `@@`). Clears the cache.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self.cache = self.cache.fresh();
        self
    }

    /// Restrict output units to `vocabulary`. Clears the cache.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = Some(Arc::new(vocabulary));
        self.cache = self.cache.fresh();
        self
    }

    /// Protect the literals of `glossary`. Clears the cache.
    pub fn with_glossary(mut self, glossary: Glossary) -> Self {
        self.glossary = Arc::new(glossary);
        self.cache = self.cache.fresh();
        self
    }

    /// Bound the segment cache; `0` means unbounded.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = SegmentCache::with_capacity(capacity);
        self
    }

    pub fn table(&self) -> &MergeTable {
        &self.table
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_deref()
    }

    pub fn glossary(&self) -> &Glossary {
        &self.glossary
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Resolve one segment to its units, via the cache.
    ///
    /// A glossary entry is cached as itself and never merged.
    fn segment_units(&self, segment: &str) -> Vec<String> {
        if let Some(cached) = self.cache.get(segment) {
            return cached;
        }

        let units = if self.glossary.contains(segment) {
            vec![segment.to_string()]
        } else {
            encode_segment(
                segment,
                &self.table,
                self.vocabulary.as_deref(),
                &self.separator,
            )
        };
        self.cache.put(segment, units.clone());
        units
    }

    /// Encode a single word into subword units.
    ///
    /// Every unit except the last carries the separator.
    ///
    /// # Errors
    /// [`CodecError::Input`] if `word` is empty or contains whitespace.
    pub fn encode_word(&self, word: &str) -> Result<Vec<String>, CodecError> {
        if word.is_empty() {
            return Err(CodecError::Input {
                word: word.to_string(),
                reason: "empty word",
            });
        }
        if word.chars().any(char::is_whitespace) {
            return Err(CodecError::Input {
                word: word.to_string(),
                reason: "word contains whitespace",
            });
        }

        let mut units = Vec::new();
        // Protected segments are glossary entries, which resolve to themselves.
        for segment in self.glossary.isolate(word) {
            units.extend(self.segment_units(segment.text));
        }

        let last = units.len().saturating_sub(1);
        for unit in &mut units[..last] {
            unit.push_str(&self.separator);
        }
        Ok(units)
    }

    /// Encode a whitespace-tokenized sentence.
    pub fn encode(&self, sentence: &str) -> Result<Vec<String>, CodecError> {
        let mut output = Vec::new();
        for word in sentence.split_whitespace() {
            output.extend(self.encode_word(word)?);
        }
        Ok(output)
    }

    /// Encode a sentence and join the units with single spaces.
    pub fn encode_to_string(&self, sentence: &str) -> Result<String, CodecError> {
        Ok(self.encode(sentence)?.join(" "))
    }

    /// Encode many sentences in parallel, preserving order.
    ///
    /// The first failing sentence aborts the whole batch.
    pub fn encode_batch(&self, sentences: &[String]) -> Result<Vec<String>, CodecError> {
        sentences
            .par_iter()
            .map(|sentence| self.encode_to_string(sentence))
            .collect()
    }

    /// Rebuild surface text from subword units.
    pub fn decode<S: AsRef<str>>(&self, tokens: &[S]) -> String {
        decode(tokens, &self.separator)
    }

    /// Rebuild surface text from a space-separated encoded line.
    pub fn decode_str(&self, line: &str) -> String {
        decode_line(line, &self.separator)
    }

    /// Decode many lines in parallel, preserving order.
    pub fn decode_batch(&self, lines: &[String]) -> Vec<String> {
        lines.par_iter().map(|line| self.decode_str(line)).collect()
    }

    /// Number of cached segments.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached segment.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl Clone for Bpe {
    fn clone(&self) -> Self {
        // Tables are shared; caches are not.
        Self {
            table: Arc::clone(&self.table),
            vocabulary: self.vocabulary.clone(),
            glossary: Arc::clone(&self.glossary),
            separator: self.separator.clone(),
            cache: self.cache.fresh(),
        }
    }
}

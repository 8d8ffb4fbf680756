//! Protected strings that are never segmented.
//!
//! Each glossary entry is a literal. Isolation applies entries in order:
//! every unprotected segment is split on the non-overlapping occurrences of
//! the current entry, and the occurrences become protected segments that
//! later entries leave alone.

use std::path::Path;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use log::debug;
use rustc_hash::FxHashSet;

use super::encoder::CodecError;
use super::merges::FormatError;

const RESERVED_PREFIXES: [&str; 4] = [
    "emoji_trans_ph",
    "ignore_trans_ph",
    "no_trans_ph",
    "punc_trans_ph",
];
const RESERVED_PER_PREFIX: usize = 10;
const BREAKER_SYMBOL: &str = "no_trans_breaker/>";

/// Placeholder symbols inserted by the preprocessing pipeline.
static RESERVED_SYMBOLS: LazyLock<Vec<String>> = LazyLock::new(|| {
    let mut symbols = Vec::with_capacity(RESERVED_PREFIXES.len() * (RESERVED_PER_PREFIX + 1) + 1);
    for prefix in RESERVED_PREFIXES {
        for idx in 0..RESERVED_PER_PREFIX {
            symbols.push(format!("{prefix}{idx}/>"));
        }
        symbols.push(format!("{prefix}/>"));
    }
    symbols.push(BREAKER_SYMBOL.to_string());
    symbols
});

/// The built-in placeholder symbols (`emoji_trans_ph0/>`, ..., `no_trans_breaker/>`).
pub fn reserved_symbols() -> &'static [String] {
    &RESERVED_SYMBOLS
}

/// A piece of a word after glossary isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub protected: bool,
}

impl<'a> Segment<'a> {
    fn plain(text: &'a str) -> Self {
        Self {
            text,
            protected: false,
        }
    }
}

/// Ordered list of protected literals.
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    entries: Vec<String>,
    lookup: FxHashSet<String>,
    matcher: Option<AhoCorasick>,
}

impl Glossary {
    /// Build a glossary from literals. Entries are trimmed; empty entries
    /// and repeats are dropped, first position wins.
    pub fn new<I, S>(entries: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut lookup = FxHashSet::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if !entry.is_empty() && lookup.insert(entry.to_string()) {
                ordered.push(entry.to_string());
            }
        }

        // Only used to reject words with no glossary occurrence at all.
        let matcher = if ordered.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(&ordered)?)
        };

        debug!("glossary built with {} entries", ordered.len());
        Ok(Self {
            entries: ordered,
            lookup,
            matcher,
        })
    }

    /// Glossary holding only the reserved placeholder symbols.
    pub fn reserved() -> Result<Self, CodecError> {
        Self::new(reserved_symbols())
    }

    /// Load one literal per line, optionally followed by the reserved symbols.
    pub fn from_file(path: impl AsRef<Path>, with_reserved: bool) -> Result<Self, CodecError> {
        let text = std::fs::read_to_string(path).map_err(FormatError::from)?;
        let lines = text.lines().map(str::to_string);
        if with_reserved {
            Self::new(lines.chain(reserved_symbols().iter().cloned()))
        } else {
            Self::new(lines)
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact membership.
    pub fn contains(&self, text: &str) -> bool {
        self.lookup.contains(text)
    }

    /// Split `word` into protected and unprotected segments, in order.
    pub fn isolate<'a>(&self, word: &'a str) -> Vec<Segment<'a>> {
        let whole = Segment {
            text: word,
            protected: self.contains(word),
        };
        let Some(ref matcher) = self.matcher else {
            return vec![whole];
        };
        if whole.protected || !matcher.is_match(word) {
            return vec![whole];
        }

        let mut segments = vec![whole];
        for gloss in &self.entries {
            if !segments
                .iter()
                .any(|s| !s.protected && s.text.contains(gloss.as_str()))
            {
                continue;
            }
            segments = segments
                .into_iter()
                .flat_map(|s| isolate_entry(s, gloss))
                .collect();
        }
        segments
    }
}

fn isolate_entry<'a>(segment: Segment<'a>, gloss: &str) -> Vec<Segment<'a>> {
    if segment.protected || !segment.text.contains(gloss) {
        return vec![segment];
    }

    let text = segment.text;
    let mut out = Vec::new();
    let mut last = 0;
    for (start, matched) in text.match_indices(gloss) {
        push_unprotected(&mut out, &text[last..start]);
        out.push(Segment {
            text: matched,
            protected: true,
        });
        last = start + matched.len();
    }
    push_unprotected(&mut out, &text[last..]);
    out
}

fn push_unprotected<'a>(out: &mut Vec<Segment<'a>>, text: &'a str) {
    let text = text.trim();
    if !text.is_empty() {
        out.push(Segment::plain(text));
    }
}

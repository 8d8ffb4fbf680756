//! Subsplit - reversible BPE subword segmentation.
//!
//! Splits whitespace-tokenized text into subword units with learned merge
//! codes, marking every non-final unit of a word with a separator (`@@` by
//! default) so that decoding restores the original words exactly.
//!
//! - Rank-ordered greedy merges, codes versions 0.1 and 0.2
//! - Optional vocabulary constraint with reverse-merge splitting
//! - Glossary literals that are never split
//! - LRU segment cache and Rayon parallel batches
//! - Streaming decoder for unit-by-unit output

pub mod core;

pub use core::{
    Bpe, BpeConfig, BatchConfig, BatchDriver, BatchError, CodecError, CodesVersion, EntityMatcher,
    FormatError, Glossary, MergeTable, Mode, StreamingDecoder, Vocabulary, DEFAULT_SEPARATOR,
};

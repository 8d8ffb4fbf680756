//! Core segmentation engine for subsplit.
//!
//! This module contains the reversible BPE subword codec with:
//! - Merge-code loading with version detection and a reverse merge map
//! - A greedy, rank-ordered merge loop over interned symbols
//! - Vocabulary-constrained re-splitting of rare units
//! - Glossary isolation of protected literals
//! - Per-segment LRU caching and Rayon-parallel batch processing
//!
//! # Architecture
//!
//! - [`MergeTable`]: ranked merge rules parsed from a codes file
//! - [`Bpe`]: main codec with encode/decode API, segment cache, optional
//!   [`Vocabulary`] and [`Glossary`]
//! - [`bpe`]: low-level merge loop and out-of-vocabulary splitting
//! - [`StreamingDecoder`]: word reassembly for unit-by-unit output
//! - [`BatchDriver`]: windowed, order-preserving parallel line processing
//! - [`EntityMatcher`]: dictionary-driven entity placeholders
//! - [`vocab`]: vocabulary files plus token counting and cutting utilities

pub mod batch;
pub mod bpe;
mod cache;
mod decoder;
mod encoder;
mod entity;
mod glossary;
mod merges;
mod streaming;
pub mod vocab;

pub use batch::{BatchConfig, BatchDriver, BatchError, BatchStats, Mode};
pub use cache::SegmentCache;
pub use decoder::{decode, decode_line, DEFAULT_SEPARATOR};
pub use encoder::{Bpe, BpeConfig, CodecError};
pub use entity::{Entity, EntityMatcher, FrequencyFilter, Replacement, DEFAULT_RARE_PERCENTAGE};
pub use glossary::{reserved_symbols, Glossary, Segment};
pub use merges::{CodesVersion, FormatError, MergeTable, END_OF_WORD};
pub use streaming::StreamingDecoder;
pub use vocab::{count_tokens, cut_vocabulary, read_counts, write_counts, Vocabulary};

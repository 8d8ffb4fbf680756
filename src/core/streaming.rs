//! Word-at-a-time decoder for subword streams.
//!
//! When subword units arrive one by one (for example from a translation
//! model generating output), a unit ending in the separator means the word
//! continues. This decoder buffers those units and only emits a surface word
//! once its final unit has arrived.

use super::encoder::Bpe;

/// A streaming decoder that reassembles words across unit boundaries.
///
/// # Example
///
/// ```ignore
/// let mut decoder = StreamingDecoder::new(&bpe);
///
/// for unit in unit_stream {
///     if let Some(word) = decoder.add_token(&unit) {
///         print!("{} ", word);
///     }
/// }
/// // Emit a trailing partial word, if any
/// print!("{}", decoder.flush());
/// ```
pub struct StreamingDecoder<'a> {
    separator: &'a str,
    buffer: String,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a streaming decoder using the codec's separator.
    pub fn new(bpe: &'a Bpe) -> Self {
        Self::with_separator(bpe.separator())
    }

    /// Create a streaming decoder for an explicit separator.
    pub fn with_separator(separator: &'a str) -> Self {
        Self {
            separator,
            buffer: String::with_capacity(32),
        }
    }

    /// Add a unit and return the completed word, if this unit ends one.
    pub fn add_token(&mut self, unit: &str) -> Option<String> {
        match unit.strip_suffix(self.separator) {
            Some(stem) if !self.separator.is_empty() => {
                self.buffer.push_str(stem);
                None
            }
            _ => {
                self.buffer.push_str(unit);
                Some(std::mem::take(&mut self.buffer))
            }
        }
    }

    /// Add several units and return every word they complete, in order.
    pub fn add_tokens<S: AsRef<str>>(&mut self, units: &[S]) -> Vec<String> {
        units
            .iter()
            .filter_map(|unit| self.add_token(unit.as_ref()))
            .collect()
    }

    /// Return any buffered partial word, leaving the decoder empty.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Discard any buffered partial word.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Check if a word is waiting for its final unit.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Length in bytes of the buffered partial word.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

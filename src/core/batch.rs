//! Windowed, shard-parallel processing of line streams.
//!
//! Lines are read into a window of `workers * batch_size`, the window is cut
//! into at most `workers` contiguous shards, and each shard is handled by its
//! own [`Bpe`] clone on the rayon pool. Output is written in input order
//! before the next window is read.

use std::io::{self, BufRead, Write};

use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use super::encoder::{Bpe, CodecError};

/// Windows smaller than this are processed as a single shard.
const MIN_SHARDED_WINDOW: usize = 1000;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: CodecError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Direction of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Encode,
    /// Undo segmentation (`--recover` on the command line).
    Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub workers: usize,
    /// Lines per worker in one window.
    pub batch_size: usize,
    pub mode: Mode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            batch_size: 20000,
            mode: Mode::Encode,
        }
    }
}

/// Totals reported by [`BatchDriver::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub lines: usize,
    pub windows: usize,
}

pub struct BatchDriver {
    encoders: Vec<Bpe>,
    config: BatchConfig,
}

impl BatchDriver {
    /// Build a driver with one encoder clone per worker.
    ///
    /// Zero workers or a zero batch size are raised to one.
    pub fn new(bpe: Bpe, config: BatchConfig) -> Self {
        let config = BatchConfig {
            workers: config.workers.max(1),
            batch_size: config.batch_size.max(1),
            mode: config.mode,
        };
        let mut encoders = Vec::with_capacity(config.workers);
        for _ in 1..config.workers {
            encoders.push(bpe.clone());
        }
        encoders.push(bpe);

        Self { encoders, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every line of `reader` and write one output line per input
    /// line to `writer`.
    ///
    /// The first failing line aborts the run; nothing from its window is
    /// written.
    pub fn run<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
    ) -> Result<BatchStats, BatchError> {
        let window_len = self.config.workers * self.config.batch_size;
        let mut stats = BatchStats::default();
        let mut window: Vec<String> = Vec::with_capacity(window_len.min(1 << 16));

        for line in reader.lines() {
            window.push(line?.trim().to_string());
            if window.len() == window_len {
                self.flush_window(&mut window, &mut writer, &mut stats)?;
            }
        }
        if !window.is_empty() {
            self.flush_window(&mut window, &mut writer, &mut stats)?;
        }

        writer.flush()?;
        Ok(stats)
    }

    fn flush_window<W: Write>(
        &self,
        window: &mut Vec<String>,
        writer: &mut W,
        stats: &mut BatchStats,
    ) -> Result<(), BatchError> {
        let output = self.process_window(window, stats.lines)?;
        for line in &output {
            writeln!(writer, "{line}")?;
        }

        stats.lines += window.len();
        stats.windows += 1;
        debug!(
            "window {}: {} lines, {} total",
            stats.windows,
            window.len(),
            stats.lines
        );
        window.clear();
        Ok(())
    }

    /// `offset` is the number of lines consumed before this window.
    fn process_window(&self, lines: &[String], offset: usize) -> Result<Vec<String>, BatchError> {
        let shard = shard_len(lines.len(), self.encoders.len());

        let shards: Vec<Vec<String>> = lines
            .par_chunks(shard)
            .enumerate()
            .map(|(idx, chunk)| {
                let bpe = &self.encoders[idx % self.encoders.len()];
                let first_line = offset + idx * shard + 1;
                self.process_shard(bpe, chunk, first_line)
            })
            .collect::<Result<_, _>>()?;

        Ok(shards.into_iter().flatten().collect())
    }

    fn process_shard(
        &self,
        bpe: &Bpe,
        chunk: &[String],
        first_line: usize,
    ) -> Result<Vec<String>, BatchError> {
        chunk
            .iter()
            .enumerate()
            .map(|(i, line)| match self.config.mode {
                Mode::Encode => bpe
                    .encode_to_string(line)
                    .map_err(|source| BatchError::Line {
                        line: first_line + i,
                        source,
                    }),
                Mode::Decode => Ok(bpe.decode_str(line)),
            })
            .collect()
    }
}

/// Lines per shard for a window of `total` lines and `workers` workers.
fn shard_len(total: usize, workers: usize) -> usize {
    let per_worker = total / workers.max(1) + 1;
    if per_worker < MIN_SHARDED_WINDOW {
        total.max(1)
    } else {
        per_worker
    }
}

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::info;
use rayon::ThreadPoolBuilder;
use subsplit::core::{count_tokens, cut_vocabulary, read_counts, write_counts};
use subsplit::{BatchConfig, BatchDriver, Bpe, BpeConfig, MergeTable, Mode, DEFAULT_SEPARATOR};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reversible BPE subword segmentation", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Segment text with learned merge codes, or undo segmentation
    Apply(ApplyArgs),
    /// Count whitespace-separated tokens of a text
    GetVocab(GetVocabArgs),
    /// Filter and sort a `token count` dictionary
    CutVocab(CutVocabArgs),
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Merge codes file
    #[arg(short, long, value_name = "PATH", required_unless_present = "recover")]
    codes: Option<PathBuf>,

    /// Input text (default: stdin)
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output text (default: stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Vocabulary file restricting output units
    #[arg(long, value_name = "PATH")]
    vocabulary: Option<PathBuf>,

    /// Ignore vocabulary entries below this frequency
    #[arg(long, value_name = "FREQ", requires = "vocabulary")]
    vocabulary_threshold: Option<u64>,

    /// Glossary of literals that are never split
    #[arg(long, value_name = "PATH")]
    glossary: Option<PathBuf>,

    /// Do not protect the pipeline placeholder symbols
    #[arg(long)]
    no_reserved_symbols: bool,

    /// Subword separator
    #[arg(short, long, value_name = "STR", default_value = DEFAULT_SEPARATOR)]
    separator: String,

    /// Undo segmentation instead of applying it
    #[arg(long)]
    recover: bool,

    /// Worker threads
    #[arg(long, value_name = "N", default_value_t = BatchConfig::default().workers)]
    threads: usize,

    /// Lines per worker in one window
    #[arg(long, value_name = "LINES", default_value_t = BatchConfig::default().batch_size)]
    batch_size: usize,

    /// Bound the per-worker segment cache
    #[arg(long, value_name = "ENTRIES")]
    cache_capacity: Option<usize>,
}

#[derive(Args, Debug)]
struct GetVocabArgs {
    /// Input text (default: stdin)
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output dictionary (default: stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CutVocabArgs {
    /// `token count` dictionary
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,

    /// Output dictionary (default: stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Drop entries below this frequency
    #[arg(long, value_name = "FREQ", default_value_t = 0)]
    min_frequency: u64,

    /// Keep at most this many entries
    #[arg(long, value_name = "SIZE")]
    max_vocab_size: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Apply(args) => run_apply(args),
        Commands::GetVocab(args) => run_get_vocab(args),
        Commands::CutVocab(args) => run_cut_vocab(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn run_apply(args: ApplyArgs) -> Result<()> {
    let workers = args.threads.max(1);
    ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .context("unable to configure Rayon thread pool")?;

    let bpe = match &args.codes {
        Some(codes) => {
            let config = BpeConfig {
                vocabulary: args.vocabulary.clone(),
                vocabulary_threshold: args.vocabulary_threshold,
                glossary: args.glossary.clone(),
                reserved_symbols: !args.no_reserved_symbols,
                separator: args.separator.clone(),
                cache_capacity: args.cache_capacity,
                ..BpeConfig::new(codes)
            };
            Bpe::from_config(&config)
                .with_context(|| format!("failed to load model for {}", codes.display()))?
        }
        // Decoding needs only the separator.
        None => Bpe::new(MergeTable::default()).with_separator(args.separator.clone()),
    };
    info!(
        "loaded {} merges (version {})",
        bpe.table().len(),
        bpe.table().version()
    );

    let mode = if args.recover {
        Mode::Decode
    } else {
        Mode::Encode
    };
    let driver = BatchDriver::new(
        bpe,
        BatchConfig {
            workers,
            batch_size: args.batch_size,
            mode,
        },
    );

    let reader = open_input(args.input.as_ref())?;
    let writer = open_output(args.output.as_ref())?;
    let start = Instant::now();
    let stats = driver.run(reader, writer).context("batch processing failed")?;

    info!(
        "processed {} lines in {} windows, duration={:.2?}",
        stats.lines,
        stats.windows,
        start.elapsed()
    );
    Ok(())
}

fn run_get_vocab(args: GetVocabArgs) -> Result<()> {
    let reader = open_input(args.input.as_ref())?;
    let counts = count_tokens(reader).context("failed to read input text")?;
    let entries = cut_vocabulary(counts, 0, None);

    let writer = open_output(args.output.as_ref())?;
    write_counts(writer, &entries).context("failed to write vocabulary")?;
    info!("counted {} unique tokens", entries.len());
    Ok(())
}

fn run_cut_vocab(args: CutVocabArgs) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let counts = read_counts(&text)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let entries = cut_vocabulary(counts, args.min_frequency, args.max_vocab_size);

    let writer = open_output(args.output.as_ref())?;
    write_counts(writer, &entries).context("failed to write vocabulary")?;
    info!("kept {} entries", entries.len());
    Ok(())
}

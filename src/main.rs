//! Tanimoto CLI - host side of the fingerprint search
//!
//! ## Commands
//!
//! - `tanimoto search` - score a reference set against a comparison set
//! - `tanimoto verify` - diff an ID-pair result file against the expected one
//! - `tanimoto selftest` - run software and loopback accelerator, then verify
//!
//! Exit status: 0 on success, 1 on any error, 2 when verification finds
//! discrepancies.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tanimoto::backend::FaultInjection;
use tanimoto::{
    decode_sentinel_stream, fixtures, storage, IdLayout, IdPair, LoopbackAccelerator, PairOrder,
    ResultVerifier, ScoringPolicy, SearchConfig, SimilarityBackend, SimilarityEngine,
    SoftwareBackend, TransferConfig, VectorSet,
};

/// Brute-force Tanimoto search over binary fingerprints
#[derive(Parser)]
#[command(name = "tanimoto")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every reference against every comparison vector
    Search(SearchArgs),
    /// Compare an actual ID-pair result against the expected one
    Verify(VerifyArgs),
    /// Run software and loopback accelerator on the same sets and verify
    Selftest(SelftestArgs),
}

/// Where the vector sets come from
#[derive(Args)]
struct InputArgs {
    /// Vector file (written with --generate, read with --load)
    #[arg(long)]
    vectors: Option<PathBuf>,

    /// Generate random sets instead of the fixed test patterns
    #[arg(long, conflicts_with_all = ["load", "hex_refs"])]
    generate: bool,

    /// Load sets from --vectors
    #[arg(long, requires = "vectors", conflicts_with = "hex_refs")]
    load: bool,

    /// Reference vectors as hex text, one per line (padding from the config)
    #[arg(long, requires = "hex_cmps")]
    hex_refs: Option<PathBuf>,

    /// Comparison vectors as hex text, one per line
    #[arg(long, requires = "hex_refs")]
    hex_cmps: Option<PathBuf>,

    /// Number of reference vectors (generate/load)
    #[arg(long, default_value_t = 8)]
    ref_count: usize,

    /// Number of comparison vectors (generate)
    #[arg(long, default_value_t = 24)]
    cmp_count: usize,

    /// RNG seed for --generate
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Write matching ID pairs (little-endian u32 ref, cmp)
    #[arg(long)]
    results: Option<PathBuf>,

    /// Threshold, in the policy's direction
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Scoring policy: tanimoto, dissimilarity, weight_sum
    #[arg(short, long)]
    policy: Option<ScoringPolicy>,

    /// Vector width in bits (multiple of 8)
    #[arg(short, long)]
    width: Option<usize>,

    /// Worker threads for the all-pairs pass
    #[arg(long)]
    threads: Option<usize>,

    /// Write a tab-separated match dump
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Include weights in the dump and printed matches
    #[arg(long)]
    weights: bool,

    /// Print matches to stdout
    #[arg(long)]
    print: bool,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct VerifyArgs {
    /// Expected ID-pair file
    #[arg(long)]
    expected: PathBuf,

    /// Actual result file
    #[arg(long)]
    actual: PathBuf,

    /// Actual file is a sentinel-terminated accelerator buffer
    #[arg(long)]
    sentinel: bool,

    /// Bytes per ID in the sentinel buffer (1-4)
    #[arg(long, default_value_t = 4)]
    id_bytes: u8,

    /// Sentinel buffer stores the comparison ID first
    #[arg(long)]
    cmp_first: bool,

    /// Write the report to a file as well as stdout
    #[arg(long)]
    report: Option<PathBuf>,

    /// Dump both pair lists in hex
    #[arg(long)]
    id_dump: Option<PathBuf>,
}

#[derive(Args)]
struct SelftestArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Dissimilarity threshold in [0, 1)
    #[arg(short, long, default_value_t = 0.7)]
    threshold: f64,

    /// Vector width in bits (multiple of 8)
    #[arg(short, long)]
    width: Option<usize>,

    /// Vectors per transfer burst
    #[arg(long)]
    burst_len: Option<usize>,

    /// JSON config file (width, padding, burst length); flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bytes per ID in the accelerator result buffer (1-4)
    #[arg(long, default_value_t = 4)]
    id_bytes: u8,

    /// Accelerator stores the comparison ID first
    #[arg(long)]
    cmp_first: bool,

    /// Duplicate every n-th accelerator result
    #[arg(long)]
    duplicate_every: Option<usize>,

    /// Drop every n-th accelerator result
    #[arg(long)]
    drop_every: Option<usize>,

    /// Write the report to a file as well as stdout
    #[arg(long)]
    report: Option<PathBuf>,

    /// Dump both pair lists in hex
    #[arg(long)]
    id_dump: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Commands::Search(args) => search(args).map(|_| true),
        Commands::Verify(args) => verify(args),
        Commands::Selftest(args) => selftest(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SearchConfig> {
    match path {
        Some(path) => SearchConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(SearchConfig::default()),
    }
}

fn load_sets(input: &InputArgs, config: &SearchConfig) -> anyhow::Result<(VectorSet, VectorSet)> {
    if let (Some(refs), Some(cmps)) = (&input.hex_refs, &input.hex_cmps) {
        return Ok(storage::read_hex_sets(refs, cmps, &config.codec()?)?);
    }

    let width = config.width()?;
    if input.load {
        let Some(path) = &input.vectors else {
            bail!("--load needs --vectors");
        };
        return Ok(storage::read_vector_file(path, width, input.ref_count)?);
    }

    let (refs, cmps) = if input.generate {
        fixtures::random_sets(width, input.ref_count, input.cmp_count, input.seed)?
    } else {
        fixtures::fixed_test_sets(width)?
    };
    if let Some(path) = &input.vectors {
        storage::write_vector_file(path, &refs, &cmps)?;
    }
    Ok((refs, cmps))
}

fn search(args: SearchArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(bits) = args.width {
        config.vector_bits = bits;
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(threads) = args.threads {
        config.num_threads = threads;
    }
    config.validate()?;

    let (refs, cmps) = load_sets(&args.input, &config)?;
    let matrix = config.engine().compare_all(&refs, &cmps)?;
    let matches = config.matcher()?.filter(&matrix);
    tracing::info!(
        matches = matches.len(),
        policy = %config.policy,
        threshold = config.threshold,
        "search done"
    );

    if let Some(path) = &args.results {
        let pairs: Vec<_> = matches.iter().map(|m| m.id_pair()).collect();
        storage::write_id_file(path, &pairs)?;
    }
    if let Some(path) = &args.dump {
        storage::write_match_dump(path, &matches, args.weights)?;
    }
    if args.print {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        storage::write_matches(&mut out, &matches, args.weights).context("writing matches to stdout")?;
        out.flush()?;
    }
    Ok(())
}

fn layout(id_bytes: u8, cmp_first: bool) -> tanimoto::Result<IdLayout> {
    let order = if cmp_first {
        PairOrder::CmpFirst
    } else {
        PairOrder::RefFirst
    };
    IdLayout::new(id_bytes, order)
}

/// Verify, print the report and write the optional files
fn check(
    expected: &[IdPair],
    actual: &[IdPair],
    report: Option<&PathBuf>,
    id_dump: Option<&PathBuf>,
) -> anyhow::Result<bool> {
    let result = ResultVerifier::new().verify(expected, actual);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    result.write_report(&mut out).context("writing report to stdout")?;
    out.flush()?;

    if let Some(path) = report {
        storage::write_report(path, &result)?;
    }
    if let Some(path) = id_dump {
        storage::write_id_dump(path, expected, actual)?;
    }
    Ok(result.is_match())
}

fn verify(args: VerifyArgs) -> anyhow::Result<bool> {
    let expected = storage::read_id_file(&args.expected)?;
    let actual = if args.sentinel {
        let buffer = storage::read_sentinel_file(&args.actual)?;
        decode_sentinel_stream(&buffer, layout(args.id_bytes, args.cmp_first)?)
            .with_context(|| format!("decoding {}", args.actual.display()))?
    } else {
        storage::read_id_file(&args.actual)?
    };
    check(&expected, &actual, args.report.as_ref(), args.id_dump.as_ref())
}

fn selftest(args: SelftestArgs) -> anyhow::Result<bool> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(bits) = args.width {
        config.vector_bits = bits;
    }
    if let Some(burst_len) = args.burst_len {
        config.burst_len = burst_len;
    }
    config.validate()?;
    let (refs, cmps) = load_sets(&args.input, &config)?;

    let mut software: Box<dyn SimilarityBackend> =
        Box::new(SoftwareBackend::new(SimilarityEngine::new(ScoringPolicy::WeightSum)));
    let mut accelerator: Box<dyn SimilarityBackend> = Box::new(
        LoopbackAccelerator::new(
            TransferConfig {
                burst_len: config.burst_len,
            },
            layout(args.id_bytes, args.cmp_first)?,
        )
        .with_faults(FaultInjection {
            duplicate_every: args.duplicate_every,
            drop_every: args.drop_every,
        }),
    );

    let expected = software
        .search(&refs, &cmps, args.threshold)
        .with_context(|| format!("{} backend", software.name()))?;
    let actual = accelerator
        .search(&refs, &cmps, args.threshold)
        .with_context(|| format!("{} backend", accelerator.name()))?;
    tracing::info!(
        expected = expected.len(),
        actual = actual.len(),
        "selftest backends done"
    );

    check(&expected, &actual, args.report.as_ref(), args.id_dump.as_ref())
}

//! Converts the county land-use projection JSON into a DuckDB star schema of
//! ensemble-aggregated transitions.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use landuse_core::{
    validate::validate_paths_with_limit, Converter, ConverterConfig, LoadStrategy, LogProgress,
    NoopProgress, ProgressReporter, RunSummary,
};
use tracing_subscriber::EnvFilter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "landuse-convert",
    about = "Aggregate per-model land-use projections into a DuckDB star schema"
)]
struct Args {
    /// Nested projection JSON (scenario → period → FIPS → records).
    #[arg(short, long, default_value = "data/raw/county_landuse_projections_RPA.json")]
    input: PathBuf,

    /// DuckDB file to rebuild (.duckdb, .db or .ddb). Its directory must exist.
    #[arg(short, long, default_value = "data/processed/landuse_analytics.duckdb")]
    output: PathBuf,

    /// Load facts with row-by-row INSERTs instead of Parquet bulk copy.
    #[arg(long)]
    no_bulk_copy: bool,

    /// Fact rows per batch (at most 1,000,000).
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// JSON config file; flags given on the command line take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    summary_json: bool,

    /// More logging (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("landuse_core={level},landuse={level},warn"))),
        )
        .init();
}

fn load_config(args: &Args) -> Result<ConverterConfig> {
    let mut config = match &args.config {
        Some(path) => ConverterConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConverterConfig::default(),
    };
    if args.no_bulk_copy {
        config.load_strategy = LoadStrategy::RowInsert;
    }
    if let Some(n) = args.batch_size {
        config.batch_size = n;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_summary(summary: &RunSummary) {
    eprintln!("\n{:<20} {:>14}", "Table", "Rows");
    eprintln!("{}", "-".repeat(35));
    for t in &summary.tables {
        eprintln!("{:<20} {:>14}", t.table, t.rows);
    }
    eprintln!("{}", "-".repeat(35));

    let agg = &summary.aggregation;
    eprintln!(
        "Raw scenarios: {} ({} ensemble-only), raw cells: {}, dropped non-positive: {}",
        agg.raw_scenarios, agg.unmatched_scenarios, agg.raw_cells, agg.non_positive
    );
    if agg.skips.total() > 0 {
        eprintln!(
            "Skipped cells: {} unknown land use, {} malformed FIPS, {} non-finite",
            agg.skips.unknown_landuse, agg.skips.malformed_fips, agg.skips.non_finite
        );
    }
    eprintln!(
        "Facts: {} in {} batches ({:?})",
        summary.load.rows, summary.load.batches, summary.strategy
    );
    eprintln!(
        "\nDone. {} ({:.1} MiB) in {:.1}s.",
        summary.output.display(),
        summary.output_bytes as f64 / (1024.0 * 1024.0),
        summary.elapsed_ms as f64 / 1000.0
    );
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let paths = validate_paths_with_limit(&args.input, &args.output, config.max_input_bytes)
        .context("pre-flight validation failed")?;

    let progress: &dyn ProgressReporter = if args.quiet { &NoopProgress } else { &LogProgress };
    let mut converter = Converter::new(config)?;
    let summary = converter.run(&paths, progress)?;

    if !args.quiet {
        print_summary(&summary);
    }
    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

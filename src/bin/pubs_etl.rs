//! CLI binary for uk-pubs-etl.
//!
//! A thin shim over the library crate that maps CLI flags to `EtlConfig`,
//! picks a vendor connector and reports run statistics.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uk_pubs_etl::connectors::admiral::Admiral;
use uk_pubs_etl::connectors::stonegate::Stonegate;
use uk_pubs_etl::connectors::wellington::Wellington;
use uk_pubs_etl::{run_vendor_etl, EtlConfig, VendorConnector};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scrape Wellington listings into ./data, keyed by today's date
  pubs-etl --vendor wellington data 'SQLSRV01/Property.dbo.UkPubs'

  # Stonegate, with logs written to a dated file
  pubs-etl --vendor stonegate -l logs/stonegate data 'SQLSRV01/Property.dbo.UkPubs'

  # Resume an older run (stages with artifacts are skipped)
  pubs-etl --vendor wellington --date 2024-03-01 data 'SQLSRV01/Property.dbo.UkPubs'

  # Gentler on the geocoding quota
  pubs-etl --vendor wellington --concurrency 10 data 'SQLSRV01/Property.dbo.UkPubs'

ARTIFACTS:
  <dir>/<date>-raw.csv    listings as the vendor serves them
  <dir>/<date>-clean.csv  normalised common schema
  <dir>/<date>-geo.csv    with geocoded address columns merged in

  Re-running on the same date skips every stage whose artifact exists.
  Delete an artifact to force its stage (and the ones after it) to rerun.

ENVIRONMENT VARIABLES:
  GOOGLEMAPS_KEY   Geocoding API key (used when --api-key is not given)
"#;

/// Scrape, clean and geo-enrich UK pub listings from one vendor.
#[derive(Parser, Debug)]
#[command(
    name = "pubs-etl",
    version,
    about = "Scrape, clean and geo-enrich UK pub listings",
    long_about = "Run the three-stage listings ETL (fetch, clean, geocode) for one vendor. \
Every stage checkpoints to a dated CSV in the working directory, so an interrupted run \
resumes where it stopped and geocoding calls are never repeated for the same day.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Working directory for the dated CSV artifacts.
    dir: PathBuf,

    /// Destination SQL table, as SERVER/DATABASE.SCHEMA.TABLE.
    sql_table: String,

    /// Listings vendor to run.
    #[arg(long, value_enum)]
    vendor: VendorArg,

    /// Write logs to a dated file in this directory instead of stderr.
    #[arg(short = 'l', long)]
    logs_dir: Option<PathBuf>,

    /// Geocoding API key (falls back to GOOGLEMAPS_KEY).
    #[arg(long, env = "GOOGLEMAPS_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Number of concurrent geocoding calls.
    #[arg(short, long, default_value_t = 50)]
    concurrency: usize,

    /// Run date override (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum VendorArg {
    Wellington,
    Stonegate,
    Admiral,
}

impl VendorArg {
    fn connector(&self) -> Arc<dyn VendorConnector> {
        match self {
            VendorArg::Wellington => Arc::new(Wellington::new()),
            VendorArg::Stonegate => Arc::new(Stonegate::new()),
            VendorArg::Admiral => Arc::new(Admiral::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let run_date = cli.date.unwrap_or_else(|| chrono::Local::now().date_naive());

    if let Some(ref logs_dir) = cli.logs_dir {
        fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory {:?}", logs_dir))?;
        let log_path = logs_dir.join(format!("{run_date}.log"));
        let log_file = fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {:?}", log_path))?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(Arc::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = EtlConfig::builder()
        .concurrency(cli.concurrency)
        .run_date(run_date);
    if let Some(key) = cli.api_key.clone() {
        builder = builder.api_key(key);
    }
    let config = builder.build().context("Invalid configuration")?;

    let connector = cli.vendor.connector();
    let vendor_name = connector.name();

    // ── Run the ETL ──────────────────────────────────────────────────────
    // A spinner rather than a bar: the stage count is tiny and the real
    // progress signal is the per-stage log lines.
    let spinner = if cli.quiet || cli.logs_dir.is_none() {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Running");
        bar.set_message(format!("{vendor_name} ETL for {run_date}"));
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    };

    let result = run_vendor_etl(connector, &cli.dir, &config).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let output = result.with_context(|| format!("{vendor_name} ETL failed"))?;
    let artifact = cli.dir.join(format!("{}-geo.csv", output.run_key));

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        eprintln!(
            "{}  {} run {}: {} listings  {}ms",
            green("✔"),
            bold(vendor_name),
            output.run_key,
            output.table.len(),
            output.stats.total_duration_ms,
        );
        eprintln!(
            "   stages: {} executed, {} skipped   geocoding: {}/{} failed",
            output.stats.executed.len(),
            output.stats.skipped.len(),
            output.stats.geo_failures,
            output.stats.geo_queries,
        );
        eprintln!("   {} {}", cyan("→"), dim(&artifact.display().to_string()));
    }

    // ── Push to SQL ──────────────────────────────────────────────────────
    warn!(
        "Push to SQL table '{}' is not implemented; enriched data remains at {}",
        cli.sql_table,
        artifact.display()
    );

    Ok(())
}

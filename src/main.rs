//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest site harvester.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use sumi_harvest::config::{load_config, Config};
use sumi_harvest::output::{export_all, load_statistics, print_statistics, print_summary, ExportFormat};
use sumi_harvest::storage::open_storage;
use sumi_harvest::Harvester;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a polite single-site harvester
///
/// Sumi-Harvest crawls one website from a seed URL while respecting robots.txt,
/// crawl-delay and a per-domain request interval. It stores page text, downloaded
/// media and visit outcomes in SQLite.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "A polite single-site harvester", long_about = None)]
struct Cli {
    /// URL to start harvesting from
    #[arg(value_name = "SEED_URL", required_unless_present = "stats")]
    seed: Option<String>,

    /// Path to TOML configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Load pages through the configured headless browser
    #[arg(long)]
    render_js: bool,

    /// Export formats to write after the run (json, csv, sql, markdown)
    #[arg(long, value_delimiter = ',', value_name = "FORMATS")]
    export: Vec<String>,

    /// Do not exclude URLs disallowed by robots.txt (crawl-delay is still honored)
    #[arg(long)]
    ignore_robots: bool,

    /// Skip scanning the seed page for API endpoints
    #[arg(long)]
    skip_endpoints: bool,

    /// Override the maximum traversal depth
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["render_js", "export"])]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;

    if cli.stats {
        return handle_stats(&config);
    }

    let formats = cli
        .export
        .iter()
        .map(|f| f.parse::<ExportFormat>())
        .collect::<Result<Vec<_>, _>>()?;

    let seed = cli.seed.as_deref().context("a seed URL is required")?;
    handle_harvest(config, seed, &formats).await
}

/// Loads the configuration file (if any) and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    if cli.render_js {
        config.render.enabled = true;
    }
    if cli.ignore_robots {
        tracing::warn!("robots.txt rules will not be enforced");
        config.politeness.respect_robots = false;
    }
    if cli.skip_endpoints {
        config.crawler.discover_endpoints = false;
    }
    if let Some(depth) = cli.max_depth {
        config.crawler.max_depth = depth;
    }

    Ok(config)
}

/// Handles the default mode: harvest from the seed, then export
async fn handle_harvest(config: Config, seed: &str, formats: &[ExportFormat]) -> anyhow::Result<()> {
    let export_dir = PathBuf::from(&config.output.export_dir);
    let harvester = Harvester::new(config)?;

    let summary = harvester.run(seed).await?;
    print_summary(&summary);

    if !formats.is_empty() {
        let written = harvester
            .store()
            .with(|s| Ok(export_all(&*s, formats, &export_dir)))??;
        for path in written {
            println!("  Exported: {}", path.display());
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

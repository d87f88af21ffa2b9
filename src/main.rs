//! Shelf-Scout main entry point
//!
//! This is the command-line interface for the Shelf-Scout catalog ingester.

use anyhow::Context;
use clap::Parser;
use shelf_scout::config::{load_config_with_hash, Config};
use shelf_scout::output::{load_statistics, print_run_report, print_statistics, print_status};
use shelf_scout::source::SourceRegistry;
use shelf_scout::storage::{open_sink, DiscardSink, ProductSink};
use shelf_scout::{Coordinator, RunResult};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Shelf-Scout: a catalog ingester for retail sites
///
/// Shelf-Scout walks the category trees of the configured retailers,
/// deduplicates the products it finds and upserts them into a SQLite
/// database in bounded batches.
#[derive(Parser, Debug)]
#[command(name = "shelf-scout")]
#[command(version)]
#[command(about = "A catalog ingester for retail sites", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Run only this source (repeatable, e.g. --source mercadona)
    #[arg(long = "source", value_name = "TAG")]
    sources: Vec<String>,

    /// List the registered sources and exit
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    list: bool,

    /// Show product counts from the database and exit
    #[arg(long, conflicts_with_all = ["list", "dry_run"])]
    stats: bool,

    /// Scrape without writing to the database
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.list {
        handle_list(&config);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.stats {
        handle_stats(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    handle_scrape(&config, &cli.sources, cli.dry_run).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_scout=info,warn"),
            1 => EnvFilter::new("shelf_scout=debug,info"),
            2 => EnvFilter::new("shelf_scout=trace,debug"),
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

/// Handles --list: prints the sources enabled in the configuration
fn handle_list(config: &Config) {
    let registry = SourceRegistry::from_config(config);

    println!("Registered sources ({}):", registry.len());
    for tag in registry.tags() {
        println!("  - {} ({})", tag, tag.display_name());
    }
}

/// Handles --stats: shows product counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let sink = open_sink(Path::new(&config.output.database_path))
        .context("failed to open product database")?;
    if !sink.health_check() {
        anyhow::bail!("product database failed its health check");
    }

    let stats = load_statistics(&sink)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the scrape: all sources, or the ones named with --source
async fn handle_scrape(
    config: &Config,
    sources: &[String],
    dry_run: bool,
) -> anyhow::Result<ExitCode> {
    let discard = Arc::new(DiscardSink::new());
    let sink: Arc<dyn ProductSink> = if dry_run {
        tracing::info!("Dry run: products will not be stored");
        discard.clone() as Arc<dyn ProductSink>
    } else {
        let path = Path::new(&config.output.database_path);
        Arc::new(open_sink(path).context("failed to open product database")?)
    };

    let coordinator = Coordinator::from_config(config, sink)?;
    if coordinator.list_sources().is_empty() {
        tracing::warn!("No sources are enabled in the configuration");
    }

    let mut results: Vec<RunResult> = Vec::new();
    let mut rejected = false;

    if sources.is_empty() {
        results = coordinator.run_all().await?;
    } else {
        for name in sources {
            match coordinator.run_named(name).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("{}", e);
                    rejected = true;
                }
            }
        }
    }

    print_run_report(&results);
    println!();
    print_status(&coordinator.get_status());

    if dry_run {
        println!("\nDry run: {} products discarded", discard.received());
    }

    if rejected || results.iter().any(|r| !r.success) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

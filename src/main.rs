//! Sumi-Ingest main entry point
//!
//! This is the command-line interface for the Sumi-Ingest site crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use sumi_ingest::config::{apply_env_overrides, load_config_with_hash, validate, Compression};
use sumi_ingest::output::{format_summary, generate_summary, SitePaths};
use sumi_ingest::url::parse_http_url;
use sumi_ingest::{Config, Engine, Scope, StateStore};
use tracing_subscriber::EnvFilter;

/// Sumi-Ingest: resumable site-to-Markdown ingestion
///
/// Crawls one site starting at SEED, writes every page as Markdown with YAML
/// front-matter and downloads linked assets. Interrupted crawls resume from
/// the per-site state database.
#[derive(Parser, Debug)]
#[command(name = "sumi-ingest")]
#[command(version)]
#[command(about = "Resumable site-to-Markdown ingestion", long_about = None)]
struct Cli {
    /// Seed URL to start crawling from
    #[arg(value_name = "SEED")]
    seed: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root directory for per-site data
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Number of page workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Number of asset workers
    #[arg(long)]
    asset_workers: Option<usize>,

    /// Link-following scope: strict, broad or smart
    #[arg(long)]
    scope: Option<Scope>,

    /// Artifact compression: zstd, gzip or none
    #[arg(long)]
    compression: Option<Compression>,

    /// Do not download assets
    #[arg(long)]
    no_assets: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print the summary of an existing crawl and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_hash) = build_config(&cli)?;
    setup_logging(cli.verbose, cli.quiet, &config.log_level);

    if let Some(hash) = config_hash {
        tracing::info!("Configuration loaded (hash: {})", hash);
    }

    if cli.stats {
        handle_stats(&cli.seed, &config).await
    } else {
        handle_crawl(&cli.seed, config).await
    }
}

/// Loads the config file (if any), then applies environment and CLI overrides
fn build_config(cli: &Cli) -> anyhow::Result<(Config, Option<String>)> {
    let (mut config, hash) = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            (config, Some(hash))
        }
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config)?;
            (config, None)
        }
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(asset_workers) = cli.asset_workers {
        config.asset_workers = asset_workers;
    }
    if let Some(scope) = cli.scope {
        config.scope = scope;
    }
    if let Some(compression) = cli.compression {
        config.compression = compression;
    }
    if cli.no_assets {
        config.extract_assets = false;
    }

    validate(&config).context("Invalid configuration")?;
    Ok((config, hash))
}

/// Sets up the tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise CLI flags, then the config's level.
fn setup_logging(verbose: u8, quiet: bool, log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new(format!("sumi_ingest={},warn", log_level)),
                1 => EnvFilter::new("sumi_ingest=debug,info"),
                _ => EnvFilter::new("sumi_ingest=trace,debug"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --stats: prints the summary of an existing site directory
async fn handle_stats(seed: &str, config: &Config) -> anyhow::Result<()> {
    let seed_url = parse_http_url(seed)?;
    let paths = SitePaths::new(&config.data_dir, &seed_url);
    let db = paths.state_db();
    if !db.exists() {
        bail!("No crawl state found at {}", db.display());
    }

    let store = StateStore::open_with_config(&db, config)?;
    let summary = generate_summary(&store, seed, paths.root()).await?;
    store.close();

    println!("{}", format_summary(&summary));
    Ok(())
}

/// Runs a crawl until it finishes or Ctrl-C is pressed
async fn handle_crawl(seed: &str, config: Config) -> anyhow::Result<()> {
    let engine = Engine::new(seed, config).context("Failed to start the engine")?;
    tracing::info!("Site directory: {}", engine.paths().root().display());

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing in-flight work");
            shutdown.request_shutdown();
        }
    });

    let summary = engine.run().await.context("Crawl failed")?;
    println!("{}", format_summary(&summary));
    Ok(())
}

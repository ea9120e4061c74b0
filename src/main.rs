//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest crawl engine.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_harvest::config::{load_config_with_hash, Config, SessionBackendKind};
use sumi_harvest::crawler::{consolidate_only, run_harvest, select_roots, SelectorExtractor};
use sumi_harvest::output::{generate_markdown_summary, print_summary};
use sumi_harvest::storage::TargetLayout;
use sumi_harvest::{RunOptions, Shutdown};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a resilient, checkpointed crawl engine
///
/// Sumi-Harvest crawls a collection → group → item hierarchy with adaptive
/// pacing and a fallback chain of fetch strategies, checkpoints every item,
/// and merges the results into one canonical dataset.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resilient, checkpointed crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Discard the checkpoint and start over
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Only crawl the roots with these ids
    #[arg(long, value_name = "ID", num_args = 1..)]
    only: Vec<String>,

    /// Attempt items the checkpoint recorded as failed
    #[arg(long)]
    retry_failed: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "consolidate_only")]
    dry_run: bool,

    /// Merge existing unit files into the canonical dataset and exit
    #[arg(long, conflicts_with = "dry_run")]
    consolidate_only: bool,

    /// Write the run summary as markdown to this path
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "consolidate_only"])]
    export_summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli.only);
    } else if cli.consolidate_only {
        handle_consolidate_only(&config)?;
    } else {
        handle_harvest(&config, config_hash, &cli).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
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

/// Handles the --dry-run mode: shows the crawl plan
fn handle_dry_run(config: &Config, only: &[String]) {
    let layout = TargetLayout::from_config(&config.target);

    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Target: {}", config.target.name);
    println!("  Directory: {}", layout.root().display());
    println!("  Canonical: {}", layout.canonical_file().display());
    println!("  Unit files: {}", layout.temp_dir().display());
    println!("  Checkpoint: {}", layout.progress_file().display());

    println!("\nCrawl:");
    println!("  Workers: {}", config.crawl.workers);
    println!(
        "  Pacing: {}-{} requests/min, jitter {}-{}ms",
        config.pacing.base_rpm,
        config.pacing.max_rpm,
        config.pacing.jitter_min_ms,
        config.pacing.jitter_max_ms
    );

    println!("\nFetch strategies (in order):");
    if config.fetch.session_backend != SessionBackendKind::None {
        println!("  - session ({} attempts)", config.fetch.session_attempts);
    }
    if !config.fetch.proxies.is_empty() {
        println!(
            "  - proxy ({} attempts, {} proxies)",
            config.fetch.proxy_attempts,
            config.fetch.proxies.len()
        );
    }
    println!("  - direct ({} attempts)", config.fetch.direct_attempts);

    let roots = select_roots(&config.roots, only);
    println!("\nRoots ({}):", roots.len());
    for root in &roots {
        println!("  - {} [{}] {}", root.id, root.kind, root.url);
    }

    println!("\nIdentity fields: {}", config.merge.identity_fields.join(", "));

    println!("\n✓ Configuration is valid");
    if config.extract.is_none() {
        println!("! No [extract] section; a crawl would need one");
    }
}

/// Handles the --consolidate-only mode
fn handle_consolidate_only(config: &Config) -> anyhow::Result<()> {
    let report = consolidate_only(config).context("Consolidation failed")?;

    println!("=== Consolidation ===\n");
    println!("Canonical: {}", report.canonical.display());
    println!("Unit files: {}", report.unit_files);
    println!(
        "Records: {} ({} new, {} merged)",
        report.stats.total, report.stats.new_keys, report.stats.merged
    );
    if !report.written {
        println!("Unchanged, nothing written");
    }

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config, config_hash: String, cli: &Cli) -> anyhow::Result<()> {
    let Some(extract) = config.extract.clone() else {
        bail!("The configuration has no [extract] section");
    };
    let extractor = SelectorExtractor::new(extract).context("Invalid [extract] section")?;

    if cli.fresh {
        tracing::info!("Starting fresh harvest (discarding checkpoint)");
    } else {
        tracing::info!("Starting harvest (resuming from checkpoint if present)");
    }

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight units");
            signal.trigger();
        }
    });

    let options = RunOptions {
        fresh: cli.fresh,
        only_roots: cli.only.clone(),
        retry_failed: cli.retry_failed,
    };

    let summary = run_harvest(
        config,
        Some(config_hash),
        Arc::new(extractor),
        options,
        shutdown,
    )
    .await
    .context("Harvest failed")?;

    print_summary(&summary);

    if let Some(path) = &cli.export_summary {
        generate_markdown_summary(&summary, path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!("✓ Summary exported to: {}", path.display());
    }

    Ok(())
}

//! ArNS indexer main entry point
//!
//! This is the command-line interface for the resolution and crawl pipeline.

use anyhow::Context;
use arns_indexer::config::{load_config_with_hash, Config};
use arns_indexer::pipeline::PipelineOrchestrator;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ArNS indexer: resolves the transactions ArNS names point at and crawls
/// their content
///
/// Discovers name and undername records, archives expired leases, classifies
/// each target transaction (path manifest, AO process, plain transaction) and
/// extracts searchable documents from manifests and text content.
#[derive(Parser, Debug)]
#[command(name = "arns-indexer")]
#[command(version)]
#[command(about = "Resolves and crawls ArNS name targets", long_about = None)]
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

    /// Run a single discovery cycle and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    once: bool,

    /// Validate config and print the effective settings without running
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_run(config, cli.once).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("arns_indexer=info,warn"),
            1 => EnvFilter::new("arns_indexer=debug,info"),
            2 => EnvFilter::new("arns_indexer=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== ArNS Indexer Dry Run ===\n");

    println!("Gateway:");
    println!("  Base URL: {}", config.gateway.base_url());
    println!(
        "  Timeouts: {}s request, {}s connect",
        config.gateway.request_timeout_secs, config.gateway.connect_timeout_secs
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nDiscovery:");
    println!(
        "  Snapshot: {}",
        config.discovery.snapshot_path.as_deref().unwrap_or("none")
    );
    println!("  Cycle delay: {}ms", config.discovery.cycle_delay_ms);
    println!("  Cleanup batch size: {}", config.discovery.cleanup_batch_size);
    println!(
        "  Blocked processes ({}):",
        config.discovery.blocked_process_ids.len()
    );
    for process_id in &config.discovery.blocked_process_ids {
        println!("    - {}", process_id);
    }

    let resolution = &config.resolution;
    println!("\nResolution: {}", if resolution.enabled { "enabled" } else { "disabled" });
    println!(
        "  Batch size: {}, concurrency: {}",
        resolution.batch_size, resolution.concurrency
    );
    println!(
        "  Max retries: {}, retry delay: {}ms",
        resolution.max_retries, resolution.retry_delay_ms
    );
    println!("  Allow list: {}", resolution.allow_list);
    println!("  Deny list: {}", resolution.deny_list);

    let crawl = &config.crawl;
    println!("\nCrawl: {}", if crawl.enabled { "enabled" } else { "disabled" });
    println!(
        "  Batch size: {}, concurrency: {}, max depth: {}",
        crawl.batch_size, crawl.concurrency, crawl.max_depth
    );
    println!(
        "  Limits: body {} chars, title {} chars, {} headings, {} links",
        crawl.max_body_size, crawl.max_title_size, crawl.max_headings_count, crawl.max_links_count
    );
    println!("  Allow list: {}", crawl.allow_list);
    println!("  Deny list: {}", crawl.deny_list);

    println!("\nJobs:");
    println!(
        "  Attempts: {}, backoff base: {}ms",
        config.jobs.attempts, config.jobs.backoff_base_ms
    );
    println!(
        "  Worker concurrency: {}, failed jobs kept: {}",
        config.jobs.worker_concurrency, config.jobs.keep_failed
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use arns_indexer::output::{load_statistics, print_statistics};
    use arns_indexer::storage::SqliteStorage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the pipeline run, continuous or single-cycle
async fn handle_run(config: Config, once: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Resolution {}, crawl {}",
        if config.resolution.enabled { "enabled" } else { "disabled" },
        if config.crawl.enabled { "enabled" } else { "disabled" }
    );

    let (orchestrator, receiver) =
        PipelineOrchestrator::from_config(config).context("Failed to start pipeline")?;

    if once {
        let report = orchestrator.run_once(receiver).await;
        if report.is_success() {
            tracing::info!("Cycle completed successfully");
        } else {
            anyhow::bail!("Cycle finished with failed stages");
        }
    } else {
        orchestrator.run(receiver).await?;
        tracing::info!("Indexer stopped");
    }

    Ok(())
}

//! webrecon main entry point
//!
//! This is the command-line interface for the webrecon reconnaissance crawler.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use webrecon::config::{load_config_with_hash, validate_scan_config, Config};
use webrecon::output::{
    print_findings, print_statistics, LoggingReporter, MemorySink, ScanSink, SqliteSink,
    StatusReporter,
};
use webrecon::Engine;

/// webrecon: a reconnaissance crawler for web application security scans
///
/// webrecon crawls a target site within its scope, respecting robots.txt
/// and rate limits, and records discovered URLs, forms and technology
/// fingerprints.
#[derive(Parser, Debug)]
#[command(name = "webrecon")]
#[command(version)]
#[command(about = "A reconnaissance crawler for web application scans", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the target URL from the configuration
    #[arg(long, value_name = "URL")]
    target: Option<String>,

    /// Write events to this SQLite database instead of the configured one
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Validate config and show what would be scanned without scanning
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
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(target) = cli.target {
        config.scan.target_url = target;
        validate_scan_config(&config.scan).context("invalid --target")?;
    }

    let database = cli
        .database
        .or_else(|| config.output.database_path.as_ref().map(PathBuf::from));

    if cli.dry_run {
        handle_dry_run(&config, database.as_deref());
        return Ok(());
    }

    handle_scan(config, database.as_deref(), &config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("webrecon=info,warn"),
            1 => EnvFilter::new("webrecon=debug,info"),
            2 => EnvFilter::new("webrecon=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective scan settings
fn handle_dry_run(config: &Config, database: Option<&Path>) {
    let scan = &config.scan;
    println!("=== webrecon Dry Run ===\n");

    println!("Target: {}", scan.target_url);
    println!("\nLimits:");
    println!("  Max depth: {}", scan.max_depth);
    println!("  Max pages: {}", scan.max_pages);
    println!("  Requests per second: {}", scan.requests_per_second);
    println!("  Max concurrent requests: {}", scan.max_concurrent_requests);
    println!("  Max requests per host: {}", scan.max_requests_per_host);
    println!("  Timeout: {}s (connect {}s)", scan.timeout, scan.connect_timeout);

    println!("\nBehaviour:");
    println!("  User agent: {}", scan.user_agent);
    println!("  Follow redirects: {}", scan.follow_redirects);
    println!("  Respect robots.txt: {}", scan.respect_robots);
    match &scan.auth {
        Some(auth) => println!("  Authentication: {:?}", auth.kind),
        None => println!("  Authentication: none"),
    }

    println!("\nScope:");
    if scan.scope_patterns.is_empty() {
        println!("  Same registrable domain as the target");
    }
    for pattern in &scan.scope_patterns {
        println!("  + {}", pattern);
    }
    for pattern in &scan.exclude_patterns {
        println!("  - {}", pattern);
    }

    println!("\nOutput:");
    match database {
        Some(path) => println!("  Database: {}", path.display()),
        None => println!("  In memory (summary only)"),
    }

    println!("\n✓ Configuration is valid");
}

/// Runs the scan and prints the summary
async fn handle_scan(config: Config, database: Option<&Path>, config_hash: &str) -> Result<()> {
    let memory = Arc::new(MemorySink::new());

    let sink: Arc<dyn ScanSink>;
    let reporter: Arc<dyn StatusReporter>;
    match database {
        Some(path) => {
            tracing::info!("Recording events to {}", path.display());
            let sqlite = Arc::new(
                SqliteSink::open(path, &config.scan.target_url, Some(config_hash))
                    .with_context(|| format!("failed to open database {}", path.display()))?,
            );
            sink = sqlite.clone();
            reporter = sqlite;
        }
        None => {
            sink = memory.clone();
            reporter = Arc::new(LoggingReporter);
        }
    }

    let engine = Engine::new(config.scan, sink, reporter)?;

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight requests");
            cancel.cancel();
        }
    });

    let stats = engine.run().await.context("scan failed")?;
    print_statistics(&stats, engine.status());

    if database.is_none() {
        print_findings(&memory.fingerprints(), &memory.forms());
    }

    Ok(())
}

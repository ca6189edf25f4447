//! Pagewalk main entry point
//!
//! This is the command-line interface for the pagewalk crawl-and-extract
//! pipeline.

use clap::{Parser, ValueEnum};
use pagewalk::config::{load_config_with_hash, Config};
use pagewalk::output::{print_report, read_listing_csv};
use pagewalk::render::HttpRenderer;
use pagewalk::{CrawlLimits, CrawlSession};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Pagewalk: a paginated crawl-and-extract pipeline
///
/// Phase 1 (`listing`) walks a paginated listing and saves one row per item
/// with a reference to its detail page. Phase 2 (`detail`) visits those
/// detail pages, waits out interstitial challenges and extracts fields.
#[derive(Parser, Debug)]
#[command(name = "pagewalk")]
#[command(version)]
#[command(about = "A paginated crawl-and-extract pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Crawl phase to run
    #[arg(value_enum)]
    phase: PhaseArg,

    /// Phase 1 output to read detail references from (detail phase only)
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Override the number of listing items to collect
    #[arg(long, value_name = "N")]
    max_listing_items: Option<u64>,

    /// Override the number of detail results to keep
    #[arg(long, value_name = "N")]
    max_results: Option<u64>,

    /// Override the number of detail records to visit
    #[arg(long, value_name = "N")]
    max_records: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    /// Collect listing items and their detail references
    Listing,

    /// Visit detail pages and extract fields
    Detail,
}

impl Cli {
    /// Config caps with command-line overrides applied
    fn limits(&self, config: &Config) -> CrawlLimits {
        let mut limits = config.limits;
        if let Some(n) = self.max_listing_items {
            limits.max_listing_items = n;
        }
        if let Some(n) = self.max_results {
            limits.max_results = n;
        }
        if let Some(n) = self.max_records {
            limits.max_records_to_visit = n;
        }
        limits
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let limits = cli.limits(&config);

    if cli.dry_run {
        handle_dry_run(&cli, &config, &limits)?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            on_signal.cancel();
        }
    });

    let mut renderer = HttpRenderer::new(&config.http)?;
    let session = CrawlSession::new(config.clone(), limits, cancel, config_hash);

    let result = match cli.phase {
        PhaseArg::Listing => session.run_listing(&mut renderer).await,
        PhaseArg::Detail => {
            let input = detail_input(&cli, &config)?;
            tracing::info!("Reading detail references from {}", input.display());
            let records = read_listing_csv(
                &input,
                &config.output.key_column,
                &config.output.ref_column,
            )?;
            tracing::info!("Loaded {} records", records.len());
            session.run_detail(&mut renderer, records).await
        }
    };

    match result {
        Ok(report) => {
            if !cli.quiet {
                print_report(&report);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagewalk=info,warn"),
            1 => EnvFilter::new("pagewalk=debug,info"),
            2 => EnvFilter::new("pagewalk=trace,debug"),
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

/// The phase 1 file to read: `--input`, or the newest listing output
fn detail_input(cli: &Cli, config: &Config) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(input) = &cli.input {
        return Ok(input.clone());
    }

    let prefix = format!("{}_", config.output.listing_prefix);
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(&config.output.directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "csv")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
        })
        .collect();

    // Timestamped names sort chronologically
    candidates.sort();
    candidates.pop().ok_or_else(|| {
        format!(
            "no {}*.csv in {}; pass --input",
            prefix, config.output.directory
        )
        .into()
    })
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(
    cli: &Cli,
    config: &Config,
    limits: &CrawlLimits,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Pagewalk Dry Run ===\n");

    println!("Session:");
    println!(
        "  Login: {}",
        match (&config.session.login_url, config.session.login_prompt) {
            (Some(url), true) => format!("{} (wait for Enter)", url),
            (Some(url), false) => format!("{} ({}ms)", url, config.session.login_wait_ms),
            (None, true) => "wait for Enter".to_string(),
            (None, false) => format!("{}ms", config.session.login_wait_ms),
        }
    );
    println!("  Pacing: {}ms", config.session.pacing_ms);
    println!(
        "  Retries: {} ({}ms apart)",
        config.session.retries, config.session.retry_delay_ms
    );
    println!("  Checkpoint every: {}", config.session.checkpoint_every);

    println!("\nLimits:");
    println!("  Max listing items: {}", limits.max_listing_items);
    println!("  Max results: {}", limits.max_results);
    println!("  Max records to visit: {}", limits.max_records_to_visit);

    match &config.challenge {
        Some(challenge) => {
            println!("\nChallenge:");
            println!(
                "  Marker: '{}' in {}",
                challenge.marker_text, challenge.marker_selector
            );
            println!(
                "  Polling: first after {}ms, then every {}ms, give up after {}ms",
                challenge.initial_wait_ms, challenge.poll_interval_ms, challenge.max_wait_ms
            );
        }
        None => println!("\nChallenge: not configured"),
    }

    match cli.phase {
        PhaseArg::Listing => {
            let listing = config
                .listing
                .as_ref()
                .ok_or("configuration has no [listing] section")?;
            println!("\nListing:");
            match (&listing.url_template, &listing.start_url, &listing.page_script) {
                (Some(template), _, _) => println!("  Pages: {}", template),
                (None, Some(start), Some(script)) => {
                    println!("  Start: {}", start);
                    println!("  Page script: {}", script);
                    return Err(
                        "page-script pagination needs a script-capable renderer; \
                         the HTTP renderer can only follow url-template"
                            .into(),
                    );
                }
                _ => {}
            }
            println!("  Start page: {}", listing.start_page);
            if let Some(max_pages) = listing.max_pages {
                println!("  Max pages: {}", max_pages);
            }
            println!("  Items: {} {}", listing.container, listing.item);
        }
        PhaseArg::Detail => {
            let detail = config
                .detail
                .as_ref()
                .ok_or("configuration has no [detail] section")?;
            println!("\nDetail Fields ({}):", detail.fields.len());
            for field in &detail.fields {
                println!(
                    "  - {} -> '{}'{}",
                    field.name,
                    field.column_name(),
                    if field.required { " (required)" } else { "" }
                );
            }
            match &cli.input {
                Some(input) => println!("\nInput: {}", input.display()),
                None => println!("\nInput: newest {}_*.csv", config.output.listing_prefix),
            }
        }
    }

    println!("\nOutput: {}", config.output.directory);

    println!("\n✓ Configuration is valid");

    Ok(())
}

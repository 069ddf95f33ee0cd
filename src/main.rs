//! crawl-orchestra main entry point
//!
//! This is the command-line interface for the crawl-orchestra site crawler.

use anyhow::Context;
use clap::Parser;
use crawl_orchestra::config::{load_config_with_hash, Config};
use crawl_orchestra::dispatcher::{Dispatcher, Selection};
use crawl_orchestra::fetch::RenderEngine;
use crawl_orchestra::output::{print_statistics, JsonResultsWriter, MarkdownSummary, OutputHandler};
use crawl_orchestra::storage::PartitionedStore;
use crawl_orchestra::{ConfigError, HarvestError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// crawl-orchestra: a polite, partitioned site crawler
///
/// Crawls the configured websites while respecting robots.txt and per-site
/// rate limits, and stores every fetched page in a date-partitioned store.
#[derive(Parser, Debug)]
#[command(name = "crawl-orchestra")]
#[command(version)]
#[command(about = "A polite, partitioned site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Crawl every configured website (default when nothing is selected)
    #[arg(long, conflicts_with = "websites")]
    all: bool,

    /// Crawl only the named websites
    #[arg(long, num_args = 1.., value_name = "NAME")]
    websites: Vec<String>,

    /// Also crawl the configured news feeds
    #[arg(long)]
    news: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "N")]
    deadline_secs: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn selection(&self, config: &Config) -> Selection {
        if !self.websites.is_empty() {
            return Selection::sites(self.websites.iter().cloned()).with_news(self.news);
        }
        if self.news && !self.all {
            return Selection::news_only();
        }
        Selection::all().with_news(self.news || !config.news.feeds.is_empty())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            if is_config_error(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
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
            0 => EnvFilter::new("crawl_orchestra=info,warn"),
            1 => EnvFilter::new("crawl_orchestra=debug,info"),
            2 => EnvFilter::new("crawl_orchestra=trace,debug"),
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

fn is_config_error(error: &anyhow::Error) -> bool {
    error.downcast_ref::<ConfigError>().is_some()
        || matches!(
            error.downcast_ref::<HarvestError>(),
            Some(HarvestError::Config(_))
        )
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let selection = cli.selection(&config);
    let sites = config.site_configs()?;
    let cancel = CancellationToken::new();

    if cli.dry_run {
        let dispatcher = Dispatcher::from_config(&config, PartitionedStore::in_memory(), cancel)?;
        handle_dry_run(&config, &dispatcher, &sites, &selection)?;
        return Ok(ExitCode::SUCCESS);
    }

    let store = PartitionedStore::from_config(&config.storage)
        .with_context(|| format!("Failed to open {:?} store at {}", config.storage.backend, config.storage.path))?;

    let dispatcher = Dispatcher::from_config(&config, store, cancel.clone())?
        .with_render_engine(render_engine(&config));

    spawn_cancel_watch(cancel, cli.deadline_secs.map(Duration::from_secs));

    let report = dispatcher
        .run(&sites, &selection)
        .await?
        .with_config_hash(config_hash);

    if !cli.quiet {
        print_statistics(&report);
    }

    let results = JsonResultsWriter::new(&config.output.results_dir);
    match results.write_report(&report) {
        Ok(path) => tracing::info!("Results written to {}", path.display()),
        Err(e) => tracing::error!("Failed to write results file: {}", e),
    }

    if let Some(summary_path) = &config.output.summary_path {
        match MarkdownSummary::new(summary_path).write_report(&report) {
            Ok(path) => tracing::info!("Summary written to {}", path.display()),
            Err(e) => tracing::error!("Failed to write summary: {}", e),
        }
    }

    if report.has_aborted() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Cancels the run on Ctrl-C or once the deadline passes
fn spawn_cancel_watch(cancel: CancellationToken, deadline: Option<Duration>) {
    tokio::spawn(async move {
        let deadline_passed = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                tracing::warn!("Interrupted, cancelling crawl sessions");
            }
            _ = deadline_passed => {
                tracing::warn!("Deadline reached, cancelling crawl sessions");
            }
        }

        cancel.cancel();
    });
}

#[cfg(feature = "headless")]
fn render_engine(config: &Config) -> Arc<dyn RenderEngine> {
    Arc::new(crawl_orchestra::fetch::HeadlessChromeEngine::new(
        config.user_agent.header_value(),
    ))
}

#[cfg(not(feature = "headless"))]
fn render_engine(_config: &Config) -> Arc<dyn RenderEngine> {
    Arc::new(crawl_orchestra::fetch::UnavailableEngine)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(
    config: &Config,
    dispatcher: &Dispatcher,
    sites: &[crawl_orchestra::SiteConfig],
    selection: &Selection,
) -> anyhow::Result<()> {
    let plan = dispatcher.plan(sites, selection)?;

    println!("=== crawl-orchestra Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max parallel sessions: {}",
        config.crawler.max_parallel_sessions
    );
    println!("  Default page limit: {}", config.crawler.default_page_limit);
    println!("  Minimum delay: {}ms", config.crawler.min_delay_ms);
    println!(
        "  Retries: {} attempts, {}ms base delay, x{} multiplier",
        config.retry.max_attempts, config.retry.base_delay_ms, config.retry.multiplier
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nStorage: {:?} at {}", config.storage.backend, config.storage.path);
    println!("Results: {}", config.output.results_dir);

    println!("\nSelected Sites ({}):", plan.sites.len());
    for site in &plan.sites {
        println!(
            "  - {} [{:?}] {} (limit {}, delay {}ms)",
            site.name,
            site.mode,
            site.url,
            site.page_limit,
            site.min_delay.as_millis()
        );
        for seed in &site.seeds {
            println!("    * {}", seed);
        }
    }

    if !plan.unknown.is_empty() {
        println!("\nUnknown Sites ({}):", plan.unknown.len());
        for name in &plan.unknown {
            println!("  - {}", name);
        }
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

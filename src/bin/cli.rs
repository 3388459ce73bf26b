//! pricewatch CLI
//!
//! Runs crawl cycles against a local storage directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pricewatch::{
    config::{config_path, load_config},
    error::Result,
    models::{Config, CycleReport},
    pipeline::{self, CrawlOrchestrator, CycleOptions},
    services::Strategies,
    storage::{ChangeRegistry, DatasetStore, DurableStore},
    utils::{http, log as console},
};

/// pricewatch - Incremental Pricing Document Crawler
#[derive(Parser, Debug)]
#[command(
    name = "pricewatch",
    version,
    about = "Incrementally crawls provider pricing pages into per-source datasets"
)]
struct Cli {
    /// Path to storage directory holding config, datasets and registry
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one crawl cycle
    Run {
        /// Re-extract every source in full mode regardless of changes
        #[arg(long)]
        full: bool,

        /// Only crawl these source ids (repeatable)
        #[arg(long = "source", value_name = "ID")]
        sources: Vec<String>,

        /// Write the JSON cycle report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show registry entries and dataset counters per source
    Status,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
    console::init(level);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_file = config_path(&cli.storage_dir, cli.config.as_deref());
    console::debug(&format!(
        "Storage: {}, config: {}",
        cli.storage_dir.display(),
        config_file.display()
    ));

    match cli.command {
        Command::Run {
            full,
            sources,
            report,
        } => {
            let config = Arc::new(load_config(&config_file)?);
            log::info!("Loaded configuration from {}", config_file.display());
            run(config, &cli.storage_dir, full, sources, report).await?;
        }

        Command::Status => {
            let config = load_config(&config_file)?;
            status(&config, &cli.storage_dir).await?;
        }

        Command::Validate => {
            pipeline::run_validate(&config_file)?;
        }
    }

    Ok(())
}

async fn run(
    config: Arc<Config>,
    storage_dir: &Path,
    force_full: bool,
    only: Vec<String>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    console::header("pricewatch crawl cycle");

    let client = http::create_async_client(&config.crawler)?;
    let strategies = Strategies::with_defaults(client);
    let orchestrator = CrawlOrchestrator::new(Arc::clone(&config), strategies, storage_dir);

    console::step(1, 2, "Crawl - manifests, change detection and extraction");
    let options = CycleOptions { force_full, only };
    let result = orchestrator.run(&options).await?;
    let report = result.report();

    console::step(2, 2, "Report");
    print_report(&report);

    if let Some(path) = report_path {
        DurableStore::new().write_json(&path, &report).await?;
        console::success(&format!("Report written to {}", path.display()));
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    for detail in &report.details {
        let line = match (&detail.error, detail.mode) {
            (Some(error), _) => format!(
                "{}: FAILED at {} stage: {}",
                detail.source,
                detail
                    .stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".into()),
                error
            ),
            (None, Some(mode)) => format!(
                "{}: updated ({} mode), {} units, {} extracted",
                detail.source, mode, detail.total_units, detail.successful_units
            ),
            (None, None) => format!("{}: unchanged", detail.source),
        };
        console::sub_item(&line);
        if let Some(shortfall) = detail.extraction_shortfall() {
            console::warn(&format!("{}: {}", detail.source, shortfall));
        }
    }

    console::summary(
        if report.no_op {
            "No changes"
        } else {
            "Cycle complete"
        },
        &[
            ("Sources", report.total_sources.to_string()),
            ("Succeeded", report.succeeded.to_string()),
            ("Failed", report.failed.to_string()),
            ("Unchanged", report.skipped_unchanged.to_string()),
            ("Change rate", format!("{:.1}%", report.change_rate_percent)),
        ],
    );
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}

async fn status(config: &Config, storage_dir: &Path) -> Result<()> {
    let registry = ChangeRegistry::new(config.storage.registry_path(storage_dir));
    let datasets = DatasetStore::new(config.storage.datasets_path(storage_dir));
    let snapshot = registry.load().await?;

    console::header("pricewatch status");
    console::info(&format!("Registry: {}", registry.dir().display()));
    console::info(&format!("Datasets: {}", datasets.root().display()));
    console::separator();

    for source in &config.sources {
        let urls = snapshot.stored_urls(&source.id);
        if urls.is_empty() {
            console::info(&format!("{}: not crawled yet", source.id));
        } else {
            console::info(&format!("{}: {} registered urls", source.id, urls.len()));
            for url in &urls {
                let hash = snapshot
                    .stored_hashes(&source.id)
                    .and_then(|h| h.get(url))
                    .map(|h| format!(" [{}]", short_hash(h)))
                    .unwrap_or_default();
                console::sub_item(&format!("{}{}", url, hash));
            }
        }

        match datasets.load(&source.id).await {
            Ok(Some(dataset)) => console::sub_item(&format!(
                "dataset: {} units ({} ok, {} failed), crawled {}, last update {} x{}",
                dataset.total_units,
                dataset.successful_units,
                dataset.failed_units,
                dataset.crawled_at.format("%Y-%m-%d %H:%M:%S UTC"),
                dataset.last_update.mode,
                dataset.last_update.updated_count
            )),
            Ok(None) => console::sub_item("dataset: none"),
            Err(e) => console::error(&format!("{}: {}", source.id, e)),
        }
    }
    Ok(())
}

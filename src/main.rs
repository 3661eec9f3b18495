//! Juris-Harvest main entry point
//!
//! This is the command-line interface for the Juris-Harvest legal
//! publication harvester.

use anyhow::Context;
use clap::Parser;
use juris_harvest::config::{load_config_with_hash, Config};
use juris_harvest::output::{export_training_data, load_statistics, print_statistics};
use juris_harvest::scheduler::{self, CycleReport, Orchestrator};
use juris_harvest::storage::{lock, open_storage, DocumentFilter, SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SEARCH_LIMIT: usize = 50;

/// Juris-Harvest: a scheduled harvester for public legal publications
///
/// Juris-Harvest fetches court decisions and legal news every week,
/// cleans and classifies the text, scores it for quality and stores it
/// for training-data export.
#[derive(Parser, Debug)]
#[command(name = "juris-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A scheduled harvester for public legal publications", long_about = None)]
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

    /// Run the weekly scheduler until interrupted (default)
    #[arg(long, group = "mode")]
    serve: bool,

    /// Run one harvest cycle now and exit
    #[arg(long, group = "mode")]
    run_once: bool,

    /// Run one harvest cycle against an in-memory database
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Print a health report and exit
    #[arg(long, group = "mode")]
    health_check: bool,

    /// Show statistics from the database and exit
    #[arg(long, group = "mode")]
    stats: bool,

    /// Write high-quality documents to the JSONL training export and exit
    #[arg(long, group = "mode")]
    export_training: bool,

    /// Run retention maintenance now and exit
    #[arg(long, group = "mode")]
    retention: bool,

    /// Re-run the processor over every stored raw document and exit
    #[arg(long, group = "mode")]
    reprocess: bool,

    /// List stored documents whose title or text contains TEXT and exit
    #[arg(long, value_name = "TEXT", group = "mode")]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

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

    let result = if cli.dry_run {
        handle_dry_run(config, config_hash).await
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_training {
        handle_export_training(&config)
    } else if cli.run_once {
        handle_run_once(config, config_hash).await
    } else if cli.health_check {
        handle_health_check(config, config_hash)
    } else if cli.retention {
        handle_retention(config, config_hash)
    } else if cli.reprocess {
        handle_reprocess(config, config_hash)
    } else if let Some(text) = &cli.search {
        handle_search(&config, text)
    } else {
        handle_serve(config, config_hash).await
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("juris_harvest=info,warn"),
            1 => EnvFilter::new("juris_harvest=debug,info"),
            2 => EnvFilter::new("juris_harvest=trace,debug"),
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

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    open_storage(path).with_context(|| format!("opening database {}", path.display()))
}

fn build_orchestrator(
    config: Config,
    config_hash: String,
    storage: SqliteStorage,
) -> anyhow::Result<Arc<Orchestrator>> {
    let orchestrator = Orchestrator::new(config, config_hash, storage)?;
    Ok(Arc::new(orchestrator))
}

/// Handles the default mode: runs the scheduler until Ctrl-C
async fn handle_serve(config: Config, config_hash: String) -> anyhow::Result<()> {
    let storage = open_database(&config)?;
    let orchestrator = build_orchestrator(config, config_hash, storage)?;
    let handle = scheduler::spawn(orchestrator)?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Interrupt received");
    handle.shutdown().await;
    Ok(())
}

/// Handles the --run-once mode
async fn handle_run_once(config: Config, config_hash: String) -> anyhow::Result<()> {
    let storage = open_database(&config)?;
    let orchestrator = build_orchestrator(config, config_hash, storage)?;

    let report = orchestrator.run_once().await;
    orchestrator.flush_notifications().await;
    print_cycle_report(&report?);
    Ok(())
}

/// Handles the --dry-run mode: a full cycle whose results are discarded
async fn handle_dry_run(config: Config, config_hash: String) -> anyhow::Result<()> {
    println!("=== Juris-Harvest Dry Run ===\n");

    println!("Schedule:");
    println!(
        "  Harvest: {} {} ({})",
        config.schedule.day_of_week, config.schedule.time, config.schedule.timezone
    );
    println!(
        "  Cycle retries: {} every {} min",
        config.schedule.max_retries, config.schedule.retry_delay_minutes
    );

    println!("\nSources:");
    for source in &config.sources {
        println!(
            "  - {} ({}, limit {}, {} pages)",
            source.id.display_name(),
            if source.enabled { "enabled" } else { "disabled" },
            source.limit,
            source.max_pages
        );
    }

    println!("\nUser Agent: {}\n", config.user_agent.header_value());

    let orchestrator = build_orchestrator(config, config_hash, SqliteStorage::new_in_memory()?)?;
    let report = orchestrator.run_once().await?;
    print_cycle_report(&report);

    let storage = lock(orchestrator.storage())?;
    print_statistics(&load_statistics(&*storage, chrono::Utc::now())?);
    println!("\n✓ Nothing was written to {}", orchestrator.config().output.database_path);
    Ok(())
}

/// Handles the --health-check mode
fn handle_health_check(config: Config, config_hash: String) -> anyhow::Result<()> {
    let storage = open_database(&config)?;
    let orchestrator = build_orchestrator(config, config_hash, storage)?;
    let report = orchestrator.health_check()?;

    println!("=== Juris-Harvest Health ===\n");
    println!("Database: {}", report.database_status());
    println!("Recent activity: {}", report.recent_activity());
    println!("Documents: {} ({} processed)", report.total_documents, report.processed_documents);
    println!("Fetched in the last 7 days: {}", report.recent_documents);
    println!("Active sources: {}", report.sources_active);
    println!(
        "Consecutive failed cycles: {}",
        report.schedule.consecutive_failure_count
    );
    if let Some(last) = report.schedule.last_run_at {
        println!("Last run: {}", last.to_rfc3339());
    }
    if let Some(next) = report.schedule.next_run_at {
        println!("Next run: {}", next.to_rfc3339());
    }
    if let Some(status) = report.last_cycle_status {
        println!("Last cycle: {}", status.to_db_string());
    }
    for summary in report.recent_errors() {
        println!("  ! {}", summary);
    }
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage, chrono::Utc::now())?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-training mode
fn handle_export_training(config: &Config) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let path = Path::new(&config.output.export_path);

    let written = export_training_data(&storage, path, config.output.export_min_quality)?;
    println!(
        "✓ Exported {} documents (quality >= {}) to {}",
        written,
        config.output.export_min_quality,
        path.display()
    );
    Ok(())
}

/// Handles the --retention mode
fn handle_retention(config: Config, config_hash: String) -> anyhow::Result<()> {
    let storage = open_database(&config)?;
    let orchestrator = build_orchestrator(config, config_hash, storage)?;

    let report = orchestrator.run_retention(chrono::Utc::now())?;
    println!(
        "✓ Deleted {} documents fetched before {}",
        report.deleted,
        report.cutoff.to_rfc3339()
    );
    if let Some(backup) = report.backup {
        println!("✓ Backup written to {}", backup.display());
    }
    Ok(())
}

/// Handles the --reprocess mode
fn handle_reprocess(config: Config, config_hash: String) -> anyhow::Result<()> {
    let storage = open_database(&config)?;
    let orchestrator = build_orchestrator(config, config_hash, storage)?;

    let report = orchestrator.reprocess_stored()?;
    println!(
        "✓ Reprocessed {} documents ({} skipped)",
        report.processed, report.skipped
    );
    Ok(())
}

/// Handles the --search mode
fn handle_search(config: &Config, text: &str) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let docs = storage.query(&DocumentFilter {
        text: Some(text.to_string()),
        limit: Some(SEARCH_LIMIT),
        ..DocumentFilter::default()
    })?;

    println!("=== {} documents matching \"{}\" ===\n", docs.len(), text);
    for doc in &docs {
        println!(
            "  [{}] {} ({}, quality {:.2})",
            doc.source_id,
            doc.title,
            doc.category.label(),
            doc.quality_score
        );
    }
    Ok(())
}

fn print_cycle_report(report: &CycleReport) {
    let (attempted, succeeded, failed) = report.totals();

    println!("=== Cycle {} ({}) ===\n", report.cycle_id, report.slot);
    println!("Status: {}", report.status.to_db_string());
    println!("Attempted: {}", attempted);
    println!("Stored: {}", succeeded);
    println!("Failed: {}", failed);
    if let Some(rate) = report.success_rate() {
        println!("Success rate: {:.1}%", rate * 100.0);
    }

    println!("\nSources:");
    for run in &report.runs {
        println!(
            "  {}: {}/{}",
            run.source_id, run.succeeded_count, run.attempted_count
        );
        if let Some(summary) = &run.error_summary {
            println!("    errors: {}", summary);
        }
    }

    for problem in &report.problems {
        println!("\n! {}", problem);
    }
}

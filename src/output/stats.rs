//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::processor::Category;
use crate::scheduler::alert::totals;
use crate::sources::SourceId;
use crate::storage::{CycleRecord, RunRecord, Storage, StorageResult};
use chrono::{DateTime, Duration, Utc};

/// Number of run records shown in the report
const RECENT_RUNS: usize = 10;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Raw documents currently stored
    pub total_raw: u64,

    /// Documents with a processed row
    pub total_processed: u64,

    pub by_source: Vec<(SourceId, u64)>,

    pub by_category: Vec<(Category, u64)>,

    /// Mean quality of processed documents, if any
    pub average_quality: Option<f64>,

    /// Raw documents fetched in the last seven days
    pub fetched_last_week: u64,

    pub latest_cycle: Option<CycleRecord>,

    /// Newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage, now: DateTime<Utc>) -> StorageResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        total_raw: storage.count_raw()?,
        total_processed: storage.count_processed()?,
        by_source: storage.count_by_source()?,
        by_category: storage.count_by_category()?,
        average_quality: storage.average_quality()?,
        fetched_last_week: storage.count_fetched_since(now - Duration::days(7))?,
        latest_cycle: storage.latest_cycle()?,
        recent_runs: storage.recent_runs(RECENT_RUNS)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Raw documents: {}", stats.total_raw);
    println!("  Processed documents: {}", stats.total_processed);
    println!("  Fetched in the last 7 days: {}", stats.fetched_last_week);
    match stats.average_quality {
        Some(quality) => println!("  Average quality: {:.3}", quality),
        None => println!("  Average quality: n/a"),
    }
    println!();

    if !stats.by_source.is_empty() {
        println!("Documents by Source:");
        for (source, count) in &stats.by_source {
            println!("  {}: {}", source.display_name(), count);
        }
        println!();
    }

    if !stats.by_category.is_empty() {
        println!("Documents by Category:");
        let mut counts: Vec<_> = stats.by_category.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        for (category, count) in counts {
            let percentage = if stats.total_processed > 0 {
                (*count as f64 / stats.total_processed as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", category.label(), count, percentage);
        }
        println!();
    }

    if let Some(cycle) = &stats.latest_cycle {
        println!("Latest Cycle:");
        println!("  Slot: {} (attempt {})", cycle.slot, cycle.attempt);
        println!("  Status: {}", cycle.status.to_db_string());
        println!("  Started: {}", cycle.started_at.to_rfc3339());
        if let Some(ended) = cycle.ended_at {
            println!("  Ended: {}", ended.to_rfc3339());
        }
        println!();
    }

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs ({}):", stats.recent_runs.len());
        for run in &stats.recent_runs {
            println!(
                "  {} {}: {}/{} stored",
                run.ended_at.format("%Y-%m-%d %H:%M"),
                run.source_id,
                run.succeeded_count,
                run.attempted_count
            );
            if let Some(summary) = &run.error_summary {
                println!("    errors: {}", summary);
            }
        }
        println!();
    }

    let (attempted, succeeded, _) = totals(&stats.recent_runs);
    let success_rate = if attempted > 0 {
        (succeeded as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Success Rate: {:.1}% ({} / {} documents in recent runs)",
        success_rate, succeeded, attempted
    );
}

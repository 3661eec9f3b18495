//! Storage module for persisting harvest data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Idempotent upserts of raw and processed documents
//! - Append-only run records and the per-slot cycle ledger
//! - Schedule state persistence for restarts
//! - Retention deletes and backups

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::processor::{Category, Enrichment, Entity};
use crate::sources::SourceId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Store handle shared by concurrent source workers
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Locks a shared store, mapping poisoning to [`StorageError::Poisoned`]
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage.lock().map_err(|_| StorageError::Poisoned)
}

/// What an upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// The cleaned, classified and scored form of a raw document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDocument {
    pub document_id: String,
    pub source_id: SourceId,
    pub title: String,
    pub cleaned_text: String,
    pub category: Category,
    pub extracted_entities: Vec<Entity>,
    /// Always within [0, 1]
    pub quality_score: f64,
    pub word_count: usize,
    pub processed_at: DateTime<Utc>,
    pub enrichment: Option<Enrichment>,
}

/// Audit record of one adapter invocation within a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub cycle_id: Option<i64>,
    pub source_id: SourceId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub attempted_count: u32,
    pub succeeded_count: u32,
    pub failed_count: u32,
    pub error_summary: Option<String>,
}

impl RunRecord {
    /// Builds a record whose counts always add up
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: String,
        cycle_id: Option<i64>,
        source_id: SourceId,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        succeeded_count: u32,
        failed_count: u32,
        error_summary: Option<String>,
    ) -> Self {
        Self {
            run_id,
            cycle_id,
            source_id,
            started_at,
            ended_at,
            attempted_count: succeeded_count + failed_count,
            succeeded_count,
            failed_count,
            error_summary,
        }
    }
}

/// Status of one cycle attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Running,
    Succeeded,
    /// Completed but breached an alert threshold
    Breached,
    Failed,
    Cancelled,
}

impl CycleStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Breached => "breached",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "breached" => Some(Self::Breached),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// The cycle ran every adapter to the end
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Breached)
    }
}

/// One row of the cycle ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleRecord {
    pub id: i64,
    pub slot: String,
    pub attempt: u32,
    pub status: CycleStatus,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Selection criteria for [`Storage::query`]
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub source_id: Option<SourceId>,
    pub category: Option<Category>,
    pub min_quality: Option<f64>,
    pub processed_since: Option<DateTime<Utc>>,
    /// Substring of the title or cleaned text (ASCII case-insensitive)
    pub text: Option<String>,
    pub limit: Option<usize>,
}

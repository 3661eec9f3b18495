//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::processor::Category;
use crate::sources::{RawDocument, SourceId};
use crate::state::ScheduleState;
use crate::storage::{
    CycleRecord, CycleStatus, DocumentFilter, ProcessedDocument, RunRecord, UpsertOutcome,
};
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is a self-contained transaction; callers never hold a
/// transaction open across network I/O.
pub trait Storage: Send {
    // ===== Documents =====

    /// Inserts or updates a raw document keyed by its natural key
    ///
    /// Re-upserting identical content is a no-op and reports
    /// [`UpsertOutcome::Unchanged`].
    fn upsert_raw(&mut self, doc: &RawDocument) -> StorageResult<UpsertOutcome>;

    /// Inserts or overwrites the processed form of a stored raw document
    ///
    /// Fails with [`StorageError::NotFound`] when the raw document is absent.
    fn upsert_processed(&mut self, doc: &ProcessedDocument) -> StorageResult<()>;

    fn get_raw(&self, document_id: &str) -> StorageResult<Option<RawDocument>>;

    fn get_processed(&self, document_id: &str) -> StorageResult<Option<ProcessedDocument>>;

    /// Raw documents, optionally restricted to one source, oldest first
    fn list_raw(&self, source_id: Option<SourceId>) -> StorageResult<Vec<RawDocument>>;

    /// Processed documents matching the filter, best quality first
    fn query(&self, filter: &DocumentFilter) -> StorageResult<Vec<ProcessedDocument>>;

    /// Deletes raw documents fetched before `cutoff` with their processed rows
    ///
    /// Returns the number of raw documents removed.
    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    // ===== Runs and cycles =====

    /// Appends a run record; run ids are never reused
    fn append_run(&mut self, run: &RunRecord) -> StorageResult<()>;

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    fn runs_for_cycle(&self, cycle_id: i64) -> StorageResult<Vec<RunRecord>>;

    /// Returns true if the slot already has a successful cycle
    fn is_slot_completed(&self, slot: &str) -> StorageResult<bool>;

    /// Records the start of a cycle attempt and returns its id
    fn begin_cycle(
        &mut self,
        slot: &str,
        attempt: u32,
        config_hash: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<i64>;

    fn finish_cycle(
        &mut self,
        cycle_id: i64,
        status: CycleStatus,
        ended_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    fn latest_cycle(&self) -> StorageResult<Option<CycleRecord>>;

    /// Marks cycles left running by a crashed process as failed
    fn mark_interrupted_cycles(&mut self, ended_at: DateTime<Utc>) -> StorageResult<u64>;

    // ===== Schedule state =====

    /// Loads the persisted schedule fields, or a fresh state
    fn load_schedule_state(&self) -> StorageResult<ScheduleState>;

    fn save_schedule_state(&mut self, state: &ScheduleState) -> StorageResult<()>;

    // ===== Statistics =====

    fn count_raw(&self) -> StorageResult<u64>;

    fn count_processed(&self) -> StorageResult<u64>;

    fn count_by_source(&self) -> StorageResult<Vec<(SourceId, u64)>>;

    fn count_by_category(&self) -> StorageResult<Vec<(Category, u64)>>;

    fn average_quality(&self) -> StorageResult<Option<f64>>;

    fn count_fetched_since(&self, since: DateTime<Utc>) -> StorageResult<u64>;

    // ===== Maintenance =====

    /// Writes a consistent snapshot of the database to `path`
    fn backup_to(&self, path: &Path) -> StorageResult<()>;
}

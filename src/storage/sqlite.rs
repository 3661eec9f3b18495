//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that text
//! comparison orders them correctly.

use crate::processor::Category;
use crate::sources::{RawDocument, SourceId};
use crate::state::ScheduleState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CycleRecord, CycleStatus, DocumentFilter, ProcessedDocument, RunRecord, UpsertOutcome,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const RAW_COLUMNS: &str =
    "source_id, external_id, url, title, published_at, fetched_at, raw_text";

const PROCESSED_COLUMNS: &str = "document_id, source_id, title, cleaned_text, category, \
     entities, quality_score, word_count, processed_at, enrichment";

const RUN_COLUMNS: &str = "run_id, cycle_id, source_id, started_at, ended_at, \
     attempted_count, succeeded_count, failed_count, error_summary";

const CYCLE_COLUMNS: &str = "id, slot, attempt, status, config_hash, started_at, ended_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn db_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_failure<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

fn parse_opt_time(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_time(idx, v)).transpose()
}

fn parse_source(idx: usize, value: String) -> rusqlite::Result<SourceId> {
    SourceId::from_db_string(&value).ok_or_else(|| {
        conversion_failure(
            idx,
            StorageError::Corrupt {
                column: "source_id",
                value,
            },
        )
    })
}

fn parse_category(idx: usize, value: String) -> rusqlite::Result<Category> {
    Category::from_db_string(&value).ok_or_else(|| {
        conversion_failure(
            idx,
            StorageError::Corrupt {
                column: "category",
                value,
            },
        )
    })
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawDocument> {
    let published: Option<String> = row.get(4)?;
    Ok(RawDocument {
        source_id: parse_source(0, row.get(0)?)?,
        external_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        published_at: published
            .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| conversion_failure(4, e))?,
        fetched_at: parse_time(5, row.get(5)?)?,
        raw_text: row.get(6)?,
    })
}

fn processed_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessedDocument> {
    let entities: String = row.get(5)?;
    let enrichment: Option<String> = row.get(9)?;
    Ok(ProcessedDocument {
        document_id: row.get(0)?,
        source_id: parse_source(1, row.get(1)?)?,
        title: row.get(2)?,
        cleaned_text: row.get(3)?,
        category: parse_category(4, row.get(4)?)?,
        extracted_entities: serde_json::from_str(&entities)
            .map_err(|e| conversion_failure(5, e))?,
        quality_score: row.get(6)?,
        word_count: row.get::<_, i64>(7)? as usize,
        processed_at: parse_time(8, row.get(8)?)?,
        enrichment: enrichment
            .map(|e| serde_json::from_str(&e))
            .transpose()
            .map_err(|e| conversion_failure(9, e))?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        run_id: row.get(0)?,
        cycle_id: row.get(1)?,
        source_id: parse_source(2, row.get(2)?)?,
        started_at: parse_time(3, row.get(3)?)?,
        ended_at: parse_time(4, row.get(4)?)?,
        attempted_count: row.get(5)?,
        succeeded_count: row.get(6)?,
        failed_count: row.get(7)?,
        error_summary: row.get(8)?,
    })
}

fn cycle_from_row(row: &Row<'_>) -> rusqlite::Result<CycleRecord> {
    let status: String = row.get(3)?;
    Ok(CycleRecord {
        id: row.get(0)?,
        slot: row.get(1)?,
        attempt: row.get(2)?,
        status: CycleStatus::from_db_string(&status).unwrap_or(CycleStatus::Failed),
        config_hash: row.get(4)?,
        started_at: parse_time(5, row.get(5)?)?,
        ended_at: parse_opt_time(6, row.get(6)?)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Documents =====

    fn upsert_raw(&mut self, doc: &RawDocument) -> StorageResult<UpsertOutcome> {
        let document_id = doc.document_id();
        let natural_key = doc.natural_key();
        let content_hash = doc.content_hash();
        let published_at = doc.published_at.map(|d| d.format("%Y-%m-%d").to_string());
        let fetched_at = db_time(&doc.fetched_at);

        let tx = self.conn.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT content_hash FROM raw_documents WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(hash) if hash == content_hash => UpsertOutcome::Unchanged,
            Some(_) => {
                tx.execute(
                    "UPDATE raw_documents SET external_id = ?2, url = ?3, title = ?4,
                     published_at = ?5, fetched_at = ?6, raw_text = ?7, content_hash = ?8
                     WHERE document_id = ?1",
                    params![
                        document_id,
                        doc.external_id,
                        doc.url,
                        doc.title,
                        published_at,
                        fetched_at,
                        doc.raw_text,
                        content_hash
                    ],
                )?;
                UpsertOutcome::Updated
            }
            None => {
                tx.execute(
                    "INSERT INTO raw_documents (document_id, source_id, natural_key, external_id,
                     url, title, published_at, fetched_at, raw_text, content_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        document_id,
                        doc.source_id.as_str(),
                        natural_key,
                        doc.external_id,
                        doc.url,
                        doc.title,
                        published_at,
                        fetched_at,
                        doc.raw_text,
                        content_hash
                    ],
                )?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn upsert_processed(&mut self, doc: &ProcessedDocument) -> StorageResult<()> {
        let entities = serde_json::to_string(&doc.extracted_entities)?;
        let enrichment = doc
            .enrichment
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let tx = self.conn.transaction()?;
        let raw_exists = tx
            .query_row(
                "SELECT 1 FROM raw_documents WHERE document_id = ?1",
                params![doc.document_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !raw_exists {
            return Err(StorageError::NotFound(doc.document_id.clone()));
        }

        tx.execute(
            "INSERT INTO processed_documents (document_id, source_id, title, cleaned_text,
             category, entities, quality_score, word_count, processed_at, enrichment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(document_id) DO UPDATE SET
                source_id = excluded.source_id,
                title = excluded.title,
                cleaned_text = excluded.cleaned_text,
                category = excluded.category,
                entities = excluded.entities,
                quality_score = excluded.quality_score,
                word_count = excluded.word_count,
                processed_at = excluded.processed_at,
                enrichment = excluded.enrichment",
            params![
                doc.document_id,
                doc.source_id.as_str(),
                doc.title,
                doc.cleaned_text,
                doc.category.as_str(),
                entities,
                doc.quality_score,
                doc.word_count as i64,
                db_time(&doc.processed_at),
                enrichment
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_raw(&self, document_id: &str) -> StorageResult<Option<RawDocument>> {
        let sql = format!(
            "SELECT {} FROM raw_documents WHERE document_id = ?1",
            RAW_COLUMNS
        );
        let doc = self
            .conn
            .query_row(&sql, params![document_id], raw_from_row)
            .optional()?;
        Ok(doc)
    }

    fn get_processed(&self, document_id: &str) -> StorageResult<Option<ProcessedDocument>> {
        let sql = format!(
            "SELECT {} FROM processed_documents WHERE document_id = ?1",
            PROCESSED_COLUMNS
        );
        let doc = self
            .conn
            .query_row(&sql, params![document_id], processed_from_row)
            .optional()?;
        Ok(doc)
    }

    fn list_raw(&self, source_id: Option<SourceId>) -> StorageResult<Vec<RawDocument>> {
        let sql = format!(
            "SELECT {} FROM raw_documents
             WHERE ?1 IS NULL OR source_id = ?1
             ORDER BY fetched_at, document_id",
            RAW_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let docs = stmt
            .query_map(params![source_id.map(|s| s.as_str())], raw_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    fn query(&self, filter: &DocumentFilter) -> StorageResult<Vec<ProcessedDocument>> {
        let mut sql = format!(
            "SELECT {} FROM processed_documents WHERE 1 = 1",
            PROCESSED_COLUMNS
        );
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(source_id) = filter.source_id {
            sql.push_str(" AND source_id = ?");
            values.push(Box::new(source_id.as_str()));
        }
        if let Some(category) = filter.category {
            sql.push_str(" AND category = ?");
            values.push(Box::new(category.as_str()));
        }
        if let Some(min_quality) = filter.min_quality {
            sql.push_str(" AND quality_score >= ?");
            values.push(Box::new(min_quality));
        }
        if let Some(since) = filter.processed_since {
            sql.push_str(" AND processed_at >= ?");
            values.push(Box::new(db_time(&since)));
        }
        if let Some(text) = filter.text.as_deref().filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(text.trim());
            sql.push_str(" AND (title LIKE ? ESCAPE '\\' OR cleaned_text LIKE ? ESCAPE '\\')");
            values.push(Box::new(pattern.clone()));
            values.push(Box::new(pattern));
        }
        sql.push_str(" ORDER BY quality_score DESC, processed_at DESC, document_id");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let docs = stmt
            .query_map(params_from_iter(values.iter()), processed_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let cutoff = db_time(&cutoff);

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM processed_documents WHERE document_id IN
             (SELECT document_id FROM raw_documents WHERE fetched_at < ?1)",
            params![cutoff],
        )?;
        let deleted = tx.execute(
            "DELETE FROM raw_documents WHERE fetched_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        Ok(deleted as u64)
    }

    // ===== Runs and cycles =====

    fn append_run(&mut self, run: &RunRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO runs (run_id, cycle_id, source_id, started_at, ended_at,
             attempted_count, succeeded_count, failed_count, error_summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.run_id,
                run.cycle_id,
                run.source_id.as_str(),
                db_time(&run.started_at),
                db_time(&run.ended_at),
                run.attempted_count,
                run.succeeded_count,
                run.failed_count,
                run.error_summary
            ],
        )?;
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs ORDER BY ended_at DESC, run_id LIMIT ?1",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn runs_for_cycle(&self, cycle_id: i64) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE cycle_id = ?1 ORDER BY source_id",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![cycle_id], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn is_slot_completed(&self, slot: &str) -> StorageResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cycles WHERE slot = ?1 AND status IN (?2, ?3)",
            params![
                slot,
                CycleStatus::Succeeded.to_db_string(),
                CycleStatus::Breached.to_db_string()
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn begin_cycle(
        &mut self,
        slot: &str,
        attempt: u32,
        config_hash: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO cycles (slot, attempt, status, config_hash, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                slot,
                attempt,
                CycleStatus::Running.to_db_string(),
                config_hash,
                db_time(&started_at)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_cycle(
        &mut self,
        cycle_id: i64,
        status: CycleStatus,
        ended_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE cycles SET status = ?1, ended_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), db_time(&ended_at), cycle_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("cycle {}", cycle_id)));
        }
        Ok(())
    }

    fn latest_cycle(&self) -> StorageResult<Option<CycleRecord>> {
        let sql = format!("SELECT {} FROM cycles ORDER BY id DESC LIMIT 1", CYCLE_COLUMNS);
        let cycle = self.conn.query_row(&sql, [], cycle_from_row).optional()?;
        Ok(cycle)
    }

    fn mark_interrupted_cycles(&mut self, ended_at: DateTime<Utc>) -> StorageResult<u64> {
        let updated = self.conn.execute(
            "UPDATE cycles SET status = ?1, ended_at = ?2 WHERE status = ?3",
            params![
                CycleStatus::Failed.to_db_string(),
                db_time(&ended_at),
                CycleStatus::Running.to_db_string()
            ],
        )?;
        Ok(updated as u64)
    }

    // ===== Schedule state =====

    fn load_schedule_state(&self) -> StorageResult<ScheduleState> {
        let row = self
            .conn
            .query_row(
                "SELECT last_run_at, consecutive_failure_count FROM schedule_state WHERE id = 1",
                [],
                |row| Ok((parse_opt_time(0, row.get(0)?)?, row.get::<_, u32>(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((last_run_at, failures)) => ScheduleState::restored(last_run_at, failures),
            None => ScheduleState::default(),
        })
    }

    fn save_schedule_state(&mut self, state: &ScheduleState) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO schedule_state (id, last_run_at, consecutive_failure_count)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                last_run_at = excluded.last_run_at,
                consecutive_failure_count = excluded.consecutive_failure_count",
            params![
                state.last_run_at.as_ref().map(db_time),
                state.consecutive_failure_count
            ],
        )?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_raw(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM raw_documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_processed(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM processed_documents", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn count_by_source(&self) -> StorageResult<Vec<(SourceId, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, COUNT(*) FROM raw_documents GROUP BY source_id ORDER BY source_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (source, count) = row?;
            if let Some(source_id) = SourceId::from_db_string(&source) {
                counts.push((source_id, count as u64));
            }
        }
        Ok(counts)
    }

    fn count_by_category(&self) -> StorageResult<Vec<(Category, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM processed_documents
             GROUP BY category ORDER BY COUNT(*) DESC, category",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (category, count) = row?;
            if let Some(category) = Category::from_db_string(&category) {
                counts.push((category, count as u64));
            }
        }
        Ok(counts)
    }

    fn average_quality(&self) -> StorageResult<Option<f64>> {
        let avg: Option<f64> = self.conn.query_row(
            "SELECT AVG(quality_score) FROM processed_documents",
            [],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    fn count_fetched_since(&self, since: DateTime<Utc>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM raw_documents WHERE fetched_at >= ?1",
            params![db_time(&since)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Maintenance =====

    fn backup_to(&self, path: &Path) -> StorageResult<()> {
        let target = path.to_string_lossy().to_string();
        self.conn.execute("VACUUM INTO ?1", params![target])?;
        Ok(())
    }
}

/// `%text%` with LIKE wildcards in `text` matched literally
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Juris-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Harvest cycles, one row per attempt
CREATE TABLE IF NOT EXISTS cycles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slot TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    status TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_cycles_slot ON cycles(slot, status);

-- Append-only audit of each adapter invocation
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    cycle_id INTEGER REFERENCES cycles(id),
    source_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT NOT NULL,
    attempted_count INTEGER NOT NULL,
    succeeded_count INTEGER NOT NULL,
    failed_count INTEGER NOT NULL,
    error_summary TEXT,
    CHECK (succeeded_count + failed_count = attempted_count)
);

CREATE INDEX IF NOT EXISTS idx_runs_cycle ON runs(cycle_id);
CREATE INDEX IF NOT EXISTS idx_runs_ended ON runs(ended_at);

-- Documents as fetched
CREATE TABLE IF NOT EXISTS raw_documents (
    document_id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    natural_key TEXT NOT NULL,
    external_id TEXT,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    published_at TEXT,
    fetched_at TEXT NOT NULL,
    raw_text TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    UNIQUE(source_id, natural_key)
);

CREATE INDEX IF NOT EXISTS idx_raw_fetched ON raw_documents(fetched_at);

-- One processed row per raw document, overwritten on reprocessing
CREATE TABLE IF NOT EXISTS processed_documents (
    document_id TEXT PRIMARY KEY REFERENCES raw_documents(document_id) ON DELETE CASCADE,
    source_id TEXT NOT NULL,
    title TEXT NOT NULL,
    cleaned_text TEXT NOT NULL,
    category TEXT NOT NULL,
    entities TEXT NOT NULL,
    quality_score REAL NOT NULL CHECK (quality_score >= 0.0 AND quality_score <= 1.0),
    word_count INTEGER NOT NULL,
    processed_at TEXT NOT NULL,
    enrichment TEXT
);

CREATE INDEX IF NOT EXISTS idx_processed_category ON processed_documents(category);
CREATE INDEX IF NOT EXISTS idx_processed_quality ON processed_documents(quality_score);

-- Scheduler fields needed to resume after restart
CREATE TABLE IF NOT EXISTS schedule_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_run_at TEXT,
    consecutive_failure_count INTEGER NOT NULL DEFAULT 0
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

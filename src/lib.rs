//! Juris-Harvest: a scheduled harvester for public legal publications
//!
//! This crate fetches decisions and legal news from a fixed set of sources,
//! cleans and classifies the harvested text, scores it for quality, and
//! persists it idempotently for training-data export and lookup.

pub mod config;
pub mod fetch;
pub mod output;
pub mod processor;
pub mod robots;
pub mod scheduler;
pub mod sources;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Juris-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Cycle error: {0}")]
    Cycle(#[from] CycleError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Errors produced by the fetch engine
///
/// Only `Timeout`, `Unavailable` and `NetworkError` are transient; the
/// engine retries those and surfaces everything else immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("{url} rejected the request with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("{url} unavailable (HTTP {status})")]
    Unavailable { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    NetworkError { url: String, message: String },

    #[error("Anti-bot page served for {url} ({signature})")]
    Blocked { url: String, signature: String },

    #[error("URL disallowed by robots.txt: {url}")]
    Disallowed { url: String },

    #[error("Too many redirects from {url}")]
    RedirectLimit { url: String },

    #[error("Redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("Fetch of {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    /// Returns true if the failure may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unavailable { .. } | Self::NetworkError { .. }
        )
    }

    /// Short classification label used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } => "unavailable",
            Self::NetworkError { .. } => "network",
            Self::Blocked { .. } => "blocked",
            Self::Disallowed { .. } => "disallowed",
            Self::RedirectLimit { .. } | Self::RedirectLoop { .. } => "redirect",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Errors produced by source adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to parse {url}: {reason}")]
    ParseFailure { url: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl AdapterError {
    /// Short classification label used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::ParseFailure { .. } => "parse",
            Self::InvalidUrl(_) => "url",
        }
    }
}

/// Errors produced by the document processor
///
/// Only malformed or empty input is an error; unmatched rules never are.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    #[error("Document {document_id} has no usable text")]
    EmptyInput { document_id: String },

    #[error("Document {document_id} is malformed: {reason}")]
    Malformed { document_id: String, reason: String },
}

/// Errors that end or reject a harvest cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("A harvest cycle is already running")]
    AlreadyRunning,

    #[error("Slot {slot} already has a completed cycle")]
    SlotAlreadyCompleted { slot: String },

    #[error("Cycle did not complete: {0}")]
    Incomplete(String),

    #[error("Storage failure during cycle: {0}")]
    Store(#[from] storage::StorageError),

    #[error("Cycle cancelled")]
    Cancelled,

    #[error("Cycle failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Result type alias for Juris-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{FetchEngine, FetchOptions};
pub use processor::Processor;
pub use scheduler::{Orchestrator, SchedulerHandle};
pub use sources::{DocumentRef, RawDocument, SourceAdapter, SourceId};
pub use state::{CyclePhase, ScheduleState};
pub use storage::{ProcessedDocument, RunRecord, SqliteStorage, Storage};

//! Source adapters
//!
//! Each publication site is one [`SourceAdapter`]: it knows where the
//! listing pages live, which links on them are documents, and how to lift
//! the document text out of a detail page. Everything site-specific stays
//! here; the processor only ever sees [`RawDocument`]s.

mod conjur;
mod dates;
mod html;
mod listing;
mod migalhas;
mod stf;
mod stj;

pub use conjur::ConjurAdapter;
pub use dates::extract_date;
pub use html::{element_text, DetailLayout};
pub use listing::DocumentListing;
pub use migalhas::MigalhasAdapter;
pub use stf::StfAdapter;
pub use stj::StjAdapter;

use crate::config::SourceConfig;
use crate::fetch::{FetchEngine, FetchOptions};
use crate::url::normalize_url;
use crate::AdapterError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// The fixed set of harvested publications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Supremo Tribunal Federal
    Stf,
    /// Superior Tribunal de Justiça
    Stj,
    /// Consultor Jurídico
    Conjur,
    Migalhas,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [Self::Stf, Self::Stj, Self::Conjur, Self::Migalhas];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stf => "stf",
            Self::Stj => "stj",
            Self::Conjur => "conjur",
            Self::Migalhas => "migalhas",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == s)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Stf => "STF - Supremo Tribunal Federal",
            Self::Stj => "STJ - Superior Tribunal de Justiça",
            Self::Conjur => "Consultor Jurídico",
            Self::Migalhas => "Migalhas",
        }
    }

    /// Court portals publish decisions; the others publish news
    pub fn is_court(&self) -> bool {
        matches!(self, Self::Stf | Self::Stj)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pointer to one document found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub source_id: SourceId,
    pub url: Url,
    pub external_id: Option<String>,
    /// Link text from the listing
    pub title_hint: Option<String>,
    /// Date printed next to the link, if any
    pub published_hint: Option<NaiveDate>,
}

impl DocumentRef {
    pub fn natural_key(&self) -> String {
        natural_key(self.external_id.as_deref(), self.url.as_str())
    }
}

/// One entry on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    Valid(DocumentRef),
    /// Looked like a document link but could not be turned into one
    Malformed(String),
}

/// A fetched document in canonical form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDocument {
    pub source_id: SourceId,
    pub external_id: Option<String>,
    pub url: String,
    pub title: String,
    pub published_at: Option<NaiveDate>,
    pub fetched_at: DateTime<Utc>,
    pub raw_text: String,
}

impl RawDocument {
    /// The dedup key within a source
    pub fn natural_key(&self) -> String {
        natural_key(self.external_id.as_deref(), &self.url)
    }

    /// Stable id shared by the raw row and its processed row
    pub fn document_id(&self) -> String {
        document_id(self.source_id, &self.natural_key())
    }

    /// SHA-256 of the raw text, hex encoded
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.raw_text.as_bytes()))
    }
}

/// External id when the site provides one, otherwise the normalized URL
pub fn natural_key(external_id: Option<&str>, url: &str) -> String {
    match external_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => normalize_url(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.trim().to_string()),
    }
}

/// `sha256("<source>:<natural key>")`, hex encoded
pub fn document_id(source_id: SourceId, natural_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(natural_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Site-specific harvesting strategy
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    fn base_url(&self) -> &Url;

    /// URL of the zero-based listing page
    fn listing_url(&self, page: u32) -> Url;

    /// Extracts document links from a listing page
    fn parse_listing(&self, html: &str, page_url: &Url) -> Vec<ListingEntry>;

    /// Maps a detail page to the canonical document shape
    fn parse_detail(
        &self,
        doc: &DocumentRef,
        html: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<RawDocument, AdapterError>;

    /// Fetches and parses one document
    async fn fetch_detail(
        &self,
        engine: &FetchEngine,
        options: &FetchOptions,
        doc: &DocumentRef,
    ) -> Result<RawDocument, AdapterError> {
        let body = engine.fetch(&doc.url, options).await?;
        self.parse_detail(doc, &body.text, Utc::now())
    }
}

/// Starts a lazy listing of documents published on or after `since`
pub fn list_documents(
    adapter: Arc<dyn SourceAdapter>,
    engine: Arc<FetchEngine>,
    options: FetchOptions,
    since: Option<NaiveDate>,
    limit: usize,
    max_pages: u32,
) -> DocumentListing {
    DocumentListing::new(adapter, engine, options, since, limit, max_pages)
}

/// Builds the adapter for a configured source
pub fn build_adapter(config: &SourceConfig) -> Result<Arc<dyn SourceAdapter>, AdapterError> {
    let base = config.base_url.as_deref();
    let adapter: Arc<dyn SourceAdapter> = match config.id {
        SourceId::Stf => Arc::new(StfAdapter::new(base)?),
        SourceId::Stj => Arc::new(StjAdapter::new(base)?),
        SourceId::Conjur => Arc::new(ConjurAdapter::new(base)?),
        SourceId::Migalhas => Arc::new(MigalhasAdapter::new(base)?),
    };
    Ok(adapter)
}

pub(crate) fn parse_base_url(base: Option<&str>, default: &str) -> Result<Url, AdapterError> {
    let raw = base.unwrap_or(default);
    Url::parse(raw).map_err(|e| AdapterError::InvalidUrl(format!("{}: {}", raw, e)))
}

/// Joins a site path onto a base URL that may itself carry a path prefix
pub(crate) fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let prefix = base.path().trim_end_matches('/');
    url.set_path(&format!("{}{}", prefix, path));
    url.set_query(None);
    url
}

use crate::fetch::{FetchEngine, FetchOptions};
use crate::sources::{DocumentRef, ListingEntry, SourceAdapter};
use crate::FetchError;
use chrono::NaiveDate;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lazy, restartable sequence of document references
///
/// Listing pages are fetched one at a time, only when the buffered
/// references run out. The sequence ends at `limit` references, after
/// `max_pages` pages, at the first page without new links, or at the first
/// listing page that cannot be fetched.
pub struct DocumentListing {
    adapter: Arc<dyn SourceAdapter>,
    engine: Arc<FetchEngine>,
    options: FetchOptions,
    since: Option<NaiveDate>,
    limit: usize,
    max_pages: u32,

    next_page: u32,
    buffer: VecDeque<DocumentRef>,
    seen: HashSet<String>,
    yielded: usize,
    malformed: Vec<String>,
    page_errors: Vec<FetchError>,
    exhausted: bool,
}

impl DocumentListing {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        engine: Arc<FetchEngine>,
        options: FetchOptions,
        since: Option<NaiveDate>,
        limit: usize,
        max_pages: u32,
    ) -> Self {
        Self {
            adapter,
            engine,
            options,
            since,
            limit,
            max_pages,
            next_page: 0,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            yielded: 0,
            malformed: Vec::new(),
            page_errors: Vec::new(),
            exhausted: false,
        }
    }

    /// Returns the next reference, fetching another listing page if needed
    pub async fn next(&mut self) -> Option<DocumentRef> {
        loop {
            if self.yielded >= self.limit {
                return None;
            }
            if let Some(doc) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(doc);
            }
            if self.exhausted || self.next_page >= self.max_pages {
                return None;
            }
            self.load_page().await;
        }
    }

    /// Drains the remaining references
    pub async fn collect_all(&mut self) -> Vec<DocumentRef> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await {
            docs.push(doc);
        }
        docs
    }

    /// Rewinds to the first listing page and clears all counters
    pub fn restart(&mut self) {
        self.next_page = 0;
        self.buffer.clear();
        self.seen.clear();
        self.yielded = 0;
        self.malformed.clear();
        self.page_errors.clear();
        self.exhausted = false;
    }

    /// Entries skipped because they could not be parsed
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }

    pub fn malformed_entries(&self) -> &[String] {
        &self.malformed
    }

    /// Listing pages that could not be fetched
    pub fn page_errors(&self) -> &[FetchError] {
        &self.page_errors
    }

    pub fn pages_loaded(&self) -> u32 {
        self.next_page
    }

    async fn load_page(&mut self) {
        let page = self.next_page;
        self.next_page += 1;
        let url = self.adapter.listing_url(page);
        let source = self.adapter.id();

        let body = match self.engine.fetch(&url, &self.options).await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %source, url = %url, "Listing page failed: {}", e);
                self.page_errors.push(e);
                self.exhausted = true;
                return;
            }
        };

        let mut fresh = 0;
        for entry in self.adapter.parse_listing(&body.text, &body.url) {
            match entry {
                ListingEntry::Valid(doc) => {
                    if let (Some(since), Some(published)) = (self.since, doc.published_hint) {
                        if published < since {
                            continue;
                        }
                    }
                    if self.seen.insert(doc.natural_key()) {
                        self.buffer.push_back(doc);
                        fresh += 1;
                    }
                }
                ListingEntry::Malformed(reason) => {
                    warn!(source = %source, url = %url, "Skipping listing entry: {}", reason);
                    self.malformed.push(reason);
                }
            }
        }

        debug!(source = %source, page, fresh, "Listing page parsed");
        if fresh == 0 {
            self.exhausted = true;
        }
    }
}

//! Consultor Jurídico legal news
//!
//! Articles carry no numeric id, so the normalized URL is the natural key.

use crate::sources::html::{parse_detail_page, parse_listing_links, DetailLayout};
use crate::sources::{join_path, parse_base_url, DocumentRef, ListingEntry, RawDocument};
use crate::sources::{SourceAdapter, SourceId};
use crate::AdapterError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.conjur.com.br";

// Article paths start with the publication date, e.g. /2024-mar-05/
static DOCUMENT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d{4}-\w+-\d{2}").unwrap());

const LAYOUT: DetailLayout = DetailLayout {
    content_selectors: &[
        ".article-content",
        ".post-content",
        ".entry-content",
        ".content",
        "article",
    ],
    fallback_selectors: &[],
    title_selectors: &["h1", ".title", ".headline"],
    date_selectors: &["time", "[class*=date]", "[class*=time]"],
    default_title: "Notícia ConJur",
    min_content_chars: 200,
};

pub struct ConjurAdapter {
    base_url: Url,
}

impl ConjurAdapter {
    pub fn new(base_url: Option<&str>) -> Result<Self, AdapterError> {
        Ok(Self {
            base_url: parse_base_url(base_url, DEFAULT_BASE_URL)?,
        })
    }
}

impl SourceAdapter for ConjurAdapter {
    fn id(&self) -> SourceId {
        SourceId::Conjur
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn listing_url(&self, page: u32) -> Url {
        if page == 0 {
            join_path(&self.base_url, "/")
        } else {
            join_path(&self.base_url, &format!("/ultimas-noticias/page/{}/", page + 1))
        }
    }

    fn parse_listing(&self, html: &str, page_url: &Url) -> Vec<ListingEntry> {
        parse_listing_links(html, page_url, SourceId::Conjur, &DOCUMENT_LINK, None)
    }

    fn parse_detail(
        &self,
        doc: &DocumentRef,
        html: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<RawDocument, AdapterError> {
        parse_detail_page(&LAYOUT, doc, html, fetched_at)
    }
}

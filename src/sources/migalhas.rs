//! Migalhas legal news

use crate::sources::html::{parse_detail_page, parse_listing_links, DetailLayout};
use crate::sources::{join_path, parse_base_url, DocumentRef, ListingEntry, RawDocument};
use crate::sources::{SourceAdapter, SourceId};
use crate::AdapterError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.migalhas.com.br";
const LISTING_PATH: &str = "/quentes";

static DOCUMENT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/quentes/\d+|/depeso/\d+|/noticia|/artigo").unwrap());

static EXTERNAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:quentes|depeso|noticia|artigo)/(\d+)").unwrap());

const LAYOUT: DetailLayout = DetailLayout {
    content_selectors: &[
        ".article-body",
        ".content-text",
        ".post-content",
        ".entry-content",
        "article",
    ],
    fallback_selectors: &[],
    title_selectors: &["h1", ".title", ".headline"],
    date_selectors: &["time", ".date", ".data"],
    default_title: "Notícia Migalhas",
    min_content_chars: 200,
};

pub struct MigalhasAdapter {
    base_url: Url,
}

impl MigalhasAdapter {
    pub fn new(base_url: Option<&str>) -> Result<Self, AdapterError> {
        Ok(Self {
            base_url: parse_base_url(base_url, DEFAULT_BASE_URL)?,
        })
    }
}

impl SourceAdapter for MigalhasAdapter {
    fn id(&self) -> SourceId {
        SourceId::Migalhas
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn listing_url(&self, page: u32) -> Url {
        let mut url = join_path(&self.base_url, LISTING_PATH);
        if page > 0 {
            url.query_pairs_mut()
                .append_pair("pagina", &(page + 1).to_string());
        }
        url
    }

    fn parse_listing(&self, html: &str, page_url: &Url) -> Vec<ListingEntry> {
        parse_listing_links(
            html,
            page_url,
            SourceId::Migalhas,
            &DOCUMENT_LINK,
            Some(&EXTERNAL_ID),
        )
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

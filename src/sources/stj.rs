//! Superior Tribunal de Justiça decisions

use crate::sources::html::{parse_detail_page, parse_listing_links, DetailLayout};
use crate::sources::{join_path, parse_base_url, DocumentRef, ListingEntry, RawDocument};
use crate::sources::{SourceAdapter, SourceId};
use crate::AdapterError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.stj.jus.br";
const LISTING_PATH: &str = "/sites/portalp/Jurisprudencia";

static DOCUMENT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"acordao|decisao|jurisprudencia/").unwrap());

static EXTERNAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&](?:documento|seq|id)=(\d+)").unwrap());

const LAYOUT: DetailLayout = DetailLayout {
    content_selectors: &[
        ".jurisprudencia-content",
        ".acordao-text",
        ".decision-text",
        ".content-main",
        "#main-content",
    ],
    fallback_selectors: &["main", "body"],
    title_selectors: &["h1", "h2", ".title"],
    date_selectors: &[".data-julgamento", ".date", "time"],
    default_title: "Decisão STJ",
    min_content_chars: 100,
};

pub struct StjAdapter {
    base_url: Url,
}

impl StjAdapter {
    pub fn new(base_url: Option<&str>) -> Result<Self, AdapterError> {
        Ok(Self {
            base_url: parse_base_url(base_url, DEFAULT_BASE_URL)?,
        })
    }
}

impl SourceAdapter for StjAdapter {
    fn id(&self) -> SourceId {
        SourceId::Stj
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn listing_url(&self, page: u32) -> Url {
        let mut url = join_path(&self.base_url, LISTING_PATH);
        if page > 0 {
            url.query_pairs_mut()
                .append_pair("page", &(page + 1).to_string());
        }
        url
    }

    fn parse_listing(&self, html: &str, page_url: &Url) -> Vec<ListingEntry> {
        parse_listing_links(html, page_url, SourceId::Stj, &DOCUMENT_LINK, Some(&EXTERNAL_ID))
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

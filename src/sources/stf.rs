//! Supremo Tribunal Federal decisions

use crate::sources::html::{parse_detail_page, parse_listing_links, DetailLayout};
use crate::sources::{join_path, parse_base_url, DocumentRef, ListingEntry, RawDocument};
use crate::sources::{SourceAdapter, SourceId};
use crate::AdapterError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://portal.stf.jus.br";
const LISTING_PATH: &str = "/jurisprudencia/";

static DOCUMENT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"decision|acordao|sentenca|incidente=").unwrap());

static EXTERNAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&](?:incidente|docID|id)=(\d+)").unwrap());

const LAYOUT: DetailLayout = DetailLayout {
    content_selectors: &[
        ".decision-content",
        ".acordao-text",
        ".content-text",
        ".main-content",
        "#content",
        "main",
    ],
    fallback_selectors: &["body"],
    title_selectors: &["h1", "h2", "title"],
    date_selectors: &[".data-julgamento", ".data-publicacao", "time"],
    default_title: "Decisão STF",
    min_content_chars: 100,
};

pub struct StfAdapter {
    base_url: Url,
}

impl StfAdapter {
    pub fn new(base_url: Option<&str>) -> Result<Self, AdapterError> {
        Ok(Self {
            base_url: parse_base_url(base_url, DEFAULT_BASE_URL)?,
        })
    }
}

impl SourceAdapter for StfAdapter {
    fn id(&self) -> SourceId {
        SourceId::Stf
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
        parse_listing_links(html, page_url, SourceId::Stf, &DOCUMENT_LINK, Some(&EXTERNAL_ID))
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_listing_urls() {
        let adapter = StfAdapter::new(None).unwrap();
        assert_eq!(
            adapter.listing_url(0).as_str(),
            "https://portal.stf.jus.br/jurisprudencia/"
        );
        assert_eq!(
            adapter.listing_url(2).as_str(),
            "https://portal.stf.jus.br/jurisprudencia/?pagina=3"
        );
    }

    #[test]
    fn test_listing_extracts_incidente_ids() {
        let adapter = StfAdapter::new(None).unwrap();
        let html = r#"<div class="resultados">
            <a href="/processos/detalhe.asp?incidente=6543210">RE 1.234.567</a>
            <a href="/jurisprudencia/acordao/abc">Acórdão sem número</a>
            <a href="/sobre">Institucional</a></div>"#;
        let page = adapter.listing_url(0);

        let entries = adapter.parse_listing(html, &page);
        assert_eq!(entries.len(), 2);
        let ListingEntry::Valid(first) = &entries[0] else {
            panic!("expected valid entry");
        };
        assert_eq!(first.external_id.as_deref(), Some("6543210"));
        let ListingEntry::Valid(second) = &entries[1] else {
            panic!("expected valid entry");
        };
        assert!(second.external_id.is_none());
    }

    #[test]
    fn test_detail_uses_decision_content() {
        let adapter = StfAdapter::new(None).unwrap();
        let doc = DocumentRef {
            source_id: SourceId::Stf,
            url: Url::parse("https://portal.stf.jus.br/processos/detalhe.asp?incidente=1").unwrap(),
            external_id: Some("1".to_string()),
            title_hint: None,
            published_hint: None,
        };
        let body = "O Tribunal, por unanimidade, negou provimento ao recurso extraordinário, \
                    nos termos do voto do Relator. Brasília, 12 de abril de 2023.";
        let html = format!(
            r#"<html><body><header>Portal STF</header><h1>RE 1.234.567</h1>
               <div class="decision-content">{}</div></body></html>"#,
            body
        );

        let raw = adapter.parse_detail(&doc, &html, Utc::now()).unwrap();
        assert_eq!(raw.title, "RE 1.234.567");
        assert_eq!(raw.raw_text, body.split_whitespace().collect::<Vec<_>>().join(" "));
        assert_eq!(raw.published_at, NaiveDate::from_ymd_opt(2023, 4, 12));
    }
}

//! HTML helpers shared by the adapters

use crate::sources::dates::extract_date;
use crate::sources::{DocumentRef, ListingEntry, RawDocument, SourceId};
use crate::url::resolve_link;
use crate::AdapterError;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Elements whose text is never document content
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe",
    "template",
];

/// Where a site keeps the parts of a detail page
#[derive(Debug, Clone, Copy)]
pub struct DetailLayout {
    /// Tried in order; the first with text wins
    pub content_selectors: &'static [&'static str],
    /// Tried when no content selector matches
    pub fallback_selectors: &'static [&'static str],
    pub title_selectors: &'static [&'static str],
    pub date_selectors: &'static [&'static str],
    pub default_title: &'static str,
    /// Shorter content is a parse failure
    pub min_content_chars: usize,
}

/// Visible text of an element, whitespace collapsed
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(&**text);
                out.push(' ');
            }
            Node::Element(el) if !SKIPPED_ELEMENTS.contains(&el.name()) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

/// First element matching the selector cascade that has visible text
pub fn select_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        document
            .select(&selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

fn select_date(document: &Html, selectors: &[&str]) -> Option<NaiveDate> {
    selectors.iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        document.select(&selector).find_map(|el| {
            el.value()
                .attr("datetime")
                .and_then(extract_date)
                .or_else(|| extract_date(&element_text(el)))
        })
    })
}

/// Collects document links from a listing page
///
/// Every `<a>` whose `href` matches `document_link` is an entry. An entry
/// whose `href` cannot be resolved into an HTTP(S) URL is malformed.
pub fn parse_listing_links(
    html: &str,
    page_url: &Url,
    source_id: SourceId,
    document_link: &Regex,
    external_id: Option<&Regex>,
) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a") else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !document_link.is_match(href) {
            continue;
        }

        let Some(url) = resolve_link(page_url, href) else {
            entries.push(ListingEntry::Malformed(format!("unresolvable link '{}'", href)));
            continue;
        };

        let id = external_id
            .and_then(|re| re.captures(url.as_str()))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        let title_hint = Some(element_text(anchor)).filter(|t| !t.is_empty());

        let published_hint = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| extract_date(&element_text(parent)));

        entries.push(ListingEntry::Valid(DocumentRef {
            source_id,
            url,
            external_id: id,
            title_hint,
            published_hint,
        }));
    }

    entries
}

/// Maps a detail page to a [`RawDocument`] following `layout`
pub fn parse_detail_page(
    layout: &DetailLayout,
    doc: &DocumentRef,
    html: &str,
    fetched_at: DateTime<Utc>,
) -> Result<RawDocument, AdapterError> {
    let document = Html::parse_document(html);

    let content = select_text(&document, layout.content_selectors)
        .or_else(|| select_text(&document, layout.fallback_selectors))
        .ok_or_else(|| AdapterError::ParseFailure {
            url: doc.url.to_string(),
            reason: "no content element found".to_string(),
        })?;

    let length = content.chars().count();
    if length < layout.min_content_chars {
        return Err(AdapterError::ParseFailure {
            url: doc.url.to_string(),
            reason: format!(
                "content too short ({} chars, need {})",
                length, layout.min_content_chars
            ),
        });
    }

    let title = select_text(&document, layout.title_selectors)
        .or_else(|| doc.title_hint.clone())
        .unwrap_or_else(|| layout.default_title.to_string());

    let published_at = select_date(&document, layout.date_selectors)
        .or(doc.published_hint)
        .or_else(|| extract_date(&content));

    Ok(RawDocument {
        source_id: doc.source_id,
        external_id: doc.external_id.clone(),
        url: doc.url.to_string(),
        title,
        published_at,
        fetched_at,
        raw_text: content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: DetailLayout = DetailLayout {
        content_selectors: &[".article-body", "article"],
        fallback_selectors: &["body"],
        title_selectors: &["h1", "title"],
        date_selectors: &["time", ".date"],
        default_title: "Sem título",
        min_content_chars: 20,
    };

    fn doc_ref() -> DocumentRef {
        DocumentRef {
            source_id: SourceId::Migalhas,
            url: Url::parse("https://www.migalhas.com.br/quentes/401234/tema").unwrap(),
            external_id: Some("401234".to_string()),
            title_hint: Some("Link text".to_string()),
            published_hint: None,
        }
    }

    #[test]
    fn test_element_text_skips_scripts_and_navigation() {
        let html = Html::parse_fragment(
            "<div><nav>Menu</nav><p>Texto  do\n acórdão</p><script>var x;</script><p>fim</p></div>",
        );
        let selector = Selector::parse("div").unwrap();
        let div = html.select(&selector).next().unwrap();
        assert_eq!(element_text(div), "Texto do acórdão fim");
    }

    #[test]
    fn test_parse_listing_valid_and_malformed() {
        let html = r#"
            <ul>
              <li><a href="/quentes/401234/stf-decide">STF decide</a> 05/03/2024</li>
              <li><a href="/quentes/401235/stj-julga">STJ julga</a></li>
              <li><a href="https://exa mple.com/quentes/1/x">quebrado</a></li>
              <li><a href="/sobre">Sobre</a></li>
              <li><a>sem link</a></li>
            </ul>"#;
        let page = Url::parse("https://www.migalhas.com.br/quentes").unwrap();
        let link = Regex::new(r"/quentes/\d+").unwrap();
        let id = Regex::new(r"/quentes/(\d+)").unwrap();

        let entries = parse_listing_links(html, &page, SourceId::Migalhas, &link, Some(&id));
        assert_eq!(entries.len(), 3);

        let ListingEntry::Valid(first) = &entries[0] else {
            panic!("expected a valid entry");
        };
        assert_eq!(first.external_id.as_deref(), Some("401234"));
        assert_eq!(first.title_hint.as_deref(), Some("STF decide"));
        assert_eq!(first.published_hint, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert!(matches!(entries[2], ListingEntry::Malformed(_)));
    }

    #[test]
    fn test_parse_detail_cascade() {
        let html = r#"<html><head><title>Página</title></head><body>
            <h1>Tribunal fixa tese</h1><time datetime="2024-02-10">10 fev</time>
            <div class="article-body"><p>O tribunal fixou tese sobre responsabilidade civil.</p>
            <script>track()</script></div></body></html>"#;

        let raw = parse_detail_page(&LAYOUT, &doc_ref(), html, Utc::now()).unwrap();
        assert_eq!(raw.title, "Tribunal fixa tese");
        assert_eq!(raw.published_at, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(raw.raw_text, "O tribunal fixou tese sobre responsabilidade civil.");
        assert_eq!(raw.external_id.as_deref(), Some("401234"));
    }

    #[test]
    fn test_parse_detail_falls_back_to_body() {
        let html = "<html><body><p>Conteúdo sem marcação específica, mas longo.</p></body></html>";
        let raw = parse_detail_page(&LAYOUT, &doc_ref(), html, Utc::now()).unwrap();
        assert!(raw.raw_text.starts_with("Conteúdo sem marcação"));
        assert_eq!(raw.title, "Link text");
    }

    #[test]
    fn test_parse_detail_too_short() {
        let html = r#"<html><body><div class="article-body">curto</div></body></html>"#;
        let err = parse_detail_page(&LAYOUT, &doc_ref(), html, Utc::now()).unwrap_err();
        assert!(matches!(err, AdapterError::ParseFailure { .. }));
    }
}

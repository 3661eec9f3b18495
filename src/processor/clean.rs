//! Text cleaning and legal formatting normalization

use regex::{Captures, Regex};
use std::sync::LazyLock;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Footer boilerplate; everything from the marker to the end of the text goes
static TRAILING_BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:Documento assinado digitalmente|Este texto não substitui|Publicado no D\.?O\.?U\.?|Fonte:|Atualizado até|Visualização de impressão).*$",
    )
    .unwrap()
});

static REPEATED_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!{2,}|\?{2,}|,{2,}|;{2,}|:{2,}|\.{4,}").unwrap());

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_=*~]{3,}").unwrap());

static ARTICLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bArt\.?\s*(\d+)").unwrap());

static PARAGRAPH_SIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"§\s*(\d+)º?").unwrap());

static LAW_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLei\s+n[º°o.]?\s*(\d+(?:\.\d+)*)\s*[/-]\s*(\d{4})").unwrap()
});

/// Markers of navigation or markup that survived cleaning
static LEFTOVER_ARTIFACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)&[a-z]+;|&#\d+;|[<>{}]|https?://\S+|\bjavascript\b|\bcookies?\b|leia também|clique aqui|compartilh(?:e|ar)\b|\bwhatsapp\b|\bfacebook\b|\btwitter\b",
    )
    .unwrap()
});

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
];

/// Cleans raw document text
///
/// Strips markup and boilerplate, normalizes whitespace, invisible characters
/// and punctuation runs, then rewrites legal references into a single form.
/// The result is deterministic and idempotent.
pub fn clean_text(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let text = HTML_TAG.replace_all(text, " ");
    let text = decode_entities(&text);
    let text = remove_invisible(&text);
    let text = collapse_whitespace(&text);

    let text = TRAILING_BOILERPLATE.replace_all(&text, "");
    let text = SEPARATOR_RUN.replace_all(&text, " ");
    let text = REPEATED_PUNCTUATION.replace_all(&text, |caps: &Captures| {
        let run = &caps[0];
        if run.starts_with('.') {
            "...".to_string()
        } else {
            run[..1].to_string()
        }
    });

    let text = normalize_legal_formatting(&text);
    collapse_whitespace(&text)
}

/// Rewrites article, paragraph and statute references and straightens quotes
pub fn normalize_legal_formatting(text: &str) -> String {
    let text = ARTICLE_REF.replace_all(text, "Artigo $1");
    let text = PARAGRAPH_SIGN.replace_all(&text, "§${1}º");
    let text = LAW_REF.replace_all(&text, "Lei nº $1/$2");

    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' => '\'',
            other => other,
        })
        .collect()
}

/// Counts markup or navigation fragments left in cleaned text
pub fn leftover_artifacts(text: &str) -> usize {
    LEFTOVER_ARTIFACT.find_iter(text).count()
}

fn decode_entities(text: &str) -> String {
    let mut out = text.to_string();
    for (entity, replacement) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

fn remove_invisible(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

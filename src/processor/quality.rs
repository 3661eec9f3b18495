//! Composite quality score
//!
//! Weights: length 0.30, legal density 0.25, artifact absence 0.20,
//! source credibility 0.15, metadata 0.10. An external quality signal, when
//! present, is blended in by the configured weight.

use crate::sources::SourceId;

const LEGAL_TERMS: &[&str] = &[
    "acórdão",
    "sentença",
    "despacho",
    "decisão",
    "recurso",
    "apelação",
    "embargos",
    "habeas corpus",
    "mandado",
    "constitucional",
    "civil",
    "penal",
    "trabalhista",
    "administrativo",
    "tributário",
    "comercial",
    "artigo",
    "lei",
    "decreto",
    "código",
    "jurisprudência",
];

/// Everything the score depends on
#[derive(Debug, Clone)]
pub struct QualityInputs<'a> {
    pub text: &'a str,
    pub title: &'a str,
    pub word_count: usize,
    pub entity_count: usize,
    pub artifact_count: usize,
    pub source_id: SourceId,
    pub url: &'a str,
    pub has_published_date: bool,
}

/// Scores a cleaned document; always within [0, 1]
pub fn quality_score(inputs: &QualityInputs<'_>) -> f64 {
    let score = length_score(inputs.word_count)
        + density_score(inputs)
        + artifact_score(inputs.artifact_count)
        + credibility_score(inputs.source_id, inputs.url)
        + metadata_score(inputs.title, inputs.has_published_date);
    clamp_unit(score)
}

/// Mixes the local score with an external one
///
/// Non-finite external values are ignored.
pub fn blend(local: f64, external: Option<f64>, weight: f64) -> f64 {
    match external {
        Some(q) if q.is_finite() => {
            let w = clamp_unit(weight);
            clamp_unit((1.0 - w) * local + w * clamp_unit(q))
        }
        _ => clamp_unit(local),
    }
}

fn length_score(words: usize) -> f64 {
    match words {
        w if w > 1000 => 0.30,
        w if w > 500 => 0.25,
        w if w > 200 => 0.20,
        w if w > 50 => 0.12,
        0 => 0.0,
        _ => 0.05,
    }
}

fn density_score(inputs: &QualityInputs<'_>) -> f64 {
    let lower = inputs.text.to_lowercase();
    let term_count = LEGAL_TERMS.iter().filter(|t| lower.contains(*t)).count();
    let hits = (term_count + inputs.entity_count) as f64;
    let density = hits / (inputs.word_count as f64 / 100.0).max(1.0);
    (density * 0.05).min(0.25)
}

fn artifact_score(artifacts: usize) -> f64 {
    (0.20 - 0.05 * artifacts as f64).max(0.0)
}

fn credibility_score(source_id: SourceId, url: &str) -> f64 {
    if source_id.is_court() {
        0.15
    } else if url.contains(".jus.br") || url.contains(".gov.br") {
        0.12
    } else {
        0.075
    }
}

fn metadata_score(title: &str, has_date: bool) -> f64 {
    let title_chars = title.trim().chars().count();
    let title_score = match title_chars {
        n if n > 20 => 0.05,
        n if n > 10 => 0.03,
        0 => 0.0,
        _ => 0.01,
    };
    let date_score = if has_date { 0.05 } else { 0.0 };
    title_score + date_score
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

//! Document processing pipeline
//!
//! Turns a [`RawDocument`] into a [`ProcessedDocument`]:
//! - clean markup, boilerplate and formatting
//! - extract statute, article, decision, process-number and court references
//! - classify into an area of law
//! - score quality, optionally blended with an external analysis
//!
//! Processing is a pure function of the raw document, the configuration and
//! the enrichment result passed in. Running the same input twice yields the
//! same output.

mod categorize;
mod clean;
mod enrich;
mod entities;
mod quality;

pub use categorize::{Category, CategoryRules};
pub use clean::{clean_text, leftover_artifacts, normalize_legal_formatting};
pub use enrich::{enrich, Enrichment, EnrichmentError, HttpAnalyzer, TextAnalyzer};
pub use entities::{extract_entities, Entity, EntityKind};
pub use quality::{blend, quality_score, QualityInputs};

use crate::config::{Config, ProcessorConfig};
use crate::sources::RawDocument;
use crate::storage::ProcessedDocument;
use crate::ProcessorError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Applies cleaning, extraction, classification and scoring
#[derive(Debug, Clone)]
pub struct Processor {
    min_words: usize,
    rules: CategoryRules,
    enrichment_weight: f64,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(&ProcessorConfig::default(), 0.5)
    }
}

impl Processor {
    pub fn new(config: &ProcessorConfig, enrichment_weight: f64) -> Self {
        Self {
            min_words: config.min_words,
            rules: CategoryRules::with_overrides(&config.category_rules),
            enrichment_weight,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.processor, config.enrichment.weight)
    }

    /// Cleans the raw text, rejecting documents without enough words
    pub fn clean(&self, raw: &RawDocument) -> Result<String, ProcessorError> {
        let document_id = raw.document_id();

        if raw.url.trim().is_empty() && raw.external_id.is_none() {
            return Err(ProcessorError::Malformed {
                document_id,
                reason: "document has neither an external id nor a URL".to_string(),
            });
        }

        let cleaned = clean_text(&raw.raw_text);
        let words = cleaned.split_whitespace().count();
        if words == 0 || words < self.min_words {
            return Err(ProcessorError::EmptyInput { document_id });
        }
        Ok(cleaned)
    }

    /// Processes one document
    ///
    /// A category suggested by the enrichment is used only when no keyword
    /// rule matched.
    pub fn process(
        &self,
        raw: &RawDocument,
        enrichment: Option<Enrichment>,
        processed_at: DateTime<Utc>,
    ) -> Result<ProcessedDocument, ProcessorError> {
        let cleaned_text = self.clean(raw)?;
        let title = clean_text(&raw.title);
        let word_count = cleaned_text.split_whitespace().count();
        let extracted_entities = extract_entities(&cleaned_text);

        let mut category = self.rules.categorize(&title, &cleaned_text);
        if category == Category::Uncategorized {
            if let Some(suggested) = enrichment
                .as_ref()
                .and_then(|e| e.category.as_deref())
                .and_then(|c| Category::from_db_string(&c.trim().to_lowercase()))
            {
                category = suggested;
            }
        }

        let local_score = quality_score(&QualityInputs {
            text: &cleaned_text,
            title: &title,
            word_count,
            entity_count: extracted_entities.len(),
            artifact_count: leftover_artifacts(&cleaned_text),
            source_id: raw.source_id,
            url: &raw.url,
            has_published_date: raw.published_at.is_some(),
        });
        let quality_score = blend(
            local_score,
            enrichment.as_ref().and_then(|e| e.quality),
            self.enrichment_weight,
        );

        let document_id = raw.document_id();
        debug!(
            document = %document_id,
            category = %category,
            quality = quality_score,
            entities = extracted_entities.len(),
            "Document processed"
        );

        Ok(ProcessedDocument {
            document_id,
            source_id: raw.source_id,
            title,
            cleaned_text,
            category,
            extracted_entities,
            quality_score,
            word_count,
            processed_at,
            enrichment,
        })
    }

    /// Processes one document, consulting the analyzer first when present
    ///
    /// Enrichment failures are logged and the document is processed without
    /// an annotation.
    pub async fn process_enriched(
        &self,
        raw: &RawDocument,
        analyzer: Option<&dyn TextAnalyzer>,
        timeout: Duration,
        processed_at: DateTime<Utc>,
    ) -> Result<ProcessedDocument, ProcessorError> {
        let enrichment = match analyzer {
            Some(analyzer) => {
                let cleaned = self.clean(raw)?;
                enrich(Some(analyzer), &raw.document_id(), &cleaned, timeout).await
            }
            None => None,
        };
        self.process(raw, enrichment, processed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryRuleConfig;
    use crate::sources::SourceId;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn raw(text: &str) -> RawDocument {
        RawDocument {
            source_id: SourceId::Stj,
            external_id: Some("4455".to_string()),
            url: "https://www.stj.jus.br/websecstj/acordao?documento=4455".to_string(),
            title: "REsp  <b>1.234.567</b>".to_string(),
            published_at: NaiveDate::from_ymd_opt(2024, 2, 1),
            fetched_at: Utc::now(),
            raw_text: text.to_string(),
        }
    }

    const DECISION: &str = "<p>A Turma negou provimento ao recurso especial. O contrato de \
        prestação de serviço foi rescindido e os danos, nos termos do Art. 927 do Código Civil \
        e da Lei n 8.078/1990, devem ser reparados pelo fornecedor.</p>";

    struct FixedAnalyzer(Enrichment);

    #[async_trait]
    impl TextAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _text: &str) -> Result<Enrichment, EnrichmentError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_full_pipeline() {
        let processor = Processor::default();
        let doc = processor.process(&raw(DECISION), None, Utc::now()).unwrap();

        assert_eq!(doc.title, "REsp 1.234.567");
        assert!(doc.cleaned_text.contains("Artigo 927"));
        assert!(doc.cleaned_text.contains("Lei nº 8.078/1990"));
        assert_eq!(doc.category, Category::Civil);
        assert!(doc.extracted_entities.contains(&Entity {
            kind: EntityKind::Statute,
            value: "Lei nº 8.078/1990".to_string()
        }));
        assert!((0.0..=1.0).contains(&doc.quality_score));
        assert!(doc.enrichment.is_none());
        assert_eq!(doc.document_id, raw(DECISION).document_id());
    }

    #[test]
    fn test_news_text_keeps_decision_reference() {
        let mut news = raw(
            "<p>O acórdão nº 4567 do STJ reconheceu a responsabilidade do fornecedor pelos \
             danos causados ao consumidor. Segundo relatório do CNJ divulgado nesta semana, \
             casos semelhantes cresceram.</p>",
        );
        news.source_id = SourceId::Conjur;
        news.external_id = None;
        news.url = "https://www.conjur.com.br/2024-mar-05/acordao-fornecedor".to_string();

        let doc = Processor::default().process(&news, None, Utc::now()).unwrap();

        assert!(doc.cleaned_text.starts_with("O acórdão nº 4567 do STJ"));
        assert!(doc.cleaned_text.contains("relatório do CNJ"));
        assert!(doc.extracted_entities.contains(&Entity {
            kind: EntityKind::CourtDecision,
            value: "Acórdão nº 4567".to_string()
        }));
    }

    #[test]
    fn test_empty_input_rejected() {
        let processor = Processor::default();
        let err = processor
            .process(&raw("<div>  </div>"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ProcessorError::EmptyInput { .. }));

        let err = processor.process(&raw("Poucas palavras"), None, Utc::now());
        assert!(matches!(err, Err(ProcessorError::EmptyInput { .. })));
    }

    #[test]
    fn test_missing_key_is_malformed() {
        let mut doc = raw(DECISION);
        doc.external_id = None;
        doc.url = String::new();
        let err = Processor::default().process(&doc, None, Utc::now());
        assert!(matches!(err, Err(ProcessorError::Malformed { .. })));
    }

    #[test]
    fn test_deterministic_output() {
        let processor = Processor::default();
        let at = Utc::now();
        let a = processor.process(&raw(DECISION), None, at).unwrap();
        let b = processor.process(&raw(DECISION), None, at).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rule_change_changes_category() {
        let config = ProcessorConfig {
            category_rules: vec![CategoryRuleConfig {
                category: Category::Consumer,
                keywords: vec![
                    "fornecedor".to_string(),
                    "serviço".to_string(),
                    "8.078".to_string(),
                    "danos".to_string(),
                    "reparados".to_string(),
                ],
            }],
            ..ProcessorConfig::default()
        };
        let doc = Processor::new(&config, 0.5)
            .process(&raw(DECISION), None, Utc::now())
            .unwrap();
        assert_eq!(doc.category, Category::Consumer);
    }

    #[test]
    fn test_enrichment_fills_category_and_blends_quality() {
        let processor = Processor::default();
        let text = "Texto genérico sem termos conhecidos pelo classificador local.";
        let base = processor.process(&raw(text), None, Utc::now()).unwrap();
        assert_eq!(base.category, Category::Uncategorized);

        let enrichment = Enrichment {
            category: Some("Environmental".to_string()),
            quality: Some(1.0),
            ..Enrichment::default()
        };
        let enriched = processor
            .process(&raw(text), Some(enrichment.clone()), Utc::now())
            .unwrap();
        assert_eq!(enriched.category, Category::Environmental);
        assert!(enriched.quality_score > base.quality_score);
        assert_eq!(enriched.enrichment, Some(enrichment));
    }

    #[tokio::test]
    async fn test_process_enriched_uses_analyzer() {
        let analyzer = FixedAnalyzer(Enrichment {
            tags: vec!["responsabilidade civil".to_string()],
            ..Enrichment::default()
        });
        let analyzer: &dyn TextAnalyzer = &analyzer;

        let doc = Processor::default()
            .process_enriched(
                &raw(DECISION),
                Some(analyzer),
                Duration::from_secs(1),
                Utc::now(),
            )
            .await
            .unwrap();
        let enrichment = doc.enrichment.unwrap();
        assert_eq!(enrichment.tags, vec!["responsabilidade civil".to_string()]);
    }
}

//! JSONL training-data export

use crate::processor::Category;
use crate::sources::SourceId;
use crate::storage::{DocumentFilter, ProcessedDocument, Storage};
use crate::HarvestError;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// One line of the export
#[derive(Debug, Serialize)]
pub struct TrainingRecord<'a> {
    pub input: &'a str,
    pub title: &'a str,
    pub category: Category,
    pub category_label: &'static str,
    pub quality_score: f64,
    /// Extracted entity values followed by enrichment tags, deduplicated
    pub tags: Vec<&'a str>,
    pub source: SourceId,
    pub word_count: usize,
    pub processed_date: String,
}

impl<'a> TrainingRecord<'a> {
    pub fn from_document(doc: &'a ProcessedDocument) -> Self {
        let mut tags: Vec<&str> = Vec::new();
        let entity_values = doc.extracted_entities.iter().map(|e| e.value.as_str());
        let enrichment_tags = doc
            .enrichment
            .iter()
            .flat_map(|e| e.tags.iter().map(String::as_str));
        for tag in entity_values.chain(enrichment_tags) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Self {
            input: &doc.cleaned_text,
            title: &doc.title,
            category: doc.category,
            category_label: doc.category.label(),
            quality_score: doc.quality_score,
            tags,
            source: doc.source_id,
            word_count: doc.word_count,
            processed_date: doc.processed_at.to_rfc3339(),
        }
    }
}

/// Writes one JSON object per line; returns the number of lines
pub fn write_training_data<W: Write>(
    docs: &[ProcessedDocument],
    mut writer: W,
) -> Result<u64, HarvestError> {
    let mut written = 0;
    for doc in docs {
        serde_json::to_writer(&mut writer, &TrainingRecord::from_document(doc))?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Exports processed documents with quality at or above `min_quality`
pub fn export_training_data(
    storage: &dyn Storage,
    path: &Path,
    min_quality: f64,
) -> Result<u64, HarvestError> {
    let docs = storage.query(&DocumentFilter {
        min_quality: Some(min_quality),
        ..DocumentFilter::default()
    })?;

    let writer = BufWriter::new(File::create(path)?);
    let written = write_training_data(&docs, writer)?;
    info!(
        path = %path.display(),
        documents = written,
        min_quality,
        "Training data exported"
    );
    Ok(written)
}

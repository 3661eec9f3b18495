//! Optional enrichment through an external text-analysis service

use crate::config::EnrichmentConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Longest prefix of the cleaned text sent for analysis
const MAX_ANALYZED_CHARS: usize = 4000;

/// Structured annotation returned by the analysis service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enrichment {
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Quality signal in [0, 1]
    pub quality: Option<f64>,
    pub summary: Option<String>,
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Analysis request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analysis service returned HTTP {0}")]
    Status(u16),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid analysis endpoint: {0}")]
    InvalidEndpoint(String),
}

/// External collaborator that annotates cleaned text
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Enrichment, EnrichmentError>;
}

/// Analyzer backed by a JSON-over-HTTP endpoint
///
/// Posts `{"text": ...}` and expects an [`Enrichment`] object back. The API
/// key, when its environment variable is set, is sent as a bearer token.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpAnalyzer {
    pub fn new(client: reqwest::Client, endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    /// Builds an analyzer when enrichment is enabled in configuration
    pub fn from_config(
        config: &EnrichmentConfig,
        client: reqwest::Client,
    ) -> Result<Option<Self>, EnrichmentError> {
        if !config.enabled {
            return Ok(None);
        }
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| EnrichmentError::InvalidEndpoint("missing".to_string()))?;
        let endpoint =
            Url::parse(endpoint).map_err(|e| EnrichmentError::InvalidEndpoint(e.to_string()))?;

        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                "{} is not set; calling the analysis service without credentials",
                config.api_key_env
            );
        }

        Ok(Some(Self::new(client, endpoint, api_key)))
    }
}

#[async_trait]
impl TextAnalyzer for HttpAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Enrichment, EnrichmentError> {
        let excerpt: String = text.chars().take(MAX_ANALYZED_CHARS).collect();

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "text": excerpt }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Status(response.status().as_u16()));
        }

        Ok(response.json::<Enrichment>().await?)
    }
}

/// Runs the analyzer under a timeout, degrading to `None` on any failure
pub async fn enrich(
    analyzer: Option<&dyn TextAnalyzer>,
    document_id: &str,
    text: &str,
    timeout: Duration,
) -> Option<Enrichment> {
    let analyzer = analyzer?;

    let result = match tokio::time::timeout(timeout, analyzer.analyze(text)).await {
        Ok(result) => result,
        Err(_) => Err(EnrichmentError::Timeout(timeout)),
    };

    match result {
        Ok(enrichment) => {
            debug!(document = %document_id, "Enrichment attached");
            Some(enrichment)
        }
        Err(e) => {
            warn!(document = %document_id, "Enrichment skipped: {}", e);
            None
        }
    }
}

//! Alert delivery
//!
//! Alerts leave the process through an [`AlertSink`]. Delivery is
//! fire-and-forget from the scheduler's point of view: [`dispatch`] spawns
//! the sends and logs their failures, it never reports them back.

use crate::config::AlertConfig;
use crate::storage::RunRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Service name reported in webhook payloads
pub const SERVICE_NAME: &str = "juris-harvest";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Alert endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Invalid alert endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("No {0} configured")]
    NotConfigured(&'static str),
}

/// Email and webhook delivery channels
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_email(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), AlertError>;

    async fn post_webhook(&self, url: &str, payload: &Value) -> Result<(), AlertError>;
}

/// Sink posting JSON over HTTP
///
/// Email goes through an HTTP mail relay that accepts
/// `{"to": [...], "subject": ..., "body": ...}`.
pub struct HttpAlertSink {
    client: reqwest::Client,
    email_relay: Option<Url>,
}

impl HttpAlertSink {
    pub fn new(client: reqwest::Client, email_relay: Option<Url>) -> Self {
        Self {
            client,
            email_relay,
        }
    }

    pub fn from_config(config: &AlertConfig, client: reqwest::Client) -> Result<Self, AlertError> {
        let email_relay = config
            .email_relay_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| AlertError::InvalidEndpoint(e.to_string()))?;
        Ok(Self::new(client, email_relay))
    }

    async fn post(&self, url: Url, payload: &Value) -> Result<(), AlertError> {
        let response = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AlertError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for HttpAlertSink {
    async fn send_email(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), AlertError> {
        let relay = self
            .email_relay
            .clone()
            .ok_or(AlertError::NotConfigured("email relay"))?;
        let payload = json!({ "to": recipients, "subject": subject, "body": body });
        self.post(relay, &payload).await
    }

    async fn post_webhook(&self, url: &str, payload: &Value) -> Result<(), AlertError> {
        let url = Url::parse(url).map_err(|e| AlertError::InvalidEndpoint(e.to_string()))?;
        self.post(url, payload).await
    }
}

/// What the scheduler wants to tell the outside world about a cycle
#[derive(Debug, Clone)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub slot: String,
    /// Threshold breaches or the cycle failure; empty for a success notice
    pub problems: Vec<String>,
    pub runs: Vec<RunRecord>,
}

impl Notice {
    pub fn is_alert(&self) -> bool {
        !self.problems.is_empty()
    }

    pub fn subject(&self) -> String {
        if self.is_alert() {
            format!("[{}] Alerta na coleta {}", SERVICE_NAME, self.slot)
        } else {
            format!("[{}] Coleta {} concluída", SERVICE_NAME, self.slot)
        }
    }

    /// Plain-text email body with totals and a per-source breakdown
    pub fn body(&self) -> String {
        let (attempted, succeeded, failed) = totals(&self.runs);
        let mut body = String::new();

        if self.is_alert() {
            let _ = writeln!(body, "Problemas detectados na coleta {}:", self.slot);
            for problem in &self.problems {
                let _ = writeln!(body, "- {}", problem);
            }
            body.push('\n');
        }

        let _ = writeln!(body, "Total tentado: {}", attempted);
        let _ = writeln!(body, "Total salvo: {}", succeeded);
        let _ = writeln!(body, "Erros: {}", failed);
        if attempted > 0 {
            let _ = writeln!(
                body,
                "Taxa de sucesso: {:.1}%",
                succeeded as f64 / attempted as f64 * 100.0
            );
        }

        if !self.runs.is_empty() {
            body.push_str("\nDetalhes por fonte:\n");
            for run in &self.runs {
                let _ = write!(
                    body,
                    "- {}: {}/{} salvos",
                    run.source_id, run.succeeded_count, run.attempted_count
                );
                if let Some(summary) = &run.error_summary {
                    let _ = write!(body, " ({})", summary);
                }
                body.push('\n');
            }
        }

        let _ = writeln!(body, "\nHorário: {}", self.at.to_rfc3339());
        body
    }

    pub fn webhook_payload(&self) -> Value {
        json!({
            "timestamp": self.at.to_rfc3339(),
            "service": SERVICE_NAME,
            "results": {
                "slot": self.slot,
                "status": if self.is_alert() { "alert" } else { "success" },
                "problems": self.problems,
                "runs": self.runs,
            }
        })
    }
}

/// Sums attempted, succeeded and failed counts across runs
pub fn totals(runs: &[RunRecord]) -> (u32, u32, u32) {
    runs.iter().fold((0, 0, 0), |(a, s, f), run| {
        (
            a + run.attempted_count,
            s + run.succeeded_count,
            f + run.failed_count,
        )
    })
}

/// Sends a notice through every configured channel in the background
///
/// Alerts go to email and webhook; success notices go to the webhook only,
/// and only when `notify_on_success` is set. Returns `None` when there is
/// nothing to send.
pub fn dispatch(
    sink: Arc<dyn AlertSink>,
    config: &AlertConfig,
    notice: Notice,
) -> Option<JoinHandle<()>> {
    let email_to = if notice.is_alert() && !config.email_recipients.is_empty() {
        Some(config.email_recipients.clone())
    } else {
        None
    };
    let webhook = config
        .webhook_url
        .clone()
        .filter(|_| notice.is_alert() || config.notify_on_success);

    if email_to.is_none() && webhook.is_none() {
        if notice.is_alert() {
            warn!(
                slot = %notice.slot,
                problems = ?notice.problems,
                "Alert raised but no delivery channel is configured"
            );
        }
        return None;
    }

    Some(tokio::spawn(async move {
        if let Some(recipients) = email_to {
            match sink
                .send_email(&recipients, &notice.subject(), &notice.body())
                .await
            {
                Ok(()) => debug!(recipients = recipients.len(), "Alert email sent"),
                Err(e) => warn!(error = %e, "Failed to send alert email"),
            }
        }
        if let Some(url) = webhook {
            match sink.post_webhook(&url, &notice.webhook_payload()).await {
                Ok(()) => debug!(url = %url, "Webhook notified"),
                Err(e) => warn!(url = %url, error = %e, "Failed to post webhook"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceId;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run(source: SourceId, succeeded: u32, failed: u32) -> RunRecord {
        let now = Utc::now();
        RunRecord::new(
            format!("1-{}", source),
            Some(1),
            source,
            now,
            now,
            succeeded,
            failed,
            (failed > 0).then(|| format!("timeout: {}", failed)),
        )
    }

    fn notice(problems: Vec<String>) -> Notice {
        Notice {
            at: Utc::now(),
            slot: "2024-06-03T02:00-03:00".to_string(),
            problems,
            runs: vec![run(SourceId::Stf, 10, 0), run(SourceId::Conjur, 0, 10)],
        }
    }

    #[test]
    fn test_body_lists_totals_and_sources() {
        let body = notice(vec!["Taxa de sucesso baixa".to_string()]).body();
        assert!(body.contains("Total tentado: 20"));
        assert!(body.contains("Total salvo: 10"));
        assert!(body.contains("Taxa de sucesso: 50.0%"));
        assert!(body.contains("- conjur: 0/10 salvos (timeout: 10)"));
        assert!(body.contains("- Taxa de sucesso baixa"));
    }

    #[test]
    fn test_webhook_payload_shape() {
        let payload = notice(Vec::new()).webhook_payload();
        assert_eq!(payload["service"], SERVICE_NAME);
        assert_eq!(payload["results"]["status"], "success");
        assert_eq!(payload["results"]["runs"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_totals() {
        let runs = vec![run(SourceId::Stf, 7, 3), run(SourceId::Stj, 5, 0)];
        assert_eq!(totals(&runs), (15, 12, 3));
    }

    #[tokio::test]
    async fn test_http_sink_posts_webhook_and_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({ "service": SERVICE_NAME })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mail"))
            .and(body_partial_json(json!({ "to": ["ops@example.com"] })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let config = AlertConfig {
            email_recipients: vec!["ops@example.com".to_string()],
            email_relay_url: Some(format!("{}/mail", server.uri())),
            webhook_url: Some(format!("{}/hook", server.uri())),
            ..AlertConfig::default()
        };
        let sink = HttpAlertSink::from_config(&config, reqwest::Client::new()).unwrap();

        let handle = dispatch(Arc::new(sink), &config, notice(vec!["x".to_string()]));
        handle.unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_success_notice_needs_opt_in() {
        let config = AlertConfig {
            email_recipients: vec!["ops@example.com".to_string()],
            webhook_url: Some("http://127.0.0.1:9/hook".to_string()),
            ..AlertConfig::default()
        };
        let sink: Arc<dyn AlertSink> = Arc::new(HttpAlertSink::new(reqwest::Client::new(), None));
        assert!(dispatch(sink.clone(), &config, notice(Vec::new())).is_none());

        let config = AlertConfig {
            notify_on_success: true,
            ..config
        };
        assert!(dispatch(sink, &config, notice(Vec::new())).is_some());
    }

    #[tokio::test]
    async fn test_missing_relay_is_an_error() {
        let sink = HttpAlertSink::new(reqwest::Client::new(), None);
        let err = sink
            .send_email(&["ops@example.com".to_string()], "s", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::NotConfigured(_)));
    }
}

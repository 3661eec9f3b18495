//! Integration tests for harvest cycles
//!
//! Each source gets its own mock site. Sites serve a listing page with
//! links in the shape the real portals use, and detail pages with a legal
//! text long enough to pass every adapter's content check.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use juris_harvest::config::parse_config;
use juris_harvest::processor::{Category, Enrichment, EnrichmentError, TextAnalyzer};
use juris_harvest::scheduler::{AlertError, AlertSink, CycleReport, Orchestrator};
use juris_harvest::storage::{lock, CycleStatus, DocumentFilter, SqliteStorage, Storage};
use juris_harvest::{CycleError, RawDocument, SourceId};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DECISION_TEXT: &str = "O Tribunal Pleno julgou o recurso extraordinário e reconheceu \
    a violação ao direito fundamental previsto na Constituição. O relator destacou que o \
    contrato administrativo firmado pelo município não observou a licitação exigida, razão \
    pela qual a Corte declarou a nulidade do ajuste e determinou a devolução dos valores ao \
    erário público estadual.";

/// Records every alert instead of delivering it
#[derive(Default)]
struct RecordingSink {
    emails: Mutex<Vec<String>>,
    webhooks: Mutex<Vec<Value>>,
}

impl RecordingSink {
    fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }

    fn alert_webhooks(&self) -> Vec<Value> {
        self.webhooks
            .lock()
            .unwrap()
            .iter()
            .filter(|payload| payload["results"]["status"] == "alert")
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send_email(
        &self,
        _recipients: &[String],
        subject: &str,
        _body: &str,
    ) -> Result<(), AlertError> {
        self.emails.lock().unwrap().push(subject.to_string());
        Ok(())
    }

    async fn post_webhook(&self, _url: &str, payload: &Value) -> Result<(), AlertError> {
        self.webhooks.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

struct TaggingAnalyzer;

#[async_trait]
impl TextAnalyzer for TaggingAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<Enrichment, EnrichmentError> {
        Ok(Enrichment {
            tags: vec!["licitação".to_string()],
            quality: Some(0.9),
            ..Enrichment::default()
        })
    }
}

/// Fails inside the source worker, so the whole cycle attempt is lost
struct CrashingAnalyzer;

#[async_trait]
impl TextAnalyzer for CrashingAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<Enrichment, EnrichmentError> {
        panic!("analysis worker crashed");
    }
}

fn detail_page(class: &str, tag: &str) -> String {
    format!(
        r#"<html><head><title>Decisão</title></head><body>
        <h1>ADI 1234 - Licitação municipal</h1>
        <{tag} class="{class}"><p>{text}</p></{tag}>
        </body></html>"#,
        tag = tag,
        class = class,
        text = DECISION_TEXT
    )
}

fn listing_page(links: &[String]) -> String {
    let items: String = links
        .iter()
        .enumerate()
        .map(|(i, href)| format!(r#"<li><a href="{}">Documento {}</a></li>"#, href, i))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", items)
}

async fn mount_listing(server: &MockServer, listing_path: &str, links: &[String]) {
    Mock::given(method("GET"))
        .and(path(listing_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(links)))
        .mount(server)
        .await;
}

/// STF site with `count` decisions
async fn stf_site(count: u32) -> MockServer {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=count)
        .map(|i| format!("/processos/acordao?incidente={}", 5000 + i))
        .collect();
    mount_listing(&server, "/jurisprudencia/", &links).await;
    Mock::given(method("GET"))
        .and(path("/processos/acordao"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("decision-content", "div")),
        )
        .mount(&server)
        .await;
    server
}

/// STJ site with `count` decisions
async fn stj_site(count: u32) -> MockServer {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=count)
        .map(|i| format!("/websecstj/acordao?documento={}", 7000 + i))
        .collect();
    mount_listing(&server, "/sites/portalp/Jurisprudencia", &links).await;
    Mock::given(method("GET"))
        .and(path("/websecstj/acordao"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page("jurisprudencia-content", "div")),
        )
        .mount(&server)
        .await;
    server
}

/// ConJur site with `count` articles
async fn conjur_site(count: u32) -> MockServer {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=count)
        .map(|i| format!("/2024-mar-05/noticia-{}/", i))
        .collect();
    mount_listing(&server, "/", &links).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/2024-mar-05/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("article-content", "article")),
        )
        .mount(&server)
        .await;
    server
}

/// Migalhas site whose listing works but whose articles all return 404
async fn broken_migalhas_site(count: u32) -> MockServer {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=count)
        .map(|i| format!("/quentes/{}/materia-{}", 400000 + i, i))
        .collect();
    mount_listing(&server, "/quentes", &links).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/quentes/\d+"))
        .respond_with(ResponseTemplate::new(404))
        .expect(count as u64)
        .mount(&server)
        .await;
    server
}

/// Migalhas site whose `count` articles all load
async fn migalhas_site(count: u32) -> MockServer {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=count)
        .map(|i| format!("/quentes/{}/materia-{}", 400000 + i, i))
        .collect();
    mount_listing(&server, "/quentes", &links).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/quentes/\d+"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("article-body", "div")),
        )
        .mount(&server)
        .await;
    server
}

fn config_toml(sources: &[(SourceId, &MockServer)], extra: &str) -> String {
    let mut toml = String::from(
        r#"
[user-agent]
crawler-name = "JurisHarvestTest"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[fetch]
timeout-secs = 5
min-host-delay-ms = 1
max-retries = 1
retry-delay-ms = 10
max-concurrent-sources = 4
stop-grace-secs = 1
respect-robots = false

[output]
database-path = ":memory:"
"#,
    );
    for (id, server) in sources {
        toml.push_str(&format!(
            "\n[[source]]\nid = \"{}\"\nbase-url = \"{}\"\nlimit = 10\nmax-pages = 1\n",
            id,
            server.uri()
        ));
    }
    toml.push_str(extra);
    toml
}

fn orchestrator_with(toml: &str, storage: SqliteStorage) -> Orchestrator {
    let config = parse_config(toml).expect("valid test config");
    Orchestrator::new(config, "test-hash", storage)
        .expect("orchestrator builds")
        .with_cycle_retry_delay(Duration::from_millis(10))
}

fn orchestrator(toml: &str) -> Orchestrator {
    orchestrator_with(toml, SqliteStorage::new_in_memory().unwrap())
}

async fn four_source_cycle(min_success_rate: f64) -> (CycleReport, Arc<RecordingSink>, Orchestrator) {
    let stf = stf_site(10).await;
    let stj = stj_site(10).await;
    let conjur = conjur_site(10).await;
    let migalhas = broken_migalhas_site(10).await;

    let alerts = format!(
        r#"
[alerts]
min-success-rate = {}
max-error-count = 100
email-recipients = ["ops@example.com"]
webhook-url = "http://alerts.example.com/hook"
"#,
        min_success_rate
    );
    let toml = config_toml(
        &[
            (SourceId::Stf, &stf),
            (SourceId::Stj, &stj),
            (SourceId::Conjur, &conjur),
            (SourceId::Migalhas, &migalhas),
        ],
        &alerts,
    );

    let sink = Arc::new(RecordingSink::default());
    let orchestrator = orchestrator(&toml).with_alert_sink(sink.clone());
    let report = orchestrator.run_once().await.expect("cycle completes");
    orchestrator.flush_notifications().await;

    (report, sink, orchestrator)
}

#[tokio::test]
async fn test_three_of_four_sources_stay_above_lenient_threshold() {
    let (report, sink, orchestrator) = four_source_cycle(0.7).await;

    assert_eq!(report.totals(), (40, 30, 10));
    assert_eq!(report.success_rate(), Some(0.75));
    assert_eq!(report.status, CycleStatus::Succeeded);
    assert!(report.problems.is_empty());
    assert!(sink.alert_webhooks().is_empty());
    assert_eq!(sink.email_count(), 0);

    let migalhas = report
        .runs
        .iter()
        .find(|run| run.source_id == SourceId::Migalhas)
        .unwrap();
    assert_eq!(migalhas.succeeded_count, 0);
    assert_eq!(migalhas.failed_count, 10);
    assert!(migalhas
        .error_summary
        .as_deref()
        .unwrap()
        .contains("rejected: 10"));

    let storage = lock(orchestrator.storage()).unwrap();
    assert_eq!(storage.count_raw().unwrap(), 30);
    assert_eq!(storage.count_processed().unwrap(), 30);
    assert_eq!(storage.runs_for_cycle(report.cycle_id).unwrap().len(), 4);

    let state = orchestrator.schedule_state();
    assert_eq!(state.consecutive_failure_count, 0);
}

#[tokio::test]
async fn test_strict_threshold_alerts_exactly_once() {
    let (report, sink, orchestrator) = four_source_cycle(0.8).await;

    assert_eq!(report.success_rate(), Some(0.75));
    assert_eq!(report.status, CycleStatus::Breached);
    assert_eq!(report.problems.len(), 1);
    assert_eq!(sink.alert_webhooks().len(), 1);
    assert_eq!(sink.email_count(), 1);

    let payload = &sink.alert_webhooks()[0];
    assert_eq!(payload["service"], "juris-harvest");
    assert_eq!(payload["results"]["runs"].as_array().unwrap().len(), 4);

    assert_eq!(orchestrator.schedule_state().consecutive_failure_count, 1);
}

#[tokio::test]
async fn test_repeated_cycles_are_idempotent() {
    let stf = stf_site(10).await;
    let orchestrator = orchestrator(&config_toml(&[(SourceId::Stf, &stf)], ""));

    let first = orchestrator.run_once().await.unwrap();
    let mut documents_after_first = {
        let storage = lock(orchestrator.storage()).unwrap();
        storage.query(&DocumentFilter::default()).unwrap()
    };
    documents_after_first.sort_by(|a, b| a.document_id.cmp(&b.document_id));

    let second = orchestrator.run_once().await.unwrap();
    let storage = lock(orchestrator.storage()).unwrap();

    assert_eq!(first.totals(), (10, 10, 0));
    assert_eq!(second.totals(), (10, 10, 0));
    assert_ne!(first.cycle_id, second.cycle_id);
    assert_eq!(storage.count_raw().unwrap(), 10);
    assert_eq!(storage.count_processed().unwrap(), 10);

    let mut documents_after_second = storage.query(&DocumentFilter::default()).unwrap();
    documents_after_second.sort_by(|a, b| a.document_id.cmp(&b.document_id));
    assert_eq!(documents_after_first.len(), documents_after_second.len());
    for (a, b) in documents_after_first.iter().zip(&documents_after_second) {
        assert_eq!(a.document_id, b.document_id);
        assert_eq!(a.cleaned_text, b.cleaned_text);
        assert_eq!(a.category, b.category);
        assert_eq!(a.quality_score, b.quality_score);
    }

    // Two cycles, one run record each, never overwritten
    assert_eq!(storage.recent_runs(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_listing_entries_are_counted() {
    let server = MockServer::start().await;
    let links = vec![
        "/quentes/400001/materia-1".to_string(),
        "/quentes/400002/materia-2".to_string(),
        "/quentes/400003/materia-3".to_string(),
        "https://exa mple.com/quentes/1/quebrado".to_string(),
        "https://bad host/quentes/2/quebrado".to_string(),
    ];
    mount_listing(&server, "/quentes", &links).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/quentes/\d+"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("article-body", "div")),
        )
        .expect(3)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&config_toml(&[(SourceId::Migalhas, &server)], ""));
    let report = orchestrator.run_once().await.unwrap();

    let run = &report.runs[0];
    assert_eq!(run.attempted_count, 5);
    assert_eq!(run.succeeded_count, 3);
    assert_eq!(run.failed_count, 2);
    assert!(run.error_summary.as_deref().unwrap().contains("malformed: 2"));
}

#[tokio::test]
async fn test_listing_failure_counts_as_one_failed_unit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jurisprudencia/"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&config_toml(&[(SourceId::Stf, &server)], ""));
    let report = orchestrator.run_once().await.unwrap();

    assert_eq!(report.totals(), (1, 0, 1));
    assert!(report.runs[0]
        .error_summary
        .as_deref()
        .unwrap()
        .contains("listing: 1"));
}

#[tokio::test]
async fn test_timeouts_are_retried_per_fetch() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "/jurisprudencia/",
        &["/processos/acordao?incidente=1".to_string()],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/processos/acordao"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page("decision-content", "div"))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let toml = config_toml(&[(SourceId::Stf, &server)], "")
        .replace("timeout-secs = 5", "timeout-secs = 1");
    let orchestrator = orchestrator(&toml);
    let report = orchestrator.run_once().await.unwrap();

    assert_eq!(report.totals(), (1, 0, 1));
    assert!(report.runs[0]
        .error_summary
        .as_deref()
        .unwrap()
        .contains("timeout: 1"));
}

#[tokio::test]
async fn test_second_trigger_rejected_while_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jurisprudencia/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&[]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let orchestrator = Arc::new(orchestrator(&config_toml(&[(SourceId::Stf, &server)], "")));
    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_once().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orchestrator.is_running());
    assert!(matches!(
        orchestrator.run_once().await,
        Err(CycleError::AlreadyRunning)
    ));

    let first = running.await.unwrap().unwrap();
    assert_eq!(first.status, CycleStatus::Succeeded);
    assert!(!orchestrator.is_running());

    let storage = lock(orchestrator.storage()).unwrap();
    assert_eq!(storage.recent_runs(10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_stop_cancels_without_alerting() {
    let stf = stf_site(10).await;
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sites/portalp/Jurisprudencia"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&[]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&slow)
        .await;

    let toml = config_toml(
        &[(SourceId::Stj, &slow), (SourceId::Stf, &stf)],
        "\n[alerts]\nmin-success-rate = 1.0\nwebhook-url = \"http://alerts.example.com/hook\"\n",
    )
    .replace("max-concurrent-sources = 4", "max-concurrent-sources = 1");
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Arc::new(orchestrator(&toml).with_alert_sink(sink.clone()));

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_once().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.stop();

    let report = running.await.unwrap().unwrap();
    orchestrator.flush_notifications().await;

    assert_eq!(report.status, CycleStatus::Cancelled);
    assert!(sink.webhooks.lock().unwrap().is_empty());
    assert!(!orchestrator.is_running());
    assert_eq!(orchestrator.schedule_state().consecutive_failure_count, 0);
}

#[tokio::test]
async fn test_retention_removes_only_expired_documents() {
    let orchestrator = orchestrator(&config_toml(&[], ""));
    let now = Utc::now();

    {
        let mut storage = lock(orchestrator.storage()).unwrap();
        for (id, age_days) in [("old", 91), ("recent", 89)] {
            storage
                .upsert_raw(&RawDocument {
                    source_id: SourceId::Stj,
                    external_id: Some(id.to_string()),
                    url: format!("https://www.stj.jus.br/websecstj/acordao?documento={}", id),
                    title: "REsp".to_string(),
                    published_at: None,
                    fetched_at: now - ChronoDuration::days(age_days),
                    raw_text: DECISION_TEXT.to_string(),
                })
                .unwrap();
        }
    }

    let report = orchestrator.run_retention(now).unwrap();
    assert_eq!(report.deleted, 1);
    assert!(report.backup.is_none());

    let storage = lock(orchestrator.storage()).unwrap();
    let remaining = storage.list_raw(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].external_id.as_deref(), Some("recent"));
}

#[tokio::test]
async fn test_reprocess_after_rule_change() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let stf = stf_site(3).await;
    let toml = config_toml(&[(SourceId::Stf, &stf)], "");

    let harvested = orchestrator_with(&toml, SqliteStorage::new(&db_path).unwrap());
    harvested.run_once().await.unwrap();
    let before = lock(harvested.storage())
        .unwrap()
        .query(&DocumentFilter::default())
        .unwrap();
    assert_eq!(before.len(), 3);
    assert!(before
        .iter()
        .all(|doc| doc.category == Category::Administrative));
    drop(harvested);

    let rules = r#"
[[processor.category-rule]]
category = "environmental"
keywords = ["tribunal", "relator", "município", "erário", "nulidade"]
"#;
    let reprocessing = orchestrator_with(
        &format!("{}{}", toml, rules),
        SqliteStorage::new(&db_path).unwrap(),
    );
    let report = reprocessing.reprocess_stored().unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.skipped, 0);

    let after = lock(reprocessing.storage())
        .unwrap()
        .query(&DocumentFilter::default())
        .unwrap();
    assert_eq!(after.len(), 3);
    assert!(after
        .iter()
        .all(|doc| doc.category == Category::Environmental));
}

#[tokio::test]
async fn test_analyzer_annotations_are_stored() {
    let stf = stf_site(2).await;
    let orchestrator = orchestrator(&config_toml(&[(SourceId::Stf, &stf)], ""))
        .with_analyzer(Arc::new(TaggingAnalyzer));

    orchestrator.run_once().await.unwrap();

    let storage = lock(orchestrator.storage()).unwrap();
    let docs = storage.query(&DocumentFilter::default()).unwrap();
    assert_eq!(docs.len(), 2);
    for doc in docs {
        let enrichment = doc.enrichment.expect("enrichment stored");
        assert_eq!(enrichment.tags, vec!["licitação".to_string()]);
    }
}

#[tokio::test]
async fn test_health_check_after_cycle() {
    let stf = stf_site(4).await;
    let orchestrator = orchestrator(&config_toml(&[(SourceId::Stf, &stf)], ""));
    orchestrator.run_once().await.unwrap();

    let report = orchestrator.health_check().unwrap();
    assert_eq!(report.total_documents, 4);
    assert_eq!(report.recent_documents, 4);
    assert_eq!(report.sources_active, 1);
    assert_eq!(report.database_status(), "healthy");
    assert_eq!(report.recent_activity(), "active");
    assert_eq!(report.last_cycle_status, Some(CycleStatus::Succeeded));
    assert!(report.schedule.last_run_at.is_some());
}

#[tokio::test]
async fn test_cycle_crashing_on_every_attempt_exhausts_retries() {
    let stf = stf_site(2).await;
    let extra = r#"
[schedule]
max-retries = 1

[alerts]
email-recipients = ["ops@example.com"]
webhook-url = "http://alerts.example.com/hook"
"#;
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = orchestrator(&config_toml(&[(SourceId::Stf, &stf)], extra))
        .with_analyzer(Arc::new(CrashingAnalyzer))
        .with_alert_sink(sink.clone());

    let result = orchestrator.run_once().await;
    orchestrator.flush_notifications().await;

    match result {
        Err(CycleError::RetriesExhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("did not complete"));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }

    assert_eq!(sink.alert_webhooks().len(), 1);
    assert_eq!(sink.email_count(), 1);

    let state = orchestrator.schedule_state();
    assert!(!state.is_running());
    assert_eq!(state.consecutive_failure_count, 1);
    assert!(state.last_run_at.is_some());

    let storage = lock(orchestrator.storage()).unwrap();
    let latest = storage.latest_cycle().unwrap().unwrap();
    assert_eq!(latest.attempt, 2);
    assert_eq!(latest.status, CycleStatus::Failed);
    assert_eq!(storage.count_raw().unwrap(), 0);
    drop(storage);

    // The next exhausted cycle keeps counting
    assert!(orchestrator.run_once().await.is_err());
    assert_eq!(orchestrator.schedule_state().consecutive_failure_count, 2);
}

#[tokio::test]
async fn test_store_failure_aborts_only_that_source() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let storage = SqliteStorage::new(&db_path).unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_migalhas BEFORE INSERT ON raw_documents
         WHEN NEW.source_id = 'migalhas'
         BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END;",
    )
    .unwrap();
    drop(conn);

    let stf = stf_site(3).await;
    let migalhas = migalhas_site(3).await;
    let toml = config_toml(
        &[(SourceId::Stf, &stf), (SourceId::Migalhas, &migalhas)],
        "",
    );
    let orchestrator = orchestrator_with(&toml, storage);

    let report = orchestrator.run_once().await.expect("cycle completes");

    assert_eq!(report.status, CycleStatus::Succeeded);
    assert_eq!(report.runs.len(), 2);

    let stf_run = report
        .runs
        .iter()
        .find(|run| run.source_id == SourceId::Stf)
        .unwrap();
    assert_eq!(stf_run.succeeded_count, 3);
    assert_eq!(stf_run.failed_count, 0);

    let migalhas_run = report
        .runs
        .iter()
        .find(|run| run.source_id == SourceId::Migalhas)
        .unwrap();
    assert_eq!(migalhas_run.attempted_count, 1);
    assert_eq!(migalhas_run.succeeded_count, 0);
    assert!(migalhas_run
        .error_summary
        .as_deref()
        .unwrap()
        .contains("store: 1"));

    let storage = lock(orchestrator.storage()).unwrap();
    assert_eq!(storage.count_raw().unwrap(), 3);
    assert_eq!(storage.runs_for_cycle(report.cycle_id).unwrap().len(), 2);
    drop(storage);
    assert_eq!(orchestrator.schedule_state().consecutive_failure_count, 0);
}

//! Harvest cycle orchestration
//!
//! The [`Orchestrator`] owns the [`ScheduleState`] and runs one cycle at a
//! time: every enabled source is harvested (bounded by
//! `max-concurrent-sources`), documents flow through the processor into the
//! store, one [`RunRecord`] is appended per source, and the aggregate is
//! checked against the alert thresholds.

use crate::config::{AlertConfig, Config, SourceConfig};
use crate::fetch::{FetchEngine, FetchOptions};
use crate::processor::{HttpAnalyzer, Processor, TextAnalyzer};
use crate::scheduler::alert::{self, AlertSink, HttpAlertSink, Notice};
use crate::scheduler::calendar::WeeklySlot;
use crate::sources::{build_adapter, list_documents, RawDocument, SourceAdapter, SourceId};
use crate::state::ScheduleState;
use crate::storage::{
    lock, CycleStatus, ProcessedDocument, RunRecord, SharedStorage, SqliteStorage, Storage,
    StorageError, StorageResult, UpsertOutcome,
};
use crate::{AdapterError, ConfigError, CycleError, HarvestError};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Listings are walked back this far before the previous run
const SINCE_OVERLAP_DAYS: i64 = 7;

/// Window for "recent" documents in health reports
const RECENT_ACTIVITY_DAYS: i64 = 7;

const HEALTH_RECENT_RUNS: usize = 20;

const MAX_SUMMARY_ERROR_CHARS: usize = 200;

/// Result of one cycle attempt that ran to the end or was stopped
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: i64,
    pub slot: String,
    pub attempt: u32,
    pub status: CycleStatus,
    pub runs: Vec<RunRecord>,
    /// Threshold breaches; empty unless `status` is `Breached`
    pub problems: Vec<String>,
}

impl CycleReport {
    /// Attempted, succeeded and failed counts across all sources
    pub fn totals(&self) -> (u32, u32, u32) {
        alert::totals(&self.runs)
    }

    /// `None` when nothing was attempted
    pub fn success_rate(&self) -> Option<f64> {
        success_rate(&self.runs)
    }
}

/// Snapshot returned by the periodic health check
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub schedule: ScheduleState,
    pub total_documents: u64,
    pub processed_documents: u64,
    /// Documents fetched in the last seven days
    pub recent_documents: u64,
    /// Sources with at least one stored document among the recent runs
    pub sources_active: usize,
    pub last_cycle_status: Option<CycleStatus>,
    pub recent_runs: Vec<RunRecord>,
}

impl HealthReport {
    pub fn database_status(&self) -> &'static str {
        if self.total_documents > 0 {
            "healthy"
        } else {
            "empty"
        }
    }

    pub fn recent_activity(&self) -> &'static str {
        if self.recent_documents > 0 {
            "active"
        } else {
            "inactive"
        }
    }

    /// Most recent non-empty error summaries, newest first
    pub fn recent_errors(&self) -> Vec<String> {
        self.recent_runs
            .iter()
            .filter_map(|run| {
                run.error_summary
                    .as_ref()
                    .map(|summary| format!("{}: {}", run.source_id, summary))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionReport {
    pub cutoff: DateTime<Utc>,
    pub deleted: u64,
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessReport {
    pub processed: u64,
    pub skipped: u64,
}

struct Control {
    state: ScheduleState,
    /// Token of the running cycle
    cancel: CancellationToken,
}

/// Drives harvest cycles, retention and health checks
pub struct Orchestrator {
    config: Arc<Config>,
    config_hash: String,
    harvest_slot: WeeklySlot,
    engine: Arc<FetchEngine>,
    storage: SharedStorage,
    processor: Arc<Processor>,
    analyzer: Option<Arc<dyn TextAnalyzer>>,
    alert_sink: Arc<dyn AlertSink>,
    adapters: Vec<(SourceConfig, Arc<dyn SourceAdapter>)>,
    cycle_retry_delay: Duration,
    control: Mutex<Control>,
    notifications: Mutex<Vec<JoinHandle<()>>>,
    /// Set when the last retention pass failed
    retention_pending: AtomicBool,
}

impl Orchestrator {
    /// Builds the orchestrator and restores the persisted schedule state
    ///
    /// Cycles left `running` by a previous process are marked failed.
    pub fn new(
        config: Config,
        config_hash: impl Into<String>,
        mut storage: SqliteStorage,
    ) -> Result<Self, HarvestError> {
        let schedule = &config.schedule;
        let harvest_slot =
            WeeklySlot::parse(&schedule.day_of_week, &schedule.time, &schedule.timezone)?;

        let engine = Arc::new(FetchEngine::new(&config.user_agent.header_value())?);

        let adapters = config
            .enabled_sources()
            .map(|source| Ok((source.clone(), build_adapter(source)?)))
            .collect::<Result<Vec<_>, AdapterError>>()?;

        let analyzer = HttpAnalyzer::from_config(&config.enrichment, engine.client().clone())
            .map_err(|e| ConfigError::Validation(format!("enrichment: {}", e)))?
            .map(|analyzer| Arc::new(analyzer) as Arc<dyn TextAnalyzer>);

        let alert_sink = HttpAlertSink::from_config(&config.alerts, engine.client().clone())
            .map_err(|e| ConfigError::Validation(format!("alerts: {}", e)))?;

        let now = Utc::now();
        let interrupted = storage.mark_interrupted_cycles(now)?;
        if interrupted > 0 {
            warn!(cycles = interrupted, "Marked cycles interrupted by a previous shutdown as failed");
        }
        let mut state = storage.load_schedule_state()?;
        state.next_run_at = Some(harvest_slot.next_after(now));

        info!(
            sources = adapters.len(),
            slot = %harvest_slot,
            consecutive_failures = state.consecutive_failure_count,
            "Orchestrator ready"
        );

        Ok(Self {
            processor: Arc::new(Processor::from_config(&config)),
            cycle_retry_delay: Duration::from_secs(schedule.retry_delay_minutes.saturating_mul(60)),
            config: Arc::new(config),
            config_hash: config_hash.into(),
            harvest_slot,
            engine,
            storage: Arc::new(Mutex::new(storage)),
            analyzer,
            alert_sink: Arc::new(alert_sink),
            adapters,
            control: Mutex::new(Control {
                state,
                cancel: CancellationToken::new(),
            }),
            notifications: Mutex::new(Vec::new()),
            retention_pending: AtomicBool::new(false),
        })
    }

    /// Replaces the alert delivery channels
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = sink;
        self
    }

    /// Replaces the external text analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn TextAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Overrides the wait between whole-cycle attempts
    pub fn with_cycle_retry_delay(mut self, delay: Duration) -> Self {
        self.cycle_retry_delay = delay;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn harvest_slot(&self) -> WeeklySlot {
        self.harvest_slot
    }

    /// Copy of the current schedule state
    pub fn schedule_state(&self) -> ScheduleState {
        self.control().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.control().state.is_running()
    }

    pub(crate) fn set_next_run(&self, at: DateTime<Utc>) {
        self.control().state.next_run_at = Some(at);
    }

    // ===== Cycles =====

    /// Runs an on-demand cycle
    ///
    /// Rejected with [`CycleError::AlreadyRunning`] while another cycle runs.
    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        let slot = format!("manual-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        self.run_slot(&slot, false).await
    }

    /// Runs the cycle for the weekly slot starting at `slot_start`
    ///
    /// A slot with a completed cycle in the ledger is never run twice.
    pub async fn run_scheduled(&self, slot_start: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let slot = self.harvest_slot.label(slot_start);
        self.run_slot(&slot, true).await
    }

    /// Stops the running cycle
    ///
    /// Sources that have not started are skipped; in-flight requests get the
    /// configured grace period.
    pub fn stop(&self) {
        let control = self.control();
        if control.state.is_running() {
            info!("Stop requested; no new sources will start");
            control.cancel.cancel();
        }
    }

    /// Waits for alert and notification deliveries still in flight
    pub async fn flush_notifications(&self) {
        let pending = std::mem::take(
            &mut *self
                .notifications
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Notification task failed");
            }
        }
    }

    async fn run_slot(&self, slot: &str, scheduled: bool) -> Result<CycleReport, CycleError> {
        let cancel = self.begin()?;

        if scheduled {
            match self.with_storage(|s| s.is_slot_completed(slot)) {
                Ok(false) => {}
                Ok(true) => {
                    self.control().state.release();
                    info!(slot, "Slot already completed; skipping");
                    return Err(CycleError::SlotAlreadyCompleted {
                        slot: slot.to_string(),
                    });
                }
                Err(e) => {
                    self.control().state.release();
                    return Err(e.into());
                }
            }
        }

        let result = self.run_attempts(slot, &cancel).await;
        self.finish(&result);
        result
    }

    fn begin(&self) -> Result<CancellationToken, CycleError> {
        let mut control = self.control();
        if let Err(e) = control.state.try_begin() {
            warn!("Trigger rejected: a harvest cycle is already running");
            return Err(e);
        }
        let cancel = CancellationToken::new();
        control.cancel = cancel.clone();
        Ok(cancel)
    }

    fn finish(&self, result: &Result<CycleReport, CycleError>) {
        let now = Utc::now();
        let snapshot = {
            let mut control = self.control();
            match result {
                Ok(report) if report.status == CycleStatus::Cancelled => control.state.release(),
                Ok(report) => control
                    .state
                    .complete(now, report.status == CycleStatus::Breached),
                Err(CycleError::Cancelled) => control.state.release(),
                Err(_) => control.state.fail(now),
            }
            control.state.next_run_at = Some(self.harvest_slot.next_after(now));
            control.state.clone()
        };

        if let Err(e) = self.with_storage(|s| s.save_schedule_state(&snapshot)) {
            error!(error = %e, "Failed to persist schedule state");
        }
    }

    async fn run_attempts(
        &self,
        slot: &str,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, CycleError> {
        let attempts = self.config.schedule.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(CycleError::Cancelled);
            }
            match self.run_cycle(slot, attempt, cancel).await {
                Ok(report) => return Ok(report),
                Err(e) => {
                    error!(slot, attempt, error = %e, "Harvest cycle attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                info!(
                    slot,
                    next_attempt = attempt + 1,
                    delay_secs = self.cycle_retry_delay.as_secs(),
                    "Retrying harvest cycle"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.cycle_retry_delay) => {}
                    _ = cancel.cancelled() => return Err(CycleError::Cancelled),
                }
            }
        }

        error!(slot, attempts, "Harvest cycle failed permanently");
        self.notify(Notice {
            at: Utc::now(),
            slot: slot.to_string(),
            problems: vec![format!(
                "Coleta falhou após {} tentativas: {}",
                attempts, last_error
            )],
            runs: Vec::new(),
        });
        Err(CycleError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    async fn run_cycle(
        &self,
        slot: &str,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let cycle_id =
            self.with_storage(|s| s.begin_cycle(slot, attempt, &self.config_hash, started_at))?;
        info!(
            cycle_id,
            slot,
            attempt,
            sources = self.adapters.len(),
            "Harvest cycle started"
        );

        let since = self
            .schedule_state()
            .last_run_at
            .map(|t| (t - ChronoDuration::days(SINCE_OVERLAP_DAYS)).date_naive());
        let semaphore = Arc::new(Semaphore::new(
            self.config.fetch.max_concurrent_sources.max(1),
        ));

        let mut tasks = JoinSet::new();
        for (source, adapter) in &self.adapters {
            let worker = SourceWorker {
                config: self.config.clone(),
                engine: self.engine.clone(),
                storage: self.storage.clone(),
                processor: self.processor.clone(),
                analyzer: self.analyzer.clone(),
                cycle_id,
                since,
                cancel: cancel.clone(),
            };
            let semaphore = semaphore.clone();
            let source = source.clone();
            let adapter = adapter.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return SourceOutcome::Skipped(source.id);
                };
                if worker.cancel.is_cancelled() {
                    return SourceOutcome::Skipped(source.id);
                }
                worker.harvest(source, adapter).await
            });
        }

        let mut runs = Vec::new();
        let mut crashed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(SourceOutcome::Finished(run)) => runs.push(run),
                Ok(SourceOutcome::Aborted(run, e)) => {
                    error!(source = %run.source_id, error = %e, "Source batch aborted by a storage failure");
                    runs.push(run);
                }
                Ok(SourceOutcome::Skipped(id)) => {
                    info!(source = %id, "Source skipped after stop request");
                }
                Err(e) => {
                    error!(cycle_id, error = %e, "Source worker crashed");
                    crashed.push(e.to_string());
                }
            }
        }
        runs.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let appended = self.with_storage(|s| runs.iter().try_for_each(|run| s.append_run(run)));
        if let Err(e) = appended {
            self.close_cycle(cycle_id, CycleStatus::Failed);
            return Err(e.into());
        }

        if cancel.is_cancelled() {
            self.close_cycle(cycle_id, CycleStatus::Cancelled);
            warn!(cycle_id, completed_sources = runs.len(), "Harvest cycle cancelled");
            return Ok(CycleReport {
                cycle_id,
                slot: slot.to_string(),
                attempt,
                status: CycleStatus::Cancelled,
                runs,
                problems: Vec::new(),
            });
        }

        if !crashed.is_empty() {
            self.close_cycle(cycle_id, CycleStatus::Failed);
            return Err(CycleError::Incomplete(crashed.join("; ")));
        }

        let problems = evaluate_thresholds(&runs, &self.config.alerts);
        let status = if problems.is_empty() {
            CycleStatus::Succeeded
        } else {
            CycleStatus::Breached
        };
        self.close_cycle(cycle_id, status);

        let (attempted, succeeded, failed) = alert::totals(&runs);
        info!(
            cycle_id,
            attempted,
            succeeded,
            failed,
            success_rate = ?success_rate(&runs),
            status = status.to_db_string(),
            "Harvest cycle finished"
        );
        for problem in &problems {
            warn!(cycle_id, "{}", problem);
        }

        self.notify(Notice {
            at: Utc::now(),
            slot: slot.to_string(),
            problems: problems.clone(),
            runs: runs.clone(),
        });

        Ok(CycleReport {
            cycle_id,
            slot: slot.to_string(),
            attempt,
            status,
            runs,
            problems,
        })
    }

    fn close_cycle(&self, cycle_id: i64, status: CycleStatus) {
        if let Err(e) = self.with_storage(|s| s.finish_cycle(cycle_id, status, Utc::now())) {
            error!(cycle_id, error = %e, "Failed to close cycle in the ledger");
        }
    }

    fn notify(&self, notice: Notice) {
        if let Some(handle) = alert::dispatch(self.alert_sink.clone(), &self.config.alerts, notice)
        {
            let mut pending = self
                .notifications
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    // ===== Maintenance =====

    /// Inspects schedule state and storage without running a cycle
    pub fn health_check(&self) -> Result<HealthReport, StorageError> {
        let now = Utc::now();
        let schedule = self.schedule_state();
        let since = now - ChronoDuration::days(RECENT_ACTIVITY_DAYS);

        let (total_documents, processed_documents, recent_documents, last_cycle, recent_runs) =
            self.with_storage(|s| {
                Ok((
                    s.count_raw()?,
                    s.count_processed()?,
                    s.count_fetched_since(since)?,
                    s.latest_cycle()?,
                    s.recent_runs(HEALTH_RECENT_RUNS)?,
                ))
            })?;

        let sources_active = recent_runs
            .iter()
            .filter(|run| run.succeeded_count > 0)
            .map(|run| run.source_id)
            .collect::<BTreeSet<SourceId>>()
            .len();

        Ok(HealthReport {
            checked_at: now,
            schedule,
            total_documents,
            processed_documents,
            recent_documents,
            sources_active,
            last_cycle_status: last_cycle.map(|c| c.status),
            recent_runs,
        })
    }

    /// Deletes documents older than `days-to-keep`, after an optional backup
    ///
    /// A failed pass is remembered so [`Self::retry_pending_retention`] can
    /// run it again after the next cycle.
    pub fn run_retention(&self, now: DateTime<Utc>) -> Result<RetentionReport, StorageError> {
        let result = self.retention_pass(now);
        self.retention_pending.store(result.is_err(), Ordering::SeqCst);
        result
    }

    /// True when the last retention pass failed
    pub fn retention_pending(&self) -> bool {
        self.retention_pending.load(Ordering::SeqCst)
    }

    /// Re-runs a failed retention pass; `None` when nothing is pending
    pub fn retry_pending_retention(
        &self,
        now: DateTime<Utc>,
    ) -> Option<Result<RetentionReport, StorageError>> {
        if !self.retention_pending() {
            return None;
        }
        info!("Retrying retention maintenance that failed earlier");
        Some(self.run_retention(now))
    }

    fn retention_pass(&self, now: DateTime<Utc>) -> Result<RetentionReport, StorageError> {
        let retention = &self.config.retention;

        let backup = match &retention.backup_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = Path::new(dir).join(format!(
                    "juris_harvest_backup_{}.db",
                    now.format("%Y%m%d_%H%M%S")
                ));
                self.with_storage(|s| s.backup_to(&path))?;
                info!(path = %path.display(), "Database backup written");
                Some(path)
            }
            None => None,
        };

        let window = ChronoDuration::days(i64::from(retention.days_to_keep));
        let (cutoff, deleted) = match now.checked_sub_signed(window) {
            Some(cutoff) => (cutoff, self.with_storage(|s| s.delete_older_than(cutoff))?),
            None => {
                warn!(
                    days_to_keep = retention.days_to_keep,
                    "Retention window starts before the earliest representable date; nothing to delete"
                );
                (DateTime::<Utc>::MIN_UTC, 0)
            }
        };
        info!(deleted, cutoff = %cutoff, "Retention pass finished");

        Ok(RetentionReport {
            cutoff,
            deleted,
            backup,
        })
    }

    /// Re-runs the processor over every stored raw document
    ///
    /// Existing enrichment annotations are kept; the analyzer is not called.
    pub fn reprocess_stored(&self) -> Result<ReprocessReport, StorageError> {
        let raws = self.with_storage(|s| s.list_raw(None))?;
        let mut report = ReprocessReport::default();

        for raw in &raws {
            let document_id = raw.document_id();
            let enrichment = self
                .with_storage(|s| s.get_processed(&document_id))?
                .and_then(|doc| doc.enrichment);

            match self.processor.process(raw, enrichment, Utc::now()) {
                Ok(doc) => {
                    self.with_storage(|s| s.upsert_processed(&doc))?;
                    report.processed += 1;
                }
                Err(e) => {
                    warn!(document = %document_id, error = %e, "Skipping document during reprocessing");
                    report.skipped += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            "Reprocessing finished"
        );
        Ok(report)
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_storage<T>(
        &self,
        f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut storage = lock(&self.storage)?;
        f(&mut storage)
    }
}

/// Threshold breaches for a finished cycle
///
/// A cycle that attempted nothing has no success rate, so only the error
/// count can breach.
pub fn evaluate_thresholds(runs: &[RunRecord], config: &AlertConfig) -> Vec<String> {
    let mut problems = Vec::new();
    let (_, _, failed) = alert::totals(runs);

    if let Some(rate) = success_rate(runs) {
        if rate < config.min_success_rate {
            problems.push(format!(
                "Taxa de sucesso {:.1}% abaixo do mínimo de {:.1}%",
                rate * 100.0,
                config.min_success_rate * 100.0
            ));
        }
    }
    if failed > config.max_error_count {
        problems.push(format!(
            "{} erros excedem o máximo de {}",
            failed, config.max_error_count
        ));
    }
    problems
}

fn success_rate(runs: &[RunRecord]) -> Option<f64> {
    let (attempted, succeeded, _) = alert::totals(runs);
    (attempted > 0).then(|| succeeded as f64 / attempted as f64)
}

enum SourceOutcome {
    Finished(RunRecord),
    /// The store failed; the record covers the documents handled before it
    Aborted(RunRecord, StorageError),
    Skipped(SourceId),
}

/// Everything a source task needs, owned so it can be spawned
struct SourceWorker {
    config: Arc<Config>,
    engine: Arc<FetchEngine>,
    storage: SharedStorage,
    processor: Arc<Processor>,
    analyzer: Option<Arc<dyn TextAnalyzer>>,
    cycle_id: i64,
    since: Option<NaiveDate>,
    cancel: CancellationToken,
}

impl SourceWorker {
    async fn harvest(self, source: SourceConfig, adapter: Arc<dyn SourceAdapter>) -> SourceOutcome {
        let started_at = Utc::now();
        let id = source.id;
        let options = FetchOptions::for_source(&self.config, &source, self.cancel.clone());
        let enrichment_timeout = Duration::from_secs(self.config.enrichment.timeout_secs);
        info!(source = %id, limit = source.limit, "Harvesting source");

        let mut listing = list_documents(
            adapter.clone(),
            self.engine.clone(),
            options.clone(),
            self.since,
            source.limit,
            source.max_pages,
        );
        let mut tally = Tally::default();
        let mut aborted = None;

        while !self.cancel.is_cancelled() {
            let Some(doc_ref) = listing.next().await else {
                break;
            };

            let raw = match adapter.fetch_detail(&self.engine, &options, &doc_ref).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(source = %id, url = %doc_ref.url, error = %e, "Document fetch failed");
                    tally.failure(e.kind(), e.to_string());
                    continue;
                }
            };

            let processed = match self
                .processor
                .process_enriched(
                    &raw,
                    self.analyzer.as_deref(),
                    enrichment_timeout,
                    Utc::now(),
                )
                .await
            {
                Ok(processed) => processed,
                Err(e) => {
                    warn!(source = %id, url = %raw.url, error = %e, "Document skipped by processor");
                    tally.failure("processor", e.to_string());
                    continue;
                }
            };

            match store_document(&self.storage, &raw, &processed) {
                Ok(outcome) => {
                    debug!(source = %id, document = %processed.document_id, ?outcome, "Document stored");
                    tally.success();
                }
                Err(e) => {
                    tally.failure("store", e.to_string());
                    aborted = Some(e);
                    break;
                }
            }
        }

        for entry in listing.malformed_entries() {
            tally.failure("malformed", format!("malformed listing entry: {}", entry));
        }
        for e in listing.page_errors() {
            tally.failure("listing", e.to_string());
        }

        let run = RunRecord::new(
            format!("{}-{}", self.cycle_id, id),
            Some(self.cycle_id),
            id,
            started_at,
            Utc::now(),
            tally.succeeded,
            tally.failed,
            tally.summary(),
        );
        info!(
            source = %id,
            succeeded = run.succeeded_count,
            failed = run.failed_count,
            "Source finished"
        );

        match aborted {
            Some(e) => SourceOutcome::Aborted(run, e),
            None => SourceOutcome::Finished(run),
        }
    }
}

fn store_document(
    storage: &SharedStorage,
    raw: &RawDocument,
    processed: &ProcessedDocument,
) -> StorageResult<UpsertOutcome> {
    let mut storage = lock(storage)?;
    let outcome = storage.upsert_raw(raw)?;
    storage.upsert_processed(processed)?;
    Ok(outcome)
}

/// Per-source counts and error classification
#[derive(Debug, Default)]
struct Tally {
    succeeded: u32,
    failed: u32,
    by_kind: BTreeMap<&'static str, u32>,
    last_error: Option<String>,
}

impl Tally {
    fn success(&mut self) {
        self.succeeded += 1;
    }

    fn failure(&mut self, kind: &'static str, message: String) {
        self.failed += 1;
        *self.by_kind.entry(kind).or_default() += 1;
        self.last_error = Some(message);
    }

    /// `"timeout: 2, parse: 1; last: <message>"`
    fn summary(&self) -> Option<String> {
        if self.by_kind.is_empty() {
            return None;
        }
        let counts = self
            .by_kind
            .iter()
            .map(|(kind, n)| format!("{}: {}", kind, n))
            .collect::<Vec<_>>()
            .join(", ");
        Some(match &self.last_error {
            Some(last) => {
                let last: String = last.chars().take(MAX_SUMMARY_ERROR_CHARS).collect();
                format!("{}; last: {}", counts, last)
            }
            None => counts,
        })
    }
}

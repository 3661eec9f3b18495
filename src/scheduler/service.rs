//! Long-running scheduler service
//!
//! One background task owns the timers: the weekly harvest slot, the weekly
//! retention slot and the health-check interval. Cycles run in their own
//! tasks so a manual trigger can be rejected while a scheduled cycle runs.

use crate::scheduler::calendar::WeeklySlot;
use crate::scheduler::orchestrator::{CycleReport, HealthReport, Orchestrator, RetentionReport};
use crate::storage::StorageError;
use crate::{ConfigError, CycleError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Control surface of a running scheduler service
pub struct SchedulerHandle {
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Runs a cycle now; rejected while another cycle is running
    pub async fn trigger(&self) -> Result<CycleReport, CycleError> {
        self.orchestrator.run_once().await
    }

    pub fn health_check(&self) -> Result<HealthReport, StorageError> {
        self.orchestrator.health_check()
    }

    /// Stops the running cycle without stopping the service
    pub fn stop_cycle(&self) {
        self.orchestrator.stop();
    }

    /// Stops the service, letting the running cycle wind down first
    pub async fn shutdown(self) {
        info!("Scheduler shutting down");
        self.shutdown.cancel();
        self.orchestrator.stop();
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
        self.orchestrator.flush_notifications().await;
    }
}

/// Starts the scheduler service on the current runtime
pub fn spawn(orchestrator: Arc<Orchestrator>) -> Result<SchedulerHandle, ConfigError> {
    let config = orchestrator.config();
    let retention_slot = if config.retention.enabled {
        Some(WeeklySlot::parse(
            &config.retention.day_of_week,
            &config.retention.time,
            &config.schedule.timezone,
        )?)
    } else {
        None
    };
    let health_interval =
        Duration::from_secs(config.schedule.health_check_interval_minutes.max(1).saturating_mul(60));

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(run_loop(
        orchestrator.clone(),
        retention_slot,
        health_interval,
        shutdown.clone(),
    ));

    Ok(SchedulerHandle {
        orchestrator,
        shutdown,
        task,
    })
}

async fn run_loop(
    orchestrator: Arc<Orchestrator>,
    retention_slot: Option<WeeklySlot>,
    health_interval: Duration,
    shutdown: CancellationToken,
) {
    let harvest_slot = orchestrator.harvest_slot();
    let now = Utc::now();
    let mut next_harvest = harvest_slot.next_after(now);
    let mut next_retention = retention_slot.map(|slot| slot.next_after(now));
    orchestrator.set_next_run(next_harvest);

    let mut health = tokio::time::interval(health_interval);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cycles = JoinSet::new();
    info!(
        next_harvest = %next_harvest,
        next_retention = ?next_retention,
        "Scheduler started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            _ = sleep_until(Some(next_harvest)) => {
                let slot = next_harvest;
                next_harvest = harvest_slot.next_after(slot);
                orchestrator.set_next_run(next_harvest);

                let orchestrator = orchestrator.clone();
                cycles.spawn(async move {
                    match orchestrator.run_scheduled(slot).await {
                        Ok(report) => info!(
                            slot = %report.slot,
                            status = report.status.to_db_string(),
                            "Scheduled cycle done"
                        ),
                        Err(CycleError::AlreadyRunning) => {
                            warn!(slot = %slot, "Scheduled cycle skipped; another cycle is running")
                        }
                        Err(e) => error!(slot = %slot, error = %e, "Scheduled cycle failed"),
                    }
                });
            }

            _ = sleep_until(next_retention) => {
                next_retention = retention_slot.zip(next_retention).map(|(s, at)| s.next_after(at));
                let orchestrator = orchestrator.clone();
                let result =
                    tokio::task::spawn_blocking(move || orchestrator.run_retention(Utc::now())).await;
                log_retention(result.map(Some));
            }

            _ = health.tick() => log_health(&orchestrator),

            Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Cycle task panicked");
                }
                if orchestrator.retention_pending() {
                    let orchestrator = orchestrator.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        orchestrator.retry_pending_retention(Utc::now())
                    })
                    .await;
                    log_retention(result);
                }
            }
        }
    }

    while let Some(joined) = cycles.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Cycle task panicked during shutdown");
        }
    }
    info!("Scheduler stopped");
}

fn log_retention(
    result: Result<Option<Result<RetentionReport, StorageError>>, tokio::task::JoinError>,
) {
    match result {
        Ok(Some(Ok(report))) => info!(deleted = report.deleted, "Retention maintenance done"),
        Ok(Some(Err(e))) => {
            error!(error = %e, "Retention maintenance failed; will retry after the next cycle")
        }
        Ok(None) => {}
        Err(e) => error!(error = %e, "Retention task panicked"),
    }
}

fn log_health(orchestrator: &Orchestrator) {
    match orchestrator.health_check() {
        Ok(report) => {
            info!(
                database = report.database_status(),
                activity = report.recent_activity(),
                total_documents = report.total_documents,
                recent_documents = report.recent_documents,
                sources_active = report.sources_active,
                consecutive_failures = report.schedule.consecutive_failure_count,
                running = report.schedule.is_running(),
                "Health check"
            );
            for summary in report.recent_errors().iter().take(5) {
                warn!(summary = %summary, "Recent source errors");
            }
        }
        Err(e) => error!(error = %e, "Health check failed"),
    }
}

/// Sleeps until `at`; never completes for `None`
async fn sleep_until(at: Option<DateTime<Utc>>) {
    match at {
        Some(at) => {
            let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending().await,
    }
}

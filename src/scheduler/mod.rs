//! Scheduler module
//!
//! Owns the harvest control loop:
//! - weekly slot arithmetic in a fixed offset (`calendar`)
//! - cycle execution, whole-cycle retries and threshold checks (`orchestrator`)
//! - email and webhook delivery (`alert`)
//! - the timer-driven background service and its handle (`service`)

pub mod alert;
pub mod calendar;
mod orchestrator;
mod service;

pub use alert::{AlertError, AlertSink, HttpAlertSink};
pub use calendar::WeeklySlot;
pub use orchestrator::{
    evaluate_thresholds, CycleReport, HealthReport, Orchestrator, ReprocessReport,
    RetentionReport,
};
pub use service::{spawn, SchedulerHandle};

use crate::CycleError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of the harvest cycle
///
/// `Idle -> Running -> (Succeeded | Failed)`; a finished phase is idle for
/// the purpose of accepting the next trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl CyclePhase {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Process-wide scheduler state
///
/// Owned by the orchestrator; only `last_run_at` and
/// `consecutive_failure_count` survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleState {
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub phase: CyclePhase,
    pub consecutive_failure_count: u32,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            last_run_at: None,
            next_run_at: None,
            phase: CyclePhase::Idle,
            consecutive_failure_count: 0,
        }
    }
}

impl ScheduleState {
    /// Rebuilds state from the persisted fields
    pub fn restored(last_run_at: Option<DateTime<Utc>>, consecutive_failure_count: u32) -> Self {
        Self {
            last_run_at,
            consecutive_failure_count,
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == CyclePhase::Running
    }

    /// Checks and sets the running flag in one step
    pub fn try_begin(&mut self) -> Result<(), CycleError> {
        if self.is_running() {
            return Err(CycleError::AlreadyRunning);
        }
        self.phase = CyclePhase::Running;
        Ok(())
    }

    /// Closes a completed cycle, updating the breach counter
    pub fn complete(&mut self, ended_at: DateTime<Utc>, breached: bool) {
        self.last_run_at = Some(ended_at);
        if breached {
            self.consecutive_failure_count += 1;
            self.phase = CyclePhase::Failed;
        } else {
            self.consecutive_failure_count = 0;
            self.phase = CyclePhase::Succeeded;
        }
    }

    /// Closes a cycle whose retries were exhausted
    pub fn fail(&mut self, ended_at: DateTime<Utc>) {
        self.last_run_at = Some(ended_at);
        self.consecutive_failure_count += 1;
        self.phase = CyclePhase::Failed;
    }

    /// Releases the running flag without touching counters
    pub fn release(&mut self) {
        if self.is_running() {
            self.phase = CyclePhase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_rejected() {
        let mut state = ScheduleState::default();
        assert!(state.try_begin().is_ok());
        assert!(matches!(state.try_begin(), Err(CycleError::AlreadyRunning)));
    }

    #[test]
    fn test_breach_counter() {
        let mut state = ScheduleState::default();
        let now = Utc::now();

        state.try_begin().unwrap();
        state.complete(now, true);
        state.try_begin().unwrap();
        state.complete(now, true);
        assert_eq!(state.consecutive_failure_count, 2);
        assert_eq!(state.phase, CyclePhase::Failed);

        state.try_begin().unwrap();
        state.complete(now, false);
        assert_eq!(state.consecutive_failure_count, 0);
        assert_eq!(state.phase, CyclePhase::Succeeded);
        assert_eq!(state.last_run_at, Some(now));
    }

    #[test]
    fn test_release_keeps_counters() {
        let mut state = ScheduleState::restored(None, 3);
        state.try_begin().unwrap();
        state.release();
        assert!(!state.is_running());
        assert_eq!(state.consecutive_failure_count, 3);
        assert!(state.last_run_at.is_none());
    }

    #[test]
    fn test_phase_db_roundtrip() {
        for phase in [
            CyclePhase::Idle,
            CyclePhase::Running,
            CyclePhase::Succeeded,
            CyclePhase::Failed,
        ] {
            assert_eq!(CyclePhase::from_db_string(phase.to_db_string()), Some(phase));
        }
        assert_eq!(CyclePhase::from_db_string("paused"), None);
    }
}

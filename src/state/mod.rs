//! State module for harvest progress
//!
//! # Components
//!
//! - `HostState`: per-host request pacing used by the fetch engine gate
//! - `ScheduleState`: the single-owner scheduler state and its `CyclePhase`

mod host_state;
mod schedule_state;

pub use host_state::HostState;
pub use schedule_state::{CyclePhase, ScheduleState};

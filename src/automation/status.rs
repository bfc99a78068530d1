//! Status reporting
//!
//! Read-only projection of the controller's internal state into a snapshot
//! for external polling. Cheap and synchronous; safe to poll at any rate.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::controller::{RunState, Shared};

/// Automation state machine label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Preparing,
    Running,
    Waiting,
    Completed,
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub success_sessions: u64,
    pub failed_sessions: u64,
    /// Size of the live session-record registry.
    pub active_sessions: usize,
    /// `round(completed / total * 100)`, 0 when no run is configured.
    pub progress: u32,
    pub active_session_details: Vec<ActiveProfileDetail>,
    pub state: RunPhase,
    pub stop_requested: bool,
    pub current_cycle: u32,
    pub profiles_per_cycle: u64,
}

/// Timing detail for one in-flight profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveProfileDetail {
    pub session_index: u64,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub wait_time_secs: u64,
    pub cycle: u32,
}

/// Percentage progress with round-half-up semantics.
pub fn progress_percent(completed: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u32
}

/// Remaining dwell time for an active profile, floored at zero.
pub fn remaining_secs(wait_time: Duration, elapsed: Duration) -> u64 {
    let remaining = wait_time.as_secs_f64() - elapsed.as_secs_f64();
    remaining.ceil().max(0.0) as u64
}

/// Build a snapshot from the current run state.
pub(crate) fn capture(state: &RunState) -> StatusSnapshot {
    let mut details: Vec<ActiveProfileDetail> = state
        .registry
        .iter()
        .map(|(index, record)| {
            let elapsed = record.started_at.elapsed();
            ActiveProfileDetail {
                session_index: *index,
                elapsed_secs: elapsed.as_secs(),
                remaining_secs: remaining_secs(record.wait_time, elapsed),
                wait_time_secs: record.wait_time.as_secs(),
                cycle: record.cycle,
            }
        })
        .collect();
    details.sort_by_key(|d| d.session_index);

    StatusSnapshot {
        total_sessions: state.total,
        completed_sessions: state.completed,
        success_sessions: state.success,
        failed_sessions: state.failed,
        active_sessions: state.registry.len(),
        progress: progress_percent(state.completed, state.total),
        active_session_details: details,
        state: state.phase,
        stop_requested: state.stop.is_cancelled(),
        current_cycle: state.current_cycle,
        profiles_per_cycle: state.profiles_per_cycle,
    }
}

/// Read-only status view over the controller's shared state.
///
/// A cached terminal snapshot, when present, is consumed by exactly one
/// report so a final poll can still observe the 100%-complete state.
#[derive(Clone)]
pub struct StatusReporter {
    pub(crate) shared: Arc<Shared>,
}

impl StatusReporter {
    pub fn report(&self) -> StatusSnapshot {
        let mut state = self.shared.state.lock();
        if let Some(terminal) = state.terminal.take() {
            return terminal;
        }
        capture(&state)
    }
}

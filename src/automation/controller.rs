//! Automation controller
//!
//! Top-level state machine: sequences cycles, owns the aggregate counters,
//! the session-record registry, the active session set, and the stop token.
//! Exposes the start/stop/status boundary operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::activity::ActivityLog;
use crate::engine::{CapabilityRegistry, EngineSession};
use crate::fingerprint::FingerprintGenerator;

use super::config::{
    ConfigError, RunConfig, BULK_STOP_CEILING, INTER_CYCLE_DELAY, SESSION_CLOSE_GRACE,
};
use super::coordinator::CycleCoordinator;
use super::profile::Outcome;
use super::status::{self, RunPhase, StatusReporter, StatusSnapshot};

/// Tracking data for one in-flight session, keyed by global index.
pub(crate) struct SessionRecord {
    /// Captured after successful navigation, not at launch.
    pub started_at: tokio::time::Instant,
    pub wait_time: Duration,
    pub cycle: u32,
    #[allow(dead_code)]
    pub url_index: usize,
    #[allow(dead_code)]
    pub profile_no: u32,
}

/// All mutable run state, guarded by one mutex.
///
/// Mutated from many concurrently-running profile tasks; nothing here is
/// touched while holding the lock across an await point.
pub(crate) struct RunState {
    pub phase: RunPhase,
    pub total: u64,
    pub completed: u64,
    pub success: u64,
    pub failed: u64,
    pub current_cycle: u32,
    pub profiles_per_cycle: u64,
    /// Session records, inserted only after the page has loaded.
    pub registry: HashMap<u64, SessionRecord>,
    /// Live engine handles, inserted at launch; drives bulk teardown on stop.
    pub active: HashMap<u64, Arc<dyn EngineSession>>,
    /// Final counts cached for exactly one status poll after a run ends.
    pub terminal: Option<StatusSnapshot>,
    /// Stop token; replaced only at the start of a new run.
    pub stop: CancellationToken,
}

impl RunState {
    fn with_token(stop: CancellationToken) -> Self {
        Self {
            phase: RunPhase::Idle,
            total: 0,
            completed: 0,
            success: 0,
            failed: 0,
            current_cycle: 0,
            profiles_per_cycle: 0,
            registry: HashMap::new(),
            active: HashMap::new(),
            terminal: None,
            stop,
        }
    }

    fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }
}

/// Shared handle to the run state, cloned into every profile task.
pub(crate) struct Shared {
    pub state: Mutex<RunState>,
}

impl Shared {
    pub(crate) fn register_session(&self, index: u64, session: Arc<dyn EngineSession>) {
        self.state.lock().active.insert(index, session);
    }

    pub(crate) fn register_record(&self, index: u64, record: SessionRecord) {
        let mut state = self.state.lock();
        state.registry.insert(index, record);
        if state.phase == RunPhase::Preparing {
            state.phase = RunPhase::Running;
        }
    }

    /// Remove a profile from both tracking structures. Idempotent; returns
    /// the active handle if it was still present.
    pub(crate) fn remove_tracking(&self, index: u64) -> Option<Arc<dyn EngineSession>> {
        let mut state = self.state.lock();
        state.registry.remove(&index);
        state.active.remove(&index)
    }

    /// Count one terminal profile. Callers gate this behind the profile's
    /// completion latch so it runs exactly once per profile.
    pub(crate) fn record_outcome(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        state.completed += 1;
        match outcome {
            Outcome::Success => state.success += 1,
            Outcome::Failed => state.failed += 1,
        }
    }
}

/// Collaborators handed to every profile runner.
#[derive(Clone)]
pub struct ControllerDeps {
    pub capabilities: Arc<CapabilityRegistry>,
    pub fingerprints: Arc<FingerprintGenerator>,
    pub activity: Arc<ActivityLog>,
}

/// Top-level automation state machine.
pub struct AutomationController {
    shared: Arc<Shared>,
    deps: ControllerDeps,
}

impl AutomationController {
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::new()),
            }),
            deps,
        }
    }

    /// Read-only status view.
    pub fn reporter(&self) -> StatusReporter {
        StatusReporter {
            shared: self.shared.clone(),
        }
    }

    /// Current status snapshot. Cheap and synchronous.
    pub fn status(&self) -> StatusSnapshot {
        self.reporter().report()
    }

    /// Validate the configuration and start a run in the background.
    ///
    /// Validation happens synchronously; the run itself proceeds after this
    /// returns. A new run overwrites any previous one: the old stop token is
    /// cancelled so in-flight sessions unwind as stopped profiles.
    pub fn start_run(&self, config: RunConfig) -> Result<(), ConfigError> {
        config.validate()?;

        let token = CancellationToken::new();
        {
            let mut state = self.shared.state.lock();
            state.stop.cancel();
            *state = RunState::with_token(token.clone());
            state.phase = RunPhase::Preparing;
            state.total = config.total_sessions();
            state.profiles_per_cycle = config.profiles_per_cycle();
            state.current_cycle = 1;
        }

        self.deps.activity.emit(&format!(
            "Starting run: {} cycles x {} profiles x {} URLs = {} sessions",
            config.cycles,
            config.profiles_per_url,
            config.urls.len(),
            config.total_sessions()
        ));

        tokio::spawn(run_loop(
            self.shared.clone(),
            self.deps.clone(),
            config,
            token,
        ));
        Ok(())
    }

    /// Request a stop. Idempotent and safe to call when idle.
    ///
    /// Sets the stop token and separately force-closes every live session so
    /// hung navigations cannot hold the run open.
    pub fn request_stop(&self) {
        let token = { self.shared.state.lock().stop.clone() };
        if token.is_cancelled() {
            return;
        }
        token.cancel();
        self.deps.activity.emit("Stop automation requested...");

        tokio::spawn(close_all_active(
            self.shared.clone(),
            self.deps.activity.clone(),
        ));
    }

    /// Force-close every live session. Bounded per session and overall.
    pub async fn stop_all_sessions(&self) {
        close_all_active(self.shared.clone(), self.deps.activity.clone()).await;
    }

    #[cfg(test)]
    pub(crate) fn active_handle_count(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    #[cfg(test)]
    pub(crate) fn registry_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }
}

/// Sequence the cycles of one run.
async fn run_loop(
    shared: Arc<Shared>,
    deps: ControllerDeps,
    config: RunConfig,
    token: CancellationToken,
) {
    let total_cycles = config.cycles;

    for cycle in 1..=total_cycles {
        {
            let mut state = shared.state.lock();
            state.current_cycle = cycle;
            if cycle > 1 {
                state.phase = RunPhase::Running;
            }
        }

        if token.is_cancelled() {
            deps.activity
                .emit(&format!("Stopping automation - cycle {} cancelled", cycle));
            break;
        }

        deps.activity
            .emit(&format!("Starting cycle {}/{}", cycle, total_cycles));
        CycleCoordinator::run_cycle(&shared, &deps, &config, cycle, &token).await;

        if token.is_cancelled() {
            deps.activity
                .emit(&format!("Stopping automation after cycle {}", cycle));
            break;
        }
        deps.activity.emit(&format!("Cycle {} completed", cycle));

        if cycle < total_cycles {
            {
                // Sessions from the finished cycle are already torn down;
                // clear proactively so status shows a quiet between-cycles state.
                let mut state = shared.state.lock();
                state.phase = RunPhase::Waiting;
                state.registry.clear();
                state.active.clear();
            }
            deps.activity.emit(&format!(
                "Waiting {}s before cycle {}...",
                INTER_CYCLE_DELAY.as_secs(),
                cycle + 1
            ));
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(INTER_CYCLE_DELAY) => {}
            }
        }
    }

    if token.is_cancelled() {
        deps.activity.emit("Automation stopped by user request");
    } else {
        deps.activity
            .emit(&format!("All {} cycles completed", total_cycles));
    }

    // Cache the terminal snapshot, then reset to idle. The snapshot is
    // consumed by exactly one subsequent status poll.
    let mut state = shared.state.lock();
    state.phase = RunPhase::Completed;
    let snapshot = status::capture(&state);
    let token_keep = state.stop.clone();
    *state = RunState::with_token(token_keep);
    state.terminal = Some(snapshot);
}

/// Bulk-close every handle in the active set: graceful close with a per-
/// session grace period, escalating to a kill, all under an overall ceiling.
async fn close_all_active(shared: Arc<Shared>, activity: Arc<ActivityLog>) {
    let handles: Vec<(u64, Arc<dyn EngineSession>)> = {
        let state = shared.state.lock();
        state.active.iter().map(|(k, v)| (*k, v.clone())).collect()
    };
    if handles.is_empty() {
        return;
    }

    activity.emit(&format!("Closing {} active sessions...", handles.len()));

    let closes = handles.into_iter().map(|(index, session)| async move {
        match tokio::time::timeout(SESSION_CLOSE_GRACE, session.close()).await {
            Ok(Ok(())) => debug!("Session {} closed", index),
            Ok(Err(err)) => {
                warn!("Session {} close failed ({}), force killing", index, err);
                session.kill().await;
            }
            Err(_) => {
                warn!("Session {} close timed out, force killing", index);
                session.kill().await;
            }
        }
    });

    if tokio::time::timeout(BULK_STOP_CEILING, futures::future::join_all(closes))
        .await
        .is_err()
    {
        warn!(
            "Bulk session close exceeded the {}s ceiling",
            BULK_STOP_CEILING.as_secs()
        );
    }

    shared.state.lock().active.clear();
    activity.emit("All active sessions closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockConfig, MockLauncher, MockStats};
    use crate::engine::Capability;
    use crate::fingerprint::DeviceCategory;
    use std::sync::atomic::Ordering;

    fn test_controller(mock: MockConfig) -> (AutomationController, Arc<MockStats>) {
        let stats = Arc::new(MockStats::default());
        let launcher = Arc::new(MockLauncher::with_config("chromium", mock, stats.clone()));
        let registry = CapabilityRegistry::new(vec![Capability::new("chromium", launcher)]);
        let deps = ControllerDeps {
            capabilities: Arc::new(registry),
            fingerprints: Arc::new(FingerprintGenerator::new()),
            activity: Arc::new(ActivityLog::new()),
        };
        (AutomationController::new(deps), stats)
    }

    fn test_config() -> RunConfig {
        RunConfig {
            urls: vec!["https://example.com".to_string()],
            engine: "chromium".to_string(),
            cycles: 1,
            profiles_per_url: 1,
            nav_timeout_secs: 30,
            min_wait_secs: 30,
            max_wait_secs: 31,
            device_category: DeviceCategory::Desktop,
            proxy_url: None,
        }
    }

    async fn wait_for_terminal(controller: &AutomationController) -> StatusSnapshot {
        for _ in 0..50_000 {
            let snapshot = controller.status();
            if snapshot.state == RunPhase::Completed {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        panic!("run did not reach a terminal state");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_profile_run_completes() {
        let (controller, stats) = test_controller(MockConfig::default());
        controller.start_run(test_config()).unwrap();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.total_sessions, 1);
        assert_eq!(terminal.completed_sessions, 1);
        assert_eq!(terminal.success_sessions, 1);
        assert_eq!(terminal.failed_sessions, 0);
        assert_eq!(terminal.progress, 100);
        assert_eq!(terminal.active_sessions, 0);

        // Terminal snapshot is consumed exactly once; idle resumes after it.
        let idle = controller.status();
        assert_eq!(idle.state, RunPhase::Idle);
        assert_eq!(idle.total_sessions, 0);
        assert_eq!(idle.progress, 0);

        assert_eq!(stats.launched.load(Ordering::SeqCst), 1);
        assert_eq!(stats.sessions_closed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.init_scripts.load(Ordering::SeqCst), 1);
        assert_eq!(controller.active_handle_count(), 0);
        assert_eq!(controller.registry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_cycle_multi_url_totals() {
        let (controller, stats) = test_controller(MockConfig::default());
        let config = RunConfig {
            urls: vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ],
            cycles: 2,
            profiles_per_url: 3,
            ..test_config()
        };
        controller.start_run(config).unwrap();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.total_sessions, 12);
        assert_eq!(terminal.completed_sessions, 12);
        assert_eq!(
            terminal.completed_sessions,
            terminal.success_sessions + terminal.failed_sessions
        );
        assert_eq!(terminal.success_sessions, 12);
        assert_eq!(stats.launched.load(Ordering::SeqCst), 12);
        assert_eq!(controller.active_handle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_flight_fails_all_profiles() {
        let mock = MockConfig {
            nav_delay: Duration::from_secs(60),
            ..MockConfig::default()
        };
        let (controller, _stats) = test_controller(mock);
        let config = RunConfig {
            profiles_per_url: 2,
            ..test_config()
        };
        controller.start_run(config).unwrap();

        // Let both profiles get into their (slow) navigations, then stop.
        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.request_stop();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.total_sessions, 2);
        assert_eq!(terminal.success_sessions, 0);
        assert_eq!(terminal.failed_sessions, 2);
        assert_eq!(terminal.completed_sessions, 2);
        assert_eq!(terminal.active_sessions, 0);
        assert_eq!(controller.active_handle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_cycle_skips_everything() {
        let (controller, stats) = test_controller(MockConfig::default());
        controller.start_run(test_config()).unwrap();
        // The run task has not been polled yet; the stop lands first.
        controller.request_stop();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.completed_sessions, 0);
        assert_eq!(terminal.failed_sessions, 0);
        assert_eq!(stats.launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_timeout_is_classified_failure() {
        let mock = MockConfig {
            nav_delay: Duration::from_secs(200),
            ..MockConfig::default()
        };
        let (controller, stats) = test_controller(mock);
        let activity = controller.deps.activity.clone();
        controller.start_run(test_config()).unwrap();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.failed_sessions, 1);
        assert_eq!(terminal.success_sessions, 0);
        // The dwell/interaction phase never started.
        assert_eq!(stats.evaluations.load(Ordering::SeqCst), 0);
        assert!(activity
            .dump()
            .contains("did not load within 30 seconds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dns_failure_message() {
        let mock = MockConfig {
            nav_error: Some("net::ERR_NAME_NOT_RESOLVED".to_string()),
            ..MockConfig::default()
        };
        let (controller, _stats) = test_controller(mock);
        let activity = controller.deps.activity.clone();
        controller.start_run(test_config()).unwrap();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.failed_sessions, 1);
        assert!(activity.dump().contains("DNS error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_counts_one_failed() {
        let mock = MockConfig {
            launch_error: Some("binary not found".to_string()),
            ..MockConfig::default()
        };
        let (controller, stats) = test_controller(mock);
        controller.start_run(test_config()).unwrap();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.failed_sessions, 1);
        assert_eq!(terminal.completed_sessions, 1);
        assert_eq!(stats.sessions_closed.load(Ordering::SeqCst), 0);
        assert_eq!(controller.active_handle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_engine_fails_profile_only() {
        let (controller, stats) = test_controller(MockConfig::default());
        let config = RunConfig {
            engine: "webkit".to_string(),
            ..test_config()
        };
        controller.start_run(config).unwrap();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.failed_sessions, 1);
        assert_eq!(terminal.completed_sessions, 1);
        assert_eq!(stats.launched.load(Ordering::SeqCst), 0);

        // The controller stays usable for a fresh run.
        controller.start_run(test_config()).unwrap();
        let second = wait_for_terminal(&controller).await;
        assert_eq!(second.success_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_and_normal_path_count_exactly_once() {
        // Slow evaluations push the interaction past the dwell deadline, so
        // the deadline handler races the main path for completion.
        let mock = MockConfig {
            eval_delay: Duration::from_secs(10),
            ..MockConfig::default()
        };
        let (controller, _stats) = test_controller(mock);
        controller.start_run(test_config()).unwrap();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(terminal.completed_sessions, 1);
        assert_eq!(terminal.success_sessions, 1);
        assert_eq!(terminal.failed_sessions, 0);
        assert_eq!(controller.active_handle_count(), 0);
        assert_eq!(controller.registry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_stop_is_idempotent() {
        let mock = MockConfig {
            nav_delay: Duration::from_secs(60),
            ..MockConfig::default()
        };
        let (controller, _stats) = test_controller(mock);
        controller.start_run(test_config()).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.request_stop();
        controller.request_stop();
        controller.request_stop();

        let terminal = wait_for_terminal(&controller).await;
        assert_eq!(
            terminal.completed_sessions,
            terminal.success_sessions + terminal.failed_sessions
        );

        // Safe when idle, too.
        controller.request_stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_rejected_before_any_session() {
        let (controller, stats) = test_controller(MockConfig::default());
        let config = RunConfig {
            cycles: 5,
            profiles_per_url: 41,
            ..test_config()
        };
        assert!(matches!(
            controller.start_run(config),
            Err(ConfigError::TooManySessions(205))
        ));
        assert_eq!(stats.launched.load(Ordering::SeqCst), 0);
        assert_eq!(controller.status().state, RunPhase::Idle);
    }
}

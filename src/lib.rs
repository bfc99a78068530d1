//! Footfall
//!
//! Concurrent browser-profile automation: disposable, fingerprint-spoofed
//! sessions visit target URLs for randomized dwell times with human-like
//! scrolling, grouped into repeated cycles, with live status reporting and
//! cooperative stop.

pub mod activity;
pub mod automation;
pub mod engine;
pub mod fingerprint;
pub mod interaction;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

use activity::ActivityLog;
use automation::{AutomationController, ControllerDeps};
use engine::CapabilityRegistry;
use fingerprint::FingerprintGenerator;

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("footfall").join("logs"))
}

/// Application state shared across the server.
pub struct AppState {
    /// The automation controller
    pub controller: Arc<AutomationController>,
    /// Operator-facing activity log
    pub activity: Arc<ActivityLog>,
}

impl AppState {
    /// Create application state with the default CDP capability registry.
    pub fn new() -> Self {
        let activity = Arc::new(ActivityLog::new());

        let deps = ControllerDeps {
            capabilities: Arc::new(CapabilityRegistry::cdp_default()),
            fingerprints: Arc::new(FingerprintGenerator::new()),
            activity: activity.clone(),
        };

        Self {
            controller: Arc::new(AutomationController::new(deps)),
            activity,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging: console plus a daily rolling file when a log
/// directory is available.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "footfall.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

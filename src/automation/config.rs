//! Run configuration
//!
//! Immutable per-run settings, validated synchronously before any session
//! starts, plus the fixed lifecycle constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::DeviceCategory;

/// Hard ceiling on sessions per run; configurations beyond it are rejected.
pub const MAX_TOTAL_SESSIONS: u64 = 200;

/// Delay between cycles.
pub const INTER_CYCLE_DELAY: Duration = Duration::from_secs(5);

/// Chunk size for cancellable waits.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period per session before a graceful close escalates to a kill.
pub const SESSION_CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Ceiling on the whole bulk-close operation during a stop.
pub const BULK_STOP_CEILING: Duration = Duration::from_secs(10);

/// Dwell times above this get a fixed warm-up delay before interaction.
pub const WARMUP_THRESHOLD_SECS: u64 = 10;

/// Warm-up delay subtracted from the interaction budget.
pub const WARMUP_DELAY_SECS: u64 = 5;

/// Immutable configuration for one automation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    /// Ordered list of target URLs.
    pub urls: Vec<String>,
    /// Capability selector: a concrete name or "random".
    pub engine: String,
    /// Number of sequential cycles.
    pub cycles: u32,
    /// Profiles opened per URL per cycle.
    pub profiles_per_url: u32,
    /// Per-navigation timeout in seconds.
    pub nav_timeout_secs: u64,
    /// Lower dwell bound in seconds.
    pub min_wait_secs: u64,
    /// Upper dwell bound in seconds.
    pub max_wait_secs: u64,
    /// Device category fingerprints are drawn for.
    pub device_category: DeviceCategory,
    /// Upstream proxy; drives the geo-timezone lookup and the engine proxy flag.
    pub proxy_url: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            engine: "random".to_string(),
            cycles: 1,
            profiles_per_url: 1,
            nav_timeout_secs: 30,
            min_wait_secs: 45,
            max_wait_secs: 55,
            device_category: DeviceCategory::Desktop,
            proxy_url: None,
        }
    }
}

/// Configuration validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("At least one target URL is required")]
    NoUrls,

    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("Cycle count must be between 1 and 20, got {0}")]
    CyclesOutOfRange(u32),

    #[error("Profiles per URL must be at least 1")]
    NoProfiles,

    #[error("Navigation timeout must be between 30 and 120 seconds, got {0}")]
    NavTimeoutOutOfRange(u64),

    #[error("Wait bounds must lie between 30 and 230 seconds, got {0}-{1}")]
    WaitOutOfRange(u64, u64),

    #[error("Minimum wait must be below maximum wait ({0} >= {1})")]
    WaitBoundsInverted(u64, u64),

    #[error("{0} sessions would exceed the ceiling of 200")]
    TooManySessions(u64),
}

impl RunConfig {
    /// Validate all bounds. Runs synchronously before any session starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.urls.is_empty() {
            return Err(ConfigError::NoUrls);
        }
        for raw in &self.urls {
            let parsed = url::Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.clone()))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidUrl(raw.clone()));
            }
        }

        if self.cycles < 1 || self.cycles > 20 {
            return Err(ConfigError::CyclesOutOfRange(self.cycles));
        }
        if self.profiles_per_url < 1 {
            return Err(ConfigError::NoProfiles);
        }
        if self.nav_timeout_secs < 30 || self.nav_timeout_secs > 120 {
            return Err(ConfigError::NavTimeoutOutOfRange(self.nav_timeout_secs));
        }

        let wait_ok = |secs: u64| (30..=230).contains(&secs);
        if !wait_ok(self.min_wait_secs) || !wait_ok(self.max_wait_secs) {
            return Err(ConfigError::WaitOutOfRange(self.min_wait_secs, self.max_wait_secs));
        }
        if self.min_wait_secs >= self.max_wait_secs {
            return Err(ConfigError::WaitBoundsInverted(self.min_wait_secs, self.max_wait_secs));
        }

        let total = self.total_sessions();
        if total > MAX_TOTAL_SESSIONS {
            return Err(ConfigError::TooManySessions(total));
        }

        Ok(())
    }

    /// Sessions launched per cycle.
    pub fn profiles_per_cycle(&self) -> u64 {
        self.profiles_per_url as u64 * self.urls.len() as u64
    }

    /// Total sessions across the whole run.
    pub fn total_sessions(&self) -> u64 {
        self.cycles as u64 * self.profiles_per_cycle()
    }
}

/// Cycle-relative index of a profile, for human-readable reporting only.
pub fn cycle_relative_index(global_index: u64, profiles_per_cycle: u64) -> u64 {
    if profiles_per_cycle == 0 {
        return global_index;
    }
    ((global_index - 1) % profiles_per_cycle) + 1
}

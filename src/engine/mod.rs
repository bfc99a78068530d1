//! Browser engine boundary
//!
//! Abstract capability interface over the underlying page-automation engine:
//! launching isolated session instances, creating fingerprint-parameterized
//! contexts and pages, navigation and script evaluation. The concrete
//! implementation drives Chromium-family binaries over CDP; tests substitute
//! a scriptable mock.

mod capability;
mod cdp;
mod errors;

#[cfg(test)]
pub mod mock;

pub use capability::{Capability, CapabilityRegistry, EngineLauncher};
pub use cdp::CdpLauncher;
pub use errors::EngineError;

use std::sync::Arc;
use async_trait::async_trait;

/// Options applied when launching a session instance.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Upstream proxy URL forwarded to the engine.
    pub proxy: Option<String>,
    /// Outer window width in pixels.
    pub window_width: u32,
    /// Outer window height in pixels.
    pub window_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            proxy: None,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

/// Fingerprint-derived parameters for an isolated context.
///
/// The CDP engine has no playwright-style context objects; each session
/// instance is already private to one profile, and these options become
/// emulation overrides on every page the context creates.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub user_agent: String,
    pub platform: String,
    pub accept_language: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub timezone: String,
    pub is_mobile: bool,
    pub has_touch: bool,
}

/// One launched engine instance, owned by a single profile.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Session identifier for logging.
    fn id(&self) -> &str;

    /// Whether the engine connection is still up.
    fn is_alive(&self) -> bool;

    /// Create an isolated context parameterized by a fingerprint.
    async fn new_context(&self, opts: ContextOptions) -> Result<Arc<dyn EngineContext>, EngineError>;

    /// Gracefully close the instance. Safe to call more than once.
    async fn close(&self) -> Result<(), EngineError>;

    /// Force-terminate the instance without waiting for a graceful shutdown.
    async fn kill(&self);
}

/// An isolated context within a session instance.
#[async_trait]
pub trait EngineContext: Send + Sync {
    /// Open a page in this context.
    async fn new_page(&self) -> Result<Arc<dyn EnginePage>, EngineError>;

    /// Close the context. Safe to call more than once.
    async fn close(&self) -> Result<(), EngineError>;
}

/// A single page within a context.
#[async_trait]
pub trait EnginePage: Send + Sync {
    /// Whether the page has been closed (by this handle or out from under it).
    fn is_closed(&self) -> bool;

    /// Register a script evaluated in every new document before any page script runs.
    async fn add_init_script(&self, source: &str) -> Result<(), EngineError>;

    /// Navigate to a URL and wait for the load to settle.
    async fn goto(&self, url: &str) -> Result<(), EngineError>;

    /// Evaluate a script in the page, awaiting promises, and return its value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, EngineError>;

    /// Close the page. Safe to call more than once.
    async fn close(&self) -> Result<(), EngineError>;
}

//! Scriptable in-process engine for tests
//!
//! Implements the capability traits without a real browser so the full
//! profile lifecycle can run under `tokio::time::pause`. Behavior (launch
//! failures, navigation latency and errors) is driven by `MockConfig`;
//! `MockStats` counts what actually happened for assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ContextOptions, EngineContext, EngineError, EngineLauncher, EnginePage, EngineSession,
    LaunchOptions,
};

/// Scripted behavior for mock sessions.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Fail every launch with this message.
    pub launch_error: Option<String>,
    /// Simulated navigation latency.
    pub nav_delay: Duration,
    /// Fail every navigation with this error text (after the delay).
    pub nav_error: Option<String>,
    /// Simulated script-evaluation latency.
    pub eval_delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            launch_error: None,
            nav_delay: Duration::from_millis(100),
            nav_error: None,
            eval_delay: Duration::from_millis(50),
        }
    }
}

/// Counters of everything the mock engine was asked to do.
#[derive(Debug, Default)]
pub struct MockStats {
    pub launched: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub sessions_killed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub navigations: AtomicUsize,
    pub evaluations: AtomicUsize,
    pub init_scripts: AtomicUsize,
}

pub struct MockLauncher {
    name: String,
    config: MockConfig,
    stats: Arc<MockStats>,
}

impl MockLauncher {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, MockConfig::default(), Arc::new(MockStats::default()))
    }

    pub fn with_config(name: impl Into<String>, config: MockConfig, stats: Arc<MockStats>) -> Self {
        Self {
            name: name.into(),
            config,
            stats,
        }
    }

}

#[async_trait]
impl EngineLauncher for MockLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn launch(&self, _opts: LaunchOptions) -> Result<Arc<dyn EngineSession>, EngineError> {
        if let Some(ref message) = self.config.launch_error {
            return Err(EngineError::LaunchFailed(message.clone()));
        }

        let ordinal = self.stats.launched.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(MockSession {
            id: format!("mock-{}-{}", self.name, ordinal),
            config: self.config.clone(),
            stats: self.stats.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockSession {
    id: String,
    config: MockConfig,
    stats: Arc<MockStats>,
    closed: AtomicBool,
}

#[async_trait]
impl EngineSession for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    async fn new_context(&self, _opts: ContextOptions) -> Result<Arc<dyn EngineContext>, EngineError> {
        if !self.is_alive() {
            return Err(EngineError::ConnectionLost("mock session closed".into()));
        }
        Ok(Arc::new(MockContext {
            config: self.config.clone(),
            stats: self.stats.clone(),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn kill(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.sessions_killed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct MockContext {
    config: MockConfig,
    stats: Arc<MockStats>,
}

#[async_trait]
impl EngineContext for MockContext {
    async fn new_page(&self) -> Result<Arc<dyn EnginePage>, EngineError> {
        self.stats.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockPage {
            config: self.config.clone(),
            stats: self.stats.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

struct MockPage {
    config: MockConfig,
    stats: Arc<MockStats>,
    closed: AtomicBool,
}

#[async_trait]
impl EnginePage for MockPage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    async fn add_init_script(&self, _source: &str) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }
        self.stats.init_scripts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn goto(&self, _url: &str) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }
        self.stats.navigations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.config.nav_delay).await;
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }
        if let Some(ref message) = self.config.nav_error {
            return Err(EngineError::NavigationFailed(message.clone()));
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, EngineError> {
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }
        tokio::time::sleep(self.config.eval_delay).await;
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }
        self.stats.evaluations.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::Value::Null)
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

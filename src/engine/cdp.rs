//! CDP-backed engine implementation
//!
//! Drives Chromium-family binaries over the DevTools protocol via
//! chromiumoxide. One launched instance per profile; the context applies the
//! fingerprint as CDP-level emulation overrides on every page it creates.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTimezoneOverrideParams, SetTouchEmulationEnabledParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ContextOptions, EngineContext, EngineError, EngineLauncher, EnginePage, EngineSession,
    LaunchOptions,
};

/// Launcher for one Chromium-family capability.
///
/// Capabilities differ only in which installed binaries they accept; the
/// launch flags and session wiring are shared.
pub struct CdpLauncher {
    name: &'static str,
    candidates: Vec<PathBuf>,
}

impl CdpLauncher {
    pub fn chromium() -> Self {
        Self {
            name: "chromium",
            candidates: binary_candidates(&["chromium", "chromium-browser"]),
        }
    }

    pub fn chrome() -> Self {
        Self {
            name: "chrome",
            candidates: binary_candidates(&["google-chrome", "google-chrome-stable", "chrome"]),
        }
    }

    pub fn edge() -> Self {
        Self {
            name: "edge",
            candidates: binary_candidates(&["microsoft-edge", "microsoft-edge-stable", "msedge"]),
        }
    }

    fn find_executable(&self) -> Option<PathBuf> {
        self.candidates.iter().find(|p| p.exists()).cloned()
    }
}

/// Build per-OS candidate paths for the given binary names.
fn binary_candidates(names: &[&str]) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if cfg!(target_os = "windows") {
        for name in names {
            match *name {
                "chrome" | "google-chrome" | "google-chrome-stable" | "chromium" => {
                    paths.push(PathBuf::from(
                        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    ));
                    paths.push(PathBuf::from(
                        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                    ));
                    if let Ok(local) = std::env::var("LOCALAPPDATA") {
                        paths.push(PathBuf::from(format!(
                            r"{}\Google\Chrome\Application\chrome.exe",
                            local
                        )));
                    }
                }
                "msedge" | "microsoft-edge" | "microsoft-edge-stable" => {
                    paths.push(PathBuf::from(
                        r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                    ));
                    paths.push(PathBuf::from(
                        r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                    ));
                }
                _ => {}
            }
        }
        paths.dedup();
    } else if cfg!(target_os = "macos") {
        for name in names {
            match *name {
                "chromium" | "chromium-browser" => paths.push(PathBuf::from(
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                )),
                "chrome" | "google-chrome" | "google-chrome-stable" => paths.push(PathBuf::from(
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                )),
                "msedge" | "microsoft-edge" | "microsoft-edge-stable" => paths.push(PathBuf::from(
                    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
                )),
                _ => {}
            }
        }
        paths.dedup();
    } else {
        for name in names {
            paths.push(PathBuf::from(format!("/usr/bin/{}", name)));
            paths.push(PathBuf::from(format!("/usr/local/bin/{}", name)));
            paths.push(PathBuf::from(format!("/snap/bin/{}", name)));
        }
    }

    paths
}

#[async_trait]
impl EngineLauncher for CdpLauncher {
    fn name(&self) -> &str {
        self.name
    }

    async fn launch(&self, opts: LaunchOptions) -> Result<Arc<dyn EngineSession>, EngineError> {
        let session_id = format!("{}-{}", self.name, &Uuid::new_v4().to_string()[..8]);

        let executable = self.find_executable().ok_or_else(|| {
            EngineError::LaunchFailed(format!(
                "No {} binary found. Install it and restart the server.",
                self.name
            ))
        })?;

        let data_dir = std::env::temp_dir()
            .join("footfall")
            .join("sessions")
            .join(&session_id);
        std::fs::create_dir_all(&data_dir)?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .user_data_dir(&data_dir)
            .window_size(opts.window_width, opts.window_height)
            // Anti-automation tells
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-default-browser-check")
            // No "restore tabs" prompt from a previous forced kill
            .arg("--disable-session-crashed-bubble")
            .arg("--window-position=50,50")
            .arg("--disable-notifications")
            // Required when running as root (Docker, VPS)
            .arg("--no-sandbox");

        if opts.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = opts.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        let config = builder.build().map_err(EngineError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::LaunchFailed(e.to_string()))?;

        // Drain CDP events in the background; when the stream ends the engine
        // has disconnected or crashed.
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        let handler_id = session_id.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("Session {} engine disconnected (event handler ended)", handler_id);
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        info!(
            "Launched {} session {} (headless: {})",
            self.name, session_id, opts.headless
        );

        Ok(Arc::new(CdpSession {
            id: session_id,
            browser: Arc::new(RwLock::new(Some(browser))),
            alive,
        }))
    }
}

/// A launched CDP engine instance.
pub struct CdpSession {
    id: String,
    browser: Arc<RwLock<Option<Browser>>>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl EngineSession for CdpSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn new_context(&self, opts: ContextOptions) -> Result<Arc<dyn EngineContext>, EngineError> {
        if !self.is_alive() {
            return Err(EngineError::ConnectionLost("session is not alive".into()));
        }

        Ok(Arc::new(CdpContext {
            session_id: self.id.clone(),
            browser: self.browser.clone(),
            opts,
            adopted_initial_tab: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.alive.store(false, Ordering::Relaxed);

        let mut guard = self.browser.write().await;
        if let Some(mut browser) = guard.take() {
            let graceful = browser.close().await;
            // Brief grace period for engine child processes, then force kill
            // so no orphans survive an unresponsive shutdown.
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = browser.kill().await;
            graceful.map_err(|e| EngineError::ConnectionLost(e.to_string()))?;
        }

        debug!("Session {} closed", self.id);
        Ok(())
    }

    async fn kill(&self) {
        self.alive.store(false, Ordering::Relaxed);

        let mut guard = self.browser.write().await;
        if let Some(mut browser) = guard.take() {
            let _ = browser.close().await;
            let _ = browser.kill().await;
            warn!("Session {} force killed", self.id);
        }
    }
}

/// Emulation scope for one fingerprint within a session instance.
struct CdpContext {
    session_id: String,
    browser: Arc<RwLock<Option<Browser>>>,
    opts: ContextOptions,
    adopted_initial_tab: AtomicBool,
}

#[async_trait]
impl EngineContext for CdpContext {
    async fn new_page(&self) -> Result<Arc<dyn EnginePage>, EngineError> {
        let page = {
            let guard = self.browser.read().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| EngineError::ConnectionLost("session closed".into()))?;

            // The engine opens with one blank tab; adopt it for the first page
            // instead of leaving it dangling.
            if !self.adopted_initial_tab.swap(true, Ordering::SeqCst) {
                let mut pages = browser
                    .pages()
                    .await
                    .map_err(|e| EngineError::PageFailed(e.to_string()))?;

                let main_page = if pages.is_empty() {
                    browser
                        .new_page("about:blank")
                        .await
                        .map_err(|e| EngineError::PageFailed(e.to_string()))?
                } else {
                    pages.remove(0)
                };

                for extra in pages {
                    debug!("Session {} closing extra blank tab", self.session_id);
                    let _ = extra.close().await;
                }

                main_page
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| EngineError::PageFailed(e.to_string()))?
            }
        };

        apply_emulation(&page, &self.opts).await?;

        Ok(Arc::new(CdpPage {
            page,
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        // Pages and the instance own the real resources; the context itself
        // is only the emulation scope.
        debug!("Session {} context closed", self.session_id);
        Ok(())
    }
}

/// Apply fingerprint-derived overrides at the protocol level, before any
/// navigation, so they are in place for the first document.
async fn apply_emulation(page: &Page, opts: &ContextOptions) -> Result<(), EngineError> {
    page.execute(SetDeviceMetricsOverrideParams::new(
        opts.viewport_width as i64,
        opts.viewport_height as i64,
        opts.device_scale_factor,
        opts.is_mobile,
    ))
    .await
    .map_err(|e| EngineError::ContextFailed(format!("device metrics override: {}", e)))?;

    page.execute(SetUserAgentOverrideParams {
        user_agent: opts.user_agent.clone(),
        accept_language: Some(opts.accept_language.clone()),
        platform: Some(opts.platform.clone()),
        user_agent_metadata: None,
    })
    .await
    .map_err(|e| EngineError::ContextFailed(format!("user agent override: {}", e)))?;

    page.execute(SetTimezoneOverrideParams::new(opts.timezone.clone()))
        .await
        .map_err(|e| EngineError::ContextFailed(format!("timezone override: {}", e)))?;

    if opts.has_touch {
        page.execute(SetTouchEmulationEnabledParams::new(true))
            .await
            .map_err(|e| EngineError::ContextFailed(format!("touch emulation: {}", e)))?;
    }

    Ok(())
}

/// One page inside a CDP context.
struct CdpPage {
    page: Page,
    closed: AtomicBool,
}

#[async_trait]
impl EnginePage for CdpPage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    async fn add_init_script(&self, source: &str) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }

        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(|e| EngineError::JavaScriptError(e.to_string()))?;

        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }

        self.page
            .goto(url)
            .await
            .map_err(|e| EngineError::NavigationFailed(e.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| EngineError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, EngineError> {
        if self.is_closed() {
            return Err(EngineError::PageClosed);
        }

        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(EngineError::JavaScriptError)?;

        let result = self
            .page
            .evaluate(params)
            .await
            .map_err(|e| EngineError::JavaScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.page
            .clone()
            .close()
            .await
            .map_err(|e| EngineError::PageFailed(e.to_string()))?;

        Ok(())
    }
}

//! Profile runner
//!
//! Drives exactly one profile from capability selection through guaranteed
//! resource release: fingerprint acquisition, isolated session launch, spoof
//! injection, bounded navigation, the hard dwell deadline, the interaction
//! phase, and teardown. The stop token is checked at every suspension point.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::activity::ActivityLog;
use crate::engine::{
    CapabilityRegistry, EngineContext, EngineError, EnginePage, EngineSession, LaunchOptions,
};
use crate::fingerprint::{spoof_script, DeviceCategory, FingerprintError, FingerprintGenerator};
use crate::interaction;

use super::config::{cycle_relative_index, WARMUP_DELAY_SECS, WARMUP_THRESHOLD_SECS};
use super::controller::{SessionRecord, Shared};

/// Terminal outcome of one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

const PENDING: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;

/// First-writer-wins completion latch.
///
/// Shared between a profile's main path and its dwell-deadline handler so
/// that exactly one of them finalizes the profile, whichever gets there
/// first. The winner performs all counter updates.
pub struct Completion(AtomicU8);

impl Completion {
    pub fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    /// Claim the outcome. Returns true for the first caller only.
    pub fn try_claim(&self, outcome: Outcome) -> bool {
        let value = match outcome {
            Outcome::Success => SUCCEEDED,
            Outcome::Failed => FAILED,
        };
        self.0
            .compare_exchange(PENDING, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire) == PENDING
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// Navigation failure category for user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NavFailure {
    Timeout,
    Dns,
    Network,
    Other(String),
}

impl NavFailure {
    pub(crate) fn classify(text: &str) -> Self {
        if text.contains("ERR_NAME_NOT_RESOLVED") {
            NavFailure::Dns
        } else if text.contains("net::ERR_") {
            NavFailure::Network
        } else if text.contains("Timeout") || text.contains("timeout") {
            NavFailure::Timeout
        } else {
            NavFailure::Other(text.to_string())
        }
    }

    fn user_message(&self, timeout_secs: u64) -> String {
        match self {
            NavFailure::Timeout => format!(
                "The site did not load within {} seconds so the profile was closed",
                timeout_secs
            ),
            NavFailure::Dns => "DNS error: website address could not be resolved".to_string(),
            NavFailure::Network => "Network error: unable to connect".to_string(),
            NavFailure::Other(text) => format!("Navigation failed: {}", text),
        }
    }
}

/// Why a profile failed. Never escapes the profile boundary as an error.
#[derive(Debug)]
enum ProfileFailure {
    Stopped,
    UnknownEngine(String),
    Fingerprint(FingerprintError),
    Launch(EngineError),
    Context(EngineError),
    Page(EngineError),
    Navigation(NavFailure),
    Interaction(EngineError),
}

impl ProfileFailure {
    fn user_message(&self, cycle_index: u64, nav_timeout_secs: u64) -> String {
        match self {
            ProfileFailure::Stopped => {
                format!("Stopping Profile {} - automation stopped", cycle_index)
            }
            ProfileFailure::UnknownEngine(name) => {
                format!("Invalid engine selection '{}' for Profile {}", name, cycle_index)
            }
            ProfileFailure::Fingerprint(err) => format!("Fingerprint generation failed: {}", err),
            ProfileFailure::Launch(err) => err.to_string(),
            ProfileFailure::Context(err) => err.to_string(),
            ProfileFailure::Page(err) => err.to_string(),
            ProfileFailure::Navigation(failure) => failure.user_message(nav_timeout_secs),
            ProfileFailure::Interaction(err) => format!("Error during interaction: {}", err),
        }
    }
}

/// Everything one profile needs to run.
pub struct ProfileRunner {
    pub(crate) shared: Arc<Shared>,
    pub(crate) capabilities: Arc<CapabilityRegistry>,
    pub(crate) fingerprints: Arc<FingerprintGenerator>,
    pub(crate) activity: Arc<ActivityLog>,
    pub(crate) completion: Arc<Completion>,
    pub(crate) token: CancellationToken,
    pub(crate) global_index: u64,
    pub(crate) profiles_per_cycle: u64,
    pub(crate) engine: String,
    pub(crate) url: String,
    pub(crate) url_index: usize,
    pub(crate) profile_no: u32,
    pub(crate) cycle: u32,
    pub(crate) wait_time_secs: u64,
    pub(crate) nav_timeout_secs: u64,
    pub(crate) device_category: DeviceCategory,
    pub(crate) proxy_url: Option<String>,
}

impl ProfileRunner {
    /// Run the full lifecycle. Never panics and never leaves the profile
    /// untracked: on return the session is out of the registry and the active
    /// set, and exactly one outcome has been counted.
    pub async fn run(self) {
        let cycle_index = cycle_relative_index(self.global_index, self.profiles_per_cycle);

        let mut session: Option<Arc<dyn EngineSession>> = None;
        let mut context: Option<Arc<dyn EngineContext>> = None;
        let mut page: Option<Arc<dyn EnginePage>> = None;
        let mut deadline: Option<JoinHandle<()>> = None;

        let result = self
            .drive(cycle_index, &mut session, &mut context, &mut page, &mut deadline)
            .await;

        let main_claimed = match result {
            Ok(()) => {
                if self.completion.try_claim(Outcome::Success) {
                    self.shared.record_outcome(Outcome::Success);
                    self.activity.emit_for(
                        self.global_index,
                        &format!("Profile {} (Cycle {}) completed", cycle_index, self.cycle),
                    );
                    true
                } else {
                    false
                }
            }
            Err(failure) => {
                if self.completion.try_claim(Outcome::Failed) {
                    self.shared.record_outcome(Outcome::Failed);
                    self.activity.emit_for(
                        self.global_index,
                        &failure.user_message(cycle_index, self.nav_timeout_secs),
                    );
                    true
                } else {
                    false
                }
            }
        };

        if let Some(handle) = deadline.take() {
            if main_claimed {
                handle.abort();
            } else {
                // The deadline handler won the race; wait for its teardown so
                // the cycle settles only after the profile is fully finalized.
                let _ = handle.await;
            }
        }

        teardown(&self.activity, self.global_index, page, context, session).await;
        self.shared.remove_tracking(self.global_index);
    }

    async fn drive(
        &self,
        cycle_index: u64,
        session_slot: &mut Option<Arc<dyn EngineSession>>,
        context_slot: &mut Option<Arc<dyn EngineContext>>,
        page_slot: &mut Option<Arc<dyn EnginePage>>,
        deadline_slot: &mut Option<JoinHandle<()>>,
    ) -> Result<(), ProfileFailure> {
        if self.token.is_cancelled() {
            return Err(ProfileFailure::Stopped);
        }

        self.activity.emit_for(
            self.global_index,
            &format!("Opening Profile {} (Cycle {})", cycle_index, self.cycle),
        );

        let capability = self
            .capabilities
            .resolve(&self.engine)
            .ok_or_else(|| ProfileFailure::UnknownEngine(self.engine.clone()))?;
        self.activity.emit_for(
            self.global_index,
            &format!("Using engine: {} for Profile {}", capability.name(), cycle_index),
        );

        let fingerprint = self
            .fingerprints
            .generate(capability.name(), self.device_category, self.proxy_url.as_deref())
            .await
            .map_err(ProfileFailure::Fingerprint)?;

        if self.token.is_cancelled() {
            return Err(ProfileFailure::Stopped);
        }

        let session = capability
            .launch(LaunchOptions {
                headless: false,
                proxy: self.proxy_url.clone(),
                window_width: fingerprint.viewport_width,
                window_height: fingerprint.viewport_height,
            })
            .await
            .map_err(ProfileFailure::Launch)?;
        self.shared.register_session(self.global_index, session.clone());
        *session_slot = Some(session.clone());

        if self.token.is_cancelled() {
            return Err(ProfileFailure::Stopped);
        }

        let context = session
            .new_context(fingerprint.context_options())
            .await
            .map_err(ProfileFailure::Context)?;
        *context_slot = Some(context.clone());

        if self.token.is_cancelled() {
            return Err(ProfileFailure::Stopped);
        }

        let page = context.new_page().await.map_err(ProfileFailure::Page)?;
        *page_slot = Some(page.clone());

        if self.token.is_cancelled() {
            return Err(ProfileFailure::Stopped);
        }

        page.add_init_script(&spoof_script(&fingerprint))
            .await
            .map_err(ProfileFailure::Page)?;

        if self.token.is_cancelled() {
            return Err(ProfileFailure::Stopped);
        }

        self.activity.emit_for(
            self.global_index,
            &format!("Loading website for Profile {}...", cycle_index),
        );
        self.navigate(&page).await?;

        if self.token.is_cancelled() {
            return Err(ProfileFailure::Stopped);
        }

        self.activity.emit_for(
            self.global_index,
            &format!("Page loaded for Profile {} (Cycle {})", cycle_index, self.cycle),
        );

        // Dwell accounting starts at successful load, not at launch.
        let wait_time = Duration::from_secs(self.wait_time_secs);
        self.shared.register_record(
            self.global_index,
            SessionRecord {
                started_at: tokio::time::Instant::now(),
                wait_time,
                cycle: self.cycle,
                url_index: self.url_index,
                profile_no: self.profile_no,
            },
        );
        self.activity.emit_for(
            self.global_index,
            &format!("Wait timer started ({}s allocated)", self.wait_time_secs),
        );

        *deadline_slot = Some(self.arm_deadline(
            cycle_index,
            session.clone(),
            context.clone(),
            page.clone(),
        ));

        let mut budget = self.wait_time_secs;
        if budget > WARMUP_THRESHOLD_SECS {
            self.activity
                .emit_for(self.global_index, "Waiting 5s before scrolling...");
            self.cancellable_sleep(Duration::from_secs(WARMUP_DELAY_SECS)).await?;
            budget -= WARMUP_DELAY_SECS;
        }

        if !page.is_closed() && self.completion.is_pending() {
            interaction::simulate(&page, budget, self.global_index, &self.token, &self.activity)
                .await
                .map_err(ProfileFailure::Interaction)?;

            if !page.is_closed() {
                self.cancellable_sleep(Duration::from_secs(1)).await?;
            }
        }

        if self.token.is_cancelled() && self.completion.is_pending() {
            return Err(ProfileFailure::Stopped);
        }

        Ok(())
    }

    /// Navigate with a bounded timeout, racing an in-flight stop request.
    async fn navigate(&self, page: &Arc<dyn EnginePage>) -> Result<(), ProfileFailure> {
        let nav_timeout = Duration::from_secs(self.nav_timeout_secs);

        tokio::select! {
            _ = self.token.cancelled() => Err(ProfileFailure::Stopped),
            result = tokio::time::timeout(nav_timeout, page.goto(&self.url)) => match result {
                Err(_) => Err(ProfileFailure::Navigation(NavFailure::Timeout)),
                Ok(Err(err)) => Err(ProfileFailure::Navigation(NavFailure::classify(&err.to_string()))),
                Ok(Ok(())) => Ok(()),
            },
        }
    }

    /// Arm the hard dwell deadline.
    ///
    /// When it fires first, the profile is force-marked successful (it
    /// consumed its allotted time) and all resources are closed from within
    /// the handler, independent of the main path.
    fn arm_deadline(
        &self,
        cycle_index: u64,
        session: Arc<dyn EngineSession>,
        context: Arc<dyn EngineContext>,
        page: Arc<dyn EnginePage>,
    ) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let activity = self.activity.clone();
        let completion = self.completion.clone();
        let global_index = self.global_index;
        let wait_time_secs = self.wait_time_secs;
        let cycle = self.cycle;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(wait_time_secs)).await;

            if !completion.try_claim(Outcome::Success) {
                return;
            }
            // Counters first: everything up to here is synchronous, so an
            // abort from the main path cannot lose the outcome.
            shared.record_outcome(Outcome::Success);
            activity.emit_for(
                global_index,
                &format!(
                    "Wait time ({}s) expired - force closing Profile {}",
                    wait_time_secs, cycle_index
                ),
            );

            if let Err(err) = page.close().await {
                warn!("Profile {} deadline page close failed: {}", global_index, err);
            }
            if let Err(err) = context.close().await {
                warn!("Profile {} deadline context close failed: {}", global_index, err);
            }
            if let Err(err) = session.close().await {
                warn!("Profile {} deadline session close failed: {}", global_index, err);
                session.kill().await;
            }
            shared.remove_tracking(global_index);

            activity.emit_for(
                global_index,
                &format!("Profile {} (Cycle {}) completed by timeout", cycle_index, cycle),
            );
        })
    }

    async fn cancellable_sleep(&self, duration: Duration) -> Result<(), ProfileFailure> {
        tokio::select! {
            _ = self.token.cancelled() => {
                if self.completion.is_pending() {
                    Err(ProfileFailure::Stopped)
                } else {
                    Ok(())
                }
            }
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Unconditional teardown: each resource close is independently guarded so a
/// failure to release one never blocks releasing the others.
async fn teardown(
    activity: &ActivityLog,
    global_index: u64,
    page: Option<Arc<dyn EnginePage>>,
    context: Option<Arc<dyn EngineContext>>,
    session: Option<Arc<dyn EngineSession>>,
) {
    if let Some(page) = page {
        if !page.is_closed() {
            if let Err(err) = page.close().await {
                activity.emit_for(global_index, &format!("Failed to close page: {}", err));
            }
        }
    }

    if let Some(context) = context {
        if let Err(err) = context.close().await {
            warn!("Profile {} failed to close context: {}", global_index, err);
        }
    }

    if let Some(session) = session {
        if let Err(err) = session.close().await {
            warn!("Profile {} failed to close session: {}", global_index, err);
            session.kill().await;
        }
    }
}

//! Human-like reading simulation
//!
//! Plans and executes the scroll behavior of one profile: short randomized
//! scroll movements with pauses, exploring only part of the page, followed by
//! a sweep over `.ads` elements. Execution is bounded by the remaining dwell
//! budget and bails out cooperatively on stop requests and page closure.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::activity::ActivityLog;
use crate::automation::config::STOP_POLL_INTERVAL;
use crate::engine::{EngineError, EnginePage};

/// Scroll direction of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Down,
    Up,
}

/// One planned scroll movement.
#[derive(Debug, Clone)]
pub struct ScrollStep {
    pub direction: ScrollDirection,
    /// Pause before the movement starts.
    pub pause: Duration,
    /// Duration of the smooth movement itself.
    pub duration: Duration,
    /// Fraction of the scrollable height covered by the movement.
    pub span: f64,
}

/// Plan scroll steps for a dwell budget.
///
/// Mirrors how a human explores a page: mostly downward, small movements,
/// 2-3s pauses, never deeper than 50-70% of the page.
pub fn plan_scroll(budget: Duration, rng: &mut impl Rng) -> Vec<ScrollStep> {
    let mut remaining = budget.as_secs_f64();
    let max_depth: f64 = rng.gen_range(0.5..0.7);
    let mut depth = 0.0_f64;
    let mut steps = Vec::new();

    while remaining > 2.0 {
        let down = rng.gen_bool(0.7);
        let pause = rng.gen_range(2.0..3.0);
        let duration = rng.gen_range(1.0..2.0);
        let span = if down {
            let span: f64 = rng.gen_range(0.02..0.08);
            let capped = span.min((max_depth - depth).max(0.0));
            depth += capped;
            capped
        } else {
            let span: f64 = rng.gen_range(0.01..0.04);
            depth = (depth - span).max(0.0);
            span
        };

        steps.push(ScrollStep {
            direction: if down { ScrollDirection::Down } else { ScrollDirection::Up },
            pause: Duration::from_secs_f64(pause),
            duration: Duration::from_secs_f64(duration),
            span,
        });

        remaining -= duration + pause;
    }

    steps
}

/// Drive the page through a planned reading session within `budget_secs`.
///
/// Returns `Ok(())` when the budget is consumed, the page is closed out from
/// under us (the deadline handler's teardown), or a stop is requested; an
/// evaluation failure on a live page propagates.
pub async fn simulate(
    page: &Arc<dyn EnginePage>,
    budget_secs: u64,
    session_index: u64,
    token: &CancellationToken,
    activity: &ActivityLog,
) -> Result<(), EngineError> {
    if page.is_closed() || budget_secs == 0 {
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(budget_secs);
    let steps = {
        let mut rng = rand::thread_rng();
        plan_scroll(Duration::from_secs(budget_secs), &mut rng)
    };
    debug!("Profile {} planned {} scroll steps", session_index, steps.len());

    for step in steps {
        if page.is_closed() || token.is_cancelled() || Instant::now() >= deadline {
            return Ok(());
        }

        if !pause_for(step.pause, deadline, token, page).await {
            return Ok(());
        }

        let direction = match step.direction {
            ScrollDirection::Down => "down",
            ScrollDirection::Up => "up",
        };
        activity.emit_for(
            session_index,
            &format!(
                "Scrolling {} for {:.1}s after {:.1}s pause",
                direction,
                step.duration.as_secs_f64(),
                step.pause.as_secs_f64()
            ),
        );

        match page.evaluate(&scroll_script(&step)).await {
            Ok(_) => {}
            Err(_) if page.is_closed() => return Ok(()),
            Err(err) => return Err(err),
        }

        // Occasional extra dwell between movements.
        let extra = {
            let mut rng = rand::thread_rng();
            rng.gen_bool(0.3).then(|| rng.gen_range(500..2000))
        };
        if let Some(millis) = extra {
            if !pause_for(Duration::from_millis(millis), deadline, token, page).await {
                return Ok(());
            }
        }
    }

    if page.is_closed() || token.is_cancelled() || Instant::now() >= deadline {
        return Ok(());
    }

    activity.emit_for(session_index, "Searching for .ads elements...");
    match page.evaluate(ADS_SWEEP_SCRIPT).await {
        Ok(value) => {
            let count = value.as_u64().unwrap_or(0);
            if count > 0 {
                activity.emit_for(session_index, &format!("Visited {} .ads elements", count));
            } else {
                activity.emit_for(session_index, "No .ads elements found on the page");
            }
        }
        Err(_) if page.is_closed() => return Ok(()),
        Err(err) => return Err(err),
    }

    Ok(())
}

/// Sleep in stop-poll sized chunks, clamped to the deadline.
///
/// Returns false when the wait was cut short by a stop request, page closure,
/// or the deadline.
async fn pause_for(
    wanted: Duration,
    deadline: Instant,
    token: &CancellationToken,
    page: &Arc<dyn EnginePage>,
) -> bool {
    let target = (Instant::now() + wanted).min(deadline);

    loop {
        if token.is_cancelled() || page.is_closed() {
            return false;
        }
        let now = Instant::now();
        if now >= target {
            return now < deadline;
        }

        let chunk = STOP_POLL_INTERVAL.min(target - now);
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(chunk) => {}
        }
    }
}

fn scroll_script(step: &ScrollStep) -> String {
    let signed_span = match step.direction {
        ScrollDirection::Down => step.span,
        ScrollDirection::Up => -step.span,
    };
    format!(
        r#"
(async () => {{
  const scrollHeight = document.documentElement.scrollHeight - window.innerHeight;
  const distance = scrollHeight * {span};
  const startY = window.scrollY;
  const endY = Math.max(0, Math.min(scrollHeight, startY + distance));
  const steps = Math.max(1, Math.floor(60 * {duration}));
  for (let i = 0; i <= steps; i++) {{
    window.scrollTo(0, startY + ((endY - startY) * i) / steps);
    await new Promise((r) => setTimeout(r, ({duration} * 1000) / steps));
  }}
}})()
"#,
        span = signed_span,
        duration = step.duration.as_secs_f64(),
    )
}

const ADS_SWEEP_SCRIPT: &str = r#"
(async () => {
  window.scrollTo(0, 0);
  await new Promise((r) => setTimeout(r, 1000));
  const ads = Array.from(document.querySelectorAll('.ads'));
  for (const el of ads) {
    el.scrollIntoView({ behavior: 'smooth', block: 'center' });
    await new Promise((r) => setTimeout(r, 2000 + Math.random() * 1000));
  }
  return ads.length;
})()
"#;

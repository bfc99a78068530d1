//! Cycle coordinator
//!
//! Materializes one cycle's worth of work (profiles x URLs), assigns global
//! indices and dwell times, launches all profile runners concurrently, and
//! waits for every one of them to settle. A single profile's failure never
//! aborts its siblings.

use std::sync::Arc;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::config::RunConfig;
use super::controller::{ControllerDeps, Shared};
use super::profile::{Completion, Outcome, ProfileRunner};

pub struct CycleCoordinator;

impl CycleCoordinator {
    /// Run one cycle to quiescence: returns only after every profile in the
    /// cycle has reached a terminal state.
    pub async fn run_cycle(
        shared: &Arc<Shared>,
        deps: &ControllerDeps,
        config: &RunConfig,
        cycle: u32,
        token: &CancellationToken,
    ) {
        let profiles_per_cycle = config.profiles_per_cycle();

        // Dwell times are drawn up front, uniformly within the configured bounds.
        let wait_times = draw_wait_times(profiles_per_cycle, config.min_wait_secs, config.max_wait_secs);

        let mut tasks = Vec::with_capacity(profiles_per_cycle as usize);
        let mut offset: u64 = 0;

        for (url_index, url) in config.urls.iter().enumerate() {
            for profile_no in 1..=config.profiles_per_url {
                let global_index = (cycle as u64 - 1) * profiles_per_cycle + offset + 1;
                let completion = Arc::new(Completion::new());

                let runner = ProfileRunner {
                    shared: shared.clone(),
                    capabilities: deps.capabilities.clone(),
                    fingerprints: deps.fingerprints.clone(),
                    activity: deps.activity.clone(),
                    completion: completion.clone(),
                    token: token.clone(),
                    global_index,
                    profiles_per_cycle,
                    engine: config.engine.clone(),
                    url: url.clone(),
                    url_index,
                    profile_no,
                    cycle,
                    wait_time_secs: wait_times[offset as usize],
                    nav_timeout_secs: config.nav_timeout_secs,
                    device_category: config.device_category,
                    proxy_url: config.proxy_url.clone(),
                };

                tasks.push((global_index, completion, tokio::spawn(runner.run())));
                offset += 1;
            }
        }

        // Settle-all: a panicking task is converted into a counted failure so
        // the cycle still reaches quiescence with consistent counters.
        for (global_index, completion, handle) in tasks {
            if let Err(join_err) = handle.await {
                error!("Profile {} task failed: {}", global_index, join_err);
                if completion.try_claim(Outcome::Failed) {
                    shared.record_outcome(Outcome::Failed);
                }
                if let Some(session) = shared.remove_tracking(global_index) {
                    tokio::spawn(async move {
                        let _ = session.close().await;
                    });
                }
            }
        }
    }
}

/// Draw one dwell time per profile, uniform over `[min, max]` inclusive.
fn draw_wait_times(count: u64, min_secs: u64, max_secs: u64) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| rng.gen_range(min_secs..=max_secs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_times_stay_in_bounds() {
        let times = draw_wait_times(500, 30, 40);
        assert_eq!(times.len(), 500);
        assert!(times.iter().all(|t| (30..=40).contains(t)));
        // Inclusive bounds: both extremes show up over enough draws.
        assert!(times.contains(&30));
        assert!(times.contains(&40));
    }

    #[test]
    fn test_degenerate_single_value_range() {
        // min == max is rejected by validation, but the draw itself is total.
        let times = draw_wait_times(3, 45, 45);
        assert_eq!(times, vec![45, 45, 45]);
    }
}

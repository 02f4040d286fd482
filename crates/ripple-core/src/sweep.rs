//! Periodic maintenance tasks.
//!
//! Two independent timers: a fine-grained sweep that expires idle typing
//! entries and a coarse reaper for connections that died without a
//! teardown. Both are internal to the core and need no external trigger.

use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Sweep cadence configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Cadence of the typing expiry sweep.
    pub typing_interval: Duration,
    /// Cadence of the stale connection/channel reaper.
    pub reap_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            typing_interval: Duration::from_secs(1),
            reap_interval: Duration::from_secs(300),
        }
    }
}

/// Spawn the background sweepers.
///
/// The tasks run until aborted; callers keep the handles for shutdown.
pub fn spawn_sweepers(registry: Arc<Registry>, config: SweepConfig) -> Vec<JoinHandle<()>> {
    info!(
        typing_interval = ?config.typing_interval,
        reap_interval = ?config.reap_interval,
        "Starting sweepers"
    );

    let typing_registry = Arc::clone(&registry);
    let typing = tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.typing_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let evicted = typing_registry.sweep_typing(Instant::now());
            if evicted > 0 {
                debug!(evicted, "Typing sweep evicted entries");
            }
        }
    });

    let reaper = tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.reap_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let reaped = registry.reap_stale();
            if reaped > 0 {
                debug!(reaped, "Reaped stale connections");
            }
        }
    });

    vec![typing, reaper]
}

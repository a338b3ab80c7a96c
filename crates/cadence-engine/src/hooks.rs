//! Tick hooks used by the engine binary.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::engine::{StopHandle, TickHookProcessor};
use cadence_core::executor::TickResults;
use cadence_core::platform::Platform;
use tracing::{debug, info, warn};

use crate::population::TradeAction;

/// Logs a one-line summary per tick and every action at `debug`.
#[derive(Debug, Default)]
pub struct TickLogger;

impl TickHookProcessor<TradeAction> for TickLogger {
    fn tick_post_hook(&self, tick: u64, duration: Duration, results: &TickResults<TradeAction>) {
        let mut actions = 0_usize;
        let mut failures = 0_usize;
        for (agent_id, slot) in results {
            match slot {
                Ok(produced) => {
                    actions = actions.saturating_add(produced.len());
                    for action in produced {
                        if let Ok(json) = serde_json::to_string(action) {
                            debug!(tick, %agent_id, action = %json, "Agent action");
                        }
                    }
                }
                Err(error) => {
                    failures = failures.saturating_add(1);
                    warn!(tick, %agent_id, %error, "Agent produced no actions");
                }
            }
        }
        info!(
            tick,
            agents = results.len(),
            actions,
            failures,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "Tick summary"
        );
    }

    fn simulation_finished_hook(&self, last_tick: u64, last_tick_duration: Duration) {
        info!(
            last_tick,
            last_tick_duration_ms = u64::try_from(last_tick_duration.as_millis()).unwrap_or(u64::MAX),
            "Simulation finished hook"
        );
    }
}

/// Stops the simulation once no agent is scheduled for the next tick.
pub struct StopWhenIdle {
    platform: Arc<Platform<TradeAction>>,
    handle: StopHandle,
}

impl StopWhenIdle {
    /// Watch `platform` and stop through `handle`.
    pub const fn new(platform: Arc<Platform<TradeAction>>, handle: StopHandle) -> Self {
        Self { platform, handle }
    }
}

impl TickHookProcessor<TradeAction> for StopWhenIdle {
    fn tick_post_hook(&self, tick: u64, _duration: Duration, _results: &TickResults<TradeAction>) {
        if self.platform.executor().nof_scheduled_agents() == 0 {
            info!(tick, "No agent has work left, stopping");
            self.handle.stop();
        }
    }
}

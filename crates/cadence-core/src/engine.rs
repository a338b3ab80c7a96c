//! The simulation loop: tick hooks around [`TickExecutor::do_tick`].
//!
//! Each iteration runs every pre-tick hook, one executor tick, the platform's
//! reaping of stopped agents, and every post-tick hook, in that order. Hooks
//! run synchronously on the engine thread and block the loop. When the loop
//! ends the finished hooks run once and the executor is shut down.
//!
//! # Stopping
//!
//! With `iterations == 0` the loop only ends through a [`StopHandle`]. The
//! flag is checked before each tick, so the tick in flight always completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::executor::{TickError, TickExecutor, TickResults};
use crate::platform::Platform;

/// Errors that end a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A tick could not be executed.
    #[error("tick failed: {source}")]
    Tick {
        /// The underlying executor error.
        #[from]
        source: TickError,
    },
}

/// Callbacks invoked around every tick. All methods default to no-ops.
pub trait TickHookProcessor<A>: Send + Sync {
    /// Called before tick `tick` starts.
    fn tick_pre_hook(&self, _tick: u64) {}

    /// Called after tick `tick` with its wall-clock duration and results.
    fn tick_post_hook(&self, _tick: u64, _duration: Duration, _results: &TickResults<A>) {}

    /// Called once when the loop ends. `last_tick` is the executor's tick
    /// counter, i.e. the number of completed ticks.
    fn simulation_finished_hook(&self, _last_tick: u64, _last_tick_duration: Duration) {}
}

/// Why the simulation loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationEndReason {
    /// The configured number of iterations ran.
    IterationsReached,
    /// A [`StopHandle`] was triggered.
    StopRequested,
}

/// Outcome of [`SimulationEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Ticks executed by this run.
    pub ticks_run: u64,
    /// Index of the last tick executed, if any ran.
    pub last_tick: Option<u64>,
    /// Duration of the last tick in milliseconds.
    pub last_tick_duration_ms: u64,
    /// Why the loop ended.
    pub end_reason: SimulationEndReason,
}

/// Cloneable flag that ends a running simulation between ticks.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stop_requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// A handle that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the simulation to stop before its next tick.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Whether [`stop`](Self::stop) has been called on any clone.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// Drives a [`Platform`]'s executor for a fixed or unbounded number of ticks.
pub struct SimulationEngine<A> {
    platform: Arc<Platform<A>>,
    iterations: u64,
    hooks: Vec<Arc<dyn TickHookProcessor<A>>>,
    stop: StopHandle,
}

impl<A: Send + 'static> SimulationEngine<A> {
    /// Engine over `platform`. `iterations == 0` runs until stopped.
    pub fn new(platform: Arc<Platform<A>>, iterations: u64) -> Self {
        Self {
            platform,
            iterations,
            hooks: Vec::new(),
            stop: StopHandle::new(),
        }
    }

    /// Register a hook processor. Registering the same `Arc` twice is a
    /// no-op.
    pub fn register_hook(&mut self, hook: Arc<dyn TickHookProcessor<A>>) {
        if !self.hooks.iter().any(|known| Arc::ptr_eq(known, &hook)) {
            self.hooks.push(hook);
        }
    }

    /// Remove a hook processor. Returns whether it was registered.
    pub fn deregister_hook(&mut self, hook: &Arc<dyn TickHookProcessor<A>>) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|known| !Arc::ptr_eq(known, hook));
        self.hooks.len() != before
    }

    /// A handle that stops this engine between ticks.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The platform being driven.
    pub const fn platform(&self) -> &Arc<Platform<A>> {
        &self.platform
    }

    /// Number of registered hook processors.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Run the loop to completion, then shut the executor down.
    ///
    /// Blocks the calling thread; must not be called from an async context.
    pub fn run(&self) -> Result<SimulationSummary, EngineError> {
        let executor = Arc::clone(self.platform.executor());
        info!(
            iterations = self.iterations,
            hooks = self.hooks.len(),
            agents = self.platform.agent_count(),
            "Simulation starting"
        );
        let started = Instant::now();
        let outcome = self.run_ticks(&executor);

        let last_tick = executor.current_tick();
        let last_duration = executor.last_tick_duration();
        for hook in &self.hooks {
            hook.simulation_finished_hook(last_tick, last_duration);
        }
        executor.shutdown();

        let (ticks_run, end_reason) = outcome?;
        let summary = SimulationSummary {
            ticks_run,
            last_tick: last_tick.checked_sub(1).filter(|_| ticks_run > 0),
            last_tick_duration_ms: u64::try_from(last_duration.as_millis()).unwrap_or(u64::MAX),
            end_reason,
        };
        info!(
            ticks_run,
            end_reason = ?end_reason,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Simulation finished"
        );
        Ok(summary)
    }

    fn run_ticks(&self, executor: &TickExecutor<A>) -> Result<(u64, SimulationEndReason), EngineError> {
        let mut ticks_run = 0_u64;
        loop {
            if self.iterations > 0 && ticks_run >= self.iterations {
                info!(ticks_run, "Iteration limit reached");
                return Ok((ticks_run, SimulationEndReason::IterationsReached));
            }
            if self.stop.is_stop_requested() {
                info!(ticks_run, "Stop requested");
                return Ok((ticks_run, SimulationEndReason::StopRequested));
            }

            let tick = executor.current_tick();
            for hook in &self.hooks {
                hook.tick_pre_hook(tick);
            }
            let results = executor.do_tick()?;
            ticks_run = ticks_run.saturating_add(1);

            let reaped = self.platform.reap_finished();
            if !reaped.is_empty() {
                debug!(tick, reaped = reaped.len(), "Stopped agents reaped");
            }

            let duration = executor.last_tick_duration();
            debug!(tick, hooks = self.hooks.len(), "Dispatching post-tick hooks");
            for hook in &self.hooks {
                hook.tick_post_hook(tick, duration, &results);
            }
        }
    }
}

impl<A> std::fmt::Debug for SimulationEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("iterations", &self.iterations)
            .field("hooks", &self.hooks.len())
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

//! The tick executor: a keyed schedule, a fixed worker pool, and one
//! blocking barrier call per tick.
//!
//! Agents queue [`DeliberationRunnable`]s through
//! [`Scheduler::schedule_for_next_tick`]. The schedule is keyed by
//! [`AgentId`], so an agent queued twice runs once. [`TickExecutor::do_tick`]
//! swaps the schedule out under its lock, runs every unit on the pool, and
//! returns only after all of them have finished. Anything scheduled while a
//! tick is in flight lands in the fresh schedule and runs in the next tick.
//!
//! Units whose agent still has work are re-inserted for the next tick.
//!
//! A pool-wide semaphore bounds concurrency. Each running cycle holds its
//! permit until it returns, including cycles whose deadline expired and
//! whose result was abandoned. An agent whose abandoned cycle is still
//! running is not started again; it is reported as
//! [`AgentFailure::StillRunning`] and kept queued.
//!
//! `do_tick` drives the pool with `block_on` and must not be called from
//! inside an async runtime.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use cadence_agents::{DeliberationError, DeliberationRunnable, ReschedulableResult, Scheduler};
use cadence_types::AgentId;
use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::runtime::Runtime;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;

/// Per-agent outcome of one tick.
pub type TickResults<A> = BTreeMap<AgentId, Result<Vec<A>, AgentFailure>>;

/// Errors that make a whole tick impossible.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The worker pool has been shut down.
    #[error("tick executor has been shut down")]
    ShutDown,

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {source}")]
    PoolBuild {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A task submitted through [`TickExecutor::use_executor_for_tasks`]
    /// panicked.
    #[error("task {index} panicked: {message}")]
    TaskPanicked {
        /// Position of the task in the submitted list.
        index: usize,
        /// The panic payload, if it was a string.
        message: String,
    },
}

/// Why one agent produced no actions this tick.
#[derive(Debug, thiserror::Error)]
pub enum AgentFailure {
    /// The deliberation cycle returned an error.
    #[error("deliberation failed: {source}")]
    Deliberation {
        /// The underlying deliberation error.
        #[from]
        source: DeliberationError,
    },

    /// The deliberation cycle panicked.
    #[error("deliberation panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The deliberation cycle exceeded the per-unit deadline.
    #[error("deliberation exceeded {timeout_ms} ms")]
    TimedOut {
        /// The configured deadline.
        timeout_ms: u64,
    },

    /// An earlier cycle of this agent timed out and has not returned yet.
    #[error("previous deliberation still running")]
    StillRunning,
}

/// Runs one deliberation cycle per scheduled agent per tick.
pub struct TickExecutor<A> {
    pool_size: usize,
    runtime: RwLock<Option<Arc<Runtime>>>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<BTreeSet<AgentId>>>,
    schedule: Mutex<BTreeMap<AgentId, DeliberationRunnable<A>>>,
    rng: Option<Mutex<StdRng>>,
    unit_timeout: Option<Duration>,
    tick: AtomicU64,
    last_tick_duration_ms: AtomicU64,
}

enum UnitOutcome<A> {
    Finished(Result<ReschedulableResult<A>, DeliberationError>),
    Panicked(String),
    TimedOut,
}

/// Marks an agent as running until the cycle's worker returns.
struct InFlight {
    agents: Arc<Mutex<BTreeSet<AgentId>>>,
    agent_id: AgentId,
}

impl InFlight {
    fn enter(agents: &Arc<Mutex<BTreeSet<AgentId>>>, agent_id: AgentId) -> Self {
        agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_id);
        Self {
            agents: Arc::clone(agents),
            agent_id,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.agent_id);
    }
}

impl<A: Send + 'static> TickExecutor<A> {
    /// Build an executor with its own worker pool.
    pub fn new(config: &ExecutorConfig) -> Result<Self, TickError> {
        let pool_size = config.pool_size.max(1);
        // Deliberations run on the blocking pool, gated by `permits`; the
        // single async worker only drives timers and joins.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("cadence-worker")
            .enable_all()
            .build()?;
        info!(
            pool_size,
            seed = ?config.seed,
            unit_timeout_ms = ?config.unit_timeout_ms,
            "Tick executor started"
        );
        Ok(Self {
            pool_size,
            runtime: RwLock::new(Some(Arc::new(runtime))),
            permits: Arc::new(Semaphore::new(pool_size)),
            in_flight: Arc::new(Mutex::new(BTreeSet::new())),
            schedule: Mutex::new(BTreeMap::new()),
            rng: config.seed.map(|seed| Mutex::new(StdRng::seed_from_u64(seed))),
            unit_timeout: config.unit_timeout_ms.map(Duration::from_millis),
            tick: AtomicU64::new(0),
            last_tick_duration_ms: AtomicU64::new(0),
        })
    }

    /// Shorthand for an unseeded executor without deadlines.
    pub fn with_pool_size(pool_size: usize) -> Result<Self, TickError> {
        Self::new(&ExecutorConfig {
            pool_size,
            ..ExecutorConfig::default()
        })
    }

    /// Run one tick: every scheduled agent deliberates once, in parallel.
    ///
    /// Blocks until all units have finished. The result has exactly one
    /// entry per agent that was scheduled when the tick started.
    pub fn do_tick(&self) -> Result<TickResults<A>, TickError> {
        let runtime = self.runtime()?;
        let mut units: Vec<DeliberationRunnable<A>> =
            mem::take(&mut *self.lock_schedule()).into_values().collect();
        if let Some(rng) = &self.rng {
            units.shuffle(&mut *rng.lock().unwrap_or_else(PoisonError::into_inner));
        }

        let tick = self.tick.load(Ordering::Acquire);
        info!(tick, agents = units.len(), "Tick started");
        let started = Instant::now();

        let (units, busy): (Vec<_>, Vec<_>) = {
            let in_flight = self.lock_in_flight();
            units
                .into_iter()
                .partition(|runnable| !in_flight.contains(&runnable.agent_id()))
        };

        let unit_timeout = self.unit_timeout;
        let pending = units.into_iter().map(|runnable| {
            let permits = Arc::clone(&self.permits);
            let guard = InFlight::enter(&self.in_flight, runnable.agent_id());
            async move {
                let permit = permits.acquire_owned().await.ok();
                let (started_tx, started_rx) = oneshot::channel();
                let worker = runnable.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    // Both are released only when the cycle really returns.
                    let _permit = permit;
                    let _guard = guard;
                    started_tx.send(()).ok();
                    worker.run()
                });
                let outcome = match unit_timeout {
                    Some(limit) => {
                        // The deadline starts once the cycle is on a worker.
                        started_rx.await.ok();
                        match tokio::time::timeout(limit, handle).await {
                            Ok(joined) => joined.map_or_else(
                                |e| UnitOutcome::Panicked(join_failure(e)),
                                UnitOutcome::Finished,
                            ),
                            Err(_elapsed) => UnitOutcome::TimedOut,
                        }
                    }
                    None => handle.await.map_or_else(
                        |e| UnitOutcome::Panicked(join_failure(e)),
                        UnitOutcome::Finished,
                    ),
                };
                (runnable, outcome)
            }
        });
        let outcomes = runtime.block_on(join_all(pending));

        let mut results = TickResults::new();
        let mut rescheduled = 0_usize;
        for (runnable, outcome) in outcomes {
            let agent_id = runnable.agent_id();
            let slot = match outcome {
                UnitOutcome::Finished(Ok(done)) => {
                    let (result, reschedule, runnable) = done.into_parts();
                    if reschedule {
                        self.requeue(runnable);
                        rescheduled = rescheduled.saturating_add(1);
                    }
                    Ok(result.into_actions())
                }
                UnitOutcome::Finished(Err(source)) => {
                    warn!(tick, %agent_id, error = %source, "Agent deliberation failed");
                    if runnable.agent().has_pending_work() {
                        self.requeue(runnable);
                        rescheduled = rescheduled.saturating_add(1);
                    }
                    Err(AgentFailure::Deliberation { source })
                }
                UnitOutcome::Panicked(message) => {
                    warn!(tick, %agent_id, %message, "Agent deliberation panicked");
                    if runnable.agent().has_pending_work() {
                        self.requeue(runnable);
                        rescheduled = rescheduled.saturating_add(1);
                    }
                    Err(AgentFailure::Panicked { message })
                }
                UnitOutcome::TimedOut => {
                    let timeout_ms = unit_timeout.map_or(0, duration_ms);
                    warn!(tick, %agent_id, timeout_ms, "Agent deliberation timed out");
                    Err(AgentFailure::TimedOut { timeout_ms })
                }
            };
            results.insert(agent_id, slot);
        }
        for runnable in busy {
            let agent_id = runnable.agent_id();
            warn!(tick, %agent_id, "Agent still running an abandoned cycle, deferred");
            self.requeue(runnable);
            rescheduled = rescheduled.saturating_add(1);
            results.insert(agent_id, Err(AgentFailure::StillRunning));
        }

        let elapsed_ms = duration_ms(started.elapsed());
        self.last_tick_duration_ms.store(elapsed_ms, Ordering::Release);
        self.tick.fetch_add(1, Ordering::AcqRel);
        info!(
            tick,
            agents = results.len(),
            failed = results.values().filter(|slot| slot.is_err()).count(),
            rescheduled,
            duration_ms = elapsed_ms,
            "Tick completed"
        );
        Ok(results)
    }

    /// Run unrelated work on the worker pool. Blocks until every task has
    /// finished; results come back in input order.
    pub fn use_executor_for_tasks<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, TickError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let runtime = self.runtime()?;
        let pending = tasks.into_iter().map(|task| {
            let permits = Arc::clone(&self.permits);
            async move {
                let permit = permits.acquire_owned().await.ok();
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    task()
                })
                .await
            }
        });
        let joined = runtime.block_on(join_all(pending));
        joined
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.map_err(|e| TickError::TaskPanicked {
                    index,
                    message: join_failure(e),
                })
            })
            .collect()
    }
}

impl<A> TickExecutor<A> {
    /// Index of the next tick to run; equals the number of completed ticks.
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Wall-clock duration of the most recent tick.
    pub fn last_tick_duration(&self) -> Duration {
        Duration::from_millis(self.last_tick_duration_ms.load(Ordering::Acquire))
    }

    /// Agents queued for the next tick, in id order.
    pub fn scheduled_agents(&self) -> Vec<AgentId> {
        self.lock_schedule().keys().copied().collect()
    }

    /// Number of agents queued for the next tick.
    pub fn nof_scheduled_agents(&self) -> usize {
        self.lock_schedule().len()
    }

    /// Number of worker threads.
    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.runtime
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop the worker pool. Later ticks fail with [`TickError::ShutDown`].
    /// Units still running are abandoned.
    pub fn shutdown(&self) {
        let runtime = self
            .runtime
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            if let Ok(runtime) = Arc::try_unwrap(runtime) {
                runtime.shutdown_background();
            }
            info!(tick = self.current_tick(), "Tick executor shut down");
        }
    }

    fn runtime(&self) -> Result<Arc<Runtime>, TickError> {
        self.runtime
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
            .ok_or(TickError::ShutDown)
    }

    fn requeue(&self, runnable: DeliberationRunnable<A>) {
        let agent_id = runnable.agent_id();
        self.lock_schedule().insert(agent_id, runnable);
        debug!(%agent_id, "Agent rescheduled");
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, BTreeSet<AgentId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_schedule(&self) -> MutexGuard<'_, BTreeMap<AgentId, DeliberationRunnable<A>>> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: Send + 'static> Scheduler<A> for TickExecutor<A> {
    fn schedule_for_next_tick(&self, runnable: DeliberationRunnable<A>) -> bool {
        let agent_id = runnable.agent_id();
        let replaced = self.lock_schedule().insert(agent_id, runnable).is_some();
        debug!(%agent_id, replaced, "Agent scheduled for next tick");
        true
    }
}

impl<A> std::fmt::Debug for TickExecutor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickExecutor")
            .field("pool_size", &self.pool_size)
            .field("tick", &self.current_tick())
            .field("scheduled", &self.nof_scheduled_agents())
            .field("seeded", &self.rng.is_some())
            .finish_non_exhaustive()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn join_failure(error: JoinError) -> String {
    error
        .try_into_panic()
        .map_or_else(|e| e.to_string(), panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

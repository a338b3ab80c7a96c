//! Schedulable deliberation units and their results.

use std::fmt;
use std::sync::Arc;

use cadence_types::AgentId;

use crate::agent::Agent;
use crate::error::DeliberationError;

/// Anything that can queue a deliberation for the next tick.
pub trait Scheduler<A>: Send + Sync {
    /// Queue `runnable` for the next tick. Scheduling an agent that is
    /// already queued replaces the earlier entry. Returns whether the
    /// runnable was accepted.
    fn schedule_for_next_tick(&self, runnable: DeliberationRunnable<A>) -> bool;
}

/// One "run a deliberation cycle" unit, bound to a single agent.
pub struct DeliberationRunnable<A> {
    agent: Arc<Agent<A>>,
}

impl<A> DeliberationRunnable<A> {
    /// Bind a runnable to `agent`.
    pub const fn new(agent: Arc<Agent<A>>) -> Self {
        Self { agent }
    }

    /// The agent this unit deliberates for.
    pub fn agent_id(&self) -> AgentId {
        self.agent.id()
    }

    /// The agent itself.
    pub const fn agent(&self) -> &Arc<Agent<A>> {
        &self.agent
    }

    /// Run one full deliberation cycle.
    pub fn run(&self) -> Result<ReschedulableResult<A>, DeliberationError> {
        let outcome = self.agent.run_cycle()?;
        Ok(ReschedulableResult {
            result: DeliberationResult::new(self.agent.id(), outcome.actions),
            reschedule: outcome.reschedule,
            runnable: self.clone(),
        })
    }
}

impl<A> Clone for DeliberationRunnable<A> {
    fn clone(&self) -> Self {
        Self {
            agent: Arc::clone(&self.agent),
        }
    }
}

impl<A> fmt::Debug for DeliberationRunnable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliberationRunnable")
            .field("agent_id", &self.agent.id())
            .finish()
    }
}

/// The actions one agent produced in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliberationResult<A> {
    agent_id: AgentId,
    actions: Vec<A>,
}

impl<A> DeliberationResult<A> {
    /// Pair an agent with its ordered actions.
    pub const fn new(agent_id: AgentId, actions: Vec<A>) -> Self {
        Self { agent_id, actions }
    }

    /// The producing agent.
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// The actions, in plan execution order.
    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    /// Take the actions.
    pub fn into_actions(self) -> Vec<A> {
        self.actions
    }
}

/// A cycle's result plus whether the agent wants another cycle.
#[derive(Debug)]
pub struct ReschedulableResult<A> {
    result: DeliberationResult<A>,
    reschedule: bool,
    runnable: DeliberationRunnable<A>,
}

impl<A> ReschedulableResult<A> {
    /// The cycle's result.
    pub const fn result(&self) -> &DeliberationResult<A> {
        &self.result
    }

    /// Whether the agent still has work for the next tick.
    pub const fn reschedule(&self) -> bool {
        self.reschedule
    }

    /// The unit that produced this result, for re-queueing.
    pub const fn runnable(&self) -> &DeliberationRunnable<A> {
        &self.runnable
    }

    /// Split into the result and the runnable.
    pub fn into_parts(self) -> (DeliberationResult<A>, bool, DeliberationRunnable<A>) {
        (self.result, self.reschedule, self.runnable)
    }
}

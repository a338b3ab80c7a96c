//! The agent: its trigger inbox, its deliberation state, and one full
//! sense/reason/act cycle.
//!
//! Anything that arrives from outside (external events, messages, adopted
//! goals, stop requests) lands in the inbox and wakes the agent by queueing
//! a [`DeliberationRunnable`] with its scheduler. The inbox is drained at the
//! start of each cycle, so arrivals during a cycle are seen by the next one.
//!
//! # Cycle
//!
//! 1. Drain the inbox. Adopted goals join the goal list.
//! 2. Drop achieved goals.
//! 3. Run the sense/reason steps; unmatched non-goal triggers are discarded.
//! 4. Run the act steps, collecting at most one action per plan.
//! 5. Apply buffered plan effects for the next cycle.
//!
//! After a stop request, the next cycle runs the shutdown plans instead and
//! the agent is done for good.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use cadence_types::{AgentId, ContextContainer, GoalHandle, Message, Trigger, TriggerKind};

use crate::arguments::AgentArguments;
use crate::deliberation::{ActStep, SenseReasonStep, apply_plan_schemes, apply_trigger_interceptors};
use crate::error::{DeliberationError, MessengerError, PlanError};
use crate::interceptor::InterceptorBase;
use crate::messenger::Messenger;
use crate::plan::{ActivePlan, Plan, PlanContext, PlanEffects};
use crate::runnable::{DeliberationRunnable, Scheduler};
use crate::scheme::{AgentView, PlanSchemeBase};

/// Collaborators an agent is connected to.
pub struct AgentWiring<A> {
    scheduler: Option<Arc<dyn Scheduler<A>>>,
    messenger: Option<Arc<dyn Messenger<A>>>,
}

impl<A> Default for AgentWiring<A> {
    fn default() -> Self {
        Self {
            scheduler: None,
            messenger: None,
        }
    }
}

impl<A> AgentWiring<A> {
    /// No scheduler, no messenger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule wake-ups with `scheduler`.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler<A>>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Send messages through `messenger`.
    #[must_use]
    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger<A>>) -> Self {
        self.messenger = Some(messenger);
        self
    }
}

impl<A> fmt::Debug for AgentWiring<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentWiring")
            .field("scheduler", &self.scheduler.is_some())
            .field("messenger", &self.messenger.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Inbox {
    external: Vec<Trigger>,
    internal: Vec<Trigger>,
    messages: Vec<Trigger>,
    goals: Vec<GoalHandle>,
    stop_requested: bool,
}

impl Inbox {
    fn is_empty(&self) -> bool {
        self.external.is_empty()
            && self.internal.is_empty()
            && self.messages.is_empty()
            && self.goals.is_empty()
            && !self.stop_requested
    }
}

struct AgentState<A> {
    goals: Vec<GoalHandle>,
    plans: Vec<ActivePlan<A>>,
    interceptors: InterceptorBase<A>,
    shutdown_plans: Vec<Box<dyn Plan<A>>>,
    stopping: bool,
}

/// What one cycle produced.
pub(crate) struct CycleOutcome<A> {
    pub(crate) actions: Vec<A>,
    pub(crate) reschedule: bool,
}

impl<A> CycleOutcome<A> {
    const fn idle() -> Self {
        Self {
            actions: Vec::new(),
            reschedule: false,
        }
    }
}

/// An autonomous agent driven by the deliberation cycle.
pub struct Agent<A> {
    id: AgentId,
    me: Weak<Self>,
    scheme_base: PlanSchemeBase<A>,
    contexts: ContextContainer,
    sense_reason_cycle: Vec<SenseReasonStep>,
    act_cycle: Vec<ActStep>,
    scheduler: Option<Arc<dyn Scheduler<A>>>,
    messenger: Option<Arc<dyn Messenger<A>>>,
    inbox: Mutex<Inbox>,
    state: Mutex<AgentState<A>>,
    done: AtomicBool,
}

impl<A> Agent<A> {
    /// Build an agent with a fresh id.
    pub fn new(arguments: AgentArguments<A>, wiring: AgentWiring<A>) -> Arc<Self>
    where
        A: 'static,
    {
        Self::with_id(AgentId::new(), arguments, wiring)
    }

    /// Build an agent with a caller-chosen id.
    pub fn with_id(id: AgentId, arguments: AgentArguments<A>, wiring: AgentWiring<A>) -> Arc<Self>
    where
        A: 'static,
    {
        let blueprint = arguments.build();
        let plans = blueprint
            .initial_plans
            .into_iter()
            .map(ActivePlan::detached)
            .collect();
        Arc::new_cyclic(|me| Self {
            id,
            me: Weak::clone(me),
            scheme_base: blueprint.scheme_base,
            contexts: blueprint.contexts,
            sense_reason_cycle: blueprint.sense_reason_cycle,
            act_cycle: blueprint.act_cycle,
            scheduler: wiring.scheduler,
            messenger: wiring.messenger,
            inbox: Mutex::new(Inbox::default()),
            state: Mutex::new(AgentState {
                goals: Vec::new(),
                plans,
                interceptors: blueprint.interceptors,
                shutdown_plans: blueprint.shutdown_plans,
                stopping: false,
            }),
            done: AtomicBool::new(false),
        })
    }

    /// The agent's identity.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// The agent's contexts.
    pub const fn contexts(&self) -> &ContextContainer {
        &self.contexts
    }

    /// The agent's immutable plan schemes.
    pub const fn scheme_base(&self) -> &PlanSchemeBase<A> {
        &self.scheme_base
    }

    /// The agent's messenger, if connected.
    pub fn messenger(&self) -> Option<&Arc<dyn Messenger<A>>> {
        self.messenger.as_ref()
    }

    /// Queue an environment event and wake the agent.
    pub fn add_external_trigger(&self, trigger: Trigger) {
        self.lock_inbox().external.push(trigger);
        self.wake();
    }

    /// Queue a self-directed event and wake the agent.
    pub fn add_internal_trigger(&self, trigger: Trigger) {
        self.lock_inbox().internal.push(trigger);
        self.wake();
    }

    /// Queue a received message and wake the agent.
    pub fn receive_message(&self, message: Message) {
        self.lock_inbox().messages.push(Trigger::Message(message));
        self.wake();
    }

    /// Adopt a goal and wake the agent. Re-adopting a goal that is already
    /// held is a no-op.
    pub fn adopt_goal(&self, goal: GoalHandle) {
        self.lock_inbox().goals.push(goal);
        self.wake();
    }

    /// Ask the agent to run its shutdown plans and stop.
    pub fn request_stop(&self) {
        self.lock_inbox().stop_requested = true;
        self.wake();
    }

    /// Send a message through this agent's messenger.
    pub fn send(&self, message: Message) -> Result<(), MessengerError> {
        self.messenger
            .as_deref()
            .ok_or(MessengerError::NotConnected { agent_id: self.id })?
            .deliver(message)
    }

    /// Queue this agent for the next tick, if it has a scheduler and is
    /// still running.
    pub fn wake(&self) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        if self.is_done() {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            let accepted = scheduler.schedule_for_next_tick(DeliberationRunnable::new(me));
            tracing::trace!(agent_id = %self.id, accepted, "Agent woken");
        }
    }

    /// Goals currently held, achieved or not.
    pub fn goals(&self) -> Vec<GoalHandle> {
        self.lock_state().goals.clone()
    }

    /// Number of plans that will run in the next act stage.
    pub fn active_plan_count(&self) -> usize {
        self.lock_state().plans.len()
    }

    /// Number of interceptors registered under `kind`.
    pub fn interceptor_count(&self, kind: TriggerKind) -> usize {
        self.lock_state().interceptors.len(kind)
    }

    /// Whether the agent has run its shutdown plans.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Whether another cycle would have anything to do: active plans, queued
    /// triggers, or a pending stop.
    pub fn has_pending_work(&self) -> bool {
        if self.is_done() {
            return false;
        }
        let busy = {
            let state = self.lock_state();
            state.stopping || !state.plans.is_empty()
        };
        busy || !self.lock_inbox().is_empty()
    }

    /// Run one deliberation cycle.
    pub(crate) fn run_cycle(&self) -> Result<CycleOutcome<A>, DeliberationError> {
        if self.is_done() {
            return Ok(CycleOutcome::idle());
        }
        let mut guard = self.lock_state();
        let state = &mut *guard;

        let mut inbox = mem::take(&mut *self.lock_inbox());
        for goal in mem::take(&mut inbox.goals) {
            if !state.goals.contains(&goal) {
                state.goals.push(goal);
            }
        }
        if inbox.stop_requested {
            state.stopping = true;
        }
        if state.stopping {
            return Ok(self.shut_down(state));
        }

        let contexts = &self.contexts;
        state.goals.retain(|goal| {
            let achieved = goal.is_achieved(contexts);
            if achieved {
                goal.set_pursued(false);
                tracing::debug!(agent_id = %self.id, goal_id = %goal.id(), "Goal achieved");
            }
            !achieved
        });

        self.sense_reason(state, &mut inbox);

        let mut effects = PlanEffects::default();
        let mut actions = Vec::new();
        let mut executed = 0_usize;
        let mut failure = None;
        for step in &self.act_cycle {
            match step {
                ActStep::ExecutePlans => {
                    match self.execute_plans(state, &mut effects, &mut actions) {
                        Ok(count) => executed = executed.saturating_add(count),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
        }

        self.apply_effects(state, effects);

        if let Some(source) = failure {
            tracing::warn!(agent_id = %self.id, error = %source, "Plan execution failed");
            return Err(DeliberationError::Plan {
                agent_id: self.id,
                source,
            });
        }

        let reschedule = executed > 0
            || !state.plans.is_empty()
            || state.stopping
            || !self.lock_inbox().is_empty();
        tracing::debug!(
            agent_id = %self.id,
            executed,
            actions = actions.len(),
            active_plans = state.plans.len(),
            reschedule,
            "Deliberation cycle complete"
        );
        Ok(CycleOutcome { actions, reschedule })
    }

    fn sense_reason(&self, state: &mut AgentState<A>, inbox: &mut Inbox) {
        let view = AgentView::new(self.id, &self.contexts);
        for step in &self.sense_reason_cycle {
            let kind = step.kind();
            let mut triggers = match kind {
                TriggerKind::Goal => state.goals.iter().cloned().map(Trigger::Goal).collect(),
                TriggerKind::External => mem::take(&mut inbox.external),
                TriggerKind::Internal => mem::take(&mut inbox.internal),
                TriggerKind::Message => mem::take(&mut inbox.messages),
            };
            if triggers.is_empty() {
                continue;
            }

            let mut fresh = apply_trigger_interceptors(
                &mut triggers,
                state.interceptors.list_mut(kind),
                &view,
            );
            fresh.extend(apply_plan_schemes(
                &triggers,
                self.scheme_base.schemes(kind),
                &view,
            ));
            if !fresh.is_empty() {
                tracing::trace!(
                    agent_id = %self.id,
                    category = %kind,
                    instantiated = fresh.len(),
                    "Plans instantiated"
                );
            }
            state.plans.extend(
                fresh
                    .into_iter()
                    .map(|hit| ActivePlan::instantiated(hit.plan, &hit.trigger)),
            );
        }
    }

    /// Run every active plan once. On a plan error the failing plan is
    /// dropped, the plans not yet run stay active, and the error is returned.
    fn execute_plans(
        &self,
        state: &mut AgentState<A>,
        effects: &mut PlanEffects<A>,
        actions: &mut Vec<A>,
    ) -> Result<usize, PlanError> {
        let mut executed = 0_usize;
        let mut pending = mem::take(&mut state.plans).into_iter();
        while let Some(mut plan) = pending.next() {
            let mut ctx = PlanContext::new(
                self.id,
                &self.contexts,
                &mut state.interceptors,
                self.messenger.as_deref(),
                effects,
            );
            let result = plan.execute(&mut ctx);
            let finished = ctx.is_finished();
            executed = executed.saturating_add(1);
            match result {
                Ok(action) => {
                    actions.extend(action);
                    if finished {
                        plan.release();
                    } else {
                        state.plans.push(plan);
                    }
                }
                Err(e) => {
                    plan.release();
                    state.plans.extend(pending);
                    return Err(e);
                }
            }
        }
        Ok(executed)
    }

    fn apply_effects(&self, state: &mut AgentState<A>, effects: PlanEffects<A>) {
        let PlanEffects {
            internal_triggers,
            adopted_goals,
            adopted_plans,
            stop_requested,
        } = effects;
        if !internal_triggers.is_empty() {
            self.lock_inbox().internal.extend(internal_triggers);
        }
        for goal in adopted_goals {
            if !state.goals.contains(&goal) {
                state.goals.push(goal);
            }
        }
        state
            .plans
            .extend(adopted_plans.into_iter().map(ActivePlan::detached));
        if stop_requested {
            state.stopping = true;
        }
    }

    fn shut_down(&self, state: &mut AgentState<A>) -> CycleOutcome<A> {
        let mut effects = PlanEffects::default();
        let mut actions = Vec::new();
        for mut plan in mem::take(&mut state.shutdown_plans) {
            let mut ctx = PlanContext::new(
                self.id,
                &self.contexts,
                &mut state.interceptors,
                self.messenger.as_deref(),
                &mut effects,
            );
            match plan.execute(&mut ctx) {
                Ok(action) => actions.extend(action),
                Err(e) => {
                    tracing::warn!(agent_id = %self.id, error = %e, "Shutdown plan failed");
                }
            }
        }
        for plan in mem::take(&mut state.plans) {
            plan.release();
        }
        for goal in mem::take(&mut state.goals) {
            goal.set_pursued(false);
        }
        self.done.store(true, Ordering::Release);
        tracing::info!(agent_id = %self.id, actions = actions.len(), "Agent stopped");
        CycleOutcome {
            actions,
            reschedule: false,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, AgentState<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A> fmt::Debug for Agent<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("scheme_base", &self.scheme_base)
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}

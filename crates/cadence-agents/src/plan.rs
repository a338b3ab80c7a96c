//! Plans and the interface plans use to act on their agent.
//!
//! A [`Plan`] is a stateful, possibly multi-cycle unit of work. Each time the
//! act stage runs it, the plan may produce one action and may mark itself
//! finished through [`PlanContext::finish`]. The finished latch only moves
//! from `false` to `true`; once set, the agent drops the plan after the
//! current execution.
//!
//! Side effects a plan requests (internal triggers, adopted goals, adopted
//! plans) are buffered and become visible from the agent's next cycle on.
//! Interceptor additions and removals apply immediately.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use cadence_types::{AgentId, ContextContainer, GoalHandle, InterceptorId, Message, Trigger, TriggerKind};

use crate::error::{MessengerError, PlanError};
use crate::interceptor::{InterceptorBase, TriggerInterceptor};
use crate::messenger::Messenger;

/// A stateful computation that produces at most one action per execution.
pub trait Plan<A>: Send {
    /// Advance the plan by one step.
    ///
    /// Returning `Ok(None)` means "no action this cycle". Call
    /// [`PlanContext::finish`] to have the plan dropped after this call.
    fn execute(&mut self, ctx: &mut PlanContext<'_, A>) -> Result<Option<A>, PlanError>;
}

/// A plan body that receives the trigger that caused its instantiation on
/// every execution.
pub trait DecoupledPlan<A>: Send {
    /// Advance the plan by one step, given its originating trigger.
    fn execute(
        &mut self,
        trigger: &Trigger,
        ctx: &mut PlanContext<'_, A>,
    ) -> Result<Option<A>, PlanError>;
}

/// Buffered plan side effects, applied by the agent after the act stage.
pub(crate) struct PlanEffects<A> {
    pub(crate) internal_triggers: Vec<Trigger>,
    pub(crate) adopted_goals: Vec<GoalHandle>,
    pub(crate) adopted_plans: Vec<Box<dyn Plan<A>>>,
    pub(crate) stop_requested: bool,
}

impl<A> Default for PlanEffects<A> {
    fn default() -> Self {
        Self {
            internal_triggers: Vec::new(),
            adopted_goals: Vec::new(),
            adopted_plans: Vec::new(),
            stop_requested: false,
        }
    }
}

/// What a plan can see and do while it executes.
pub struct PlanContext<'a, A> {
    agent_id: AgentId,
    contexts: &'a ContextContainer,
    interceptors: &'a mut InterceptorBase<A>,
    messenger: Option<&'a dyn Messenger<A>>,
    effects: &'a mut PlanEffects<A>,
    finished: bool,
}

impl<'a, A> PlanContext<'a, A> {
    pub(crate) fn new(
        agent_id: AgentId,
        contexts: &'a ContextContainer,
        interceptors: &'a mut InterceptorBase<A>,
        messenger: Option<&'a dyn Messenger<A>>,
        effects: &'a mut PlanEffects<A>,
    ) -> Self {
        Self {
            agent_id,
            contexts,
            interceptors,
            messenger,
            effects,
            finished: false,
        }
    }

    /// The executing agent.
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// The agent's context registry.
    pub const fn contexts(&self) -> &ContextContainer {
        self.contexts
    }

    /// Look up a context by key type.
    pub fn context<K: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<K>> {
        self.contexts.get::<K>()
    }

    /// Look up a context by key type, failing the plan if it is missing.
    pub fn require_context<K: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<K>, PlanError> {
        self.contexts.get::<K>().ok_or(PlanError::MissingContext {
            type_name: type_name::<K>(),
        })
    }

    /// Mark the plan finished. Irreversible.
    pub const fn finish(&mut self) {
        self.finished = true;
    }

    /// Whether [`finish`](Self::finish) was called during this execution.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Raise an internal trigger, visible to the agent's next cycle.
    pub fn raise<T: Any + Send + Sync>(&mut self, value: T) {
        self.effects.internal_triggers.push(Trigger::internal(value));
    }

    /// Adopt a goal; it is matched against goal schemes from the next cycle.
    pub fn adopt_goal(&mut self, goal: GoalHandle) {
        self.effects.adopted_goals.push(goal);
    }

    /// Adopt a plan; it first executes in the next cycle's act stage.
    pub fn adopt_plan(&mut self, plan: Box<dyn Plan<A>>) {
        self.effects.adopted_plans.push(plan);
    }

    /// Register an interceptor in the given category.
    pub fn add_interceptor(&mut self, kind: TriggerKind, interceptor: TriggerInterceptor<A>) -> InterceptorId {
        self.interceptors.add(kind, interceptor)
    }

    /// Remove an interceptor. Returns whether it was still registered.
    pub fn remove_interceptor(&mut self, kind: TriggerKind, id: InterceptorId) -> bool {
        self.interceptors.remove(kind, id)
    }

    /// Send a message through the agent's messenger.
    pub fn send(&self, message: Message) -> Result<(), MessengerError> {
        let messenger = self.messenger.ok_or(MessengerError::NotConnected {
            agent_id: self.agent_id,
        })?;
        messenger.deliver(message)
    }

    /// Ask the agent to stop after this cycle; shutdown plans run next cycle.
    pub const fn request_stop(&mut self) {
        self.effects.stop_requested = true;
    }
}

impl<A> fmt::Debug for PlanContext<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanContext")
            .field("agent_id", &self.agent_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// A plan that runs its body once and finishes automatically.
pub struct RunOncePlan<F> {
    body: Option<F>,
}

impl<F> RunOncePlan<F> {
    /// Wrap a single-shot body.
    pub fn new<A>(body: F) -> Self
    where
        F: FnOnce(&mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> + Send,
    {
        Self { body: Some(body) }
    }
}

impl<A, F> Plan<A> for RunOncePlan<F>
where
    F: FnOnce(&mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> + Send,
{
    fn execute(&mut self, ctx: &mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> {
        ctx.finish();
        self.body.take().map_or(Ok(None), |body| body(ctx))
    }
}

/// A multi-cycle plan backed by a closure; the closure decides when to
/// call [`PlanContext::finish`].
pub struct FnPlan<F> {
    body: F,
}

impl<A, F> Plan<A> for FnPlan<F>
where
    F: FnMut(&mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> + Send,
{
    fn execute(&mut self, ctx: &mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> {
        (self.body)(ctx)
    }
}

/// Box a single-shot plan body.
pub fn run_once<A, F>(body: F) -> Box<dyn Plan<A>>
where
    A: 'static,
    F: FnOnce(&mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> + Send + 'static,
{
    Box::new(RunOncePlan::new::<A>(body))
}

/// Box a multi-cycle plan body.
pub fn plan_fn<A, F>(body: F) -> Box<dyn Plan<A>>
where
    A: 'static,
    F: FnMut(&mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> + Send + 'static,
{
    Box::new(FnPlan { body })
}

struct FnDecoupled<F> {
    body: F,
}

impl<A, F> DecoupledPlan<A> for FnDecoupled<F>
where
    F: FnMut(&Trigger, &mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> + Send,
{
    fn execute(
        &mut self,
        trigger: &Trigger,
        ctx: &mut PlanContext<'_, A>,
    ) -> Result<Option<A>, PlanError> {
        (self.body)(trigger, ctx)
    }
}

/// Box a decoupled plan body.
pub fn decoupled<A, F>(body: F) -> Box<dyn DecoupledPlan<A>>
where
    A: 'static,
    F: FnMut(&Trigger, &mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> + Send + 'static,
{
    Box::new(FnDecoupled { body })
}

/// A plan currently owned by an agent, with the goal it pursues (if any).
pub(crate) struct ActivePlan<A> {
    plan: Box<dyn Plan<A>>,
    goal: Option<GoalHandle>,
}

impl<A> ActivePlan<A> {
    /// Register a freshly instantiated plan, marking `trigger` pursued if it
    /// is a goal.
    pub(crate) fn instantiated(plan: Box<dyn Plan<A>>, trigger: &Trigger) -> Self {
        let goal = trigger.as_goal().cloned();
        if let Some(goal) = &goal {
            goal.set_pursued(true);
        }
        Self { plan, goal }
    }

    /// Wrap a plan that pursues no goal (initial, adopted, shutdown plans).
    pub(crate) const fn detached(plan: Box<dyn Plan<A>>) -> Self {
        Self { plan, goal: None }
    }

    pub(crate) fn execute(&mut self, ctx: &mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> {
        self.plan.execute(ctx)
    }

    /// The plan is being dropped: its goal is free to be matched again.
    pub(crate) fn release(self) {
        if let Some(goal) = self.goal {
            goal.set_pursued(false);
        }
    }
}

//! The agent construction builder.
//!
//! [`AgentArguments`] collects everything an agent is made of: plan schemes
//! per trigger category, contexts, initial interceptors, initial and
//! shutdown plans, and the deliberation step lists. [`AgentArguments::build`]
//! consumes the builder and returns an [`AgentBlueprint`] whose scheme base
//! can no longer change.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use cadence_types::{ContextContainer, TriggerKind};

use crate::deliberation::{ActStep, SenseReasonStep};
use crate::interceptor::{InterceptorBase, TriggerInterceptor};
use crate::plan::Plan;
use crate::scheme::{AgentView, BoxedScheme, PlanScheme, PlanSchemeBase, scheme_fn};

/// Builder for an agent's capabilities.
pub struct AgentArguments<A> {
    goal_schemes: Vec<BoxedScheme<A>>,
    external_schemes: Vec<BoxedScheme<A>>,
    internal_schemes: Vec<BoxedScheme<A>>,
    message_schemes: Vec<BoxedScheme<A>>,
    contexts: ContextContainer,
    interceptors: Vec<(TriggerKind, TriggerInterceptor<A>)>,
    initial_plans: Vec<Box<dyn Plan<A>>>,
    shutdown_plans: Vec<Box<dyn Plan<A>>>,
    sense_reason_cycle: Vec<SenseReasonStep>,
    act_cycle: Vec<ActStep>,
}

impl<A> Default for AgentArguments<A> {
    fn default() -> Self {
        Self {
            goal_schemes: Vec::new(),
            external_schemes: Vec::new(),
            internal_schemes: Vec::new(),
            message_schemes: Vec::new(),
            contexts: ContextContainer::new(),
            interceptors: Vec::new(),
            initial_plans: Vec::new(),
            shutdown_plans: Vec::new(),
            sense_reason_cycle: SenseReasonStep::default_cycle(),
            act_cycle: ActStep::default_cycle(),
        }
    }
}

impl<A: 'static> AgentArguments<A> {
    /// Empty builder with the standard deliberation cycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plan scheme to the list for `kind`.
    #[must_use]
    pub fn add_plan_scheme(mut self, kind: TriggerKind, scheme: impl PlanScheme<A> + 'static) -> Self {
        self.schemes_mut(kind).push(Box::new(scheme));
        self
    }

    /// Append a closure as a plan scheme for `kind`.
    #[must_use]
    pub fn add_plan_scheme_fn<F>(self, kind: TriggerKind, body: F) -> Self
    where
        F: Fn(&cadence_types::Trigger, &AgentView<'_>) -> Option<Box<dyn Plan<A>>> + Send + Sync + 'static,
    {
        self.add_plan_scheme(kind, scheme_fn(body))
    }

    /// Append a goal plan scheme.
    #[must_use]
    pub fn add_goal_plan_scheme(self, scheme: impl PlanScheme<A> + 'static) -> Self {
        self.add_plan_scheme(TriggerKind::Goal, scheme)
    }

    /// Append an external-trigger plan scheme.
    #[must_use]
    pub fn add_external_trigger_plan_scheme(self, scheme: impl PlanScheme<A> + 'static) -> Self {
        self.add_plan_scheme(TriggerKind::External, scheme)
    }

    /// Append an internal-trigger plan scheme.
    #[must_use]
    pub fn add_internal_trigger_plan_scheme(self, scheme: impl PlanScheme<A> + 'static) -> Self {
        self.add_plan_scheme(TriggerKind::Internal, scheme)
    }

    /// Append a message plan scheme.
    #[must_use]
    pub fn add_message_plan_scheme(self, scheme: impl PlanScheme<A> + 'static) -> Self {
        self.add_plan_scheme(TriggerKind::Message, scheme)
    }

    /// Register a context under its own type.
    #[must_use]
    pub fn add_context<C: Any + Send + Sync>(mut self, context: C) -> Self {
        self.contexts.insert(context);
        self
    }

    /// Register a shared context under an explicit key type, typically a
    /// trait object.
    #[must_use]
    pub fn add_context_arc<K: ?Sized + Any + Send + Sync>(mut self, context: Arc<K>) -> Self {
        self.contexts.insert_arc(context);
        self
    }

    /// Register an interceptor the agent starts out with.
    #[must_use]
    pub fn add_interceptor(mut self, kind: TriggerKind, interceptor: TriggerInterceptor<A>) -> Self {
        self.interceptors.push((kind, interceptor));
        self
    }

    /// Add a plan that runs from the agent's first cycle.
    #[must_use]
    pub fn add_initial_plan(mut self, plan: Box<dyn Plan<A>>) -> Self {
        self.initial_plans.push(plan);
        self
    }

    /// Add a plan that runs once, in the cycle after a stop was requested.
    #[must_use]
    pub fn add_shutdown_plan(mut self, plan: Box<dyn Plan<A>>) -> Self {
        self.shutdown_plans.push(plan);
        self
    }

    /// Replace the sense/reason step list.
    #[must_use]
    pub fn with_sense_reason_cycle(mut self, steps: Vec<SenseReasonStep>) -> Self {
        self.sense_reason_cycle = steps;
        self
    }

    /// Replace the act step list.
    #[must_use]
    pub fn with_act_cycle(mut self, steps: Vec<ActStep>) -> Self {
        self.act_cycle = steps;
        self
    }

    /// Merge another builder's schemes, contexts, interceptors and plans
    /// into this one. Its schemes go after the ones already present;
    /// contexts it registers replace ours under the same key. The step
    /// lists of `other` are ignored.
    #[must_use]
    pub fn include(mut self, other: Self) -> Self {
        self.goal_schemes.extend(other.goal_schemes);
        self.external_schemes.extend(other.external_schemes);
        self.internal_schemes.extend(other.internal_schemes);
        self.message_schemes.extend(other.message_schemes);
        self.contexts.merge(other.contexts);
        self.interceptors.extend(other.interceptors);
        self.initial_plans.extend(other.initial_plans);
        self.shutdown_plans.extend(other.shutdown_plans);
        self
    }

    /// Finalize the builder.
    pub fn build(self) -> AgentBlueprint<A> {
        let mut interceptors = InterceptorBase::default();
        for (kind, interceptor) in self.interceptors {
            interceptors.add(kind, interceptor);
        }
        AgentBlueprint {
            scheme_base: PlanSchemeBase::new(
                self.goal_schemes,
                self.external_schemes,
                self.internal_schemes,
                self.message_schemes,
            ),
            contexts: self.contexts,
            interceptors,
            initial_plans: self.initial_plans,
            shutdown_plans: self.shutdown_plans,
            sense_reason_cycle: self.sense_reason_cycle,
            act_cycle: self.act_cycle,
        }
    }

    fn schemes_mut(&mut self, kind: TriggerKind) -> &mut Vec<BoxedScheme<A>> {
        match kind {
            TriggerKind::Goal => &mut self.goal_schemes,
            TriggerKind::External => &mut self.external_schemes,
            TriggerKind::Internal => &mut self.internal_schemes,
            TriggerKind::Message => &mut self.message_schemes,
        }
    }
}

impl<A> fmt::Debug for AgentArguments<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentArguments")
            .field("goal_schemes", &self.goal_schemes.len())
            .field("external_schemes", &self.external_schemes.len())
            .field("internal_schemes", &self.internal_schemes.len())
            .field("message_schemes", &self.message_schemes.len())
            .field("contexts", &self.contexts)
            .field("interceptors", &self.interceptors.len())
            .field("initial_plans", &self.initial_plans.len())
            .field("shutdown_plans", &self.shutdown_plans.len())
            .finish()
    }
}

/// The finalized parts of an agent.
pub struct AgentBlueprint<A> {
    pub(crate) scheme_base: PlanSchemeBase<A>,
    pub(crate) contexts: ContextContainer,
    pub(crate) interceptors: InterceptorBase<A>,
    pub(crate) initial_plans: Vec<Box<dyn Plan<A>>>,
    pub(crate) shutdown_plans: Vec<Box<dyn Plan<A>>>,
    pub(crate) sense_reason_cycle: Vec<SenseReasonStep>,
    pub(crate) act_cycle: Vec<ActStep>,
}

impl<A> AgentBlueprint<A> {
    /// The immutable scheme base.
    pub const fn scheme_base(&self) -> &PlanSchemeBase<A> {
        &self.scheme_base
    }

    /// The registered contexts.
    pub const fn contexts(&self) -> &ContextContainer {
        &self.contexts
    }
}

impl<A> fmt::Debug for AgentBlueprint<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBlueprint")
            .field("scheme_base", &self.scheme_base)
            .field("interceptors", &self.interceptors)
            .field("initial_plans", &self.initial_plans.len())
            .field("shutdown_plans", &self.shutdown_plans.len())
            .finish_non_exhaustive()
    }
}

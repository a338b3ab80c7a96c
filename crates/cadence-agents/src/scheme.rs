//! Plan schemes and the immutable per-agent scheme base.
//!
//! A [`PlanScheme`] maps a trigger (plus a read-only view of the agent) to a
//! plan, or to `None` when it does not apply. Schemes are stateless with
//! respect to matching; any state they need lives in the agent's contexts.
//!
//! Each agent owns one [`PlanSchemeBase`] holding four ordered scheme lists,
//! one per [`TriggerKind`]. Order matters: the first scheme that instantiates
//! a plan for a trigger wins.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use cadence_types::{AgentId, ContextContainer, Trigger, TriggerKind};

use crate::plan::Plan;

/// Read-only view of an agent handed to schemes while matching.
#[derive(Debug, Clone, Copy)]
pub struct AgentView<'a> {
    agent_id: AgentId,
    contexts: &'a ContextContainer,
}

impl<'a> AgentView<'a> {
    /// Build a view over an agent's identity and contexts.
    pub const fn new(agent_id: AgentId, contexts: &'a ContextContainer) -> Self {
        Self { agent_id, contexts }
    }

    /// The agent being deliberated.
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// The agent's context registry.
    pub const fn contexts(&self) -> &'a ContextContainer {
        self.contexts
    }

    /// Look up a context by key type.
    pub fn context<K: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<K>> {
        self.contexts.get::<K>()
    }
}

/// A rule mapping a trigger to a plan.
pub trait PlanScheme<A>: Send + Sync {
    /// Try to instantiate a plan for `trigger`. `None` means no match.
    fn instantiate(&self, trigger: &Trigger, agent: &AgentView<'_>) -> Option<Box<dyn Plan<A>>>;
}

/// A plan scheme backed by a closure.
pub struct FunctionalPlanScheme<F> {
    body: F,
}

impl<A, F> PlanScheme<A> for FunctionalPlanScheme<F>
where
    F: Fn(&Trigger, &AgentView<'_>) -> Option<Box<dyn Plan<A>>> + Send + Sync,
{
    fn instantiate(&self, trigger: &Trigger, agent: &AgentView<'_>) -> Option<Box<dyn Plan<A>>> {
        (self.body)(trigger, agent)
    }
}

/// Wrap a closure as a plan scheme.
pub fn scheme_fn<A, F>(body: F) -> FunctionalPlanScheme<F>
where
    F: Fn(&Trigger, &AgentView<'_>) -> Option<Box<dyn Plan<A>>> + Send + Sync,
{
    FunctionalPlanScheme { body }
}

/// Boxed scheme as stored in a scheme base.
pub type BoxedScheme<A> = Box<dyn PlanScheme<A>>;

/// The four ordered scheme lists of one agent. Immutable once built.
pub struct PlanSchemeBase<A> {
    goal: Vec<BoxedScheme<A>>,
    external: Vec<BoxedScheme<A>>,
    internal: Vec<BoxedScheme<A>>,
    message: Vec<BoxedScheme<A>>,
}

impl<A> PlanSchemeBase<A> {
    /// Take ownership of the four lists.
    pub(crate) const fn new(
        goal: Vec<BoxedScheme<A>>,
        external: Vec<BoxedScheme<A>>,
        internal: Vec<BoxedScheme<A>>,
        message: Vec<BoxedScheme<A>>,
    ) -> Self {
        Self {
            goal,
            external,
            internal,
            message,
        }
    }

    /// The schemes for one trigger category, in declared order.
    pub fn schemes(&self, kind: TriggerKind) -> &[BoxedScheme<A>] {
        match kind {
            TriggerKind::Goal => &self.goal,
            TriggerKind::External => &self.external,
            TriggerKind::Internal => &self.internal,
            TriggerKind::Message => &self.message,
        }
    }

    /// Total number of schemes across all categories.
    pub fn len(&self) -> usize {
        TriggerKind::ALL
            .iter()
            .map(|kind| self.schemes(*kind).len())
            .sum()
    }

    /// Whether no scheme was registered in any category.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> fmt::Debug for PlanSchemeBase<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanSchemeBase")
            .field("goal", &self.goal.len())
            .field("external", &self.external.len())
            .field("internal", &self.internal.len())
            .field("message", &self.message.len())
            .finish()
    }
}

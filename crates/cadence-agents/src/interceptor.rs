//! Trigger interceptors.
//!
//! An interceptor is a plan scheme with an identity and a `consumes_trigger`
//! flag. Interceptors run before the ordinary plan schemes of their
//! category, fire at most once, and are dropped from their list as soon as
//! they instantiate a plan. A consuming interceptor also removes the trigger
//! it fired on, unless that trigger is a goal.
//!
//! [`EnhancedInterceptor`] adds a trigger predicate, a decoupled plan body,
//! and a set of other interceptors to remove the first time its plan runs.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use cadence_types::{InterceptorId, Trigger, TriggerKind};

use crate::error::PlanError;
use crate::plan::{DecoupledPlan, Plan, PlanContext};
use crate::scheme::{AgentView, PlanScheme};

/// A one-shot plan scheme with an identity.
pub struct TriggerInterceptor<A> {
    id: InterceptorId,
    consumes_trigger: bool,
    scheme: Box<dyn PlanScheme<A>>,
}

impl<A> TriggerInterceptor<A> {
    /// Wrap a scheme as an interceptor with a fresh id.
    pub fn new(consumes_trigger: bool, scheme: impl PlanScheme<A> + 'static) -> Self {
        Self {
            id: InterceptorId::new(),
            consumes_trigger,
            scheme: Box::new(scheme),
        }
    }

    /// The interceptor's identity, used for targeted removal.
    pub const fn id(&self) -> InterceptorId {
        self.id
    }

    /// Whether a non-goal trigger is removed once this interceptor fires.
    pub const fn consumes_trigger(&self) -> bool {
        self.consumes_trigger
    }

    /// Try to instantiate a plan for `trigger`.
    pub fn instantiate(&self, trigger: &Trigger, agent: &AgentView<'_>) -> Option<Box<dyn Plan<A>>> {
        self.scheme.instantiate(trigger, agent)
    }
}

impl<A> fmt::Debug for TriggerInterceptor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerInterceptor")
            .field("id", &self.id)
            .field("consumes_trigger", &self.consumes_trigger)
            .finish_non_exhaustive()
    }
}

/// The four mutable interceptor lists of one agent.
pub struct InterceptorBase<A> {
    goal: Vec<TriggerInterceptor<A>>,
    external: Vec<TriggerInterceptor<A>>,
    internal: Vec<TriggerInterceptor<A>>,
    message: Vec<TriggerInterceptor<A>>,
}

impl<A> Default for InterceptorBase<A> {
    fn default() -> Self {
        Self {
            goal: Vec::new(),
            external: Vec::new(),
            internal: Vec::new(),
            message: Vec::new(),
        }
    }
}

impl<A> InterceptorBase<A> {
    /// Append an interceptor to a category; returns its id.
    pub fn add(&mut self, kind: TriggerKind, interceptor: TriggerInterceptor<A>) -> InterceptorId {
        let id = interceptor.id();
        self.list_mut(kind).push(interceptor);
        id
    }

    /// Remove an interceptor by id. Returns whether it was present.
    pub fn remove(&mut self, kind: TriggerKind, id: InterceptorId) -> bool {
        let list = self.list_mut(kind);
        let before = list.len();
        list.retain(|interceptor| interceptor.id() != id);
        list.len() != before
    }

    /// Whether an interceptor with `id` is registered under `kind`.
    pub fn contains(&self, kind: TriggerKind, id: InterceptorId) -> bool {
        self.list(kind).iter().any(|interceptor| interceptor.id() == id)
    }

    /// Number of interceptors registered under `kind`.
    pub fn len(&self, kind: TriggerKind) -> usize {
        self.list(kind).len()
    }

    /// Whether no interceptor is registered in any category.
    pub fn is_empty(&self) -> bool {
        TriggerKind::ALL.iter().all(|kind| self.list(*kind).is_empty())
    }

    pub(crate) fn list(&self, kind: TriggerKind) -> &Vec<TriggerInterceptor<A>> {
        match kind {
            TriggerKind::Goal => &self.goal,
            TriggerKind::External => &self.external,
            TriggerKind::Internal => &self.internal,
            TriggerKind::Message => &self.message,
        }
    }

    pub(crate) fn list_mut(&mut self, kind: TriggerKind) -> &mut Vec<TriggerInterceptor<A>> {
        match kind {
            TriggerKind::Goal => &mut self.goal,
            TriggerKind::External => &mut self.external,
            TriggerKind::Internal => &mut self.internal,
            TriggerKind::Message => &mut self.message,
        }
    }
}

impl<A> fmt::Debug for InterceptorBase<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorBase")
            .field("goal", &self.goal.len())
            .field("external", &self.external.len())
            .field("internal", &self.internal.len())
            .field("message", &self.message.len())
            .finish()
    }
}

type Selector = Box<dyn Fn(&Trigger) -> bool + Send + Sync>;

/// Interceptor built from a trigger predicate and a decoupled plan body.
///
/// The body is handed out on the first successful instantiation only. When
/// the resulting plan first executes, it removes every interceptor listed
/// through [`remove_on_fire`](Self::remove_on_fire) before running the body.
pub struct EnhancedInterceptor<A> {
    consumes_trigger: bool,
    selector: Selector,
    body: Mutex<Option<Box<dyn DecoupledPlan<A>>>>,
    removals: Vec<(TriggerKind, InterceptorId)>,
}

impl<A: 'static> EnhancedInterceptor<A> {
    /// Build an enhanced interceptor.
    pub fn new<S>(consumes_trigger: bool, selector: S, body: Box<dyn DecoupledPlan<A>>) -> Self
    where
        S: Fn(&Trigger) -> bool + Send + Sync + 'static,
    {
        Self {
            consumes_trigger,
            selector: Box::new(selector),
            body: Mutex::new(Some(body)),
            removals: Vec::new(),
        }
    }

    /// Also remove interceptor `id` of category `kind` when this one fires.
    #[must_use]
    pub fn remove_on_fire(mut self, kind: TriggerKind, id: InterceptorId) -> Self {
        self.removals.push((kind, id));
        self
    }

    /// Turn into a plain interceptor ready to register with an agent.
    pub fn into_interceptor(self) -> TriggerInterceptor<A> {
        let consumes = self.consumes_trigger;
        TriggerInterceptor::new(consumes, self)
    }
}

impl<A: 'static> PlanScheme<A> for EnhancedInterceptor<A> {
    fn instantiate(&self, trigger: &Trigger, _agent: &AgentView<'_>) -> Option<Box<dyn Plan<A>>> {
        if !(self.selector)(trigger) {
            return None;
        }
        let body = self
            .body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(Box::new(EnhancedPlan {
            trigger: trigger.clone(),
            body,
            removals: self.removals.clone(),
            removed: false,
        }))
    }
}

struct EnhancedPlan<A> {
    trigger: Trigger,
    body: Box<dyn DecoupledPlan<A>>,
    removals: Vec<(TriggerKind, InterceptorId)>,
    removed: bool,
}

impl<A> Plan<A> for EnhancedPlan<A> {
    fn execute(&mut self, ctx: &mut PlanContext<'_, A>) -> Result<Option<A>, PlanError> {
        if !self.removed {
            self.removed = true;
            for (kind, id) in &self.removals {
                let removed = ctx.remove_interceptor(*kind, *id);
                tracing::debug!(
                    agent_id = %ctx.agent_id(),
                    category = %kind,
                    interceptor_id = %id,
                    removed,
                    "Enhanced interceptor removed sibling"
                );
            }
        }
        self.body.execute(&self.trigger, ctx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_types::{AgentId, ContextContainer};

    use super::*;
    use crate::plan::{PlanEffects, decoupled, run_once};
    use crate::scheme::scheme_fn;

    fn always_matches() -> TriggerInterceptor<u32> {
        TriggerInterceptor::new(
            false,
            scheme_fn(|_: &Trigger, _: &AgentView<'_>| Some(run_once(|_: &mut PlanContext<'_, u32>| Ok(Some(1))))),
        )
    }

    #[test]
    fn base_adds_and_removes_by_id() {
        let mut base = InterceptorBase::default();
        let first = base.add(TriggerKind::Message, always_matches());
        let second = base.add(TriggerKind::Message, always_matches());
        assert_eq!(base.len(TriggerKind::Message), 2);
        assert!(base.remove(TriggerKind::Message, first));
        assert!(!base.remove(TriggerKind::Message, first));
        assert!(!base.remove(TriggerKind::External, second));
        assert!(base.contains(TriggerKind::Message, second));
        assert_eq!(base.len(TriggerKind::Message), 1);
    }

    #[test]
    fn enhanced_respects_selector_and_fires_once() {
        let enhanced = EnhancedInterceptor::new(
            true,
            |trigger: &Trigger| trigger.payload().is_some_and(|p| p.is::<u8>()),
            decoupled(|_: &Trigger, ctx: &mut PlanContext<'_, u32>| {
                ctx.finish();
                Ok(Some(7))
            }),
        );
        let contexts = ContextContainer::new();
        let view = AgentView::new(AgentId::new(), &contexts);
        assert!(enhanced.instantiate(&Trigger::external("nope"), &view).is_none());
        assert!(enhanced.instantiate(&Trigger::external(1_u8), &view).is_some());
        assert!(enhanced.instantiate(&Trigger::external(2_u8), &view).is_none());
    }

    #[test]
    fn enhanced_plan_removes_siblings_on_first_execution() {
        let mut base = InterceptorBase::default();
        let sibling = base.add(TriggerKind::Message, always_matches());
        let enhanced = EnhancedInterceptor::new(
            false,
            |_: &Trigger| true,
            decoupled(|_: &Trigger, _: &mut PlanContext<'_, u32>| Ok(Some(3))),
        )
        .remove_on_fire(TriggerKind::Message, sibling);

        let contexts = ContextContainer::new();
        let agent_id = AgentId::new();
        let mut plan = enhanced
            .instantiate(&Trigger::external(()), &AgentView::new(agent_id, &contexts))
            .unwrap();
        let mut effects = PlanEffects::default();
        let mut ctx = PlanContext::new(agent_id, &contexts, &mut base, None, &mut effects);
        assert_eq!(plan.execute(&mut ctx).unwrap(), Some(3));
        assert_eq!(plan.execute(&mut ctx).unwrap(), Some(3));
        assert_eq!(base.len(TriggerKind::Message), 0);
    }
}

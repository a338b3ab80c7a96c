//! The deliberation pipeline's building blocks.
//!
//! One cycle is a sense/reason pass followed by an act pass:
//!
//! 1. [`SenseReasonStep::ApplyGoalPlanSchemes`]
//! 2. [`SenseReasonStep::ApplyExternalTriggerPlanSchemes`]
//! 3. [`SenseReasonStep::ApplyInternalTriggerPlanSchemes`]
//! 4. [`SenseReasonStep::ApplyMessagePlanSchemes`]
//! 5. [`ActStep::ExecutePlans`]
//!
//! Every sense/reason step first runs the category's interceptors through
//! [`apply_trigger_interceptors`], then its plan schemes through
//! [`apply_plan_schemes`]. Goals that a live plan already pursues are
//! invisible to plan schemes; interceptors still see them.

use cadence_types::{Trigger, TriggerKind};

use crate::interceptor::TriggerInterceptor;
use crate::plan::Plan;
use crate::scheme::{AgentView, BoxedScheme};

/// A plan produced during sense/reason, together with the trigger that
/// caused it.
pub struct Instantiated<A> {
    /// The trigger the plan was instantiated for.
    pub trigger: Trigger,
    /// The new plan.
    pub plan: Box<dyn Plan<A>>,
}

impl<A> Instantiated<A> {
    fn new(trigger: Trigger, plan: Box<dyn Plan<A>>) -> Self {
        if let Some(goal) = trigger.as_goal() {
            goal.set_pursued(true);
        }
        Self { trigger, plan }
    }
}

impl<A> std::fmt::Debug for Instantiated<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instantiated")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

/// One sense/reason step. Each handles one trigger category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenseReasonStep {
    /// Match adopted, unpursued goals.
    ApplyGoalPlanSchemes,
    /// Match environment events.
    ApplyExternalTriggerPlanSchemes,
    /// Match self-raised events.
    ApplyInternalTriggerPlanSchemes,
    /// Match received messages.
    ApplyMessagePlanSchemes,
}

impl SenseReasonStep {
    /// The standard step order.
    pub fn default_cycle() -> Vec<Self> {
        vec![
            Self::ApplyGoalPlanSchemes,
            Self::ApplyExternalTriggerPlanSchemes,
            Self::ApplyInternalTriggerPlanSchemes,
            Self::ApplyMessagePlanSchemes,
        ]
    }

    /// The trigger category this step consumes.
    pub const fn kind(self) -> TriggerKind {
        match self {
            Self::ApplyGoalPlanSchemes => TriggerKind::Goal,
            Self::ApplyExternalTriggerPlanSchemes => TriggerKind::External,
            Self::ApplyInternalTriggerPlanSchemes => TriggerKind::Internal,
            Self::ApplyMessagePlanSchemes => TriggerKind::Message,
        }
    }
}

/// One act step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActStep {
    /// Run every active plan once, in instantiation order, collecting actions.
    ExecutePlans,
}

impl ActStep {
    /// The standard act order.
    pub fn default_cycle() -> Vec<Self> {
        vec![Self::ExecutePlans]
    }
}

fn is_pursued_goal(trigger: &Trigger) -> bool {
    trigger.as_goal().is_some_and(cadence_types::GoalHandle::is_pursued)
}

/// Offer each trigger to the schemes in declared order; the first scheme
/// that returns a plan wins and the rest are skipped for that trigger.
///
/// Pursued goals are skipped. A goal that matches is marked pursued before
/// the next trigger is considered.
pub fn apply_plan_schemes<A>(
    triggers: &[Trigger],
    schemes: &[BoxedScheme<A>],
    agent: &AgentView<'_>,
) -> Vec<Instantiated<A>> {
    let mut instantiated = Vec::new();
    for trigger in triggers {
        if is_pursued_goal(trigger) {
            continue;
        }
        if let Some(plan) = schemes
            .iter()
            .find_map(|scheme| scheme.instantiate(trigger, agent))
        {
            instantiated.push(Instantiated::new(trigger.clone(), plan));
        }
    }
    instantiated
}

/// Run each interceptor against the live triggers, in order.
///
/// An interceptor fires on the first trigger it instantiates a plan for and
/// is then removed from `interceptors`. If it consumes triggers and the
/// trigger is not a goal, the trigger leaves `triggers` before the next
/// interceptor scans. Goals are offered whether or not they are pursued.
/// Fired interceptors are compacted out after the scan.
pub fn apply_trigger_interceptors<A>(
    triggers: &mut Vec<Trigger>,
    interceptors: &mut Vec<TriggerInterceptor<A>>,
    agent: &AgentView<'_>,
) -> Vec<Instantiated<A>> {
    let mut instantiated = Vec::new();
    let mut fired = vec![false; interceptors.len()];

    for (interceptor, flag) in interceptors.iter().zip(fired.iter_mut()) {
        let hit = triggers
            .iter()
            .enumerate()
            .find_map(|(position, trigger)| {
                interceptor
                    .instantiate(trigger, agent)
                    .map(|plan| (position, plan))
            });
        let Some((position, plan)) = hit else {
            continue;
        };
        *flag = true;

        let consume = interceptor.consumes_trigger()
            && triggers.get(position).is_some_and(|trigger| !trigger.is_goal());
        let trigger = if consume {
            Some(triggers.remove(position))
        } else {
            triggers.get(position).cloned()
        };
        if let Some(trigger) = trigger {
            tracing::trace!(
                agent_id = %agent.agent_id(),
                interceptor_id = %interceptor.id(),
                category = %trigger.kind(),
                consumed = consume,
                "Interceptor fired"
            );
            instantiated.push(Instantiated::new(trigger, plan));
        }
    }

    let mut flags = fired.into_iter();
    interceptors.retain(|_| !flags.next().unwrap_or(false));
    instantiated
}

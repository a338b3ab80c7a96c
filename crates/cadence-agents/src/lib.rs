//! Agents and their deliberation cycle for the Cadence engine.
//!
//! An [`Agent`] turns triggers into plans and plans into actions, one
//! sense/reason/act cycle at a time. This crate knows nothing about ticks or
//! thread pools; it reaches the outside world only through the
//! [`Scheduler`] and [`Messenger`] traits.
//!
//! # Modules
//!
//! - [`plan`] -- [`Plan`], [`PlanContext`], and closure-backed plan helpers.
//! - [`scheme`] -- [`PlanScheme`], [`AgentView`], and the immutable
//!   [`PlanSchemeBase`].
//! - [`interceptor`] -- One-shot [`TriggerInterceptor`]s and the
//!   [`EnhancedInterceptor`] removal protocol.
//! - [`arguments`] -- The [`AgentArguments`] builder.
//! - [`deliberation`] -- Step lists and the matching functions.
//! - [`agent`] -- Agent state and the cycle itself.
//! - [`runnable`] -- [`DeliberationRunnable`] and its results.
//! - [`messenger`] -- The [`Messenger`] seam.
//! - [`error`] -- Error types.

pub mod agent;
pub mod arguments;
pub mod deliberation;
pub mod error;
pub mod interceptor;
pub mod messenger;
pub mod plan;
pub mod runnable;
pub mod scheme;

pub use agent::{Agent, AgentWiring};
pub use arguments::{AgentArguments, AgentBlueprint};
pub use deliberation::{ActStep, Instantiated, SenseReasonStep, apply_plan_schemes, apply_trigger_interceptors};
pub use error::{DeliberationError, MessengerError, PlanError};
pub use interceptor::{EnhancedInterceptor, InterceptorBase, TriggerInterceptor};
pub use messenger::Messenger;
pub use plan::{DecoupledPlan, FnPlan, Plan, PlanContext, RunOncePlan, decoupled, plan_fn, run_once};
pub use runnable::{DeliberationResult, DeliberationRunnable, ReschedulableResult, Scheduler};
pub use scheme::{AgentView, BoxedScheme, FunctionalPlanScheme, PlanScheme, PlanSchemeBase, scheme_fn};

//! Shared type definitions for the Cadence deliberation engine.
//!
//! Everything in this crate is plain data with no scheduling or
//! deliberation logic:
//!
//! - [`ids`] -- Type-safe UUID wrappers ([`AgentId`], [`GoalId`], [`InterceptorId`]).
//! - [`trigger`] -- The [`Trigger`] variants, opaque [`Payload`]s, [`Message`]s,
//!   and the [`Goal`] trait with its shared [`GoalHandle`].
//! - [`context`] -- [`ContextContainer`], the typed capability registry
//!   plan schemes consult while matching.

pub mod context;
pub mod ids;
pub mod trigger;

pub use context::ContextContainer;
pub use ids::{AgentId, GoalId, InterceptorId};
pub use trigger::{Goal, GoalHandle, Message, Payload, Trigger, TriggerKind};

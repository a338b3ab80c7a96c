//! Triggers: everything that can drive an agent's deliberation.
//!
//! A [`Trigger`] is one of four variants. External and internal triggers
//! carry an opaque [`Payload`]; messages carry a [`Message`]; goals carry a
//! [`GoalHandle`]. The only behavioral difference between the variants lives
//! in the deliberation pipeline: goals persist until achieved, are never
//! consumed by interceptors, and are skipped while pursued.

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextContainer;
use crate::ids::{AgentId, GoalId};

/// The four trigger categories. Each agent keeps one plan-scheme list and
/// one interceptor list per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Persistent goals.
    Goal,
    /// Events originating in the environment.
    External,
    /// Events an agent raises for itself.
    Internal,
    /// Messages received from other agents.
    Message,
}

impl TriggerKind {
    /// All categories in pipeline order.
    pub const ALL: [Self; 4] = [Self::Goal, Self::External, Self::Internal, Self::Message];
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Goal => "goal",
            Self::External => "external",
            Self::Internal => "internal",
            Self::Message => "message",
        };
        f.write_str(name)
    }
}

/// Type-erased, cheaply clonable event content.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Borrow the content as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.value).downcast_ref::<T>()
    }

    /// Whether the content is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        (*self.value).is::<T>()
    }

    /// Name of the wrapped type.
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A message exchanged between agents.
///
/// An empty receiver list means broadcast to every registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The sending agent.
    pub sender: AgentId,
    /// Intended receivers. Empty for broadcast.
    pub receivers: Vec<AgentId>,
    /// Message body.
    pub content: String,
    /// User-defined parameters (protocol, conversation id, ...).
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Wall-clock time the message was created.
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Create a broadcast message from `sender`.
    pub fn new(sender: AgentId, content: impl Into<String>) -> Self {
        Self {
            sender,
            receivers: Vec::new(),
            content: content.into(),
            parameters: BTreeMap::new(),
            sent_at: Utc::now(),
        }
    }

    /// Add a receiver.
    #[must_use]
    pub fn to(mut self, receiver: AgentId) -> Self {
        self.receivers.push(receiver);
        self
    }

    /// Set a user-defined parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Read a user-defined parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Whether the message has no explicit receivers.
    pub fn is_broadcast(&self) -> bool {
        self.receivers.is_empty()
    }
}

/// A persistent objective an agent pursues until it is achieved.
pub trait Goal: Any + Send + Sync + fmt::Debug {
    /// Whether the goal holds given the agent's current contexts.
    fn is_achieved(&self, contexts: &ContextContainer) -> bool;
}

struct GoalState {
    id: GoalId,
    goal: Arc<dyn Goal>,
    any: Arc<dyn Any + Send + Sync>,
    pursued: AtomicBool,
}

/// Shared handle to an adopted goal.
///
/// Clones share the same `pursued` flag, so the copy inside a
/// [`Trigger::Goal`] and the copy held by the plan pursuing it agree.
#[derive(Clone)]
pub struct GoalHandle {
    inner: Arc<GoalState>,
}

impl GoalHandle {
    /// Wrap a goal. The handle starts out not pursued.
    pub fn new<G: Goal>(goal: G) -> Self {
        let shared = Arc::new(goal);
        Self {
            inner: Arc::new(GoalState {
                id: GoalId::new(),
                goal: Arc::clone(&shared) as Arc<dyn Goal>,
                any: shared,
                pursued: AtomicBool::new(false),
            }),
        }
    }

    /// The goal's identifier.
    pub fn id(&self) -> GoalId {
        self.inner.id
    }

    /// Whether a live plan currently pursues this goal.
    pub fn is_pursued(&self) -> bool {
        self.inner.pursued.load(Ordering::Acquire)
    }

    /// Set the pursued flag. Managed by the deliberation pipeline.
    pub fn set_pursued(&self, pursued: bool) {
        self.inner.pursued.store(pursued, Ordering::Release);
    }

    /// Evaluate the goal's achievement predicate.
    pub fn is_achieved(&self, contexts: &ContextContainer) -> bool {
        self.inner.goal.is_achieved(contexts)
    }

    /// Borrow the goal as its concrete type.
    pub fn downcast_ref<G: Goal>(&self) -> Option<&G> {
        (*self.inner.any).downcast_ref::<G>()
    }
}

impl PartialEq for GoalHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for GoalHandle {}

impl fmt::Debug for GoalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalHandle")
            .field("id", &self.inner.id)
            .field("pursued", &self.is_pursued())
            .field("goal", &self.inner.goal)
            .finish()
    }
}

/// Anything that can cause a plan scheme to instantiate a plan.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Environment-originated event.
    External(Payload),
    /// Self-generated event.
    Internal(Payload),
    /// Communication from another agent.
    Message(Message),
    /// Persistent goal.
    Goal(GoalHandle),
}

impl Trigger {
    /// Build an external trigger around `value`.
    pub fn external<T: Any + Send + Sync>(value: T) -> Self {
        Self::External(Payload::new(value))
    }

    /// Build an internal trigger around `value`.
    pub fn internal<T: Any + Send + Sync>(value: T) -> Self {
        Self::Internal(Payload::new(value))
    }

    /// The category this trigger belongs to.
    pub const fn kind(&self) -> TriggerKind {
        match self {
            Self::External(_) => TriggerKind::External,
            Self::Internal(_) => TriggerKind::Internal,
            Self::Message(_) => TriggerKind::Message,
            Self::Goal(_) => TriggerKind::Goal,
        }
    }

    /// Whether this is a goal.
    pub const fn is_goal(&self) -> bool {
        matches!(self, Self::Goal(_))
    }

    /// The goal handle, for goal triggers.
    pub const fn as_goal(&self) -> Option<&GoalHandle> {
        match self {
            Self::Goal(goal) => Some(goal),
            _ => None,
        }
    }

    /// The message, for message triggers.
    pub const fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// The payload, for external and internal triggers.
    pub const fn payload(&self) -> Option<&Payload> {
        match self {
            Self::External(payload) | Self::Internal(payload) => Some(payload),
            _ => None,
        }
    }
}

impl From<Message> for Trigger {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<GoalHandle> for Trigger {
    fn from(goal: GoalHandle) -> Self {
        Self::Goal(goal)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct ReachTile {
        x: i32,
    }

    impl Goal for ReachTile {
        fn is_achieved(&self, contexts: &ContextContainer) -> bool {
            contexts.get::<i32>().is_some_and(|pos| *pos == self.x)
        }
    }

    #[test]
    fn payload_downcasts_to_its_type_only() {
        let trigger = Trigger::external(42_u32);
        let payload = trigger.payload().unwrap();
        assert_eq!(payload.downcast_ref::<u32>(), Some(&42));
        assert!(payload.downcast_ref::<i64>().is_none());
        assert!(payload.is::<u32>());
        assert_eq!(trigger.kind(), TriggerKind::External);
    }

    #[test]
    fn goal_clones_share_pursuit() {
        let goal = GoalHandle::new(ReachTile { x: 3 });
        let trigger = Trigger::from(goal.clone());
        assert!(!goal.is_pursued());
        trigger.as_goal().unwrap().set_pursued(true);
        assert!(goal.is_pursued());
        assert!(trigger.is_goal());
    }

    #[test]
    fn goal_achievement_reads_contexts() {
        let goal = GoalHandle::new(ReachTile { x: 3 });
        let mut contexts = ContextContainer::new();
        contexts.insert(1_i32);
        assert!(!goal.is_achieved(&contexts));
        contexts.insert(3_i32);
        assert!(goal.is_achieved(&contexts));
        assert_eq!(goal.downcast_ref::<ReachTile>().map(|g| g.x), Some(3));
    }

    #[test]
    fn message_builder_collects_receivers_and_parameters() {
        let sender = AgentId::new();
        let receiver = AgentId::new();
        let message = Message::new(sender, "ping")
            .to(receiver)
            .with_parameter("conversation", "c-1");
        assert!(!message.is_broadcast());
        assert_eq!(message.parameter("conversation"), Some("c-1"));
        assert_eq!(Trigger::from(message).kind(), TriggerKind::Message);
        assert!(Message::new(sender, "hello").is_broadcast());
    }
}

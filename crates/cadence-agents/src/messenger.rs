//! The messaging seam between agents.
//!
//! A [`Messenger`] routes [`Message`]s to registered agents. Delivery only
//! enqueues: the receiver sees the message as a trigger in its next cycle.

use std::sync::Arc;

use cadence_types::{AgentId, Message};

use crate::agent::Agent;
use crate::error::MessengerError;

/// Routes messages between agents.
pub trait Messenger<A>: Send + Sync {
    /// Make an agent reachable.
    fn register(&self, agent: &Arc<Agent<A>>);

    /// Make an agent unreachable.
    fn deregister(&self, agent_id: AgentId);

    /// Every agent currently reachable.
    fn registered_agents(&self) -> Vec<AgentId>;

    /// Enqueue `message` on `receiver`'s message queue.
    fn deliver_message(&self, receiver: AgentId, message: Message) -> Result<(), MessengerError>;

    /// Deliver to every listed receiver, or to every registered agent but the
    /// sender when the receiver list is empty.
    ///
    /// Delivery continues past unknown receivers; the first such error is
    /// returned once every receiver has been tried.
    fn deliver(&self, message: Message) -> Result<(), MessengerError> {
        let receivers: Vec<AgentId> = if message.is_broadcast() {
            self.registered_agents()
                .into_iter()
                .filter(|id| *id != message.sender)
                .collect()
        } else {
            message.receivers.clone()
        };

        let mut first_error = None;
        for receiver in receivers {
            if let Err(e) = self.deliver_message(receiver, message.clone()) {
                tracing::warn!(
                    sender = %message.sender,
                    receiver = %receiver,
                    error = %e,
                    "Message delivery failed"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Whether this messenger can encode messages for transport.
    fn implements_encoding(&self) -> bool {
        false
    }
}

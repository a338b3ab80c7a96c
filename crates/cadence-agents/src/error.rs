//! Error types for the cadence-agents crate.
//!
//! Plan failures are agent-local: they abort the failing agent's current
//! cycle and surface in that agent's tick result, never in anyone else's.

use cadence_types::AgentId;

/// Errors raised by plan code while it executes.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The plan's own logic failed.
    #[error("plan failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// A context the plan depends on is not registered with the agent.
    #[error("required context not registered: {type_name}")]
    MissingContext {
        /// Name of the key type that was looked up.
        type_name: &'static str,
    },

    /// Sending a message from the plan failed.
    #[error("messenger error: {source}")]
    Messenger {
        /// The underlying messenger error.
        #[from]
        source: MessengerError,
    },
}

impl PlanError {
    /// Shorthand for [`PlanError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Errors that abort one agent's deliberation cycle.
#[derive(Debug, thiserror::Error)]
pub enum DeliberationError {
    /// A plan returned an error during the act stage.
    #[error("plan execution failed for agent {agent_id}: {source}")]
    Plan {
        /// The agent whose plan failed.
        agent_id: AgentId,
        /// The underlying plan error.
        source: PlanError,
    },
}

/// Errors raised by message delivery.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// The receiver is not registered (or no longer alive).
    #[error("unknown message receiver: {receiver}")]
    UnknownReceiver {
        /// The receiver that could not be found.
        receiver: AgentId,
    },

    /// The messenger's codec rejected the message.
    #[error("message encoding failed: {reason}")]
    Encoding {
        /// The codec's error message.
        reason: String,
    },

    /// The sending agent was built without a messenger.
    #[error("agent {agent_id} has no messenger attached")]
    NotConnected {
        /// The agent that tried to send.
        agent_id: AgentId,
    },
}

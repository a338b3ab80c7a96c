//! In-process message routing.
//!
//! With a [`MessageCodec`] attached, every delivered message is encoded and
//! decoded again before it reaches the receiver, so only what survives the
//! wire format is seen.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use cadence_agents::{Agent, Messenger, MessengerError};
use cadence_types::{AgentId, Message};
use tracing::debug;

use crate::codec::MessageCodec;

/// Routes messages between agents living in the same process.
///
/// Holds only weak references: an agent dropped everywhere else becomes an
/// unknown receiver.
pub struct LocalMessenger<A> {
    agents: RwLock<HashMap<AgentId, Weak<Agent<A>>>>,
    codec: Option<Arc<dyn MessageCodec>>,
}

impl<A> Default for LocalMessenger<A> {
    fn default() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            codec: None,
        }
    }
}

impl<A> LocalMessenger<A> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry that passes every message through `codec`.
    pub fn with_codec(codec: Arc<dyn MessageCodec>) -> Self {
        Self {
            codec: Some(codec),
            ..Self::default()
        }
    }

    fn transcode(&self, message: Message) -> Result<Message, MessengerError> {
        let Some(codec) = &self.codec else {
            return Ok(message);
        };
        codec
            .encode(&message)
            .and_then(|bytes| codec.decode(&bytes))
            .map_err(|e| MessengerError::Encoding {
                reason: e.to_string(),
            })
    }

    fn lookup(&self, agent_id: AgentId) -> Option<Arc<Agent<A>>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&agent_id)
            .and_then(Weak::upgrade)
    }
}

impl<A> Messenger<A> for LocalMessenger<A> {
    fn register(&self, agent: &Arc<Agent<A>>) {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent.id(), Arc::downgrade(agent));
        debug!(agent_id = %agent.id(), "Agent registered with messenger");
    }

    fn deregister(&self, agent_id: AgentId) {
        let removed = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&agent_id)
            .is_some();
        debug!(%agent_id, removed, "Agent deregistered from messenger");
    }

    fn registered_agents(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, agent)| agent.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn deliver_message(&self, receiver: AgentId, message: Message) -> Result<(), MessengerError> {
        let Some(agent) = self.lookup(receiver) else {
            self.agents
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&receiver);
            return Err(MessengerError::UnknownReceiver { receiver });
        };
        agent.receive_message(self.transcode(message)?);
        Ok(())
    }

    fn implements_encoding(&self) -> bool {
        self.codec.is_some()
    }
}

impl<A> std::fmt::Debug for LocalMessenger<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("LocalMessenger")
            .field("registered", &registered)
            .field("encoding", &self.codec.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_agents::{AgentArguments, AgentView, AgentWiring, PlanContext, run_once, scheme_fn};
    use cadence_agents::DeliberationRunnable;
    use cadence_types::Trigger;

    use super::*;
    use crate::codec::{CodecError, JsonCodec};

    fn listener(messenger: &Arc<LocalMessenger<String>>) -> Arc<Agent<String>> {
        let agent = Agent::new(
            AgentArguments::new().add_message_plan_scheme(scheme_fn(
                |trigger: &Trigger, _: &AgentView<'_>| {
                    let message = trigger.as_message()?;
                    let content = message.parameter("via").map_or_else(
                        || message.content.clone(),
                        |via| format!("{} via {via}", message.content),
                    );
                    Some(run_once(move |_: &mut PlanContext<'_, String>| Ok(Some(content))))
                },
            )),
            AgentWiring::<String>::new().with_messenger(Arc::clone(messenger) as Arc<dyn Messenger<String>>),
        );
        messenger.register(&agent);
        agent
    }

    fn actions(agent: &Arc<Agent<String>>) -> Vec<String> {
        let (result, _, _) = DeliberationRunnable::new(Arc::clone(agent))
            .run()
            .unwrap()
            .into_parts();
        result.into_actions()
    }

    #[test]
    fn direct_delivery_reaches_only_the_receiver() {
        let messenger = Arc::new(LocalMessenger::new());
        let alice = listener(&messenger);
        let bob = listener(&messenger);

        alice.send(Message::new(alice.id(), "hi bob").to(bob.id())).unwrap();
        assert_eq!(actions(&bob), vec!["hi bob"]);
        assert!(actions(&alice).is_empty());
    }

    #[test]
    fn broadcast_skips_the_sender() {
        let messenger = Arc::new(LocalMessenger::new());
        let agents: Vec<_> = (0..3).map(|_| listener(&messenger)).collect();
        let sender = agents.first().unwrap();

        sender.send(Message::new(sender.id(), "all")).unwrap();
        assert!(actions(sender).is_empty());
        for other in agents.iter().skip(1) {
            assert_eq!(actions(other), vec!["all"]);
        }
    }

    #[test]
    fn unknown_and_dropped_receivers_are_reported() {
        let messenger = Arc::new(LocalMessenger::new());
        let alice = listener(&messenger);
        let ghost = listener(&messenger);
        let ghost_id = ghost.id();
        drop(ghost);

        let err = alice
            .send(Message::new(alice.id(), "anyone?").to(ghost_id))
            .unwrap_err();
        assert!(matches!(err, MessengerError::UnknownReceiver { receiver } if receiver == ghost_id));
        assert_eq!(messenger.registered_agents(), vec![alice.id()]);

        messenger.deregister(alice.id());
        assert!(messenger.registered_agents().is_empty());
        assert!(!messenger.implements_encoding());
    }

    #[test]
    fn codec_messenger_delivers_decoded_copies() {
        let messenger = Arc::new(LocalMessenger::with_codec(Arc::new(JsonCodec)));
        assert!(messenger.implements_encoding());
        let alice = listener(&messenger);
        let bob = listener(&messenger);

        alice
            .send(Message::new(alice.id(), "hi").to(bob.id()).with_parameter("via", "json"))
            .unwrap();
        assert_eq!(actions(&bob), vec!["hi via json"]);
    }

    struct Rejecting;

    impl MessageCodec for Rejecting {
        fn encode(&self, _: &Message) -> Result<Vec<u8>, CodecError> {
            Ok(b"not json".to_vec())
        }

        fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
            JsonCodec.decode(bytes)
        }
    }

    #[test]
    fn codec_failure_is_reported_and_nothing_is_delivered() {
        let messenger = Arc::new(LocalMessenger::with_codec(Arc::new(Rejecting)));
        let alice = listener(&messenger);
        let bob = listener(&messenger);

        let err = alice.send(Message::new(alice.id(), "lost").to(bob.id())).unwrap_err();
        assert!(matches!(err, MessengerError::Encoding { .. }));
        assert!(actions(&bob).is_empty());
    }
}

//! The platform: one executor, one messenger, and the agents wired to them.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cadence_agents::{Agent, AgentArguments, AgentWiring, Messenger, Scheduler};
use cadence_types::AgentId;
use tracing::info;

use crate::codec::MessageCodec;
use crate::config::ExecutorConfig;
use crate::executor::{TickError, TickExecutor};
use crate::messenger::LocalMessenger;

/// Errors raised by platform management.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The executor could not be created.
    #[error("executor error: {source}")]
    Tick {
        /// The underlying executor error.
        #[from]
        source: TickError,
    },

    /// An agent with this id is already running.
    #[error("agent {agent_id} already exists")]
    DuplicateAgent {
        /// The conflicting id.
        agent_id: AgentId,
    },

    /// No running agent has this id.
    #[error("unknown agent: {agent_id}")]
    UnknownAgent {
        /// The id that was looked up.
        agent_id: AgentId,
    },
}

/// Owns the executor and messenger and spawns agents onto them.
pub struct Platform<A> {
    executor: Arc<TickExecutor<A>>,
    messenger: Arc<dyn Messenger<A>>,
    agents: RwLock<BTreeMap<AgentId, Arc<Agent<A>>>>,
}

impl<A: Send + 'static> Platform<A> {
    /// Build a platform with a fresh executor and an in-process messenger.
    pub fn new(config: &ExecutorConfig) -> Result<Self, PlatformError> {
        let executor = Arc::new(TickExecutor::new(config)?);
        Ok(Self::with_parts(executor, Arc::new(LocalMessenger::new())))
    }

    /// Like [`new`](Self::new), but every delivered message passes through
    /// `codec`.
    pub fn with_codec(
        config: &ExecutorConfig,
        codec: Arc<dyn MessageCodec>,
    ) -> Result<Self, PlatformError> {
        let executor = Arc::new(TickExecutor::new(config)?);
        Ok(Self::with_parts(
            executor,
            Arc::new(LocalMessenger::with_codec(codec)),
        ))
    }

    /// Build a platform around an existing executor and messenger.
    pub fn with_parts(executor: Arc<TickExecutor<A>>, messenger: Arc<dyn Messenger<A>>) -> Self {
        Self {
            executor,
            messenger,
            agents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create an agent, connect it, and schedule its first cycle.
    pub fn spawn_agent(&self, arguments: AgentArguments<A>) -> Arc<Agent<A>> {
        let agent = Agent::new(arguments, self.wiring());
        self.admit(&agent);
        agent
    }

    /// Like [`spawn_agent`](Self::spawn_agent) with a caller-chosen id.
    pub fn spawn_agent_with_id(
        &self,
        agent_id: AgentId,
        arguments: AgentArguments<A>,
    ) -> Result<Arc<Agent<A>>, PlatformError> {
        if self.read_agents().contains_key(&agent_id) {
            return Err(PlatformError::DuplicateAgent { agent_id });
        }
        let agent = Agent::with_id(agent_id, arguments, self.wiring());
        self.admit(&agent);
        Ok(agent)
    }

    /// Stop an agent: its shutdown plans run in the next tick and it stops
    /// receiving messages immediately.
    pub fn kill_agent(&self, agent_id: AgentId) -> Result<(), PlatformError> {
        let agent = self
            .write_agents()
            .remove(&agent_id)
            .ok_or(PlatformError::UnknownAgent { agent_id })?;
        self.messenger.deregister(agent_id);
        agent.request_stop();
        info!(%agent_id, "Agent killed");
        Ok(())
    }

    /// Drop agents that have finished their shutdown; returns their ids.
    pub fn reap_finished(&self) -> Vec<AgentId> {
        let finished: Vec<AgentId> = {
            let mut agents = self.write_agents();
            let finished: Vec<AgentId> = agents
                .iter()
                .filter(|(_, agent)| agent.is_done())
                .map(|(id, _)| *id)
                .collect();
            for agent_id in &finished {
                agents.remove(agent_id);
            }
            finished
        };
        for agent_id in &finished {
            self.messenger.deregister(*agent_id);
            info!(%agent_id, "Agent finished");
        }
        finished
    }

    fn wiring(&self) -> AgentWiring<A> {
        let scheduler: Arc<dyn Scheduler<A>> = Arc::clone(&self.executor) as Arc<dyn Scheduler<A>>;
        AgentWiring::new()
            .with_scheduler(scheduler)
            .with_messenger(Arc::clone(&self.messenger))
    }

    fn admit(&self, agent: &Arc<Agent<A>>) {
        self.messenger.register(agent);
        self.write_agents().insert(agent.id(), Arc::clone(agent));
        agent.wake();
        info!(agent_id = %agent.id(), "Agent spawned");
    }
}

impl<A> Platform<A> {
    /// The shared executor.
    pub const fn executor(&self) -> &Arc<TickExecutor<A>> {
        &self.executor
    }

    /// The shared messenger.
    pub const fn messenger(&self) -> &Arc<dyn Messenger<A>> {
        &self.messenger
    }

    /// A running agent by id.
    pub fn agent(&self, agent_id: AgentId) -> Option<Arc<Agent<A>>> {
        self.read_agents().get(&agent_id).cloned()
    }

    /// Ids of all running agents, in id order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.read_agents().keys().copied().collect()
    }

    /// Number of running agents.
    pub fn agent_count(&self) -> usize {
        self.read_agents().len()
    }

    fn read_agents(&self) -> RwLockReadGuard<'_, BTreeMap<AgentId, Arc<Agent<A>>>> {
        self.agents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_agents(&self) -> RwLockWriteGuard<'_, BTreeMap<AgentId, Arc<Agent<A>>>> {
        self.agents.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A> std::fmt::Debug for Platform<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("executor", &self.executor)
            .field("agents", &self.agent_count())
            .finish_non_exhaustive()
    }
}

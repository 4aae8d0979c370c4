//! Communication hub: envelope routing and audit history
//!
//! The hub owns the only state touched by more than one agent: the routing
//! table and a bounded ring of delivered envelopes. Both are mutated inside a
//! single critical section per delivery. Routing is fire-and-forget; a sender
//! gets no acknowledgement and an unknown recipient is logged and dropped.

use crate::agent::Agent;
use crate::agent::{spawn_agent, AgentTasks};
use crate::messages::Envelope;
use crate::records::AgentStatus;
use log::{info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Default capacity of the delivered-envelope ring
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

type RoutingTable = Arc<Mutex<HashMap<String, Arc<dyn Agent>>>>;
type HistoryRing = Arc<Mutex<VecDeque<Envelope>>>;

/// Central hub for agent communication
///
/// The routing table and history ring are shared with the per-agent
/// forwarding tasks, so registration works from a plain reference.
pub struct CommunicationHub {
    agents: RoutingTable,
    history: HistoryRing,
    max_history: usize,
}

impl Default for CommunicationHub {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl CommunicationHub {
    pub fn new(max_history: usize) -> Self {
        Self {
            agents: Arc::new(Mutex::new(HashMap::new())),
            history: Arc::new(Mutex::new(VecDeque::new())),
            max_history,
        }
    }

    /// Register an agent and subscribe to its outgoing channel
    ///
    /// Everything the agent emits from then on is routed by this hub. Must be
    /// called from within a tokio runtime (a forwarding task is spawned).
    pub fn register(&self, agent: Arc<dyn Agent>) {
        let agent_id = agent.core().id().to_string();

        match agent.core().take_outgoing() {
            Some(mut outgoing) => {
                agent.core().add_subscriber();
                let agents = Arc::clone(&self.agents);
                let history = Arc::clone(&self.history);
                let max_history = self.max_history;
                tokio::spawn(async move {
                    while let Some(envelope) = outgoing.recv().await {
                        dispatch(&agents, &history, max_history, envelope);
                    }
                });
            }
            None => warn!(
                "Agent {} outgoing channel already consumed; not subscribing",
                agent_id
            ),
        }

        self.agents
            .lock()
            .unwrap()
            .insert(agent_id.clone(), agent);
        info!("Registered agent: {}", agent_id);
    }

    /// Remove an agent from the routing table
    pub fn unregister(&self, agent_id: &str) {
        if self.agents.lock().unwrap().remove(agent_id).is_some() {
            info!("Unregistered agent: {}", agent_id);
        }
    }

    /// Deliver an envelope to its recipient(s) and record it in history
    ///
    /// Broadcast envelopes go to every registered agent except the sender.
    /// Delivery failures are non-fatal.
    pub fn route(&self, envelope: Envelope) {
        dispatch(&self.agents, &self.history, self.max_history, envelope);
    }

    /// The most recent `limit` delivered envelopes, oldest first
    pub fn history(&self, limit: usize) -> Vec<Envelope> {
        let history = self.history.lock().unwrap();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Status snapshot of every registered agent
    pub fn agent_statuses(&self) -> HashMap<String, AgentStatus> {
        self.agents
            .lock()
            .unwrap()
            .iter()
            .map(|(agent_id, agent)| (agent_id.clone(), agent.core().status()))
            .collect()
    }

    /// Number of registered agents
    pub fn agent_count(&self) -> usize {
        self.agents.lock().unwrap().len()
    }

    /// Start every registered agent's runtime loops
    pub fn start_all(&self) -> Vec<AgentTasks> {
        let agents: Vec<Arc<dyn Agent>> =
            self.agents.lock().unwrap().values().cloned().collect();
        info!("Starting {} agents", agents.len());
        agents.into_iter().map(spawn_agent).collect()
    }

    /// Signal every registered agent to stop
    pub fn stop_all(&self) {
        for agent in self.agents.lock().unwrap().values() {
            agent.core().stop();
        }
        info!("All agents stopped");
    }
}

/// Record an envelope in history and deliver it to its recipient(s)
fn dispatch(
    agents: &Mutex<HashMap<String, Arc<dyn Agent>>>,
    history: &Mutex<VecDeque<Envelope>>,
    max_history: usize,
    envelope: Envelope,
) {
    {
        let mut history = history.lock().unwrap();
        history.push_back(envelope.clone());
        while history.len() > max_history {
            history.pop_front();
        }
    }

    let agents = agents.lock().unwrap();
    if envelope.is_broadcast() {
        for (agent_id, agent) in agents.iter() {
            if *agent_id != envelope.sender {
                agent.core().deliver(envelope.clone());
            }
        }
    } else if let Some(agent) = agents.get(&envelope.recipient) {
        agent.core().deliver(envelope);
    } else {
        warn!("Message recipient not found: {}", envelope.recipient);
    }
}

//! Ephemeral presence state per open document.
//!
//! Awareness is broadcast alongside document sync and never persisted. Client
//! states are keyed by connection ID; the page's agent occupies a dedicated
//! slot so registering/unregistering an agent cannot collide with a client.

use std::collections::HashMap;

use marginalia_types::AwarenessUser;
use parking_lot::Mutex;

/// Presence registry for one open document.
#[derive(Default)]
pub struct Awareness {
    clients: Mutex<HashMap<u64, AwarenessUser>>,
    agent: Mutex<Option<AwarenessUser>>,
}

impl Awareness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) a client's presence state.
    pub fn set_client(&self, conn_id: u64, user: AwarenessUser) {
        self.clients.lock().insert(conn_id, user);
    }

    /// Remove a departed client's state.
    pub fn remove_client(&self, conn_id: u64) {
        self.clients.lock().remove(&conn_id);
    }

    /// Set or clear the agent presence slot.
    pub fn set_agent(&self, state: Option<AwarenessUser>) {
        *self.agent.lock() = state;
    }

    /// Current agent presence, if any.
    pub fn agent(&self) -> Option<AwarenessUser> {
        self.agent.lock().clone()
    }

    /// Snapshot of all states (clients first, then the agent).
    pub fn snapshot(&self) -> Vec<AwarenessUser> {
        let mut states: Vec<AwarenessUser> = self.clients.lock().values().cloned().collect();
        if let Some(agent) = self.agent.lock().clone() {
            states.push(agent);
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_types::AgentStatus;

    #[test]
    fn agent_slot_is_separate_from_clients() {
        let awareness = Awareness::new();
        awareness.set_client(
            1,
            AwarenessUser {
                name: "amy".into(),
                color: "#123456".into(),
                role: "user".into(),
                status: AgentStatus::Online,
                is_typing: false,
            },
        );
        awareness.set_agent(Some(AwarenessUser::agent("Scribe", AgentStatus::Thinking)));

        let states = awareness.snapshot();
        assert_eq!(states.len(), 2);
        assert!(states.iter().any(|s| s.role == "agent" && s.is_typing));

        awareness.set_agent(None);
        assert_eq!(awareness.snapshot().len(), 1);

        awareness.remove_client(1);
        assert!(awareness.snapshot().is_empty());
    }
}

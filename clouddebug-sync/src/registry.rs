//! Registered debuggee sessions
//!
//! Tracks every `ProcessState` known per project and which of them are attached to
//! a live, running debug session. The global poller only watches the others.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::state::ProcessState;

/// Source of sessions for background polling
pub trait SessionSource: Send + Sync {
    /// Registered states that opted into background notifications and are not
    /// already served by a live debug session.
    fn background_listening_states(&self) -> Vec<Arc<ProcessState>>;
}

#[derive(Default)]
pub struct SessionRegistry {
    projects: DashMap<String, Vec<Arc<ProcessState>>>,
    live: DashSet<Uuid>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, project: &str, state: Arc<ProcessState>) {
        let mut states = self.projects.entry(project.to_string()).or_default();
        if !states.iter().any(|s| s.id() == state.id()) {
            tracing::debug!("Registered session {:?} in {}", state.debuggee_id(), project);
            states.push(state);
        }
    }

    pub fn unregister(&self, project: &str, state_id: Uuid) {
        if let Some(mut states) = self.projects.get_mut(project) {
            states.retain(|s| s.id() != state_id);
        }
        self.projects.remove_if(project, |_, states| states.is_empty());
        self.live.remove(&state_id);
    }

    /// Drop every session of a closed project
    pub fn remove_project(&self, project: &str) {
        if let Some((_, states)) = self.projects.remove(project) {
            for state in states {
                self.live.remove(&state.id());
            }
        }
    }

    pub fn states(&self, project: &str) -> Vec<Arc<ProcessState>> {
        self.projects
            .get(project)
            .map(|states| states.clone())
            .unwrap_or_default()
    }

    /// A debug session attached to `state_id` started running
    pub fn session_started(&self, state_id: Uuid) {
        self.live.insert(state_id);
    }

    /// The debug session attached to `state_id` stopped
    pub fn session_stopped(&self, state_id: Uuid) {
        self.live.remove(&state_id);
    }

    pub fn is_live(&self, state_id: Uuid) -> bool {
        self.live.contains(&state_id)
    }
}

impl SessionSource for SessionRegistry {
    fn background_listening_states(&self) -> Vec<Arc<ProcessState>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for entry in self.projects.iter() {
            for state in entry.value() {
                if state.is_listening_in_background()
                    && state.debuggee_id().is_some()
                    && !self.live.contains(&state.id())
                    && seen.insert(state.id())
                {
                    result.push(state.clone());
                }
            }
        }
        result
    }
}

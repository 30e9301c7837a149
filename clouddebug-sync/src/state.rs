//! Shared per-debuggee session state
//!
//! The breakpoint list and the wait token are published together, by replacement,
//! through one `watch` channel. Readers never block and never see a list paired
//! with a token from another response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use clouddebug_core::{sort_breakpoints, ServerBreakpoint, SessionConfig};

use crate::transport::ListBreakpointsResponse;

/// A breakpoint list and the wait token that came with it
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    pub breakpoints: Arc<[ServerBreakpoint]>,
    pub wait_token: Option<String>,
}

/// Last known server state for one debuggee
pub struct ProcessState {
    id: Uuid,
    user_email: Option<String>,
    debuggee_id: Option<String>,
    project_name: Option<String>,
    project_number: Option<String>,
    server: watch::Sender<ServerSnapshot>,
    listen_in_background: AtomicBool,
}

impl ProcessState {
    pub fn new(user_email: impl Into<String>, debuggee_id: impl Into<String>) -> Self {
        Self::from_config(&SessionConfig {
            user_email: Some(user_email.into()),
            debuggee_id: Some(debuggee_id.into()),
            ..Default::default()
        })
    }

    /// Restore a session from its persisted run configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        let (server, _) = watch::channel(ServerSnapshot {
            breakpoints: Arc::from(Vec::new()),
            wait_token: config.wait_token.clone(),
        });
        Self {
            id: Uuid::new_v4(),
            user_email: config.user_email.clone(),
            debuggee_id: config.debuggee_id.clone(),
            project_name: config.project_name.clone(),
            project_number: config.project_number.clone(),
            server,
            listen_in_background: AtomicBool::new(config.listen_in_background),
        }
    }

    pub fn with_project(mut self, name: impl Into<String>, number: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self.project_number = Some(number.into());
        self
    }

    pub fn to_config(&self) -> SessionConfig {
        SessionConfig {
            user_email: self.user_email.clone(),
            debuggee_id: self.debuggee_id.clone(),
            project_name: self.project_name.clone(),
            project_number: self.project_number.clone(),
            wait_token: self.wait_token(),
            listen_in_background: self.is_listening_in_background(),
        }
    }

    /// Process-local identity, stable for the lifetime of this state
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    pub fn debuggee_id(&self) -> Option<&str> {
        self.debuggee_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    pub fn project_number(&self) -> Option<&str> {
        self.project_number.as_deref()
    }

    /// Immutable snapshot of the last list. Callers should hold on to it rather than re-read.
    pub fn current_server_breakpoint_list(&self) -> Arc<[ServerBreakpoint]> {
        self.server.borrow().breakpoints.clone()
    }

    pub fn set_current_server_breakpoint_list(&self, breakpoints: Vec<ServerBreakpoint>) {
        let breakpoints: Arc<[ServerBreakpoint]> = Arc::from(breakpoints);
        self.server.send_modify(|snapshot| snapshot.breakpoints = breakpoints);
    }

    /// The list and its wait token, read together
    pub fn snapshot(&self) -> ServerSnapshot {
        self.server.borrow().clone()
    }

    /// Replace list and token in one step. Returns the previous snapshot.
    pub fn publish(&self, snapshot: ServerSnapshot) -> ServerSnapshot {
        self.server.send_replace(snapshot)
    }

    /// Receiver that observes every replacement of the list or the token
    pub fn subscribe(&self) -> watch::Receiver<ServerSnapshot> {
        self.server.subscribe()
    }

    pub fn find_breakpoint(&self, id: &str) -> Option<ServerBreakpoint> {
        self.server
            .borrow()
            .breakpoints
            .iter()
            .find(|bp| bp.id == id)
            .cloned()
    }

    pub fn wait_token(&self) -> Option<String> {
        self.server.borrow().wait_token.clone()
    }

    pub fn set_wait_token(&self, token: Option<String>) {
        self.server.send_modify(|snapshot| snapshot.wait_token = token);
    }

    pub fn is_listening_in_background(&self) -> bool {
        self.listen_in_background.load(Ordering::SeqCst)
    }

    pub fn set_listen_in_background(&self, listen: bool) {
        self.listen_in_background.store(listen, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessState")
            .field("id", &self.id)
            .field("user_email", &self.user_email)
            .field("debuggee_id", &self.debuggee_id)
            .field("wait_token", &self.wait_token())
            .field("breakpoints", &self.server.borrow().breakpoints.len())
            .finish()
    }
}

/// Token comparison for long polls. Empty tokens count as absent.
pub fn wait_token_changed(old: Option<&str>, new: Option<&str>) -> bool {
    let old = old.filter(|t| !t.is_empty());
    let new = new.filter(|t| !t.is_empty());
    old != new
}

/// Sort and publish a list response. Returns whether the wait token changed.
pub fn apply_list_response(state: &ProcessState, response: ListBreakpointsResponse) -> bool {
    let mut breakpoints = response.breakpoints;
    sort_breakpoints(&mut breakpoints);

    let previous = state.publish(ServerSnapshot {
        breakpoints: Arc::from(breakpoints),
        wait_token: response.next_wait_token.clone(),
    });
    wait_token_changed(previous.wait_token.as_deref(), response.next_wait_token.as_deref())
}

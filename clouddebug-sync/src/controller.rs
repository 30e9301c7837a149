//! Per-session state controller
//!
//! Keeps one `ProcessState` current while a debug session is attached: hanging
//! list queries in a background loop, breakpoint set/delete, and hydration of
//! final snapshots with a small cache.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use clouddebug_core::{message, sort_breakpoints, DebuggerConfig, ServerBreakpoint};

use crate::client::ClientCache;
use crate::error::{DebuggerError, Result};
use crate::listener::{BreakpointListener, ListenerId, ListenerSet};
use crate::state::{wait_token_changed, ProcessState};
use crate::transport::{DebuggerTransport, ListBreakpointsRequest};

/// Fallback polling delay when wait tokens are disabled
const NO_WAIT_TOKEN_POLL: Duration = Duration::from_secs(1);

/// Result of a successful set call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: String,
    /// Rendered server error when the breakpoint was created in an error state
    pub error: Option<String>,
}

pub struct StateController {
    state: Arc<ProcessState>,
    clients: Arc<ClientCache>,
    listeners: ListenerSet,
    full_final_breakpoints: DashMap<String, ServerBreakpoint>,
    use_wait_token: bool,
    initial_delay: Duration,
    period: Duration,
    background: Mutex<Option<CancellationToken>>,
}

impl StateController {
    pub fn new(state: Arc<ProcessState>, clients: Arc<ClientCache>, config: &DebuggerConfig) -> Arc<Self> {
        Arc::new(Self {
            state,
            clients,
            listeners: ListenerSet::new(),
            full_final_breakpoints: DashMap::new(),
            use_wait_token: config.use_wait_token,
            initial_delay: Duration::from_millis(config.controller_initial_delay_ms),
            period: Duration::from_millis(config.controller_period_ms),
            background: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &Arc<ProcessState> {
        &self.state
    }

    pub fn add_listener(&self, listener: Arc<dyn BreakpointListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn fire_breakpoints_changed(&self) {
        self.listeners.notify(&self.state);
    }

    fn debuggee_id(&self) -> Result<&str> {
        self.state
            .debuggee_id()
            .ok_or_else(|| DebuggerError::Transport("session has no debuggee".to_string()))
    }

    fn short_client(&self) -> Result<Arc<dyn DebuggerTransport>> {
        self.clients
            .short_timeout_client(self.state.user_email())
            .ok_or_else(|| DebuggerError::NotLoggedIn(self.state.user_email().unwrap_or_default().to_string()))
    }

    /// Reset the wait token and load the current list. Does not notify listeners.
    pub async fn initialize(&self) {
        self.state.set_wait_token(None);
        self.wait_for_changes().await;
    }

    /// Create a breakpoint, replacing pending ones at the same location.
    pub async fn set_breakpoint(&self, request: ServerBreakpoint) -> Result<Registration> {
        let debuggee_id = self.debuggee_id()?;
        let client = self.short_client()?;

        let current = self.state.current_server_breakpoint_list();
        for stale in current
            .iter()
            .filter(|bp| !bp.is_final() && bp.same_location(&request))
        {
            tracing::debug!("Replacing pending breakpoint {} at {:?}", stale.id, stale.location);
            if let Err(e) = client.delete_breakpoint(debuggee_id, &stale.id).await {
                tracing::warn!("Failed to delete breakpoint {}: {}", stale.id, e);
            }
        }

        let created = client
            .set_breakpoint(debuggee_id, &request)
            .await?
            .filter(|bp| !bp.id.is_empty())
            .ok_or(DebuggerError::NoResponse)?;

        let error = if created.has_error_status() {
            message::render_user_error_message(created.status.as_ref())
        } else {
            None
        };
        tracing::info!("Set breakpoint {} at {:?}", created.id, created.location);
        Ok(Registration { id: created.id, error })
    }

    pub async fn delete_breakpoint(&self, breakpoint_id: &str) -> Result<()> {
        let debuggee_id = self.debuggee_id()?;
        self.short_client()?
            .delete_breakpoint(debuggee_id, breakpoint_id)
            .await?;
        tracing::info!("Deleted breakpoint {}", breakpoint_id);
        Ok(())
    }

    /// Fully hydrated breakpoint. Pending breakpoints come from the current list;
    /// final ones are fetched once and cached.
    pub async fn resolve_breakpoint(&self, breakpoint_id: &str) -> Result<ServerBreakpoint> {
        if let Some(cached) = self.full_final_breakpoints.get(breakpoint_id) {
            return Ok(cached.value().clone());
        }

        if let Some(pending) = self
            .state
            .find_breakpoint(breakpoint_id)
            .filter(|bp| !bp.is_final())
        {
            return Ok(pending);
        }

        let debuggee_id = self.debuggee_id()?;
        let resolved = self
            .short_client()?
            .get_breakpoint(debuggee_id, breakpoint_id)
            .await?
            .ok_or(DebuggerError::NoResponse)?;

        self.full_final_breakpoints
            .insert(breakpoint_id.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn background_token(&self) -> Option<CancellationToken> {
        self.background.lock().clone()
    }

    /// Run one hanging query. Returns true if listeners were notified.
    ///
    /// The first query of a session (no wait token) only loads the list.
    pub async fn wait_for_changes(&self) -> bool {
        let Some(client) = self.clients.long_timeout_client(self.state.user_email()) else {
            tracing::info!("No debugger client for {:?}, not checking for changes", self.state.user_email());
            return false;
        };
        let Some(debuggee_id) = self.state.debuggee_id() else {
            tracing::error!("Session has no debuggee, not checking for changes");
            return false;
        };

        let cancel = self.background_token();
        let sent = self.state.wait_token().filter(|t| !t.is_empty());

        let mut outcome = self.query_server(client.as_ref(), debuggee_id, sent.as_deref(), cancel.as_ref()).await;
        if let Err(DebuggerError::Conflict(_)) = &outcome {
            // The server signals a change with 409 on hanging gets.
            outcome = self.query_server(client.as_ref(), debuggee_id, sent.as_deref(), cancel.as_ref()).await;
        }

        let current = match outcome {
            Ok(Some(list)) => list,
            Ok(None) => return false,
            Err(DebuggerError::Timeout) => return false,
            Err(e) => {
                tracing::warn!("Failed to list breakpoints for {}: {}", debuggee_id, e);
                return false;
            }
        };

        if cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false) || sent.is_none() {
            return false;
        }

        self.prune_breakpoint_cache(&current);
        self.fire_breakpoints_changed();
        true
    }

    /// Query until the wait token moves. `Ok(None)` when cancelled before publishing.
    async fn query_server(
        &self,
        client: &dyn DebuggerTransport,
        debuggee_id: &str,
        sent: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Arc<[ServerBreakpoint]>>> {
        let cancelled = || sent.is_some() && cancel.map(|c| c.is_cancelled()).unwrap_or(false);

        let (mut breakpoints, next_token) = loop {
            if cancelled() {
                return Ok(None);
            }

            let token = if self.use_wait_token { sent.map(str::to_string) } else { None };
            let response = client
                .list_breakpoints(debuggee_id, &ListBreakpointsRequest::capture(token))
                .await?;

            if cancelled() {
                return Ok(None);
            }

            let next = response.next_wait_token;
            if sent.is_none() || wait_token_changed(sent, next.as_deref()) {
                break (response.breakpoints, next);
            }

            if !self.use_wait_token {
                tokio::time::sleep(NO_WAIT_TOKEN_POLL).await;
            }
        };

        sort_breakpoints(&mut breakpoints);
        self.state.set_wait_token(next_token);
        self.state.set_current_server_breakpoint_list(breakpoints);
        Ok(Some(self.state.current_server_breakpoint_list()))
    }

    fn prune_breakpoint_cache(&self, current: &[ServerBreakpoint]) {
        let live: HashSet<&str> = current.iter().map(|bp| bp.id.as_str()).collect();
        self.full_final_breakpoints
            .retain(|id, _| live.contains(id.as_str()));
    }

    /// Start the repeating hanging query loop. No-op if already running.
    pub fn start_background_listening(self: &Arc<Self>) {
        let mut background = self.background.lock();
        if background.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *background = Some(cancel.clone());

        let controller: Weak<Self> = Arc::downgrade(self);
        let initial_delay = self.initial_delay;
        let period = self.period;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            loop {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = controller.wait_for_changes() => {}
                }
                drop(controller);

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
            tracing::debug!("Background listening stopped");
        });
    }

    pub fn stop_background_listening(&self) {
        if let Some(cancel) = self.background.lock().take() {
            cancel.cancel();
        }
    }

    pub fn is_background_listening(&self) -> bool {
        self.background.lock().is_some()
    }

    #[cfg(test)]
    pub(crate) fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .full_final_breakpoints
            .iter()
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Drop for StateController {
    fn drop(&mut self) {
        if let Some(cancel) = self.background.get_mut().take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{controller_with_mock, MockCall, RecordingListener};
    use crate::transport::ListBreakpointsResponse;
    use clouddebug_core::{StatusMessage, Timestamp};

    fn list(ids: &[&str], token: &str) -> ListBreakpointsResponse {
        ListBreakpointsResponse {
            breakpoints: ids
                .iter()
                .enumerate()
                .map(|(i, id)| ServerBreakpoint::at("A.java", i as i32 + 1).with_id(*id))
                .collect(),
            next_wait_token: Some(token.to_string()),
        }
    }

    #[tokio::test]
    async fn test_initialize_loads_without_notifying() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        let listener = Arc::new(RecordingListener::default());
        controller.add_listener(listener.clone());
        controller.state().set_wait_token(Some("stale".to_string()));

        transport.push_list(Ok(list(&["a"], "T1")));
        controller.initialize().await;

        assert_eq!(transport.list_wait_tokens(), vec![None]);
        assert_eq!(controller.state().wait_token().as_deref(), Some("T1"));
        assert_eq!(controller.state().current_server_breakpoint_list().len(), 1);
        assert_eq!(listener.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_changes_requeries_until_token_moves() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        let listener = Arc::new(RecordingListener::default());
        controller.add_listener(listener.clone());
        controller.state().set_wait_token(Some("T1".to_string()));

        transport.push_list(Ok(list(&["a"], "T1")));
        transport.push_list(Ok(list(&["a", "b"], "T2")));

        assert!(controller.wait_for_changes().await);
        assert_eq!(
            transport.list_wait_tokens(),
            vec![Some("T1".to_string()), Some("T1".to_string())]
        );
        assert_eq!(controller.state().current_server_breakpoint_list().len(), 2);
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn test_conflict_is_retried_once() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        controller.state().set_wait_token(Some("T1".to_string()));

        transport.push_list(Err(DebuggerError::Conflict("changed".into())));
        transport.push_list(Ok(list(&["a"], "T2")));
        assert!(controller.wait_for_changes().await);

        transport.push_list(Err(DebuggerError::Conflict("changed".into())));
        transport.push_list(Err(DebuggerError::Conflict("changed".into())));
        assert!(!controller.wait_for_changes().await);
        assert_eq!(controller.state().wait_token().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_timeout_means_no_change() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        controller.state().set_wait_token(Some("T1".to_string()));
        transport.push_list(Err(DebuggerError::Timeout));
        assert!(!controller.wait_for_changes().await);
        assert_eq!(controller.state().wait_token().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_set_replaces_pending_at_same_location() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        controller.state().set_current_server_breakpoint_list(vec![
            ServerBreakpoint::at("A.java", 10).with_id("old"),
            ServerBreakpoint::at("A.java", 11).with_id("neighbour"),
        ]);

        let registration = controller
            .set_breakpoint(ServerBreakpoint::at("A.java", 10))
            .await
            .unwrap();

        assert_eq!(transport.deleted_ids(), vec!["old".to_string()]);
        assert_eq!(transport.set_count(), 1);
        assert!(!registration.id.is_empty());
        assert_eq!(registration.error, None);
    }

    #[tokio::test]
    async fn test_set_reports_error_status_with_id() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        transport.push_set(Ok(Some(ServerBreakpoint {
            id: "bp-err".to_string(),
            status: Some(StatusMessage::error("No code at line $0", vec!["10".into()])),
            ..ServerBreakpoint::at("A.java", 10)
        })));

        let registration = controller
            .set_breakpoint(ServerBreakpoint::at("A.java", 10))
            .await
            .unwrap();
        assert_eq!(registration.id, "bp-err");
        assert_eq!(registration.error.as_deref(), Some("No code at line 10"));
    }

    #[tokio::test]
    async fn test_set_without_result_is_no_response() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        transport.push_set(Ok(None));
        let err = controller
            .set_breakpoint(ServerBreakpoint::at("A.java", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, DebuggerError::NoResponse));
    }

    #[tokio::test]
    async fn test_resolve_caches_final_and_prunes() {
        let (controller, transport) = controller_with_mock(&DebuggerConfig::default());
        let finished = ServerBreakpoint {
            id: "f".to_string(),
            is_final_state: true,
            final_time: Some(Timestamp::new(5, 0)),
            ..ServerBreakpoint::at("A.java", 3)
        };
        transport.add_server_breakpoint(finished.clone());
        controller.state().set_current_server_breakpoint_list(vec![
            finished,
            ServerBreakpoint::at("B.java", 1).with_id("p"),
        ]);

        let pending = controller.resolve_breakpoint("p").await.unwrap();
        assert_eq!(pending.id, "p");

        controller.resolve_breakpoint("f").await.unwrap();
        controller.resolve_breakpoint("f").await.unwrap();
        let gets = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::Get { .. }))
            .count();
        assert_eq!(gets, 1);
        assert_eq!(controller.cached_ids(), vec!["f".to_string()]);

        controller.state().set_wait_token(Some("T1".to_string()));
        transport.push_list(Ok(list(&["p"], "T2")));
        assert!(controller.wait_for_changes().await);
        assert!(controller.cached_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_listening_lifecycle() {
        let config = DebuggerConfig::default();
        let (controller, transport) = controller_with_mock(&config);
        let listener = Arc::new(RecordingListener::default());
        controller.add_listener(listener.clone());
        controller.state().set_wait_token(Some("T1".to_string()));
        transport.set_server_token("T2");

        controller.start_background_listening();
        controller.start_background_listening();
        assert!(controller.is_background_listening());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(transport.list_wait_tokens().is_empty());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(listener.count(), 1);

        controller.stop_background_listening();
        assert!(!controller.is_background_listening());
    }
}

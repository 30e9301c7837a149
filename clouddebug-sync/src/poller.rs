//! Global background poller
//!
//! One repeating task that long-polls every background-listening session and
//! notifies listeners when a session's wait token changed. Sessions within a tick
//! are polled concurrently, so a slow debuggee does not hold up its siblings.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::ClientCache;
use crate::listener::{BreakpointListener, ListenerId, ListenerSet};
use crate::registry::SessionSource;
use crate::state::{apply_list_response, ProcessState};
use crate::transport::ListBreakpointsRequest;

pub struct GlobalPoller {
    clients: Arc<ClientCache>,
    sessions: Arc<dyn SessionSource>,
    listeners: ListenerSet,
    period: Duration,
    task: Mutex<Option<CancellationToken>>,
}

impl GlobalPoller {
    pub fn new(clients: Arc<ClientCache>, sessions: Arc<dyn SessionSource>, period: Duration) -> Arc<Self> {
        Arc::new(Self {
            clients,
            sessions,
            listeners: ListenerSet::new(),
            period,
            task: Mutex::new(None),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn BreakpointListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Start the timer. The first tick fires one period from now. No-op if running.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        *task = Some(cancel.clone());

        let poller: Weak<Self> = Arc::downgrade(self);
        let period = self.period;
        tracing::info!("Starting background breakpoint poller ({:?} period)", period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(poller) = poller.upgrade() else {
                    break;
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = poller.poll_all() => {}
                }
            }
            tracing::debug!("Background breakpoint poller stopped");
        });
    }

    /// Cancel the timer. No-op if not running.
    pub fn stop(&self) {
        if let Some(cancel) = self.task.lock().take() {
            cancel.cancel();
            tracing::info!("Stopping background breakpoint poller");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.task.lock().is_some()
    }

    /// One tick: poll every eligible session.
    pub async fn poll_all(&self) {
        let states = self.sessions.background_listening_states();
        if states.is_empty() {
            return;
        }
        join_all(states.iter().map(|state| self.poll_for_changes(state))).await;
    }

    /// Long-poll one session. Returns true if listeners were notified.
    pub async fn poll_for_changes(&self, state: &Arc<ProcessState>) -> bool {
        let Some(client) = self.clients.long_timeout_client(state.user_email()) else {
            tracing::debug!("Skipping {:?}: not logged in", state.debuggee_id());
            return false;
        };
        let Some(debuggee_id) = state.debuggee_id() else {
            return false;
        };

        let request = ListBreakpointsRequest::capture(state.wait_token());
        match client.list_breakpoints(debuggee_id, &request).await {
            Ok(response) => {
                let changed = apply_list_response(state, response);
                if changed {
                    tracing::debug!("Breakpoints changed for {}", debuggee_id);
                    self.listeners.notify(state);
                }
                changed
            }
            Err(e) if e.is_expected_poll_outcome() => {
                tracing::debug!("No change for {}: {}", debuggee_id, e);
                false
            }
            Err(e) => {
                tracing::warn!("Failed to list breakpoints for {}: {}", debuggee_id, e);
                false
            }
        }
    }
}

impl Drop for GlobalPoller {
    fn drop(&mut self) {
        if let Some(cancel) = self.task.get_mut().take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DebuggerError;
    use crate::registry::SessionRegistry;
    use crate::testing::{MockTransport, RecordingListener};
    use crate::client::TimeoutClass;
    use crate::transport::ListBreakpointsResponse;
    use clouddebug_core::ServerBreakpoint;

    const EMAIL: &str = "dev@example.com";

    fn setup() -> (Arc<GlobalPoller>, Arc<MockTransport>, Arc<SessionRegistry>, Arc<ProcessState>) {
        let transport = Arc::new(MockTransport::new());
        let clients = Arc::new(ClientCache::new(Arc::new(crate::testing::NullFactory)));
        clients.insert(EMAIL, TimeoutClass::Long, transport.clone());

        let registry = Arc::new(SessionRegistry::new());
        let state = Arc::new(ProcessState::new(EMAIL, "d-1"));
        state.set_listen_in_background(true);
        registry.register("project", state.clone());

        let poller = GlobalPoller::new(clients, registry.clone(), Duration::from_secs(10));
        (poller, transport, registry, state)
    }

    fn response(token: &str) -> ListBreakpointsResponse {
        ListBreakpointsResponse {
            breakpoints: vec![ServerBreakpoint::at("A.java", 10).with_id("bp-1")],
            next_wait_token: Some(token.to_string()),
        }
    }

    #[tokio::test]
    async fn test_notifies_only_on_token_change() {
        let (poller, transport, _registry, state) = setup();
        let listener = Arc::new(RecordingListener::default());
        poller.add_listener(listener.clone());

        transport.push_list(Ok(response("T1")));
        transport.push_list(Ok(response("T1")));
        transport.push_list(Ok(response("T2")));

        assert!(poller.poll_for_changes(&state).await);
        assert!(!poller.poll_for_changes(&state).await);
        assert!(poller.poll_for_changes(&state).await);
        assert_eq!(listener.count(), 2);

        let sent = transport.list_wait_tokens();
        assert_eq!(sent, vec![None, Some("T1".to_string()), Some("T1".to_string())]);
        assert_eq!(state.wait_token().as_deref(), Some("T2"));
        assert_eq!(state.current_server_breakpoint_list().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_keep_stale_state() {
        let (poller, transport, _registry, state) = setup();
        let listener = Arc::new(RecordingListener::default());
        poller.add_listener(listener.clone());

        transport.push_list(Ok(response("T1")));
        assert!(poller.poll_for_changes(&state).await);

        transport.push_list(Err(DebuggerError::Timeout));
        transport.push_list(Err(DebuggerError::Status { status: 500, message: "boom".into() }));
        assert!(!poller.poll_for_changes(&state).await);
        assert!(!poller.poll_for_changes(&state).await);

        assert_eq!(listener.count(), 1);
        assert_eq!(state.wait_token().as_deref(), Some("T1"));
        assert_eq!(state.current_server_breakpoint_list()[0].id, "bp-1");
    }

    #[tokio::test]
    async fn test_logged_out_session_is_skipped() {
        let (poller, transport, registry, _state) = setup();
        let stranger = Arc::new(ProcessState::new("stranger@example.com", "d-2"));
        stranger.set_listen_in_background(true);
        registry.register("project", stranger.clone());

        assert!(!poller.poll_for_changes(&stranger).await);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_poll_all_skips_live_sessions() {
        let (poller, transport, registry, state) = setup();
        registry.session_started(state.id());
        poller.poll_all().await;
        assert!(transport.calls().is_empty());

        registry.session_stopped(state.id());
        transport.push_list(Ok(response("T1")));
        poller.poll_all().await;
        assert_eq!(transport.list_wait_tokens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_session_does_not_delay_siblings() {
        let (poller, transport, registry, state) = setup();
        let listener = Arc::new(RecordingListener::default());
        poller.add_listener(listener.clone());

        // Already up to date, so its list call hangs
        let slow_transport = Arc::new(MockTransport::new());
        poller.clients.insert("slow@example.com", TimeoutClass::Long, slow_transport.clone());
        let slow = Arc::new(ProcessState::new("slow@example.com", "d-2"));
        slow.set_wait_token(Some("T0".to_string()));
        slow.set_listen_in_background(true);
        registry.register("project", slow.clone());

        transport.push_list(Ok(response("T1")));

        let tick = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll_all().await }
        });
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(!tick.is_finished());
        assert_eq!(slow_transport.list_wait_tokens(), vec![Some("T0".to_string())]);
        assert_eq!(listener.count(), 1);
        assert_eq!(state.wait_token().as_deref(), Some("T1"));
        assert_eq!(state.current_server_breakpoint_list().len(), 1);
        assert_eq!(slow.wait_token().as_deref(), Some("T0"));

        tick.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_first_fires_after_one_period() {
        let (poller, transport, _registry, _state) = setup();
        transport.push_list(Ok(response("T1")));
        poller.start();
        poller.start();
        assert!(poller.is_listening());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(transport.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.list_wait_tokens().len(), 1);

        poller.stop();
        poller.stop();
        assert!(!poller.is_listening());
    }
}

//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use clouddebug_core::{Debuggee, DebuggerConfig, ServerBreakpoint};

use crate::client::{ClientCache, TimeoutClass, TransportFactory};
use crate::controller::StateController;
use crate::error::{DebuggerError, Result};
use crate::listener::BreakpointListener;
use crate::state::ProcessState;
use crate::transport::{DebuggerTransport, ListBreakpointsRequest, ListBreakpointsResponse};

pub(crate) const TEST_EMAIL: &str = "dev@example.com";
pub(crate) const TEST_DEBUGGEE: &str = "d-1";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCall {
    List { debuggee_id: String, wait_token: Option<String> },
    Set { debuggee_id: String, breakpoint: ServerBreakpoint },
    Get { debuggee_id: String, breakpoint_id: String },
    Delete { debuggee_id: String, breakpoint_id: String },
    ListDebuggees { project: String },
}

#[derive(Default)]
struct ServerState {
    breakpoints: Vec<ServerBreakpoint>,
    token: Option<String>,
    version: u64,
    next_id: u64,
}

impl ServerState {
    fn bump(&mut self) {
        self.version += 1;
        self.token = Some(format!("T{}", self.version));
    }
}

/// In-process debugger service.
///
/// Scripted responses are returned first, in order. Without a script, list calls
/// behave like the real hanging get: a request carrying the current token blocks
/// for an hour and then times out.
pub(crate) struct MockTransport {
    server: Mutex<ServerState>,
    list_script: Mutex<VecDeque<Result<ListBreakpointsResponse>>>,
    set_script: Mutex<VecDeque<Result<Option<ServerBreakpoint>>>>,
    debuggees: Mutex<Vec<Debuggee>>,
    calls: Mutex<Vec<MockCall>>,
    set_hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            server: Mutex::new(ServerState {
                token: Some("T0".to_string()),
                ..Default::default()
            }),
            list_script: Mutex::new(VecDeque::new()),
            set_script: Mutex::new(VecDeque::new()),
            debuggees: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            set_hook: Mutex::new(None),
        }
    }

    pub(crate) fn push_list(&self, response: Result<ListBreakpointsResponse>) {
        self.list_script.lock().push_back(response);
    }

    pub(crate) fn push_set(&self, response: Result<Option<ServerBreakpoint>>) {
        self.set_script.lock().push_back(response);
    }

    pub(crate) fn set_server_token(&self, token: &str) {
        self.server.lock().token = Some(token.to_string());
    }

    pub(crate) fn add_server_breakpoint(&self, breakpoint: ServerBreakpoint) {
        let mut server = self.server.lock();
        server.breakpoints.push(breakpoint);
        server.bump();
    }

    pub(crate) fn server_breakpoints(&self) -> Vec<ServerBreakpoint> {
        self.server.lock().breakpoints.clone()
    }

    pub(crate) fn set_debuggees(&self, debuggees: Vec<Debuggee>) {
        *self.debuggees.lock() = debuggees;
    }

    /// Run `hook` at the start of every set call, before the response is produced.
    pub(crate) fn on_set(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.set_hook.lock() = Some(Box::new(hook));
    }

    pub(crate) fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn set_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, MockCall::Set { .. }))
            .count()
    }

    pub(crate) fn set_requests(&self) -> Vec<ServerBreakpoint> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MockCall::Set { breakpoint, .. } => Some(breakpoint.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn deleted_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MockCall::Delete { breakpoint_id, .. } => Some(breakpoint_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn list_wait_tokens(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MockCall::List { wait_token, .. } => Some(wait_token.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl DebuggerTransport for MockTransport {
    async fn list_breakpoints(
        &self,
        debuggee_id: &str,
        request: &ListBreakpointsRequest,
    ) -> Result<ListBreakpointsResponse> {
        self.record(MockCall::List {
            debuggee_id: debuggee_id.to_string(),
            wait_token: request.wait_token.clone(),
        });

        if let Some(scripted) = self.list_script.lock().pop_front() {
            return scripted;
        }

        let snapshot = {
            let server = self.server.lock();
            if request.wait_token.is_some() && request.wait_token == server.token {
                None
            } else {
                Some(ListBreakpointsResponse {
                    breakpoints: server.breakpoints.clone(),
                    next_wait_token: server.token.clone(),
                })
            }
        };
        match snapshot {
            Some(response) => Ok(response),
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DebuggerError::Timeout)
            }
        }
    }

    async fn set_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint: &ServerBreakpoint,
    ) -> Result<Option<ServerBreakpoint>> {
        self.record(MockCall::Set {
            debuggee_id: debuggee_id.to_string(),
            breakpoint: breakpoint.clone(),
        });
        if let Some(hook) = self.set_hook.lock().as_ref() {
            hook();
        }

        if let Some(scripted) = self.set_script.lock().pop_front() {
            return scripted;
        }

        let mut server = self.server.lock();
        server.next_id += 1;
        let created = breakpoint.clone().with_id(format!("bp-{}", server.next_id));
        server.breakpoints.push(created.clone());
        server.bump();
        Ok(Some(created))
    }

    async fn get_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint_id: &str,
    ) -> Result<Option<ServerBreakpoint>> {
        self.record(MockCall::Get {
            debuggee_id: debuggee_id.to_string(),
            breakpoint_id: breakpoint_id.to_string(),
        });
        Ok(self
            .server
            .lock()
            .breakpoints
            .iter()
            .find(|bp| bp.id == breakpoint_id)
            .cloned())
    }

    async fn delete_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> Result<()> {
        self.record(MockCall::Delete {
            debuggee_id: debuggee_id.to_string(),
            breakpoint_id: breakpoint_id.to_string(),
        });
        let mut server = self.server.lock();
        let before = server.breakpoints.len();
        server.breakpoints.retain(|bp| bp.id != breakpoint_id);
        if server.breakpoints.len() != before {
            server.bump();
        }
        Ok(())
    }

    async fn list_debuggees(&self, project_number: &str) -> Result<Vec<Debuggee>> {
        self.record(MockCall::ListDebuggees {
            project: project_number.to_string(),
        });
        Ok(self.debuggees.lock().clone())
    }
}

/// Counts change notifications
#[derive(Default)]
pub(crate) struct RecordingListener {
    count: AtomicUsize,
}

impl RecordingListener {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl BreakpointListener for RecordingListener {
    fn on_breakpoint_list_changed(&self, _state: &Arc<ProcessState>) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A factory for a user with no credentials
pub(crate) struct NullFactory;

impl TransportFactory for NullFactory {
    fn create(&self, _user_email: &str, _class: TimeoutClass) -> Option<Arc<dyn DebuggerTransport>> {
        None
    }
}

/// A controller for `dev@example.com` / `d-1` backed by one mock for both timeouts
pub(crate) fn controller_with_mock(config: &DebuggerConfig) -> (Arc<StateController>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let clients = Arc::new(ClientCache::new(Arc::new(NullFactory)));
    clients.insert(TEST_EMAIL, TimeoutClass::Long, transport.clone());
    clients.insert(TEST_EMAIL, TimeoutClass::Short, transport.clone());

    let state = Arc::new(ProcessState::new(TEST_EMAIL, TEST_DEBUGGEE));
    (StateController::new(state, clients, config), transport)
}

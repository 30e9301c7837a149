//! Live debug session
//!
//! Connects one [`CloudBreakpointHandler`] to its two event sources: breakpoint
//! list changes from the state controller, and local breakpoint changes from the
//! host model. Network calls triggered by local changes run as spawned tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use clouddebug_core::render_user_error_message;

use crate::handler::CloudBreakpointHandler;
use crate::listener::{BreakpointListener, ListenerId};
use crate::model::{BreakpointObserver, ManagedBreakpoint};
use crate::registry::SessionRegistry;
use crate::state::ProcessState;

pub struct DebugSession {
    handler: Arc<CloudBreakpointHandler>,
    registry: Option<Arc<SessionRegistry>>,
    runtime: Handle,
    listener: Mutex<Option<ListenerId>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl DebugSession {
    /// Subscribe to the controller and mark the session live. Must be called
    /// within a tokio runtime.
    ///
    /// The host model must also be pointed at [`DebugSession::observer`].
    pub fn attach(handler: Arc<CloudBreakpointHandler>, registry: Option<Arc<SessionRegistry>>) -> Arc<Self> {
        let session = Arc::new(Self {
            handler,
            registry,
            runtime: Handle::current(),
            listener: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });

        let listener: Arc<dyn BreakpointListener> = session.clone();
        *session.listener.lock() = Some(session.handler.controller().add_listener(listener));

        if let Some(registry) = &session.registry {
            registry.session_started(session.state().id());
        }
        tracing::info!("Attached to debuggee {:?}", session.state().debuggee_id());
        session
    }

    pub fn observer(self: &Arc<Self>) -> Weak<dyn BreakpointObserver> {
        let observer: Arc<dyn BreakpointObserver> = self.clone();
        Arc::downgrade(&observer)
    }

    pub fn handler(&self) -> &Arc<CloudBreakpointHandler> {
        &self.handler
    }

    pub fn state(&self) -> &Arc<ProcessState> {
        self.handler.controller().state()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Load the current list, reconcile it, and start background listening.
    pub async fn start(&self) {
        let controller = self.handler.controller();
        controller.initialize().await;
        self.on_breakpoint_list_changed(controller.state());
        controller.start_background_listening();
    }

    /// Detach from the controller. With `keep_listening` the global poller takes
    /// over watching this debuggee.
    pub fn stop(&self, keep_listening: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let controller = self.handler.controller();
        controller.stop_background_listening();
        if let Some(id) = self.listener.lock().take() {
            controller.remove_listener(id);
        }

        self.state().set_listen_in_background(keep_listening);
        if let Some(registry) = &self.registry {
            registry.session_stopped(self.state().id());
        }
        tracing::info!("Detached from debuggee {:?}", self.state().debuggee_id());
    }

    /// Wait for every registration and deletion started so far.
    pub async fn wait_for_pending(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!("Breakpoint task failed: {}", e);
                }
            }
        }
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        let handle = self.runtime.spawn(task);
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    fn register(&self, local: &Arc<dyn ManagedBreakpoint>) {
        if self.is_stopped() {
            return;
        }
        let Some(request) = self.handler.registration_request(local) else {
            return;
        };
        let handler = self.handler.clone();
        let local = local.clone();
        self.spawn(async move {
            handler.submit_registration(&local, request).await;
        });
    }

    fn unregister(&self, local: &Arc<dyn ManagedBreakpoint>) {
        if self.is_stopped() {
            return;
        }
        let Some(server_id) = self.handler.unregistration_request(local) else {
            return;
        };
        let handler = self.handler.clone();
        self.spawn(async move {
            handler.delete_server_breakpoint(&server_id).await;
        });
    }

    fn reregister(&self, local: &Arc<dyn ManagedBreakpoint>) {
        if self.is_stopped() {
            return;
        }
        let Some((stale, request)) = self.handler.reregistration_request(local) else {
            return;
        };
        let handler = self.handler.clone();
        let local = local.clone();
        self.spawn(async move {
            handler.submit_reregistration(&local, stale, request).await;
        });
    }
}

impl BreakpointListener for DebugSession {
    fn on_breakpoint_list_changed(&self, state: &Arc<ProcessState>) {
        let current = state.current_server_breakpoint_list();
        self.handler.create_ide_representations_if_necessary(&current);

        for server in current.iter().filter(|bp| bp.is_final()) {
            if self.handler.get_enabled_x_breakpoint(server).is_none() {
                continue;
            }
            if server.has_error_status() {
                let message = render_user_error_message(server.status.as_ref());
                self.handler.show_error(server, message);
            } else if !self.is_stopped() {
                self.handler.set_state_to_disabled(server);
            }
        }
    }
}

impl BreakpointObserver for DebugSession {
    fn breakpoint_added(&self, breakpoint: &Arc<dyn ManagedBreakpoint>) {
        if breakpoint.is_enabled() {
            self.register(breakpoint);
        }
    }

    fn breakpoint_enabled_changed(&self, breakpoint: &Arc<dyn ManagedBreakpoint>) {
        if breakpoint.is_enabled() {
            self.register(breakpoint);
        } else {
            self.unregister(breakpoint);
        }
    }

    fn breakpoint_changed(&self, breakpoint: &Arc<dyn ManagedBreakpoint>) {
        self.reregister(breakpoint);
    }

    fn breakpoint_removed(&self, breakpoint: &Arc<dyn ManagedBreakpoint>) {
        if breakpoint.is_enabled() {
            self.unregister(breakpoint);
        } else {
            self.handler.forget_local(breakpoint);
        }
    }
}

//! Cloud breakpoint handler
//!
//! Reconciles the host's local snapshot breakpoints with the server's breakpoint
//! list for one debug session:
//! - materializes pending server breakpoints as local ones
//! - registers user-created breakpoints on the server
//! - disables local breakpoints whose snapshot was captured
//!
//! Local model mutations always go through the [`UiExecutor`]. Network calls and
//! identity bookkeeping run on the caller's task.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use clouddebug_core::message::{BAD_LOGIN, ERROR_SET, INVALID_STATE, NO_RESPONSE};
use clouddebug_core::ServerBreakpoint;

use crate::controller::StateController;
use crate::error::DebuggerError;
use crate::model::{
    BreakpointModel, FileResolver, LineBreakpointProperties, LocalBreakpointId,
    ManagedBreakpoint, SourcePosition, UiExecutor,
};

/// Bidirectional server id / local breakpoint map.
///
/// At most one local breakpoint per server id and one server id per local
/// breakpoint. Reads are lock-free; compound writes are serialized.
#[derive(Default)]
pub struct IdentityMap {
    by_server: DashMap<String, Arc<dyn ManagedBreakpoint>>,
    by_local: DashMap<LocalBreakpointId, String>,
    writes: Mutex<()>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `server_id` to `local`, evicting the local's previous id and any other
    /// local bound to `server_id`. Returns the evicted previous id.
    pub fn bind(&self, server_id: &str, local: &Arc<dyn ManagedBreakpoint>) -> Option<String> {
        let _guard = self.writes.lock();

        let previous = self.by_local.insert(local.id(), server_id.to_string());
        if let Some(old) = previous.as_deref().filter(|old| *old != server_id) {
            self.by_server.remove(old);
        }
        if let Some(displaced) = self.by_server.insert(server_id.to_string(), local.clone()) {
            if displaced.id() != local.id() {
                self.by_local.remove(&displaced.id());
            }
        }
        previous.filter(|old| old != server_id)
    }

    /// Drop the mapping of a local breakpoint. Returns its server id.
    pub fn unbind_local(&self, local: LocalBreakpointId) -> Option<String> {
        let _guard = self.writes.lock();
        let (_, server_id) = self.by_local.remove(&local)?;
        self.by_server.remove_if(&server_id, |_, bp| bp.id() == local);
        Some(server_id)
    }

    pub fn local(&self, server_id: &str) -> Option<Arc<dyn ManagedBreakpoint>> {
        self.by_server.get(server_id).map(|entry| entry.value().clone())
    }

    pub fn server_id(&self, local: LocalBreakpointId) -> Option<String> {
        self.by_local.get(&local).map(|entry| entry.value().clone())
    }

    pub fn contains_server(&self, server_id: &str) -> bool {
        self.by_server.contains_key(server_id)
    }

    pub fn len(&self) -> usize {
        self.by_server.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_server.is_empty()
    }
}

/// A local breakpoint to create for a server record
struct LocalPlacement {
    server_id: String,
    file: PathBuf,
    /// Zero-based
    line: u32,
    condition: Option<String>,
    expressions: Vec<String>,
}

impl LocalPlacement {
    fn resolve(breakpoint: &ServerBreakpoint, resolver: &dyn FileResolver) -> Option<Self> {
        let path = breakpoint.path()?;
        let line = breakpoint.line().filter(|line| *line >= 1)?;
        let Some(file) = resolver.local_file(path) else {
            tracing::debug!("{} not found locally, skipping breakpoint {}", path, breakpoint.id);
            return None;
        };
        Some(Self {
            server_id: breakpoint.id.clone(),
            file,
            line: (line - 1) as u32,
            condition: breakpoint.condition.clone().filter(|c| !c.is_empty()),
            expressions: breakpoint.expressions.clone(),
        })
    }
}

fn registration_error_message(err: &DebuggerError) -> String {
    match err {
        DebuggerError::NotLoggedIn(_) => BAD_LOGIN.to_string(),
        DebuggerError::NoResponse => NO_RESPONSE.to_string(),
        other => format!("{}: {}", ERROR_SET, other),
    }
}

pub struct CloudBreakpointHandler {
    controller: Arc<StateController>,
    model: Arc<dyn BreakpointModel>,
    resolver: Arc<dyn FileResolver>,
    executor: Arc<dyn UiExecutor>,
    identities: Arc<IdentityMap>,
}

impl CloudBreakpointHandler {
    pub fn new(
        controller: Arc<StateController>,
        model: Arc<dyn BreakpointModel>,
        resolver: Arc<dyn FileResolver>,
        executor: Arc<dyn UiExecutor>,
    ) -> Self {
        Self {
            controller,
            model,
            resolver,
            executor,
            identities: Arc::new(IdentityMap::new()),
        }
    }

    pub fn controller(&self) -> &Arc<StateController> {
        &self.controller
    }

    pub fn identities(&self) -> &IdentityMap {
        &self.identities
    }

    /// Create local breakpoints for pending server breakpoints that have none.
    ///
    /// Placements are computed here; the model is changed in a single UI job,
    /// which ends with one change notification if anything was created.
    pub fn create_ide_representations_if_necessary(&self, breakpoints: &[ServerBreakpoint]) {
        let mut mapped = Vec::new();
        let mut placements = Vec::new();
        for breakpoint in breakpoints
            .iter()
            .filter(|bp| !bp.is_final() && !bp.id.is_empty())
        {
            if self.identities.contains_server(&breakpoint.id) {
                mapped.push(breakpoint.id.clone());
            } else if let Some(placement) = LocalPlacement::resolve(breakpoint, self.resolver.as_ref()) {
                placements.push(placement);
            }
        }
        if mapped.is_empty() && placements.is_empty() {
            return;
        }

        let model = self.model.clone();
        let identities = self.identities.clone();
        let controller = self.controller.clone();
        self.executor.invoke_later(Box::new(move || {
            for server_id in &mapped {
                if let Some(local) = identities.local(server_id) {
                    local.set_verified(true);
                    local.set_error_message(None);
                }
            }

            let created = placements
                .into_iter()
                .filter(|placement| materialize(model.as_ref(), &identities, placement))
                .count();
            if created > 0 {
                tracing::debug!("Created {} local breakpoints from server state", created);
                controller.fire_breakpoints_changed();
            }
        }));
    }

    /// Re-arm final breakpoints as new, unmapped local breakpoints.
    ///
    /// The new breakpoints are not marked server-created, so the host registers
    /// them and they get fresh server ids.
    pub fn clone_to_new_breakpoints(&self, breakpoints: &[ServerBreakpoint]) {
        let placements: Vec<LocalPlacement> = breakpoints
            .iter()
            .filter(|bp| bp.is_final())
            .filter_map(|bp| {
                let placement = LocalPlacement::resolve(bp, self.resolver.as_ref());
                if placement.is_none() {
                    tracing::warn!("Cannot clone breakpoint {}: no local source location", bp.id);
                }
                placement
            })
            .collect();
        if placements.is_empty() {
            return;
        }

        let model = self.model.clone();
        self.executor.invoke_later(Box::new(move || {
            for placement in placements {
                if let Some(existing) = model.find_breakpoint_at_line(&placement.file, placement.line) {
                    model.remove_breakpoint(&existing);
                }
                let properties = LineBreakpointProperties {
                    watch_expressions: placement.expressions,
                    ..Default::default()
                };
                model.add_line_breakpoint(&placement.file, placement.line, placement.condition, properties);
            }
        }));
    }

    /// The set request for a local breakpoint, or `None` if it must not be registered.
    ///
    /// Evaluated synchronously when the host reports the breakpoint, so the
    /// transient server-created flag is still visible.
    pub fn registration_request(&self, local: &Arc<dyn ManagedBreakpoint>) -> Option<ServerBreakpoint> {
        if !local.is_enabled() {
            return None;
        }

        let properties = local.properties();
        if properties.created_by_server {
            return None;
        }
        // Already on the server and not re-enabled after a capture
        if properties.added_on_server && !properties.disabled_by_server {
            return None;
        }
        self.set_request(local, properties.watch_expressions)
    }

    /// The server id to replace and the new set request after the user edited
    /// the condition or watch expressions of an enabled breakpoint.
    ///
    /// Drops the current mapping, so call it once per edit.
    pub fn reregistration_request(
        &self,
        local: &Arc<dyn ManagedBreakpoint>,
    ) -> Option<(Option<String>, ServerBreakpoint)> {
        if !local.is_enabled() {
            return None;
        }
        let properties = local.properties();
        if properties.created_by_server {
            return None;
        }
        let request = self.set_request(local, properties.watch_expressions)?;
        Some((self.unregistration_request(local), request))
    }

    fn set_request(&self, local: &Arc<dyn ManagedBreakpoint>, expressions: Vec<String>) -> Option<ServerBreakpoint> {
        let position = local.source_position()?;
        let Some(path) = self.resolver.server_path(&position.file) else {
            tracing::error!("{}: {}", INVALID_STATE, position.file.display());
            return None;
        };

        let mut request = ServerBreakpoint::at(path, position.line as i32 + 1);
        request.condition = local.condition().filter(|c| !c.is_empty());
        request.expressions = expressions;
        Some(request)
    }

    /// Send a set request for `local`. Returns the new server id once mapped.
    pub async fn submit_registration(
        &self,
        local: &Arc<dyn ManagedBreakpoint>,
        request: ServerBreakpoint,
    ) -> Option<String> {
        let registration = match self.controller.set_breakpoint(request).await {
            Ok(registration) => registration,
            Err(e) => {
                tracing::warn!("Failed to register breakpoint {:?}: {}", local.source_position(), e);
                let message = registration_error_message(&e);
                let local = local.clone();
                self.executor
                    .invoke_later(Box::new(move || local.set_error_message(Some(message))));
                return None;
            }
        };

        if !local.is_enabled() {
            tracing::info!(
                "Breakpoint {:?} was disabled during registration, deleting {}",
                local.id(),
                registration.id
            );
            self.delete_server_breakpoint(&registration.id).await;
            return None;
        }

        if let Some(old) = self.identities.bind(&registration.id, local) {
            tracing::debug!("Breakpoint {:?} re-registered: {} -> {}", local.id(), old, registration.id);
        }

        let error = registration.error;
        let updated = local.clone();
        self.executor.invoke_later(Box::new(move || {
            updated.update_properties(&mut |p| {
                p.added_on_server = true;
                p.disabled_by_server = false;
            });
            updated.set_verified(true);
            updated.set_error_message(error);
        }));
        Some(registration.id)
    }

    /// Register a user-created or re-enabled local breakpoint.
    pub async fn register_breakpoint(&self, local: &Arc<dyn ManagedBreakpoint>) -> Option<String> {
        let request = self.registration_request(local)?;
        self.submit_registration(local, request).await
    }

    /// Replace the server breakpoint of an edited local breakpoint.
    pub async fn reregister_breakpoint(&self, local: &Arc<dyn ManagedBreakpoint>) -> Option<String> {
        let (stale, request) = self.reregistration_request(local)?;
        self.submit_reregistration(local, stale, request).await
    }

    /// Delete `stale`, then register `request` for `local`.
    pub async fn submit_reregistration(
        &self,
        local: &Arc<dyn ManagedBreakpoint>,
        stale: Option<String>,
        request: ServerBreakpoint,
    ) -> Option<String> {
        if let Some(server_id) = stale {
            self.delete_server_breakpoint(&server_id).await;
        }
        self.submit_registration(local, request).await
    }

    /// The server id to delete for a disabled or removed local breakpoint.
    ///
    /// `None` when the server finalized the breakpoint (its mapping is kept) or
    /// when it was never registered.
    pub fn unregistration_request(&self, local: &Arc<dyn ManagedBreakpoint>) -> Option<String> {
        let disabled_by_server = local.properties().disabled_by_server;
        local.update_properties(&mut |p| p.added_on_server = false);
        if disabled_by_server {
            return None;
        }

        let server_id = self.identities.unbind_local(local.id());
        if server_id.is_none() {
            tracing::info!("Breakpoint {:?} was never registered, nothing to delete", local.id());
        }
        server_id
    }

    pub async fn unregister_breakpoint(&self, local: &Arc<dyn ManagedBreakpoint>) {
        if let Some(server_id) = self.unregistration_request(local) {
            self.delete_server_breakpoint(&server_id).await;
        }
    }

    /// Drop the mapping of a local breakpoint that no longer exists, without any server call.
    pub fn forget_local(&self, local: &Arc<dyn ManagedBreakpoint>) {
        self.identities.unbind_local(local.id());
    }

    /// User deletion from the snapshot list.
    pub async fn delete_breakpoint(&self, breakpoint: &ServerBreakpoint) {
        if !breakpoint.is_final() {
            self.set_state_to_disabled(breakpoint);
        }
        self.delete_server_breakpoint(&breakpoint.id).await;
    }

    pub(crate) async fn delete_server_breakpoint(&self, server_id: &str) {
        if let Err(e) = self.controller.delete_breakpoint(server_id).await {
            tracing::warn!("Failed to delete breakpoint {}: {}", server_id, e);
        }
    }

    /// Disable the local breakpoint of a captured snapshot. The mapping is kept and
    /// the disable does not reach the server.
    pub fn set_state_to_disabled(&self, breakpoint: &ServerBreakpoint) {
        let Some(local) = self.identities.local(&breakpoint.id) else {
            return;
        };
        local.update_properties(&mut |p| p.disabled_by_server = true);

        let model = self.model.clone();
        self.executor
            .invoke_later(Box::new(move || model.set_enabled(&local, false)));
    }

    /// Attach a rendered server error to the local breakpoint mapped to `breakpoint`.
    pub fn show_error(&self, breakpoint: &ServerBreakpoint, message: Option<String>) {
        if let Some(local) = self.identities.local(&breakpoint.id) {
            self.executor
                .invoke_later(Box::new(move || local.set_error_message(message)));
        }
    }

    pub fn get_x_breakpoint(&self, breakpoint: Option<&ServerBreakpoint>) -> Option<Arc<dyn ManagedBreakpoint>> {
        self.identities.local(&breakpoint?.id)
    }

    pub fn get_enabled_x_breakpoint(&self, breakpoint: &ServerBreakpoint) -> Option<Arc<dyn ManagedBreakpoint>> {
        self.get_x_breakpoint(Some(breakpoint))
            .filter(|local| local.is_enabled())
    }

    /// Editor position of the local breakpoint mapped to `breakpoint`.
    pub fn navigate_to(&self, breakpoint: &ServerBreakpoint) -> Option<SourcePosition> {
        self.identities.local(&breakpoint.id)?.source_position()
    }
}

/// Create one local breakpoint for a placement. Runs on the UI executor.
fn materialize(model: &dyn BreakpointModel, identities: &IdentityMap, placement: &LocalPlacement) -> bool {
    if identities.contains_server(&placement.server_id) {
        return false;
    }
    if let Some(existing) = model.find_breakpoint_at_line(&placement.file, placement.line) {
        if existing.is_enabled() {
            return false;
        }
        model.remove_breakpoint(&existing);
    }

    let properties = LineBreakpointProperties {
        watch_expressions: placement.expressions.clone(),
        created_by_server: true,
        ..Default::default()
    };
    let local = model.add_line_breakpoint(
        &placement.file,
        placement.line,
        placement.condition.clone(),
        properties,
    );
    identities.bind(&placement.server_id, &local);

    // Later edits by the user must register again
    local.update_properties(&mut |p| p.created_by_server = false);
    local.set_verified(true);
    local.set_error_message(None);
    true
}

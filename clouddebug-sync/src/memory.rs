//! In-memory host breakpoint model
//!
//! A minimal editor-side breakpoint store for headless hosts and tests. Observer
//! notifications are delivered after internal locks are released.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::model::{
    BreakpointModel, BreakpointObserver, LineBreakpointProperties, LocalBreakpointId,
    ManagedBreakpoint, SourcePosition,
};

#[derive(Debug, Default)]
struct BreakpointState {
    enabled: bool,
    condition: Option<String>,
    properties: LineBreakpointProperties,
    verified: bool,
    error_message: Option<String>,
}

#[derive(Debug)]
pub struct InMemoryBreakpoint {
    id: LocalBreakpointId,
    file: PathBuf,
    line: u32,
    state: Mutex<BreakpointState>,
}

impl InMemoryBreakpoint {
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl ManagedBreakpoint for InMemoryBreakpoint {
    fn id(&self) -> LocalBreakpointId {
        self.id
    }

    fn source_position(&self) -> Option<SourcePosition> {
        Some(SourcePosition::new(self.file.clone(), self.line))
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn condition(&self) -> Option<String> {
        self.state.lock().condition.clone()
    }

    fn set_condition(&self, condition: Option<String>) {
        self.state.lock().condition = condition.filter(|c| !c.is_empty());
    }

    fn properties(&self) -> LineBreakpointProperties {
        self.state.lock().properties.clone()
    }

    fn update_properties(&self, update: &mut dyn FnMut(&mut LineBreakpointProperties)) {
        update(&mut self.state.lock().properties);
    }

    fn is_verified(&self) -> bool {
        self.state.lock().verified
    }

    fn set_verified(&self, verified: bool) {
        self.state.lock().verified = verified;
    }

    fn error_message(&self) -> Option<String> {
        self.state.lock().error_message.clone()
    }

    fn set_error_message(&self, message: Option<String>) {
        self.state.lock().error_message = message;
    }
}

#[derive(Default)]
pub struct InMemoryBreakpointModel {
    breakpoints: RwLock<Vec<Arc<InMemoryBreakpoint>>>,
    next_id: AtomicU64,
    observer: RwLock<Option<Weak<dyn BreakpointObserver>>>,
}

impl InMemoryBreakpointModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&self, observer: Weak<dyn BreakpointObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn clear_observer(&self) {
        *self.observer.write() = None;
    }

    fn observer(&self) -> Option<Arc<dyn BreakpointObserver>> {
        self.observer.read().as_ref().and_then(Weak::upgrade)
    }

    /// Snapshot of all breakpoints, in creation order
    pub fn breakpoints(&self) -> Vec<Arc<dyn ManagedBreakpoint>> {
        self.breakpoints
            .read()
            .iter()
            .map(|bp| bp.clone() as Arc<dyn ManagedBreakpoint>)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.read().is_empty()
    }

    /// Edit the condition of `breakpoint`, notifying the observer if it changed.
    pub fn set_condition(&self, breakpoint: &Arc<dyn ManagedBreakpoint>, condition: Option<String>) {
        let before = breakpoint.condition();
        breakpoint.set_condition(condition);
        if breakpoint.condition() != before {
            self.notify_changed(breakpoint);
        }
    }

    /// Edit the watch expressions of `breakpoint`, notifying the observer if they changed.
    pub fn set_watch_expressions(&self, breakpoint: &Arc<dyn ManagedBreakpoint>, expressions: Vec<String>) {
        let mut changed = false;
        breakpoint.update_properties(&mut |p| {
            if p.watch_expressions != expressions {
                p.watch_expressions = expressions.clone();
                changed = true;
            }
        });
        if changed {
            self.notify_changed(breakpoint);
        }
    }

    fn notify_changed(&self, breakpoint: &Arc<dyn ManagedBreakpoint>) {
        if let Some(observer) = self.observer() {
            observer.breakpoint_changed(breakpoint);
        }
    }

    fn find(&self, id: LocalBreakpointId) -> Option<Arc<InMemoryBreakpoint>> {
        self.breakpoints.read().iter().find(|bp| bp.id == id).cloned()
    }
}

impl BreakpointModel for InMemoryBreakpointModel {
    fn find_breakpoint_at_line(&self, file: &Path, line: u32) -> Option<Arc<dyn ManagedBreakpoint>> {
        self.breakpoints
            .read()
            .iter()
            .find(|bp| bp.file == file && bp.line == line)
            .map(|bp| bp.clone() as Arc<dyn ManagedBreakpoint>)
    }

    fn add_line_breakpoint(
        &self,
        file: &Path,
        line: u32,
        condition: Option<String>,
        properties: LineBreakpointProperties,
    ) -> Arc<dyn ManagedBreakpoint> {
        let breakpoint = Arc::new(InMemoryBreakpoint {
            id: LocalBreakpointId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            file: file.to_path_buf(),
            line,
            state: Mutex::new(BreakpointState {
                enabled: true,
                condition: condition.filter(|c| !c.is_empty()),
                properties,
                verified: false,
                error_message: None,
            }),
        });
        self.breakpoints.write().push(breakpoint.clone());

        let handle: Arc<dyn ManagedBreakpoint> = breakpoint;
        if let Some(observer) = self.observer() {
            observer.breakpoint_added(&handle);
        }
        handle
    }

    fn remove_breakpoint(&self, breakpoint: &Arc<dyn ManagedBreakpoint>) {
        let removed = {
            let mut breakpoints = self.breakpoints.write();
            let before = breakpoints.len();
            breakpoints.retain(|bp| bp.id != breakpoint.id());
            breakpoints.len() != before
        };
        if removed {
            if let Some(observer) = self.observer() {
                observer.breakpoint_removed(breakpoint);
            }
        }
    }

    fn set_enabled(&self, breakpoint: &Arc<dyn ManagedBreakpoint>, enabled: bool) {
        let Some(stored) = self.find(breakpoint.id()) else {
            return;
        };
        let changed = {
            let mut state = stored.state.lock();
            let changed = state.enabled != enabled;
            state.enabled = enabled;
            changed
        };
        if changed {
            if let Some(observer) = self.observer() {
                observer.breakpoint_enabled_changed(breakpoint);
            }
        }
    }
}

//! Host breakpoint model interfaces
//!
//! The editor owns local breakpoints. The engine only sees them through these
//! capabilities, so any host (an IDE, the in-memory model, a test double) can plug in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host-assigned identity of a local breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalBreakpointId(pub u64);

/// A local line position. Lines are zero-based, unlike server lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub file: PathBuf,
    pub line: u32,
}

impl SourcePosition {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Engine-specific properties stored on a local snapshot breakpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBreakpointProperties {
    pub watch_expressions: Vec<String>,
    /// Set while the breakpoint is being materialized from a server record
    pub created_by_server: bool,
    /// The breakpoint was disabled because its server snapshot finalized
    pub disabled_by_server: bool,
    /// A server breakpoint was created for it and not yet removed
    pub added_on_server: bool,
}

/// A local snapshot breakpoint as exposed by the host
pub trait ManagedBreakpoint: Send + Sync {
    fn id(&self) -> LocalBreakpointId;

    fn source_position(&self) -> Option<SourcePosition>;

    fn is_enabled(&self) -> bool;

    fn condition(&self) -> Option<String>;

    fn set_condition(&self, condition: Option<String>);

    fn properties(&self) -> LineBreakpointProperties;

    fn update_properties(&self, update: &mut dyn FnMut(&mut LineBreakpointProperties));

    fn is_verified(&self) -> bool;

    fn set_verified(&self, verified: bool);

    fn error_message(&self) -> Option<String>;

    fn set_error_message(&self, message: Option<String>);
}

/// Mutations of the host's breakpoint set. Call only from the UI executor.
pub trait BreakpointModel: Send + Sync {
    fn find_breakpoint_at_line(&self, file: &Path, line: u32) -> Option<Arc<dyn ManagedBreakpoint>>;

    /// Add an enabled breakpoint. `properties` are in place before observers hear about it.
    fn add_line_breakpoint(
        &self,
        file: &Path,
        line: u32,
        condition: Option<String>,
        properties: LineBreakpointProperties,
    ) -> Arc<dyn ManagedBreakpoint>;

    fn remove_breakpoint(&self, breakpoint: &Arc<dyn ManagedBreakpoint>);

    fn set_enabled(&self, breakpoint: &Arc<dyn ManagedBreakpoint>, enabled: bool);
}

/// Change notifications from the host's breakpoint set
pub trait BreakpointObserver: Send + Sync {
    fn breakpoint_added(&self, breakpoint: &Arc<dyn ManagedBreakpoint>);

    fn breakpoint_enabled_changed(&self, breakpoint: &Arc<dyn ManagedBreakpoint>);

    /// The user edited the condition or the watch expressions
    fn breakpoint_changed(&self, breakpoint: &Arc<dyn ManagedBreakpoint>);

    fn breakpoint_removed(&self, breakpoint: &Arc<dyn ManagedBreakpoint>);
}

pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs local model mutations on the host's UI thread, without waiting for them
pub trait UiExecutor: Send + Sync {
    fn invoke_later(&self, job: UiJob);
}

/// Translates between server paths and local files
pub trait FileResolver: Send + Sync {
    fn local_file(&self, server_path: &str) -> Option<PathBuf>;

    fn server_path(&self, file: &Path) -> Option<String>;
}

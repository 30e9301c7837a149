//! Fixtures shared by the criterion benchmarks

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clouddebug_core::{DebuggerConfig, ServerBreakpoint, Timestamp};
use clouddebug_sync::{
    ClientCache, CloudBreakpointHandler, DebuggerTransport, FileResolver, InMemoryBreakpointModel,
    InlineExecutor, ProcessState, StateController, TimeoutClass, TransportFactory,
};

/// A realistic list: two thirds pending across 25 files, one third captured,
/// a few without a location.
pub fn server_list(count: usize) -> Vec<ServerBreakpoint> {
    (0..count)
        .map(|i| {
            let path = format!("com/example/service/Handler{}.java", i % 25);
            let mut bp = ServerBreakpoint::at(path, (i % 400) as i32 + 1).with_id(format!("bp-{}", i));
            if i % 3 == 0 {
                bp.is_final_state = true;
                bp.final_time = Some(Timestamp::new(1_700_000_000 + (i as i64 % 97), (i as i32 * 7919) % 1_000_000_000));
            }
            if i % 50 == 49 {
                bp.location = None;
            }
            bp
        })
        .collect()
}

/// Only pending breakpoints with a location
pub fn pending_list(count: usize) -> Vec<ServerBreakpoint> {
    (0..count)
        .map(|i| {
            let path = format!("com/example/service/Handler{}.java", i % 25);
            ServerBreakpoint::at(path, (i % 400) as i32 + 1).with_id(format!("p-{}", i))
        })
        .collect()
}

/// Maps server paths under a fixed root without touching the disk
pub struct FlatResolver {
    root: PathBuf,
}

impl FlatResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileResolver for FlatResolver {
    fn local_file(&self, server_path: &str) -> Option<PathBuf> {
        Some(self.root.join(server_path))
    }

    fn server_path(&self, file: &Path) -> Option<String> {
        file.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

struct NoClients;

impl TransportFactory for NoClients {
    fn create(&self, _user_email: &str, _class: TimeoutClass) -> Option<Arc<dyn DebuggerTransport>> {
        None
    }
}

/// A handler over an empty in-memory model, applying changes inline
pub fn reconcile_handler() -> (CloudBreakpointHandler, Arc<InMemoryBreakpointModel>) {
    let clients = Arc::new(ClientCache::new(Arc::new(NoClients)));
    let state = Arc::new(ProcessState::new("bench@example.com", "bench-debuggee"));
    let controller = StateController::new(state, clients, &DebuggerConfig::default());

    let model = Arc::new(InMemoryBreakpointModel::new());
    let handler = CloudBreakpointHandler::new(
        controller,
        model.clone(),
        Arc::new(FlatResolver::new("/workspace/src")),
        Arc::new(InlineExecutor),
    );
    (handler, model)
}

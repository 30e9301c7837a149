//! Cloud Debugger core library
//!
//! Synchronous building blocks shared by the sync engine and the CLI:
//! - Debugger service wire types (breakpoints, debuggees)
//! - Breakpoint display ordering
//! - Status message rendering
//! - Server/local path translation helpers
//! - Configuration file
//! - Source repository validation

pub mod comparer;
pub mod config;
pub mod message;
pub mod path_utils;
pub mod repository;
pub mod types;

// Re-export commonly used types
pub use comparer::{compare, sort_breakpoints};
pub use config::{default_config_path, ConfigError, DebuggerConfig, SessionConfig, DEFAULT_ROOT_URL};
pub use message::{render_user_error_message, render_user_message};
pub use path_utils::{
    cloud_path, file_name_from_path, java_package_declaration, normalize_path, package_from_path,
    path_to_string,
};
pub use repository::{
    check_sync_stash_state, select_source_revision, RepositoryType, SourceRevision, SyncAction,
    SyncResult,
};
pub use types::{
    BreakpointAction, Debuggee, FormatMessage, ServerBreakpoint, SourceContext, SourceLocation,
    StackFrame, StatusMessage, Timestamp, Variable,
};

//! Cloud Debugger breakpoint synchronization engine
//!
//! Keeps a host's local snapshot breakpoints and the debugger service's
//! breakpoint list in step:
//! - `GlobalPoller` long-polls debuggees that have no live session
//! - `StateController` keeps one live session's list current
//! - `CloudBreakpointHandler` reconciles that list with the host model
//! - `DebugSession` wires the pieces to the host's change notifications

pub mod client;
pub mod controller;
pub mod error;
pub mod executor;
pub mod handler;
pub mod http;
pub mod listener;
pub mod memory;
pub mod model;
pub mod poller;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{
    ClientCache, CredentialProvider, HttpTransportFactory, StaticCredentials, TimeoutClass,
    TransportFactory,
};
pub use controller::{Registration, StateController};
pub use error::{DebuggerError, Result};
pub use executor::{InlineExecutor, QueuedExecutor, SerialExecutor};
pub use handler::{CloudBreakpointHandler, IdentityMap};
pub use http::HttpTransport;
pub use listener::{BreakpointListener, ListenerId, ListenerSet};
pub use memory::{InMemoryBreakpoint, InMemoryBreakpointModel};
pub use model::{
    BreakpointModel, BreakpointObserver, FileResolver, LineBreakpointProperties,
    LocalBreakpointId, ManagedBreakpoint, SourcePosition, UiExecutor, UiJob,
};
pub use poller::GlobalPoller;
pub use registry::{SessionRegistry, SessionSource};
pub use resolver::ProjectFileResolver;
pub use session::DebugSession;
pub use state::{apply_list_response, wait_token_changed, ProcessState, ServerSnapshot};
pub use transport::{DebuggerTransport, ListBreakpointsRequest, ListBreakpointsResponse};

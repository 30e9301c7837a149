//! Debugger service transport
//!
//! The engine only talks to the service through [`DebuggerTransport`], so tests and
//! alternative backends can stand in for the REST client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use clouddebug_core::{BreakpointAction, Debuggee, ServerBreakpoint};

use crate::error::Result;

/// Parameters of a list-breakpoints call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBreakpointsRequest {
    pub include_inactive: bool,
    pub action: BreakpointAction,
    pub strip_results: bool,
    /// Last token seen. The server blocks until its state differs from it.
    pub wait_token: Option<String>,
}

impl ListBreakpointsRequest {
    /// The query used for snapshot polling: inactive included, capture only, results stripped.
    pub fn capture(wait_token: Option<String>) -> Self {
        Self {
            include_inactive: true,
            action: BreakpointAction::Capture,
            strip_results: true,
            wait_token,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBreakpointsResponse {
    #[serde(default)]
    pub breakpoints: Vec<ServerBreakpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wait_token: Option<String>,
}

/// Remote operations against one debugger service
#[async_trait]
pub trait DebuggerTransport: Send + Sync {
    async fn list_breakpoints(
        &self,
        debuggee_id: &str,
        request: &ListBreakpointsRequest,
    ) -> Result<ListBreakpointsResponse>;

    /// Create a breakpoint. `None` when the service answered without one.
    async fn set_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint: &ServerBreakpoint,
    ) -> Result<Option<ServerBreakpoint>>;

    /// Fetch a single breakpoint with its captured data.
    async fn get_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint_id: &str,
    ) -> Result<Option<ServerBreakpoint>>;

    async fn delete_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> Result<()>;

    async fn list_debuggees(&self, project_number: &str) -> Result<Vec<Debuggee>>;
}

//! REST transport for the Cloud Debugger v2 API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use clouddebug_core::{Debuggee, ServerBreakpoint};

use crate::client::CredentialProvider;
use crate::error::{DebuggerError, Result};
use crate::transport::{DebuggerTransport, ListBreakpointsRequest, ListBreakpointsResponse};

#[derive(Debug, Deserialize)]
struct BreakpointEnvelope {
    #[serde(default)]
    breakpoint: Option<ServerBreakpoint>,
}

#[derive(Debug, Deserialize)]
struct DebuggeesEnvelope {
    #[serde(default)]
    debuggees: Vec<Debuggee>,
}

/// HTTP client bound to one user and one timeout
pub struct HttpTransport {
    client: reqwest::Client,
    root_url: String,
    client_version: String,
    user_email: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTransport {
    pub fn new(
        root_url: &str,
        client_version: &str,
        user_agent: &str,
        timeout: Duration,
        user_email: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DebuggerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            root_url: root_url.trim_end_matches('/').to_string(),
            client_version: client_version.to_string(),
            user_email: user_email.to_string(),
            credentials,
        })
    }

    /// `root_url` plus `segments`, each escaped as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.root_url)
            .map_err(|e| DebuggerError::Transport(format!("Invalid root url {}: {}", self.root_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| DebuggerError::Transport(format!("Root url {} cannot have a path", self.root_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn breakpoints_url(&self, debuggee_id: &str, rest: Option<&str>) -> Result<reqwest::Url> {
        let mut segments = vec!["v2", "debugger", "debuggees", debuggee_id, "breakpoints"];
        segments.extend(rest);
        self.endpoint(&segments)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let token = self
            .credentials
            .access_token(&self.user_email)
            .ok_or_else(|| DebuggerError::NotLoggedIn(self.user_email.clone()))?;

        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DebuggerError::from_status(status.as_u16(), body));
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let body = self.send(request).await?;
        if body.trim().is_empty() {
            return Err(DebuggerError::NoResponse);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DebuggerTransport for HttpTransport {
    async fn list_breakpoints(
        &self,
        debuggee_id: &str,
        request: &ListBreakpointsRequest,
    ) -> Result<ListBreakpointsResponse> {
        let mut query = vec![
            ("includeInactive", request.include_inactive.to_string()),
            ("action.value", request.action.as_str().to_string()),
            ("stripResults", request.strip_results.to_string()),
            ("clientVersion", self.client_version.clone()),
        ];
        if let Some(token) = &request.wait_token {
            query.push(("waitToken", token.clone()));
        }

        tracing::debug!(
            "Listing breakpoints for {} (wait token: {:?})",
            debuggee_id,
            request.wait_token
        );
        let url = self.breakpoints_url(debuggee_id, None)?;
        self.send_json(self.client.get(url).query(&query)).await
    }

    async fn set_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint: &ServerBreakpoint,
    ) -> Result<Option<ServerBreakpoint>> {
        let url = self.breakpoints_url(debuggee_id, Some("set"))?;
        let envelope: BreakpointEnvelope = self
            .send_json(
                self.client
                    .post(url)
                    .query(&[("clientVersion", &self.client_version)])
                    .json(breakpoint),
            )
            .await?;
        Ok(envelope.breakpoint)
    }

    async fn get_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint_id: &str,
    ) -> Result<Option<ServerBreakpoint>> {
        let url = self.breakpoints_url(debuggee_id, Some(breakpoint_id))?;
        let envelope: BreakpointEnvelope = self
            .send_json(
                self.client
                    .get(url)
                    .query(&[("clientVersion", &self.client_version)]),
            )
            .await?;
        Ok(envelope.breakpoint)
    }

    async fn delete_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> Result<()> {
        let url = self.breakpoints_url(debuggee_id, Some(breakpoint_id))?;
        self.send(
            self.client
                .delete(url)
                .query(&[("clientVersion", &self.client_version)]),
        )
        .await?;
        Ok(())
    }

    async fn list_debuggees(&self, project_number: &str) -> Result<Vec<Debuggee>> {
        let url = self.endpoint(&["v2", "debugger", "debuggees"])?;
        let envelope: DebuggeesEnvelope = self
            .send_json(self.client.get(url).query(&[
                ("project", project_number),
                ("includeInactive", "false"),
                ("clientVersion", self.client_version.as_str()),
            ]))
            .await?;
        Ok(envelope.debuggees)
    }
}

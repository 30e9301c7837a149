//! Debuggee description as reported by the debugger service
//!
//! Only the parts needed for attaching and for source-context validation are modelled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One deployed application instance/version that can be debugged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debuggee {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniquifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_inactive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_contexts: Vec<SourceContext>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Debuggee {
    /// Human readable name: `module - version` labels when present, else the description, else the id.
    pub fn display_name(&self) -> String {
        let module = self.labels.get("module");
        let version = self.labels.get("version");
        match (module, version) {
            (Some(module), Some(version)) => format!("{} - {}", module, version),
            (Some(module), None) => module.clone(),
            _ => self
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| self.id.clone()),
        }
    }
}

/// Where the deployed code came from. At most one of the fields is normally set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_repo: Option<CloudRepoSourceContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_workspace: Option<CloudWorkspaceSourceContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gerrit: Option<GerritSourceContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSourceContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudRepoSourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWorkspaceSourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GerritSourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gerrit_project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

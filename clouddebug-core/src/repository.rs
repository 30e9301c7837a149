//! Source repository validation
//!
//! Compares local git working trees with the revision the debuggee was deployed
//! from, so a session can warn about stale or modified sources before attaching.
//! Only detection lives here; stashing and checkout are left to the user.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::types::{Debuggee, SourceContext};

/// Kind of source context the debuggee reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepositoryType {
    CloudRepository,
    Gerrit,
    Git,
    Workspace,
    Unknown,
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepositoryType::CloudRepository => "Cloud Source Repository",
            RepositoryType::Gerrit => "Gerrit",
            RepositoryType::Git => "Git",
            RepositoryType::Workspace => "Cloud workspace",
            RepositoryType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Revision the debuggee was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRevision {
    pub revision_id: Option<String>,
    pub repo_type: Option<RepositoryType>,
    /// True when any remote repository context (cloud repo, gerrit, git) exists
    pub has_remote_repository: bool,
}

/// Outcome of comparing local sources with the deployed revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub is_invalid: bool,
    pub needs_stash: bool,
    pub needs_sync: bool,
    /// Revision to check out when `needs_sync` is set
    pub target_sha: Option<String>,
    /// Local repository that contains the deployed revision
    pub repository_root: Option<PathBuf>,
    pub has_remote_repository: bool,
    pub repo_type: Option<RepositoryType>,
}

/// What the user should do before debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncAction {
    /// Debuggee not found; debugging cannot start
    Invalid,
    /// No local repository holds the deployed revision; sources cannot be verified
    Unverifiable,
    /// Local changes exist and HEAD differs from the deployed revision
    StashAndSync,
    /// Local changes exist on the deployed revision
    Stash,
    /// Clean tree on a different revision
    Sync,
    UpToDate,
}

impl SyncResult {
    fn invalid(repo_type: Option<RepositoryType>) -> Self {
        Self {
            is_invalid: true,
            needs_stash: false,
            needs_sync: false,
            target_sha: None,
            repository_root: None,
            has_remote_repository: false,
            repo_type,
        }
    }

    pub fn is_valid_debuggee(&self) -> bool {
        !self.is_invalid
    }

    pub fn action(&self) -> SyncAction {
        if self.is_invalid {
            return SyncAction::Invalid;
        }
        if self.repository_root.is_none() {
            return SyncAction::Unverifiable;
        }
        match (self.needs_stash, self.needs_sync) {
            (true, true) => SyncAction::StashAndSync,
            (true, false) => SyncAction::Stash,
            (false, true) => SyncAction::Sync,
            (false, false) => SyncAction::UpToDate,
        }
    }
}

/// Pick the deployed revision from the debuggee's source contexts.
///
/// Cloud repositories win over gerrit, which wins over plain git. A workspace
/// context only contributes the repository type.
pub fn select_source_revision(contexts: &[SourceContext]) -> SourceRevision {
    let cloud = contexts.iter().find_map(|c| c.cloud_repo.as_ref());
    let gerrit = contexts.iter().find_map(|c| c.gerrit.as_ref());
    let git = contexts.iter().find_map(|c| c.git.as_ref());
    let has_remote_repository = cloud.is_some() || gerrit.is_some() || git.is_some();

    let (revision_id, repo_type) = if let Some(cloud) = cloud {
        (cloud.revision_id.clone(), Some(RepositoryType::CloudRepository))
    } else if let Some(gerrit) = gerrit {
        (gerrit.revision_id.clone(), Some(RepositoryType::Gerrit))
    } else if let Some(git) = git {
        (git.revision_id.clone(), Some(RepositoryType::Git))
    } else if contexts.iter().any(|c| c.cloud_workspace.is_some()) {
        (None, Some(RepositoryType::Workspace))
    } else {
        (None, None)
    };

    SourceRevision {
        revision_id: revision_id.filter(|r| !r.is_empty()),
        repo_type,
        has_remote_repository,
    }
}

/// Compare `repositories` with the revision `debuggee` reports.
///
/// `debuggee` is `None` when the session's debuggee could not be found.
pub fn check_sync_stash_state(debuggee: Option<&Debuggee>, repositories: &[PathBuf]) -> SyncResult {
    let Some(debuggee) = debuggee else {
        return SyncResult::invalid(Some(RepositoryType::Unknown));
    };

    let revision = select_source_revision(&debuggee.source_contexts);
    let mut result = SyncResult {
        is_invalid: false,
        needs_stash: false,
        needs_sync: false,
        target_sha: None,
        repository_root: None,
        has_remote_repository: revision.has_remote_repository,
        repo_type: revision.repo_type,
    };

    let Some(revision_id) = revision.revision_id else {
        return result;
    };

    let target = repositories.iter().find(|repo| match resolves_revision(repo, &revision_id) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Cannot inspect {}: {}", repo.display(), e);
            false
        }
    });

    let Some(target) = target else {
        tracing::info!("Revision {} not found in any local repository", revision_id);
        return result;
    };
    result.repository_root = Some(target.clone());

    match has_local_changes(target) {
        Ok(dirty) => result.needs_stash = dirty,
        Err(e) => tracing::error!("Error detecting local changes in {}: {}", target.display(), e),
    }

    match head_revision(target) {
        Ok(head) if !head.is_empty() && head != revision_id => {
            result.needs_sync = true;
            result.target_sha = Some(revision_id);
        }
        Ok(_) => {}
        Err(e) => tracing::error!("Error reading HEAD of {}: {}", target.display(), e),
    }

    result
}

/// Whether `revision` names a commit in the repository at `repo_dir`
pub fn resolves_revision(repo_dir: &Path, revision: &str) -> Result<bool, String> {
    ensure_repository(repo_dir)?;

    let output = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("{}^{{commit}}", revision)])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| format!("Failed to resolve revision: {}", e))?;

    Ok(output.status.success())
}

/// Staged, unstaged or untracked changes exist
pub fn has_local_changes(repo_dir: &Path) -> Result<bool, String> {
    ensure_repository(repo_dir)?;

    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| format!("Failed to get status: {}", e))?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).to_string());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|line| !line.trim().is_empty()))
}

/// Full sha of HEAD
pub fn head_revision(repo_dir: &Path) -> Result<String, String> {
    ensure_repository(repo_dir)?;

    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| format!("Failed to read HEAD: {}", e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

fn ensure_repository(repo_dir: &Path) -> Result<(), String> {
    if repo_dir.join(".git").exists() {
        Ok(())
    } else {
        Err("Not a git repository".to_string())
    }
}

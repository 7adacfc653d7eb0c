//! Tenant-scoped repository path resolution.
//!
//! Every identifier becomes exactly one path component under the configured
//! storage root, so distinct identifier tuples can never collide and no
//! resolved path can escape the root.

use std::path::{Path, PathBuf};

use crate::error::GitExecutorError;

/// Resolved location of one tenant application's repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPath {
    tenant_id: String,
    app_id: String,
    repo_name: String,
    suffix: Option<String>,
    path: PathBuf,
}

impl RepoPath {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Absolute path: `<root>/<tenant>/<app>/<repo>[/<suffix>]`.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.path.clone()
    }
}

pub(crate) fn resolve(
    root: &Path,
    tenant_id: &str,
    app_id: &str,
    repo_name: &str,
    suffix: Option<&str>,
) -> Result<RepoPath, GitExecutorError> {
    validate_segment("tenant id", tenant_id)?;
    validate_segment("app id", app_id)?;
    validate_segment("repo name", repo_name)?;
    if let Some(s) = suffix {
        validate_segment("suffix", s)?;
    }

    let mut path = root.join(tenant_id).join(app_id).join(repo_name);
    if let Some(s) = suffix {
        path.push(s);
    }

    Ok(RepoPath {
        tenant_id: tenant_id.to_string(),
        app_id: app_id.to_string(),
        repo_name: repo_name.to_string(),
        suffix: suffix.map(|s| s.to_string()),
        path,
    })
}

fn validate_segment(kind: &str, value: &str) -> Result<(), GitExecutorError> {
    if value.is_empty() {
        return Err(GitExecutorError::InvalidLocation(format!("{kind} is empty")));
    }
    if value == "." || value == ".." {
        return Err(GitExecutorError::InvalidLocation(format!(
            "{kind} {value:?} is a path traversal sequence"
        )));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(GitExecutorError::InvalidLocation(format!(
            "{kind} {value:?} contains a path separator"
        )));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(GitExecutorError::InvalidLocation(format!(
            "{kind} contains control characters"
        )));
    }
    Ok(())
}

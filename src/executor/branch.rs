//! Branch create/checkout/list/delete and tracking counts.

use git2::{BranchType, Repository};

use crate::credentials::DeployKey;
use crate::error::GitExecutorError;
use crate::path::RepoPath;
use crate::types::{GitBranch, TrackingStatus};

use super::{checkout_local_branch, open_repo, run_blocking, GitExecutor};

impl GitExecutor {
    /// Create `name` at the current HEAD commit and check it out.
    pub async fn create_and_checkout_branch(
        &self,
        repo: &RepoPath,
        name: &str,
    ) -> Result<String, GitExecutorError> {
        let path = repo.to_path_buf();
        let name = name.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let head = match r.head() {
                Ok(h) => h.peel_to_commit()?,
                Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                    return Err(GitExecutorError::NoPriorCommit)
                }
                Err(e) => return Err(e.into()),
            };
            r.branch(&name, &head, false)?;
            checkout_local_branch(&r, &name)?;
            tracing::debug!(branch = %name, "created and checked out branch");
            Ok(name)
        })
        .await
    }

    /// Check out an existing local branch. Fails with `DirtyWorkingTree`
    /// when uncommitted changes would be overwritten.
    pub async fn checkout_branch(
        &self,
        repo: &RepoPath,
        name: &str,
    ) -> Result<(), GitExecutorError> {
        let path = repo.to_path_buf();
        let name = name.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            r.find_branch(&name, BranchType::Local)
                .map_err(|_| GitExecutorError::BranchNotFound(name.clone()))?;
            checkout_local_branch(&r, &name)
        })
        .await
    }

    /// Create a local branch tracking `origin/<name>` and check it out.
    pub async fn checkout_remote_branch(
        &self,
        repo: &RepoPath,
        name: &str,
    ) -> Result<String, GitExecutorError> {
        let path = repo.to_path_buf();
        let name = name.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let remote_name = format!("origin/{name}");
            let remote_branch = r
                .find_branch(&remote_name, BranchType::Remote)
                .map_err(|_| GitExecutorError::BranchNotFound(remote_name.clone()))?;
            let tip = remote_branch.get().peel_to_commit()?;

            let mut local = match r.find_branch(&name, BranchType::Local) {
                Ok(existing) => existing,
                Err(_) => r.branch(&name, &tip, false)?,
            };
            local.set_upstream(Some(&remote_name))?;
            checkout_local_branch(&r, &name)?;
            tracing::debug!(branch = %name, upstream = %remote_name, "checked out remote branch");
            Ok(name)
        })
        .await
    }

    pub async fn delete_branch(
        &self,
        repo: &RepoPath,
        name: &str,
    ) -> Result<(), GitExecutorError> {
        let path = repo.to_path_buf();
        let name = name.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let mut branch = r
                .find_branch(&name, BranchType::Local)
                .or_else(|_| r.find_branch(&name, BranchType::Remote))
                .map_err(|_| GitExecutorError::BranchNotFound(name.clone()))?;
            branch.delete()?;
            tracing::debug!(branch = %name, "deleted branch");
            Ok(())
        })
        .await
    }

    /// Local and remote-tracking branches known to the repository; the
    /// branch HEAD points at is marked default. No network round trip; see
    /// [`GitExecutor::list_remote_branches`] for the credentialed
    /// advertisement.
    pub async fn list_branches(
        &self,
        repo: &RepoPath,
    ) -> Result<Vec<GitBranch>, GitExecutorError> {
        let path = repo.to_path_buf();
        run_blocking(move || {
            let r = open_repo(&path)?;
            let head_branch = r.head().ok().and_then(|h| h.shorthand().map(str::to_string));
            let mut out = Vec::new();
            for entry in r.branches(Some(BranchType::Local))? {
                let (branch, _) = entry?;
                let name = match branch.name()? {
                    Some(n) => n.to_string(),
                    None => continue,
                };
                let tracking = tracking_counts(&r, &branch).ok();
                out.push(GitBranch {
                    is_default: head_branch.as_deref() == Some(name.as_str()),
                    name,
                    is_remote: false,
                    head: branch.get().target().map(|t| t.to_string()),
                    tracking,
                });
            }
            for entry in r.branches(Some(BranchType::Remote))? {
                let (branch, _) = entry?;
                let name = match branch.name()? {
                    Some(n) if !n.ends_with("/HEAD") => n.to_string(),
                    _ => continue,
                };
                out.push(GitBranch {
                    name,
                    is_remote: true,
                    is_default: false,
                    head: branch.get().target().map(|t| t.to_string()),
                    tracking: None,
                });
            }
            Ok(out)
        })
        .await
    }

    /// Branches advertised by a remote, via a credentialed ref
    /// advertisement (no objects fetched, no local state touched). With
    /// `include_default` the branch the remote's HEAD points at is marked.
    pub async fn list_remote_branches(
        &self,
        remote_url: &str,
        key: DeployKey,
        include_default: bool,
    ) -> Result<Vec<GitBranch>, GitExecutorError> {
        let url = remote_url.to_string();
        run_blocking(move || {
            let mut remote = git2::Remote::create_detached(url.as_str())?;
            let conn = remote.connect_auth(git2::Direction::Fetch, Some(key.callbacks()), None)?;
            let heads = conn.list()?;

            let default_target = if include_default {
                heads
                    .iter()
                    .find(|h| h.name() == "HEAD")
                    .and_then(|h| h.symref_target().map(|s| s.to_string()))
            } else {
                None
            };

            let mut out = Vec::new();
            for head in heads {
                let Some(name) = head.name().strip_prefix("refs/heads/") else {
                    continue;
                };
                out.push(GitBranch {
                    name: name.to_string(),
                    is_remote: true,
                    is_default: default_target.as_deref() == Some(head.name()),
                    head: Some(head.oid().to_string()),
                    tracking: None,
                });
            }
            Ok(out)
        })
        .await
    }

    /// Ahead/behind counts of a local branch against its configured
    /// upstream, from commit-graph reachability. Read-only.
    pub async fn tracking_status(
        &self,
        repo: &RepoPath,
        name: &str,
    ) -> Result<TrackingStatus, GitExecutorError> {
        let path = repo.to_path_buf();
        let name = name.to_string();
        run_blocking(move || {
            let r = open_repo(&path)?;
            let branch = r
                .find_branch(&name, BranchType::Local)
                .map_err(|_| GitExecutorError::BranchNotFound(name.clone()))?;
            tracking_counts(&r, &branch)
        })
        .await
    }
}

fn tracking_counts(
    repo: &Repository,
    branch: &git2::Branch<'_>,
) -> Result<TrackingStatus, GitExecutorError> {
    let name = branch.name().ok().flatten().unwrap_or("?").to_string();
    let upstream = branch
        .upstream()
        .map_err(|_| GitExecutorError::NoUpstream(name.clone()))?;
    let local = branch
        .get()
        .target()
        .ok_or_else(|| GitExecutorError::BranchNotFound(name.clone()))?;
    let remote = upstream
        .get()
        .target()
        .ok_or_else(|| GitExecutorError::BranchNotFound(name))?;
    let (ahead, behind) = repo.graph_ahead_behind(local, remote)?;
    Ok(TrackingStatus { ahead, behind })
}

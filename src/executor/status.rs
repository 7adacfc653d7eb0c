//! Working-tree status and remote connectivity probing.

use git2::{Delta, DiffOptions};

use crate::credentials::DeployKey;
use crate::error::GitExecutorError;
use crate::path::RepoPath;
use crate::types::StatusReport;

use super::{open_repo, run_blocking, GitExecutor};

impl GitExecutor {
    /// Added/modified/removed files of the working tree (plus index)
    /// relative to the last commit on `branch`. Read-only: no checkout
    /// happens even when `branch` is not the current branch.
    pub async fn status(
        &self,
        repo: &RepoPath,
        branch: &str,
    ) -> Result<StatusReport, GitExecutorError> {
        let path = repo.to_path_buf();
        let branch = branch.to_string();
        run_blocking(move || {
            let r = open_repo(&path)?;
            let tree = r
                .find_branch(&branch, git2::BranchType::Local)
                .map_err(|_| GitExecutorError::BranchNotFound(branch.clone()))?
                .get()
                .peel_to_tree()?;

            let mut opts = DiffOptions::new();
            opts.include_untracked(true).recurse_untracked_dirs(true);
            let diff = r.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;

            let mut added = Vec::new();
            let mut modified = Vec::new();
            let mut removed = Vec::new();
            for delta in diff.deltas() {
                let new_path = delta.new_file().path().map(|p| p.to_string_lossy().to_string());
                let old_path = delta.old_file().path().map(|p| p.to_string_lossy().to_string());
                match delta.status() {
                    Delta::Added | Delta::Untracked | Delta::Copied => {
                        added.extend(new_path);
                    }
                    Delta::Deleted => {
                        removed.extend(old_path);
                    }
                    Delta::Renamed => {
                        removed.extend(old_path);
                        added.extend(new_path);
                    }
                    Delta::Modified | Delta::Typechange => {
                        modified.extend(new_path.or(old_path));
                    }
                    _ => {}
                }
            }
            Ok(StatusReport::new(branch, added, modified, removed))
        })
        .await
    }

    /// Minimal handshake against the remote (ref advertisement, no objects
    /// fetched, no local state created). `Ok(true)` means reachable and
    /// authenticated; `Ok(false)` means unreachable; a rejected deploy key
    /// surfaces as `Authentication` so the platform can tell the two apart.
    pub async fn test_connection(
        &self,
        remote_url: &str,
        key: DeployKey,
    ) -> Result<bool, GitExecutorError> {
        let url = remote_url.to_string();
        run_blocking(move || {
            let mut remote = git2::Remote::create_detached(url.as_str())?;
            let conn = remote.connect_auth(git2::Direction::Fetch, Some(key.callbacks()), None);
            let reachable = match conn {
                Ok(_) => Ok(true),
                Err(e) => match GitExecutorError::from(e) {
                    GitExecutorError::Authentication => Err(GitExecutorError::Authentication),
                    other => {
                        tracing::debug!(%url, reason = %other, "remote unreachable");
                        Ok(false)
                    }
                },
            };
            reachable
        })
        .await
    }
}

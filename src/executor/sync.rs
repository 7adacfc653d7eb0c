//! Remote synchronization: fetch, push, pull.

use std::cell::RefCell;

use git2::{FetchOptions, PushOptions, Repository};

use crate::credentials::DeployKey;
use crate::error::GitExecutorError;
use crate::path::RepoPath;
use crate::types::{FetchSummary, MergeOutcome, PushSummary};

use super::merge::{branch_tip, failed_on_merge_class, merge_into_head};
use super::{open_repo, GitExecutor};

impl GitExecutor {
    /// Retrieve objects and remote-tracking refs without touching the
    /// working tree or the current branch pointer. `all` fetches every
    /// remote branch; otherwise only `branch` (`None` behaves as `all`).
    pub async fn fetch(
        &self,
        repo: &RepoPath,
        remote_url: &str,
        key: DeployKey,
        branch: Option<&str>,
        all: bool,
    ) -> Result<FetchSummary, GitExecutorError> {
        let path = repo.to_path_buf();
        let url = remote_url.to_string();
        let refspec = match branch {
            Some(b) if !all => format!("+refs/heads/{b}:refs/remotes/origin/{b}"),
            _ => "+refs/heads/*:refs/remotes/origin/*".to_string(),
        };
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let summary = do_fetch(&r, &url, &key, &refspec)?;
            tracing::info!(
                objects = summary.received_objects,
                bytes = summary.received_bytes,
                "fetch complete"
            );
            Ok(summary)
        })
        .await
    }

    /// Push a branch to the remote. Fails with `NonFastForward` when the
    /// remote has diverged; force-push is deliberately not exposed here.
    pub async fn push(
        &self,
        repo: &RepoPath,
        remote_url: &str,
        key: DeployKey,
        branch: &str,
    ) -> Result<PushSummary, GitExecutorError> {
        let path = repo.to_path_buf();
        let url = remote_url.to_string();
        let branch = branch.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            r.find_branch(&branch, git2::BranchType::Local)
                .map_err(|_| GitExecutorError::BranchNotFound(branch.clone()))?;

            let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
            let rejection: RefCell<Option<String>> = RefCell::new(None);
            {
                let mut cbs = key.callbacks();
                cbs.push_update_reference(|refname, status| {
                    if let Some(msg) = status {
                        *rejection.borrow_mut() = Some(format!("{refname}: {msg}"));
                    }
                    Ok(())
                });
                let mut po = PushOptions::new();
                po.remote_callbacks(cbs);
                let mut remote = r.remote_anonymous(&url)?;
                remote.push(&[refspec.as_str()], Some(&mut po))?;
            }

            if let Some(msg) = rejection.into_inner() {
                let folded = msg.to_ascii_lowercase().replace('-', "");
                if folded.contains("fastforward") || folded.contains("fetch first") {
                    return Err(GitExecutorError::NonFastForward);
                }
                return Err(GitExecutorError::Transport(msg));
            }
            tracing::info!(%refspec, "push complete");
            Ok(PushSummary { pushed_ref: refspec })
        })
        .await
    }

    /// Fetch `branch` and merge its remote-tracking ref into the current
    /// branch through the shared merge primitive: identical fast-forward
    /// and conflict semantics to [`GitExecutor::merge`].
    pub async fn pull(
        &self,
        repo: &RepoPath,
        remote_url: &str,
        branch: &str,
        key: DeployKey,
    ) -> Result<MergeOutcome, GitExecutorError> {
        let path = repo.to_path_buf();
        let url = remote_url.to_string();
        let branch = branch.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
            do_fetch(&r, &url, &key, &refspec)?;
            drop(key); // credentials are not needed for the local merge

            let tracking = format!("origin/{branch}");
            let src = branch_tip(&r, &tracking)?.id();
            let src = r.find_commit(src)?;
            failed_on_merge_class(merge_into_head(&r, &tracking, &src))
        })
        .await
    }
}

fn do_fetch(
    repo: &Repository,
    url: &str,
    key: &DeployKey,
    refspec: &str,
) -> Result<FetchSummary, GitExecutorError> {
    let mut remote = repo.remote_anonymous(url)?;
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(key.callbacks());
    remote.fetch(&[refspec], Some(&mut fo), None)?;
    let stats = remote.stats();
    Ok(FetchSummary {
        received_objects: stats.received_objects(),
        received_bytes: stats.received_bytes(),
    })
}

//! Destructive resets. Both operations are irreversible at this layer;
//! callers must have captured anything they want to keep.

use crate::cli::GitCli;
use crate::error::GitExecutorError;
use crate::path::RepoPath;

use super::{open_repo, GitExecutor};

impl GitExecutor {
    /// Discard all working-tree and index changes, restoring exactly the
    /// tree of `branch`'s current HEAD (untracked files included). Any
    /// paused merge or rebase is aborted first.
    pub async fn reset_to_last_commit(
        &self,
        repo: &RepoPath,
        branch: &str,
    ) -> Result<bool, GitExecutorError> {
        let path = repo.to_path_buf();
        let branch = branch.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let cli = GitCli::new();
            clear_paused_state(&r, &cli, &path)?;

            // Destructive checkout by design: this is the documented escape
            // hatch from a dirty or conflicted working tree.
            let refname = format!("refs/heads/{branch}");
            let obj = r
                .revparse_single(&refname)
                .map_err(|_| GitExecutorError::BranchNotFound(branch.clone()))?;
            let mut co = git2::build::CheckoutBuilder::new();
            co.force();
            r.checkout_tree(&obj, Some(&mut co))?;
            r.set_head(&refname)?;

            cli.reset_hard(&path, "HEAD")?;
            cli.clean_untracked(&path)?;
            tracing::info!(branch = %branch, "reset to last commit");
            Ok(true)
        })
        .await
    }

    /// [`GitExecutor::reset_to_last_commit`] plus moving the current branch
    /// pointer to `branch`'s tip, discarding local commits as well.
    pub async fn reset_hard(
        &self,
        repo: &RepoPath,
        branch: &str,
    ) -> Result<bool, GitExecutorError> {
        let path = repo.to_path_buf();
        let branch = branch.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let cli = GitCli::new();
            clear_paused_state(&r, &cli, &path)?;

            r.find_branch(&branch, git2::BranchType::Local)
                .map_err(|_| GitExecutorError::BranchNotFound(branch.clone()))?;
            cli.reset_hard(&path, &format!("refs/heads/{branch}"))?;
            cli.clean_untracked(&path)?;
            tracing::info!(branch = %branch, "hard reset");
            Ok(true)
        })
        .await
    }
}

fn clear_paused_state(
    repo: &git2::Repository,
    cli: &GitCli,
    path: &std::path::Path,
) -> Result<(), GitExecutorError> {
    if cli.is_rebase_in_progress(path).unwrap_or(false) {
        cli.abort_rebase(path)?;
    }
    if repo.state() != git2::RepositoryState::Clean {
        repo.cleanup_state()?;
    }
    Ok(())
}

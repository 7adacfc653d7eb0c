//! Repository creation and cloning.

use git2::build::RepoBuilder;
use git2::{FetchOptions, Repository, RepositoryInitOptions};

use crate::credentials::DeployKey;
use crate::error::GitExecutorError;
use crate::path::RepoPath;

use super::GitExecutor;

impl GitExecutor {
    /// Create an empty repository at the location. Idempotent: an already
    /// initialized location is a no-op success (`false`); `true` means the
    /// repository was newly created.
    pub async fn init_repository(&self, repo: &RepoPath) -> Result<bool, GitExecutorError> {
        let path = repo.to_path_buf();
        self.run_exclusive(repo, move || {
            if Repository::open(&path).is_ok() {
                tracing::debug!(path = %path.display(), "repository already initialized");
                return Ok(false);
            }
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head("main").mkdir(true);
            Repository::init_opts(&path, &opts)?;
            tracing::info!(path = %path.display(), "initialized repository");
            Ok(true)
        })
        .await
    }

    /// Clone the remote's full history into a fresh location and report the
    /// default branch it arrived on.
    pub async fn clone_repository(
        &self,
        repo: &RepoPath,
        remote_url: &str,
        key: DeployKey,
    ) -> Result<String, GitExecutorError> {
        let path = repo.to_path_buf();
        let url = remote_url.to_string();
        self.run_exclusive(repo, move || {
            if Repository::open(&path).is_ok() {
                return Err(GitExecutorError::RepositoryExists(path));
            }
            let occupied = path.exists()
                && std::fs::read_dir(&path)
                    .map(|mut d| d.next().is_some())
                    .unwrap_or(false);
            if occupied {
                return Err(GitExecutorError::RepositoryExists(path));
            }

            tracing::info!(path = %path.display(), "cloning repository");
            let mut fo = FetchOptions::new();
            fo.remote_callbacks(key.callbacks());
            let cloned = RepoBuilder::new().fetch_options(fo).clone(&url, &path)?;

            let default_branch = match cloned.head() {
                Ok(head) => head.shorthand().map(|s| s.to_string()),
                Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
                Err(e) => return Err(e.into()),
            };
            drop(cloned);
            let Some(default_branch) = default_branch else {
                // Clone of a refless remote succeeds with an unborn HEAD;
                // remove the husk so a retry starts clean.
                let _ = std::fs::remove_dir_all(&path);
                return Err(GitExecutorError::EmptyRemote);
            };
            tracing::info!(%default_branch, "clone complete");
            Ok(default_branch)
        })
        .await
    }
}

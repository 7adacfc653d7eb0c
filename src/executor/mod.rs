//! The `GitExecutor` facade.
//!
//! Every operation is async; filesystem- and network-touching work runs on
//! the blocking pool via `tokio::task::spawn_blocking`, so slow remotes
//! cannot starve the request-handling runtime. Mutating operations take the
//! per-path exclusive lock first and hold it across the blocking section.

mod branch;
mod commit;
mod lifecycle;
mod merge;
mod reset;
mod status;
mod sync;

use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::Repository;

use crate::error::GitExecutorError;
use crate::lock;
use crate::path::{self, RepoPath};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);

pub struct GitExecutor {
    root: PathBuf,
    lock_wait: Duration,
}

impl GitExecutor {
    /// `root` is the storage directory all tenant repositories live under.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Bound on how long a mutating operation waits for the per-repository
    /// lock before failing with `ConcurrentAccess`.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a tenant identifier tuple to its repository location. Pure and
    /// deterministic; rejects malformed identifiers.
    pub fn resolve(
        &self,
        tenant_id: &str,
        app_id: &str,
        repo_name: &str,
        suffix: Option<&str>,
    ) -> Result<RepoPath, GitExecutorError> {
        path::resolve(&self.root, tenant_id, app_id, repo_name, suffix)
    }

    /// Run a mutating operation: exclusive per-path lock, then the blocking
    /// pool. The guard moves into the blocking closure, so the lock is not
    /// released until the work actually finishes, even when the awaiting
    /// future is cancelled mid-operation.
    pub(crate) async fn run_exclusive<T, F>(
        &self,
        repo: &RepoPath,
        f: F,
    ) -> Result<T, GitExecutorError>
    where
        F: FnOnce() -> Result<T, GitExecutorError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = lock::acquire(repo.as_path(), self.lock_wait).await?;
        run_blocking(move || {
            let _guard = guard;
            f()
        })
        .await
    }
}

/// Dispatch read-only or repository-free work onto the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, GitExecutorError>
where
    F: FnOnce() -> Result<T, GitExecutorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GitExecutorError::Task(e.to_string()))?
}

pub(crate) fn open_repo(path: &Path) -> Result<Repository, GitExecutorError> {
    Repository::open(path).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            GitExecutorError::RepositoryNotFound(path.to_path_buf())
        } else {
            e.into()
        }
    })
}

/// Author/committer signature with an explicit UTC timestamp.
pub(crate) fn utc_signature(
    name: &str,
    email: &str,
) -> Result<git2::Signature<'static>, GitExecutorError> {
    let now = chrono::Utc::now().timestamp();
    Ok(git2::Signature::new(name, email, &git2::Time::new(now, 0))?)
}

/// Repository-configured signature, falling back to the engine identity the
/// way the platform's own commits do.
pub(crate) fn repo_signature(
    repo: &Repository,
) -> Result<git2::Signature<'static>, GitExecutorError> {
    match repo.signature() {
        Ok(sig) => Ok(sig),
        Err(_) => utc_signature("git-executor", "noreply@git-executor.local"),
    }
}

/// The `git` binary refuses to create commits without an identity; give the
/// repository one when the host has none configured.
pub(crate) fn ensure_commit_identity(repo: &Repository) -> Result<(), GitExecutorError> {
    let cfg = repo.config()?;
    if cfg.get_string("user.name").is_err() || cfg.get_string("user.email").is_err() {
        let mut cfg = repo.config()?;
        cfg.set_str("user.name", "git-executor")?;
        cfg.set_str("user.email", "noreply@git-executor.local")?;
    }
    Ok(())
}

/// Safe checkout of a local branch; refuses to clobber uncommitted changes.
pub(crate) fn checkout_local_branch(
    repo: &Repository,
    name: &str,
) -> Result<(), GitExecutorError> {
    let refname = format!("refs/heads/{name}");
    let obj = repo
        .revparse_single(&refname)
        .map_err(|_| GitExecutorError::BranchNotFound(name.to_string()))?;
    let mut co = git2::build::CheckoutBuilder::new();
    co.safe();
    repo.checkout_tree(&obj, Some(&mut co))?;
    repo.set_head(&refname)?;
    Ok(())
}

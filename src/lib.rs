//! Git execution engine for multi-tenant application hosting.
//!
//! One repository per tenant application under a configured storage root,
//! exposed as a uniform set of async primitives: initialize, clone, commit,
//! branch, merge (real and dry-run), push, pull, fetch, reset and
//! connectivity test. The engine orchestrates libgit2 (plus the `git`
//! binary where its on-disk paused state is the contract, e.g. rebase); it
//! contributes the path/identity model, per-repository locking, ephemeral
//! deploy-key handling, and the translation of raw results into stable
//! domain objects.
//!
//! ```no_run
//! use git_executor::{DeployKey, GitExecutor};
//!
//! # async fn demo() -> Result<(), git_executor::GitExecutorError> {
//! let engine = GitExecutor::new("/srv/git-storage");
//! let repo = engine.resolve("org-1", "app-1", "artifact", None)?;
//! engine.init_repository(&repo).await?;
//! let commit = engine
//!     .commit(&repo, "first", "Dev", "dev@example.com", false)
//!     .await?;
//! println!("committed {commit}");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod credentials;
pub mod error;
pub mod lock;
pub mod path;
pub mod types;

mod executor;

pub use credentials::DeployKey;
pub use error::GitExecutorError;
pub use executor::GitExecutor;
pub use path::RepoPath;
pub use types::{
    CommitRecord, FetchSummary, GitBranch, MergeOutcome, PushSummary, StatusReport,
    TrackingStatus,
};

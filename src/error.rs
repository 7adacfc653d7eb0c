//! Error taxonomy for the execution engine.
//!
//! Conflicts are never represented here: a merge/rebase conflict is an
//! expected outcome and is carried inside [`crate::types::MergeOutcome`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::GitCliError;

#[derive(Debug, Error)]
pub enum GitExecutorError {
    /// Malformed tenant/app/repo identifier or path escape attempt.
    #[error("invalid repository location: {0}")]
    InvalidLocation(String),

    #[error("repository already exists at {0}")]
    RepositoryExists(PathBuf),

    #[error("repository not found at {0}")]
    RepositoryNotFound(PathBuf),

    /// The remote rejected the supplied deploy key.
    #[error("authentication failed: remote rejected the deploy key")]
    Authentication,

    /// Network-level failure, distinct from a credential rejection so the
    /// platform can render "remote unreachable" instead of "invalid key".
    #[error("remote unreachable: {0}")]
    Transport(String),

    #[error("remote has no refs")]
    EmptyRemote,

    #[error("push rejected: remote contains commits not present locally")]
    NonFastForward,

    #[error("uncommitted changes would be overwritten by checkout")]
    DirtyWorkingTree,

    #[error("cannot amend: repository has no commits yet")]
    NoPriorCommit,

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("no upstream configured for branch {0}")]
    NoUpstream(String),

    /// The per-repository lock could not be acquired within the bounded wait.
    #[error("repository busy: lock on {0} not acquired within {1:?}")]
    ConcurrentAccess(PathBuf, Duration),

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error(transparent)]
    GitCli(#[from] GitCliError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Residual libgit2 error that maps to no domain condition.
    #[error(transparent)]
    Git(git2::Error),
}

impl From<git2::Error> for GitExecutorError {
    fn from(e: git2::Error) -> Self {
        use git2::{ErrorClass, ErrorCode};
        let message = e.message().to_string();
        match (e.class(), e.code()) {
            (_, ErrorCode::Auth) => Self::Authentication,
            (ErrorClass::Ssh, _) if looks_like_auth(&message) => Self::Authentication,
            (ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh, _) => {
                Self::Transport(message)
            }
            (_, ErrorCode::NotFastForward) => Self::NonFastForward,
            (ErrorClass::Checkout, ErrorCode::Conflict) => Self::DirtyWorkingTree,
            _ => Self::Git(e),
        }
    }
}

/// libssh2 reports both credential rejections and connection failures under
/// `ErrorClass::Ssh`; the message is the only discriminator.
fn looks_like_auth(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("authenticat") || m.contains("credential") || m.contains("permission denied")
}

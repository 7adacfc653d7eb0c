//! Per-repository mutual exclusion.
//!
//! One async mutex per resolved repository path, held for the duration of a
//! mutating operation. Acquisition is bounded: a caller that cannot get the
//! lock within the wait window receives `ConcurrentAccess` instead of
//! queueing indefinitely. Operations on different paths never contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;

use crate::error::GitExecutorError;

static REPO_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// RAII guard; the lock is released on drop, including unwind and cancel.
/// Release also evicts registry entries no guard or waiter references.
#[derive(Debug)]
pub struct RepoLock {
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        self.guard.take();
        // Live guards and pending waiters each hold their own Arc clone, so
        // a strong count of one means only the registry references the entry.
        if let Ok(mut locks) = REPO_LOCKS.lock() {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
    }
}

pub async fn acquire(path: &Path, wait: Duration) -> Result<RepoLock, GitExecutorError> {
    let lock = {
        let mut locks = REPO_LOCKS.lock().unwrap();
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    };

    match tokio::time::timeout(wait, lock.lock_owned()).await {
        Ok(guard) => Ok(RepoLock { guard: Some(guard) }),
        Err(_) => {
            tracing::warn!(path = %path.display(), ?wait, "repository lock contended");
            Err(GitExecutorError::ConcurrentAccess(path.to_path_buf(), wait))
        }
    }
}

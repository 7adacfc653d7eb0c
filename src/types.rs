//! Domain objects surfaced to the hosting platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One commit in the repository history, parents listed first-parent first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    /// Commit time, always UTC.
    pub timestamp: DateTime<Utc>,
    pub parents: Vec<String>,
}

/// Ahead/behind counts of a local branch against its configured upstream,
/// computed from commit-graph reachability rather than timestamps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackingStatus {
    pub ahead: usize,
    pub behind: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitBranch {
    pub name: String,
    pub is_remote: bool,
    /// Set when the branch is the remote's default (HEAD symref target).
    pub is_default: bool,
    /// Head commit id; `None` for advertisement-only listings of symbolic refs.
    pub head: Option<String>,
    /// `None` when no upstream is configured.
    pub tracking: Option<TrackingStatus>,
}

/// Working-tree state relative to the last commit on a branch. A path appears
/// in exactly one of the three sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub branch: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub is_clean: bool,
}

impl StatusReport {
    pub(crate) fn new(
        branch: String,
        mut added: Vec<String>,
        mut modified: Vec<String>,
        mut removed: Vec<String>,
    ) -> Self {
        added.sort();
        added.dedup();
        modified.sort();
        modified.dedup();
        removed.sort();
        removed.dedup();
        let is_clean = added.is_empty() && modified.is_empty() && removed.is_empty();
        Self { branch, added, modified, removed, is_clean }
    }
}

/// Closed result of a merge, pull or rebase. Conflicts are data, not errors:
/// the caller branches on this value to drive its resolution workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Merge succeeded. `merge_commit` is `None` when produced by a dry run
    /// (nothing was committed) and `Some` otherwise; a fast-forward reports
    /// the commit the branch pointer advanced to.
    Clean { merge_commit: Option<String> },
    /// Non-empty list of conflicting paths. A mutating merge/rebase is left
    /// in its paused state; a dry run leaves the repository untouched.
    Conflicted { files: Vec<String> },
    Failed { reason: String },
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, MergeOutcome::Clean { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchSummary {
    pub received_objects: usize,
    pub received_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSummary {
    /// The refspec that was pushed, e.g. `refs/heads/main:refs/heads/main`.
    pub pushed_ref: String,
}

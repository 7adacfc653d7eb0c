//! Staging, committing and history.

use chrono::{DateTime, Utc};
use git2::{IndexAddOption, Sort};

use crate::error::GitExecutorError;
use crate::path::RepoPath;
use crate::types::CommitRecord;

use super::{open_repo, run_blocking, utc_signature, GitExecutor};

impl GitExecutor {
    /// Stage every working-tree change (adds, modifies, deletes) and commit
    /// with the given author identity. With `amend` the previous commit is
    /// rewritten instead of creating a new ancestor. A commit with nothing
    /// staged and `amend = false` returns the current HEAD id unchanged, so
    /// retries never produce empty commits.
    pub async fn commit(
        &self,
        repo: &RepoPath,
        message: &str,
        author_name: &str,
        author_email: &str,
        amend: bool,
    ) -> Result<String, GitExecutorError> {
        let path = repo.to_path_buf();
        let message = message.to_string();
        let name = author_name.to_string();
        let email = author_email.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let mut index = r.index()?;
            index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"], None)?;
            index.write()?;
            let tree_id = index.write_tree()?;
            let tree = r.find_tree(tree_id)?;
            let sig = utc_signature(&name, &email)?;

            let committed = match r.head() {
                Ok(head) => {
                    let parent = head.peel_to_commit()?;
                    if amend {
                        let id = parent.amend(
                            Some("HEAD"),
                            Some(&sig),
                            Some(&sig),
                            None,
                            Some(&message),
                            Some(&tree),
                        )?;
                        tracing::debug!(commit = %id, "amended commit");
                        Ok(id.to_string())
                    } else if parent.tree_id() == tree_id {
                        // Nothing staged; idempotent no-op.
                        Ok(parent.id().to_string())
                    } else {
                        let id = r.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&parent])?;
                        tracing::debug!(commit = %id, "created commit");
                        Ok(id.to_string())
                    }
                }
                Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                    if amend {
                        return Err(GitExecutorError::NoPriorCommit);
                    }
                    let id = r.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[])?;
                    tracing::debug!(commit = %id, "created initial commit");
                    Ok(id.to_string())
                }
                Err(e) => Err(e.into()),
            };
            committed
        })
        .await
    }

    /// Newest-first history from HEAD, at most `limit` entries. Read-only.
    pub async fn commit_history(
        &self,
        repo: &RepoPath,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, GitExecutorError> {
        let path = repo.to_path_buf();
        run_blocking(move || {
            let r = open_repo(&path)?;
            let mut walk = match r.revwalk() {
                Ok(w) => w,
                Err(e) => return Err(e.into()),
            };
            match walk.push_head() {
                Ok(()) => {}
                Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
            walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

            let mut records = Vec::new();
            for oid in walk.take(limit) {
                let commit = r.find_commit(oid?)?;
                let author = commit.author();
                let timestamp: DateTime<Utc> =
                    DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_else(Utc::now);
                records.push(CommitRecord {
                    id: commit.id().to_string(),
                    author_name: author.name().unwrap_or("").to_string(),
                    author_email: author.email().unwrap_or("").to_string(),
                    message: commit.message().unwrap_or("").trim_end().to_string(),
                    timestamp,
                    parents: commit.parent_ids().map(|p| p.to_string()).collect(),
                });
            }
            Ok(records)
        })
        .await
    }
}

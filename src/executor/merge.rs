//! Merge, dry-run merge and rebase.
//!
//! Dry run and real merge share one conflict detector (`probe_merge`, an
//! in-memory three-way merge), so the preview can never disagree with the
//! destructive operation about which files conflict.

use git2::build::CheckoutBuilder;
use git2::{BranchType, MergeOptions, Repository};

use crate::cli::{GitCli, GitCliError};
use crate::error::GitExecutorError;
use crate::path::RepoPath;
use crate::types::MergeOutcome;

use super::{checkout_local_branch, open_repo, repo_signature, GitExecutor};

impl GitExecutor {
    /// Check out `destination` and merge `source` into it. Clean merges
    /// commit (or fast-forward); conflicts leave the standard paused merge
    /// state (`MERGE_HEAD`, conflict markers) for the platform's resolution
    /// flow.
    pub async fn merge(
        &self,
        repo: &RepoPath,
        source: &str,
        destination: &str,
    ) -> Result<MergeOutcome, GitExecutorError> {
        let path = repo.to_path_buf();
        let source = source.to_string();
        let destination = destination.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let src = branch_tip(&r, &source)?.id();
            checkout_local_branch(&r, &destination)?;
            let src = r.find_commit(src)?;
            failed_on_merge_class(merge_into_head(&r, &source, &src))
        })
        .await
    }

    /// Same three-way comparison as [`GitExecutor::merge`], against an
    /// in-memory index only: HEAD, index and working tree are left
    /// byte-identical. Still runs under the exclusive lock so no concurrent
    /// mutation can skew the comparison.
    pub async fn dry_run_merge(
        &self,
        repo: &RepoPath,
        source: &str,
        destination: &str,
    ) -> Result<MergeOutcome, GitExecutorError> {
        let path = repo.to_path_buf();
        let source = source.to_string();
        let destination = destination.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let src = branch_tip(&r, &source)?;
            let dst = branch_tip(&r, &destination)?;
            if dst.id() == src.id() || r.graph_descendant_of(dst.id(), src.id())? {
                return Ok(MergeOutcome::Clean { merge_commit: None });
            }
            failed_on_merge_class(probe_merge(&r, &dst, &src).map(|p| match p {
                Probe::Clean(_) => MergeOutcome::Clean { merge_commit: None },
                Probe::Conflicted(files) => MergeOutcome::Conflicted { files },
            }))
        })
        .await
    }

    /// Replay `branch` onto its configured upstream. Conflicts leave the
    /// rebase paused and resumable; this engine never auto-aborts.
    pub async fn rebase(
        &self,
        repo: &RepoPath,
        branch: &str,
    ) -> Result<MergeOutcome, GitExecutorError> {
        let path = repo.to_path_buf();
        let branch = branch.to_string();
        self.run_exclusive(repo, move || {
            let r = open_repo(&path)?;
            let local = r
                .find_branch(&branch, BranchType::Local)
                .map_err(|_| GitExecutorError::BranchNotFound(branch.clone()))?;
            local
                .upstream()
                .map_err(|_| GitExecutorError::NoUpstream(branch.clone()))?;
            checkout_local_branch(&r, &branch)?;
            super::ensure_commit_identity(&r)?;

            let cli = GitCli::new();
            match cli.rebase_onto_upstream(&path) {
                Ok(()) => {
                    let head = r.head()?.peel_to_commit()?;
                    tracing::debug!(branch = %branch, head = %head.id(), "rebase complete");
                    Ok(MergeOutcome::Clean {
                        merge_commit: Some(head.id().to_string()),
                    })
                }
                Err(GitCliError::CommandFailed(reason)) => {
                    if cli.is_rebase_in_progress(&path).unwrap_or(false) {
                        let files = cli.conflicted_files(&path).unwrap_or_default();
                        tracing::warn!(branch = %branch, ?files, "rebase paused on conflicts");
                        Ok(MergeOutcome::Conflicted { files })
                    } else {
                        Ok(MergeOutcome::Failed { reason })
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

pub(crate) enum Probe {
    Clean(git2::Index),
    Conflicted(Vec<String>),
}

/// In-memory three-way merge against the nearest common ancestor. Never
/// touches HEAD, the on-disk index or the working tree.
pub(crate) fn probe_merge(
    repo: &Repository,
    ours: &git2::Commit<'_>,
    theirs: &git2::Commit<'_>,
) -> Result<Probe, GitExecutorError> {
    let index = repo.merge_commits(ours, theirs, Some(&MergeOptions::new()))?;
    if !index.has_conflicts() {
        return Ok(Probe::Clean(index));
    }
    let mut files = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            files.push(String::from_utf8_lossy(&entry.path).to_string());
        }
    }
    files.sort();
    files.dedup();
    Ok(Probe::Conflicted(files))
}

/// Merge `src` into the currently checked-out branch. Shared by `merge` and
/// `pull` so both have identical fast-forward and conflict semantics.
pub(crate) fn merge_into_head(
    repo: &Repository,
    source_label: &str,
    src: &git2::Commit<'_>,
) -> Result<MergeOutcome, GitExecutorError> {
    let (head_name, dest_label, dest_tip) = {
        let head = repo.head()?;
        let name = head
            .name()
            .map(str::to_string)
            .ok_or_else(|| GitExecutorError::BranchNotFound("HEAD".to_string()))?;
        let label = head.shorthand().unwrap_or("HEAD").to_string();
        (name, label, head.peel_to_commit()?)
    };

    if dest_tip.id() == src.id() || repo.graph_descendant_of(dest_tip.id(), src.id())? {
        return Ok(MergeOutcome::Clean {
            merge_commit: Some(dest_tip.id().to_string()),
        });
    }

    let annotated = repo.find_annotated_commit(src.id())?;
    let (analysis, _) = repo.merge_analysis(&[&annotated])?;
    if analysis.is_fast_forward() {
        let mut reference = repo.find_reference(&head_name)?;
        reference.set_target(src.id(), &format!("fast-forward to {}", src.id()))?;
        let mut co = CheckoutBuilder::new();
        co.force();
        repo.checkout_head(Some(&mut co))?;
        return Ok(MergeOutcome::Clean {
            merge_commit: Some(src.id().to_string()),
        });
    }

    match probe_merge(repo, &dest_tip, src)? {
        Probe::Conflicted(files) => {
            // Materialize the same conflicts in index and working tree,
            // leaving the standard paused merge state.
            let mut mo = MergeOptions::new();
            let mut co = CheckoutBuilder::new();
            co.allow_conflicts(true);
            repo.merge(&[&annotated], Some(&mut mo), Some(&mut co))?;
            tracing::warn!(source = %source_label, dest = %dest_label, ?files, "merge conflicted");
            Ok(MergeOutcome::Conflicted { files })
        }
        Probe::Clean(mut index) => {
            let tree = repo.find_tree(index.write_tree_to(repo)?)?;
            let sig = repo_signature(repo)?;
            let message = format!("Merge branch '{source_label}' into {dest_label}");
            let id = repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&dest_tip, src])?;
            let mut co = CheckoutBuilder::new();
            co.force();
            repo.checkout_head(Some(&mut co))?;
            tracing::debug!(merge_commit = %id, "merge committed");
            Ok(MergeOutcome::Clean {
                merge_commit: Some(id.to_string()),
            })
        }
    }
}

pub(crate) fn branch_tip<'r>(
    repo: &'r Repository,
    name: &str,
) -> Result<git2::Commit<'r>, GitExecutorError> {
    let branch = repo
        .find_branch(name, BranchType::Local)
        .or_else(|_| repo.find_branch(name, BranchType::Remote))
        .map_err(|_| GitExecutorError::BranchNotFound(name.to_string()))?;
    Ok(branch.get().peel_to_commit()?)
}

/// Merge-machinery faults become the `Failed` outcome; everything else in
/// the taxonomy stays an error.
pub(crate) fn failed_on_merge_class(
    res: Result<MergeOutcome, GitExecutorError>,
) -> Result<MergeOutcome, GitExecutorError> {
    match res {
        Err(GitExecutorError::Git(e)) if e.class() == git2::ErrorClass::Merge => {
            Ok(MergeOutcome::Failed {
                reason: e.message().to_string(),
            })
        }
        other => other,
    }
}

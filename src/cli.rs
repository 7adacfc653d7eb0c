//! Subprocess `git` wrapper.
//!
//! libgit2 covers everything except the operations whose on-disk paused
//! state must match stock git exactly: rebase (resumable via
//! `.git/rebase-merge`), hard reset and untracked cleanup. Those go through
//! the real binary. Network operations never go through here - they would
//! need key files on disk, and deploy keys are memory-only.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitCliError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("git command failed: {0}")]
    CommandFailed(String),
}

#[derive(Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    fn git_path() -> Result<std::path::PathBuf, GitCliError> {
        which::which("git").map_err(|_| GitCliError::NotAvailable)
    }

    fn git_impl<I, S>(repo_path: &Path, args: I) -> Result<Vec<u8>, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let git = Self::git_path()?;
        let mut cmd = Command::new(&git);
        cmd.arg("-C").arg(repo_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        for a in args {
            cmd.arg(a);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let out = cmd
            .output()
            .map_err(|e| GitCliError::CommandFailed(e.to_string()))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
            let combined = if stdout.is_empty() && stderr.is_empty() {
                "command failed with no output".to_string()
            } else if stdout.is_empty() {
                stderr
            } else if stderr.is_empty() {
                stdout
            } else {
                format!("stderr: {stderr}\nstdout: {stdout}")
            };
            return Err(GitCliError::CommandFailed(combined));
        }
        Ok(out.stdout)
    }

    pub fn git<I, S>(&self, repo_path: &Path, args: I) -> Result<String, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = Self::git_impl(repo_path, args)?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }

    // --- Rebase ---

    /// Replay the current branch onto its configured upstream. On conflict
    /// git leaves `.git/rebase-merge` behind and the rebase is resumable;
    /// this wrapper does not abort it.
    pub fn rebase_onto_upstream(&self, repo_path: &Path) -> Result<(), GitCliError> {
        self.git(repo_path, ["rebase"]).map(|_| ())
    }

    pub fn is_rebase_in_progress(&self, repo_path: &Path) -> Result<bool, GitCliError> {
        let rebase_merge = self.git(repo_path, ["rev-parse", "--git-path", "rebase-merge"])?;
        let rebase_apply = self.git(repo_path, ["rev-parse", "--git-path", "rebase-apply"])?;
        Ok(repo_path.join(rebase_merge.trim()).exists()
            || repo_path.join(rebase_apply.trim()).exists())
    }

    pub fn abort_rebase(&self, repo_path: &Path) -> Result<(), GitCliError> {
        if !self.is_rebase_in_progress(repo_path)? {
            return Ok(());
        }
        self.git(repo_path, ["rebase", "--abort"]).map(|_| ())
    }

    // --- Reset ---

    /// `git reset --hard <target>`: index and working tree to the target
    /// tree, current branch pointer to the target commit.
    pub fn reset_hard(&self, repo_path: &Path, target: &str) -> Result<(), GitCliError> {
        let mut args: Vec<OsString> = vec!["reset".into(), "--hard".into()];
        args.push(OsString::from(target));
        self.git(repo_path, args).map(|_| ())
    }

    /// Remove untracked files and directories so the tree is exactly the
    /// committed one.
    pub fn clean_untracked(&self, repo_path: &Path) -> Result<(), GitCliError> {
        self.git(repo_path, ["clean", "-fd"]).map(|_| ())
    }

    // --- Conflicts ---

    pub fn conflicted_files(&self, repo_path: &Path) -> Result<Vec<String>, GitCliError> {
        let out = self.git(repo_path, ["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|s| s.trim().to_string())
            .collect())
    }
}

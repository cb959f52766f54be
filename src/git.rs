use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::BranchList;
use crate::error::SddmError;

/// Version-control operations the descriptor store needs.
pub trait GitClient {
    fn local_branches(&self) -> Result<BranchList, SddmError>;
    fn remote_branches(&self, remote: &str) -> Result<BranchList, SddmError>;
    fn current_branch(&self) -> Result<Option<String>, SddmError>;
    fn create_branch(&self, name: &str) -> Result<(), SddmError>;
    fn checkout(&self, branch: &str) -> Result<(), SddmError>;
    fn fetch(&self, remote: &str, branch: &str) -> Result<(), SddmError>;
    fn track_remote_branch(&self, remote: &str, branch: &str) -> Result<(), SddmError>;
    fn stage(&self, path: &str) -> Result<(), SddmError>;
    fn has_staged_changes(&self) -> Result<bool, SddmError>;
    fn commit(&self, message: &str) -> Result<(), SddmError>;
    fn push(&self, remote: &str, branch: &str) -> Result<(), SddmError>;
    fn remote_url(&self, remote: &str) -> Result<Option<String>, SddmError>;
    fn merge_no_commit(&self, branch: &str) -> Result<(), SddmError>;
    fn abort_merge(&self) -> Result<(), SddmError>;
    fn merge_in_progress(&self) -> Result<bool, SddmError>;
    /// Resets index and worktree to `HEAD` everywhere except below `keep`.
    fn restore_except(&self, keep: &str) -> Result<(), SddmError>;
}

/// Runs the `git` binary against one explicit working tree.
#[derive(Debug, Clone)]
pub struct SystemGitClient {
    program: PathBuf,
    repo_root: Utf8PathBuf,
}

impl SystemGitClient {
    pub fn new(repo_root: &Utf8Path) -> Self {
        Self::with_program(PathBuf::from("git"), repo_root)
    }

    pub fn with_program(program: PathBuf, repo_root: &Utf8Path) -> Self {
        Self {
            program,
            repo_root: repo_root.to_path_buf(),
        }
    }

    pub fn repo_root(&self) -> &Utf8Path {
        &self.repo_root
    }

    /// Returns the trimmed git version, or `None` when the program cannot run.
    pub fn version(&self) -> Option<String> {
        tool_version(&self.program, &["--version"])
    }

    fn spawn(&self, args: &[&str]) -> Result<Output, SddmError> {
        tracing::debug!(command = %self.describe(args), "git");
        Command::new(&self.program)
            .arg("-C")
            .arg(self.repo_root.as_std_path())
            .args(args)
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    SddmError::MissingTool(self.program.display().to_string())
                } else {
                    SddmError::Filesystem(err.to_string())
                }
            })
    }

    fn run_cmd(&self, args: &[&str]) -> Result<String, SddmError> {
        let output = self.spawn(args)?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        Err(self.command_error(args, &output))
    }

    /// Runs a command whose exit code 1 is an answer rather than a failure.
    fn run_check(&self, args: &[&str]) -> Result<bool, SddmError> {
        let output = self.spawn(args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.command_error(args, &output)),
        }
    }

    fn command_error(&self, args: &[&str], output: &Output) -> SddmError {
        let command = self.describe(args);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let message = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!("command failed: {command}")
        };
        tracing::warn!(%command, status = %output.status, "git command failed");
        SddmError::GitCommand {
            command,
            status: output.status.to_string(),
            stderr: message,
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(args.iter().map(|arg| arg.to_string()));
        parts.join(" ")
    }
}

impl GitClient for SystemGitClient {
    fn local_branches(&self) -> Result<BranchList, SddmError> {
        let stdout = self.run_cmd(&["branch", "--list", "--format=%(refname:short)"])?;
        Ok(BranchList::parse_local(&stdout))
    }

    fn remote_branches(&self, remote: &str) -> Result<BranchList, SddmError> {
        let stdout = self.run_cmd(&["branch", "--remotes", "--format=%(refname:short)"])?;
        Ok(BranchList::parse_remote(&stdout, remote))
    }

    fn current_branch(&self) -> Result<Option<String>, SddmError> {
        let stdout = self.run_cmd(&["branch", "--show-current"])?;
        let branch = stdout.trim();
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }

    fn create_branch(&self, name: &str) -> Result<(), SddmError> {
        self.run_cmd(&["checkout", "-b", name]).map(|_| ())
    }

    fn checkout(&self, branch: &str) -> Result<(), SddmError> {
        self.run_cmd(&["checkout", branch]).map(|_| ())
    }

    fn fetch(&self, remote: &str, branch: &str) -> Result<(), SddmError> {
        self.run_cmd(&["fetch", remote, branch]).map(|_| ())
    }

    fn track_remote_branch(&self, remote: &str, branch: &str) -> Result<(), SddmError> {
        let upstream = format!("{remote}/{branch}");
        self.run_cmd(&["branch", "--track", branch, &upstream])
            .map(|_| ())
    }

    fn stage(&self, path: &str) -> Result<(), SddmError> {
        self.run_cmd(&["add", "--all", "--", path]).map(|_| ())
    }

    fn has_staged_changes(&self) -> Result<bool, SddmError> {
        // `diff --quiet` exits 1 when there are differences.
        self.run_check(&["diff", "--cached", "--quiet"])
            .map(|clean| !clean)
    }

    fn commit(&self, message: &str) -> Result<(), SddmError> {
        self.run_cmd(&["commit", "-m", message]).map(|_| ())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<(), SddmError> {
        self.run_cmd(&["push", "--set-upstream", remote, branch])
            .map(|_| ())
    }

    fn remote_url(&self, remote: &str) -> Result<Option<String>, SddmError> {
        let output = self.spawn(&["remote", "get-url", remote])?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    fn merge_no_commit(&self, branch: &str) -> Result<(), SddmError> {
        self.run_cmd(&["merge", "--no-commit", "--no-ff", branch])
            .map(|_| ())
    }

    fn abort_merge(&self) -> Result<(), SddmError> {
        self.run_cmd(&["merge", "--abort"]).map(|_| ())
    }

    fn merge_in_progress(&self) -> Result<bool, SddmError> {
        self.run_check(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])
    }

    fn restore_except(&self, keep: &str) -> Result<(), SddmError> {
        let exclude = format!(":(exclude){keep}");
        self.run_cmd(&[
            "restore",
            "--source=HEAD",
            "--staged",
            "--worktree",
            "--",
            ".",
            &exclude,
        ])
        .map(|_| ())
    }
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

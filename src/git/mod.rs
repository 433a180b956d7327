//! Conditional commit/push of the data directory.
//!
//! After a cycle the data directory is staged wholesale; a commit (and
//! push) happens only when the staged tree differs from HEAD, so cycles
//! that change nothing leave the repository history untouched.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from running git subprocesses.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Captured output of one subprocess run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Subprocess execution seam, mockable in tests.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<RunOutput>;
}

/// Real runner over `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<RunOutput> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(RunOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Result of a conditional commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Staged changes existed; exactly one commit was created and pushed.
    Committed { message: String },
    /// Staged tree matched HEAD; repository left untouched.
    NoChanges,
}

/// Stages the data directory and commits as the automation identity.
#[derive(Debug, Clone)]
pub struct DataCommitter<R = ProcessRunner> {
    repo_path: PathBuf,
    author_name: String,
    author_email: String,
    runner: R,
}

impl DataCommitter<ProcessRunner> {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        Self::with_runner(repo_path, author_name, author_email, ProcessRunner)
    }
}

impl<R: CommandRunner> DataCommitter<R> {
    pub fn with_runner(
        repo_path: impl Into<PathBuf>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
        runner: R,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
            runner,
        }
    }

    /// Stage `data_dir` and, if the staged tree differs from HEAD, create
    /// one timestamped commit and push it. A clean tree is a no-op.
    pub fn commit_if_changed(
        &self,
        data_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome, GitError> {
        self.git(&["add", &data_dir.to_string_lossy()])?;

        if !self.has_staged_changes()? {
            info!("📤 [GIT] No data changes to commit");
            return Ok(CommitOutcome::NoChanges);
        }

        let message = format!("Update OHLC data {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
        let name_flag = format!("user.name={}", self.author_name);
        let email_flag = format!("user.email={}", self.author_email);
        self.git(&[
            "-c", &name_flag, "-c", &email_flag, "commit", "-m", &message,
        ])?;
        self.git(&["push"])?;

        info!("📤 [GIT] Committed and pushed: {}", message);
        Ok(CommitOutcome::Committed { message })
    }

    /// Whether the index differs from HEAD.
    ///
    /// `git diff --cached --quiet` exits 0 on a clean index and 1 when
    /// staged changes exist; anything else is a real failure.
    fn has_staged_changes(&self) -> Result<bool, GitError> {
        let output = self.git_raw(&["diff", "--cached", "--quiet"])?;

        match (output.success, output.code) {
            (true, _) => Ok(false),
            (false, Some(1)) => Ok(true),
            (false, code) => Err(GitError::Failed {
                command: "git diff --cached --quiet".to_string(),
                code,
                stderr: output.stderr,
            }),
        }
    }

    /// Run git, treating any non-zero exit as an error.
    fn git(&self, args: &[&str]) -> Result<RunOutput, GitError> {
        let output = self.git_raw(args)?;
        if output.success {
            return Ok(output);
        }

        let stderr = if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        Err(GitError::Failed {
            command: format!("git {}", args.join(" ")),
            code: output.code,
            stderr,
        })
    }

    /// Run git, reporting only spawn failures.
    fn git_raw(&self, args: &[&str]) -> Result<RunOutput, GitError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        debug!("Running git {}", args.join(" "));

        self.runner
            .run("git", &args, &self.repo_path)
            .map_err(|source| GitError::Spawn {
                command: format!("git {}", args.join(" ")),
                source,
            })
    }
}

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git {operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
    #[error("reference `{reference}` not found in repository")]
    RefNotFound { reference: String },
    #[error("git {operation}: authentication failed")]
    AuthFailed { operation: String },
    #[error("mirror for `{repo}` is corrupt and could not be rebuilt")]
    MirrorCorrupt {
        repo: String,
        #[source]
        err: Box<GitError>,
    },
    #[error("git {operation} failed: {stderr}")]
    CommandFailed { operation: String, stderr: String },
    #[error("invalid repository URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        err: url::ParseError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A configured `git` invocation: working directory plus time bound.
#[derive(Debug, Clone)]
pub(crate) struct Git {
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl Git {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { cwd: None, timeout }
    }

    pub(crate) fn current_dir(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    /// Run git, requiring success; stdout is discarded.
    pub(crate) async fn run<I, S>(&self, args: I, operation: &str) -> Result<(), GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.capture(args, operation).await.map(drop)
    }

    /// Run git, requiring success; returns trimmed stdout.
    pub(crate) async fn output<I, S>(&self, args: I, operation: &str) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.capture(args, operation).await
    }

    /// Run git and report only whether it succeeded; used for probes where
    /// failure is an answer, not an error. Timeouts still surface.
    pub(crate) async fn check<I, S>(&self, args: I, operation: &str) -> Result<bool, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        match self.capture(args, operation).await {
            Ok(_) => Ok(true),
            Err(err @ GitError::Timeout { .. }) => Err(err),
            Err(_) => Ok(false),
        }
    }

    async fn capture<I, S>(&self, args: I, operation: &str) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new("git");
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
            .args(args)
            // Fail rather than hang when credentials are missing; a prompt
            // would otherwise sit there until the timeout kills it.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!("running git {operation}");
        let child = command.spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // Dropping the future killed the child via kill_on_drop.
                return Err(GitError::Timeout {
                    operation: operation.to_owned(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(classify_failure(operation, &stderr))
        }
    }
}

/// Map a failed invocation's stderr onto the error taxonomy. Reference
/// resolution failures are classified by the resolver, which knows which
/// reference it was chasing.
fn classify_failure(operation: &str, stderr: &str) -> GitError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("authentication failed")
        || lowered.contains("could not read username")
        || lowered.contains("could not read password")
        || lowered.contains("permission denied (publickey")
    {
        return GitError::AuthFailed {
            operation: operation.to_owned(),
        };
    }
    GitError::CommandFailed {
        operation: operation.to_owned(),
        stderr: truncate(stderr, 512),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_owned()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &s[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classification() {
        assert!(matches!(
            classify_failure("fetch", "fatal: Authentication failed for 'https://x'"),
            GitError::AuthFailed { .. }
        ));
        assert!(matches!(
            classify_failure("fetch", "fatal: could not read Username for 'https://x'"),
            GitError::AuthFailed { .. }
        ));
        assert!(matches!(
            classify_failure("clone", "fatal: repository 'x' does not exist"),
            GitError::CommandFailed { .. }
        ));
    }

    #[test]
    fn truncation_is_bounded() {
        let long = "e".repeat(2000);
        assert!(truncate(&long, 512).len() < 520);
        assert_eq!(truncate("short", 512), "short");
    }
}

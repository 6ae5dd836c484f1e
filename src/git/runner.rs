//! git::runner
//!
//! The `GitRunner` capability: the single doorway through which every Git
//! side effect flows.
//!
//! # Design
//!
//! The interface is method-per-operation rather than a generic "exec"
//! escape hatch, so that the in-memory [`FakeGitRunner`] can enforce
//! per-method semantics. Parsing is not the runner's job: status, branch
//! listing and diff return raw bytes for the pure parsers in
//! [`crate::git::porcelain`], [`crate::git::refs`] and [`crate::git::diff`].
//!
//! Every method takes a [`RunContext`] carrying the request deadline. The
//! production runner terminates the child process when the deadline passes.
//!
//! [`FakeGitRunner`]: crate::git::fake::FakeGitRunner

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

/// Errors from runner operations.
///
/// Display output always carries the trimmed stderr of the failed command
/// so it can be surfaced to callers verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitRunnerError {
    /// The git process could not be started.
    #[error("failed to run git {command}: {message}")]
    Spawn {
        /// Subcommand that was attempted
        command: String,
        /// Underlying I/O error
        message: String,
    },

    /// The git process exited unsuccessfully.
    #[error("git {command} failed ({status}): {stderr}")]
    Failed {
        /// Subcommand that failed
        command: String,
        /// Exit status description
        status: String,
        /// Trimmed stderr output
        stderr: String,
        /// Trimmed stdout output; merge conflicts are reported here
        stdout: String,
    },

    /// The request deadline elapsed before git finished.
    #[error("git {command} timed out after {elapsed_ms}ms")]
    TimedOut {
        /// Subcommand that was terminated
        command: String,
        /// Time spent before termination
        elapsed_ms: u128,
    },

    /// The caller supplied arguments the operation cannot accept.
    #[error("invalid git usage: {0}")]
    Usage(String),
}

impl GitRunnerError {
    /// Output of a failed command (stderr, then stdout), or the full
    /// message otherwise.
    pub fn detail(&self) -> String {
        match self {
            GitRunnerError::Failed { stderr, stdout, .. } => {
                match (stderr.is_empty(), stdout.is_empty()) {
                    (true, true) => self.to_string(),
                    (false, true) => stderr.clone(),
                    (true, false) => stdout.clone(),
                    (false, false) => format!("{stderr}\n{stdout}"),
                }
            }
            other => other.to_string(),
        }
    }

    /// Whether the failure was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GitRunnerError::TimedOut { .. })
    }
}

/// Result alias for runner operations.
pub type RunnerResult<T> = Result<T, GitRunnerError>;

/// Deadline token carried through every runner call.
///
/// # Example
///
/// ```
/// use git_control_tower::git::RunContext;
/// use std::time::Duration;
///
/// # tokio_test_block_on(async {
/// let ctx = RunContext::with_timeout(Duration::from_secs(5));
/// assert!(!ctx.is_expired());
/// assert!(ctx.remaining() <= Duration::from_secs(5));
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    deadline: Instant,
}

impl RunContext {
    /// Context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    /// Context expiring at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self { deadline }
    }

    /// The absolute deadline.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Derive a child context that expires no later than this one.
    pub fn child(&self, timeout: Duration) -> Self {
        Self {
            deadline: self.deadline.min(Instant::now() + timeout),
        }
    }
}

/// Author override for commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    /// Render as git's `--author` value.
    pub fn to_arg(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// Capability interface over a Git working copy.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single runner is shared by
/// every request for the life of the process.
///
/// # Errors
///
/// Every method returns [`GitRunnerError`] on spawn failure, non-zero
/// exit, or deadline expiry. Callers decide whether to recover.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Resolve the repository root.
    ///
    /// Order: explicit override, then `rev-parse --show-toplevel`, then the
    /// empty string. Never fails.
    async fn resolve_repo_root(&self, ctx: &RunContext) -> String;

    /// Raw `status --porcelain=v2 --branch --untracked-files=all -z` output.
    async fn status_porcelain_v2(&self, ctx: &RunContext, repo: &Path) -> RunnerResult<Vec<u8>>;

    /// Raw unified diff (`--no-color`). `staged` selects the index; `None`
    /// path means the whole tree.
    async fn diff(
        &self,
        ctx: &RunContext,
        repo: &Path,
        path: Option<&str>,
        staged: bool,
    ) -> RunnerResult<Vec<u8>>;

    /// Add paths to the index.
    async fn stage(&self, ctx: &RunContext, repo: &Path, paths: &[String]) -> RunnerResult<()>;

    /// Remove paths from the index, keeping working-tree changes.
    async fn unstage(&self, ctx: &RunContext, repo: &Path, paths: &[String]) -> RunnerResult<()>;

    /// Commit the index and return the new short OID.
    ///
    /// If the commit succeeded but resolving the new OID failed, returns an
    /// empty OID rather than an error.
    async fn commit(
        &self,
        ctx: &RunContext,
        repo: &Path,
        message: &str,
        author: Option<&CommitAuthor>,
    ) -> RunnerResult<String>;

    /// Resolve a revision to a full OID.
    async fn rev_parse(&self, ctx: &RunContext, repo: &Path, rev: &str) -> RunnerResult<String>;

    /// Fetch from a remote.
    async fn fetch(&self, ctx: &RunContext, repo: &Path, remote: &str) -> RunnerResult<()>;

    /// URL configured for a remote.
    async fn remote_url(&self, ctx: &RunContext, repo: &Path, remote: &str)
        -> RunnerResult<String>;

    /// Trimmed value of a config key. Fails if the key is missing; an empty
    /// key is a usage error.
    async fn config_get(&self, ctx: &RunContext, repo: &Path, key: &str) -> RunnerResult<String>;

    /// Raw `for-each-ref` output over local and remote branches, in the
    /// format parsed by [`crate::git::refs::parse_branch_refs`].
    async fn list_branches(&self, ctx: &RunContext, repo: &Path) -> RunnerResult<Vec<u8>>;

    /// Create a branch at `from` (HEAD when `None`).
    async fn create_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        name: &str,
        from: Option<&str>,
    ) -> RunnerResult<()>;

    /// Switch the working tree to a local branch.
    async fn checkout_branch(&self, ctx: &RunContext, repo: &Path, name: &str)
        -> RunnerResult<()>;

    /// Create a local branch tracking `remote/branch`.
    async fn track_remote_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        remote: &str,
        branch: &str,
    ) -> RunnerResult<()>;

    /// Push a branch; fails with stderr text when the push is rejected.
    async fn push(
        &self,
        ctx: &RunContext,
        repo: &Path,
        remote: &str,
        branch: &str,
        set_upstream: bool,
    ) -> RunnerResult<()>;

    /// Pull from a remote. An empty/`None` branch lets git resolve it.
    async fn pull(
        &self,
        ctx: &RunContext,
        repo: &Path,
        remote: &str,
        branch: Option<&str>,
    ) -> RunnerResult<()>;

    /// Throw away changes: `clean` untracked paths, or check out tracked ones.
    async fn discard(
        &self,
        ctx: &RunContext,
        repo: &Path,
        paths: &[String],
        untracked: bool,
    ) -> RunnerResult<()>;

    /// Remove a path from the index only (`rm --cached`), ignoring unmatched paths.
    async fn remove_from_index(&self, ctx: &RunContext, repo: &Path, path: &str)
        -> RunnerResult<()>;

    /// Validate a branch name with git's ref-format rules.
    async fn check_ref_format(&self, ctx: &RunContext, repo: &Path, name: &str)
        -> RunnerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_stderr() {
        let err = GitRunnerError::Failed {
            command: "push".into(),
            status: "exit status: 1".into(),
            stderr: "! [rejected] main -> main (fetch first)".into(),
            stdout: String::new(),
        };
        assert_eq!(err.detail(), "! [rejected] main -> main (fetch first)");
        assert!(err.to_string().contains("exit status: 1"));
        assert!(err.to_string().contains("[rejected]"));
    }

    #[test]
    fn detail_includes_stdout_of_failed_merge() {
        let err = GitRunnerError::Failed {
            command: "pull".into(),
            status: "exit status: 1".into(),
            stderr: "From ../origin\n * branch main -> FETCH_HEAD".into(),
            stdout: "CONFLICT (content): Merge conflict in f\nAutomatic merge failed".into(),
        };
        let detail = err.detail();
        assert!(detail.starts_with("From ../origin"));
        assert!(detail.contains("CONFLICT (content): Merge conflict in f"));

        let quiet = GitRunnerError::Failed {
            command: "commit".into(),
            status: "exit status: 1".into(),
            stderr: String::new(),
            stdout: "nothing to commit, working tree clean".into(),
        };
        assert_eq!(quiet.detail(), "nothing to commit, working tree clean");
    }

    #[test]
    fn detail_falls_back_to_display() {
        let err = GitRunnerError::Usage("empty config key".into());
        assert_eq!(err.detail(), "invalid git usage: empty config key");
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn child_context_never_extends_deadline() {
        let parent = RunContext::with_timeout(Duration::from_millis(50));
        let child = parent.child(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.child(Duration::from_millis(1));
        assert!(shorter.deadline() <= parent.deadline());
    }

    #[tokio::test]
    async fn expired_context_has_no_time_left() {
        let ctx = RunContext::with_deadline(Instant::now());
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[test]
    fn author_arg() {
        let author = CommitAuthor {
            name: "Ada".into(),
            email: "ada@example.com".into(),
        };
        assert_eq!(author.to_arg(), "Ada <ada@example.com>");
    }
}

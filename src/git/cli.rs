//! git::cli
//!
//! Production [`GitRunner`] over the `git` binary.
//!
//! Every invocation runs `git -C <repo> <args>` with stdin closed and
//! `GIT_TERMINAL_PROMPT=0`, so a credential prompt can never hang a request.
//! The child is spawned with `kill_on_drop`; when the [`RunContext`]
//! deadline passes the wait future is dropped and the process is killed.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;

use super::runner::{CommitAuthor, GitRunner, GitRunnerError, RunContext, RunnerResult};

/// Ref format used by [`GitRunner::list_branches`].
pub const BRANCH_REF_FORMAT: &str =
    "%(refname)|%(refname:short)|%(upstream:short)|%(objectname)|%(committerdate:iso8601)";

/// Runner that shells out to the git CLI.
#[derive(Debug, Clone)]
pub struct CliGitRunner {
    binary: PathBuf,
    repo_root: Option<PathBuf>,
}

impl CliGitRunner {
    /// Create a runner for `binary` (usually `git`).
    ///
    /// `repo_root` is the explicit override returned by
    /// [`GitRunner::resolve_repo_root`] when set.
    pub fn new(binary: impl Into<PathBuf>, repo_root: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            repo_root,
        }
    }

    /// The configured git executable.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, ctx: &RunContext, repo: Option<&Path>, args: &[&str]) -> RunnerResult<Vec<u8>> {
        let command = args.first().copied().unwrap_or_default().to_string();

        let mut cmd = Command::new(&self.binary);
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| GitRunnerError::Spawn {
            command: command.clone(),
            message: e.to_string(),
        })?;

        let output = match tokio::time::timeout_at(ctx.deadline(), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(GitRunnerError::Spawn {
                    command,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis();
                tracing::warn!(command = %command, elapsed_ms = elapsed_ms as u64, "git command timed out");
                return Err(GitRunnerError::TimedOut {
                    command,
                    elapsed_ms,
                });
            }
        };

        tracing::debug!(
            args = ?args,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "git command finished"
        );

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            tracing::warn!(args = ?args, status = %output.status, stderr = %stderr, "git command failed");
            Err(GitRunnerError::Failed {
                command,
                status: output.status.to_string(),
                stderr,
                stdout,
            })
        }
    }

    async fn run_in(&self, ctx: &RunContext, repo: &Path, args: &[&str]) -> RunnerResult<Vec<u8>> {
        self.run(ctx, Some(repo), args).await
    }

    async fn run_text(&self, ctx: &RunContext, repo: &Path, args: &[&str]) -> RunnerResult<String> {
        let stdout = self.run_in(ctx, repo, args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

/// Build `<prefix> -- <paths>` argument vectors.
fn with_pathspec<'a>(prefix: &[&'a str], paths: &'a [String]) -> Vec<&'a str> {
    let mut args: Vec<&str> = prefix.to_vec();
    args.push("--");
    args.extend(paths.iter().map(String::as_str));
    args
}

#[async_trait]
impl GitRunner for CliGitRunner {
    async fn resolve_repo_root(&self, ctx: &RunContext) -> String {
        if let Some(root) = self.repo_root.as_ref().filter(|r| !r.as_os_str().is_empty()) {
            return root.display().to_string();
        }
        match self.run(ctx, None, &["rev-parse", "--show-toplevel"]).await {
            Ok(stdout) => String::from_utf8_lossy(&stdout).trim().to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "could not resolve repository root");
                String::new()
            }
        }
    }

    async fn status_porcelain_v2(&self, ctx: &RunContext, repo: &Path) -> RunnerResult<Vec<u8>> {
        self.run_in(
            ctx,
            repo,
            &["status", "--porcelain=v2", "--branch", "--untracked-files=all", "-z"],
        )
        .await
    }

    async fn diff(
        &self,
        ctx: &RunContext,
        repo: &Path,
        path: Option<&str>,
        staged: bool,
    ) -> RunnerResult<Vec<u8>> {
        let mut args = vec!["diff", "--no-color"];
        if staged {
            args.push("--cached");
        }
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            args.push("--");
            args.push(path);
        }
        self.run_in(ctx, repo, &args).await
    }

    async fn stage(&self, ctx: &RunContext, repo: &Path, paths: &[String]) -> RunnerResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.run_in(ctx, repo, &with_pathspec(&["add"], paths)).await?;
        Ok(())
    }

    async fn unstage(&self, ctx: &RunContext, repo: &Path, paths: &[String]) -> RunnerResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.run_in(ctx, repo, &with_pathspec(&["restore", "--staged"], paths))
            .await?;
        Ok(())
    }

    async fn commit(
        &self,
        ctx: &RunContext,
        repo: &Path,
        message: &str,
        author: Option<&CommitAuthor>,
    ) -> RunnerResult<String> {
        let author_arg = author.map(CommitAuthor::to_arg);
        let mut args = vec!["commit", "-m", message];
        if let Some(author_arg) = author_arg.as_deref() {
            args.push("--author");
            args.push(author_arg);
        }
        self.run_in(ctx, repo, &args).await?;

        match self.run_text(ctx, repo, &["rev-parse", "--short", "HEAD"]).await {
            Ok(oid) => Ok(oid),
            Err(e) => {
                tracing::warn!(error = %e, "commit succeeded but HEAD could not be resolved");
                Ok(String::new())
            }
        }
    }

    async fn rev_parse(&self, ctx: &RunContext, repo: &Path, rev: &str) -> RunnerResult<String> {
        if rev.is_empty() {
            return Err(GitRunnerError::Usage("empty revision".to_string()));
        }
        self.run_text(ctx, repo, &["rev-parse", "--verify", "--quiet", rev])
            .await
    }

    async fn fetch(&self, ctx: &RunContext, repo: &Path, remote: &str) -> RunnerResult<()> {
        self.run_in(ctx, repo, &["fetch", "--prune", remote]).await?;
        Ok(())
    }

    async fn remote_url(
        &self,
        ctx: &RunContext,
        repo: &Path,
        remote: &str,
    ) -> RunnerResult<String> {
        self.run_text(ctx, repo, &["remote", "get-url", remote]).await
    }

    async fn config_get(&self, ctx: &RunContext, repo: &Path, key: &str) -> RunnerResult<String> {
        if key.trim().is_empty() {
            return Err(GitRunnerError::Usage("empty config key".to_string()));
        }
        self.run_text(ctx, repo, &["config", "--get", key]).await
    }

    async fn list_branches(&self, ctx: &RunContext, repo: &Path) -> RunnerResult<Vec<u8>> {
        let format = format!("--format={BRANCH_REF_FORMAT}");
        self.run_in(
            ctx,
            repo,
            &["for-each-ref", format.as_str(), "refs/heads", "refs/remotes"],
        )
        .await
    }

    async fn create_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        name: &str,
        from: Option<&str>,
    ) -> RunnerResult<()> {
        let mut args = vec!["branch", name];
        if let Some(from) = from.filter(|f| !f.is_empty()) {
            args.push(from);
        }
        self.run_in(ctx, repo, &args).await?;
        Ok(())
    }

    async fn checkout_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        name: &str,
    ) -> RunnerResult<()> {
        self.run_in(ctx, repo, &["checkout", name]).await?;
        Ok(())
    }

    async fn track_remote_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        remote: &str,
        branch: &str,
    ) -> RunnerResult<()> {
        let start = format!("{remote}/{branch}");
        self.run_in(ctx, repo, &["branch", "--track", branch, start.as_str()])
            .await?;
        Ok(())
    }

    async fn push(
        &self,
        ctx: &RunContext,
        repo: &Path,
        remote: &str,
        branch: &str,
        set_upstream: bool,
    ) -> RunnerResult<()> {
        let mut args = vec!["push"];
        if set_upstream {
            args.push("--set-upstream");
        }
        args.push(remote);
        args.push(branch);
        self.run_in(ctx, repo, &args).await?;
        Ok(())
    }

    async fn pull(
        &self,
        ctx: &RunContext,
        repo: &Path,
        remote: &str,
        branch: Option<&str>,
    ) -> RunnerResult<()> {
        let mut args = vec!["pull", "--no-rebase", "--no-edit", remote];
        if let Some(branch) = branch.filter(|b| !b.is_empty()) {
            args.push(branch);
        }
        self.run_in(ctx, repo, &args).await?;
        Ok(())
    }

    async fn discard(
        &self,
        ctx: &RunContext,
        repo: &Path,
        paths: &[String],
        untracked: bool,
    ) -> RunnerResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let prefix: &[&str] = if untracked {
            &["clean", "-f"]
        } else {
            &["checkout"]
        };
        self.run_in(ctx, repo, &with_pathspec(prefix, paths)).await?;
        Ok(())
    }

    async fn remove_from_index(
        &self,
        ctx: &RunContext,
        repo: &Path,
        path: &str,
    ) -> RunnerResult<()> {
        self.run_in(
            ctx,
            repo,
            &["rm", "--cached", "-r", "--ignore-unmatch", "--quiet", "--", path],
        )
        .await?;
        Ok(())
    }

    async fn check_ref_format(
        &self,
        ctx: &RunContext,
        repo: &Path,
        name: &str,
    ) -> RunnerResult<()> {
        self.run_in(ctx, repo, &["check-ref-format", "--branch", name])
            .await?;
        Ok(())
    }
}

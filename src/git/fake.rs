//! git::fake
//!
//! In-memory [`GitRunner`] for deterministic testing.
//!
//! # Design
//!
//! `FakeGitRunner` models just enough of a repository to drive every
//! service: local branches with upstreams and divergence counts, remotes
//! with a server-side ref table plus local remote-tracking refs, and a set
//! of working-tree files with index/worktree flags. Status and branch
//! listings are rendered in the real porcelain-v2 and `for-each-ref`
//! formats, so services exercise the same parsers as in production.
//!
//! Any operation can be made to fail with [`FailOn`], and every call is
//! recorded for verification.
//!
//! # Example
//!
//! ```
//! use git_control_tower::git::fake::{FakeChange, FakeGitRunner, FakeOp};
//! use git_control_tower::git::{GitRunner, RunContext};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let git = FakeGitRunner::new("/repo");
//! git.add_file("src/lib.rs", FakeChange::Staged);
//!
//! let ctx = RunContext::with_timeout(Duration::from_secs(1));
//! let oid = git.commit(&ctx, Path::new("/repo"), "feat: x", None).await.unwrap();
//!
//! assert_eq!(oid.len(), 7);
//! assert!(git.was_called(FakeOp::Commit));
//! # });
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::runner::{CommitAuthor, GitRunner, GitRunnerError, RunContext, RunnerResult};
use crate::core::types::{BranchName, BranchStatus};

/// Committer date stamped on every fake ref.
const FAKE_COMMIT_DATE: &str = "2024-01-15 10:30:00 +0000";

/// Runner operations, for failure injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    Status,
    Diff,
    Stage,
    Unstage,
    Commit,
    RevParse,
    Fetch,
    RemoteUrl,
    ConfigGet,
    ListBranches,
    CreateBranch,
    CheckoutBranch,
    TrackRemoteBranch,
    Push,
    Pull,
    Discard,
    RemoveFromIndex,
    CheckRefFormat,
}

impl FakeOp {
    /// The git subcommand this operation stands for.
    pub fn command(&self) -> &'static str {
        match self {
            FakeOp::Status => "status",
            FakeOp::Diff => "diff",
            FakeOp::Stage => "add",
            FakeOp::Unstage => "restore",
            FakeOp::Commit => "commit",
            FakeOp::RevParse => "rev-parse",
            FakeOp::Fetch => "fetch",
            FakeOp::RemoteUrl => "remote",
            FakeOp::ConfigGet => "config",
            FakeOp::ListBranches => "for-each-ref",
            FakeOp::CreateBranch | FakeOp::TrackRemoteBranch => "branch",
            FakeOp::CheckoutBranch | FakeOp::Discard => "checkout",
            FakeOp::Push => "push",
            FakeOp::Pull => "pull",
            FakeOp::RemoveFromIndex => "rm",
            FakeOp::CheckRefFormat => "check-ref-format",
        }
    }
}

/// Configuration for which operation should fail, and how.
#[derive(Debug, Clone)]
pub struct FailOn {
    pub op: FakeOp,
    pub error: GitRunnerError,
}

impl FailOn {
    /// Fail `op` with a non-zero exit carrying `stderr`.
    pub fn stderr(op: FakeOp, stderr: impl Into<String>) -> Self {
        Self {
            op,
            error: failed(op, stderr),
        }
    }

    /// Fail `op` as if its deadline expired.
    pub fn timeout(op: FakeOp) -> Self {
        Self {
            op,
            error: GitRunnerError::TimedOut {
                command: op.command().to_string(),
                elapsed_ms: 0,
            },
        }
    }
}

/// A recorded runner call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCall {
    pub op: FakeOp,
    pub args: Vec<String>,
}

/// Seed state for a working-tree file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeChange {
    /// Modified in the index only
    Staged,
    /// Modified in the working tree only
    Unstaged,
    /// Modified in both
    PartiallyStaged,
    Untracked,
    Ignored,
    /// Unmerged
    Conflict,
}

/// Current state of a working-tree file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeFile {
    pub staged: bool,
    pub unstaged: bool,
    pub untracked: bool,
    pub ignored: bool,
    pub conflict: bool,
    /// Staged while previously untracked
    pub new_file: bool,
}

impl FakeFile {
    fn from_change(change: FakeChange) -> Self {
        let mut file = FakeFile::default();
        match change {
            FakeChange::Staged => file.staged = true,
            FakeChange::Unstaged => file.unstaged = true,
            FakeChange::PartiallyStaged => {
                file.staged = true;
                file.unstaged = true;
            }
            FakeChange::Untracked => file.untracked = true,
            FakeChange::Ignored => file.ignored = true,
            FakeChange::Conflict => file.conflict = true,
        }
        file
    }

    fn is_clean(&self) -> bool {
        !(self.staged || self.unstaged || self.untracked || self.ignored || self.conflict)
    }

    fn render(&self, path: &str) -> Option<String> {
        if self.conflict {
            return Some(format!(
                "u UU N... 100644 100644 100644 100644 {h} {h} {h} {path}",
                h = "0".repeat(40)
            ));
        }
        if self.untracked {
            return Some(format!("? {path}"));
        }
        if self.ignored {
            return Some(format!("! {path}"));
        }
        if !(self.staged || self.unstaged) {
            return None;
        }
        let x = match (self.staged, self.new_file) {
            (true, true) => 'A',
            (true, false) => 'M',
            _ => '.',
        };
        let y = if self.unstaged { 'M' } else { '.' };
        Some(format!(
            "1 {x}{y} N... 100644 100644 100644 {h} {h} {path}",
            h = "0".repeat(40)
        ))
    }
}

#[derive(Debug, Clone, Default)]
struct LocalBranch {
    oid: String,
    upstream: Option<String>,
    ahead: u32,
    behind: u32,
}

#[derive(Debug, Clone, Default)]
struct RemoteServer {
    url: String,
    branches: BTreeMap<String, String>,
}

#[derive(Debug)]
struct FakeRepo {
    root: String,
    head: Option<String>,
    detached_oid: String,
    branches: BTreeMap<String, LocalBranch>,
    remotes: BTreeMap<String, RemoteServer>,
    tracking: BTreeMap<String, String>,
    files: BTreeMap<String, FakeFile>,
    config: BTreeMap<String, String>,
    next_commit: u64,
    status_output: Option<Vec<u8>>,
    diff_output: BTreeMap<bool, Vec<u8>>,
    ignore_pushes: bool,
    pull_conflicts: Vec<String>,
    fail_on: Vec<FailOn>,
    calls: Vec<FakeCall>,
}

impl FakeRepo {
    fn head_oid(&self) -> String {
        match &self.head {
            Some(name) => self
                .branches
                .get(name)
                .map(|b| b.oid.clone())
                .unwrap_or_default(),
            None => self.detached_oid.clone(),
        }
    }

    fn new_oid(&mut self) -> String {
        let oid = fake_oid(self.next_commit);
        self.next_commit += 1;
        oid
    }

    fn resolve(&self, rev: &str) -> Option<String> {
        let rev = rev.trim();
        if rev == "HEAD" {
            return Some(self.head_oid()).filter(|oid| !oid.is_empty());
        }
        let local = rev.strip_prefix("refs/heads/").unwrap_or(rev);
        if let Some(branch) = self.branches.get(local) {
            return Some(branch.oid.clone());
        }
        let remote = rev.strip_prefix("refs/remotes/").unwrap_or(rev);
        if let Some(oid) = self.tracking.get(remote) {
            return Some(oid.clone());
        }
        let known = self
            .branches
            .values()
            .map(|b| &b.oid)
            .chain(self.tracking.values())
            .chain(std::iter::once(&self.detached_oid));
        for oid in known {
            if !oid.is_empty() && rev.len() >= 4 && oid.starts_with(rev) {
                return Some(oid.clone());
            }
        }
        None
    }

    /// Paths matched by a pathspec: exact, directory prefix, or `.`.
    fn matching(&self, spec: &str, pred: impl Fn(&FakeFile) -> bool) -> Vec<String> {
        let spec = spec.trim_end_matches('/');
        self.files
            .iter()
            .filter(|(path, file)| {
                let hit = spec == "." || spec.is_empty() || *path == spec || {
                    path.starts_with(spec) && path[spec.len()..].starts_with('/')
                };
                hit && pred(file)
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn render_status(&self) -> Vec<u8> {
        let mut records = Vec::new();
        let oid = self.head_oid();
        records.push(format!(
            "# branch.oid {}",
            if oid.is_empty() { "(initial)" } else { oid.as_str() }
        ));
        match &self.head {
            Some(name) => {
                records.push(format!("# branch.head {name}"));
                if let Some(branch) = self.branches.get(name) {
                    if let Some(upstream) = &branch.upstream {
                        records.push(format!("# branch.upstream {upstream}"));
                        records.push(format!("# branch.ab +{} -{}", branch.ahead, branch.behind));
                    }
                }
            }
            None => records.push(format!("# branch.head {}", BranchStatus::DETACHED)),
        }
        records.extend(self.files.iter().filter_map(|(path, file)| file.render(path)));

        let mut out = Vec::new();
        for record in records {
            out.extend_from_slice(record.as_bytes());
            out.push(0);
        }
        out
    }

    fn render_branches(&self) -> Vec<u8> {
        let mut lines = Vec::new();
        for (name, branch) in &self.branches {
            lines.push(format!(
                "refs/heads/{name}|{name}|{}|{}|{FAKE_COMMIT_DATE}",
                branch.upstream.as_deref().unwrap_or_default(),
                branch.oid
            ));
        }
        let mut remotes_with_refs = Vec::new();
        for (short, oid) in &self.tracking {
            if let Some((remote, _)) = short.split_once('/') {
                if !remotes_with_refs.contains(&remote) {
                    remotes_with_refs.push(remote);
                    lines.push(format!(
                        "refs/remotes/{remote}/HEAD|{remote}/HEAD||{oid}|{FAKE_COMMIT_DATE}"
                    ));
                }
            }
            lines.push(format!("refs/remotes/{short}|{short}||{oid}|{FAKE_COMMIT_DATE}"));
        }
        let mut out = lines.join("\n").into_bytes();
        out.push(b'\n');
        out
    }
}

/// Deterministic 40-hex OID for commit number `n`.
fn fake_oid(n: u64) -> String {
    let mixed = n.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    format!("{mixed:016x}{n:024x}")
}

fn failed(op: FakeOp, stderr: impl Into<String>) -> GitRunnerError {
    GitRunnerError::Failed {
        command: op.command().to_string(),
        status: "exit status: 1".to_string(),
        stderr: stderr.into(),
        stdout: String::new(),
    }
}

/// In-memory runner.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct FakeGitRunner {
    inner: Arc<Mutex<FakeRepo>>,
}

impl FakeGitRunner {
    /// Repository at `root` with one commit on `main` and a clean tree.
    pub fn new(root: impl Into<String>) -> Self {
        let mut repo = FakeRepo {
            root: root.into(),
            head: Some("main".to_string()),
            detached_oid: String::new(),
            branches: BTreeMap::new(),
            remotes: BTreeMap::new(),
            tracking: BTreeMap::new(),
            files: BTreeMap::new(),
            config: BTreeMap::new(),
            next_commit: 1,
            status_output: None,
            diff_output: BTreeMap::new(),
            ignore_pushes: false,
            pull_conflicts: Vec::new(),
            fail_on: Vec::new(),
            calls: Vec::new(),
        };
        let oid = repo.new_oid();
        repo.branches.insert(
            "main".to_string(),
            LocalBranch {
                oid,
                ..Default::default()
            },
        );
        Self {
            inner: Arc::new(Mutex::new(repo)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeRepo> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configure the runner to fail on an operation.
    ///
    /// ```
    /// use git_control_tower::git::fake::{FailOn, FakeGitRunner, FakeOp};
    ///
    /// let git = FakeGitRunner::new("/repo")
    ///     .fail_on(FailOn::stderr(FakeOp::Fetch, "fatal: unable to access remote"));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_fail_on(fail_on);
        self
    }

    /// Add a failure without consuming the runner.
    pub fn set_fail_on(&self, fail_on: FailOn) {
        self.lock().fail_on.push(fail_on);
    }

    /// Clear all configured failures.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on.clear();
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls for one operation.
    pub fn calls_to(&self, op: FakeOp) -> Vec<FakeCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    /// Whether an operation was invoked at least once.
    pub fn was_called(&self, op: FakeOp) -> bool {
        self.lock().calls.iter().any(|c| c.op == op)
    }

    /// Clear recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Seed a working-tree file.
    pub fn add_file(&self, path: &str, change: FakeChange) {
        self.lock()
            .files
            .insert(path.to_string(), FakeFile::from_change(change));
    }

    /// Current state of a file, if it has any change.
    pub fn file(&self, path: &str) -> Option<FakeFile> {
        self.lock().files.get(path).cloned()
    }

    /// Register a remote with an empty server-side ref table.
    pub fn add_remote(&self, name: &str, url: &str) {
        self.lock().remotes.insert(
            name.to_string(),
            RemoteServer {
                url: url.to_string(),
                branches: BTreeMap::new(),
            },
        );
    }

    /// Create `branch` on the remote server and in the local tracking refs.
    ///
    /// Returns the new ref's OID. The remote is registered if missing.
    pub fn add_remote_branch(&self, remote: &str, branch: &str) -> String {
        let mut repo = self.lock();
        let oid = repo.new_oid();
        let server = repo.remotes.entry(remote.to_string()).or_default();
        if server.url.is_empty() {
            server.url = format!("https://example.com/{remote}.git");
        }
        server.branches.insert(branch.to_string(), oid.clone());
        repo.tracking.insert(format!("{remote}/{branch}"), oid.clone());
        oid
    }

    /// Create a local branch at HEAD.
    pub fn add_branch(&self, name: &str) {
        let mut repo = self.lock();
        let oid = repo.head_oid();
        repo.branches.insert(
            name.to_string(),
            LocalBranch {
                oid,
                ..Default::default()
            },
        );
    }

    /// Point HEAD at an existing or new local branch without touching files.
    pub fn set_head(&self, name: &str) {
        let mut repo = self.lock();
        if !repo.branches.contains_key(name) {
            let oid = repo.head_oid();
            repo.branches.insert(
                name.to_string(),
                LocalBranch {
                    oid,
                    ..Default::default()
                },
            );
        }
        repo.head = Some(name.to_string());
    }

    /// Detach HEAD at its current commit.
    pub fn detach_head(&self) {
        let mut repo = self.lock();
        repo.detached_oid = repo.head_oid();
        repo.head = None;
    }

    /// Make `upstream` (`remote/branch`) the upstream of a local branch.
    ///
    /// The remote branch is created at the local OID when it does not exist.
    pub fn set_upstream(&self, branch: &str, upstream: &str) {
        let mut repo = self.lock();
        let local_oid = repo
            .branches
            .get(branch)
            .map(|b| b.oid.clone())
            .unwrap_or_default();
        if let Some((remote, remote_branch)) = upstream.split_once('/') {
            let server = repo.remotes.entry(remote.to_string()).or_default();
            if server.url.is_empty() {
                server.url = format!("https://example.com/{remote}.git");
            }
            server
                .branches
                .entry(remote_branch.to_string())
                .or_insert_with(|| local_oid.clone());
            let server_oid = server
                .branches
                .get(remote_branch)
                .cloned()
                .unwrap_or_default();
            repo.tracking
                .entry(upstream.to_string())
                .or_insert(server_oid);
        }
        if let Some(local) = repo.branches.get_mut(branch) {
            local.upstream = Some(upstream.to_string());
        }
    }

    /// Add `commits` local commits to a branch (new OID, ahead += commits).
    pub fn advance(&self, branch: &str, commits: u32) {
        let mut repo = self.lock();
        let oid = repo.new_oid();
        if let Some(local) = repo.branches.get_mut(branch) {
            local.oid = oid;
            local.ahead += commits;
        }
    }

    /// Override the divergence counts reported for a branch.
    pub fn set_divergence(&self, branch: &str, ahead: u32, behind: u32) {
        if let Some(local) = self.lock().branches.get_mut(branch) {
            local.ahead = ahead;
            local.behind = behind;
        }
    }

    /// Set a config value returned by `config_get`.
    pub fn set_config(&self, key: &str, value: &str) {
        self.lock()
            .config
            .insert(key.to_string(), value.to_string());
    }

    /// Replace rendered status output with raw bytes.
    pub fn set_status_output(&self, raw: impl Into<Vec<u8>>) {
        self.lock().status_output = Some(raw.into());
    }

    /// Set the raw diff returned for the index (`staged`) or working tree.
    pub fn set_diff_output(&self, staged: bool, raw: impl Into<Vec<u8>>) {
        self.lock().diff_output.insert(staged, raw.into());
    }

    /// Accept pushes without updating the remote, like a silent server hook.
    pub fn ignore_pushes(&self, ignore: bool) {
        self.lock().ignore_pushes = ignore;
    }

    /// Make the next pull fail with merge conflicts in `paths`.
    pub fn set_pull_conflicts(&self, paths: &[&str]) {
        self.lock().pull_conflicts = paths.iter().map(|p| p.to_string()).collect();
    }

    /// Current branch name, `None` when detached.
    pub fn current_branch(&self) -> Option<String> {
        self.lock().head.clone()
    }

    /// OID that HEAD points at.
    pub fn head_oid(&self) -> String {
        self.lock().head_oid()
    }

    /// Whether a local branch exists.
    pub fn has_branch(&self, name: &str) -> bool {
        self.lock().branches.contains_key(name)
    }

    /// Upstream of a local branch.
    pub fn branch_upstream(&self, name: &str) -> Option<String> {
        self.lock()
            .branches
            .get(name)
            .and_then(|b| b.upstream.clone())
    }

    /// OID of a branch on the remote server (not the tracking ref).
    pub fn remote_branch_oid(&self, remote: &str, branch: &str) -> Option<String> {
        self.lock()
            .remotes
            .get(remote)
            .and_then(|r| r.branches.get(branch).cloned())
    }

    /// Record the call, then return the configured failure for `op`, if any.
    fn enter(&self, op: FakeOp, args: &[&str]) -> MutexGuardResult<'_> {
        let mut repo = self.lock();
        repo.calls.push(FakeCall {
            op,
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        if let Some(fail) = repo.fail_on.iter().find(|f| f.op == op) {
            return Err(fail.error.clone());
        }
        Ok(repo)
    }
}

type MutexGuardResult<'a> = Result<MutexGuard<'a, FakeRepo>, GitRunnerError>;

impl Default for FakeGitRunner {
    fn default() -> Self {
        Self::new("/repo")
    }
}

fn pathspec_error(op: FakeOp, spec: &str) -> GitRunnerError {
    failed(
        op,
        format!("error: pathspec '{spec}' did not match any file(s) known to git"),
    )
}

#[async_trait]
impl GitRunner for FakeGitRunner {
    async fn resolve_repo_root(&self, _ctx: &RunContext) -> String {
        self.lock().root.clone()
    }

    async fn status_porcelain_v2(&self, _ctx: &RunContext, repo: &Path) -> RunnerResult<Vec<u8>> {
        let repo_arg = repo.display().to_string();
        let state = self.enter(FakeOp::Status, &[repo_arg.as_str()])?;
        Ok(state
            .status_output
            .clone()
            .unwrap_or_else(|| state.render_status()))
    }

    async fn diff(
        &self,
        _ctx: &RunContext,
        _repo: &Path,
        path: Option<&str>,
        staged: bool,
    ) -> RunnerResult<Vec<u8>> {
        let staged_arg = if staged { "--cached" } else { "" };
        let state = self.enter(FakeOp::Diff, &[staged_arg, path.unwrap_or_default()])?;
        Ok(state.diff_output.get(&staged).cloned().unwrap_or_default())
    }

    async fn stage(&self, _ctx: &RunContext, _repo: &Path, paths: &[String]) -> RunnerResult<()> {
        let args: Vec<&str> = paths.iter().map(String::as_str).collect();
        let mut state = self.enter(FakeOp::Stage, &args)?;
        for spec in paths {
            let matched = state.matching(spec, |f| f.unstaged || f.untracked || f.conflict || f.staged);
            if matched.is_empty() {
                return Err(failed(
                    FakeOp::Stage,
                    format!("fatal: pathspec '{spec}' did not match any files"),
                ));
            }
            for path in matched {
                if let Some(file) = state.files.get_mut(&path) {
                    if file.untracked {
                        file.new_file = true;
                    }
                    file.staged = true;
                    file.unstaged = false;
                    file.untracked = false;
                    file.conflict = false;
                }
            }
        }
        Ok(())
    }

    async fn unstage(&self, _ctx: &RunContext, _repo: &Path, paths: &[String]) -> RunnerResult<()> {
        let args: Vec<&str> = paths.iter().map(String::as_str).collect();
        let mut state = self.enter(FakeOp::Unstage, &args)?;
        for spec in paths {
            let matched = state.matching(spec, |_| true);
            if matched.is_empty() {
                return Err(pathspec_error(FakeOp::Unstage, spec));
            }
            for path in matched {
                if let Some(file) = state.files.get_mut(&path) {
                    if !file.staged {
                        continue;
                    }
                    file.staged = false;
                    if file.new_file {
                        file.new_file = false;
                        file.untracked = true;
                    } else {
                        file.unstaged = true;
                    }
                }
            }
        }
        Ok(())
    }

    async fn commit(
        &self,
        _ctx: &RunContext,
        _repo: &Path,
        message: &str,
        author: Option<&CommitAuthor>,
    ) -> RunnerResult<String> {
        let author_arg = author.map(CommitAuthor::to_arg).unwrap_or_default();
        let mut state = self.enter(FakeOp::Commit, &[message, author_arg.as_str()])?;
        if !state.files.values().any(|f| f.staged) {
            return Err(failed(
                FakeOp::Commit,
                "nothing to commit, working tree clean",
            ));
        }
        state.files.retain(|_, f| {
            f.staged = false;
            f.new_file = false;
            !f.is_clean()
        });

        let oid = state.new_oid();
        match state.head.clone() {
            Some(name) => {
                if let Some(branch) = state.branches.get_mut(&name) {
                    branch.oid = oid.clone();
                    if branch.upstream.is_some() {
                        branch.ahead += 1;
                    }
                }
            }
            None => state.detached_oid = oid.clone(),
        }
        Ok(oid.chars().take(7).collect())
    }

    async fn rev_parse(&self, _ctx: &RunContext, _repo: &Path, rev: &str) -> RunnerResult<String> {
        let state = self.enter(FakeOp::RevParse, &[rev])?;
        if rev.is_empty() {
            return Err(GitRunnerError::Usage("empty revision".to_string()));
        }
        state.resolve(rev).ok_or_else(|| {
            failed(
                FakeOp::RevParse,
                format!("fatal: ambiguous argument '{rev}': unknown revision or path not in the working tree."),
            )
        })
    }

    async fn fetch(&self, _ctx: &RunContext, _repo: &Path, remote: &str) -> RunnerResult<()> {
        let mut state = self.enter(FakeOp::Fetch, &[remote])?;
        let Some(server) = state.remotes.get(remote).cloned() else {
            return Err(failed(
                FakeOp::Fetch,
                format!("fatal: '{remote}' does not appear to be a git repository"),
            ));
        };
        let prefix = format!("{remote}/");
        state.tracking.retain(|short, _| !short.starts_with(&prefix));
        for (branch, oid) in server.branches {
            state.tracking.insert(format!("{remote}/{branch}"), oid);
        }
        Ok(())
    }

    async fn remote_url(&self, _ctx: &RunContext, _repo: &Path, remote: &str) -> RunnerResult<String> {
        let state = self.enter(FakeOp::RemoteUrl, &[remote])?;
        state
            .remotes
            .get(remote)
            .map(|r| r.url.clone())
            .ok_or_else(|| failed(FakeOp::RemoteUrl, format!("error: No such remote '{remote}'")))
    }

    async fn config_get(&self, _ctx: &RunContext, _repo: &Path, key: &str) -> RunnerResult<String> {
        let state = self.enter(FakeOp::ConfigGet, &[key])?;
        if key.trim().is_empty() {
            return Err(GitRunnerError::Usage("empty config key".to_string()));
        }
        if let Some(value) = state.config.get(key) {
            return Ok(value.trim().to_string());
        }
        let derived = key
            .strip_prefix("branch.")
            .and_then(|rest| rest.rsplit_once('.'))
            .and_then(|(name, field)| {
                let (remote, branch) = state.branches.get(name)?.upstream.as_deref()?.split_once('/')?;
                match field {
                    "remote" => Some(remote.to_string()),
                    "merge" => Some(format!("refs/heads/{branch}")),
                    _ => None,
                }
            });
        derived.ok_or_else(|| failed(FakeOp::ConfigGet, ""))
    }

    async fn list_branches(&self, _ctx: &RunContext, _repo: &Path) -> RunnerResult<Vec<u8>> {
        let state = self.enter(FakeOp::ListBranches, &[])?;
        Ok(state.render_branches())
    }

    async fn create_branch(
        &self,
        _ctx: &RunContext,
        _repo: &Path,
        name: &str,
        from: Option<&str>,
    ) -> RunnerResult<()> {
        let mut state = self.enter(FakeOp::CreateBranch, &[name, from.unwrap_or_default()])?;
        if BranchName::new(name).is_err() {
            return Err(failed(
                FakeOp::CreateBranch,
                format!("fatal: '{name}' is not a valid branch name"),
            ));
        }
        if state.branches.contains_key(name) {
            return Err(failed(
                FakeOp::CreateBranch,
                format!("fatal: a branch named '{name}' already exists"),
            ));
        }
        let start = from.filter(|f| !f.is_empty()).unwrap_or("HEAD");
        let oid = state.resolve(start).ok_or_else(|| {
            failed(
                FakeOp::CreateBranch,
                format!("fatal: not a valid object name: '{start}'"),
            )
        })?;
        state.branches.insert(
            name.to_string(),
            LocalBranch {
                oid,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn checkout_branch(&self, _ctx: &RunContext, _repo: &Path, name: &str) -> RunnerResult<()> {
        let mut state = self.enter(FakeOp::CheckoutBranch, &[name])?;
        if !state.branches.contains_key(name) {
            return Err(pathspec_error(FakeOp::CheckoutBranch, name));
        }
        state.head = Some(name.to_string());
        Ok(())
    }

    async fn track_remote_branch(
        &self,
        _ctx: &RunContext,
        _repo: &Path,
        remote: &str,
        branch: &str,
    ) -> RunnerResult<()> {
        let mut state = self.enter(FakeOp::TrackRemoteBranch, &[remote, branch])?;
        let upstream = format!("{remote}/{branch}");
        let Some(oid) = state.tracking.get(&upstream).cloned() else {
            return Err(failed(
                FakeOp::TrackRemoteBranch,
                format!("fatal: invalid reference: {upstream}"),
            ));
        };
        if state.branches.contains_key(branch) {
            return Err(failed(
                FakeOp::TrackRemoteBranch,
                format!("fatal: a branch named '{branch}' already exists"),
            ));
        }
        state.branches.insert(
            branch.to_string(),
            LocalBranch {
                oid,
                upstream: Some(upstream),
                ahead: 0,
                behind: 0,
            },
        );
        Ok(())
    }

    async fn push(
        &self,
        _ctx: &RunContext,
        _repo: &Path,
        remote: &str,
        branch: &str,
        set_upstream: bool,
    ) -> RunnerResult<()> {
        let upstream_flag = if set_upstream { "--set-upstream" } else { "" };
        let mut state = self.enter(FakeOp::Push, &[remote, branch, upstream_flag])?;
        if !state.remotes.contains_key(remote) {
            return Err(failed(
                FakeOp::Push,
                format!("fatal: '{remote}' does not appear to be a git repository"),
            ));
        }
        let Some(local) = state.branches.get(branch).cloned() else {
            return Err(failed(
                FakeOp::Push,
                format!("error: src refspec {branch} does not match any"),
            ));
        };
        if local.behind > 0 {
            return Err(failed(
                FakeOp::Push,
                format!(
                    " ! [rejected]        {branch} -> {branch} (fetch first)\n\
                     error: failed to push some refs to '{remote}'"
                ),
            ));
        }
        if state.ignore_pushes {
            return Ok(());
        }

        let upstream = format!("{remote}/{branch}");
        if let Some(server) = state.remotes.get_mut(remote) {
            server.branches.insert(branch.to_string(), local.oid.clone());
        }
        state.tracking.insert(upstream.clone(), local.oid);
        if let Some(local) = state.branches.get_mut(branch) {
            local.ahead = 0;
            if set_upstream {
                local.upstream = Some(upstream);
            }
        }
        Ok(())
    }

    async fn pull(
        &self,
        _ctx: &RunContext,
        _repo: &Path,
        remote: &str,
        branch: Option<&str>,
    ) -> RunnerResult<()> {
        let mut state = self.enter(FakeOp::Pull, &[remote, branch.unwrap_or_default()])?;
        if !state.remotes.contains_key(remote) {
            return Err(failed(
                FakeOp::Pull,
                format!("fatal: '{remote}' does not appear to be a git repository"),
            ));
        }
        let conflicts = std::mem::take(&mut state.pull_conflicts);
        if !conflicts.is_empty() {
            let mut stdout = format!("Auto-merging {}\n", conflicts.join("\nAuto-merging "));
            for path in &conflicts {
                stdout.push_str(&format!("CONFLICT (content): Merge conflict in {path}\n"));
                state.files.insert(
                    path.clone(),
                    FakeFile {
                        conflict: true,
                        ..Default::default()
                    },
                );
            }
            stdout.push_str("Automatic merge failed; fix conflicts and then commit the result.");
            return Err(GitRunnerError::Failed {
                command: FakeOp::Pull.command().to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("From {remote}\n * branch            HEAD -> FETCH_HEAD"),
                stdout,
            });
        }

        let Some(head) = state.head.clone() else {
            return Err(failed(
                FakeOp::Pull,
                "You are not currently on a branch.",
            ));
        };
        let target = match branch.filter(|b| !b.is_empty()) {
            Some(branch) => format!("{remote}/{branch}"),
            None => state
                .branches
                .get(&head)
                .and_then(|b| b.upstream.clone())
                .ok_or_else(|| {
                    failed(
                        FakeOp::Pull,
                        "There is no tracking information for the current branch.",
                    )
                })?,
        };
        let remote_oid = state
            .tracking
            .get(&target)
            .cloned()
            .ok_or_else(|| failed(FakeOp::Pull, format!("fatal: couldn't find remote ref {target}")))?;
        let merged = state.new_oid();
        if let Some(local) = state.branches.get_mut(&head) {
            local.oid = if local.ahead == 0 { remote_oid } else { merged };
            local.behind = 0;
        }
        Ok(())
    }

    async fn discard(
        &self,
        _ctx: &RunContext,
        _repo: &Path,
        paths: &[String],
        untracked: bool,
    ) -> RunnerResult<()> {
        let mut args: Vec<&str> = vec![if untracked { "clean" } else { "checkout" }];
        args.extend(paths.iter().map(String::as_str));
        let mut state = self.enter(FakeOp::Discard, &args)?;
        for spec in paths {
            if untracked {
                for path in state.matching(spec, |f| f.untracked) {
                    state.files.remove(&path);
                }
                continue;
            }
            let matched = state.matching(spec, |f| !f.untracked && !f.ignored);
            if matched.is_empty() {
                return Err(pathspec_error(FakeOp::Discard, spec));
            }
            for path in matched {
                let now_clean = state.files.get_mut(&path).is_some_and(|file| {
                    file.unstaged = false;
                    file.conflict = false;
                    file.is_clean()
                });
                if now_clean {
                    state.files.remove(&path);
                }
            }
        }
        Ok(())
    }

    async fn remove_from_index(&self, _ctx: &RunContext, _repo: &Path, path: &str) -> RunnerResult<()> {
        let mut state = self.enter(FakeOp::RemoveFromIndex, &[path])?;
        for matched in state.matching(path, |f| !f.ignored) {
            if let Some(file) = state.files.get_mut(&matched) {
                *file = FakeFile {
                    ignored: true,
                    ..Default::default()
                };
            }
        }
        Ok(())
    }

    async fn check_ref_format(&self, _ctx: &RunContext, _repo: &Path, name: &str) -> RunnerResult<()> {
        let _state = self.enter(FakeOp::CheckRefFormat, &[name])?;
        BranchName::new(name)
            .map(|_| ())
            .map_err(|_| failed(FakeOp::CheckRefFormat, format!("fatal: '{name}' is not a valid branch name")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::porcelain::parse_porcelain_v2;
    use crate::git::refs::parse_branch_refs;
    use std::time::Duration;

    fn ctx() -> RunContext {
        RunContext::with_timeout(Duration::from_secs(5))
    }

    fn repo() -> &'static Path {
        Path::new("/repo")
    }

    async fn status(git: &FakeGitRunner) -> crate::core::types::RepoStatus {
        let raw = git.status_porcelain_v2(&ctx(), repo()).await.unwrap();
        let mut status = parse_porcelain_v2(&raw);
        status.normalize();
        status
    }

    #[tokio::test]
    async fn rendered_status_parses_back() {
        let git = FakeGitRunner::new("/repo");
        git.set_upstream("main", "origin/main");
        git.set_divergence("main", 2, 1);
        git.add_file("a.txt", FakeChange::Staged);
        git.add_file("b.txt", FakeChange::PartiallyStaged);
        git.add_file("c.txt", FakeChange::Untracked);
        git.add_file("d.log", FakeChange::Ignored);
        git.add_file("e.txt", FakeChange::Conflict);

        let status = status(&git).await;
        assert_eq!(status.branch.head, "main");
        assert_eq!(status.branch.upstream.as_deref(), Some("origin/main"));
        assert_eq!((status.branch.ahead, status.branch.behind), (2, 1));
        assert_eq!(status.files.staged, vec!["a.txt", "b.txt"]);
        assert_eq!(status.files.unstaged, vec!["b.txt", "e.txt"]);
        assert_eq!(status.files.untracked, vec!["c.txt"]);
        assert_eq!(status.files.ignored, vec!["d.log"]);
        assert_eq!(status.files.conflicts, vec!["e.txt"]);
    }

    #[tokio::test]
    async fn stage_then_unstage_new_file() {
        let git = FakeGitRunner::new("/repo");
        git.add_file("new.txt", FakeChange::Untracked);

        git.stage(&ctx(), repo(), &["new.txt".into()]).await.unwrap();
        assert_eq!(status(&git).await.files.staged, vec!["new.txt"]);

        git.unstage(&ctx(), repo(), &["new.txt".into()]).await.unwrap();
        let status = status(&git).await;
        assert!(status.files.staged.is_empty());
        assert_eq!(status.files.untracked, vec!["new.txt"]);
    }

    #[tokio::test]
    async fn stage_directory_prefix() {
        let git = FakeGitRunner::new("/repo");
        git.add_file("scenarios/tower/a.go", FakeChange::Unstaged);
        git.add_file("scenarios/tower/b.go", FakeChange::Untracked);
        git.add_file("scenarios/towering/c.go", FakeChange::Unstaged);

        git.stage(&ctx(), repo(), &["scenarios/tower/".into()])
            .await
            .unwrap();
        let status = status(&git).await;
        assert_eq!(status.files.staged, vec!["scenarios/tower/a.go", "scenarios/tower/b.go"]);
        assert_eq!(status.files.unstaged, vec!["scenarios/towering/c.go"]);
    }

    #[tokio::test]
    async fn unknown_pathspec_fails() {
        let git = FakeGitRunner::new("/repo");
        let err = git
            .stage(&ctx(), repo(), &["missing.txt".into()])
            .await
            .unwrap_err();
        assert!(err.detail().contains("did not match"));
    }

    #[tokio::test]
    async fn commit_requires_staged_changes() {
        let git = FakeGitRunner::new("/repo");
        let err = git.commit(&ctx(), repo(), "feat: x", None).await.unwrap_err();
        assert!(err.detail().contains("nothing to commit"));

        git.add_file("x.rs", FakeChange::PartiallyStaged);
        let before = git.head_oid();
        let short = git.commit(&ctx(), repo(), "feat: x", None).await.unwrap();
        assert!(git.head_oid().starts_with(&short));
        assert_ne!(git.head_oid(), before);
        assert_eq!(git.file("x.rs").map(|f| (f.staged, f.unstaged)), Some((false, true)));
    }

    #[tokio::test]
    async fn push_updates_remote_unless_ignored() {
        let git = FakeGitRunner::new("/repo");
        git.add_remote("origin", "git@example.com:repo.git");
        git.push(&ctx(), repo(), "origin", "main", true).await.unwrap();
        assert_eq!(git.remote_branch_oid("origin", "main"), Some(git.head_oid()));
        assert_eq!(git.branch_upstream("main").as_deref(), Some("origin/main"));

        git.advance("main", 1);
        git.ignore_pushes(true);
        git.push(&ctx(), repo(), "origin", "main", false).await.unwrap();
        assert_ne!(git.remote_branch_oid("origin", "main"), Some(git.head_oid()));
    }

    #[tokio::test]
    async fn push_rejected_when_behind() {
        let git = FakeGitRunner::new("/repo");
        git.set_upstream("main", "origin/main");
        git.set_divergence("main", 1, 2);
        let err = git.push(&ctx(), repo(), "origin", "main", false).await.unwrap_err();
        assert!(err.detail().contains("[rejected]"));
    }

    #[tokio::test]
    async fn fetch_copies_server_refs() {
        let git = FakeGitRunner::new("/repo");
        let oid = git.add_remote_branch("origin", "feature/remote");
        git.fetch(&ctx(), repo(), "origin").await.unwrap();
        assert_eq!(
            git.rev_parse(&ctx(), repo(), "origin/feature/remote").await.unwrap(),
            oid
        );
        assert!(git.fetch(&ctx(), repo(), "nowhere").await.is_err());
    }

    #[tokio::test]
    async fn branch_listing_includes_remote_head() {
        let git = FakeGitRunner::new("/repo");
        git.add_remote_branch("origin", "main");
        let raw = git.list_branches(&ctx(), repo()).await.unwrap();
        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("refs/remotes/origin/HEAD"));

        let refs = parse_branch_refs(&raw);
        let names: Vec<_> = refs.iter().map(|r| r.short_name.as_str()).collect();
        assert_eq!(names, vec!["main", "origin/main"]);
    }

    #[tokio::test]
    async fn config_derives_branch_remote() {
        let git = FakeGitRunner::new("/repo");
        git.set_upstream("main", "upstream/trunk");
        let remote = git
            .config_get(&ctx(), repo(), "branch.main.remote")
            .await
            .unwrap();
        assert_eq!(remote, "upstream");
        assert!(git.config_get(&ctx(), repo(), "user.name").await.is_err());
        assert!(matches!(
            git.config_get(&ctx(), repo(), "").await,
            Err(GitRunnerError::Usage(_))
        ));
    }

    #[tokio::test]
    async fn failure_injection_and_recording() {
        let git = FakeGitRunner::new("/repo").fail_on(FailOn::timeout(FakeOp::Status));
        let err = git.status_porcelain_v2(&ctx(), repo()).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(git.calls_to(FakeOp::Status).len(), 1);

        git.clear_fail_on();
        assert!(git.status_porcelain_v2(&ctx(), repo()).await.is_ok());
        assert_eq!(git.calls().len(), 2);
    }

    #[tokio::test]
    async fn pull_conflicts_mark_files() {
        let git = FakeGitRunner::new("/repo");
        git.set_upstream("main", "origin/main");
        git.set_pull_conflicts(&["src/app.rs"]);
        let err = git.pull(&ctx(), repo(), "origin", None).await.unwrap_err();
        match &err {
            GitRunnerError::Failed { stderr, stdout, .. } => {
                assert!(!stderr.contains("CONFLICT"));
                assert!(stdout.contains("CONFLICT (content): Merge conflict in src/app.rs"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.detail().contains("CONFLICT"));
        assert_eq!(status(&git).await.files.conflicts, vec!["src/app.rs"]);
    }

    #[tokio::test]
    async fn track_and_checkout_remote_branch() {
        let git = FakeGitRunner::new("/repo");
        git.add_remote_branch("origin", "feature/remote");
        git.track_remote_branch(&ctx(), repo(), "origin", "feature/remote")
            .await
            .unwrap();
        git.checkout_branch(&ctx(), repo(), "feature/remote")
            .await
            .unwrap();
        assert_eq!(git.current_branch().as_deref(), Some("feature/remote"));
        assert_eq!(
            git.branch_upstream("feature/remote").as_deref(),
            Some("origin/feature/remote")
        );
    }

    #[test]
    fn oids_are_distinct_in_short_form() {
        let a = fake_oid(1);
        let b = fake_oid(2);
        assert_eq!(a.len(), 40);
        assert_ne!(a[..7], b[..7]);
    }
}

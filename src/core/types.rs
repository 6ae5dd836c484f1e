//! core::types
//!
//! Domain types for repository snapshots.
//!
//! # Types
//!
//! - [`RepoStatus`] - Point-in-time snapshot of a working tree
//! - [`BranchStatus`] - HEAD, upstream and divergence counts
//! - [`FileSets`] - Paths bucketed by change kind
//! - [`StatusSummary`] - Counts mirroring [`FileSets`]
//! - [`ScopeKey`] - Logical grouping derived from a path
//! - [`BranchName`] - Validated Git branch name
//!
//! # Invariants
//!
//! A normalized [`RepoStatus`] keeps every file list sorted and
//! duplicate-free, and every conflicted path also appears in `unstaged`.
//! Snapshots are derived on demand and never cached across requests.
//!
//! # Example
//!
//! ```
//! use git_control_tower::core::types::{RepoStatus, ScopeKey};
//!
//! let mut status = RepoStatus::default();
//! status.files.unstaged = vec!["scenarios/tower/api/main.go".into(), "README.md".into()];
//! status.normalize();
//!
//! assert_eq!(status.summary.unstaged, 2);
//! assert_eq!(ScopeKey::for_path("scenarios/tower/api/main.go").to_string(), "scenario:tower");
//! assert_eq!(status.scopes["other"], vec!["README.md".to_string()]);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),
}

/// Branch header information from a status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchStatus {
    /// Short branch name, or `(detached)`.
    pub head: String,
    /// Upstream tracking branch (`origin/main`), when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    /// Commits on the local branch not on the upstream.
    pub ahead: u32,
    /// Commits on the upstream not on the local branch.
    pub behind: u32,
    /// HEAD commit, or `(initial)` before the first commit.
    pub oid: String,
}

impl BranchStatus {
    /// Marker git reports for a detached HEAD.
    pub const DETACHED: &'static str = "(detached)";

    /// Check whether HEAD is detached.
    pub fn is_detached(&self) -> bool {
        self.head == Self::DETACHED
    }

    /// Whether an upstream is configured.
    pub fn has_upstream(&self) -> bool {
        self.upstream.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Split the upstream into `(remote, branch)`.
    ///
    /// # Example
    ///
    /// ```
    /// use git_control_tower::core::types::BranchStatus;
    ///
    /// let branch = BranchStatus {
    ///     upstream: Some("origin/feature/login".into()),
    ///     ..Default::default()
    /// };
    /// assert_eq!(branch.upstream_parts(), Some(("origin", "feature/login")));
    /// ```
    pub fn upstream_parts(&self) -> Option<(&str, &str)> {
        self.upstream
            .as_deref()
            .and_then(|u| u.split_once('/'))
            .filter(|(remote, branch)| !remote.is_empty() && !branch.is_empty())
    }
}

/// Paths in the working tree, bucketed by change kind.
///
/// A path may appear in both `staged` and `unstaged` (partially staged).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSets {
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicts: Vec<String>,
    pub ignored: Vec<String>,
}

impl FileSets {
    /// Iterate over every path in every list (duplicates included).
    pub fn all_paths(&self) -> impl Iterator<Item = &String> {
        self.staged
            .iter()
            .chain(&self.unstaged)
            .chain(&self.untracked)
            .chain(&self.conflicts)
            .chain(&self.ignored)
    }

    fn sort_and_dedup(&mut self) {
        for list in [
            &mut self.staged,
            &mut self.unstaged,
            &mut self.untracked,
            &mut self.conflicts,
            &mut self.ignored,
        ] {
            list.sort();
            list.dedup();
        }
    }
}

/// Counts mirroring [`FileSets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub staged: usize,
    pub unstaged: usize,
    pub untracked: usize,
    pub conflicts: usize,
    pub ignored: usize,
}

impl StatusSummary {
    /// Derive counts from file sets.
    pub fn from_files(files: &FileSets) -> Self {
        Self {
            staged: files.staged.len(),
            unstaged: files.unstaged.len(),
            untracked: files.untracked.len(),
            conflicts: files.conflicts.len(),
            ignored: files.ignored.len(),
        }
    }

    /// Whether there is anything staged or modified in tracked files.
    pub fn has_uncommitted_changes(&self) -> bool {
        self.staged > 0 || self.unstaged > 0
    }

    /// Whether the working tree is dirty (staged, unstaged, untracked or conflicted).
    pub fn is_dirty(&self) -> bool {
        self.staged > 0 || self.unstaged > 0 || self.untracked > 0 || self.conflicts > 0
    }
}

/// Snapshot of a working tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub repo_dir: String,
    pub branch: BranchStatus,
    pub files: FileSets,
    pub scopes: BTreeMap<String, Vec<String>>,
    pub summary: StatusSummary,
    pub timestamp: DateTime<Utc>,
    /// Porcelain records the parser did not recognise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unparsed: Vec<String>,
}

impl Default for RepoStatus {
    fn default() -> Self {
        Self {
            repo_dir: String::new(),
            branch: BranchStatus::default(),
            files: FileSets::default(),
            scopes: BTreeMap::new(),
            summary: StatusSummary::default(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            unparsed: Vec::new(),
        }
    }
}

impl RepoStatus {
    /// Sort file lists, then derive `summary` and `scopes`.
    ///
    /// Idempotent. Conflicted paths are folded into `unstaged` so the
    /// conflict/unstaged invariant holds regardless of input.
    pub fn normalize(&mut self) {
        for path in &self.files.conflicts {
            if !self.files.unstaged.contains(path) {
                self.files.unstaged.push(path.clone());
            }
        }
        self.files.sort_and_dedup();
        self.summary = StatusSummary::from_files(&self.files);

        let mut scopes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for path in self.files.all_paths() {
            scopes
                .entry(ScopeKey::for_path(path).to_string())
                .or_default()
                .push(path.clone());
        }
        for paths in scopes.values_mut() {
            paths.sort();
            paths.dedup();
        }
        self.scopes = scopes;
    }

    /// Counts of the changes that make the tree dirty.
    pub fn dirty_summary(&self) -> DirtySummary {
        DirtySummary {
            staged: self.summary.staged,
            unstaged: self.summary.unstaged,
            untracked: self.summary.untracked,
            conflicts: self.summary.conflicts,
        }
    }

    /// Whether the working tree has any pending change.
    pub fn is_dirty(&self) -> bool {
        self.summary.is_dirty()
    }
}

/// Dirty-tree counts attached to confirmation warnings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtySummary {
    pub staged: usize,
    pub unstaged: usize,
    pub untracked: usize,
    pub conflicts: usize,
}

/// Logical grouping of a path, derived from its first two segments.
///
/// # Example
///
/// ```
/// use git_control_tower::core::types::ScopeKey;
///
/// assert_eq!(ScopeKey::for_path("resources/postgres/cli.sh"), ScopeKey::Resource("postgres".into()));
/// assert_eq!(ScopeKey::for_path("packages/ui/index.ts").to_string(), "package:ui");
/// assert_eq!(ScopeKey::for_path("scenarios/only-dir"), ScopeKey::Other);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    Scenario(String),
    Resource(String),
    Package(String),
    Other,
}

/// Top-level directories that carry a scope: root, label, constructor.
const SCOPED_ROOTS: [(&str, &str, fn(String) -> ScopeKey); 3] = [
    ("scenarios", "scenario", ScopeKey::Scenario),
    ("resources", "resource", ScopeKey::Resource),
    ("packages", "package", ScopeKey::Package),
];

impl ScopeKey {
    /// Classify a repository-relative path.
    ///
    /// Only paths strictly below `<root>/<name>/` are scoped.
    pub fn for_path(path: &str) -> Self {
        let mut segments = path.trim_start_matches('/').splitn(3, '/');
        let (Some(root), Some(name), Some(rest)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return ScopeKey::Other;
        };
        if name.is_empty() || rest.is_empty() {
            return ScopeKey::Other;
        }
        SCOPED_ROOTS
            .iter()
            .find(|(dir, _, _)| *dir == root)
            .map_or(ScopeKey::Other, |(_, _, make)| make(name.to_string()))
    }

    /// Parse a `kind:name` label back into a scope.
    ///
    /// Returns `None` for `other` and unknown kinds.
    pub fn parse(label: &str) -> Option<Self> {
        let (kind, name) = label.trim().split_once(':')?;
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return None;
        }
        let kind = kind.trim();
        SCOPED_ROOTS
            .iter()
            .find(|(_, label, _)| *label == kind)
            .map(|(_, _, make)| make(name.to_string()))
    }

    /// Directory prefix covering every path in this scope (`scenarios/X/`).
    pub fn path_prefix(&self) -> Option<String> {
        let (root, _, name) = self.parts()?;
        Some(format!("{root}/{name}/"))
    }

    /// Root directory, label and name of a scoped key.
    fn parts(&self) -> Option<(&'static str, &'static str, &str)> {
        let (index, name) = match self {
            ScopeKey::Scenario(name) => (0, name),
            ScopeKey::Resource(name) => (1, name),
            ScopeKey::Package(name) => (2, name),
            ScopeKey::Other => return None,
        };
        let (root, label, _) = SCOPED_ROOTS[index];
        Some((root, label, name.as_str()))
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parts() {
            Some((_, label, name)) => write!(f, "{label}:{name}"),
            None => write!(f, "other"),
        }
    }
}

/// A validated Git branch name.
///
/// Branch names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty or exactly `@`
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
///
/// The production runner defers to `git check-ref-format`; this type
/// backs the in-memory runner so both agree on the common cases.
///
/// # Example
///
/// ```
/// use git_control_tower::core::types::BranchName;
///
/// let name = BranchName::new("feature/my-branch").unwrap();
/// assert_eq!(name.as_str(), "feature/my-branch");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        let reject = |msg: &str| Err(TypeError::InvalidBranchName(msg.to_string()));

        if name.is_empty() {
            return reject("branch name cannot be empty");
        }
        if name == "@" {
            return reject("branch name cannot be '@' (reserved)");
        }
        if name.starts_with('.') || name.starts_with('-') {
            return reject("branch name cannot start with '.' or '-'");
        }
        if name.ends_with(".lock") || name.ends_with('/') {
            return reject("branch name cannot end with '.lock' or '/'");
        }
        for sequence in ["..", "@{", "//"] {
            if name.contains(sequence) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{sequence}'"
                )));
            }
        }

        const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
        if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
            return Err(TypeError::InvalidBranchName(format!(
                "branch name cannot contain '{c}'"
            )));
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return reject("branch name cannot contain control characters");
        }
        for component in name.split('/') {
            if component.starts_with('.') || component.ends_with(".lock") {
                return reject("path component cannot start with '.' or end with '.lock'");
            }
        }

        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

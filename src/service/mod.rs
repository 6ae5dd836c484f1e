//! service
//!
//! Repository operations composed from the runner and the parsers.
//!
//! # Architecture
//!
//! [`GitService`] is the facade the HTTP layer talks to. It owns a shared
//! [`GitRunner`] and exposes one method per operation, implemented across
//! the submodules:
//!
//! - [`status`] - Repository snapshot
//! - [`branches`] - List, create, switch and publish branches
//! - [`sync`] - Ahead/behind policy view with warnings and recommendations
//! - [`staging`] - Stage, unstage and discard paths
//! - [`ignore`] - Append to the nearest `.gitignore` and untrack
//! - [`commit`] - Commit with optional conventional-commit validation
//! - [`push`] - Push with post-push verification
//! - [`pull`] - Pull with conflict detection
//! - [`diff`] - Parsed unified diffs
//!
//! # Failure model
//!
//! Failures a caller can act on (validation, policy warnings, runner
//! errors during mutations) are returned in-band in the response structs.
//! Only plumbing failures surface as [`ServiceError`].
//!
//! # Example
//!
//! ```
//! use git_control_tower::git::FakeGitRunner;
//! use git_control_tower::git::RunContext;
//! use git_control_tower::service::GitService;
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let service = GitService::new(Arc::new(FakeGitRunner::new("/repo")));
//! let ctx = RunContext::with_timeout(Duration::from_secs(5));
//!
//! let status = service.status(&ctx, Path::new("/repo")).await.unwrap();
//! assert_eq!(status.branch.head, "main");
//! # });
//! ```

pub mod branches;
pub mod commit;
pub mod diff;
pub mod ignore;
pub mod pull;
pub mod push;
pub mod staging;
pub mod status;
pub mod sync;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::DirtySummary;
use crate::git::{GitRunner, GitRunnerError, RunContext};

pub use branches::{
    BranchCreateResponse, BranchInfo, BranchList, BranchPublishResponse, BranchSwitchResponse,
    CreateBranchRequest, PublishBranchRequest, SwitchBranchRequest,
};
pub use commit::{CommitRequest, CommitResponse};
pub use diff::DiffRequest;
pub use ignore::{IgnoreRequest, IgnoreResponse};
pub use pull::{PullRequest, PullResponse};
pub use push::{PushRequest, PushResponse};
pub use staging::{
    DiscardRequest, DiscardResponse, StageRequest, StageResponse, UnstageRequest, UnstageResponse,
};
pub use sync::{SyncStatusRequest, SyncStatusResponse};

/// Default remote when none is configured or requested.
pub const DEFAULT_REMOTE: &str = "origin";

/// Plumbing failures that cannot be expressed in a response body.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No repository root could be resolved.
    #[error("repository root could not be resolved")]
    NoRepository,

    /// A read operation failed in the runner.
    #[error("git operation failed: {0}")]
    Runner(#[from] GitRunnerError),

    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Structured precondition warning.
///
/// The operation would succeed mechanically but policy rejects it until
/// the caller confirms; the flags tell a UI how to continue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationWarning {
    pub message: String,
    pub requires_confirmation: bool,
    pub requires_tracking: bool,
    pub requires_fetch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty_summary: Option<DirtySummary>,
}

impl OperationWarning {
    /// The working tree is dirty; retry with `allow_dirty`.
    pub fn dirty(message: impl Into<String>, summary: DirtySummary) -> Self {
        Self {
            message: message.into(),
            requires_confirmation: true,
            dirty_summary: Some(summary),
            ..Default::default()
        }
    }

    /// The branch exists only on a remote; retry with `track_remote`.
    pub fn tracking(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            requires_tracking: true,
            ..Default::default()
        }
    }

    /// The branch is behind its remote.
    pub fn behind(message: impl Into<String>, requires_fetch: bool) -> Self {
        Self {
            message: message.into(),
            requires_fetch,
            ..Default::default()
        }
    }
}

/// Operations over a single repository, backed by a [`GitRunner`].
#[derive(Clone)]
pub struct GitService {
    runner: Arc<dyn GitRunner>,
}

impl std::fmt::Debug for GitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitService").finish_non_exhaustive()
    }
}

impl GitService {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }

    /// The underlying runner.
    pub fn runner(&self) -> &Arc<dyn GitRunner> {
        &self.runner
    }

    /// Resolve the repository root, failing when none is available.
    pub async fn repo_root(&self, ctx: &RunContext) -> Result<String, ServiceError> {
        let root = self.runner.resolve_repo_root(ctx).await;
        if root.trim().is_empty() {
            return Err(ServiceError::NoRepository);
        }
        Ok(root)
    }
}

/// Reject an empty repository directory before touching the runner.
pub(crate) fn require_repo(repo: &Path) -> Result<(), ServiceError> {
    if repo.as_os_str().is_empty() {
        return Err(ServiceError::NoRepository);
    }
    Ok(())
}

/// Trimmed, non-empty optional string.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::FakeGitRunner;
    use std::time::Duration;

    #[tokio::test]
    async fn repo_root_from_runner() {
        let service = GitService::new(Arc::new(FakeGitRunner::new("/srv/repo")));
        let ctx = RunContext::with_timeout(Duration::from_secs(1));
        assert_eq!(service.repo_root(&ctx).await.unwrap(), "/srv/repo");

        let empty = GitService::new(Arc::new(FakeGitRunner::new("")));
        assert!(matches!(
            empty.repo_root(&ctx).await,
            Err(ServiceError::NoRepository)
        ));
    }

    #[test]
    fn warning_constructors() {
        let dirty = OperationWarning::dirty(
            "dirty",
            DirtySummary {
                unstaged: 1,
                ..Default::default()
            },
        );
        assert!(dirty.requires_confirmation);
        assert!(!dirty.requires_tracking);
        assert_eq!(dirty.dirty_summary.map(|d| d.unstaged), Some(1));

        let json = serde_json::to_value(OperationWarning::tracking("remote only")).unwrap();
        assert_eq!(json["requires_tracking"], true);
        assert!(json.get("dirty_summary").is_none());
    }

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty(Some("  origin ")), Some("origin"));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }
}

//! service::sync
//!
//! Sync-status policy view over a repository snapshot and its remote.
//!
//! # Policy
//!
//! - `needs_push = ahead > 0`, `needs_pull = behind > 0`
//! - `can_push = has_upstream && ahead > 0 && behind == 0`
//! - `can_pull = has_upstream && behind > 0`
//! - `has_uncommitted_changes = staged > 0 || unstaged > 0`
//!
//! Fetch failures are recorded in `fetch_error` and never fail the call.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{non_empty, GitService, ServiceError, DEFAULT_REMOTE};
use crate::core::types::RepoStatus;
use crate::git::RunContext;

/// Commits behind upstream before the sync view warns about drift.
pub const BEHIND_WARNING_THRESHOLD: u32 = 10;

/// Sync-status request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncStatusRequest {
    pub remote: Option<String>,
    pub fetch: bool,
}

/// Derived sync view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub branch: String,
    pub upstream: String,
    pub remote: String,
    pub remote_url: String,
    pub ahead: u32,
    pub behind: u32,
    pub has_upstream: bool,
    pub can_push: bool,
    pub can_pull: bool,
    pub needs_push: bool,
    pub needs_pull: bool,
    pub has_uncommitted_changes: bool,
    pub safety_warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub fetched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncStatusResponse {
    /// Derive the policy view from a snapshot.
    pub fn from_status(status: &RepoStatus, remote: &str, remote_url: String) -> Self {
        let branch = &status.branch;
        let has_upstream = branch.has_upstream();
        let (ahead, behind) = (branch.ahead, branch.behind);

        let mut response = Self {
            branch: branch.head.clone(),
            upstream: branch.upstream.clone().unwrap_or_default(),
            remote: remote.to_string(),
            remote_url,
            ahead,
            behind,
            has_upstream,
            can_push: has_upstream && ahead > 0 && behind == 0,
            can_pull: has_upstream && behind > 0,
            needs_push: ahead > 0,
            needs_pull: behind > 0,
            has_uncommitted_changes: status.summary.has_uncommitted_changes(),
            safety_warnings: Vec::new(),
            recommendations: Vec::new(),
            fetched: false,
            fetch_error: None,
            timestamp: Utc::now(),
        };
        response.safety_warnings = response.warnings(status.summary.conflicts);
        response.recommendations = response.recommend(
            status.summary.staged,
            status.summary.unstaged,
            status.summary.conflicts,
        );
        response
    }

    fn warnings(&self, conflicts: usize) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.has_upstream {
            warnings.push("No upstream branch configured; changes cannot be pushed or pulled until one is set".to_string());
        }
        if self.needs_push && self.needs_pull {
            warnings.push(format!(
                "Branch has diverged from upstream ({} ahead, {} behind)",
                self.ahead, self.behind
            ));
        }
        if self.has_uncommitted_changes && self.needs_pull {
            warnings.push("Uncommitted changes present while behind upstream; pulling may cause conflicts".to_string());
        }
        if conflicts > 0 {
            warnings.push(format!("{conflicts} file(s) have unresolved merge conflicts"));
        }
        if self.behind > BEHIND_WARNING_THRESHOLD {
            warnings.push(format!(
                "Branch is {} commits behind upstream",
                self.behind
            ));
        }
        warnings
    }

    fn recommend(&self, staged: usize, unstaged: usize, conflicts: usize) -> Vec<String> {
        let mut recs = Vec::new();
        if !self.has_upstream {
            recs.push("Publish the branch with set_upstream to configure an upstream".to_string());
        }
        if conflicts > 0 {
            recs.push("Resolve merge conflicts before any other operation".to_string());
            return recs;
        }
        if staged > 0 {
            recs.push(format!("Commit or stash {staged} staged file(s)"));
        }
        if unstaged > 0 {
            recs.push(format!("Stage and commit, or stash, {unstaged} modified file(s)"));
        }
        match (self.needs_pull, self.needs_push) {
            (true, true) => recs.push("Pull remote changes, then push local commits".to_string()),
            (true, false) => recs.push(format!("Pull {} commit(s) from upstream", self.behind)),
            (false, true) => recs.push(format!("Push {} commit(s) to upstream", self.ahead)),
            (false, false) => {}
        }
        if self.has_upstream
            && !self.needs_pull
            && !self.needs_push
            && !self.has_uncommitted_changes
        {
            recs.push("Branch is in sync with upstream".to_string());
        }
        recs
    }
}

impl GitService {
    /// Compute the sync view, optionally fetching first.
    ///
    /// # Errors
    ///
    /// Fails only when the status read fails.
    pub async fn sync_status(
        &self,
        ctx: &RunContext,
        repo: &Path,
        req: &SyncStatusRequest,
    ) -> Result<SyncStatusResponse, ServiceError> {
        let remote = non_empty(req.remote.as_deref()).unwrap_or(DEFAULT_REMOTE);

        let mut fetch_error = None;
        if req.fetch {
            if let Err(e) = self.runner.fetch(ctx, repo, remote).await {
                tracing::warn!(remote, error = %e, "fetch failed during sync status");
                fetch_error = Some(e.detail());
            }
        }

        let remote_url = self
            .runner
            .remote_url(ctx, repo, remote)
            .await
            .unwrap_or_default();

        let status = self.status(ctx, repo).await?;
        let mut response = SyncStatusResponse::from_status(&status, remote, remote_url);
        response.fetched = req.fetch && fetch_error.is_none();
        response.fetch_error = fetch_error;
        Ok(response)
    }
}

//! service::pull
//!
//! Pull with merge-conflict detection.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{non_empty, GitService, DEFAULT_REMOTE};
use crate::git::RunContext;

/// Pull request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    pub remote: Option<String>,
    pub branch: Option<String>,
}

/// Pull outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    pub success: bool,
    pub remote: String,
    pub branch: String,
    pub has_conflicts: bool,
    /// Conflicted paths after a failed merge
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whether git output reports a merge conflict.
pub fn mentions_conflict(message: &str) -> bool {
    message.contains("CONFLICT") || message.contains("conflict")
}

impl GitService {
    /// Pull from a remote; an empty branch lets git pick the upstream.
    pub async fn pull(&self, ctx: &RunContext, repo: &Path, req: &PullRequest) -> PullResponse {
        let remote = non_empty(req.remote.as_deref()).unwrap_or(DEFAULT_REMOTE);
        let branch = non_empty(req.branch.as_deref());
        let mut response = PullResponse {
            remote: remote.to_string(),
            branch: branch.unwrap_or_default().to_string(),
            ..Default::default()
        };

        match self.runner.pull(ctx, repo, remote, branch).await {
            Ok(()) => response.success = true,
            Err(e) => {
                let message = e.detail();
                response.has_conflicts = mentions_conflict(&message);
                if response.has_conflicts {
                    match self.status(ctx, repo).await {
                        Ok(status) => response.conflicts = status.files.conflicts,
                        Err(err) => tracing::warn!(error = %err, "could not list conflicts after pull"),
                    }
                }
                response.error = Some(message);
            }
        }
        response
    }
}

//! service::push
//!
//! Push with post-push verification.
//!
//! # Protocol
//!
//! ```text
//! PREP     resolve remote (explicit > upstream > origin)
//!          resolve branch (explicit > upstream branch > HEAD)
//!          rev-parse HEAD; rev-parse remote/branch (may fail)
//! EXECUTE  push(remote, branch, set_upstream)
//! VERIFY   fetch(remote); rev-parse remote/branch
//! DECIDE   post == HEAD and pre == HEAD  -> up to date
//!          post == HEAD                  -> pushed
//!          otherwise                     -> failure, remote did not update
//! ```
//!
//! The exit code of `git push` alone is not trusted: hooks and protected
//! branches can accept a push without moving the ref.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{non_empty, GitService, DEFAULT_REMOTE};
use crate::git::RunContext;

/// Error reported when the remote ref is unchanged after a push.
pub const REMOTE_NOT_UPDATED: &str = "push completed but remote ref did not update";

/// Push request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushRequest {
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub set_upstream: bool,
}

/// Push outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub success: bool,
    pub remote: String,
    pub branch: String,
    pub pushed: bool,
    pub up_to_date: bool,
    pub verified: bool,
    pub set_upstream: bool,
    pub head_oid: String,
    pub remote_oid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResponse {
    fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

impl GitService {
    /// Push a branch and verify the remote ref moved to HEAD.
    pub async fn push(&self, ctx: &RunContext, repo: &Path, req: &PushRequest) -> PushResponse {
        let mut response = PushResponse {
            set_upstream: req.set_upstream,
            ..Default::default()
        };

        // PREP
        let status = match self.status(ctx, repo).await {
            Ok(status) => status,
            Err(e) => return response.failed(e.to_string()),
        };
        let upstream = status.branch.upstream_parts();

        response.remote = non_empty(req.remote.as_deref())
            .or(upstream.map(|(remote, _)| remote))
            .unwrap_or(DEFAULT_REMOTE)
            .to_string();

        let head = (!status.branch.is_detached() && !status.branch.head.is_empty())
            .then_some(status.branch.head.as_str());
        let Some(branch) = non_empty(req.branch.as_deref())
            .or(upstream.map(|(_, branch)| branch))
            .or(head)
        else {
            return response.failed("cannot push: HEAD is detached and no branch was given");
        };
        response.branch = branch.to_string();

        response.head_oid = match self.runner.rev_parse(ctx, repo, "HEAD").await {
            Ok(oid) => oid,
            Err(e) => return response.failed(format!("could not resolve HEAD: {}", e.detail())),
        };

        let remote_ref = format!("{}/{}", response.remote, response.branch);
        let pre_remote = self.runner.rev_parse(ctx, repo, &remote_ref).await.ok();

        // EXECUTE
        tracing::info!(
            remote = %response.remote,
            branch = %response.branch,
            set_upstream = req.set_upstream,
            "pushing"
        );
        if let Err(e) = self
            .runner
            .push(ctx, repo, &response.remote, &response.branch, req.set_upstream)
            .await
        {
            return response.failed(e.detail());
        }

        // VERIFY
        if let Err(e) = self.runner.fetch(ctx, repo, &response.remote).await {
            tracing::warn!(remote = %response.remote, error = %e, "post-push fetch failed");
            response.success = true;
            response.pushed = true;
            response.verification_error = Some(format!("fetch failed: {}", e.detail()));
            return response;
        }
        let post_remote = match self.runner.rev_parse(ctx, repo, &remote_ref).await {
            Ok(oid) => oid,
            Err(e) => {
                response.success = true;
                response.pushed = true;
                response.verification_error =
                    Some(format!("could not resolve {remote_ref}: {}", e.detail()));
                return response;
            }
        };

        // DECIDE
        response.verified = true;
        response.remote_oid = post_remote;
        if response.remote_oid == response.head_oid {
            let up_to_date = pre_remote.as_deref() == Some(response.head_oid.as_str());
            response.success = true;
            response.up_to_date = up_to_date;
            response.pushed = !up_to_date;
        } else {
            tracing::warn!(
                remote_ref = %remote_ref,
                head = %response.head_oid,
                remote_oid = %response.remote_oid,
                "remote ref did not move after push"
            );
            response = response.failed(REMOTE_NOT_UPDATED);
        }
        response
    }
}

//! service::branches
//!
//! Branch listing, creation, switching and publishing.
//!
//! # Preconditions
//!
//! Mutations that move HEAD refuse to run on a dirty tree unless the
//! caller passes `allow_dirty`; the refusal is an [`OperationWarning`]
//! with `requires_confirmation` and the dirty counts. Switching to a
//! branch that exists only on a remote needs `track_remote`. Publishing
//! refuses while the branch is behind its remote.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::push::{PushRequest, PushResponse};
use super::sync::SyncStatusRequest;
use super::{non_empty, GitService, OperationWarning, ServiceError, DEFAULT_REMOTE};
use crate::core::types::RepoStatus;
use crate::git::refs::{parse_branch_refs, ParsedBranchRef};
use crate::git::RunContext;

const DIRTY_MESSAGE: &str = "working tree has uncommitted changes; retry with allow_dirty to proceed";

/// Display view of a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_at: Option<DateTime<Utc>>,
    pub ahead: u32,
    pub behind: u32,
    pub is_current: bool,
}

impl BranchInfo {
    /// Build from a parsed ref; the current local branch takes its
    /// tracking data from the status snapshot.
    fn from_ref(parsed: &ParsedBranchRef, status: &RepoStatus) -> Self {
        let mut info = BranchInfo {
            name: parsed.short_name.clone(),
            upstream: parsed.upstream.clone(),
            oid: Some(parsed.oid.clone()).filter(|oid| !oid.is_empty()),
            last_commit_at: parsed.last_commit_at,
            ..Default::default()
        };
        if !parsed.is_remote && parsed.short_name == status.branch.head {
            info.is_current = true;
            info.upstream = status.branch.upstream.clone();
            info.ahead = status.branch.ahead;
            info.behind = status.branch.behind;
            if !status.branch.oid.is_empty() {
                info.oid = Some(status.branch.oid.clone());
            }
        }
        info
    }

    /// Minimal view of the checked-out branch from a status snapshot alone.
    fn from_status(status: &RepoStatus) -> Self {
        BranchInfo {
            name: status.branch.head.clone(),
            upstream: status.branch.upstream.clone(),
            oid: Some(status.branch.oid.clone()).filter(|oid| !oid.is_empty()),
            last_commit_at: None,
            ahead: status.branch.ahead,
            behind: status.branch.behind,
            is_current: true,
        }
    }
}

/// Branches grouped for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchList {
    pub current: String,
    pub locals: Vec<BranchInfo>,
    pub remotes: Vec<BranchInfo>,
}

impl BranchList {
    fn local(&self, name: &str) -> Option<&BranchInfo> {
        self.locals.iter().find(|b| b.name == name)
    }

    /// Remote-tracking branch matching `name`, either by full short name
    /// (`origin/feature`) or by branch part (`feature`).
    fn remote_match(&self, name: &str) -> Option<&BranchInfo> {
        self.remotes
            .iter()
            .find(|b| b.name == name)
            .or_else(|| {
                self.remotes
                    .iter()
                    .find(|b| split_remote(&b.name).is_some_and(|(_, branch)| branch == name))
            })
    }
}

/// Split `remote/branch` at the first `/`.
fn split_remote(name: &str) -> Option<(&str, &str)> {
    name.split_once('/')
        .filter(|(remote, branch)| !remote.is_empty() && !branch.is_empty())
}

/// Create-branch request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateBranchRequest {
    pub name: String,
    /// Start point; defaults to the current branch (or HEAD when detached)
    pub from: Option<String>,
    pub checkout: bool,
    pub allow_dirty: bool,
}

/// Switch-branch request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SwitchBranchRequest {
    pub name: String,
    pub allow_dirty: bool,
    /// Create a local tracking branch when only a remote branch matches
    pub track_remote: bool,
}

/// Publish-branch request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublishBranchRequest {
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub set_upstream: bool,
    pub fetch: bool,
}

/// Create-branch outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCreateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchInfo>,
    pub checked_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<OperationWarning>,
    pub validation_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Switch-branch outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSwitchResponse {
    pub success: bool,
    /// Branch checked out before the switch
    pub previous: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchInfo>,
    /// A local tracking branch was created from a remote branch
    pub created_tracking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<OperationWarning>,
    pub validation_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Publish-branch outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPublishResponse {
    pub success: bool,
    pub branch: String,
    pub remote: String,
    pub set_upstream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<OperationWarning>,
    pub validation_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GitService {
    /// List local and remote branches.
    ///
    /// # Errors
    ///
    /// Fails when the status read or the ref listing fails.
    pub async fn list_branches(&self, ctx: &RunContext, repo: &Path) -> Result<BranchList, ServiceError> {
        let status = self.status(ctx, repo).await?;
        let raw = self.runner.list_branches(ctx, repo).await?;

        let mut list = BranchList {
            current: status.branch.head.clone(),
            ..Default::default()
        };
        for parsed in parse_branch_refs(&raw) {
            let info = BranchInfo::from_ref(&parsed, &status);
            if parsed.is_remote {
                list.remotes.push(info);
            } else {
                list.locals.push(info);
            }
        }
        Ok(list)
    }

    /// Current view of a local branch, falling back to a bare name.
    async fn refreshed_info(&self, ctx: &RunContext, repo: &Path, name: &str) -> BranchInfo {
        match self.list_branches(ctx, repo).await {
            Ok(list) => list.local(name).cloned().unwrap_or_else(|| BranchInfo {
                name: name.to_string(),
                ..Default::default()
            }),
            Err(e) => {
                tracing::warn!(branch = name, error = %e, "could not refresh branch after mutation");
                BranchInfo {
                    name: name.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    /// Create a branch, optionally checking it out.
    pub async fn create_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        req: &CreateBranchRequest,
    ) -> BranchCreateResponse {
        let mut response = BranchCreateResponse::default();

        let name = req.name.trim();
        if name.is_empty() {
            response.validation_errors.push("branch name is required".to_string());
            return response;
        }
        if let Err(e) = self.runner.check_ref_format(ctx, repo, name).await {
            response
                .validation_errors
                .push(format!("invalid branch name '{name}': {}", e.detail()));
            return response;
        }

        match self.list_branches(ctx, repo).await {
            Ok(list) if list.local(name).is_some() => {
                response
                    .validation_errors
                    .push(format!("branch '{name}' already exists"));
                return response;
            }
            Ok(_) => {}
            Err(e) => {
                response.error = Some(e.to_string());
                return response;
            }
        }

        let mut from = non_empty(req.from.as_deref()).map(str::to_string);
        if req.checkout || from.is_none() {
            let status = match self.status(ctx, repo).await {
                Ok(status) => status,
                Err(e) => {
                    response.error = Some(e.to_string());
                    return response;
                }
            };
            if req.checkout && status.is_dirty() && !req.allow_dirty {
                response.warning = Some(OperationWarning::dirty(DIRTY_MESSAGE, status.dirty_summary()));
                return response;
            }
            if from.is_none() {
                let start = if status.branch.is_detached() {
                    status.branch.oid.clone()
                } else {
                    status.branch.head.clone()
                };
                from = Some(start).filter(|s| !s.is_empty());
            }
        }

        if let Err(e) = self
            .runner
            .create_branch(ctx, repo, name, from.as_deref())
            .await
        {
            response.error = Some(e.detail());
            return response;
        }
        tracing::info!(branch = name, from = from.as_deref().unwrap_or("HEAD"), "created branch");

        if req.checkout {
            if let Err(e) = self.runner.checkout_branch(ctx, repo, name).await {
                response.error = Some(format!("branch created but checkout failed: {}", e.detail()));
                response.branch = Some(self.refreshed_info(ctx, repo, name).await);
                return response;
            }
            response.checked_out = true;
        }

        response.success = true;
        response.branch = Some(self.refreshed_info(ctx, repo, name).await);
        response
    }

    /// Check out a local branch, or track a remote one.
    pub async fn switch_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        req: &SwitchBranchRequest,
    ) -> BranchSwitchResponse {
        let mut response = BranchSwitchResponse::default();

        let name = req.name.trim();
        if name.is_empty() {
            response.validation_errors.push("branch name is required".to_string());
            return response;
        }

        let status = match self.status(ctx, repo).await {
            Ok(status) => status,
            Err(e) => {
                response.error = Some(e.to_string());
                return response;
            }
        };
        response.previous = status.branch.head.clone();

        if status.is_dirty() && !req.allow_dirty {
            response.warning = Some(OperationWarning::dirty(DIRTY_MESSAGE, status.dirty_summary()));
            return response;
        }
        if status.branch.head == name {
            response.success = true;
            response.branch = Some(BranchInfo::from_status(&status));
            return response;
        }

        let list = match self.list_branches(ctx, repo).await {
            Ok(list) => list,
            Err(e) => {
                response.error = Some(e.to_string());
                return response;
            }
        };

        let target = if list.local(name).is_some() {
            name.to_string()
        } else if let Some(remote) = list.remote_match(name) {
            let Some((remote_name, branch)) = split_remote(&remote.name) else {
                response.error = Some(format!("cannot parse remote branch '{}'", remote.name));
                return response;
            };
            if !req.track_remote {
                response.warning = Some(OperationWarning::tracking(format!(
                    "branch '{branch}' exists only on remote '{remote_name}'; retry with track_remote to create a local tracking branch"
                )));
                return response;
            }
            if list.local(branch).is_none() {
                if let Err(e) = self
                    .runner
                    .track_remote_branch(ctx, repo, remote_name, branch)
                    .await
                {
                    response.error = Some(e.detail());
                    return response;
                }
                response.created_tracking = true;
            }
            branch.to_string()
        } else {
            response.error = Some(format!("branch '{name}' not found"));
            return response;
        };

        if let Err(e) = self.runner.checkout_branch(ctx, repo, &target).await {
            response.error = Some(e.detail());
            return response;
        }
        tracing::info!(from = %response.previous, to = %target, "switched branch");

        response.success = true;
        response.branch = Some(match self.status(ctx, repo).await {
            Ok(status) => BranchInfo::from_status(&status),
            Err(_) => BranchInfo {
                name: target,
                is_current: true,
                ..Default::default()
            },
        });
        response
    }

    /// Push the current branch, configuring its upstream when missing.
    pub async fn publish_branch(
        &self,
        ctx: &RunContext,
        repo: &Path,
        req: &PublishBranchRequest,
    ) -> BranchPublishResponse {
        let mut response = BranchPublishResponse::default();

        let status = match self.status(ctx, repo).await {
            Ok(status) => status,
            Err(e) => {
                response.error = Some(e.to_string());
                return response;
            }
        };

        let head = status.branch.head.as_str();
        let branch = non_empty(req.branch.as_deref()).unwrap_or(head);
        response.branch = branch.to_string();
        if status.branch.is_detached() || branch.is_empty() {
            response
                .validation_errors
                .push("cannot publish: HEAD is detached".to_string());
            return response;
        }
        if branch != head {
            response.validation_errors.push(format!(
                "can only publish the current branch '{head}', not '{branch}'"
            ));
            return response;
        }

        let remote = match non_empty(req.remote.as_deref()) {
            Some(remote) => remote.to_string(),
            None => {
                let configured = self
                    .runner
                    .config_get(ctx, repo, &format!("branch.{branch}.remote"))
                    .await
                    .ok()
                    .filter(|r| !r.is_empty());
                configured
                    .or_else(|| status.branch.upstream_parts().map(|(r, _)| r.to_string()))
                    .unwrap_or_else(|| DEFAULT_REMOTE.to_string())
            }
        };
        response.remote = remote.clone();

        let sync = match self
            .sync_status(
                ctx,
                repo,
                &SyncStatusRequest {
                    remote: Some(remote.clone()),
                    fetch: req.fetch,
                },
            )
            .await
        {
            Ok(sync) => sync,
            Err(e) => {
                response.error = Some(e.to_string());
                return response;
            }
        };
        if sync.behind > 0 {
            let hint = if req.fetch {
                "pull before publishing"
            } else {
                "fetch and pull before publishing"
            };
            response.warning = Some(OperationWarning::behind(
                format!("branch '{branch}' is {} commit(s) behind '{remote}'; {hint}", sync.behind),
                !req.fetch,
            ));
            return response;
        }

        response.set_upstream = req.set_upstream || !status.branch.has_upstream();
        let push = self
            .push(
                ctx,
                repo,
                &PushRequest {
                    remote: Some(remote),
                    branch: Some(branch.to_string()),
                    set_upstream: response.set_upstream,
                },
            )
            .await;
        response.success = push.success;
        response.error = push.error.clone();
        response.push = Some(push);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::{FailOn, FakeChange, FakeGitRunner, FakeOp};
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx() -> RunContext {
        RunContext::with_timeout(Duration::from_secs(5))
    }

    fn repo() -> &'static Path {
        Path::new("/repo")
    }

    fn setup() -> (FakeGitRunner, GitService) {
        let git = FakeGitRunner::new("/repo");
        let service = GitService::new(Arc::new(git.clone()));
        (git, service)
    }

    fn switch(name: &str) -> SwitchBranchRequest {
        SwitchBranchRequest {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn list_joins_current_with_status() {
        let (git, service) = setup();
        git.set_upstream("main", "origin/main");
        git.advance("main", 2);
        git.add_branch("topic");

        let list = service.list_branches(&ctx(), repo()).await.unwrap();
        assert_eq!(list.current, "main");
        let main = list.local("main").unwrap();
        assert!(main.is_current);
        assert_eq!(main.ahead, 2);
        assert_eq!(main.upstream.as_deref(), Some("origin/main"));
        assert!(!list.local("topic").unwrap().is_current);
        assert_eq!(list.remotes.len(), 1);
        assert_eq!(list.remotes[0].name, "origin/main");
    }

    #[tokio::test]
    async fn create_and_checkout() {
        let (git, service) = setup();
        let res = service
            .create_branch(
                &ctx(),
                repo(),
                &CreateBranchRequest {
                    name: "feature/x".into(),
                    checkout: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(res.success, "{res:?}");
        assert!(res.checked_out);
        let branch = res.branch.unwrap();
        assert_eq!(branch.name, "feature/x");
        assert!(branch.is_current);
        assert_eq!(git.current_branch().as_deref(), Some("feature/x"));
        assert_eq!(git.calls_to(FakeOp::CreateBranch)[0].args, vec!["feature/x", "main"]);
    }

    #[tokio::test]
    async fn create_rejects_invalid_and_duplicate_names() {
        let (git, service) = setup();
        let res = service
            .create_branch(
                &ctx(),
                repo(),
                &CreateBranchRequest {
                    name: "bad name".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(!res.success);
        assert!(res.validation_errors[0].contains("invalid branch name"));

        let res = service
            .create_branch(
                &ctx(),
                repo(),
                &CreateBranchRequest {
                    name: "main".into(),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(res.validation_errors, vec!["branch 'main' already exists"]);
        assert!(!git.was_called(FakeOp::CreateBranch));
    }

    #[tokio::test]
    async fn create_with_checkout_on_dirty_tree_warns() {
        let (git, service) = setup();
        git.add_file("wip.rs", FakeChange::Unstaged);
        let req = CreateBranchRequest {
            name: "topic".into(),
            checkout: true,
            ..Default::default()
        };

        let res = service.create_branch(&ctx(), repo(), &req).await;
        assert!(!res.success);
        let warning = res.warning.unwrap();
        assert!(warning.requires_confirmation);
        assert_eq!(warning.dirty_summary.unwrap().unstaged, 1);
        assert!(!git.has_branch("topic"));

        let res = service
            .create_branch(
                &ctx(),
                repo(),
                &CreateBranchRequest {
                    allow_dirty: true,
                    ..req
                },
            )
            .await;
        assert!(res.success);
    }

    #[tokio::test]
    async fn create_from_detached_head_uses_oid() {
        let (git, service) = setup();
        let oid = git.head_oid();
        git.detach_head();
        let res = service
            .create_branch(
                &ctx(),
                repo(),
                &CreateBranchRequest {
                    name: "rescue".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(res.success, "{res:?}");
        assert!(!res.checked_out);
        assert_eq!(git.calls_to(FakeOp::CreateBranch)[0].args, vec!["rescue".to_string(), oid]);
    }

    #[tokio::test]
    async fn switch_blocked_on_dirty_tree() {
        let (git, service) = setup();
        git.add_file("dirty.txt", FakeChange::Unstaged);
        let res = service.switch_branch(&ctx(), repo(), &switch("main")).await;
        assert!(!res.success);
        let warning = res.warning.unwrap();
        assert!(warning.requires_confirmation);
        assert_eq!(warning.dirty_summary.unwrap().unstaged, 1);
        assert!(!git.was_called(FakeOp::CheckoutBranch));
    }

    #[tokio::test]
    async fn switch_to_local_branch() {
        let (git, service) = setup();
        git.add_branch("topic");
        let res = service.switch_branch(&ctx(), repo(), &switch("topic")).await;
        assert!(res.success, "{res:?}");
        assert_eq!(res.previous, "main");
        assert_eq!(res.branch.unwrap().name, "topic");
        assert_eq!(git.current_branch().as_deref(), Some("topic"));
    }

    #[tokio::test]
    async fn switch_to_current_is_noop() {
        let (git, service) = setup();
        let res = service.switch_branch(&ctx(), repo(), &switch("main")).await;
        assert!(res.success);
        assert!(!git.was_called(FakeOp::CheckoutBranch));
    }

    #[tokio::test]
    async fn remote_only_branch_requires_tracking() {
        let (git, service) = setup();
        git.add_remote_branch("origin", "feature/remote");

        let res = service
            .switch_branch(&ctx(), repo(), &switch("origin/feature/remote"))
            .await;
        assert!(!res.success);
        assert!(res.warning.unwrap().requires_tracking);
        assert!(!git.has_branch("feature/remote"));

        let res = service
            .switch_branch(
                &ctx(),
                repo(),
                &SwitchBranchRequest {
                    name: "origin/feature/remote".into(),
                    track_remote: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(res.success, "{res:?}");
        assert!(res.created_tracking);
        let branch = res.branch.unwrap();
        assert_eq!(branch.name, "feature/remote");
        assert_eq!(branch.upstream.as_deref(), Some("origin/feature/remote"));
    }

    #[tokio::test]
    async fn switch_by_bare_remote_branch_name() {
        let (git, service) = setup();
        git.add_remote_branch("origin", "release");
        let res = service
            .switch_branch(
                &ctx(),
                repo(),
                &SwitchBranchRequest {
                    name: "release".into(),
                    track_remote: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(res.success, "{res:?}");
        assert_eq!(git.calls_to(FakeOp::TrackRemoteBranch)[0].args, vec!["origin", "release"]);
    }

    #[tokio::test]
    async fn switch_unknown_branch() {
        let (_git, service) = setup();
        let res = service.switch_branch(&ctx(), repo(), &switch("nope")).await;
        assert!(!res.success);
        assert_eq!(res.error.as_deref(), Some("branch 'nope' not found"));
    }

    #[tokio::test]
    async fn publish_sets_upstream_when_missing() {
        let (git, service) = setup();
        git.add_remote("origin", "https://example.com/origin.git");
        git.set_head("feature/test");
        git.advance("feature/test", 1);

        let res = service
            .publish_branch(&ctx(), repo(), &PublishBranchRequest::default())
            .await;
        assert!(res.success, "{res:?}");
        assert!(res.set_upstream);
        assert_eq!(res.remote, "origin");
        assert_eq!(
            git.calls_to(FakeOp::Push)[0].args,
            vec!["origin", "feature/test", "--set-upstream"]
        );
        assert_eq!(git.branch_upstream("feature/test").as_deref(), Some("origin/feature/test"));
        assert!(res.push.unwrap().verified);
    }

    #[tokio::test]
    async fn publish_uses_configured_remote() {
        let (git, service) = setup();
        git.add_remote("fork", "https://example.com/fork.git");
        git.set_config("branch.main.remote", "fork");

        let res = service
            .publish_branch(&ctx(), repo(), &PublishBranchRequest::default())
            .await;
        assert!(res.success, "{res:?}");
        assert_eq!(res.remote, "fork");
    }

    #[tokio::test]
    async fn publish_refuses_other_branch() {
        let (git, service) = setup();
        git.add_branch("topic");
        let res = service
            .publish_branch(
                &ctx(),
                repo(),
                &PublishBranchRequest {
                    branch: Some("topic".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(!res.success);
        assert!(res.validation_errors[0].contains("current branch"));
        assert!(!git.was_called(FakeOp::Push));
    }

    #[tokio::test]
    async fn publish_behind_remote_warns() {
        let (git, service) = setup();
        git.set_upstream("main", "origin/main");
        git.set_divergence("main", 1, 3);

        let res = service
            .publish_branch(&ctx(), repo(), &PublishBranchRequest::default())
            .await;
        assert!(!res.success);
        let warning = res.warning.unwrap();
        assert!(warning.requires_fetch);
        assert!(warning.message.contains("3 commit(s) behind"));
        assert!(!git.was_called(FakeOp::Push));
    }

    #[tokio::test]
    async fn publish_push_failure_is_reported() {
        let (git, service) = setup();
        git.set_upstream("main", "origin/main");
        git.advance("main", 1);
        git.set_fail_on(FailOn::stderr(FakeOp::Push, "remote: permission denied"));

        let res = service
            .publish_branch(&ctx(), repo(), &PublishBranchRequest::default())
            .await;
        assert!(!res.success);
        assert!(!res.set_upstream);
        assert_eq!(res.error.as_deref(), Some("remote: permission denied"));
    }
}

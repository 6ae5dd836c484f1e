//! server::handlers
//!
//! One handler per endpoint. Each handler resolves the repository root,
//! decodes the request, delegates to [`GitService`](crate::service::GitService)
//! and, for mutations, records an audit entry on a detached task.

use std::path::PathBuf;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::ApiError;
use super::state::{AppState, OperationClass};
use crate::audit::{self, AuditEntry, AuditOperation, AuditQuery, AuditQueryResponse};
use crate::core::paths::sanitize_paths;
use crate::core::types::RepoStatus;
use crate::git::diff::DiffResponse;
use crate::git::RunContext;
use crate::sandbox::ApprovedChangesResponse;
use crate::service::{
    BranchCreateResponse, BranchList, BranchPublishResponse, BranchSwitchResponse, CommitRequest,
    CommitResponse, CreateBranchRequest, DiffRequest, DiscardRequest, DiscardResponse,
    IgnoreRequest, IgnoreResponse, PublishBranchRequest, PullRequest, PullResponse, PushRequest,
    PushResponse, StageRequest, StageResponse, SwitchBranchRequest, SyncStatusRequest,
    SyncStatusResponse, UnstageRequest, UnstageResponse,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "git-control-tower";

async fn repo_root(state: &AppState, ctx: &RunContext) -> Result<PathBuf, ApiError> {
    Ok(PathBuf::from(state.service.repo_root(ctx).await?))
}

fn audit(state: &AppState, entry: AuditEntry) {
    audit::record(state.audit.clone(), entry);
}

/// Collapse error lists into one audit message.
fn joined(errors: &[String]) -> Option<String> {
    (!errors.is_empty()).then(|| errors.join("; "))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub readiness: bool,
    pub dependencies: serde_json::Value,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let ctx = state.context(OperationClass::Read);
    let root = state.service.repo_root(&ctx).await.ok();
    let ready = root.is_some();

    Json(HealthResponse {
        status: if ready { "healthy" } else { "degraded" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        readiness: ready,
        dependencies: json!({
            "git": { "connected": ready, "repo_root": root },
            "audit": { "configured": state.audit.is_configured() },
            "workspace_sandbox": {
                "configured": state.sandbox.is_configured(),
                "url": state.sandbox.base_url(),
            },
        }),
    })
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub async fn status(State(state): State<AppState>) -> ApiResult<RepoStatus> {
    let ctx = state.context(OperationClass::Read);
    let repo = repo_root(&state, &ctx).await?;
    Ok(Json(state.service.status(&ctx, &repo).await?))
}

pub async fn diff(
    State(state): State<AppState>,
    query: Result<Query<DiffRequest>, QueryRejection>,
) -> ApiResult<DiffResponse> {
    let Query(req) = query?;
    let ctx = state.context(OperationClass::Read);
    let repo = repo_root(&state, &ctx).await?;
    Ok(Json(state.service.diff(&ctx, &repo, &req).await?))
}

pub async fn branches(State(state): State<AppState>) -> ApiResult<BranchList> {
    let ctx = state.context(OperationClass::Read);
    let repo = repo_root(&state, &ctx).await?;
    Ok(Json(state.service.list_branches(&ctx, &repo).await?))
}

pub async fn sync_status(
    State(state): State<AppState>,
    query: Result<Query<SyncStatusRequest>, QueryRejection>,
) -> ApiResult<SyncStatusResponse> {
    let Query(req) = query?;
    let class = if req.fetch {
        OperationClass::Network
    } else {
        OperationClass::Read
    };
    let ctx = state.context(class);
    let repo = repo_root(&state, &ctx).await?;
    Ok(Json(state.service.sync_status(&ctx, &repo, &req).await?))
}

pub async fn audit_log(
    State(state): State<AppState>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<AuditQueryResponse> {
    let Query(query) = query?;
    Ok(Json(state.audit.query(&query).await?))
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

pub async fn stage(
    State(state): State<AppState>,
    body: Result<Json<StageRequest>, JsonRejection>,
) -> ApiResult<StageResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Mutation);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.stage(&ctx, &repo, &req).await;

    let mut errors = res.validation_errors.clone();
    errors.extend(res.errors.iter().cloned());
    audit(
        &state,
        AuditEntry::new(AuditOperation::Stage, repo.display().to_string())
            .paths(if res.success { res.staged.clone() } else { res.failed.clone() })
            .outcome(res.success, joined(&errors))
            .metadata(json!({ "scope": req.scope })),
    );
    Ok(Json(res))
}

pub async fn unstage(
    State(state): State<AppState>,
    body: Result<Json<UnstageRequest>, JsonRejection>,
) -> ApiResult<UnstageResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Mutation);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.unstage(&ctx, &repo, &req).await;

    let mut errors = res.validation_errors.clone();
    errors.extend(res.errors.iter().cloned());
    audit(
        &state,
        AuditEntry::new(AuditOperation::Unstage, repo.display().to_string())
            .paths(if res.success { res.unstaged.clone() } else { res.failed.clone() })
            .outcome(res.success, joined(&errors))
            .metadata(json!({ "scope": req.scope })),
    );
    Ok(Json(res))
}

pub async fn discard(
    State(state): State<AppState>,
    body: Result<Json<DiscardRequest>, JsonRejection>,
) -> ApiResult<DiscardResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Mutation);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.discard(&ctx, &repo, &req).await;

    let mut errors = res.validation_errors.clone();
    errors.extend(res.errors.iter().cloned());
    audit(
        &state,
        AuditEntry::new(AuditOperation::Discard, repo.display().to_string())
            .paths(if res.success { res.discarded.clone() } else { res.failed.clone() })
            .outcome(res.success, joined(&errors))
            .metadata(json!({ "untracked": req.untracked })),
    );
    Ok(Json(res))
}

pub async fn ignore(
    State(state): State<AppState>,
    body: Result<Json<IgnoreRequest>, JsonRejection>,
) -> ApiResult<IgnoreResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Mutation);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.ignore(&ctx, &repo, &req).await;

    let error = res.error.clone().or_else(|| joined(&res.validation_errors));
    audit(
        &state,
        AuditEntry::new(AuditOperation::Ignore, repo.display().to_string())
            .paths(vec![res.path.clone()])
            .outcome(res.success, error)
            .metadata(json!({
                "gitignore": res.gitignore,
                "entry": res.entry,
                "already_present": res.already_present,
            })),
    );
    Ok(Json(res))
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

pub async fn commit(
    State(state): State<AppState>,
    body: Result<Json<CommitRequest>, JsonRejection>,
) -> ApiResult<CommitResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Mutation);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.commit(&ctx, &repo, &req).await;

    let error = res.error.clone().or_else(|| joined(&res.validation_errors));
    audit(
        &state,
        AuditEntry::new(AuditOperation::Commit, repo.display().to_string())
            .commit(res.hash.clone(), res.message.clone())
            .outcome(res.success, error)
            .metadata(json!({ "validate_conventional": req.validate_conventional })),
    );
    Ok(Json(res))
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

pub async fn create_branch(
    State(state): State<AppState>,
    body: Result<Json<CreateBranchRequest>, JsonRejection>,
) -> ApiResult<BranchCreateResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Mutation);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.create_branch(&ctx, &repo, &req).await;

    let error = res
        .error
        .clone()
        .or_else(|| res.warning.as_ref().map(|w| w.message.clone()))
        .or_else(|| joined(&res.validation_errors));
    audit(
        &state,
        AuditEntry::new(AuditOperation::BranchCreate, repo.display().to_string())
            .branch(req.name.trim())
            .outcome(res.success, error)
            .metadata(json!({ "from": req.from, "checkout": req.checkout })),
    );
    Ok(Json(res))
}

pub async fn switch_branch(
    State(state): State<AppState>,
    body: Result<Json<SwitchBranchRequest>, JsonRejection>,
) -> ApiResult<BranchSwitchResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Mutation);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.switch_branch(&ctx, &repo, &req).await;

    let branch = res
        .branch
        .as_ref()
        .map(|b| b.name.clone())
        .unwrap_or_else(|| req.name.trim().to_string());
    let error = res
        .error
        .clone()
        .or_else(|| res.warning.as_ref().map(|w| w.message.clone()))
        .or_else(|| joined(&res.validation_errors));
    audit(
        &state,
        AuditEntry::new(AuditOperation::BranchSwitch, repo.display().to_string())
            .branch(branch)
            .outcome(res.success, error)
            .metadata(json!({
                "previous": res.previous,
                "created_tracking": res.created_tracking,
            })),
    );
    Ok(Json(res))
}

pub async fn publish_branch(
    State(state): State<AppState>,
    body: Result<Json<PublishBranchRequest>, JsonRejection>,
) -> ApiResult<BranchPublishResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Network);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.publish_branch(&ctx, &repo, &req).await;

    let error = res
        .error
        .clone()
        .or_else(|| res.warning.as_ref().map(|w| w.message.clone()))
        .or_else(|| joined(&res.validation_errors));
    audit(
        &state,
        AuditEntry::new(AuditOperation::BranchPublish, repo.display().to_string())
            .branch(res.branch.clone())
            .outcome(res.success, error)
            .metadata(json!({ "remote": res.remote, "set_upstream": res.set_upstream })),
    );
    Ok(Json(res))
}

// ---------------------------------------------------------------------------
// Remote sync
// ---------------------------------------------------------------------------

pub async fn push(
    State(state): State<AppState>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> ApiResult<PushResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Network);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.push(&ctx, &repo, &req).await;

    audit(
        &state,
        AuditEntry::new(AuditOperation::Push, repo.display().to_string())
            .branch(res.branch.clone())
            .outcome(res.success, res.error.clone())
            .metadata(json!({
                "remote": res.remote,
                "head_oid": res.head_oid,
                "pushed": res.pushed,
                "up_to_date": res.up_to_date,
                "verified": res.verified,
                "verification_error": res.verification_error,
            })),
    );
    Ok(Json(res))
}

pub async fn pull(
    State(state): State<AppState>,
    body: Result<Json<PullRequest>, JsonRejection>,
) -> ApiResult<PullResponse> {
    let Json(req) = body?;
    let ctx = state.context(OperationClass::Network);
    let repo = repo_root(&state, &ctx).await?;
    let res = state.service.pull(&ctx, &repo, &req).await;

    audit(
        &state,
        AuditEntry::new(AuditOperation::Pull, repo.display().to_string())
            .branch(res.branch.clone())
            .paths(res.conflicts.clone())
            .outcome(res.success, res.error.clone())
            .metadata(json!({ "remote": res.remote, "has_conflicts": res.has_conflicts })),
    );
    Ok(Json(res))
}

// ---------------------------------------------------------------------------
// Workspace sandbox
// ---------------------------------------------------------------------------

/// Body of `POST /approved-changes/preview`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApprovedChangesPreviewRequest {
    pub paths: Vec<String>,
}

pub async fn approved_changes(State(state): State<AppState>) -> ApiResult<ApprovedChangesResponse> {
    let ctx = state.context(OperationClass::Read);
    let repo = repo_root(&state, &ctx).await?;
    Ok(Json(
        state
            .sandbox
            .approved_changes(&repo.display().to_string(), &[])
            .await,
    ))
}

pub async fn approved_changes_preview(
    State(state): State<AppState>,
    body: Result<Json<ApprovedChangesPreviewRequest>, JsonRejection>,
) -> ApiResult<ApprovedChangesResponse> {
    let Json(req) = body?;
    let sanitized = sanitize_paths(&req.paths);
    if !sanitized.rejected.is_empty() {
        return Err(ApiError::BadRequest(sanitized.rejection_messages().join("; ")));
    }
    let ctx = state.context(OperationClass::Read);
    let repo = repo_root(&state, &ctx).await?;
    Ok(Json(
        state
            .sandbox
            .approved_changes(&repo.display().to_string(), &sanitized.accepted)
            .await,
    ))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("no such endpoint".to_string())
}

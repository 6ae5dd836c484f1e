//! service::staging
//!
//! Stage, unstage and discard paths.
//!
//! Every path goes through [`sanitize_paths`]; paths that escape the
//! repository are rejected with a validation error and never reach git.
//! Stage and unstage accept a `scope` label (`scenario:X`) in place of
//! explicit paths.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::GitService;
use crate::core::paths::{expand_scope, sanitize_paths, sanitize_subpaths, SanitizedPaths};
use crate::git::{GitRunnerError, RunContext};

/// Stage request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StageRequest {
    pub paths: Vec<String>,
    pub scope: Option<String>,
}

/// Unstage request.
pub type UnstageRequest = StageRequest;

/// Stage outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResponse {
    pub success: bool,
    pub staged: Vec<String>,
    pub failed: Vec<String>,
    pub errors: Vec<String>,
    pub validation_errors: Vec<String>,
}

/// Unstage outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstageResponse {
    pub success: bool,
    pub unstaged: Vec<String>,
    pub failed: Vec<String>,
    pub errors: Vec<String>,
    pub validation_errors: Vec<String>,
}

/// Discard request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscardRequest {
    pub paths: Vec<String>,
    /// Remove untracked files instead of reverting tracked ones
    pub untracked: bool,
}

/// Discard outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardResponse {
    pub success: bool,
    pub untracked: bool,
    pub discarded: Vec<String>,
    pub failed: Vec<String>,
    pub errors: Vec<String>,
    pub validation_errors: Vec<String>,
}

/// Shared outcome of a path-list operation before it is shaped into a
/// response type.
#[derive(Debug, Default)]
struct PathOutcome {
    success: bool,
    applied: Vec<String>,
    failed: Vec<String>,
    errors: Vec<String>,
    validation_errors: Vec<String>,
}

/// Resolve explicit paths or a scope into sanitized paths.
fn resolve_targets(req: &StageRequest) -> Result<SanitizedPaths, String> {
    if req.paths.iter().all(|p| p.trim().is_empty()) {
        return match req.scope.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(scope) => expand_scope(scope)
                .map(|prefix| sanitize_paths(&[prefix]))
                .map_err(|e| e.to_string()),
            None => Err("no paths or scope provided".to_string()),
        };
    }
    Ok(sanitize_paths(&req.paths))
}

impl PathOutcome {
    fn invalid(message: String) -> Self {
        Self {
            validation_errors: vec![message],
            ..Default::default()
        }
    }

    fn from_run(targets: SanitizedPaths, result: Result<(), GitRunnerError>) -> Self {
        let mut outcome = PathOutcome {
            validation_errors: targets.rejection_messages(),
            failed: targets.rejected.iter().map(|r| r.path.clone()).collect(),
            ..Default::default()
        };
        match result {
            Ok(()) => {
                outcome.success = outcome.validation_errors.is_empty();
                outcome.applied = targets.accepted;
            }
            Err(e) => {
                outcome.failed.extend(targets.accepted);
                outcome.errors.push(e.detail());
            }
        }
        outcome
    }
}

impl GitService {
    /// Add paths (or a scope) to the index.
    pub async fn stage(&self, ctx: &RunContext, repo: &Path, req: &StageRequest) -> StageResponse {
        let outcome = match resolve_targets(req) {
            Err(message) => PathOutcome::invalid(message),
            Ok(targets) if targets.accepted.is_empty() => PathOutcome::from_run(targets, Ok(())),
            Ok(targets) => {
                let result = self.runner.stage(ctx, repo, &targets.accepted).await;
                PathOutcome::from_run(targets, result)
            }
        };
        StageResponse {
            success: outcome.success && !outcome.applied.is_empty(),
            staged: outcome.applied,
            failed: outcome.failed,
            errors: outcome.errors,
            validation_errors: outcome.validation_errors,
        }
    }

    /// Remove paths (or a scope) from the index, keeping working-tree edits.
    pub async fn unstage(
        &self,
        ctx: &RunContext,
        repo: &Path,
        req: &UnstageRequest,
    ) -> UnstageResponse {
        let outcome = match resolve_targets(req) {
            Err(message) => PathOutcome::invalid(message),
            Ok(targets) if targets.accepted.is_empty() => PathOutcome::from_run(targets, Ok(())),
            Ok(targets) => {
                let result = self.runner.unstage(ctx, repo, &targets.accepted).await;
                PathOutcome::from_run(targets, result)
            }
        };
        UnstageResponse {
            success: outcome.success && !outcome.applied.is_empty(),
            unstaged: outcome.applied,
            failed: outcome.failed,
            errors: outcome.errors,
            validation_errors: outcome.validation_errors,
        }
    }

    /// Throw away changes. An empty path list is a successful no-op.
    pub async fn discard(
        &self,
        ctx: &RunContext,
        repo: &Path,
        req: &DiscardRequest,
    ) -> DiscardResponse {
        let targets = sanitize_subpaths(&req.paths);
        let outcome = if targets.accepted.is_empty() {
            PathOutcome::from_run(targets, Ok(()))
        } else {
            let result = self
                .runner
                .discard(ctx, repo, &targets.accepted, req.untracked)
                .await;
            PathOutcome::from_run(targets, result)
        };
        DiscardResponse {
            success: outcome.success,
            untracked: req.untracked,
            discarded: outcome.applied,
            failed: outcome.failed,
            errors: outcome.errors,
            validation_errors: outcome.validation_errors,
        }
    }
}

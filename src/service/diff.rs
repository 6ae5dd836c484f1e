//! service::diff
//!
//! Working-tree or index diff, parsed into hunks.

use std::path::Path;

use serde::Deserialize;

use super::{non_empty, GitService, ServiceError};
use crate::core::paths::sanitize_paths;
use crate::git::diff::{annotate_diff, parse_unified_diff, DiffResponse};
use crate::git::RunContext;

/// Diff request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiffRequest {
    /// Limit to one path; `None` diffs the whole tree
    pub path: Option<String>,
    /// Diff the index against HEAD instead of the working tree
    pub staged: bool,
    /// Include per-line annotations
    pub annotate: bool,
}

impl GitService {
    /// Read and parse a diff.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidRequest`] when the path fails hygiene checks,
    /// [`ServiceError::Runner`] when git fails.
    pub async fn diff(
        &self,
        ctx: &RunContext,
        repo: &Path,
        req: &DiffRequest,
    ) -> Result<DiffResponse, ServiceError> {
        super::require_repo(repo)?;

        let path = match non_empty(req.path.as_deref()) {
            None => None,
            Some(raw) => {
                let sanitized = sanitize_paths(&[raw.to_string()]);
                match sanitized.accepted.first().cloned() {
                    Some(path) => Some(path),
                    None => {
                        return Err(ServiceError::InvalidRequest(
                            sanitized.rejection_messages().join("; "),
                        ))
                    }
                }
            }
        };

        let raw = self
            .runner
            .diff(ctx, repo, path.as_deref(), req.staged)
            .await?;
        let raw = String::from_utf8_lossy(&raw);

        let mut response = parse_unified_diff(&raw);
        if req.annotate && response.has_diff {
            response.annotated = Some(annotate_diff(&raw));
        }
        Ok(response)
    }
}

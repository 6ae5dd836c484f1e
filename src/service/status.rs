//! service::status
//!
//! Repository snapshot: runner status, porcelain parse, then sorting,
//! summary and scope attribution. Snapshots are never cached.

use std::path::Path;

use chrono::Utc;

use super::{require_repo, GitService, ServiceError};
use crate::core::types::RepoStatus;
use crate::git::{parse_porcelain_v2, RunContext};

impl GitService {
    /// Read a fresh [`RepoStatus`] for `repo`.
    ///
    /// # Errors
    ///
    /// Fails when `repo` is empty or the runner fails.
    pub async fn status(&self, ctx: &RunContext, repo: &Path) -> Result<RepoStatus, ServiceError> {
        require_repo(repo)?;
        let raw = self.runner.status_porcelain_v2(ctx, repo).await?;

        let mut status = parse_porcelain_v2(&raw);
        if !status.unparsed.is_empty() {
            tracing::debug!(
                repo = %repo.display(),
                records = status.unparsed.len(),
                "unrecognised porcelain records"
            );
        }
        status.normalize();
        status.repo_dir = repo.display().to_string();
        status.timestamp = Utc::now();
        Ok(status)
    }
}

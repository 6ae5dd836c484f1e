//! service::commit
//!
//! Commit the index, optionally enforcing conventional-commit headers.
//!
//! All validation runs before the runner is asked to commit: message,
//! conventional header, author pair, and finally a status read that
//! rejects an empty index.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{non_empty, GitService};
use crate::core::conventional::validate_conventional;
use crate::git::{CommitAuthor, RunContext};

/// Commit request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitRequest {
    pub message: String,
    pub validate_conventional: bool,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

/// Commit outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    pub success: bool,
    /// Short OID of the new commit; empty when it could not be resolved
    pub hash: String,
    pub message: String,
    pub validation_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommitRequest {
    fn validate(&self) -> Result<Option<CommitAuthor>, Vec<String>> {
        let mut errors = Vec::new();

        if self.message.trim().is_empty() {
            errors.push("commit message cannot be empty".to_string());
        } else if self.validate_conventional {
            if let Err(e) = validate_conventional(&self.message) {
                errors.push(e);
            }
        }

        let author = match (
            non_empty(self.author_name.as_deref()),
            non_empty(self.author_email.as_deref()),
        ) {
            (Some(name), Some(email)) => Some(CommitAuthor {
                name: name.to_string(),
                email: email.to_string(),
            }),
            (None, None) => None,
            _ => {
                errors.push("author_name and author_email must be provided together".to_string());
                None
            }
        };

        if errors.is_empty() {
            Ok(author)
        } else {
            Err(errors)
        }
    }
}

impl GitService {
    /// Commit staged changes.
    pub async fn commit(&self, ctx: &RunContext, repo: &Path, req: &CommitRequest) -> CommitResponse {
        let mut response = CommitResponse {
            message: req.message.clone(),
            ..Default::default()
        };

        let author = match req.validate() {
            Ok(author) => author,
            Err(errors) => {
                response.validation_errors = errors;
                return response;
            }
        };

        match self.status(ctx, repo).await {
            Ok(status) if status.summary.staged == 0 => {
                response
                    .validation_errors
                    .push("no staged changes to commit".to_string());
                return response;
            }
            Ok(_) => {}
            Err(e) => {
                response.error = Some(e.to_string());
                return response;
            }
        }

        match self
            .runner
            .commit(ctx, repo, &req.message, author.as_ref())
            .await
        {
            Ok(hash) => {
                tracing::info!(hash = %hash, "committed");
                response.success = true;
                response.hash = hash;
            }
            Err(e) => response.error = Some(e.detail()),
        }
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

    fn setup() -> (FakeGitRunner, GitService) {
        let git = FakeGitRunner::new("/repo");
        let service = GitService::new(Arc::new(git.clone()));
        (git, service)
    }

    fn request(message: &str, conventional: bool) -> CommitRequest {
        CommitRequest {
            message: message.to_string(),
            validate_conventional: conventional,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn conventional_message_commits() {
        let (git, service) = setup();
        git.add_file("api.rs", FakeChange::Staged);

        let res = service
            .commit(&ctx(), Path::new("/repo"), &request("feat(api): add endpoint", true))
            .await;
        assert!(res.success, "{res:?}");
        assert!(res.hash.len() >= 7);
        assert_eq!(res.message, "feat(api): add endpoint");
        assert!(git.file("api.rs").is_none());
    }

    #[tokio::test]
    async fn non_conventional_message_rejected_before_runner() {
        let (git, service) = setup();
        git.add_file("api.rs", FakeChange::Staged);

        let res = service
            .commit(&ctx(), Path::new("/repo"), &request("add feature", true))
            .await;
        assert!(!res.success);
        assert!(!res.validation_errors.is_empty());
        assert!(!git.was_called(FakeOp::Commit));
        assert!(!git.was_called(FakeOp::Status));
    }

    #[tokio::test]
    async fn free_form_message_allowed_without_validation() {
        let (git, service) = setup();
        git.add_file("notes.md", FakeChange::Staged);
        let res = service
            .commit(&ctx(), Path::new("/repo"), &request("add feature", false))
            .await;
        assert!(res.success);
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let (git, service) = setup();
        let res = service
            .commit(&ctx(), Path::new("/repo"), &request("   ", false))
            .await;
        assert_eq!(res.validation_errors, vec!["commit message cannot be empty"]);
        assert!(!git.was_called(FakeOp::Commit));
    }

    #[tokio::test]
    async fn empty_index_rejected() {
        let (git, service) = setup();
        git.add_file("wip.rs", FakeChange::Unstaged);
        let res = service
            .commit(&ctx(), Path::new("/repo"), &request("fix: typo", true))
            .await;
        assert!(!res.success);
        assert_eq!(res.validation_errors, vec!["no staged changes to commit"]);
        assert!(!git.was_called(FakeOp::Commit));
    }

    #[tokio::test]
    async fn author_override_requires_both_fields() {
        let (git, service) = setup();
        git.add_file("a.rs", FakeChange::Staged);

        let mut req = request("chore: bump", true);
        req.author_name = Some("Bot".into());
        let res = service.commit(&ctx(), Path::new("/repo"), &req).await;
        assert!(!res.success);
        assert!(res.validation_errors[0].contains("together"));

        req.author_email = Some("bot@example.com".into());
        let res = service.commit(&ctx(), Path::new("/repo"), &req).await;
        assert!(res.success, "{res:?}");
        assert_eq!(
            git.calls_to(FakeOp::Commit)[0].args,
            vec!["chore: bump", "Bot <bot@example.com>"]
        );
    }

    #[tokio::test]
    async fn runner_failure_surfaces_stderr() {
        let (git, service) = setup();
        git.add_file("a.rs", FakeChange::Staged);
        git.set_fail_on(FailOn::stderr(FakeOp::Commit, "error: pre-commit hook failed"));
        let res = service
            .commit(&ctx(), Path::new("/repo"), &request("fix: a", false))
            .await;
        assert!(!res.success);
        assert_eq!(res.error.as_deref(), Some("error: pre-commit hook failed"));
    }
}

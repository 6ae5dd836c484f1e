//! sandbox
//!
//! Client for the workspace-sandbox commit preview.
//!
//! The workspace-sandbox service tracks which changed files belong to
//! approved sandboxes. It is discovered from configuration
//! (`WORKSPACE_SANDBOX_URL`, or `WORKSPACE_SANDBOX_API_PORT` on
//! localhost). Its API speaks camelCase JSON:
//!
//! ```text
//! GET  /api/v1/commit-preview?projectRoot=<root>
//! POST /api/v1/commit-preview   {"projectRoot": "...", "filePaths": ["..."]}
//! ```
//!
//! Unavailability never fails a caller: [`WorkspaceSandboxClient::approved_changes`]
//! folds every error into `available: false` with a warning.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deadline for each call to the workspace-sandbox service.
pub const SANDBOX_TIMEOUT: Duration = Duration::from_secs(5);

const COMMIT_PREVIEW_PATH: &str = "/api/v1/commit-preview";

/// Errors talking to the workspace-sandbox service.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("workspace-sandbox service is not configured")]
    NotConfigured,

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("workspace-sandbox request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("workspace-sandbox returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// One file in a commit preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewFile {
    pub file_path: String,
    pub relative_path: String,
    pub change_type: String,
    pub sandbox_id: String,
    pub sandbox_owner: String,
    pub status: String,
}

/// Commit preview as returned by the workspace-sandbox service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitPreview {
    pub files: Vec<PreviewFile>,
    pub committable_files: u32,
    pub suggested_message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitPreviewRequest<'a> {
    project_root: &'a str,
    file_paths: &'a [String],
}

/// Approved changes as exposed by this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedChangesResponse {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub files: Vec<PreviewFile>,
    pub committable_files: u32,
    pub suggested_message: String,
    pub timestamp: DateTime<Utc>,
}

impl ApprovedChangesResponse {
    fn available(preview: CommitPreview) -> Self {
        Self {
            available: true,
            warning: None,
            files: preview.files,
            committable_files: preview.committable_files,
            suggested_message: preview.suggested_message,
            timestamp: Utc::now(),
        }
    }

    fn unavailable(warning: String) -> Self {
        Self {
            available: false,
            warning: Some(warning),
            files: Vec::new(),
            committable_files: 0,
            suggested_message: String::new(),
            timestamp: Utc::now(),
        }
    }
}

/// HTTP client for the workspace-sandbox API.
#[derive(Debug, Clone)]
pub struct WorkspaceSandboxClient {
    client: Client,
    base_url: Option<String>,
}

impl WorkspaceSandboxClient {
    /// Client for `base_url`; `None` yields a client that reports itself unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Client`] if the HTTP client cannot be built.
    pub fn new(base_url: Option<String>) -> Result<Self, SandboxError> {
        let client = Client::builder()
            .timeout(SANDBOX_TIMEOUT)
            .build()
            .map_err(|e| SandboxError::Client(e.to_string()))?;
        let base_url = base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Ok(Self { client, base_url })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn endpoint(&self) -> Result<String, SandboxError> {
        self.base_url
            .as_deref()
            .map(|base| format!("{base}{COMMIT_PREVIEW_PATH}"))
            .ok_or(SandboxError::NotConfigured)
    }

    /// Fetch the commit preview for a project, optionally limited to `file_paths`.
    ///
    /// An empty `file_paths` uses `GET`; otherwise the filter is posted.
    ///
    /// # Errors
    ///
    /// Fails when the service is not configured, unreachable, or answers
    /// with a non-success status or an undecodable body.
    pub async fn commit_preview(
        &self,
        project_root: &str,
        file_paths: &[String],
    ) -> Result<CommitPreview, SandboxError> {
        let url = self.endpoint()?;
        let request = if file_paths.is_empty() {
            self.client
                .get(&url)
                .query(&[("projectRoot", project_root)])
        } else {
            self.client.post(&url).json(&CommitPreviewRequest {
                project_root,
                file_paths,
            })
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Status {
                status,
                body: body.trim().to_string(),
            });
        }
        Ok(response.json::<CommitPreview>().await?)
    }

    /// Commit preview folded into an always-successful response.
    pub async fn approved_changes(&self, project_root: &str, file_paths: &[String]) -> ApprovedChangesResponse {
        match self.commit_preview(project_root, file_paths).await {
            Ok(preview) => ApprovedChangesResponse::available(preview),
            Err(e) => {
                if !matches!(e, SandboxError::NotConfigured) {
                    tracing::warn!(error = %e, "workspace-sandbox unavailable");
                }
                ApprovedChangesResponse::unavailable(e.to_string())
            }
        }
    }
}

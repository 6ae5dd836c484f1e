//! audit
//!
//! Persistent record of repository mutations.
//!
//! # Architecture
//!
//! Outcomes are written through the [`AuditLogger`] trait, which has
//! three implementations:
//!
//! - [`SqliteAuditLogger`]: the `git_audit_log` table in an embedded SQLite database
//! - [`MemoryAuditLogger`]: in-process store used by tests
//! - [`NoopAuditLogger`]: used when no audit database is configured
//!
//! Handlers never wait on the store. [`record`] hands the entry to a
//! detached task with its own deadline; failures are logged and dropped.
//!
//! # Example
//!
//! ```
//! use git_control_tower::audit::{AuditEntry, AuditLogger, AuditOperation, AuditQuery, MemoryAuditLogger};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let logger = MemoryAuditLogger::new();
//! logger.log(AuditEntry::new(AuditOperation::Stage, "/repo")).await.unwrap();
//!
//! let page = logger.query(&AuditQuery::default()).await.unwrap();
//! assert_eq!(page.total, 1);
//! assert_eq!(page.entries[0].id, Some(1));
//! # });
//! ```

mod memory;
mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

pub use memory::MemoryAuditLogger;
pub use sqlite::SqliteAuditLogger;

/// Deadline for a detached audit write.
pub const AUDIT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default page size for audit queries.
pub const DEFAULT_QUERY_LIMIT: u32 = 50;

/// Largest page size a query may request.
pub const MAX_QUERY_LIMIT: u32 = 500;

/// Audited mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Stage,
    Unstage,
    Commit,
    Discard,
    Ignore,
    Push,
    Pull,
    BranchCreate,
    BranchSwitch,
    BranchPublish,
}

impl AuditOperation {
    pub const ALL: [AuditOperation; 10] = [
        AuditOperation::Stage,
        AuditOperation::Unstage,
        AuditOperation::Commit,
        AuditOperation::Discard,
        AuditOperation::Ignore,
        AuditOperation::Push,
        AuditOperation::Pull,
        AuditOperation::BranchCreate,
        AuditOperation::BranchSwitch,
        AuditOperation::BranchPublish,
    ];

    /// Stored tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Stage => "stage",
            AuditOperation::Unstage => "unstage",
            AuditOperation::Commit => "commit",
            AuditOperation::Discard => "discard",
            AuditOperation::Ignore => "ignore",
            AuditOperation::Push => "push",
            AuditOperation::Pull => "pull",
            AuditOperation::BranchCreate => "branch_create",
            AuditOperation::BranchSwitch => "branch_switch",
            AuditOperation::BranchPublish => "branch_publish",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditOperation {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s.trim())
            .ok_or_else(|| AuditError::UnknownOperation(s.to_string()))
    }
}

/// One audited outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub operation: AuditOperation,
    pub repo_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Defaults to the time of writing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntry {
    /// Successful entry with no details.
    pub fn new(operation: AuditOperation, repo_dir: impl Into<String>) -> Self {
        Self {
            id: None,
            operation,
            repo_dir: repo_dir.into(),
            branch: None,
            paths: Vec::new(),
            commit_hash: None,
            commit_message: None,
            success: true,
            error: None,
            timestamp: None,
            metadata: None,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        self.branch = Some(branch).filter(|b| !b.is_empty());
        self
    }

    pub fn paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    pub fn commit(mut self, hash: impl Into<String>, message: impl Into<String>) -> Self {
        self.commit_hash = Some(hash.into()).filter(|h| !h.is_empty());
        self.commit_message = Some(message.into());
        self
    }

    /// Set the outcome; a failure without a message records `"failed"`.
    pub fn outcome(mut self, success: bool, error: Option<String>) -> Self {
        self.success = success;
        self.error = match (success, error) {
            (_, Some(e)) if !e.is_empty() => Some(e),
            (false, _) => Some("failed".to_string()),
            (true, _) => None,
        };
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Audit query filters and pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub operation: Option<AuditOperation>,
    pub branch: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditQuery {
    /// Page size after defaults and the cap.
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            None | Some(0) => DEFAULT_QUERY_LIMIT,
            Some(limit) => limit.min(MAX_QUERY_LIMIT),
        }
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Whether `entry` passes every filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        let at = entry.timestamp;
        self.operation.map_or(true, |op| op == entry.operation)
            && self
                .branch
                .as_deref()
                .map_or(true, |b| entry.branch.as_deref() == Some(b))
            && self.since.map_or(true, |since| at.is_some_and(|t| t >= since))
            && self.until.map_or(true, |until| at.is_some_and(|t| t <= until))
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditQueryResponse {
    pub entries: Vec<AuditEntry>,
    /// Matches across all pages
    pub total: u64,
    pub timestamp: DateTime<Utc>,
}

impl AuditQueryResponse {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            total: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Errors from audit storage.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit database {path}: {message}")]
    Open { path: String, message: String },

    #[error("audit database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown audit operation: {0}")]
    UnknownOperation(String),

    #[error("invalid audit timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("audit task failed: {0}")]
    Task(String),
}

/// Store for audit entries.
///
/// Implementations must be `Send + Sync`; one logger is shared by every
/// request handler.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Whether entries are actually persisted.
    fn is_configured(&self) -> bool;

    /// Persist one entry, assigning its id and default timestamp.
    async fn log(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Page through stored entries.
    async fn query(&self, query: &AuditQuery) -> Result<AuditQueryResponse, AuditError>;
}

/// Logger used when no audit database is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLogger;

#[async_trait]
impl AuditLogger for NoopAuditLogger {
    fn is_configured(&self) -> bool {
        false
    }

    async fn log(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }

    async fn query(&self, _query: &AuditQuery) -> Result<AuditQueryResponse, AuditError> {
        Ok(AuditQueryResponse::empty())
    }
}

/// Write `entry` on a detached task bounded by [`AUDIT_WRITE_TIMEOUT`].
///
/// Returns `None` when the logger is not configured.
pub fn record(logger: Arc<dyn AuditLogger>, entry: AuditEntry) -> Option<JoinHandle<()>> {
    if !logger.is_configured() {
        return None;
    }
    Some(tokio::spawn(async move {
        let operation = entry.operation;
        match tokio::time::timeout(AUDIT_WRITE_TIMEOUT, logger.log(entry)).await {
            Ok(Ok(())) => tracing::debug!(%operation, "audit entry recorded"),
            Ok(Err(e)) => tracing::warn!(%operation, error = %e, "audit write failed"),
            Err(_) => tracing::warn!(%operation, "audit write timed out"),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_tags_round_trip() {
        for op in AuditOperation::ALL {
            assert_eq!(op.as_str().parse::<AuditOperation>().unwrap(), op);
            assert_eq!(serde_json::to_value(op).unwrap(), op.as_str());
        }
        assert!("rebase".parse::<AuditOperation>().is_err());
    }

    #[test]
    fn limit_defaults_and_cap() {
        assert_eq!(AuditQuery::default().effective_limit(), 50);
        let q = AuditQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), 500);
        let q = AuditQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), 50);
    }

    #[test]
    fn failure_without_message_is_recorded() {
        let entry = AuditEntry::new(AuditOperation::Push, "/repo").outcome(false, None);
        assert_eq!(entry.error.as_deref(), Some("failed"));
        let entry = AuditEntry::new(AuditOperation::Push, "/repo").outcome(true, Some(String::new()));
        assert!(entry.error.is_none());
    }

    #[test]
    fn query_filters() {
        let mut entry = AuditEntry::new(AuditOperation::Commit, "/repo").branch("main");
        entry.timestamp = Some(Utc::now());

        assert!(AuditQuery::default().matches(&entry));
        let q = AuditQuery {
            operation: Some(AuditOperation::Push),
            ..Default::default()
        };
        assert!(!q.matches(&entry));
        let q = AuditQuery {
            branch: Some("main".into()),
            until: Some(Utc::now() + chrono::Duration::seconds(5)),
            ..Default::default()
        };
        assert!(q.matches(&entry));
    }

    #[tokio::test]
    async fn record_skips_unconfigured_logger() {
        assert!(record(Arc::new(NoopAuditLogger), AuditEntry::new(AuditOperation::Stage, "/r")).is_none());

        let memory = MemoryAuditLogger::new();
        let handle = record(
            Arc::new(memory.clone()),
            AuditEntry::new(AuditOperation::Stage, "/r"),
        )
        .unwrap();
        handle.await.unwrap();
        assert_eq!(memory.entries().len(), 1);
    }
}

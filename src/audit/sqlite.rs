//! audit::sqlite
//!
//! SQLite-backed audit store.
//!
//! # Schema
//!
//! ```text
//! git_audit_log(
//!     id             INTEGER PRIMARY KEY AUTOINCREMENT,
//!     operation      TEXT NOT NULL,
//!     repo_dir       TEXT NOT NULL,
//!     branch         TEXT,
//!     paths          TEXT NOT NULL,   -- JSON array
//!     commit_hash    TEXT,
//!     commit_message TEXT,
//!     success        INTEGER NOT NULL,
//!     error_message  TEXT,
//!     created_at     TEXT NOT NULL,   -- RFC 3339, UTC, microseconds
//!     metadata       TEXT             -- JSON object
//! )
//! ```
//!
//! `created_at` uses a fixed-width UTC format so string comparison orders
//! chronologically. Every call runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection};

use super::{AuditEntry, AuditError, AuditLogger, AuditQuery, AuditQueryResponse};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS git_audit_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    operation      TEXT NOT NULL,
    repo_dir       TEXT NOT NULL,
    branch         TEXT,
    paths          TEXT NOT NULL DEFAULT '[]',
    commit_hash    TEXT,
    commit_message TEXT,
    success        INTEGER NOT NULL,
    error_message  TEXT,
    created_at     TEXT NOT NULL,
    metadata       TEXT
);
CREATE INDEX IF NOT EXISTS idx_git_audit_log_created_at ON git_audit_log (created_at);
CREATE INDEX IF NOT EXISTS idx_git_audit_log_operation ON git_audit_log (operation);
";

const COLUMNS: &str = "id, operation, repo_dir, branch, paths, commit_hash, commit_message, \
                       success, error_message, created_at, metadata";

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Row as stored, before JSON and timestamp decoding.
struct StoredRow {
    id: i64,
    operation: String,
    repo_dir: String,
    branch: Option<String>,
    paths: String,
    commit_hash: Option<String>,
    commit_message: Option<String>,
    success: bool,
    error_message: Option<String>,
    created_at: String,
    metadata: Option<String>,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            operation: row.get(1)?,
            repo_dir: row.get(2)?,
            branch: row.get(3)?,
            paths: row.get(4)?,
            commit_hash: row.get(5)?,
            commit_message: row.get(6)?,
            success: row.get(7)?,
            error_message: row.get(8)?,
            created_at: row.get(9)?,
            metadata: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<AuditEntry, AuditError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| AuditError::InvalidTimestamp(self.created_at.clone()))?
            .with_timezone(&Utc);
        Ok(AuditEntry {
            id: Some(self.id),
            operation: self.operation.parse()?,
            repo_dir: self.repo_dir,
            branch: self.branch,
            paths: serde_json::from_str(&self.paths)?,
            commit_hash: self.commit_hash,
            commit_message: self.commit_message,
            success: self.success,
            error: self.error_message,
            timestamp: Some(timestamp),
            metadata: self
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        })
    }
}

/// Audit logger over a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteAuditLogger {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteAuditLogger {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Open`] when the file cannot be opened and
    /// [`AuditError::Database`] when the schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |message: String| AuditError::Open {
            path: path.display().to_string(),
            message,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_error(e.to_string()))?;
        }
        let conn = Connection::open(&path).map_err(|e| open_error(e.to_string()))?;
        Self::with_connection(conn, path)
    }

    /// Database that lives only as long as the logger.
    pub fn open_in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, path: PathBuf) -> Result<Self, AuditError> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "audit database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, AuditError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AuditError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard: MutexGuard<'_, Connection> =
                conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| AuditError::Task(e.to_string()))?
    }
}

fn insert(conn: &Connection, entry: &AuditEntry) -> Result<(), AuditError> {
    let paths = serde_json::to_string(&entry.paths)?;
    let metadata = entry
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let created_at = format_timestamp(entry.timestamp.unwrap_or_else(Utc::now));

    conn.execute(
        "INSERT INTO git_audit_log (operation, repo_dir, branch, paths, commit_hash, \
         commit_message, success, error_message, created_at, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.operation.as_str(),
            entry.repo_dir,
            entry.branch,
            paths,
            entry.commit_hash,
            entry.commit_message,
            entry.success,
            entry.error,
            created_at,
            metadata,
        ],
    )?;
    Ok(())
}

/// `WHERE` clause and its bound values for a query's filters.
fn filter_clause(query: &AuditQuery) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(op) = query.operation {
        values.push(op.as_str().to_string());
        conditions.push(format!("operation = ?{}", values.len()));
    }
    if let Some(branch) = query.branch.as_deref().filter(|b| !b.is_empty()) {
        values.push(branch.to_string());
        conditions.push(format!("branch = ?{}", values.len()));
    }
    if let Some(since) = query.since {
        values.push(format_timestamp(since));
        conditions.push(format!("created_at >= ?{}", values.len()));
    }
    if let Some(until) = query.until {
        values.push(format_timestamp(until));
        conditions.push(format!("created_at <= ?{}", values.len()));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, values)
}

fn select(conn: &Connection, query: &AuditQuery) -> Result<AuditQueryResponse, AuditError> {
    let (clause, values) = filter_clause(query);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM git_audit_log{clause}"),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {COLUMNS} FROM git_audit_log{clause} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
        query.effective_limit(),
        query.effective_offset()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), StoredRow::from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?.into_entry()?);
    }

    Ok(AuditQueryResponse {
        entries,
        total: u64::try_from(total).unwrap_or_default(),
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl AuditLogger for SqliteAuditLogger {
    fn is_configured(&self) -> bool {
        true
    }

    async fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.with_conn(move |conn| insert(conn, &entry)).await
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditQueryResponse, AuditError> {
        let query = query.clone();
        self.with_conn(move |conn| select(conn, &query)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditOperation;

    #[tokio::test]
    async fn insert_and_read_back() {
        let logger = SqliteAuditLogger::open_in_memory().unwrap();
        let entry = AuditEntry::new(AuditOperation::Commit, "/repo")
            .branch("main")
            .paths(vec!["a.rs".into(), "b.rs".into()])
            .commit("abc1234", "feat: x")
            .metadata(serde_json::json!({ "validate_conventional": true }));
        logger.log(entry).await.unwrap();

        let page = logger.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        let stored = &page.entries[0];
        assert_eq!(stored.id, Some(1));
        assert_eq!(stored.operation, AuditOperation::Commit);
        assert_eq!(stored.paths, vec!["a.rs", "b.rs"]);
        assert_eq!(stored.commit_hash.as_deref(), Some("abc1234"));
        assert_eq!(stored.metadata.as_ref().unwrap()["validate_conventional"], true);
        assert!(stored.timestamp.is_some());
    }

    #[test]
    fn filter_clause_numbers_placeholders() {
        let (clause, values) = filter_clause(&AuditQuery {
            operation: Some(AuditOperation::Push),
            branch: Some("main".into()),
            ..Default::default()
        });
        assert_eq!(clause, " WHERE operation = ?1 AND branch = ?2");
        assert_eq!(values, vec!["push", "main"]);
        assert_eq!(filter_clause(&AuditQuery::default()).0, "");
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(format_timestamp(early) < format_timestamp(late));
        assert!(format_timestamp(early).ends_with('Z'));
    }
}

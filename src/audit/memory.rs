//! audit::memory
//!
//! In-process audit store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{AuditEntry, AuditError, AuditLogger, AuditQuery, AuditQueryResponse};

/// Audit logger that keeps entries in memory.
///
/// Clones share state, so a test can hand one clone to the server and
/// inspect another.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLogger {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }
}

#[async_trait]
impl AuditLogger for MemoryAuditLogger {
    fn is_configured(&self) -> bool {
        true
    }

    async fn log(&self, mut entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self.lock();
        let next_id = entries.last().and_then(|e| e.id).unwrap_or(0) + 1;
        entry.id = Some(next_id);
        entry.timestamp.get_or_insert_with(Utc::now);
        entries.push(entry);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditQueryResponse, AuditError> {
        let entries = self.lock();
        let mut matched: Vec<&AuditEntry> = entries.iter().filter(|e| query.matches(e)).collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        Ok(AuditQueryResponse {
            total: matched.len() as u64,
            entries: matched
                .into_iter()
                .skip(query.effective_offset() as usize)
                .take(query.effective_limit() as usize)
                .cloned()
                .collect(),
            timestamp: Utc::now(),
        })
    }
}

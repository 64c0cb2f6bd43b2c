use crate::types::{ClaimedStatement, HistoryEntry, SessionHistory};
use chrono::{DateTime, Utc};
use sqlgate_core::Result;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// One user's session. Every method takes the per-user lock for the duration
/// of a single in-memory step only; nothing here performs I/O.
#[derive(Debug)]
pub struct UserSession {
    user_id: String,
    created_at: DateTime<Utc>,
    history: Mutex<SessionHistory>,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, max_history: usize) -> Self {
        Self {
            user_id: user_id.into(),
            created_at: Utc::now(),
            history: Mutex::new(SessionHistory::new(max_history)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn lock(&self) -> MutexGuard<'_, SessionHistory> {
        // history stays consistent even if a holder panicked mid-read
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn push(&self, entry: HistoryEntry) {
        let evicted = self.lock().push(entry);
        if evicted > 0 {
            tracing::debug!(user_id = %self.user_id, evicted, "Evicted oldest history entries");
        }
    }

    /// The most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let history = self.lock();
        let skip = history.len().saturating_sub(limit);
        history.entries().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.lock().entries().cloned().collect()
    }

    pub fn claim(&self, sql: &str) -> Result<ClaimedStatement> {
        self.lock().claim(sql)
    }

    pub fn release(&self, id: Uuid) -> bool {
        self.lock().release(id)
    }

    pub fn complete(&self, id: Uuid) -> bool {
        self.lock().complete(id)
    }
}

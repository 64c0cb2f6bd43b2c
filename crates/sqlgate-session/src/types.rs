use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlgate_core::{Error, Result};
use std::collections::VecDeque;
use uuid::Uuid;

/// Lifecycle of a statement in the session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Awaiting confirmation
    Pending,
    /// Claimed by a confirm turn that is running it
    Executing,
    /// Ran successfully; terminal
    Executed,
}

/// One turn of a user's session: a proposed statement and its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// The natural-language request that produced the statement
    pub query: String,
    pub sql: String,
    pub suggestions: Vec<String>,
    pub requires_confirmation: bool,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// A mutating statement waiting for the user to confirm it
    pub fn pending(
        query: impl Into<String>,
        sql: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self::new(query, sql, suggestions, true, EntryStatus::Pending)
    }

    /// A read that already ran
    pub fn executed_read(
        query: impl Into<String>,
        sql: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self::new(query, sql, suggestions, false, EntryStatus::Executed)
    }

    fn new(
        query: impl Into<String>,
        sql: impl Into<String>,
        suggestions: Vec<String>,
        requires_confirmation: bool,
        status: EntryStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            sql: sql.into(),
            suggestions,
            requires_confirmation,
            status,
            created_at: Utc::now(),
        }
    }

    pub fn executed(&self) -> bool {
        self.status == EntryStatus::Executed
    }
}

/// A pending statement claimed for execution by a confirm turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedStatement {
    pub id: Uuid,
    pub query: String,
    pub sql: String,
}

/// Bounded, ordered history of one user's turns.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    entries: VecDeque<HistoryEntry>,
    max_history: usize,
}

impl SessionHistory {
    pub fn new(max_history: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Append an entry, then drop the oldest entries beyond `max_history`.
    /// Returns how many entries were evicted.
    pub fn push(&mut self, entry: HistoryEntry) -> usize {
        self.entries.push_back(entry);
        let overflow = self.entries.len().saturating_sub(self.max_history);
        self.entries.drain(..overflow);
        overflow
    }

    /// Claim the most recent entry whose SQL equals `sql` exactly, moving it
    /// from `Pending` to `Executing`.
    pub fn claim(&mut self, sql: &str) -> Result<ClaimedStatement> {
        let entry = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.sql == sql)
            .ok_or_else(|| {
                Error::NotFound("No pending statement matches the given SQL.".to_string())
            })?;

        if !entry.requires_confirmation {
            return Err(Error::ConflictingState(
                "Statement does not require confirmation.".to_string(),
            ));
        }

        match entry.status {
            EntryStatus::Executed => Err(Error::ConflictingState(
                "Statement already executed.".to_string(),
            )),
            EntryStatus::Executing => Err(Error::ConflictingState(
                "Statement is already being executed.".to_string(),
            )),
            EntryStatus::Pending => {
                entry.status = EntryStatus::Executing;
                Ok(ClaimedStatement {
                    id: entry.id,
                    query: entry.query.clone(),
                    sql: entry.sql.clone(),
                })
            }
        }
    }

    /// Return a claimed entry to `Pending`. Returns false if the entry is
    /// gone or was not claimed.
    pub fn release(&mut self, id: Uuid) -> bool {
        self.transition(id, EntryStatus::Executing, EntryStatus::Pending)
    }

    /// Mark a claimed entry as executed. Returns false if the entry has been
    /// evicted in the meantime.
    pub fn complete(&mut self, id: Uuid) -> bool {
        self.transition(id, EntryStatus::Executing, EntryStatus::Executed)
    }

    fn transition(&mut self, id: Uuid, from: EntryStatus, to: EntryStatus) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if entry.status == from => {
                entry.status = to;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_keeps_most_recent_in_order() {
        let mut history = SessionHistory::new(3);
        let mut evicted = 0;
        for i in 0..5 {
            evicted += history.push(HistoryEntry::executed_read(
                format!("q{i}"),
                format!("SELECT {i}"),
                vec![],
            ));
        }

        assert_eq!(evicted, 2);
        let sqls: Vec<_> = history.entries().map(|e| e.sql.as_str()).collect();
        assert_eq!(sqls, vec!["SELECT 2", "SELECT 3", "SELECT 4"]);
    }

    #[test]
    fn test_claim_complete_and_reclaim() {
        let mut history = SessionHistory::new(10);
        history.push(HistoryEntry::pending("add", "DELETE FROM t", vec![]));

        let claimed = history.claim("DELETE FROM t").unwrap();
        let again = history.claim("DELETE FROM t").unwrap_err();
        assert!(matches!(again, Error::ConflictingState(ref m) if m.contains("being executed")));

        assert!(history.complete(claimed.id));
        let after = history.claim("DELETE FROM t").unwrap_err();
        assert!(matches!(after, Error::ConflictingState(ref m) if m.contains("already executed")));
        assert!(history.entries().next().unwrap().executed());
    }

    #[test]
    fn test_release_returns_to_pending() {
        let mut history = SessionHistory::new(10);
        history.push(HistoryEntry::pending("add", "DELETE FROM t", vec![]));

        let claimed = history.claim("DELETE FROM t").unwrap();
        assert!(history.release(claimed.id));
        assert!(!history.release(claimed.id));
        assert!(history.claim("DELETE FROM t").is_ok());
    }

    #[test]
    fn test_claim_rejections() {
        let mut history = SessionHistory::new(10);
        history.push(HistoryEntry::executed_read("list", "SELECT 1", vec![]));

        assert!(matches!(history.claim("SELECT 2"), Err(Error::NotFound(_))));
        assert!(matches!(
            history.claim("SELECT 1"),
            Err(Error::ConflictingState(ref m)) if m.contains("does not require confirmation")
        ));
    }

    #[test]
    fn test_claim_prefers_most_recent_match() {
        let mut history = SessionHistory::new(10);
        history.push(HistoryEntry::pending("first", "DELETE FROM t", vec![]));
        let first = history.claim("DELETE FROM t").unwrap();
        history.complete(first.id);

        history.push(HistoryEntry::pending("second", "DELETE FROM t", vec![]));
        let second = history.claim("DELETE FROM t").unwrap();
        assert_eq!(second.query, "second");
    }

    #[test]
    fn test_complete_after_eviction_is_a_noop() {
        let mut history = SessionHistory::new(1);
        history.push(HistoryEntry::pending("add", "DELETE FROM t", vec![]));
        let claimed = history.claim("DELETE FROM t").unwrap();
        history.push(HistoryEntry::executed_read("list", "SELECT 1", vec![]));
        assert!(!history.complete(claimed.id));
    }

    #[test]
    fn test_entry_serializes_status() {
        let entry = HistoryEntry::pending("q", "DELETE FROM t", vec!["s".into()]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["requires_confirmation"], true);
    }
}

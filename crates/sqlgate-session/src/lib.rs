//! Per-user conversation sessions for sqlgate
//!
//! A session holds the bounded turn history of one user: executed reads and
//! mutating statements waiting for confirmation. Stores hand out shared
//! [`UserSession`] handles; all history access goes through the session's
//! own lock, so different users never contend.

use async_trait::async_trait;
use sqlgate_core::Result;
use std::sync::Arc;

pub mod inmemory;
pub mod session;
pub mod types;

pub use inmemory::InMemorySessionStore;
pub use session::UserSession;
pub use types::{ClaimedStatement, EntryStatus, HistoryEntry, SessionHistory};

/// Session store trait
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Existing session for `user_id`; `Error::NotFound` if the user has
    /// never interacted.
    async fn get(&self, user_id: &str) -> Result<Arc<UserSession>>;

    /// Existing session, or a fresh empty one. The flag is true when the
    /// session was created by this call.
    async fn get_or_create(&self, user_id: &str) -> Result<(Arc<UserSession>, bool)>;

    async fn remove(&self, user_id: &str) -> Result<bool>;

    async fn user_ids(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_core::Error;

    #[tokio::test]
    async fn test_sessions_are_created_lazily() {
        let store = InMemorySessionStore::new(10);

        let err = store.get("alice").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let (session, created) = store.get_or_create("alice").await.unwrap();
        assert!(created);
        assert_eq!(session.user_id(), "alice");

        let (again, created) = store.get_or_create("alice").await.unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&session, &again));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_per_user() {
        let store = InMemorySessionStore::new(10);
        let (alice, _) = store.get_or_create("alice").await.unwrap();
        let (bob, _) = store.get_or_create("bob").await.unwrap();

        alice.push(HistoryEntry::pending("drop", "DELETE FROM t", vec![]));

        assert_eq!(alice.len(), 1);
        assert!(bob.is_empty());
        assert!(matches!(bob.claim("DELETE FROM t"), Err(Error::NotFound(_))));

        let mut users = store.user_ids().await.unwrap();
        users.sort();
        assert_eq!(users, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_remove_session() {
        let store = InMemorySessionStore::new(10);
        store.get_or_create("alice").await.unwrap();

        assert!(store.remove("alice").await.unwrap());
        assert!(!store.remove("alice").await.unwrap());
        assert!(store.get("alice").await.is_err());
    }
}

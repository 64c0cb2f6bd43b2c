use super::*;
use dashmap::DashMap;
use sqlgate_core::Error;

/// Process-lifetime session store keyed by user identifier.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<UserSession>>,
    max_history: usize,
}

impl InMemorySessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_history,
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(200)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Arc<UserSession>> {
        self.sessions
            .get(user_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::NotFound(format!("No session found for user '{}'.", user_id)))
    }

    async fn get_or_create(&self, user_id: &str) -> Result<(Arc<UserSession>, bool)> {
        let mut created = false;
        let session = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                created = true;
                tracing::debug!(user_id = %user_id, "Creating session");
                Arc::new(UserSession::new(user_id, self.max_history))
            })
            .value()
            .clone();
        Ok((session, created))
    }

    async fn remove(&self, user_id: &str) -> Result<bool> {
        Ok(self.sessions.remove(user_id).is_some())
    }

    async fn user_ids(&self) -> Result<Vec<String>> {
        Ok(self.sessions.iter().map(|e| e.key().clone()).collect())
    }
}

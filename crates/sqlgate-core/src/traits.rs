use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything the proposer sees for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalRequest {
    /// Compact `table(col TYPE, ...)` rendering of the live schema
    pub schema_text: String,
    /// Short-term turn history of the user
    pub history: String,
    /// Long-term context retrieved for this request
    pub context: String,
    /// The natural-language request
    pub request: String,
}

/// A language model that turns a natural-language request into SQL.
///
/// Implementations return the raw model text; callers are responsible for
/// pulling the SQL (and any suggestions) out of it.
#[async_trait]
pub trait Proposer: Send + Sync {
    fn name(&self) -> &str;
    async fn propose(&self, request: &ProposalRequest) -> Result<String>;
}

/// One ranked hit from the retrieval index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub text: String,
    /// Similarity in `0.0..=1.0`, higher is closer
    pub score: f32,
}

/// Long-term context store searched by similarity.
///
/// `load` is called once at startup and `save` at shutdown; in between the
/// index lives in memory.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Up to `k` matches, best first.
    async fn search(&self, text: &str, k: usize) -> Result<Vec<RetrievalMatch>>;
    async fn add_document(&self, text: &str) -> Result<()>;
    async fn save(&self) -> Result<()>;
    async fn load(&self) -> Result<()>;
}

/// Outcome of running one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ExecutionResult {
    /// Rows of a read, each a JSON object keyed by column name
    Rows(Vec<serde_json::Value>),
    /// Number of rows touched by a write
    Affected(u64),
}

impl ExecutionResult {
    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            ExecutionResult::Affected(n) => Some(*n),
            ExecutionResult::Rows(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ExecutionResult::Rows(rows) => serde_json::Value::Array(rows.clone()),
            ExecutionResult::Affected(n) => serde_json::json!({ "rows_affected": n }),
        }
    }
}

/// Runs SQL against a named database.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, db_name: &str, sql: &str) -> Result<ExecutionResult>;
}

/// One executed interaction, as handed to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: String,
    pub db_name: String,
    pub request: String,
    pub sql: String,
    pub result: serde_json::Value,
}

/// Identity assigned by the audit log to a recorded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// A recorded entry read back from the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: i64,
    pub user_prompt: String,
    pub generated_sql: String,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Append-only history of executed interactions.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<AuditRecord>;
    async fn fetch(&self, user_id: &str, db_name: &str, limit: i64) -> Result<Vec<AuditRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_result_json() {
        let rows = ExecutionResult::Rows(vec![serde_json::json!({"code": "TST"})]);
        assert_eq!(rows.to_json(), serde_json::json!([{"code": "TST"}]));
        assert_eq!(rows.affected_rows(), None);

        let affected = ExecutionResult::Affected(3);
        assert_eq!(affected.to_json()["rows_affected"], 3);
        assert_eq!(affected.affected_rows(), Some(3));
    }
}

//! Shared test doubles for the conversation engine
//!
//! In-process stand-ins for the proposer, retrieval index, executor and
//! audit log, reused by the unit tests here and by the workspace-level
//! integration tests.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use sqlgate_core::{
    AuditEntry, AuditLog, AuditRecord, AuditRow, Error, ExecutionResult, Executor, ProposalRequest,
    Proposer, Result, RetrievalIndex, RetrievalMatch,
};
use sqlgate_dml::extract::leading_keyword;
use sqlgate_schema::{ColumnRecord, RawSchema};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// The `country` table used across the conversation tests.
pub fn country_schema() -> RawSchema {
    let mut tables = BTreeMap::new();
    tables.insert(
        "country".to_string(),
        vec![
            ColumnRecord::new("code").with_type("character(3)").not_null(),
            ColumnRecord::new("name").with_type("text").not_null(),
            ColumnRecord::new("continent")
                .with_type("text")
                .not_null()
                .with_default(json!("'Asia'::text")),
            ColumnRecord::new("gnp").with_type("numeric(10,2)"),
            ColumnRecord::new("population")
                .with_type("integer")
                .not_null()
                .with_default(json!(0)),
        ],
    );
    RawSchema::ColumnRecords(tables)
}

/// Proposer replaying canned responses in order, then repeating a fallback.
pub struct ScriptedProposer {
    responses: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ProposalRequest>>,
}

impl ScriptedProposer {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Proposer that answers every request with `response`.
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            fallback: Some(response.into()),
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProposalRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Proposer for ScriptedProposer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<String> {
        lock(&self.requests).push(request.clone());
        lock(&self.responses)
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| Error::upstream("scripted", "No scripted response left"))
    }
}

/// Retrieval index returning the same matches for every search and
/// recording added documents.
pub struct StaticIndex {
    matches: Vec<RetrievalMatch>,
    added: Mutex<Vec<String>>,
}

impl StaticIndex {
    pub fn new(matches: Vec<(&str, f32)>) -> Self {
        Self {
            matches: matches
                .into_iter()
                .map(|(text, score)| RetrievalMatch {
                    text: text.to_string(),
                    score,
                })
                .collect(),
            added: Mutex::new(Vec::new()),
        }
    }

    /// Index whose top match always clears the clarification threshold.
    pub fn confident() -> Self {
        Self::new(vec![("Table country: code, name, continent, gnp, population", 0.9)])
    }

    pub fn added(&self) -> Vec<String> {
        lock(&self.added).clone()
    }
}

#[async_trait]
impl RetrievalIndex for StaticIndex {
    async fn search(&self, _text: &str, k: usize) -> Result<Vec<RetrievalMatch>> {
        Ok(self.matches.iter().take(k).cloned().collect())
    }

    async fn add_document(&self, text: &str) -> Result<()> {
        lock(&self.added).push(text.to_string());
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        Ok(())
    }
}

/// Executor recording every statement. Reads return fixed rows, anything
/// else reports one affected row.
pub struct RecordingExecutor {
    rows: Vec<Value>,
    delay: Option<Duration>,
    executed: Mutex<Vec<(String, String)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows,
            delay: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Hold every execution for `delay`, to make overlapping calls observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(db_name, sql)` of every executed statement, in order.
    pub fn executed(&self) -> Vec<(String, String)> {
        lock(&self.executed).clone()
    }
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, db_name: &str, sql: &str) -> Result<ExecutionResult> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.executed).push((db_name.to_string(), sql.to_string()));

        match leading_keyword(sql).as_deref() {
            Some("SELECT") | Some("WITH") => Ok(ExecutionResult::Rows(self.rows.clone())),
            _ => Ok(ExecutionResult::Affected(1)),
        }
    }
}

/// Append-only audit log kept in memory.
#[derive(Default)]
pub struct InMemoryAuditLog {
    rows: Mutex<Vec<(AuditEntry, AuditRow)>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        lock(&self.rows).iter().map(|(e, _)| e.clone()).collect()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<AuditRecord> {
        let mut rows = lock(&self.rows);
        let row = AuditRow {
            id: rows.len() as i64 + 1,
            user_prompt: entry.request.clone(),
            generated_sql: entry.sql.clone(),
            result: Some(entry.result.clone()),
            created_at: Utc::now(),
        };
        let record = AuditRecord {
            id: row.id,
            created_at: row.created_at,
        };
        rows.push((entry, row));
        Ok(record)
    }

    async fn fetch(&self, user_id: &str, db_name: &str, limit: i64) -> Result<Vec<AuditRow>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(lock(&self.rows)
            .iter()
            .rev()
            .filter(|(e, _)| e.user_id == user_id && e.db_name == db_name)
            .take(limit)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

use serde::{Deserialize, Serialize};
use sqlgate_core::{AuditRow, ErrorKind};
use sqlgate_session::HistoryEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub user_id: String,
    pub request: String,
    /// Falls back to the server's default database
    #[serde(default)]
    pub db_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub user_id: String,
    /// Exact SQL text returned by the query turn
    pub sql: String,
    pub confirm: bool,
    #[serde(default)]
    pub db_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub db_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub db_name: String,
    pub entries: Vec<AuditRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

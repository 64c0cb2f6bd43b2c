//! Span creation helpers for proposer calls and statement executions

use crate::attributes::*;

/// Attributes for tracing a proposer call
#[derive(Debug, Clone)]
pub struct ProposalSpanAttributes {
    pub proposer: String,
    pub user_id: String,
    pub db_name: String,
    pub request: String,
    /// Raw model text, or the error message if the call failed
    pub response: String,
    pub outcome: String,
}

/// Attributes for tracing one executed statement
#[derive(Debug, Clone)]
pub struct StatementSpanAttributes {
    pub user_id: String,
    pub db_name: String,
    pub sql: String,
    pub kind: &'static str,
    /// Rows returned or affected; absent when execution failed
    pub rows: Option<u64>,
    pub outcome: String,
}

/// Record a span for one proposer call.
pub fn trace_proposal_call(attrs: &ProposalSpanAttributes) {
    let span = tracing::info_span!(
        "propose_sql",
        { SQLGATE_PROPOSER } = %attrs.proposer,
        { SQLGATE_USER_ID } = %attrs.user_id,
        { SQLGATE_DB_NAME } = %attrs.db_name,
        { SQLGATE_REQUEST } = %attrs.request,
        { SQLGATE_PROPOSAL } = %attrs.response,
        { SQLGATE_OUTCOME } = %attrs.outcome,
    );

    // Enter and immediately exit the span (it's recorded)
    let _guard = span.enter();
}

/// Record a span for one statement run against the database.
pub fn trace_statement_execution(attrs: &StatementSpanAttributes) {
    let span = tracing::info_span!(
        "execute_statement",
        { SQLGATE_USER_ID } = %attrs.user_id,
        { SQLGATE_DB_NAME } = %attrs.db_name,
        { SQLGATE_SQL } = %attrs.sql,
        { SQLGATE_STATEMENT_KIND } = attrs.kind,
        { SQLGATE_ROWS } = tracing::field::Empty,
        { SQLGATE_OUTCOME } = %attrs.outcome,
    );

    if let Some(rows) = attrs.rows {
        span.record(SQLGATE_ROWS, rows);
    }

    let _guard = span.enter();
}

/// Helper to safely serialize to JSON string
pub fn safe_serialize<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_serialize() {
        let value = serde_json::json!({"sql": "SELECT 1"});
        let result = safe_serialize(&value);
        assert!(result.contains("sql"));
        assert!(result.contains("SELECT 1"));
    }

    #[test]
    fn test_span_helpers_without_subscriber() {
        // No subscriber installed: spans are disabled and recording is a no-op
        trace_proposal_call(&ProposalSpanAttributes {
            proposer: "gemini-1.5-flash".to_string(),
            user_id: "u1".to_string(),
            db_name: "world".to_string(),
            request: "list countries".to_string(),
            response: "{\"sql\": \"SELECT * FROM country\"}".to_string(),
            outcome: "ok".to_string(),
        });
        trace_statement_execution(&StatementSpanAttributes {
            user_id: "u1".to_string(),
            db_name: "world".to_string(),
            sql: "SELECT * FROM country".to_string(),
            kind: "read",
            rows: Some(3),
            outcome: "ok".to_string(),
        });
    }
}

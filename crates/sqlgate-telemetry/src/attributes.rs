//! Span attribute names

/// Instrumentation scope name of the tracer
pub const SYSTEM_NAME: &str = "sqlgate";

pub const SQLGATE_USER_ID: &str = "sqlgate.user_id";
pub const SQLGATE_DB_NAME: &str = "sqlgate.db_name";
pub const SQLGATE_REQUEST: &str = "sqlgate.request";

pub const SQLGATE_PROPOSER: &str = "sqlgate.proposer";
pub const SQLGATE_PROPOSAL: &str = "sqlgate.proposal";

pub const SQLGATE_SQL: &str = "sqlgate.sql";
/// `read` or `write`
pub const SQLGATE_STATEMENT_KIND: &str = "sqlgate.statement_kind";
pub const SQLGATE_ROWS: &str = "sqlgate.rows";

/// `ok` or the error message
pub const SQLGATE_OUTCOME: &str = "sqlgate.outcome";

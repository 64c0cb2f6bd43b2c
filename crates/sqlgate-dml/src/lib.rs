//! DML validation and casting for sqlgate
//!
//! Proposed mutating statements pass through this crate before they may run:
//! the statement kind and target table are extracted, required columns are
//! checked against the canonical schema, and literal values are cast to the
//! declared column types.
//!
//! Only single-row `INSERT ... VALUES (...)`, `UPDATE ... SET ... [WHERE ...]`
//! and `DELETE FROM ...` are understood; everything else is rejected.

pub mod cast;
pub mod extract;
pub mod validator;

pub use cast::cast_value;
pub use extract::{StatementKind, classify};
pub use validator::{PatternValidator, StatementValidator, ValidationResult, validate};

/// Leading keywords that make a statement mutating.
pub const MUTATING_KEYWORDS: [&str; 5] = ["INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT"];

/// Leading keywords of statements that only return rows.
pub const READ_KEYWORDS: [&str; 4] = ["SELECT", "WITH", "VALUES", "TABLE"];

/// Whether a statement must be confirmed before it runs.
///
/// A statement is mutating when it starts with one of
/// [`MUTATING_KEYWORDS`], or when it is a `WITH` query whose body contains
/// one of them outside quoted text (a data-modifying CTE).
pub fn is_mutating(sql: &str) -> bool {
    match extract::leading_keyword(sql).as_deref() {
        Some("WITH") => MUTATING_KEYWORDS
            .iter()
            .any(|kw| extract::contains_keyword(sql, kw)),
        Some(kw) => MUTATING_KEYWORDS.contains(&kw),
        None => false,
    }
}

/// Whether a statement only reads and may run without confirmation.
///
/// Anything that is not a plain query, including DDL such as `DROP` or
/// `TRUNCATE`, is not a read.
pub fn is_read(sql: &str) -> bool {
    extract::leading_keyword(sql).is_some_and(|kw| READ_KEYWORDS.contains(&kw.as_str()))
        && !is_mutating(sql)
}

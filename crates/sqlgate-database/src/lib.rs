//! PostgreSQL adapter for sqlgate
//!
//! [`PgDatabase`] is the live schema source, statement executor and audit
//! log of the conversation engine. [`build_schema_index`] reads a database's
//! structure and sample data into the schema-index document used to seed the
//! retrieval index.

pub mod index;
pub mod postgres;
mod sql;

// Re-exports
pub use index::{build_schema_index, save_schema_index};
pub use postgres::{AUDIT_TABLE, PgDatabase};

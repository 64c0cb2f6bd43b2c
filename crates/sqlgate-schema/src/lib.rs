//! Schema normalization for sqlgate
//!
//! Schema sources describe tables in several shapes: bare column-name lists,
//! column-metadata records, or a schema-index document. This crate folds all
//! of them into one canonical [`SchemaMap`] keyed by lower-cased table and
//! column names.
//!
//! ## Usage
//!
//! ```rust
//! use sqlgate_schema::{normalize, RawSchema};
//!
//! let raw = RawSchema::from_json(serde_json::json!({
//!     "tables": { "Country": { "columns": [ { "name": "Code", "nullable": false } ] } }
//! })).unwrap();
//!
//! let schema = normalize(&raw);
//! assert!(schema.column("country", "code").unwrap().required);
//! ```

use async_trait::async_trait;
use sqlgate_core::Result;
use std::sync::{Arc, RwLock};

mod normalize;
mod raw;
mod types;

pub use normalize::normalize;
pub use raw::{
    ColumnDoc, ColumnRecord, ForeignKey, IndexedTable, RawSchema, SchemaIndex, TableDoc,
};
pub use types::{ColumnSpec, SchemaMap, TableColumns};

/// Supplies the live schema of a named database.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn get_schema(&self, db_name: &str) -> Result<RawSchema>;
}

/// Fetch and normalize in one step.
pub async fn load_schema(source: &dyn SchemaSource, db_name: &str) -> Result<SchemaMap> {
    let raw = source.get_schema(db_name).await?;
    let schema = normalize(&raw);
    tracing::debug!(db = %db_name, tables = schema.len(), "Normalized schema");
    Ok(schema)
}

/// Schema source serving one fixed description for every database.
///
/// The description can be swapped at runtime, which is how schema drift
/// between proposal and confirmation is simulated.
#[derive(Clone)]
pub struct StaticSchemaSource {
    raw: Arc<RwLock<RawSchema>>,
}

impl StaticSchemaSource {
    pub fn new(raw: RawSchema) -> Self {
        Self {
            raw: Arc::new(RwLock::new(raw)),
        }
    }

    pub fn replace(&self, raw: RawSchema) {
        *self.raw.write().unwrap_or_else(|e| e.into_inner()) = raw;
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn get_schema(&self, _db_name: &str) -> Result<RawSchema> {
        Ok(self.raw.read().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

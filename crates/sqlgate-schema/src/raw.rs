//! Raw schema descriptions as they arrive from schema sources.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlgate_core::{Error, Result};
use std::collections::BTreeMap;

/// A schema description in one of the accepted input shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSchema {
    /// `{table: ["col1", "col2", ...]}`
    ColumnNames(BTreeMap<String, Vec<String>>),
    /// `{table: [{"name": ..., "type": ..., "nullable": ..., "default": ...}, ...]}`
    ColumnRecords(BTreeMap<String, Vec<ColumnRecord>>),
    /// `{"tables": {table: {"columns": [...]}}}` as written by the index builder
    Indexed(SchemaIndex),
    /// Loosely typed JSON mapping, classified entry by entry during normalization
    Document(Map<String, Value>),
}

impl RawSchema {
    /// Accept an arbitrary JSON document.
    ///
    /// Only a JSON object is a schema description; anything else is a caller
    /// error and is rejected with [`Error::MalformedInput`].
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(RawSchema::Document(map)),
            other => Err(Error::MalformedInput(format!(
                "raw schema must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

/// Metadata of one column as reported by a schema source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub name: String,
    #[serde(rename = "type", default)]
    pub sql_type: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: None,
            nullable: true,
            default: None,
        }
    }

    pub fn with_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

fn default_nullable() -> bool {
    true
}

/// Schema index document: table metadata plus retrieval documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaIndex {
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub tables: BTreeMap<String, IndexedTable>,
    #[serde(default)]
    pub table_docs: Vec<TableDoc>,
    #[serde(default)]
    pub column_docs: Vec<ColumnDoc>,
}

impl SchemaIndex {
    /// Texts of every table and column document, tables first.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.table_docs
            .iter()
            .map(|d| d.text.as_str())
            .chain(self.column_docs.iter().map(|d| d.text.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexedTable {
    #[serde(default)]
    pub columns: Vec<ColumnRecord>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDoc {
    pub table: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDoc {
    pub table: String,
    pub column: String,
    pub text: String,
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

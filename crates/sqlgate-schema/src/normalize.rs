//! Conversion of every [`RawSchema`] shape into a [`SchemaMap`].
//!
//! Normalization never fails: tables without a usable name and column
//! entries without a usable name are skipped.

use crate::raw::{ColumnRecord, IndexedTable, RawSchema, SchemaIndex};
use crate::types::{ColumnSpec, SchemaMap};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const NAME_KEYS: [&str; 3] = ["name", "column", "column_name"];

pub fn normalize(raw: &RawSchema) -> SchemaMap {
    match raw {
        RawSchema::ColumnNames(tables) => normalize_column_names(tables),
        RawSchema::ColumnRecords(tables) => normalize_column_records(tables),
        RawSchema::Indexed(index) => normalize_indexed(index),
        RawSchema::Document(doc) => normalize_document(doc),
    }
}

fn normalize_column_names(tables: &BTreeMap<String, Vec<String>>) -> SchemaMap {
    let mut schema = SchemaMap::new();
    for (table, columns) in tables.iter().filter(|(t, _)| !t.is_empty()) {
        schema.table_entry(table);
        for name in columns.iter().filter(|c| !c.is_empty()) {
            schema.insert_column(table, ColumnSpec::untyped(name.as_str()));
        }
    }
    schema
}

fn normalize_column_records(tables: &BTreeMap<String, Vec<ColumnRecord>>) -> SchemaMap {
    let mut schema = SchemaMap::new();
    for (table, columns) in tables.iter().filter(|(t, _)| !t.is_empty()) {
        insert_records(&mut schema, table, columns);
    }
    schema
}

fn normalize_indexed(index: &SchemaIndex) -> SchemaMap {
    let mut schema = SchemaMap::new();
    for (table, IndexedTable { columns, .. }) in index.tables.iter().filter(|(t, _)| !t.is_empty())
    {
        insert_records(&mut schema, table, columns);
    }
    schema
}

fn insert_records(schema: &mut SchemaMap, table: &str, columns: &[ColumnRecord]) {
    schema.table_entry(table);
    for record in columns.iter().filter(|c| !c.name.is_empty()) {
        schema.insert_column(
            table,
            ColumnSpec::new(
                record.name.as_str(),
                record.sql_type.clone(),
                record.nullable,
                record.default.clone(),
            ),
        );
    }
}

fn normalize_document(doc: &Map<String, Value>) -> SchemaMap {
    let tables = match doc.get("tables") {
        Some(Value::Object(tables)) => tables,
        _ => doc,
    };

    let mut schema = SchemaMap::new();
    for (table, value) in tables.iter().filter(|(t, _)| !t.is_empty()) {
        schema.table_entry(table);

        let entries = match value {
            Value::Object(obj) => match obj.get("columns") {
                Some(Value::Array(cols)) => cols,
                _ => continue,
            },
            Value::Array(cols) => cols,
            _ => {
                tracing::debug!(table = %table, "Skipping table with unrecognized column list");
                continue;
            }
        };

        for entry in entries {
            match column_from_json(entry) {
                Some(spec) => schema.insert_column(table, spec),
                None => tracing::debug!(table = %table, "Skipping malformed column entry"),
            }
        }
    }
    schema
}

fn column_from_json(entry: &Value) -> Option<ColumnSpec> {
    match entry {
        Value::String(name) if !name.is_empty() => Some(ColumnSpec::untyped(name.as_str())),
        Value::Object(record) => {
            let name = NAME_KEYS
                .iter()
                .filter_map(|k| record.get(*k))
                .find_map(name_text)?;
            let nullable = record.get("nullable").map(truthy).unwrap_or(true);
            let default = record.get("default").cloned();
            let sql_type = record.get("type").and_then(|t| match t {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            });
            Some(ColumnSpec::new(name, sql_type, nullable, default))
        }
        _ => None,
    }
}

fn name_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// JSON truthiness: null, false, 0, "" and empty containers are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from_json(value: Value) -> SchemaMap {
        normalize(&RawSchema::from_json(value).unwrap())
    }

    #[test]
    fn test_three_shapes_agree() {
        let names = from_json(json!({"t": ["a"]}));
        let records = from_json(json!({"t": [{"name": "a"}]}));
        let indexed = from_json(json!({"tables": {"t": {"columns": ["a"]}}}));

        let expected = ColumnSpec {
            name: "a".into(),
            sql_type: None,
            nullable: true,
            default: None,
            required: false,
        };
        for schema in [&names, &records, &indexed] {
            assert_eq!(schema.column("t", "a"), Some(&expected));
        }
        assert_eq!(names, records);
        assert_eq!(records, indexed);
    }

    #[test]
    fn test_typed_variants_match_document() {
        let mut names = BTreeMap::new();
        names.insert("T".to_string(), vec!["A".to_string()]);
        let typed = normalize(&RawSchema::ColumnNames(names));
        assert_eq!(typed.column("t", "a"), Some(&ColumnSpec::untyped("A")));

        let mut records = BTreeMap::new();
        records.insert(
            "country".to_string(),
            vec![
                ColumnRecord::new("code").with_type("VARCHAR").not_null(),
                ColumnRecord::new("population").with_type("INTEGER").not_null().with_default(json!(0)),
            ],
        );
        let schema = normalize(&RawSchema::ColumnRecords(records));
        assert!(schema.column("country", "code").unwrap().required);
        assert!(!schema.column("country", "population").unwrap().required);
    }

    #[test]
    fn test_keys_are_case_folded() {
        let schema = from_json(json!({"Country": [{"column_name": "Code", "nullable": false}]}));
        let spec = schema.column("country", "code").unwrap();
        assert_eq!(spec.name, "Code");
        assert!(spec.required);
        assert!(schema.tables().all(|(t, cols)| t == "country" && cols.contains_key("code")));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let schema = from_json(json!({
            "t": [
                {"type": "INTEGER"},
                {"name": ""},
                42,
                null,
                ["nested"],
                {"column": "ok", "type": "TEXT"}
            ],
            "scalar_table": 7,
            "": ["ignored"]
        }));

        let t = schema.table("t").unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t["ok"].sql_type.as_deref(), Some("TEXT"));
        // unusable column list still registers the table
        assert!(schema.table("scalar_table").unwrap().is_empty());
        assert!(!schema.contains_table(""));
    }

    #[test]
    fn test_last_duplicate_wins() {
        let schema = from_json(json!({
            "t": [
                {"name": "ID", "nullable": true},
                {"name": "id", "nullable": false, "type": "INTEGER"}
            ]
        }));
        let spec = schema.column("t", "id").unwrap();
        assert_eq!(spec.name, "id");
        assert!(!spec.nullable);
        assert!(spec.required);
    }

    #[test]
    fn test_null_nullable_counts_as_not_null() {
        let schema = from_json(json!({"t": [{"name": "a", "nullable": null}]}));
        assert!(schema.column("t", "a").unwrap().required);
    }

    #[test]
    fn test_defaults_and_non_string_types() {
        let schema = from_json(json!({
            "t": [
                {"name": "a", "nullable": false, "default": "now()"},
                {"name": "b", "nullable": false, "default": null},
                {"name": "c", "type": 5}
            ]
        }));
        assert!(!schema.column("t", "a").unwrap().required);
        assert!(schema.column("t", "b").unwrap().required);
        assert_eq!(schema.column("t", "c").unwrap().sql_type.as_deref(), Some("5"));
    }

    #[test]
    fn test_tables_key_must_be_mapping_to_be_used() {
        // a `tables` entry that is not a mapping is just another table
        let schema = from_json(json!({"tables": ["x"], "t": ["a"]}));
        assert!(schema.contains_table("tables"));
        assert!(schema.contains_table("t"));
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical metadata of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: Option<String>,
    pub nullable: bool,
    pub default: Option<Value>,
    /// `!nullable && default.is_none()`
    pub required: bool,
}

impl ColumnSpec {
    pub fn new(
        name: impl Into<String>,
        sql_type: Option<String>,
        nullable: bool,
        default: Option<Value>,
    ) -> Self {
        let default = default.filter(|v| !v.is_null());
        let required = !nullable && default.is_none();
        Self {
            name: name.into(),
            sql_type,
            nullable,
            default,
            required,
        }
    }

    /// A bare column name with no metadata
    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, None, true, None)
    }
}

/// Columns of one table keyed by lower-cased column name.
pub type TableColumns = BTreeMap<String, ColumnSpec>;

/// Lower-cased table name to its columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMap {
    tables: BTreeMap<String, TableColumns>,
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a table; the name is case-folded first.
    pub fn table(&self, name: &str) -> Option<&TableColumns> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnSpec> {
        self.table(table)?.get(&column.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableColumns)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Ensure a table exists, returning its column map.
    pub(crate) fn table_entry(&mut self, name: &str) -> &mut TableColumns {
        self.tables.entry(name.to_lowercase()).or_default()
    }

    /// Insert a column; a later column with the same folded name replaces
    /// the earlier one.
    pub(crate) fn insert_column(&mut self, table: &str, spec: ColumnSpec) {
        let key = spec.name.to_lowercase();
        self.table_entry(table).insert(key, spec);
    }

    /// Render one `table(col TYPE, ...)` line per table for prompting.
    pub fn prompt_text(&self) -> String {
        self.tables
            .iter()
            .map(|(table, columns)| {
                let cols: Vec<String> = columns
                    .values()
                    .map(|c| match &c.sql_type {
                        Some(t) => format!("{} {}", c.name, t),
                        None => c.name.clone(),
                    })
                    .collect();
                format!("{}({})", table, cols.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_derivation() {
        assert!(ColumnSpec::new("id", None, false, None).required);
        assert!(!ColumnSpec::new("id", None, true, None).required);
        assert!(!ColumnSpec::new("id", None, false, Some(json!("nextval('s')"))).required);
        // a JSON null default is no default
        assert!(ColumnSpec::new("id", None, false, Some(Value::Null)).required);
    }

    #[test]
    fn test_prompt_text() {
        let mut schema = SchemaMap::new();
        schema.insert_column(
            "Country",
            ColumnSpec::new("Code", Some("VARCHAR(3)".into()), false, None),
        );
        schema.insert_column("country", ColumnSpec::untyped("name"));
        schema.table_entry("empty");

        assert_eq!(
            schema.prompt_text(),
            "country(Code VARCHAR(3), name)\nempty()"
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut schema = SchemaMap::new();
        schema.insert_column("t", ColumnSpec::untyped("Id"));
        assert!(schema.contains_table("T"));
        assert_eq!(schema.column("T", "ID").unwrap().name, "Id");
    }
}

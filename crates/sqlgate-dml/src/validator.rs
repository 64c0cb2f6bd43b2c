//! Schema-conformance gate for proposed DML.

use crate::cast::cast_value;
use crate::extract::{self, InsertShapeError, StatementKind};
use serde::{Deserialize, Serialize};
use sqlgate_schema::{SchemaMap, TableColumns};

/// Outcome of validating one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub message: String,
    /// The rewritten statement when valid, otherwise the statement as given
    pub sql: String,
}

impl ValidationResult {
    fn accepted(sql: String) -> Self {
        Self {
            valid: true,
            message: "SQL is valid and values casted.".to_string(),
            sql,
        }
    }

    fn rejected(message: impl Into<String>, sql: &str) -> Self {
        Self {
            valid: false,
            message: message.into(),
            sql: sql.to_string(),
        }
    }
}

/// Checks a mutating statement against a schema and rewrites it with cast
/// values.
///
/// Callers depend on this trait only, so the pattern-based implementation
/// can be replaced by a real statement parser.
pub trait StatementValidator: Send + Sync {
    fn validate(&self, sql: &str, schema: &SchemaMap) -> ValidationResult;
}

/// Validator for the single-row INSERT / UPDATE / DELETE subset, built on
/// pattern extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternValidator;

impl StatementValidator for PatternValidator {
    fn validate(&self, sql: &str, schema: &SchemaMap) -> ValidationResult {
        validate(sql, schema)
    }
}

pub fn validate(sql: &str, schema: &SchemaMap) -> ValidationResult {
    let statements = extract::split_statements(sql);
    if statements.len() > 1 {
        return ValidationResult::rejected("Compound statements are not supported.", sql);
    }
    let body = statements.first().copied().unwrap_or("");

    let kind = extract::classify(body);
    if kind == StatementKind::Other {
        return ValidationResult::rejected("Not a DML query.", sql);
    }

    let Some(table) = extract::target_table(body, kind) else {
        return ValidationResult::rejected("Target table could not be determined.", sql);
    };
    let Some(columns) = schema.table(&table) else {
        return ValidationResult::rejected(format!("Table '{}' not found in schema.", table), sql);
    };

    let rewrite = match kind {
        StatementKind::Insert => rewrite_insert(body, &table, columns),
        StatementKind::Update => rewrite_update(body, &table, columns).map(|s| (s, Vec::new())),
        _ => Ok((sql.to_string(), Vec::new())),
    };

    match rewrite {
        Err(message) => ValidationResult::rejected(message, sql),
        Ok((_, missing)) if !missing.is_empty() => {
            tracing::debug!(table = %table, missing = ?missing, "Required columns missing");
            ValidationResult::rejected(
                format!("Missing required columns: {}", missing.join(", ")),
                sql,
            )
        }
        Ok((rewritten, _)) => ValidationResult::accepted(rewritten),
    }
}

/// Rebuild an INSERT with cast values; also report required columns the
/// statement leaves out.
fn rewrite_insert(
    body: &str,
    table: &str,
    columns: &TableColumns,
) -> Result<(String, Vec<String>), String> {
    let parts = extract::insert_parts(body).map_err(|e| match e {
        InsertShapeError::MultiRow => "Multi-row INSERT is not supported.".to_string(),
        InsertShapeError::Unrecognized => "INSERT statement parsing failed.".to_string(),
    })?;

    if parts.columns.len() != parts.values.len() {
        return Err(format!(
            "INSERT names {} columns but supplies {} values.",
            parts.columns.len(),
            parts.values.len()
        ));
    }

    let supplied: Vec<String> = parts.columns.iter().map(|c| c.to_lowercase()).collect();

    let missing = columns
        .iter()
        .filter(|(name, spec)| spec.required && !supplied.contains(name))
        .map(|(name, _)| name.clone())
        .collect();

    let values: Vec<String> = supplied
        .iter()
        .zip(&parts.values)
        .map(|(col, value)| match columns.get(col) {
            Some(spec) => cast_value(value, spec.sql_type.as_deref()),
            None => value.to_string(),
        })
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({});",
        table,
        supplied.join(", "),
        values.join(", ")
    );
    Ok((sql, missing))
}

fn rewrite_update(body: &str, table: &str, columns: &TableColumns) -> Result<String, String> {
    let parts =
        extract::update_parts(body).ok_or_else(|| "UPDATE statement parsing failed.".to_string())?;

    let assignments: Vec<String> = parts
        .assignments
        .iter()
        .map(|assignment| match assignment.split_once('=') {
            Some((col, value)) => {
                let col = col.trim().to_lowercase();
                let value = value.trim();
                let value = match columns.get(&col) {
                    Some(spec) => cast_value(value, spec.sql_type.as_deref()),
                    None => value.to_string(),
                };
                format!("{} = {}", col, value)
            }
            None => assignment.to_string(),
        })
        .collect();

    let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
    if let Some(where_clause) = parts.where_clause {
        sql.push(' ');
        sql.push_str(where_clause);
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlgate_schema::{RawSchema, normalize};

    fn schema(value: serde_json::Value) -> SchemaMap {
        normalize(&RawSchema::from_json(value).unwrap())
    }

    fn country() -> SchemaMap {
        schema(json!({
            "country": [
                {"name": "code", "type": "CHAR(3)", "nullable": false},
                {"name": "name", "type": "TEXT", "nullable": false},
                {"name": "population", "type": "INTEGER", "nullable": true},
                {"name": "gnp", "type": "NUMERIC(10,2)"},
                {"name": "founded", "type": "DATE"}
            ]
        }))
    }

    #[test]
    fn test_missing_required_column_is_reported() {
        let schema = schema(json!({"t": [
            {"name": "id", "nullable": false},
            {"name": "name", "nullable": true}
        ]}));
        let result = validate("INSERT INTO t (name) VALUES ('x')", &schema);
        assert!(!result.valid);
        assert!(result.message.contains("id"));
        // the statement is handed back untouched
        assert_eq!(result.sql, "INSERT INTO t (name) VALUES ('x')");
    }

    #[test]
    fn test_insert_is_rewritten() {
        let schema = schema(json!({"t": [{"name": "id", "nullable": true}]}));
        let result = validate("INSERT INTO t (id) VALUES (1)", &schema);
        assert!(result.valid);
        assert_eq!(result.sql, "INSERT INTO t (id) VALUES (1);");
    }

    #[test]
    fn test_insert_values_are_cast() {
        let result = validate(
            "insert into Country (Code, name, population, gnp, founded, extra) \
             values (\"TST\", 'TestLand', '12', 3, '2024-01-05T00:00:00', now());",
            &country(),
        );
        assert!(result.valid, "{}", result.message);
        assert_eq!(
            result.sql,
            "INSERT INTO country (code, name, population, gnp, founded, extra) \
             VALUES ('TST', 'TestLand', '12', 3.0, '2024-01-05', now());"
        );
    }

    #[test]
    fn test_update_is_rewritten_and_where_kept() {
        let result = validate(
            "UPDATE country SET Population = 42, gnp = 1.50, note WHERE code = 'TST'",
            &country(),
        );
        assert!(result.valid);
        assert_eq!(
            result.sql,
            "UPDATE country SET population = 42, gnp = 1.5, note WHERE code = 'TST'"
        );

        let result = validate("UPDATE country SET name = TestLand", &country());
        assert_eq!(result.sql, "UPDATE country SET name = 'TestLand'");
    }

    #[test]
    fn test_delete_passes_through() {
        let sql = "DELETE FROM country WHERE code = 'TST';";
        let result = validate(sql, &country());
        assert!(result.valid);
        assert_eq!(result.sql, sql);
    }

    #[test]
    fn test_non_dml_is_rejected() {
        let result = validate("SELECT * FROM country", &country());
        assert!(!result.valid);
        assert_eq!(result.message, "Not a DML query.");

        let result = validate("MERGE INTO country USING x ON true", &country());
        assert_eq!(result.message, "Not a DML query.");
    }

    #[test]
    fn test_unknown_table() {
        let result = validate("DELETE FROM city", &country());
        assert!(!result.valid);
        assert_eq!(result.message, "Table 'city' not found in schema.");

        let result = validate("DELETE city", &country());
        assert_eq!(result.message, "Target table could not be determined.");
    }

    #[test]
    fn test_multi_row_and_compound_are_rejected() {
        let result = validate(
            "INSERT INTO country (code, name) VALUES ('A', 'a'), ('B', 'b')",
            &country(),
        );
        assert!(!result.valid);
        assert_eq!(result.message, "Multi-row INSERT is not supported.");

        let result = validate(
            "DELETE FROM country WHERE code = 'A'; DROP TABLE country",
            &country(),
        );
        assert!(!result.valid);
        assert_eq!(result.message, "Compound statements are not supported.");
    }

    #[test]
    fn test_count_mismatch_and_parse_failures() {
        let result = validate("INSERT INTO country (code, name) VALUES ('A')", &country());
        assert!(!result.valid);
        assert!(result.message.contains("2 columns"));

        let result = validate("INSERT INTO country VALUES ('A', 'a')", &country());
        assert_eq!(result.message, "INSERT statement parsing failed.");

        let result = validate("UPDATE country WHERE code = 'A'", &country());
        assert_eq!(result.message, "UPDATE statement parsing failed.");
    }

    #[test]
    fn test_update_with_trailing_clause_is_rejected() {
        let result = validate("UPDATE country SET population = 5 RETURNING code", &country());
        assert!(!result.valid);
        assert_eq!(result.message, "UPDATE statement parsing failed.");

        let result = validate(
            "UPDATE country SET name = s.name FROM staging s WHERE country.code = s.code",
            &country(),
        );
        assert!(!result.valid);
        assert_eq!(result.message, "UPDATE statement parsing failed.");
    }

    #[test]
    fn test_missing_check_takes_precedence_over_rewrite() {
        let result = validate(
            "INSERT INTO country (name, population) VALUES ('x', 1)",
            &country(),
        );
        assert!(!result.valid);
        assert_eq!(result.message, "Missing required columns: code");
    }

    #[test]
    fn test_trait_object_dispatch() {
        let validator: Box<dyn StatementValidator> = Box::new(PatternValidator);
        assert!(validator.validate("DELETE FROM country", &country()).valid);
    }
}

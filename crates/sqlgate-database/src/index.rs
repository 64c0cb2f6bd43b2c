//! Schema index builder
//!
//! Reads tables, keys and sample values from a live database and renders
//! them as table and column documents for the retrieval index.

use crate::postgres::{PgDatabase, db_error};
use crate::sql::quote_ident;
use sqlgate_core::{Result, RetrievalConfig};
use sqlgate_schema::{ColumnDoc, ColumnRecord, ForeignKey, IndexedTable, SchemaIndex, TableDoc};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;

const PRIMARY_KEYS_QUERY: &str = r#"
    SELECT tc.table_name::text AS table_name, kcu.column_name::text AS column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
    WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1
    ORDER BY tc.table_name, kcu.ordinal_position
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        tc.table_name::text AS table_name,
        tc.constraint_name::text AS constraint_name,
        kcu.column_name::text AS column_name,
        ccu.table_name::text AS referred_table,
        ccu.column_name::text AS referred_column
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
      ON ccu.constraint_name = tc.constraint_name
     AND ccu.constraint_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1
    ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position
"#;

type Samples = BTreeMap<String, Vec<String>>;

/// Build the schema index document of `db_name`.
///
/// A table whose sample query fails is still indexed, with no samples.
pub async fn build_schema_index(
    db: &PgDatabase,
    db_name: &str,
    config: &RetrievalConfig,
) -> Result<SchemaIndex> {
    let columns = db.fetch_columns(db_name).await?;
    let mut primary_keys = fetch_primary_keys(db, db_name).await?;
    let mut foreign_keys = fetch_foreign_keys(db, db_name).await?;

    tracing::info!(db = %db_name, tables = columns.len(), "Building schema index");

    let mut index = SchemaIndex {
        db_name: db_name.to_string(),
        ..Default::default()
    };

    for (table, records) in columns {
        let samples = fetch_samples(db, db_name, &table, &records, config.sample_limit).await;

        let indexed = IndexedTable {
            columns: records,
            primary_key: primary_keys.remove(&table).unwrap_or_default(),
            foreign_keys: foreign_keys.remove(&table).unwrap_or_default(),
        };

        index.table_docs.push(table_doc(&table, &indexed, &samples));
        index.column_docs.extend(
            indexed
                .columns
                .iter()
                .map(|c| column_doc(&table, c, &samples, config.column_sample_chars)),
        );

        tracing::debug!(
            table = %table,
            columns = indexed.columns.len(),
            foreign_keys = indexed.foreign_keys.len(),
            "Indexed table"
        );
        index.tables.insert(table, indexed);
    }

    Ok(index)
}

/// Write a schema index as pretty JSON.
pub fn save_schema_index(index: &SchemaIndex, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(index)?)?;
    tracing::info!(path = %path.display(), "Wrote schema index");
    Ok(())
}

async fn fetch_primary_keys(db: &PgDatabase, db_name: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let rows = sqlx::query(PRIMARY_KEYS_QUERY)
        .bind(&db.config().schema)
        .fetch_all(&db.pool(db_name))
        .await
        .map_err(|e| db_error("Failed to read primary keys", e))?;

    let mut keys: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in &rows {
        let table: String = row
            .try_get("table_name")
            .map_err(|e| db_error("Failed to decode primary key", e))?;
        let column: String = row
            .try_get("column_name")
            .map_err(|e| db_error("Failed to decode primary key", e))?;
        keys.entry(table).or_default().push(column);
    }
    Ok(keys)
}

async fn fetch_foreign_keys(
    db: &PgDatabase,
    db_name: &str,
) -> Result<BTreeMap<String, Vec<ForeignKey>>> {
    let rows = sqlx::query(FOREIGN_KEYS_QUERY)
        .bind(&db.config().schema)
        .fetch_all(&db.pool(db_name))
        .await
        .map_err(|e| db_error("Failed to read foreign keys", e))?;

    // (table, constraint) -> key
    let mut grouped: BTreeMap<(String, String), ForeignKey> = BTreeMap::new();
    for row in &rows {
        let decode = |column: &str| -> Result<String> {
            row.try_get(column)
                .map_err(|e| db_error("Failed to decode foreign key", e))
        };

        let key = grouped
            .entry((decode("table_name")?, decode("constraint_name")?))
            .or_insert_with(|| ForeignKey {
                constrained_columns: Vec::new(),
                referred_table: String::new(),
                referred_columns: Vec::new(),
            });
        key.referred_table = decode("referred_table")?;
        push_unique(&mut key.constrained_columns, decode("column_name")?);
        push_unique(&mut key.referred_columns, decode("referred_column")?);
    }

    let mut keys: BTreeMap<String, Vec<ForeignKey>> = BTreeMap::new();
    for ((table, _), key) in grouped {
        keys.entry(table).or_default().push(key);
    }
    Ok(keys)
}

async fn fetch_samples(
    db: &PgDatabase,
    db_name: &str,
    table: &str,
    columns: &[ColumnRecord],
    limit: i64,
) -> Samples {
    let pool = db.pool(db_name);
    let qualified = format!("{}.{}", quote_ident(&db.config().schema), quote_ident(table));

    let mut samples = Samples::new();
    for column in columns {
        let col = quote_ident(&column.name);
        let sql = format!(
            "SELECT {col}::text AS value FROM {qualified} WHERE {col} IS NOT NULL LIMIT $1"
        );

        let values = match sqlx::query(&sql).bind(limit).fetch_all(&pool).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|r| r.try_get::<String, _>("value").ok())
                .collect(),
            Err(e) => {
                tracing::debug!(table = %table, column = %column.name, error = %e, "Sample query failed");
                Vec::new()
            }
        };
        samples.insert(column.name.clone(), values);
    }
    samples
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn type_label(column: &ColumnRecord) -> &str {
    column.sql_type.as_deref().unwrap_or("unknown")
}

/// One-paragraph description of a table: columns with types and examples,
/// primary key and foreign keys.
fn table_doc(table: &str, indexed: &IndexedTable, samples: &Samples) -> TableDoc {
    let columns: Vec<String> = indexed
        .columns
        .iter()
        .map(|c| {
            let examples = samples.get(&c.name).map(|v| v.join(", ")).unwrap_or_default();
            if examples.is_empty() {
                format!("{} ({})", c.name, type_label(c))
            } else {
                format!("{} ({}), examples: {}", c.name, type_label(c), examples)
            }
        })
        .collect();

    let primary_key = if indexed.primary_key.is_empty() {
        "None".to_string()
    } else {
        indexed.primary_key.join(", ")
    };

    let foreign_keys = if indexed.foreign_keys.is_empty() {
        "None".to_string()
    } else {
        indexed
            .foreign_keys
            .iter()
            .map(|fk| {
                format!(
                    "{} -> {}({})",
                    fk.constrained_columns.join(", "),
                    fk.referred_table,
                    fk.referred_columns.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    };

    TableDoc {
        table: table.to_string(),
        text: format!(
            "Table {}: columns: {}. Primary key: {}. Foreign keys: {}.",
            table,
            columns.join("; "),
            primary_key,
            foreign_keys
        ),
    }
}

/// Description of one column; the example text is cut to `max_chars`.
fn column_doc(table: &str, column: &ColumnRecord, samples: &Samples, max_chars: usize) -> ColumnDoc {
    let examples: String = samples
        .get(&column.name)
        .map(|v| v.join(", "))
        .unwrap_or_default()
        .chars()
        .take(max_chars)
        .collect();

    ColumnDoc {
        table: table.to_string(),
        column: column.name.clone(),
        text: format!(
            "Column {}.{} ({}). Examples: {}.",
            table,
            column.name,
            type_label(column),
            examples
        ),
    }
}

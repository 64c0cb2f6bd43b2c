//! PostgreSQL schema source, executor and audit log

use crate::sql::{display_type, is_read, wrap_read};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use sqlgate_core::{
    AuditEntry, AuditLog, AuditRecord, AuditRow, DatabaseConfig, Error, ExecutionResult, Executor,
    Result,
};
use sqlgate_schema::{ColumnRecord, RawSchema, SchemaSource};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::time::Duration;

/// Table the audit log writes to, in each target database.
pub const AUDIT_TABLE: &str = "query_history";

const COLUMNS_QUERY: &str = r#"
    SELECT
        table_name::text AS table_name,
        column_name::text AS column_name,
        data_type::text AS data_type,
        character_maximum_length::int4 AS char_len,
        numeric_precision::int4 AS numeric_precision,
        numeric_scale::int4 AS numeric_scale,
        is_nullable::text AS is_nullable,
        column_default::text AS column_default
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name <> $2
    ORDER BY table_name, ordinal_position
"#;

const CREATE_AUDIT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS query_history (
        id SERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        db_name TEXT NOT NULL,
        user_prompt TEXT NOT NULL,
        generated_sql TEXT NOT NULL,
        result JSONB,
        created_at TIMESTAMPTZ DEFAULT now()
    )
"#;

const INSERT_AUDIT: &str = r#"
    INSERT INTO query_history (user_id, db_name, user_prompt, generated_sql, result, created_at)
    VALUES ($1, $2, $3, $4, $5, now())
    RETURNING id::int8 AS id, created_at::timestamptz AS created_at
"#;

const FETCH_AUDIT: &str = r#"
    SELECT id::int8 AS id, user_prompt, generated_sql, result,
           created_at::timestamptz AS created_at
    FROM query_history
    WHERE user_id = $1 AND db_name = $2
    ORDER BY created_at DESC
    LIMIT $3
"#;

/// Connection pools to the databases on one PostgreSQL server, one pool per
/// database name, created on first use.
pub struct PgDatabase {
    config: DatabaseConfig,
    pools: DashMap<String, PgPool>,
    audit_ready: DashSet<String>,
}

impl PgDatabase {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pools: DashMap::new(),
            audit_ready: DashSet::new(),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn connect_options(&self, db_name: &str) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .database(db_name);
        if let Some(ref password) = self.config.password {
            options = options.password(password);
        }
        options
    }

    /// Pool for `db_name`. Connections are opened lazily, so this never
    /// blocks on the network.
    pub fn pool(&self, db_name: &str) -> PgPool {
        self.pools
            .entry(db_name.to_string())
            .or_insert_with(|| {
                tracing::debug!(db = %db_name, "Creating connection pool");
                PgPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .acquire_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
                    .connect_lazy_with(self.connect_options(db_name))
            })
            .value()
            .clone()
    }

    /// Cheap connectivity probe used by readiness checks.
    pub async fn ping(&self, db_name: &str) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool(db_name))
            .await
            .map(|_| ())
            .map_err(|e| db_error("Ping failed", e))
    }

    /// Column metadata of every table in the configured schema, keyed by
    /// table name. The audit table is left out.
    pub async fn fetch_columns(&self, db_name: &str) -> Result<BTreeMap<String, Vec<ColumnRecord>>> {
        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(&self.config.schema)
            .bind(AUDIT_TABLE)
            .fetch_all(&self.pool(db_name))
            .await
            .map_err(|e| db_error("Failed to read schema", e))?;

        let mut tables: BTreeMap<String, Vec<ColumnRecord>> = BTreeMap::new();
        for row in &rows {
            let table: String = get(row, "table_name")?;
            let record = column_record(row)?;
            tables.entry(table).or_default().push(record);
        }

        tracing::debug!(db = %db_name, tables = tables.len(), "Read live schema");
        Ok(tables)
    }

    async fn ensure_audit_table(&self, db_name: &str) -> Result<()> {
        if self.audit_ready.contains(db_name) {
            return Ok(());
        }

        sqlx::query(CREATE_AUDIT_TABLE)
            .execute(&self.pool(db_name))
            .await
            .map_err(|e| db_error("Failed to create audit table", e))?;

        self.audit_ready.insert(db_name.to_string());
        Ok(())
    }
}

#[async_trait]
impl SchemaSource for PgDatabase {
    async fn get_schema(&self, db_name: &str) -> Result<RawSchema> {
        Ok(RawSchema::ColumnRecords(self.fetch_columns(db_name).await?))
    }
}

#[async_trait]
impl Executor for PgDatabase {
    async fn execute(&self, db_name: &str, sql: &str) -> Result<ExecutionResult> {
        let pool = self.pool(db_name);

        if is_read(sql) {
            tracing::debug!(db = %db_name, sql = %sql, "Executing read");

            let rows = sqlx::query(&wrap_read(sql, self.config.max_rows))
                .fetch_all(&pool)
                .await
                .map_err(|e| db_error("Query failed", e))?;

            let values = rows
                .iter()
                .map(|row| get::<serde_json::Value>(row, "row"))
                .collect::<Result<Vec<_>>>()?;
            return Ok(ExecutionResult::Rows(values));
        }

        tracing::warn!(db = %db_name, sql = %sql, "Executing write");

        let result = sqlx::query(sql)
            .execute(&pool)
            .await
            .map_err(|e| db_error("Execute failed", e))?;

        Ok(ExecutionResult::Affected(result.rows_affected()))
    }
}

#[async_trait]
impl AuditLog for PgDatabase {
    async fn record(&self, entry: AuditEntry) -> Result<AuditRecord> {
        self.ensure_audit_table(&entry.db_name).await?;

        let row = sqlx::query(INSERT_AUDIT)
            .bind(&entry.user_id)
            .bind(&entry.db_name)
            .bind(&entry.request)
            .bind(&entry.sql)
            .bind(&entry.result)
            .fetch_one(&self.pool(&entry.db_name))
            .await
            .map_err(|e| db_error("Failed to record history", e))?;

        Ok(AuditRecord {
            id: get(&row, "id")?,
            created_at: get(&row, "created_at")?,
        })
    }

    async fn fetch(&self, user_id: &str, db_name: &str, limit: i64) -> Result<Vec<AuditRow>> {
        self.ensure_audit_table(db_name).await?;

        let rows = sqlx::query(FETCH_AUDIT)
            .bind(user_id)
            .bind(db_name)
            .bind(limit)
            .fetch_all(&self.pool(db_name))
            .await
            .map_err(|e| db_error("Failed to fetch history", e))?;

        rows.iter()
            .map(|row| {
                Ok(AuditRow {
                    id: get(row, "id")?,
                    user_prompt: get(row, "user_prompt")?,
                    generated_sql: get(row, "generated_sql")?,
                    result: get(row, "result")?,
                    created_at: get::<DateTime<Utc>>(row, "created_at")?,
                })
            })
            .collect()
    }
}

fn column_record(row: &PgRow) -> Result<ColumnRecord> {
    let data_type: String = get(row, "data_type")?;
    let sql_type = display_type(
        &data_type,
        get(row, "char_len")?,
        get(row, "numeric_precision")?,
        get(row, "numeric_scale")?,
    );

    let mut record = ColumnRecord::new(get::<String>(row, "column_name")?).with_type(sql_type);
    if get::<String>(row, "is_nullable")? == "NO" {
        record = record.not_null();
    }
    if let Some(default) = get::<Option<String>>(row, "column_default")? {
        record = record.with_default(serde_json::Value::String(default));
    }
    Ok(record)
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| db_error(&format!("Failed to decode column '{}'", column), e))
}

pub(crate) fn db_error(context: &str, err: sqlx::Error) -> Error {
    Error::Database(format!("{}: {}", context, err))
}

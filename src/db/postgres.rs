//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient`
//! trait for PostgreSQL databases using sqlx.
//!
//! Batch statements are sent over the simple query protocol
//! (`sqlx::raw_sql`): no statement is prepared, and every column comes back
//! in text format so types without a dedicated [`Value`] variant can still be
//! rendered.

use crate::batch::{
    self, timing, BatchConnection, BatchOptions, BatchTransaction, ExecutionOutcome, RowSet,
};
use crate::config::ConnectionConfig;
use crate::db::{DatabaseClient, DatabaseInfo, Row, SchemaInfo, Value};
use crate::error::{DmanError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{
    Column as SqlxColumn, Executor, Postgres, Row as SqlxRow, Statement, Transaction, TypeInfo,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Pool size. Each batch holds one connection for its whole transaction.
const MAX_CONNECTIONS: u32 = 5;

/// PostgreSQL database client.
#[derive(Debug, Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects to the server described by `config`, retrying transient failures.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(Self { pool });
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, config)),
            }
        }
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                d.datname::text,
                r.rolname::text,
                pg_encoding_to_char(d.encoding)::text
            FROM pg_database d
            JOIN pg_roles r ON d.datdba = r.oid
            WHERE d.datname NOT IN ('template0', 'template1')
            ORDER BY d.datname
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DmanError::query(format!("Failed to list databases: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(name, owner, encoding)| DatabaseInfo {
                name,
                owner,
                encoding,
            })
            .collect())
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT nspname::text
            FROM pg_catalog.pg_namespace
            WHERE nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
            ORDER BY nspname
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DmanError::query(format!("Failed to list schemas: {e}")))?;

        Ok(names.into_iter().map(|name| SchemaInfo { name }).collect())
    }

    async fn execute_batch(&self, sql: &str, options: &BatchOptions) -> Result<ExecutionOutcome> {
        batch::execute_batch(self, sql, options).await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl BatchConnection for PostgresClient {
    type Transaction = PgBatchTransaction;

    async fn begin(&self) -> Result<PgBatchTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DmanError::connection(format!("Failed to begin transaction: {e}")))?;
        Ok(PgBatchTransaction { tx })
    }
}

/// One batch's transaction on a pooled connection.
///
/// sqlx rolls the transaction back when this is dropped unfinished, which is
/// what happens when a batch is cancelled or times out.
pub struct PgBatchTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgBatchTransaction {
    async fn run_command(&mut self, sql: &str) -> Result<()> {
        let conn: &mut PgConnection = &mut self.tx;
        conn.execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| DmanError::query(format_query_error(e)))?;
        Ok(())
    }

    /// Column names for a statement that returned no rows.
    async fn describe_columns(&mut self, sql: &str) -> Result<Vec<String>> {
        let conn: &mut PgConnection = &mut self.tx;
        let statement = conn
            .prepare(sql)
            .await
            .map_err(|e| DmanError::query(format!("Failed to describe result columns: {e}")))?;
        Ok(statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect())
    }
}

#[async_trait]
impl BatchTransaction for PgBatchTransaction {
    async fn fetch_rows(&mut self, sql: &str) -> Result<RowSet> {
        let conn: &mut PgConnection = &mut self.tx;
        let rows: Vec<PgRow> = conn
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(|e| DmanError::query(format_query_error(e)))?;

        let columns = match rows.first() {
            Some(first) => first
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
            None => self.describe_columns(sql).await?,
        };

        Ok(RowSet::new(columns, rows.iter().map(convert_row).collect()))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let conn: &mut PgConnection = &mut self.tx;
        let result = conn
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| DmanError::query(format_query_error(e)))?;
        Ok(result.rows_affected())
    }

    async fn explain_analyze(&mut self, sql: &str) -> Result<String> {
        let explain = timing::explain_sql(sql);
        let conn: &mut PgConnection = &mut self.tx;
        let row = conn
            .fetch_one(sqlx::raw_sql(&explain))
            .await
            .map_err(|e| DmanError::query(format_query_error(e)))?;
        row.try_get_unchecked::<String, _>(0)
            .map_err(|e| DmanError::query(format!("Unreadable EXPLAIN output: {e}")))
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.run_command(&format!("SAVEPOINT {name}")).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.run_command(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .await
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.run_command(&format!("RELEASE SAVEPOINT {name}")).await
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| DmanError::commit(format_query_error(e)))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DmanError::query(format_query_error(e)))
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode(row, index, Value::Bool),
        "INT2" | "SMALLINT" => decode(row, index, |v: i16| Value::Int(v as i64)),
        "INT4" | "INT" | "INTEGER" => decode(row, index, |v: i32| Value::Int(v as i64)),
        "INT8" | "BIGINT" => decode(row, index, Value::Int),
        "FLOAT4" | "REAL" => decode(row, index, |v: f32| Value::Float(v as f64)),
        "FLOAT8" | "DOUBLE PRECISION" => decode(row, index, Value::Float),
        "BYTEA" => decode(row, index, Value::Bytes),
        "TIMESTAMP" => decode(row, index, Value::Timestamp),
        "TIMESTAMPTZ" => decode(row, index, Value::TimestampTz),
        "DATE" => decode(row, index, Value::Date),
        "TIME" => decode(row, index, Value::Time),
        "JSON" | "JSONB" => decode(row, index, Value::Json),
        _ => text_value(row, index),
    }
}

/// Decodes a typed column, falling back to its text rendering if decoding fails.
fn decode<'r, T>(row: &'r PgRow, index: usize, wrap: impl FnOnce(T) -> Value) -> Value
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(Some(value)) => wrap(value),
        Ok(None) => Value::Null,
        Err(e) => {
            debug!("Column {} did not decode as typed value: {}", index, e);
            text_value(row, index)
        }
    }
}

/// Reads a column as the server's text rendering.
fn text_value(row: &PgRow, index: usize) -> Value {
    row.try_get_unchecked::<Option<String>, _>(index)
        .ok()
        .flatten()
        .map(Value::Text)
        .unwrap_or(Value::Null)
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();
    [
        "connection refused",
        "timed out",
        "temporarily unavailable",
        "connection reset",
        "broken pipe",
        "the database system is starting up",
    ]
    .iter()
    .any(|needle| error_str.contains(needle))
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> DmanError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        DmanError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        DmanError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("connection refused") || error_str.contains("could not connect")
    {
        DmanError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        DmanError::connection(
            "Server requires SSL. Add '?sslmode=require' to the connection string.",
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        DmanError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        DmanError::connection(error.to_string())
    }
}

/// Formats a database error: the server message verbatim, followed by any
/// DETAIL, HINT and CONSTRAINT the server attached.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = db_error.message().to_string();

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
        if let Some(constraint) = pg_error.constraint() {
            result.push_str("\n  CONSTRAINT: ");
            result.push_str(constraint);
        }
    }

    result
}

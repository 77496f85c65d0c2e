//! Database abstraction layer for dman.
//!
//! Provides a trait-based interface for database operations, so the CLI and
//! tests can run against PostgreSQL or the scripted mock interchangeably.

mod catalog;
mod mock;
mod postgres;
mod types;

pub use catalog::{DatabaseInfo, SchemaInfo};
pub use mock::{MockDatabaseClient, MockEvent, MockResponse, MockTransaction};
pub use postgres::{PgBatchTransaction, PostgresClient};
pub use types::{Row, Value};

use crate::batch::{BatchOptions, ExecutionOutcome};
use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Creates a database client for the given configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    let client = PostgresClient::connect(config).await?;
    Ok(Box::new(client))
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with DmanError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Lists the server's databases, excluding templates.
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// Lists the connected database's schemas, excluding system schemas.
    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>>;

    /// Executes a block of SQL statements as one atomic batch.
    async fn execute_batch(&self, sql: &str, options: &BatchOptions) -> Result<ExecutionOutcome>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}

//! Integration tests for dman.

pub mod catalog_test;
pub mod connection_test;
pub mod query_test;

use dman::config::ConnectionConfig;
use dman::db::PostgresClient;

/// Helper to get test database URL from environment.
pub fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a test client.
pub async fn get_test_client() -> Option<PostgresClient> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    PostgresClient::connect(&config).await.ok()
}

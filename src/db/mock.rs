//! Mock database client for testing.
//!
//! Responses are scripted per statement text and every transaction call is
//! appended to a journal, so tests can assert exactly what a batch sent and
//! whether it committed or rolled back.

use super::{DatabaseClient, DatabaseInfo, SchemaInfo};
use crate::batch::{self, BatchConnection, BatchOptions, BatchTransaction, ExecutionOutcome, RowSet};
use crate::error::{DmanError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Plan returned for statements without a scripted `EXPLAIN` response.
const DEFAULT_PLAN: &str = r#"[{"Plan": {"Node Type": "Result"}, "Execution Time": 0.042}]"#;

/// Scripted response for one statement.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Rows(RowSet),
    Affected(u64),
    Error(String),
}

/// A call made against a mock transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Begin,
    Query(String),
    Execute(String),
    Explain(String),
    Savepoint(String),
    RollbackToSavepoint(String),
    ReleaseSavepoint(String),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, MockResponse>,
    explains: HashMap<String, std::result::Result<String, String>>,
    databases: Vec<DatabaseInfo>,
    schemas: Vec<SchemaInfo>,
    begin_error: Option<String>,
    commit_error: Option<String>,
    savepoint_error: Option<String>,
    statement_delay: Option<Duration>,
    journal: Vec<MockEvent>,
}

/// A mock database client that returns scripted results.
///
/// Unscripted row-producing statements return an empty result set and
/// unscripted mutations affect zero rows.
#[derive(Debug, Clone, Default)]
pub struct MockDatabaseClient {
    state: Arc<Mutex<MockState>>,
}

impl MockDatabaseClient {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a result set for `sql`.
    pub fn with_rows(self, sql: &str, rows: RowSet) -> Self {
        self.script(sql, MockResponse::Rows(rows))
    }

    /// Scripts an affected-row count for `sql`.
    pub fn with_affected(self, sql: &str, affected: u64) -> Self {
        self.script(sql, MockResponse::Affected(affected))
    }

    /// Scripts a database error for `sql`.
    pub fn with_error(self, sql: &str, message: &str) -> Self {
        self.script(sql, MockResponse::Error(message.to_string()))
    }

    /// Scripts the `EXPLAIN (ANALYZE, FORMAT JSON)` output for `sql`.
    pub fn with_explain(self, sql: &str, plan: &str) -> Self {
        self.lock()
            .explains
            .insert(sql.to_string(), Ok(plan.to_string()));
        self
    }

    /// Makes the plan-analysis request for `sql` fail.
    pub fn with_explain_error(self, sql: &str, message: &str) -> Self {
        self.lock()
            .explains
            .insert(sql.to_string(), Err(message.to_string()));
        self
    }

    pub fn with_databases(self, databases: Vec<DatabaseInfo>) -> Self {
        self.lock().databases = databases;
        self
    }

    pub fn with_schemas(self, schemas: Vec<SchemaInfo>) -> Self {
        self.lock().schemas = schemas;
        self
    }

    /// Makes `begin` fail with a connection error.
    pub fn with_begin_error(self, message: &str) -> Self {
        self.lock().begin_error = Some(message.to_string());
        self
    }

    /// Makes `commit` fail.
    pub fn with_commit_error(self, message: &str) -> Self {
        self.lock().commit_error = Some(message.to_string());
        self
    }

    /// Makes every savepoint command fail.
    pub fn with_savepoint_error(self, message: &str) -> Self {
        self.lock().savepoint_error = Some(message.to_string());
        self
    }

    /// Delays every statement, for exercising timeouts.
    pub fn with_statement_delay(self, delay: Duration) -> Self {
        self.lock().statement_delay = Some(delay);
        self
    }

    /// Returns every call recorded so far, in order.
    pub fn journal(&self) -> Vec<MockEvent> {
        self.lock().journal.clone()
    }

    fn script(self, sql: &str, response: MockResponse) -> Self {
        self.lock().responses.insert(sql.to_string(), response);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BatchConnection for MockDatabaseClient {
    type Transaction = MockTransaction;

    async fn begin(&self) -> Result<MockTransaction> {
        let mut state = self.lock();
        if let Some(message) = &state.begin_error {
            return Err(DmanError::connection(message.clone()));
        }
        state.journal.push(MockEvent::Begin);
        Ok(MockTransaction {
            state: Arc::clone(&self.state),
            finished: false,
        })
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        Ok(self.lock().databases.clone())
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>> {
        Ok(self.lock().schemas.clone())
    }

    async fn execute_batch(&self, sql: &str, options: &BatchOptions) -> Result<ExecutionOutcome> {
        batch::execute_batch(self, sql, options).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Transaction handed out by [`MockDatabaseClient`].
///
/// Dropping it unfinished records a rollback, as a real driver would issue one.
#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<Mutex<MockState>>,
    finished: bool,
}

impl MockTransaction {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `event` and returns the scripted response for `sql`.
    async fn respond(&self, event: MockEvent, sql: &str) -> Option<MockResponse> {
        let (response, delay) = {
            let mut state = self.lock();
            state.journal.push(event);
            (state.responses.get(sql).cloned(), state.statement_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    fn savepoint_command(&self, event: MockEvent) -> Result<()> {
        let mut state = self.lock();
        state.journal.push(event);
        match &state.savepoint_error {
            Some(message) => Err(DmanError::query(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BatchTransaction for MockTransaction {
    async fn fetch_rows(&mut self, sql: &str) -> Result<RowSet> {
        match self.respond(MockEvent::Query(sql.to_string()), sql).await {
            Some(MockResponse::Rows(rows)) => Ok(rows),
            Some(MockResponse::Error(message)) => Err(DmanError::query(message)),
            Some(MockResponse::Affected(_)) | None => Ok(RowSet::default()),
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        match self.respond(MockEvent::Execute(sql.to_string()), sql).await {
            Some(MockResponse::Affected(affected)) => Ok(affected),
            Some(MockResponse::Rows(rows)) => Ok(rows.rows.len() as u64),
            Some(MockResponse::Error(message)) => Err(DmanError::query(message)),
            None => Ok(0),
        }
    }

    async fn explain_analyze(&mut self, sql: &str) -> Result<String> {
        let mut state = self.lock();
        state.journal.push(MockEvent::Explain(sql.to_string()));
        if let Some(MockResponse::Error(message)) = state.responses.get(sql) {
            return Err(DmanError::query(message.clone()));
        }
        match state.explains.get(sql) {
            Some(Ok(plan)) => Ok(plan.clone()),
            Some(Err(message)) => Err(DmanError::query(message.clone())),
            None => Ok(DEFAULT_PLAN.to_string()),
        }
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command(MockEvent::Savepoint(name.to_string()))
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command(MockEvent::RollbackToSavepoint(name.to_string()))
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_command(MockEvent::ReleaseSavepoint(name.to_string()))
    }

    async fn commit(mut self) -> Result<()> {
        self.finished = true;
        let mut state = self.lock();
        state.journal.push(MockEvent::Commit);
        match &state.commit_error {
            Some(message) => Err(DmanError::commit(message.clone())),
            None => Ok(()),
        }
    }

    async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.lock().journal.push(MockEvent::Rollback);
        Ok(())
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.lock().journal.push(MockEvent::Rollback);
        }
    }
}

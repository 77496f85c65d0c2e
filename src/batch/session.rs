//! Atomic batch execution.
//!
//! An [`ExecutionSession`] opens one transaction, runs every statement of a
//! [`StatementBatch`] in order inside it, and commits only if all of them
//! succeeded. The first failing statement stops the batch and rolls the whole
//! transaction back.
//!
//! The session talks to the database through [`BatchConnection`] and
//! [`BatchTransaction`], so the same logic drives both the PostgreSQL client
//! and the scripted mock.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::classifier::{classify_statement, StatementKind};
use super::outcome::{ExecutionOutcome, ResultAggregator, RowSet};
use super::splitter::{SplitMode, StatementBatch};
use super::timing;
use crate::error::{DmanError, Result};

/// Something that can open a transaction for one batch.
#[async_trait]
pub trait BatchConnection: Sync {
    type Transaction: BatchTransaction;

    /// Begins a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;
}

/// One open transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) must roll it back.
#[async_trait]
pub trait BatchTransaction: Send {
    /// Executes a statement and returns its columns and every row.
    async fn fetch_rows(&mut self, sql: &str) -> Result<RowSet>;

    /// Executes a statement and returns the number of rows it affected.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Runs `EXPLAIN (ANALYZE, FORMAT JSON)` for a statement and returns the raw plan text.
    async fn explain_analyze(&mut self, sql: &str) -> Result<String>;

    async fn savepoint(&mut self, name: &str) -> Result<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    async fn release_savepoint(&mut self, name: &str) -> Result<()>;

    /// Commits. Failures are reported as [`DmanError::Commit`].
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Per-batch execution settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// How statement boundaries are found.
    pub split_mode: SplitMode,

    /// Whether row-producing statements get a server-side timing probe.
    pub timing: bool,

    /// Upper bound on the whole batch. On expiry the transaction is dropped
    /// and therefore rolled back.
    pub timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            split_mode: SplitMode::Plain,
            timing: true,
            timeout: None,
        }
    }
}

impl BatchOptions {
    pub fn with_split_mode(mut self, split_mode: SplitMode) -> Self {
        self.split_mode = split_mode;
        self
    }

    pub fn with_timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Splits `sql` and executes it as one atomic batch on `conn`.
pub async fn execute_batch<C>(conn: &C, sql: &str, options: &BatchOptions) -> Result<ExecutionOutcome>
where
    C: BatchConnection,
{
    let batch = StatementBatch::parse(sql, options.split_mode);
    debug!(
        "Parsed {} statement(s) using {} splitting",
        batch.len(),
        options.split_mode
    );

    let session = ExecutionSession::new(options.timing);
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, session.run(conn, &batch))
            .await
            .map_err(|_| {
                warn!("Batch exceeded {:?}, transaction dropped", limit);
                DmanError::query(format!(
                    "Batch timed out after {} seconds",
                    limit.as_secs_f64()
                ))
            })?,
        None => session.run(conn, &batch).await,
    }
}

/// Drives one batch through one transaction.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSession {
    timing: bool,
}

impl ExecutionSession {
    pub fn new(timing: bool) -> Self {
        Self { timing }
    }

    /// Executes every statement in order inside a single transaction.
    ///
    /// A transaction is opened even for an empty batch, so an empty input
    /// commits trivially.
    pub async fn run<C>(&self, conn: &C, batch: &StatementBatch) -> Result<ExecutionOutcome>
    where
        C: BatchConnection,
    {
        let start = Instant::now();
        let mut tx = conn.begin().await?;
        let mut aggregator = ResultAggregator::new();

        for (index, statement) in batch.iter().enumerate() {
            if let Err(e) = self
                .execute_statement(&mut tx, statement, &mut aggregator)
                .await
            {
                warn!(
                    "Statement {} of {} failed, rolling back batch: {}",
                    index + 1,
                    batch.len(),
                    e
                );
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed statement also failed: {}", rollback_err);
                }
                return Err(e);
            }
        }

        tx.commit().await.map_err(|e| match e {
            DmanError::Commit(_) => e,
            other => DmanError::commit(other.message()),
        })?;

        let outcome = aggregator.finish();
        info!(
            "Committed batch of {} statement(s) in {:?} ({} affected row(s))",
            batch.len(),
            start.elapsed(),
            outcome.affected_rows
        );
        Ok(outcome)
    }

    async fn execute_statement<T>(
        &self,
        tx: &mut T,
        statement: &str,
        aggregator: &mut ResultAggregator,
    ) -> Result<()>
    where
        T: BatchTransaction,
    {
        let kind = classify_statement(statement);
        debug!("Executing {} statement: {}", kind, statement);

        match kind {
            StatementKind::RowProducing => {
                let execution_time_ms = if self.timing {
                    timing::probe(tx, statement).await?
                } else {
                    None
                };
                let row_set = tx.fetch_rows(statement).await?;
                aggregator.apply_rows(row_set, execution_time_ms);
            }
            StatementKind::Mutation => {
                let affected = tx.execute(statement).await?;
                aggregator.apply_mutation(affected);
            }
        }
        Ok(())
    }
}

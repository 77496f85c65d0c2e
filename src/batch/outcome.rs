//! Batch results.
//!
//! [`ExecutionOutcome`] is the single value a batch produces, and
//! [`ResultAggregator`] applies the per-statement update rule while the
//! session runs:
//!
//! - a row-producing statement **replaces** `columns` and `rows`, sets
//!   `affected_rows` to its own row count and sets `execution_time_ms` to its
//!   own probe result (absent if it was not timed);
//! - a mutation **adds** its affected-row count to `affected_rows`.
//!
//! So `INSERT ...; INSERT ...; SELECT ...` ends with `affected_rows` equal to
//! the SELECT's row count, not 2, while `SELECT ...; INSERT ...` ends with the
//! SELECT's row count plus the INSERT's count.

use serde::Serialize;

use crate::db::Row;
use crate::error::{DmanError, Result};

/// Aggregate result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Column names of the last row-producing statement.
    pub columns: Vec<String>,

    /// Rows of the last row-producing statement.
    pub rows: Vec<Row>,

    /// See the module docs for the accumulate/overwrite rule.
    pub affected_rows: u64,

    /// Server-side execution time of the last row-producing statement, if it was timed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,

    /// Set only when the batch failed; all other fields are then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Which stage failed, set together with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Stage of a batch that produced its error.
///
/// `Commit` means every statement ran but nothing was persisted;
/// `Execution` means a statement failed and the batch was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Connection,
    Execution,
    Commit,
    Internal,
}

impl From<&DmanError> for ErrorKind {
    fn from(error: &DmanError) -> Self {
        match error {
            DmanError::Connection(_) => Self::Connection,
            DmanError::Query(_) => Self::Execution,
            DmanError::Commit(_) => Self::Commit,
            DmanError::Config(_) | DmanError::Internal(_) => Self::Internal,
        }
    }
}

impl ExecutionOutcome {
    /// Creates an empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the outcome reported for a failed batch.
    pub fn failed(error: &DmanError) -> Self {
        Self {
            error: Some(error.message().to_string()),
            error_kind: Some(ErrorKind::from(error)),
            ..Self::default()
        }
    }

    /// Folds a batch result into the response shape: errors become an
    /// outcome with `error` set and no data.
    pub fn from_result(result: Result<Self>) -> Self {
        result.unwrap_or_else(|e| Self::failed(&e))
    }

    /// Returns true if the batch failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Columns and rows fetched for one row-producing statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }
}

/// Accumulates one batch's outcome. Owned by a single session.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    outcome: ExecutionOutcome,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a row-producing statement, replacing any earlier result set.
    pub fn apply_rows(&mut self, row_set: RowSet, execution_time_ms: Option<f64>) {
        self.outcome.affected_rows = row_set.rows.len() as u64;
        self.outcome.columns = row_set.columns;
        self.outcome.rows = row_set.rows;
        self.outcome.execution_time_ms = execution_time_ms;
    }

    /// Records a mutation, adding to the affected-row total.
    pub fn apply_mutation(&mut self, affected: u64) {
        self.outcome.affected_rows = self.outcome.affected_rows.saturating_add(affected);
    }

    /// Consumes the aggregator at batch end.
    pub fn finish(self) -> ExecutionOutcome {
        self.outcome
    }
}

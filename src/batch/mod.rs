//! Multi-statement transactional execution.
//!
//! A block of SQL text is split into statements, each statement is classified
//! as row-producing or mutating, and the whole batch runs in one transaction
//! whose result is aggregated into an [`ExecutionOutcome`].

mod classifier;
mod outcome;
mod session;
mod splitter;
pub mod timing;

pub use classifier::{classify_statement, StatementKind};
pub use outcome::{ErrorKind, ExecutionOutcome, ResultAggregator, RowSet};
pub use session::{execute_batch, BatchConnection, BatchOptions, BatchTransaction, ExecutionSession};
pub use splitter::{split_statements, split_statements_lexical, SplitMode, StatementBatch};

//! Server-side timing for row-producing statements.
//!
//! The probe runs `EXPLAIN (ANALYZE, FORMAT JSON)` for the statement inside a
//! savepoint and always rolls back to that savepoint afterwards. Any
//! transactional effect of the analyzed run is discarded before the statement
//! executes for real, and a failed probe leaves the surrounding transaction
//! usable. Effects that ignore transactions (sequence increments, side
//! effects of volatile functions outside the database) still happen twice.

use serde::Deserialize;
use tracing::{debug, warn};

use super::session::BatchTransaction;
use crate::error::Result;

/// Savepoint wrapped around every probe.
pub const PROBE_SAVEPOINT: &str = "dman_timing_probe";

/// Builds the plan-analysis statement for `sql`.
pub fn explain_sql(sql: &str) -> String {
    format!("EXPLAIN (ANALYZE, FORMAT JSON) {sql}")
}

#[derive(Debug, Deserialize)]
struct PlanReport {
    #[serde(rename = "Execution Time")]
    execution_time: Option<f64>,
}

/// Measures `statement` and returns its execution time in milliseconds.
///
/// A failing or unparsable plan yields `Ok(None)`. Only a failure of the
/// savepoint commands is returned as an error, since the transaction state is
/// then unknown.
pub async fn probe<T>(tx: &mut T, statement: &str) -> Result<Option<f64>>
where
    T: BatchTransaction,
{
    tx.savepoint(PROBE_SAVEPOINT).await?;
    let report = tx.explain_analyze(statement).await;
    tx.rollback_to_savepoint(PROBE_SAVEPOINT).await?;
    tx.release_savepoint(PROBE_SAVEPOINT).await?;

    match report {
        Ok(plan) => {
            let execution_time = parse_execution_time(&plan);
            debug!("Timing probe: {:?} ms", execution_time);
            Ok(execution_time)
        }
        Err(e) => {
            warn!("Timing probe failed, continuing without timing: {}", e);
            Ok(None)
        }
    }
}

/// Extracts `Execution Time` from the JSON output of `EXPLAIN (ANALYZE, FORMAT JSON)`.
pub fn parse_execution_time(plan: &str) -> Option<f64> {
    match serde_json::from_str::<Vec<PlanReport>>(plan) {
        Ok(reports) => reports.first().and_then(|report| report.execution_time),
        Err(e) => {
            warn!("Failed to parse EXPLAIN output: {}", e);
            None
        }
    }
}

//! Statements and row handling shared by the relational run storage backends.
//!
//! Placeholders use the `$N` form, which both postgres and sqlite bind by position.

use sqlx::Error as SqlxError;

use super::runs::{duplicate_run_error, missing_run_error, PipelineRun};
use crate::error::{CoordinatorError, Result};

pub(crate) const INSERT_RUN: &str =
    "INSERT INTO runs (run_id, pipeline_name, status, run_body) VALUES ($1, $2, $3, $4)";

pub(crate) const SELECT_RUN: &str = "SELECT run_body, status FROM runs WHERE run_id = $1";

pub(crate) const SELECT_ALL_RUNS: &str = "SELECT run_body, status FROM runs ORDER BY id DESC";

pub(crate) const UPDATE_RUN_STATUS: &str =
    "UPDATE runs SET status = $1, update_timestamp = CURRENT_TIMESTAMP WHERE run_id = $2";

pub(crate) const DELETE_ALL_RUNS: &str = "DELETE FROM runs";

/// `(run_body, status)` as selected by [`SELECT_RUN`] and [`SELECT_ALL_RUNS`]
pub(crate) type RunRow = (String, String);

/// Map an insert failure; a unique violation on `run_id` is a duplicate run.
pub(crate) fn insert_error(run_id: &str, error: SqlxError) -> CoordinatorError {
    match error {
        SqlxError::Database(db_error) if db_error.is_unique_violation() => {
            duplicate_run_error(run_id)
        }
        other => other.into(),
    }
}

pub(crate) fn decode_run(row: Option<RunRow>) -> Result<Option<PipelineRun>> {
    row.map(|(body, status)| PipelineRun::from_body(&body, &status))
        .transpose()
}

pub(crate) fn decode_runs(rows: Vec<RunRow>) -> Result<Vec<PipelineRun>> {
    rows.iter()
        .map(|(body, status)| PipelineRun::from_body(body, status))
        .collect()
}

/// An update that touched no row names a run that does not exist.
pub(crate) fn ensure_updated(run_id: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        return Err(missing_run_error(run_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_without_rows_names_the_run() {
        assert!(ensure_updated("r1", 1).is_ok());
        let error = ensure_updated("r1", 0).unwrap_err();
        assert!(matches!(error, CoordinatorError::InvalidParameter(_)));
        assert!(error.to_string().contains("r1"));
    }

    #[test]
    fn test_non_constraint_insert_errors_stay_storage_errors() {
        assert!(matches!(
            insert_error("r1", SqlxError::PoolTimedOut),
            CoordinatorError::Storage(_)
        ));
    }
}

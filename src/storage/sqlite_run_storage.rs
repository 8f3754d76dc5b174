//! `SQLite`-backed run storage rooted in a local directory.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::run_sql::{self, RunRow};
use super::runs::{PipelineRun, PipelineRunStatus, RunStorage};
use super::{base_dir_config_type, BaseDirPluginConfig};
use crate::config_plugin::{typed_plugin_config, ConfigPlugin};
use crate::constants::layout::RUNS_DB_FILENAME;
use crate::error::Result;
use crate::logging::log_storage_operation;

/// Idempotent DDL for the run table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id VARCHAR(255) NOT NULL UNIQUE,
    pipeline_name TEXT NOT NULL,
    status VARCHAR(63) NOT NULL,
    run_body TEXT NOT NULL,
    create_timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    update_timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs (pipeline_name);
";

const MAX_CONNECTIONS: u32 = 5;

/// Run storage persisted in `<base_dir>/runs.db`.
///
/// Construct with [`SqliteRunStorage::from_local`]; a second construction over the
/// same directory reuses the existing file and rows.
#[derive(Debug, Clone)]
pub struct SqliteRunStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteRunStorage {
    /// Create the directory if needed, open (or create) the database and make sure
    /// the run schema exists.
    pub async fn from_local(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        tokio::fs::create_dir_all(base_dir).await?;
        let db_path = base_dir.join(RUNS_DB_FILENAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(CREATE_TABLES).execute(&pool).await?;

        log_storage_operation(
            "open",
            "sqlite_run_storage",
            Some(&db_path.display().to_string()),
            "success",
            None,
        );

        Ok(Self { pool, db_path })
    }

    /// Acquire a live connection to the run database
    pub async fn connect(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl RunStorage for SqliteRunStorage {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn add_run(&self, run: PipelineRun) -> Result<PipelineRun> {
        sqlx::query(run_sql::INSERT_RUN)
            .bind(&run.run_id)
            .bind(&run.pipeline_name)
            .bind(run.status.to_string())
            .bind(run.to_body()?)
            .execute(&self.pool)
            .await
            .map_err(|error| run_sql::insert_error(&run.run_id, error))?;

        debug!(run_id = %run.run_id, "Added run to sqlite run storage");
        Ok(run)
    }

    async fn get_run_by_id(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        let row: Option<RunRow> = sqlx::query_as(run_sql::SELECT_RUN)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        run_sql::decode_run(row)
    }

    async fn all_runs(&self) -> Result<Vec<PipelineRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(run_sql::SELECT_ALL_RUNS)
            .fetch_all(&self.pool)
            .await?;
        run_sql::decode_runs(rows)
    }

    async fn update_run_status(&self, run_id: &str, status: PipelineRunStatus) -> Result<()> {
        let result = sqlx::query(run_sql::UPDATE_RUN_STATUS)
            .bind(status.to_string())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        run_sql::ensure_updated(run_id, result.rows_affected())
    }

    async fn wipe(&self) -> Result<()> {
        sqlx::query(run_sql::DELETE_ALL_RUNS)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub fn sqlite_run_storage_config_plugin() -> ConfigPlugin<Arc<dyn RunStorage>> {
    ConfigPlugin::new(base_dir_config_type("SqliteRunStorageConfig"), |config| async move {
        let config: BaseDirPluginConfig = typed_plugin_config(config)?;
        let storage = SqliteRunStorage::from_local(&config.base_dir).await?;
        Ok(Arc::new(storage) as Arc<dyn RunStorage>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::config::RunConfig;

    fn sample_run(run_id: &str) -> PipelineRun {
        let run_config = RunConfig::builder().run_id(run_id).build().unwrap();
        PipelineRun::from_run_config("etl", &run_config)
    }

    #[tokio::test]
    async fn test_from_local_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("history");

        let storage = SqliteRunStorage::from_local(&base).await.unwrap();
        assert!(storage.is_persistent());
        assert_eq!(storage.db_path(), base.join("runs.db").as_path());
        assert!(base.join("runs.db").exists());

        let mut conn = storage.connect().await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM runs")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteRunStorage::from_local(dir.path()).await.unwrap();

        let run = sample_run("run-1");
        storage.add_run(run.clone()).await.unwrap();
        assert_eq!(storage.get_run_by_id("run-1").await.unwrap(), Some(run));
        assert!(storage.get_run_by_id("run-2").await.unwrap().is_none());

        let duplicate = storage.add_run(sample_run("run-1")).await;
        assert!(duplicate.is_err());

        storage
            .update_run_status("run-1", PipelineRunStatus::Failure)
            .await
            .unwrap();
        let stored = storage.get_run_by_id("run-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PipelineRunStatus::Failure);

        assert!(storage
            .update_run_status("run-2", PipelineRunStatus::Success)
            .await
            .is_err());

        storage.add_run(sample_run("run-2")).await.unwrap();
        let ids: Vec<_> = storage
            .all_runs()
            .await
            .unwrap()
            .into_iter()
            .map(|run| run.run_id)
            .collect();
        assert_eq!(ids, vec!["run-2".to_string(), "run-1".to_string()]);

        storage.wipe().await.unwrap();
        assert!(storage.all_runs().await.unwrap().is_empty());
    }
}

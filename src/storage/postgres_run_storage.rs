//! PostgreSQL-backed run storage.
//!
//! Registered through [`super::plugins::register_postgres_plugins`] like any
//! third-party backend; resolution goes through the same config plugin protocol as
//! the builtin sqlite storage.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use std::sync::Arc;
use tracing::{debug, warn};

use super::run_sql::{self, RunRow};
use super::runs::{PipelineRun, PipelineRunStatus, RunStorage};
use crate::config_plugin::schema::{ConfigType, Field};
use crate::config_plugin::{typed_plugin_config, ConfigPlugin};
use crate::error::Result;
use crate::logging::log_storage_operation;

/// Idempotent DDL for the run table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS runs (
    id BIGSERIAL PRIMARY KEY,
    run_id VARCHAR(255) NOT NULL UNIQUE,
    pipeline_name TEXT NOT NULL,
    status VARCHAR(63) NOT NULL,
    run_body TEXT NOT NULL,
    create_timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    update_timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs (pipeline_name);
";

const DROP_TABLES: &str = r"
DROP INDEX IF EXISTS idx_runs_pipeline_name;
DROP TABLE IF EXISTS runs;
";

const MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Deserialize)]
struct PostgresRunStorageConfig {
    postgres_url: String,
}

/// Run storage in a PostgreSQL database identified by a connection URL
#[derive(Debug, Clone)]
pub struct PostgresRunStorage {
    pool: PgPool,
}

impl PostgresRunStorage {
    /// Connect and make sure the run schema exists.
    pub async fn new(postgres_url: &str) -> Result<Self> {
        let pool = Self::connect_pool(postgres_url).await?;
        sqlx::raw_sql(CREATE_TABLES).execute(&pool).await?;

        log_storage_operation("open", "postgres_run_storage", None, "success", None);
        Ok(Self { pool })
    }

    /// Drop the run schema and recreate it empty.
    ///
    /// Destroys every stored run. Intended for test and operations resets only; the
    /// normal construction path is [`PostgresRunStorage::new`].
    pub async fn create_clean_storage(postgres_url: &str) -> Result<Self> {
        let pool = Self::connect_pool(postgres_url).await?;
        warn!("Dropping postgres run storage schema");
        sqlx::raw_sql(DROP_TABLES).execute(&pool).await?;
        pool.close().await;

        log_storage_operation("drop", "postgres_run_storage", None, "success", None);
        Self::new(postgres_url).await
    }

    /// Acquire a live connection
    pub async fn connect(&self) -> Result<PoolConnection<Postgres>> {
        Ok(self.pool.acquire().await?)
    }

    async fn connect_pool(postgres_url: &str) -> Result<PgPool> {
        Ok(PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(postgres_url)
            .await?)
    }
}

#[async_trait]
impl RunStorage for PostgresRunStorage {
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

        debug!(run_id = %run.run_id, "Added run to postgres run storage");
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

pub fn postgres_run_storage_config_plugin() -> ConfigPlugin<Arc<dyn RunStorage>> {
    ConfigPlugin::new(
        ConfigType::named_dict(
            "PostgresRunStorageConfigPlugin",
            [("postgres_url", Field::new(ConfigType::String))],
        ),
        |config| async move {
            let config: PostgresRunStorageConfig = typed_plugin_config(config)?;
            let storage = PostgresRunStorage::new(&config.postgres_url).await?;
            Ok(Arc::new(storage) as Arc<dyn RunStorage>)
        },
    )
}

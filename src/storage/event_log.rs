//! Event log storage: the persisted event trail of every run.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{base_dir_config_type, BaseDirPluginConfig};
use crate::config_plugin::{typed_plugin_config, ConfigPlugin};
use crate::error::{CoordinatorError, Result};
use crate::execution::events::PipelineEvent;
use crate::logging::log_storage_operation;

const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS event_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id VARCHAR(255) NOT NULL,
    event_body TEXT NOT NULL,
    event_type VARCHAR(63) NOT NULL,
    step_key TEXT,
    timestamp TEXT NOT NULL
);
";

const MAX_CONNECTIONS_PER_RUN: u32 = 2;

/// Runs whose pools are kept open at once; beyond this the cache evicts.
const MAX_OPEN_RUN_POOLS: usize = 32;

/// Capability set of the event log storage slot
#[async_trait]
pub trait EventLogStorage: Send + Sync + Debug {
    fn is_persistent(&self) -> bool;

    /// Append one event to its run's trail
    async fn store_event(&self, event: &PipelineEvent) -> Result<()>;

    /// Every stored event of `run_id` in the order stored. Unknown runs yield an
    /// empty trail.
    async fn get_logs_for_run(&self, run_id: &str) -> Result<Vec<PipelineEvent>>;

    async fn has_run(&self, run_id: &str) -> Result<bool> {
        Ok(!self.get_logs_for_run(run_id).await?.is_empty())
    }

    /// Release anything held open for `run_id`. Later reads and writes reopen it.
    async fn close_run(&self, _run_id: &str) -> Result<()> {
        Ok(())
    }

    /// Delete every stored trail
    async fn wipe(&self) -> Result<()>;
}

/// Process-local event storage backing ephemeral instances
#[derive(Debug, Default)]
pub struct InMemoryEventLogStorage {
    logs: RwLock<HashMap<String, Vec<PipelineEvent>>>,
}

impl InMemoryEventLogStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLogStorage for InMemoryEventLogStorage {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn store_event(&self, event: &PipelineEvent) -> Result<()> {
        self.logs
            .write()
            .entry(event.run_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn get_logs_for_run(&self, run_id: &str) -> Result<Vec<PipelineEvent>> {
        Ok(self.logs.read().get(run_id).cloned().unwrap_or_default())
    }

    async fn wipe(&self) -> Result<()> {
        self.logs.write().clear();
        Ok(())
    }
}

/// Event storage with one sqlite database per run at `<base_dir>/<run_id>.db`.
///
/// Pools are opened on the first write of a run and cached until the run is closed.
/// At most `MAX_OPEN_RUN_POOLS` runs stay cached; reads of runs that are not
/// cached use a pool that is closed right after the read.
#[derive(Debug)]
pub struct SqliteEventLogStorage {
    base_dir: PathBuf,
    pools: DashMap<String, SqlitePool>,
}

impl SqliteEventLogStorage {
    pub async fn from_local(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        tokio::fs::create_dir_all(base_dir).await?;

        log_storage_operation(
            "open",
            "sqlite_event_log_storage",
            Some(&base_dir.display().to_string()),
            "success",
            None,
        );

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            pools: DashMap::new(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn db_path_for_run(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(format!("{run_id}.db"))
    }

    /// Number of runs with a cached connection pool
    pub fn open_run_count(&self) -> usize {
        self.pools.len()
    }

    /// Acquire a connection to the run's database, creating it if needed.
    pub async fn connect(&self, run_id: &str) -> Result<PoolConnection<Sqlite>> {
        let pool = self.pool_for_run(run_id).await?;
        Ok(pool.acquire().await?)
    }

    async fn pool_for_run(&self, run_id: &str) -> Result<SqlitePool> {
        if let Some(pool) = self.pools.get(run_id) {
            return Ok(pool.value().clone());
        }

        let pool = self.open_pool(run_id).await?;
        self.evict_beyond_limit(run_id);

        // Another task may have opened the same run concurrently; keep the first pool.
        let cached = self.pools.entry(run_id.to_string()).or_insert(pool);
        Ok(cached.value().clone())
    }

    async fn open_pool(&self, run_id: &str) -> Result<SqlitePool> {
        validate_run_id(run_id)?;
        let options = SqliteConnectOptions::new()
            .filename(self.db_path_for_run(run_id))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS_PER_RUN)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(CREATE_TABLES).execute(&pool).await?;

        debug!(run_id = %run_id, "Opened event log database");
        Ok(pool)
    }

    /// Drop cached pools of other runs until there is room for one more.
    ///
    /// Evicted pools are not closed: tasks still holding a clone finish their work
    /// and the connections close when the last clone is dropped.
    fn evict_beyond_limit(&self, keep_run_id: &str) {
        while self.pools.len() >= MAX_OPEN_RUN_POOLS {
            let victim = self
                .pools
                .iter()
                .map(|entry| entry.key().clone())
                .find(|run_id| run_id != keep_run_id);
            let Some(victim) = victim else {
                break;
            };
            self.pools.remove(&victim);
            debug!(run_id = %victim, "Evicted event log pool");
        }
    }

    async fn read_events(pool: &SqlitePool) -> Result<Vec<PipelineEvent>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT event_body FROM event_logs ORDER BY id ASC")
                .fetch_all(pool)
                .await?;

        rows.iter()
            .map(|(body,)| serde_json::from_str(body).map_err(Into::into))
            .collect()
    }
}

fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.contains("..") {
        return Err(CoordinatorError::InvalidParameter(format!(
            "Run id {run_id:?} cannot be used as an event log file name"
        )));
    }
    Ok(())
}

#[async_trait]
impl EventLogStorage for SqliteEventLogStorage {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn store_event(&self, event: &PipelineEvent) -> Result<()> {
        let pool = self.pool_for_run(&event.run_id).await?;
        let body = serde_json::to_string(event)?;

        sqlx::query(
            "INSERT INTO event_logs (run_id, event_body, event_type, step_key, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&event.run_id)
        .bind(body)
        .bind(event.event_type_name())
        .bind(event.step_key.as_deref())
        .bind(event.timestamp.to_rfc3339())
        .execute(&pool)
        .await?;

        Ok(())
    }

    async fn get_logs_for_run(&self, run_id: &str) -> Result<Vec<PipelineEvent>> {
        validate_run_id(run_id)?;

        let cached = self.pools.get(run_id).map(|entry| entry.value().clone());
        if let Some(pool) = cached {
            return Self::read_events(&pool).await;
        }
        if !tokio::fs::try_exists(self.db_path_for_run(run_id)).await? {
            return Ok(Vec::new());
        }

        let pool = self.open_pool(run_id).await?;
        let events = Self::read_events(&pool).await;
        pool.close().await;
        events
    }

    async fn has_run(&self, run_id: &str) -> Result<bool> {
        validate_run_id(run_id)?;
        Ok(self.pools.contains_key(run_id)
            || tokio::fs::try_exists(self.db_path_for_run(run_id)).await?)
    }

    async fn close_run(&self, run_id: &str) -> Result<()> {
        if let Some((_, pool)) = self.pools.remove(run_id) {
            pool.close().await;
            debug!(run_id = %run_id, "Closed event log database");
        }
        Ok(())
    }

    async fn wipe(&self) -> Result<()> {
        let pools: Vec<SqlitePool> = self
            .pools
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.pools.clear();
        for pool in pools {
            pool.close().await;
        }

        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_run_db = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| {
                    name.ends_with(".db") || name.ends_with(".db-wal") || name.ends_with(".db-shm")
                });
            if is_run_db {
                tokio::fs::remove_file(&path).await?;
            }
        }

        log_storage_operation(
            "wipe",
            "sqlite_event_log_storage",
            Some(&self.base_dir.display().to_string()),
            "success",
            None,
        );
        Ok(())
    }
}

pub fn sqlite_event_log_storage_config_plugin() -> ConfigPlugin<Arc<dyn EventLogStorage>> {
    ConfigPlugin::new(
        base_dir_config_type("SqliteEventLogStorageConfig"),
        |config| async move {
            let config: BaseDirPluginConfig = typed_plugin_config(config)?;
            let storage = SqliteEventLogStorage::from_local(&config.base_dir).await?;
            Ok(Arc::new(storage) as Arc<dyn EventLogStorage>)
        },
    )
}

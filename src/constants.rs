//! # System Constants
//!
//! Stable names shared between the coordination layer, persisted records and the
//! on-disk instance layout. Changing any of these breaks previously persisted
//! instances, so treat them as part of the external interface.

/// Tag holding the run's execution start time (epoch seconds, float).
pub const EXECUTION_TIME_KEY: &str = "execution_epoch_time";

/// Environment variables read by the coordinator
pub mod env {
    /// Selects the default instance base directory.
    pub const HOME_ENV_VAR: &str = "PIPELINE_HOME";
    /// Deployment environment (`development`, `test`, `production`).
    pub const ENVIRONMENT_ENV_VAR: &str = "PIPELINE_ENV";
    /// `json` switches structured log output to JSON lines.
    pub const LOG_FORMAT_ENV_VAR: &str = "PIPELINE_LOG_FORMAT";
    /// Connection URL used by the postgres integration tests.
    pub const POSTGRES_TEST_URL_ENV_VAR: &str = "PIPELINE_POSTGRES_TEST_URL";
}

/// Instance directory layout
pub mod layout {
    /// Instance configuration document looked up in the base directory.
    pub const CONFIG_YAML_FILENAME: &str = "pipeline.yaml";
    pub const HISTORY_DIR: &str = "history";
    pub const RUNS_DIR: &str = "runs";
    pub const STORAGE_DIR: &str = "storage";
    pub const FILES_DIR: &str = "files";
    pub const SCHEDULES_DIR: &str = "schedules";
    pub const COMPUTE_LOGS_DIR: &str = "compute_logs";
    pub const RUNS_DB_FILENAME: &str = "runs.db";
}

/// Serialized identities of the builtin storage plugins
pub mod plugins {
    pub const LOCAL_ARTIFACT_STORAGE_MODULE: &str = "pipeline_coordinator.storage.root";
    pub const LOCAL_ARTIFACT_STORAGE_PLUGIN: &str = "local_artifact_storage_config_plugin";

    pub const SQLITE_RUN_STORAGE_MODULE: &str = "pipeline_coordinator.storage.sqlite_run_storage";
    pub const SQLITE_RUN_STORAGE_PLUGIN: &str = "sqlite_run_storage_config_plugin";

    pub const SQLITE_EVENT_LOG_STORAGE_MODULE: &str = "pipeline_coordinator.storage.event_log";
    pub const SQLITE_EVENT_LOG_STORAGE_PLUGIN: &str = "sqlite_event_log_storage_config_plugin";

    pub const LOCAL_COMPUTE_LOG_MANAGER_MODULE: &str =
        "pipeline_coordinator.storage.local_compute_log_manager";
    pub const LOCAL_COMPUTE_LOG_MANAGER_PLUGIN: &str = "local_compute_log_manager_config_plugin";

    pub const POSTGRES_RUN_STORAGE_MODULE: &str = "pipeline_coordinator_postgres.run_storage";
    pub const POSTGRES_RUN_STORAGE_PLUGIN: &str = "postgres_run_storage_config_plugin";
}

/// Current version written into serialized record envelopes.
pub const SERDES_VERSION: u32 = 1;

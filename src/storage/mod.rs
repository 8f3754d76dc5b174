//! # Storage
//!
//! Capability traits for the four storage slots of an instance and their concrete
//! backends.
//!
//! | slot | trait | backends |
//! |---|---|---|
//! | local artifact storage | [`ArtifactStorage`] | [`LocalArtifactStorage`] |
//! | run storage | [`RunStorage`] | [`SqliteRunStorage`], [`PostgresRunStorage`], [`InMemoryRunStorage`] |
//! | event log storage | [`EventLogStorage`] | [`SqliteEventLogStorage`], [`InMemoryEventLogStorage`] |
//! | compute logs | [`ComputeLogManager`] | [`LocalComputeLogManager`] |
//!
//! Persistent backends are registered as config plugins (see [`plugins`]) so an
//! instance can be rebuilt from its serialized [`crate::instance::InstanceRef`].

pub mod compute_log_manager;
pub mod event_log;
pub mod plugins;
#[cfg(feature = "postgres")]
pub mod postgres_run_storage;
pub mod root;
mod run_sql;
pub mod runs;
pub mod sqlite_run_storage;
pub mod system_storage;

pub use compute_log_manager::{ComputeIOType, ComputeLogManager, LocalComputeLogManager};
pub use event_log::{EventLogStorage, InMemoryEventLogStorage, SqliteEventLogStorage};
pub use plugins::register_builtin_plugins;
#[cfg(feature = "postgres")]
pub use plugins::register_postgres_plugins;
#[cfg(feature = "postgres")]
pub use postgres_run_storage::PostgresRunStorage;
pub use root::{ArtifactStorage, LocalArtifactStorage};
pub use runs::{InMemoryRunStorage, PipelineRun, PipelineRunStatus, RunStorage};
pub use sqlite_run_storage::SqliteRunStorage;
pub use system_storage::{
    check_non_ephemeral_instance, check_persistent_storage_requirement, SystemStorageDefinition,
};

use serde::Deserialize;

/// Config accepted by every directory-rooted builtin plugin
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BaseDirPluginConfig {
    pub base_dir: String,
}

/// Config schema matching [`BaseDirPluginConfig`]
pub(crate) fn base_dir_config_type(name: &str) -> crate::config_plugin::schema::ConfigType {
    use crate::config_plugin::schema::{ConfigType, Field};

    ConfigType::named_dict(name, [("base_dir", Field::new(ConfigType::String))])
}

//! Registration of the storage config plugins shipped with the crate.

use super::compute_log_manager::local_compute_log_manager_config_plugin;
use super::event_log::sqlite_event_log_storage_config_plugin;
use super::root::local_artifact_storage_config_plugin;
use super::sqlite_run_storage::sqlite_run_storage_config_plugin;
use crate::config_plugin::ConfigPluginRegistry;
use crate::constants::plugins::*;
use crate::error::Result;

/// Register the four default storage plugins under their serialized identities.
///
/// An [`crate::instance::InstanceRef`] built by `from_dir` without overrides only
/// names plugins registered here.
pub fn register_builtin_plugins(registry: &mut ConfigPluginRegistry) -> Result<()> {
    registry.register_plugin(
        LOCAL_ARTIFACT_STORAGE_MODULE,
        LOCAL_ARTIFACT_STORAGE_PLUGIN,
        local_artifact_storage_config_plugin(),
    )?;
    registry.register_plugin(
        SQLITE_RUN_STORAGE_MODULE,
        SQLITE_RUN_STORAGE_PLUGIN,
        sqlite_run_storage_config_plugin(),
    )?;
    registry.register_plugin(
        SQLITE_EVENT_LOG_STORAGE_MODULE,
        SQLITE_EVENT_LOG_STORAGE_PLUGIN,
        sqlite_event_log_storage_config_plugin(),
    )?;
    registry.register_plugin(
        LOCAL_COMPUTE_LOG_MANAGER_MODULE,
        LOCAL_COMPUTE_LOG_MANAGER_PLUGIN,
        local_compute_log_manager_config_plugin(),
    )?;
    Ok(())
}

/// Register the postgres run storage plugin.
///
/// Kept apart from the builtins: postgres resolves through the same protocol a
/// third-party backend would use.
#[cfg(feature = "postgres")]
pub fn register_postgres_plugins(registry: &mut ConfigPluginRegistry) -> Result<()> {
    registry.register_plugin(
        POSTGRES_RUN_STORAGE_MODULE,
        POSTGRES_RUN_STORAGE_PLUGIN,
        super::postgres_run_storage::postgres_run_storage_config_plugin(),
    )
}

//! Serializable description of an instance's storage configuration.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

use crate::config::{ConfigLoader, ConfigurationError, PluginSlotConfig};
use crate::config_plugin::ConfigPluginData;
use crate::constants::layout::{HISTORY_DIR, RUNS_DIR, STORAGE_DIR};
use crate::constants::plugins::*;
use crate::error::Result;

/// The plugin descriptors of an instance's four storage slots plus its enabled
/// features.
///
/// Holds no live resources; [`super::Instance::from_ref`] resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub feature_set: Vec<String>,
    pub local_artifact_storage_data: ConfigPluginData,
    pub run_storage_data: ConfigPluginData,
    pub event_storage_data: ConfigPluginData,
    pub compute_logs_data: ConfigPluginData,
}

impl InstanceRef {
    /// Build the reference for the instance rooted at `base_dir`.
    ///
    /// Reads the optional `config_filename` document in `base_dir`. Slots it does
    /// not configure get the builtin defaults:
    ///
    /// | slot | `base_dir` |
    /// |---|---|
    /// | local artifact storage | `<base>` |
    /// | run storage (sqlite) | `<base>/history/` |
    /// | event log storage (sqlite) | `<base>/history/runs/` |
    /// | compute logs | `<base>/storage` |
    pub fn from_dir(base_dir: impl AsRef<Path>, config_filename: &str) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let document = ConfigLoader::load_instance_document(base_dir, config_filename)?;

        let local_artifact_storage_data = slot_or_default(
            document.local_artifact_storage.as_ref(),
            LOCAL_ARTIFACT_STORAGE_MODULE,
            LOCAL_ARTIFACT_STORAGE_PLUGIN,
            base_dir,
        )?;
        let run_storage_data = slot_or_default(
            document.run_storage.as_ref(),
            SQLITE_RUN_STORAGE_MODULE,
            SQLITE_RUN_STORAGE_PLUGIN,
            &base_dir.join(HISTORY_DIR).join(""),
        )?;
        let event_storage_data = slot_or_default(
            document.event_log_storage.as_ref(),
            SQLITE_EVENT_LOG_STORAGE_MODULE,
            SQLITE_EVENT_LOG_STORAGE_PLUGIN,
            &base_dir.join(HISTORY_DIR).join(RUNS_DIR).join(""),
        )?;
        let compute_logs_data = slot_or_default(
            document.compute_logs.as_ref(),
            LOCAL_COMPUTE_LOG_MANAGER_MODULE,
            LOCAL_COMPUTE_LOG_MANAGER_PLUGIN,
            &base_dir.join(STORAGE_DIR),
        )?;

        Ok(Self {
            feature_set: document.features,
            local_artifact_storage_data,
            run_storage_data,
            event_storage_data,
            compute_logs_data,
        })
    }
}

fn slot_or_default(
    configured: Option<&PluginSlotConfig>,
    default_module: &str,
    default_plugin: &str,
    default_base_dir: &Path,
) -> Result<ConfigPluginData> {
    if let Some(slot) = configured {
        return Ok(slot.to_plugin_data()?);
    }

    let base_dir = default_base_dir.to_str().ok_or_else(|| {
        ConfigurationError::invalid_value(
            "base_dir",
            default_base_dir.display().to_string(),
            "instance paths must be valid unicode",
        )
    })?;

    ConfigPluginData::from_config(
        default_module,
        default_plugin,
        &json!({ "base_dir": base_dir }),
    )
}

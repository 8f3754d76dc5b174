//! # Instance Configuration
//!
//! Model of the optional instance configuration document (`pipeline.yaml`) that lives
//! in an instance base directory, plus the loader that finds and parses it.
//!
//! ## Document Shape
//!
//! ```yaml
//! run_storage:
//!   module: pipeline_coordinator_postgres.run_storage
//!   plugin: postgres_run_storage_config_plugin
//!   config:
//!     postgres_url: "postgresql://localhost/pipelines"
//! features:
//!   - scheduler
//! ```
//!
//! Every top-level key is optional. Missing storage slots fall back to the defaults
//! documented on [`crate::instance::InstanceRef::from_dir`].

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

use crate::config_plugin::ConfigPluginData;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root of the instance configuration document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InstanceConfigDocument {
    #[serde(default)]
    pub local_artifact_storage: Option<PluginSlotConfig>,
    #[serde(default)]
    pub run_storage: Option<PluginSlotConfig>,
    #[serde(default)]
    pub event_log_storage: Option<PluginSlotConfig>,
    #[serde(default)]
    pub compute_logs: Option<PluginSlotConfig>,
    /// Enabled optional features
    #[serde(default)]
    pub features: Vec<String>,
}

/// A `{module, plugin, config}` entry naming the plugin that backs one storage slot
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PluginSlotConfig {
    pub module: String,
    pub plugin: String,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl PluginSlotConfig {
    /// Convert the entry into a persistable plugin descriptor.
    ///
    /// The config mapping is re-serialized to YAML so the descriptor stays a plain
    /// string triple.
    pub fn to_plugin_data(&self) -> ConfigResult<ConfigPluginData> {
        let config_yaml = serde_yaml::to_string(&self.config).map_err(|e| {
            ConfigurationError::invalid_yaml(format!("{}.{}", self.module, self.plugin), e)
        })?;

        Ok(ConfigPluginData::new(
            self.module.clone(),
            self.plugin.clone(),
            config_yaml,
        ))
    }
}

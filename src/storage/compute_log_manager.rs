//! Compute log location derivation.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{base_dir_config_type, BaseDirPluginConfig};
use crate::config_plugin::{typed_plugin_config, ConfigPlugin};
use crate::constants::layout::COMPUTE_LOGS_DIR;

/// Which captured stream of a step's compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeIOType {
    Stdout,
    Stderr,
}

impl ComputeIOType {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Stdout => "out",
            Self::Stderr => "err",
        }
    }
}

/// Capability set of the compute logs slot
pub trait ComputeLogManager: Send + Sync + Debug {
    /// Directory holding every captured log of `run_id`
    fn compute_logs_directory(&self, run_id: &str) -> PathBuf;

    fn get_local_path(&self, run_id: &str, step_key: &str, io_type: ComputeIOType) -> PathBuf {
        self.compute_logs_directory(run_id)
            .join(format!("{step_key}.{}", io_type.extension()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalComputeLogManager {
    base_dir: PathBuf,
}

impl LocalComputeLogManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl ComputeLogManager for LocalComputeLogManager {
    fn compute_logs_directory(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(run_id).join(COMPUTE_LOGS_DIR)
    }
}

pub fn local_compute_log_manager_config_plugin() -> ConfigPlugin<Arc<dyn ComputeLogManager>> {
    ConfigPlugin::new(
        base_dir_config_type("LocalComputeLogManagerConfig"),
        |config| async move {
            let config: BaseDirPluginConfig = typed_plugin_config(config)?;
            Ok(Arc::new(LocalComputeLogManager::new(config.base_dir)) as Arc<dyn ComputeLogManager>)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let manager = LocalComputeLogManager::new("/home/p/storage");
        assert_eq!(
            manager.compute_logs_directory("r1"),
            PathBuf::from("/home/p/storage/r1/compute_logs")
        );
        assert_eq!(
            manager.get_local_path("r1", "load.compute", ComputeIOType::Stderr),
            PathBuf::from("/home/p/storage/r1/compute_logs/load.compute.err")
        );
    }
}

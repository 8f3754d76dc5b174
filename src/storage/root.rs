//! Local artifact storage: path derivation for per-run files, intermediates and
//! schedules under an instance base directory.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{base_dir_config_type, BaseDirPluginConfig};
use crate::config_plugin::{typed_plugin_config, ConfigPlugin};
use crate::constants::layout::{FILES_DIR, SCHEDULES_DIR, STORAGE_DIR};

/// Capability set of the local artifact storage slot
pub trait ArtifactStorage: Send + Sync + Debug {
    fn base_dir(&self) -> &Path;

    /// Root under which per-run artifacts live
    fn storage_dir(&self) -> PathBuf {
        self.base_dir().join(STORAGE_DIR)
    }

    fn file_manager_dir(&self, run_id: &str) -> PathBuf {
        self.storage_dir().join(run_id).join(FILES_DIR)
    }

    fn intermediates_dir(&self, run_id: &str) -> PathBuf {
        self.storage_dir().join(run_id).join("")
    }

    fn schedules_dir(&self) -> PathBuf {
        self.base_dir().join(SCHEDULES_DIR)
    }
}

/// Artifact storage rooted at a local base directory.
///
/// Construction performs no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifactStorage {
    base_dir: PathBuf,
}

impl LocalArtifactStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl ArtifactStorage for LocalArtifactStorage {
    fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

pub fn local_artifact_storage_config_plugin() -> ConfigPlugin<Arc<dyn ArtifactStorage>> {
    ConfigPlugin::new(
        base_dir_config_type("LocalArtifactStorageConfigPlugin"),
        |config| async move {
            let config: BaseDirPluginConfig = typed_plugin_config(config)?;
            Ok(Arc::new(LocalArtifactStorage::new(config.base_dir)) as Arc<dyn ArtifactStorage>)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_derivation() {
        let storage = LocalArtifactStorage::new("/var/pipelines");

        assert_eq!(
            storage.file_manager_dir("run-1"),
            PathBuf::from("/var/pipelines/storage/run-1/files")
        );
        assert_eq!(
            storage.intermediates_dir("run-1"),
            PathBuf::from("/var/pipelines/storage/run-1/")
        );
        assert!(storage
            .intermediates_dir("run-1")
            .to_string_lossy()
            .ends_with('/'));
        assert_eq!(storage.schedules_dir(), PathBuf::from("/var/pipelines/schedules"));
    }

    #[test]
    fn test_construction_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("not-created");
        let storage = LocalArtifactStorage::new(&base);

        assert_eq!(storage.base_dir(), base.as_path());
        assert!(!base.exists());
    }

    #[tokio::test]
    async fn test_config_plugin_builds_storage() {
        let storage = local_artifact_storage_config_plugin()
            .construct(serde_json::json!({"base_dir": "/data"}))
            .await
            .unwrap();
        assert_eq!(storage.schedules_dir(), PathBuf::from("/data/schedules"));
    }
}

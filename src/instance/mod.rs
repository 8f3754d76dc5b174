//! # Instance
//!
//! An instance bundles the four storage resources a run is coordinated through.
//! Persistent instances are resolved from an [`InstanceRef`] through the config
//! plugin registry; ephemeral instances keep run and event records in memory and
//! cannot coordinate work across processes.

pub mod instance_ref;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigLoader, ConfigurationError};
use crate::config_plugin::ConfigPluginRegistry;
use crate::constants::env::HOME_ENV_VAR;
use crate::constants::layout::{CONFIG_YAML_FILENAME, STORAGE_DIR};
use crate::error::Result;
use crate::storage::{
    ArtifactStorage, ComputeLogManager, EventLogStorage, InMemoryEventLogStorage,
    InMemoryRunStorage, LocalArtifactStorage, LocalComputeLogManager, RunStorage,
};

pub use instance_ref::InstanceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceType {
    Persistent,
    Ephemeral,
}

pub struct Instance {
    instance_type: InstanceType,
    feature_set: Vec<String>,
    local_artifact_storage: Arc<dyn ArtifactStorage>,
    run_storage: Arc<dyn RunStorage>,
    event_storage: Arc<dyn EventLogStorage>,
    compute_log_manager: Arc<dyn ComputeLogManager>,
    instance_ref: Option<InstanceRef>,
}

impl Instance {
    /// Resolve every storage slot of `instance_ref` into a persistent instance.
    pub async fn from_ref(
        instance_ref: InstanceRef,
        registry: &ConfigPluginRegistry,
    ) -> Result<Self> {
        let local_artifact_storage = registry
            .construct::<Arc<dyn ArtifactStorage>>(&instance_ref.local_artifact_storage_data)
            .await?;
        let run_storage = registry
            .construct::<Arc<dyn RunStorage>>(&instance_ref.run_storage_data)
            .await?;
        let event_storage = registry
            .construct::<Arc<dyn EventLogStorage>>(&instance_ref.event_storage_data)
            .await?;
        let compute_log_manager = registry
            .construct::<Arc<dyn ComputeLogManager>>(&instance_ref.compute_logs_data)
            .await?;

        info!(
            base_dir = %local_artifact_storage.base_dir().display(),
            features = ?instance_ref.feature_set,
            "Resolved persistent instance"
        );

        Ok(Self {
            instance_type: InstanceType::Persistent,
            feature_set: instance_ref.feature_set.clone(),
            local_artifact_storage,
            run_storage,
            event_storage,
            compute_log_manager,
            instance_ref: Some(instance_ref),
        })
    }

    /// Persistent instance for the base directory `base_dir`
    pub async fn from_dir(
        base_dir: impl AsRef<Path>,
        registry: &ConfigPluginRegistry,
    ) -> Result<Self> {
        let instance_ref = InstanceRef::from_dir(base_dir, CONFIG_YAML_FILENAME)?;
        Self::from_ref(instance_ref, registry).await
    }

    /// Instance whose run and event records live only in this process.
    ///
    /// Artifacts and compute logs are still addressed under `base_dir`. Nothing is
    /// created on disk.
    pub fn ephemeral(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();

        Self {
            instance_type: InstanceType::Ephemeral,
            feature_set: Vec::new(),
            local_artifact_storage: Arc::new(LocalArtifactStorage::new(base_dir)),
            run_storage: Arc::new(InMemoryRunStorage::new()),
            event_storage: Arc::new(InMemoryEventLogStorage::new()),
            compute_log_manager: Arc::new(LocalComputeLogManager::new(base_dir.join(STORAGE_DIR))),
            instance_ref: None,
        }
    }

    /// The default instance.
    ///
    /// Uses the directory named by `$PIPELINE_HOME` when it is set, which must
    /// exist. Otherwise returns an ephemeral instance rooted in a fresh temporary
    /// directory.
    pub async fn get(registry: &ConfigPluginRegistry) -> Result<Self> {
        match ConfigLoader::home_directory()? {
            Some(home) => {
                let is_dir = tokio::fs::metadata(&home)
                    .await
                    .is_ok_and(|metadata| metadata.is_dir());
                if !is_dir {
                    return Err(ConfigurationError::invalid_value(
                        HOME_ENV_VAR,
                        home.display().to_string(),
                        "must name an existing directory",
                    )
                    .into());
                }
                Self::from_dir(&home, registry).await
            }
            None => {
                let base_dir =
                    std::env::temp_dir().join(format!("pipeline-{}", uuid::Uuid::new_v4()));
                info!(
                    base_dir = %base_dir.display(),
                    "{HOME_ENV_VAR} not set, using an ephemeral instance"
                );
                Ok(Self::ephemeral(base_dir))
            }
        }
    }

    pub fn instance_type(&self) -> InstanceType {
        self.instance_type
    }

    pub fn is_ephemeral(&self) -> bool {
        self.instance_type == InstanceType::Ephemeral
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.feature_set.iter().any(|enabled| enabled == feature)
    }

    pub fn feature_set(&self) -> &[String] {
        &self.feature_set
    }

    pub fn local_artifact_storage(&self) -> &Arc<dyn ArtifactStorage> {
        &self.local_artifact_storage
    }

    pub fn run_storage(&self) -> &Arc<dyn RunStorage> {
        &self.run_storage
    }

    pub fn event_storage(&self) -> &Arc<dyn EventLogStorage> {
        &self.event_storage
    }

    pub fn compute_log_manager(&self) -> &Arc<dyn ComputeLogManager> {
        &self.compute_log_manager
    }

    /// The reference this instance was resolved from; `None` when ephemeral
    pub fn instance_ref(&self) -> Option<&InstanceRef> {
        self.instance_ref.as_ref()
    }

    pub fn root_directory(&self) -> &Path {
        self.local_artifact_storage.base_dir()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("instance_type", &self.instance_type)
            .field("root_directory", &self.root_directory())
            .field("feature_set", &self.feature_set)
            .field("run_storage", &self.run_storage)
            .field("event_storage", &self.event_storage)
            .finish_non_exhaustive()
    }
}

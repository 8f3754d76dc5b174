//! System storage definitions and the requirement checks executors run against them.

use serde::{Deserialize, Serialize};

use crate::constants::env::HOME_ENV_VAR;
use crate::error::{CoordinatorError, Result};
use crate::instance::Instance;

/// How a pipeline passes intermediate values between steps
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemStorageDefinition {
    pub name: String,
    /// Intermediates are written somewhere another process can read them
    pub is_persistent: bool,
}

impl SystemStorageDefinition {
    pub fn new(name: impl Into<String>, is_persistent: bool) -> Self {
        Self {
            name: name.into(),
            is_persistent,
        }
    }

    /// Intermediates kept in process memory
    pub fn in_memory() -> Self {
        Self::new("in_memory", false)
    }

    /// Intermediates written under the instance's artifact storage
    pub fn filesystem() -> Self {
        Self::new("filesystem", true)
    }
}

pub fn check_persistent_storage_requirement(storage_def: &SystemStorageDefinition) -> Result<()> {
    if storage_def.is_persistent {
        return Ok(());
    }

    Err(CoordinatorError::UnmetExecutorRequirement(format!(
        "You have attempted to use a multi process executor while using system storage {} \
         which does not persist intermediates. This means there would be no way to move data \
         between different processes. Configure the pipeline to use persistent system storage \
         such as the filesystem.",
        storage_def.name
    )))
}

pub fn check_non_ephemeral_instance(instance: &Instance) -> Result<()> {
    if !instance.is_ephemeral() {
        return Ok(());
    }

    Err(CoordinatorError::UnmetExecutorRequirement(format!(
        "You have attempted to use a multi process executor with an ephemeral instance. \
         A non-ephemeral instance is needed to coordinate execution between multiple \
         processes. Configure the default instance via ${HOME_ENV_VAR} or pass a persistent \
         instance explicitly."
    )))
}

//! Configuration Loader
//!
//! Environment-aware lookup of the instance base directory and loading of the
//! optional instance configuration document.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::InstanceConfigDocument;
use crate::constants::env::{ENVIRONMENT_ENV_VAR, HOME_ENV_VAR};

/// Configuration files larger than this are rejected without being read.
const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Detect the deployment environment, defaulting to `development`.
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_ENV_VAR).unwrap_or_else(|_| "development".to_string())
    }

    /// Base directory selected by the home environment variable, if any.
    ///
    /// A variable that is set but empty or not unicode is an error rather than being
    /// silently treated as unset.
    pub fn home_directory() -> ConfigResult<Option<PathBuf>> {
        match env::var(HOME_ENV_VAR) {
            Ok(value) if value.trim().is_empty() => Err(
                ConfigurationError::environment_variable_error(HOME_ENV_VAR, "value is empty"),
            ),
            Ok(value) => Ok(Some(PathBuf::from(value))),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(
                ConfigurationError::environment_variable_error(HOME_ENV_VAR, "value is not unicode"),
            ),
        }
    }

    /// Load `base_dir/config_filename`. A missing file yields an empty document.
    pub fn load_instance_document(
        base_dir: &Path,
        config_filename: &str,
    ) -> ConfigResult<InstanceConfigDocument> {
        let path = base_dir.join(config_filename);

        if !path.exists() {
            debug!(
                path = %path.display(),
                "No instance configuration document found, using defaults"
            );
            return Ok(InstanceConfigDocument::default());
        }

        let contents = Self::read_config_file_safely(&path)?;
        Self::parse_instance_document(&contents, &path.display().to_string())
    }

    /// Parse document contents. Empty or `null` documents are equivalent to `{}`.
    pub fn parse_instance_document(
        contents: &str,
        source_name: &str,
    ) -> ConfigResult<InstanceConfigDocument> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)
            .map_err(|e| ConfigurationError::invalid_yaml(source_name, e))?;

        if value.is_null() {
            return Ok(InstanceConfigDocument::default());
        }

        serde_yaml::from_value(value).map_err(|e| ConfigurationError::invalid_yaml(source_name, e))
    }

    /// Read a configuration file with size and file-type checks
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Configuration file too large ({}MB > {}MB limit)",
                    metadata.len() / (1024 * 1024),
                    MAX_CONFIG_FILE_SIZE / (1024 * 1024)
                ),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::layout::CONFIG_YAML_FILENAME;

    #[test]
    fn test_missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let document = ConfigLoader::load_instance_document(dir.path(), CONFIG_YAML_FILENAME)
            .unwrap();
        assert_eq!(document, InstanceConfigDocument::default());
    }

    #[test]
    fn test_empty_and_null_documents_are_empty() {
        for contents in ["", "\n", "~", "null"] {
            let document = ConfigLoader::parse_instance_document(contents, "inline").unwrap();
            assert_eq!(document, InstanceConfigDocument::default());
        }
    }

    #[test]
    fn test_parses_slots_and_features() {
        let contents = r#"
run_storage:
  module: some.module
  plugin: some_plugin
  config:
    postgres_url: "postgresql://localhost/test"
features:
  - scheduler
"#;
        let document = ConfigLoader::parse_instance_document(contents, "inline").unwrap();
        let run_storage = document.run_storage.unwrap();
        assert_eq!(run_storage.module, "some.module");
        assert_eq!(run_storage.plugin, "some_plugin");
        assert!(document.local_artifact_storage.is_none());
        assert_eq!(document.features, vec!["scheduler".to_string()]);
    }

    #[test]
    fn test_invalid_yaml_names_source() {
        let error = ConfigLoader::parse_instance_document("run_storage: [unclosed", "broken.yaml")
            .unwrap_err();
        match error {
            ConfigurationError::InvalidYaml { source_name, .. } => {
                assert_eq!(source_name, "broken.yaml")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_directory_in_place_of_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(CONFIG_YAML_FILENAME)).unwrap();

        let error = ConfigLoader::load_instance_document(dir.path(), CONFIG_YAML_FILENAME)
            .unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidValue { .. }));
    }
}

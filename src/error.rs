//! Error types for the run-coordination layer.
//!
//! Every variant here describes static misconfiguration or a failure surfaced by an
//! underlying storage engine. None of them are retried by this crate.

use crate::config::ConfigurationError;
use crate::config_plugin::schema::EvaluationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    /// The selected executor cannot run against the instance or system storage.
    #[error("Unmet executor requirement: {0}")]
    UnmetExecutorRequirement(String),
    #[error(transparent)]
    PluginResolution(#[from] PluginResolutionError),
    /// A plugin's declared config schema rejected the supplied config fragment.
    #[error("Invalid config for plugin: {}", format_evaluation_errors(errors))]
    ConfigValidation {
        errors: Vec<EvaluationError>,
        config_value: serde_json::Value,
    },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Failures locating a registered config plugin by its serialized identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginResolutionError {
    #[error("Couldn't find module {module_name} when attempting to rehydrate the plugin {plugin}")]
    ModuleNotFound { module_name: String, plugin: String },
    #[error("Couldn't find plugin {plugin_name} in module {module_name} when attempting to construct it")]
    PluginNotFound {
        module_name: String,
        plugin_name: String,
    },
    #[error("{plugin_name} in module {module_name} must be a ConfigPlugin producing {expected}")]
    PluginTypeMismatch {
        module_name: String,
        plugin_name: String,
        expected: &'static str,
    },
    #[error("Plugin {plugin_name} is already registered in module {module_name}")]
    DuplicatePlugin {
        module_name: String,
        plugin_name: String,
    },
}

impl CoordinatorError {
    /// Field-level errors carried by a config validation failure.
    pub fn evaluation_errors(&self) -> Option<&[EvaluationError]> {
        match self {
            Self::ConfigValidation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    pub fn is_unmet_executor_requirement(&self) -> bool {
        matches!(self, Self::UnmetExecutorRequirement(_))
    }
}

fn format_evaluation_errors(errors: &[EvaluationError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} error(s): {}", errors.len(), messages.join("; "))
}

impl From<sqlx::Error> for CoordinatorError {
    fn from(err: sqlx::Error) -> Self {
        CoordinatorError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(error: serde_json::Error) -> Self {
        CoordinatorError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for CoordinatorError {
    fn from(error: std::io::Error) -> Self {
        CoordinatorError::Io(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_plugin::schema::EvaluationErrorReason;

    #[test]
    fn test_config_validation_display_lists_every_error() {
        let error = CoordinatorError::ConfigValidation {
            errors: vec![
                EvaluationError {
                    stack: vec!["base_dir".to_string()],
                    reason: EvaluationErrorReason::MissingRequiredField,
                    message: "Missing required field \"base_dir\"".to_string(),
                },
                EvaluationError {
                    stack: vec!["extra".to_string()],
                    reason: EvaluationErrorReason::FieldNotDefined,
                    message: "Undefined field \"extra\"".to_string(),
                },
            ],
            config_value: serde_json::json!({"extra": 1}),
        };

        let rendered = error.to_string();
        assert!(rendered.contains("2 error(s)"));
        assert!(rendered.contains("base_dir"));
        assert!(rendered.contains("extra"));
        assert_eq!(error.evaluation_errors().map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_plugin_resolution_error_names_module_and_plugin() {
        let error: CoordinatorError = PluginResolutionError::PluginNotFound {
            module_name: "storage.root".to_string(),
            plugin_name: "missing_plugin".to_string(),
        }
        .into();

        let rendered = error.to_string();
        assert!(rendered.contains("storage.root"));
        assert!(rendered.contains("missing_plugin"));
    }
}

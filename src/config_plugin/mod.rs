//! # Config Plugins
//!
//! Declarative construction of pluggable resources from serializable configuration.
//!
//! ## Overview
//!
//! A config plugin pairs a declared config schema with a constructor. Plugins are
//! registered under a stable `(module_name, plugin_name)` identity in a
//! [`ConfigPluginRegistry`]; a persisted [`ConfigPluginData`] names that identity
//! together with a YAML config fragment and can be resolved back into a live
//! resource in any process that registered the same plugins.
//!
//! ```text
//! ConfigPluginData ──► registry lookup ──► parse YAML ──► evaluate schema ──► plugin_fn
//!  (module, plugin,      (module, plugin)                  (all field errors)   (resource)
//!   config_yaml)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeline_coordinator::config_plugin::{
//!     schema::{ConfigType, Field}, ConfigPlugin, ConfigPluginData, ConfigPluginRegistry,
//! };
//!
//! # async fn example() -> pipeline_coordinator::Result<()> {
//! let mut registry = ConfigPluginRegistry::new();
//! registry.register_plugin(
//!     "my_package.greeting",
//!     "greeting_plugin",
//!     ConfigPlugin::new(
//!         ConfigType::named_dict("GreetingConfig", [("name", Field::new(ConfigType::String))]),
//!         |config| async move { Ok(format!("hello {}", config["name"])) },
//!     ),
//! )?;
//!
//! let data = ConfigPluginData::new("my_package.greeting", "greeting_plugin", "name: world");
//! let greeting: String = registry.construct(&data).await?;
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod schema;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::ConfigurationError;
use crate::error::{CoordinatorError, Result};
use schema::{evaluate_config, ConfigType};

pub use registry::ConfigPluginRegistry;

/// Serializable descriptor of where to find a plugin and the config fragment used to
/// instantiate it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigPluginData {
    pub module_name: String,
    pub plugin_name: String,
    pub config_yaml: String,
}

impl ConfigPluginData {
    pub fn new(
        module_name: impl Into<String>,
        plugin_name: impl Into<String>,
        config_yaml: impl Into<String>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            plugin_name: plugin_name.into(),
            config_yaml: config_yaml.into(),
        }
    }

    /// Build a descriptor whose config fragment is the YAML rendering of `config`.
    pub fn from_config<T: Serialize>(
        module_name: impl Into<String>,
        plugin_name: impl Into<String>,
        config: &T,
    ) -> Result<Self> {
        let module_name = module_name.into();
        let plugin_name = plugin_name.into();
        let config_yaml = serde_yaml::to_string(config).map_err(|e| {
            ConfigurationError::invalid_yaml(format!("{module_name}.{plugin_name}"), e)
        })?;

        Ok(Self {
            module_name,
            plugin_name,
            config_yaml,
        })
    }

    /// `module.plugin` identity used in error messages and logs
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module_name, self.plugin_name)
    }

    /// Parse the YAML fragment into a JSON value for schema evaluation.
    pub fn parse_config(&self) -> Result<Value> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(&self.config_yaml)
            .map_err(|e| ConfigurationError::invalid_yaml(self.qualified_name(), e))?;

        serde_json::to_value(yaml).map_err(|e| {
            ConfigurationError::invalid_yaml(self.qualified_name(), e).into()
        })
    }
}

type PluginFn<R> = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// A declared config schema plus the function that builds a resource from a
/// validated config value.
pub struct ConfigPlugin<R> {
    config_type: ConfigType,
    plugin_fn: PluginFn<R>,
}

impl<R: 'static> ConfigPlugin<R> {
    pub fn new<F, Fut>(config_type: ConfigType, plugin_fn: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            config_type,
            plugin_fn: Arc::new(move |config| Box::pin(plugin_fn(config))),
        }
    }

    pub fn config_type(&self) -> &ConfigType {
        &self.config_type
    }

    /// Validate `config_value` and, only if it is valid, invoke the constructor.
    pub async fn construct(&self, config_value: Value) -> Result<R> {
        match evaluate_config(&self.config_type, &config_value) {
            Ok(validated) => (self.plugin_fn)(validated).await,
            Err(errors) => Err(CoordinatorError::ConfigValidation {
                errors,
                config_value,
            }),
        }
    }
}

impl<R> Clone for ConfigPlugin<R> {
    fn clone(&self) -> Self {
        Self {
            config_type: self.config_type.clone(),
            plugin_fn: Arc::clone(&self.plugin_fn),
        }
    }
}

impl<R> fmt::Debug for ConfigPlugin<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPlugin")
            .field("config_type", &self.config_type)
            .finish_non_exhaustive()
    }
}

/// Deserialize an already validated plugin config into a typed struct.
pub fn typed_plugin_config<C: DeserializeOwned>(config: Value) -> Result<C> {
    serde_json::from_value(config.clone()).map_err(|e| {
        ConfigurationError::invalid_value("plugin_config", config.to_string(), e.to_string()).into()
    })
}

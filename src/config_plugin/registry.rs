//! # Config Plugin Registry
//!
//! Explicit, process-scoped mapping from `(module_name, plugin_name)` to a
//! registered [`ConfigPlugin`].
//!
//! The registry is built once at startup through deliberate `register_plugin`
//! calls and then shared read-only (typically behind an `Arc`). Resolution is by
//! serialized name only; nothing is discovered implicitly.

use std::any::{type_name, Any};
use std::collections::HashMap;
use tracing::debug;

use super::{ConfigPlugin, ConfigPluginData};
use crate::error::{PluginResolutionError, Result};
use crate::logging::log_plugin_operation;

struct RegisteredPlugin {
    /// Name of the resource type the plugin constructs
    resource_type: &'static str,
    plugin: Box<dyn Any + Send + Sync>,
}

/// Registry of config plugins grouped by module name
#[derive(Default)]
pub struct ConfigPluginRegistry {
    modules: HashMap<String, HashMap<String, RegisteredPlugin>>,
}

impl ConfigPluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `plugin` to the `(module_name, plugin_name)` identity.
    ///
    /// Identities are unique; registering the same identity twice fails.
    pub fn register_plugin<R>(
        &mut self,
        module_name: &str,
        plugin_name: &str,
        plugin: ConfigPlugin<R>,
    ) -> Result<()>
    where
        R: Send + Sync + 'static,
    {
        let module = self.modules.entry(module_name.to_string()).or_default();

        if module.contains_key(plugin_name) {
            return Err(PluginResolutionError::DuplicatePlugin {
                module_name: module_name.to_string(),
                plugin_name: plugin_name.to_string(),
            }
            .into());
        }

        module.insert(
            plugin_name.to_string(),
            RegisteredPlugin {
                resource_type: type_name::<R>(),
                plugin: Box::new(plugin),
            },
        );

        log_plugin_operation(
            "register",
            module_name,
            plugin_name,
            "success",
            Some(type_name::<R>()),
        );
        Ok(())
    }

    pub fn has_module(&self, module_name: &str) -> bool {
        self.modules.contains_key(module_name)
    }

    pub fn has_plugin(&self, module_name: &str, plugin_name: &str) -> bool {
        self.modules
            .get(module_name)
            .is_some_and(|module| module.contains_key(plugin_name))
    }

    /// All registered identities with the resource type each one constructs, sorted.
    pub fn plugin_identities(&self) -> Vec<(String, String, &'static str)> {
        let mut identities: Vec<_> = self
            .modules
            .iter()
            .flat_map(|(module_name, plugins)| {
                plugins.iter().map(move |(plugin_name, registered)| {
                    (
                        module_name.clone(),
                        plugin_name.clone(),
                        registered.resource_type,
                    )
                })
            })
            .collect();
        identities.sort();
        identities
    }

    /// Locate the plugin named by `data` as a `ConfigPlugin<R>`.
    pub fn lookup<R: 'static>(&self, data: &ConfigPluginData) -> Result<&ConfigPlugin<R>> {
        let module = self.modules.get(&data.module_name).ok_or_else(|| {
            PluginResolutionError::ModuleNotFound {
                module_name: data.module_name.clone(),
                plugin: data.qualified_name(),
            }
        })?;

        let registered = module.get(&data.plugin_name).ok_or_else(|| {
            PluginResolutionError::PluginNotFound {
                module_name: data.module_name.clone(),
                plugin_name: data.plugin_name.clone(),
            }
        })?;

        registered
            .plugin
            .downcast_ref::<ConfigPlugin<R>>()
            .ok_or_else(|| {
                PluginResolutionError::PluginTypeMismatch {
                    module_name: data.module_name.clone(),
                    plugin_name: data.plugin_name.clone(),
                    expected: type_name::<R>(),
                }
                .into()
            })
    }

    /// Resolve `data` into a constructed resource.
    ///
    /// Resolution failures and config validation failures happen before the plugin's
    /// constructor runs, so a failed call never leaves a partially built resource.
    pub async fn construct<R: 'static>(&self, data: &ConfigPluginData) -> Result<R> {
        let plugin = match self.lookup::<R>(data) {
            Ok(plugin) => plugin.clone(),
            Err(error) => {
                log_plugin_operation(
                    "resolve",
                    &data.module_name,
                    &data.plugin_name,
                    "failed",
                    Some(&error.to_string()),
                );
                return Err(error);
            }
        };

        let config_value = data.parse_config()?;
        debug!(
            plugin = %data.qualified_name(),
            config = %config_value,
            "Constructing resource from config plugin"
        );

        let resource = plugin.construct(config_value).await?;
        log_plugin_operation(
            "construct",
            &data.module_name,
            &data.plugin_name,
            "success",
            None,
        );
        Ok(resource)
    }
}

impl std::fmt::Debug for ConfigPluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigPluginRegistry")
            .field("plugins", &self.plugin_identities())
            .finish()
    }
}

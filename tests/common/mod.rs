#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use pipeline_coordinator::config_plugin::ConfigPluginRegistry;
use pipeline_coordinator::constants::env::POSTGRES_TEST_URL_ENV_VAR;
use pipeline_coordinator::execution::{
    ExecutionPlan, ExecutionStep, StaticExecutionPlan, StepContext, StepLauncher,
    StepOutputHandle,
};
use pipeline_coordinator::instance::Instance;
use pipeline_coordinator::logging::init_structured_logging;
use pipeline_coordinator::storage::register_builtin_plugins;
use pipeline_coordinator::{CoordinatorError, Result};

/// Registry with the builtin storage plugins
pub fn builtin_registry() -> ConfigPluginRegistry {
    init_structured_logging();
    let mut registry = ConfigPluginRegistry::new();
    register_builtin_plugins(&mut registry).expect("builtin plugins register once");
    registry
}

/// Persistent instance with default storage rooted at `base_dir`
pub async fn persistent_instance(base_dir: &Path) -> Instance {
    Instance::from_dir(base_dir, &builtin_registry())
        .await
        .expect("default instance resolves")
}

/// Postgres URL for integration tests, when one is configured
pub fn postgres_test_url() -> Option<String> {
    std::env::var(POSTGRES_TEST_URL_ENV_VAR)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// extract -> transform -> load, each with one output except load
pub fn etl_plan() -> Arc<dyn ExecutionPlan> {
    Arc::new(
        StaticExecutionPlan::new(
            "etl",
            vec![
                ExecutionStep::new("extract").with_outputs(["rows"]),
                ExecutionStep::new("transform")
                    .with_upstream(["extract"])
                    .with_outputs(["clean_rows"]),
                ExecutionStep::new("load").with_upstream(["transform"]),
            ],
        )
        .expect("etl plan is valid"),
    )
}

/// Launcher that writes each declared output to the run's intermediates directory
/// and fails the configured steps after writing.
///
/// Steps given inputs with [`FileWritingLauncher::reading`] fail when an input is
/// missing from the run's intermediates.
#[derive(Default)]
pub struct FileWritingLauncher {
    failing_steps: HashSet<String>,
    inputs: HashMap<String, Vec<StepOutputHandle>>,
    launched: Mutex<Vec<String>>,
}

impl FileWritingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(step_keys: &[&str]) -> Self {
        Self {
            failing_steps: step_keys.iter().map(|key| key.to_string()).collect(),
            ..Self::default()
        }
    }

    /// The inputs each step of [`etl_plan`] consumes
    pub fn reading_etl_inputs(self) -> Self {
        self.reading("transform", StepOutputHandle::new("extract", "rows"))
            .reading("load", StepOutputHandle::new("transform", "clean_rows"))
    }

    pub fn reading(mut self, step_key: &str, input: StepOutputHandle) -> Self {
        self.inputs.entry(step_key.to_string()).or_default().push(input);
        self
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl StepLauncher for FileWritingLauncher {
    async fn launch_step(&self, context: StepContext) -> Result<()> {
        self.launched.lock().push(context.step_key().to_string());

        for input in self.inputs.get(context.step_key()).into_iter().flatten() {
            let path = context.record_object_read(input).await?;
            if !tokio::fs::try_exists(&path).await? {
                return Err(CoordinatorError::Execution(format!(
                    "missing input {}",
                    path.display()
                )));
            }
        }

        for output_name in &context.step().output_names {
            let path = context.output_path(output_name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, format!("{}:{output_name}", context.step_key())).await?;
            context.record_object_write(output_name).await?;
        }

        if self.failing_steps.contains(context.step_key()) {
            return Err(CoordinatorError::Execution(format!(
                "{} failed on purpose",
                context.step_key()
            )));
        }
        Ok(())
    }
}

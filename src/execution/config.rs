//! # Execution Configuration
//!
//! Per-run configuration ([`RunConfig`]), executor selection ([`ExecutorConfig`])
//! and reexecution planning ([`ReexecutionConfig`]).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use super::engine::{Engine, EngineKind, InProcessEngine, MultiprocessEngine};
use super::events::ObjectStoreOperationType;
use super::handle::ExecutionTargetHandle;
use super::results::PipelineExecutionResult;
use crate::config::ConfigurationError;
use crate::constants::EXECUTION_TIME_KEY;
use crate::error::Result;
use crate::instance::Instance;
use crate::storage::{
    check_non_ephemeral_instance, check_persistent_storage_requirement, SystemStorageDefinition,
};

pub use super::plan::StepOutputHandle;

/// Value of a run tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Float(f64),
}

impl TagValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Float(_) => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

fn now_epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Ensure the execution time tag is present and a float.
fn normalize_tags(mut tags: HashMap<String, TagValue>) -> Result<HashMap<String, TagValue>> {
    let execution_time = match tags.get(EXECUTION_TIME_KEY) {
        None => now_epoch_seconds(),
        Some(TagValue::Float(value)) => *value,
        Some(TagValue::Text(text)) => text.trim().parse::<f64>().map_err(|e| {
            ConfigurationError::invalid_value(
                EXECUTION_TIME_KEY,
                text.clone(),
                format!("execution time tag must be a float: {e}"),
            )
        })?,
    };

    tags.insert(EXECUTION_TIME_KEY.to_string(), TagValue::Float(execution_time));
    Ok(tags)
}

/// Immutable configuration controlling how a single run executes.
///
/// Every `RunConfig` carries a run id and the `execution_epoch_time` tag; both are
/// filled in at construction when not supplied.
///
/// ```rust
/// use pipeline_coordinator::execution::config::{RunConfig, TagValue};
///
/// let run_config = RunConfig::builder()
///     .tag("owner", "data-eng")
///     .tag("execution_epoch_time", "1700000000.5")
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     run_config.tags()["execution_epoch_time"],
///     TagValue::Float(1_700_000_000.5)
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    run_id: String,
    tags: HashMap<String, TagValue>,
    reexecution_config: Option<ReexecutionConfig>,
    step_keys_to_execute: Option<Vec<String>>,
    mode: Option<String>,
}

impl RunConfig {
    /// Fresh run id, no user tags, all steps, default mode
    pub fn new() -> Self {
        let mut tags = HashMap::new();
        tags.insert(
            EXECUTION_TIME_KEY.to_string(),
            TagValue::Float(now_epoch_seconds()),
        );

        Self {
            run_id: new_run_id(),
            tags,
            reexecution_config: None,
            step_keys_to_execute: None,
            mode: None,
        }
    }

    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn tags(&self) -> &HashMap<String, TagValue> {
        &self.tags
    }

    /// The execution time tag, in epoch seconds
    pub fn execution_time(&self) -> f64 {
        self.tags
            .get(EXECUTION_TIME_KEY)
            .and_then(TagValue::as_float)
            .unwrap_or_default()
    }

    pub fn reexecution_config(&self) -> Option<&ReexecutionConfig> {
        self.reexecution_config.as_ref()
    }

    /// Subset of steps to execute; `None` means every step
    pub fn step_keys_to_execute(&self) -> Option<&[String]> {
        self.step_keys_to_execute.as_deref()
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    /// A copy with `new_tags` merged over the existing tags.
    ///
    /// The execution time tag is re-validated, so supplying an unparseable value
    /// fails here.
    pub fn with_tags<I, K, V>(&self, new_tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TagValue>,
    {
        let mut tags = self.tags.clone();
        tags.extend(
            new_tags
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );

        Ok(Self {
            tags: normalize_tags(tags)?,
            ..self.clone()
        })
    }

    /// A copy with only the mode replaced
    pub fn with_mode(&self, mode: impl Into<String>) -> Self {
        Self {
            mode: Some(mode.into()),
            ..self.clone()
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builder for [`RunConfig`]
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    run_id: Option<String>,
    tags: HashMap<String, TagValue>,
    reexecution_config: Option<ReexecutionConfig>,
    step_keys_to_execute: Option<Vec<String>>,
    mode: Option<String>,
}

impl RunConfigBuilder {
    /// Use an explicit run id. An empty id is replaced by a generated one.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TagValue>,
    {
        self.tags.extend(
            tags.into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
        self
    }

    pub fn reexecution_config(mut self, reexecution_config: ReexecutionConfig) -> Self {
        self.reexecution_config = Some(reexecution_config);
        self
    }

    pub fn step_keys_to_execute<I, S>(mut self, step_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step_keys_to_execute = Some(step_keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn build(self) -> Result<RunConfig> {
        Ok(RunConfig {
            run_id: self
                .run_id
                .filter(|run_id| !run_id.is_empty())
                .unwrap_or_else(new_run_id),
            tags: normalize_tags(self.tags)?,
            reexecution_config: self.reexecution_config,
            step_keys_to_execute: self.step_keys_to_execute,
            mode: self.mode,
        })
    }
}

/// Settings of the bounded worker pool executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiprocessExecutorConfig {
    handle: ExecutionTargetHandle,
    max_concurrent: NonZeroUsize,
}

impl MultiprocessExecutorConfig {
    /// Validate multiprocess settings.
    ///
    /// Workers re-locate the pipeline through `handle`, so a pipeline that only exists
    /// in memory cannot be executed this way. `max_concurrent` defaults to the
    /// available parallelism of the host.
    pub fn new(
        handle: Option<ExecutionTargetHandle>,
        max_concurrent: Option<usize>,
    ) -> Result<Self> {
        let handle = handle.ok_or_else(|| {
            ConfigurationError::missing_required_field(
                "handle",
                "Multiprocessing can only be configured when a pipeline is executed from an \
                 ExecutionTargetHandle: do not pass a pure in-memory pipeline definition",
            )
        })?;

        let max_concurrent = match max_concurrent {
            Some(value) => NonZeroUsize::new(value).ok_or_else(|| {
                ConfigurationError::invalid_value(
                    "max_concurrent",
                    value.to_string(),
                    "must be at least 1",
                )
            })?,
            None => std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        };

        Ok(Self {
            handle,
            max_concurrent,
        })
    }

    pub fn handle(&self) -> &ExecutionTargetHandle {
        &self.handle
    }

    pub fn max_concurrent(&self) -> NonZeroUsize {
        self.max_concurrent
    }
}

/// How a run's steps are executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "snake_case")]
pub enum ExecutorConfig {
    /// Steps run one at a time in the calling process
    InProcess,
    /// Steps run concurrently on a bounded pool of workers
    Multiprocess(MultiprocessExecutorConfig),
}

impl ExecutorConfig {
    /// Verify that `instance` and `storage_def` can support this executor.
    ///
    /// In-process execution has no requirements. Multiprocess execution needs
    /// persistent intermediates storage and a non-ephemeral instance, checked in
    /// that order.
    pub fn check_requirements(
        &self,
        instance: &Instance,
        storage_def: &SystemStorageDefinition,
    ) -> Result<()> {
        match self {
            Self::InProcess => Ok(()),
            Self::Multiprocess(_) => {
                check_persistent_storage_requirement(storage_def)?;
                check_non_ephemeral_instance(instance)
            }
        }
    }

    pub fn engine_kind(&self) -> EngineKind {
        match self {
            Self::InProcess => EngineKind::InProcess,
            Self::Multiprocess(_) => EngineKind::Multiprocess,
        }
    }

    pub fn get_engine(&self) -> Box<dyn Engine> {
        match self {
            Self::InProcess => Box::new(InProcessEngine),
            Self::Multiprocess(config) => Box::new(MultiprocessEngine::new(config.max_concurrent())),
        }
    }

    /// Target handle workers use to re-locate the pipeline, if any
    pub fn handle(&self) -> Option<&ExecutionTargetHandle> {
        match self {
            Self::InProcess => None,
            Self::Multiprocess(config) => Some(config.handle()),
        }
    }
}

/// Outputs of a previous run that a new run may reuse instead of recomputing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReexecutionConfig {
    previous_run_id: String,
    step_output_handles: Vec<StepOutputHandle>,
}

impl ReexecutionConfig {
    pub fn new(previous_run_id: impl Into<String>, step_output_handles: Vec<StepOutputHandle>) -> Self {
        Self {
            previous_run_id: previous_run_id.into(),
            step_output_handles,
        }
    }

    /// Derive the reusable outputs of a finished run.
    ///
    /// Only steps with a success event contribute. For those, every `SET_OBJECT`
    /// operation yields a handle, in event order.
    pub fn from_previous_run(previous_run_result: &PipelineExecutionResult) -> Self {
        let mut step_output_handles = Vec::new();

        for (step_key, events) in previous_run_result.events_by_step_key() {
            if !events.iter().any(|event| event.is_step_success()) {
                continue;
            }

            step_output_handles.extend(events.iter().filter_map(|event| {
                match event.object_store_operation() {
                    Some((ObjectStoreOperationType::SetObject, value_name)) => {
                        Some(StepOutputHandle::new(step_key, value_name))
                    }
                    _ => None,
                }
            }));
        }

        Self::new(previous_run_result.run_id(), step_output_handles)
    }

    pub fn previous_run_id(&self) -> &str {
        &self.previous_run_id
    }

    pub fn step_output_handles(&self) -> &[StepOutputHandle] {
        &self.step_output_handles
    }

    pub fn covers(&self, step_key: &str, output_name: &str) -> bool {
        self.step_output_handles
            .iter()
            .any(|handle| handle.step_key == step_key && handle.output_name == output_name)
    }
}

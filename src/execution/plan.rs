//! # Execution Plan Interface
//!
//! The coordination layer does not model pipeline definitions. It consumes an
//! [`ExecutionPlan`] (steps in dependency order) and hands each selected step to a
//! [`StepLauncher`] that performs the actual work.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use super::engine::RunContext;
use super::events::{EventSpecificData, EventSink, ObjectStoreOperationType, PipelineEvent};
use super::handle::ExecutionTargetHandle;
use crate::error::{CoordinatorError, Result};

/// Identifies one named output of one step
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepOutputHandle {
    pub step_key: String,
    pub output_name: String,
}

impl StepOutputHandle {
    pub fn new(step_key: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            step_key: step_key.into(),
            output_name: output_name.into(),
        }
    }
}

impl fmt::Display for StepOutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.step_key, self.output_name)
    }
}

/// A unit of work in a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStep {
    pub key: String,
    pub upstream_step_keys: Vec<String>,
    pub output_names: Vec<String>,
}

impl ExecutionStep {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            upstream_step_keys: Vec::new(),
            output_names: Vec::new(),
        }
    }

    pub fn with_upstream<I, S>(mut self, upstream_step_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upstream_step_keys = upstream_step_keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, output_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_names = output_names.into_iter().map(Into::into).collect();
        self
    }

    pub fn output_handles(&self) -> impl Iterator<Item = StepOutputHandle> + '_ {
        self.output_names
            .iter()
            .map(|output_name| StepOutputHandle::new(&self.key, output_name))
    }
}

/// Steps of a pipeline in an order where every step follows its upstream steps
pub trait ExecutionPlan: Send + Sync {
    fn pipeline_name(&self) -> &str;

    fn steps(&self) -> &[ExecutionStep];

    fn get_step(&self, step_key: &str) -> Option<&ExecutionStep> {
        self.steps().iter().find(|step| step.key == step_key)
    }
}

/// Plan over a fixed list of steps, validated at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticExecutionPlan {
    pipeline_name: String,
    steps: Vec<ExecutionStep>,
}

impl StaticExecutionPlan {
    /// Fails on duplicate step keys or a step listed before one of its upstream
    /// steps.
    pub fn new(pipeline_name: impl Into<String>, steps: Vec<ExecutionStep>) -> Result<Self> {
        let mut seen = HashSet::new();
        for step in &steps {
            if let Some(missing) = step
                .upstream_step_keys
                .iter()
                .find(|upstream| !seen.contains(upstream.as_str()))
            {
                return Err(CoordinatorError::InvalidParameter(format!(
                    "Step {} depends on {missing}, which does not precede it in the plan",
                    step.key
                )));
            }
            if !seen.insert(step.key.as_str()) {
                return Err(CoordinatorError::InvalidParameter(format!(
                    "Duplicate step key {} in plan",
                    step.key
                )));
            }
        }

        Ok(Self {
            pipeline_name: pipeline_name.into(),
            steps,
        })
    }
}

impl ExecutionPlan for StaticExecutionPlan {
    fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }
}

/// Everything a launched step can see of its run
#[derive(Debug, Clone)]
pub struct StepContext {
    run_id: String,
    pipeline_name: String,
    step: ExecutionStep,
    intermediates_dir: PathBuf,
    handle: Option<ExecutionTargetHandle>,
    sink: EventSink,
}

impl StepContext {
    pub(crate) fn new(run: &RunContext, step: &ExecutionStep) -> Self {
        Self {
            run_id: run.run_config.run_id().to_string(),
            pipeline_name: run.pipeline_name.clone(),
            step: step.clone(),
            intermediates_dir: run.intermediates_dir.clone(),
            handle: run.handle.clone(),
            sink: run.sink.clone(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn step_key(&self) -> &str {
        &self.step.key
    }

    pub fn step(&self) -> &ExecutionStep {
        &self.step
    }

    /// Target handle when running under a worker pool
    pub fn handle(&self) -> Option<&ExecutionTargetHandle> {
        self.handle.as_ref()
    }

    pub fn intermediates_dir(&self) -> &Path {
        &self.intermediates_dir
    }

    /// Location of any step output of this run
    pub fn intermediate_path(&self, output: &StepOutputHandle) -> PathBuf {
        self.intermediates_dir
            .join(&output.step_key)
            .join(&output.output_name)
    }

    /// Location of one of this step's own outputs
    pub fn output_path(&self, output_name: &str) -> PathBuf {
        self.intermediate_path(&StepOutputHandle::new(&self.step.key, output_name))
    }

    /// Record that this step persisted `output_name`. Returns the output location.
    pub async fn record_object_write(&self, output_name: &str) -> Result<PathBuf> {
        let path = self.output_path(output_name);
        self.record_object_operation(ObjectStoreOperationType::SetObject, output_name, &path)
            .await?;
        Ok(path)
    }

    /// Record that this step read an upstream output. Returns the input location.
    pub async fn record_object_read(&self, input: &StepOutputHandle) -> Result<PathBuf> {
        let path = self.intermediate_path(input);
        self.record_object_operation(
            ObjectStoreOperationType::GetObject,
            &input.output_name,
            &path,
        )
        .await?;
        Ok(path)
    }

    async fn record_object_operation(
        &self,
        op: ObjectStoreOperationType,
        value_name: &str,
        path: &Path,
    ) -> Result<()> {
        self.sink
            .record(PipelineEvent::step(
                &self.run_id,
                &self.pipeline_name,
                &self.step.key,
                EventSpecificData::ObjectStoreOperation {
                    op,
                    value_name: value_name.to_string(),
                    path: path.display().to_string(),
                },
            ))
            .await
    }
}

/// Performs the work of a single step.
///
/// Returning `Ok` declares the step durably succeeded: any outputs it reported with
/// [`StepContext::record_object_write`] must be persisted by then.
#[async_trait]
pub trait StepLauncher: Send + Sync {
    async fn launch_step(&self, context: StepContext) -> Result<()>;
}

//! Run records and the run storage capability.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{CoordinatorError, Result};
use crate::execution::config::{ReexecutionConfig, RunConfig, TagValue};

/// Lifecycle state of a persisted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRunStatus {
    NotStarted,
    Started,
    Success,
    Failure,
}

impl PipelineRunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for PipelineRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Started => write!(f, "started"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl std::str::FromStr for PipelineRunStatus {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "started" => Ok(Self::Started),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(CoordinatorError::Storage(format!(
                "Invalid pipeline run status: {s}"
            ))),
        }
    }
}

/// Persisted metadata of a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub pipeline_name: String,
    pub status: PipelineRunStatus,
    pub mode: Option<String>,
    pub tags: HashMap<String, TagValue>,
    pub step_keys_to_execute: Option<Vec<String>>,
    pub reexecution_config: Option<ReexecutionConfig>,
}

impl PipelineRun {
    /// A not-yet-started run record mirroring `run_config`
    pub fn from_run_config(pipeline_name: impl Into<String>, run_config: &RunConfig) -> Self {
        Self {
            run_id: run_config.run_id().to_string(),
            pipeline_name: pipeline_name.into(),
            status: PipelineRunStatus::NotStarted,
            mode: run_config.mode().map(str::to_string),
            tags: run_config.tags().clone(),
            step_keys_to_execute: run_config.step_keys_to_execute().map(<[String]>::to_vec),
            reexecution_config: run_config.reexecution_config().cloned(),
        }
    }

    pub fn with_status(self, status: PipelineRunStatus) -> Self {
        Self { status, ..self }
    }

    /// Serialized body stored alongside the indexed columns
    pub(crate) fn to_body(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuild from a stored body; the status column is authoritative.
    pub(crate) fn from_body(body: &str, status: &str) -> Result<Self> {
        let run: PipelineRun = serde_json::from_str(body)?;
        Ok(run.with_status(status.parse()?))
    }
}

/// Capability set of the run storage slot.
///
/// Concurrent writers rely on the backing engine's own transaction handling.
#[async_trait]
pub trait RunStorage: Send + Sync + fmt::Debug {
    /// Whether runs survive the process and are visible to other processes
    fn is_persistent(&self) -> bool;

    /// Persist a new run. Fails if the run id already exists.
    async fn add_run(&self, run: PipelineRun) -> Result<PipelineRun>;

    async fn get_run_by_id(&self, run_id: &str) -> Result<Option<PipelineRun>>;

    async fn has_run(&self, run_id: &str) -> Result<bool> {
        Ok(self.get_run_by_id(run_id).await?.is_some())
    }

    /// All runs, most recently added first
    async fn all_runs(&self) -> Result<Vec<PipelineRun>>;

    async fn update_run_status(&self, run_id: &str, status: PipelineRunStatus) -> Result<()>;

    /// Delete every run
    async fn wipe(&self) -> Result<()>;
}

pub(crate) fn duplicate_run_error(run_id: &str) -> CoordinatorError {
    CoordinatorError::InvalidParameter(format!("Run {run_id} already exists in run storage"))
}

pub(crate) fn missing_run_error(run_id: &str) -> CoordinatorError {
    CoordinatorError::InvalidParameter(format!("Run {run_id} not found in run storage"))
}

/// Process-local run storage backing ephemeral instances
#[derive(Debug, Default)]
pub struct InMemoryRunStorage {
    runs: RwLock<Vec<PipelineRun>>,
}

impl InMemoryRunStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStorage for InMemoryRunStorage {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn add_run(&self, run: PipelineRun) -> Result<PipelineRun> {
        let mut runs = self.runs.write();
        if runs.iter().any(|existing| existing.run_id == run.run_id) {
            return Err(duplicate_run_error(&run.run_id));
        }
        runs.push(run.clone());
        Ok(run)
    }

    async fn get_run_by_id(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        Ok(self
            .runs
            .read()
            .iter()
            .find(|run| run.run_id == run_id)
            .cloned())
    }

    async fn all_runs(&self) -> Result<Vec<PipelineRun>> {
        Ok(self.runs.read().iter().rev().cloned().collect())
    }

    async fn update_run_status(&self, run_id: &str, status: PipelineRunStatus) -> Result<()> {
        let mut runs = self.runs.write();
        let run = runs
            .iter_mut()
            .find(|run| run.run_id == run_id)
            .ok_or_else(|| missing_run_error(run_id))?;
        run.status = status;
        Ok(())
    }

    async fn wipe(&self) -> Result<()> {
        self.runs.write().clear();
        Ok(())
    }
}

//! # Execution
//!
//! Run configuration, executor selection and the engines that drive a plan's steps.
//!
//! ```text
//! RunConfig + ExecutorConfig ──► execute_run ──► check_requirements
//!                                     │
//!                                     ├─► run storage: PipelineRun (started)
//!                                     ├─► Engine::execute ──► StepLauncher per step
//!                                     │        └─► EventSink ──► event log storage
//!                                     └─► run storage: success | failure
//! ```
//!
//! A finished run's trail can be turned into a [`config::ReexecutionConfig`] so a
//! later run reuses the outputs of steps that durably succeeded.

pub mod api;
pub mod config;
pub mod engine;
pub mod events;
pub mod handle;
pub mod plan;
pub mod results;

pub use api::execute_run;
pub use config::{
    ExecutorConfig, MultiprocessExecutorConfig, ReexecutionConfig, RunConfig, RunConfigBuilder,
    TagValue,
};
pub use engine::{Engine, EngineKind, InProcessEngine, MultiprocessEngine, RunContext};
pub use events::{
    EventSink, EventSpecificData, ObjectStoreOperationType, PipelineEvent,
};
pub use handle::{ExecutionTarget, ExecutionTargetHandle};
pub use plan::{
    ExecutionPlan, ExecutionStep, StaticExecutionPlan, StepContext, StepLauncher,
    StepOutputHandle,
};
pub use results::PipelineExecutionResult;

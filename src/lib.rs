#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Coordinator
//!
//! Run-coordination layer for a data-pipeline orchestrator.
//!
//! ## Overview
//!
//! The coordinator decides how a run executes (in-process or on a bounded worker
//! pool), verifies that the instance and intermediates storage can support that
//! choice, lets a run resume by reusing a previous run's persisted step outputs, and
//! resolves which concrete storage engines back an instance from declarative,
//! serializable configuration.
//!
//! ## Module Organization
//!
//! - [`execution`] - Run configuration, executor selection, engines and `execute_run`
//! - [`config_plugin`] - Config plugin resolution, validation and construction
//! - [`instance`] - Instance references and resolved instances
//! - [`storage`] - Artifact, run, event log and compute log storage
//! - [`config`] - Instance configuration document and loader
//! - [`serdes`] - Versioned record serialization
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pipeline_coordinator::config_plugin::ConfigPluginRegistry;
//! use pipeline_coordinator::execution::{
//!     execute_run, ExecutionPlan, ExecutorConfig, ReexecutionConfig, RunConfig, StepLauncher,
//! };
//! use pipeline_coordinator::instance::Instance;
//! use pipeline_coordinator::storage::{register_builtin_plugins, SystemStorageDefinition};
//!
//! # async fn example(
//! #     plan: Arc<dyn ExecutionPlan>,
//! #     launcher: Arc<dyn StepLauncher>,
//! # ) -> pipeline_coordinator::Result<()> {
//! let mut registry = ConfigPluginRegistry::new();
//! register_builtin_plugins(&mut registry)?;
//! let instance = Instance::from_dir("/var/lib/pipelines", &registry).await?;
//!
//! let first = execute_run(
//!     &instance,
//!     plan.clone(),
//!     RunConfig::new(),
//!     &ExecutorConfig::InProcess,
//!     &SystemStorageDefinition::filesystem(),
//!     launcher.clone(),
//! )
//! .await?;
//!
//! if !first.success() {
//!     let retry = RunConfig::builder()
//!         .reexecution_config(ReexecutionConfig::from_previous_run(&first))
//!         .build()?;
//!     execute_run(
//!         &instance,
//!         plan,
//!         retry,
//!         &ExecutorConfig::InProcess,
//!         &SystemStorageDefinition::filesystem(),
//!         launcher,
//!     )
//!     .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod config_plugin;
pub mod constants;
pub mod error;
pub mod execution;
pub mod instance;
pub mod logging;
pub mod serdes;
pub mod storage;

pub use config_plugin::{ConfigPlugin, ConfigPluginData, ConfigPluginRegistry};
pub use error::{CoordinatorError, PluginResolutionError, Result};
pub use execution::{
    execute_run, ExecutorConfig, MultiprocessExecutorConfig, PipelineExecutionResult,
    ReexecutionConfig, RunConfig,
};
pub use instance::{Instance, InstanceRef, InstanceType};
pub use storage::SystemStorageDefinition;

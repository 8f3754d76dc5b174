//! # Execution Engines
//!
//! Engines walk the selected steps of an [`ExecutionPlan`] and drive a
//! [`StepLauncher`] for each of them, recording the step-level event trail.
//!
//! Both engines apply the same per-step decision once all selected upstream steps
//! have finished:
//!
//! ```text
//! upstream failed/skipped ──► StepSkipped
//! all outputs reusable    ──► CP_OBJECT per output (not launched)
//! otherwise               ──► StepStart ─► launch ─┬─ Ok  ─► StepSuccess
//!                                                  └─ Err ─► StepFailure
//! ```
//!
//! Upstream steps outside the run's step subset count as satisfied; when the run
//! reexecutes a previous one, their covered outputs are copied in before any
//! selected step starts. A step failure
//! is an event, not an engine error; engines only return `Err` when the coordination
//! itself fails (for example the event log cannot be written).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::config::RunConfig;
use super::events::{EventSink, EventSpecificData, ObjectStoreOperationType, PipelineEvent};
use super::handle::ExecutionTargetHandle;
use super::plan::{ExecutionPlan, ExecutionStep, StepContext, StepLauncher};
use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    InProcess,
    Multiprocess,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => write!(f, "in_process"),
            Self::Multiprocess => write!(f, "multiprocess"),
        }
    }
}

/// Per-run state shared by the engine and every launched step
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_config: RunConfig,
    pub pipeline_name: String,
    /// This run's intermediates root in artifact storage
    pub intermediates_dir: PathBuf,
    pub handle: Option<ExecutionTargetHandle>,
    pub sink: EventSink,
}

impl RunContext {
    fn step_event(&self, step_key: &str, event: EventSpecificData) -> PipelineEvent {
        PipelineEvent::step(
            self.run_config.run_id(),
            &self.pipeline_name,
            step_key,
            event,
        )
    }
}

#[async_trait]
pub trait Engine: Send + Sync + fmt::Debug {
    fn kind(&self) -> EngineKind;

    async fn execute(
        &self,
        plan: Arc<dyn ExecutionPlan>,
        run: RunContext,
        launcher: Arc<dyn StepLauncher>,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
}

enum Readiness {
    Ready,
    Waiting,
    Blocked,
}

/// Steps selected for this run, in plan order.
fn select_steps(plan: &dyn ExecutionPlan, run_config: &RunConfig) -> Result<Vec<ExecutionStep>> {
    let Some(subset) = run_config.step_keys_to_execute() else {
        return Ok(plan.steps().to_vec());
    };

    let unknown: Vec<&str> = subset
        .iter()
        .filter(|key| plan.get_step(key).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(CoordinatorError::Execution(format!(
            "Execution plan for {} does not contain step keys: {}",
            plan.pipeline_name(),
            unknown.join(", ")
        )));
    }

    Ok(plan
        .steps()
        .iter()
        .filter(|step| subset.contains(&step.key))
        .cloned()
        .collect())
}

fn readiness(
    step: &ExecutionStep,
    selected: &HashSet<String>,
    outcomes: &HashMap<String, StepOutcome>,
) -> Readiness {
    let mut waiting = false;
    for upstream in step.upstream_step_keys.iter().filter(|key| selected.contains(*key)) {
        match outcomes.get(upstream) {
            Some(StepOutcome::Succeeded) => {}
            Some(StepOutcome::Failed | StepOutcome::Skipped) => return Readiness::Blocked,
            None => waiting = true,
        }
    }

    if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}

fn is_reusable(step: &ExecutionStep, run_config: &RunConfig) -> bool {
    match run_config.reexecution_config() {
        Some(reexecution) if !step.output_names.is_empty() => step
            .output_names
            .iter()
            .all(|output_name| reexecution.covers(&step.key, output_name)),
        _ => false,
    }
}

async fn skip_step(run: &RunContext, step: &ExecutionStep) -> Result<StepOutcome> {
    debug!(step_key = %step.key, "Skipping step after upstream failure");
    run.sink
        .record(run.step_event(&step.key, EventSpecificData::StepSkipped))
        .await?;
    Ok(StepOutcome::Skipped)
}

/// Carry a step's outputs over from the previous run instead of launching it.
///
/// Outputs present in the previous run's intermediates are copied into this run's;
/// a `CP_OBJECT` event is recorded for every output either way.
async fn reuse_step(run: &RunContext, step: &ExecutionStep) -> Result<StepOutcome> {
    let Some(reexecution) = run.run_config.reexecution_config() else {
        return Err(CoordinatorError::Execution(format!(
            "Step {} marked for reuse without a reexecution config",
            step.key
        )));
    };

    let output_names: Vec<&str> = step.output_names.iter().map(String::as_str).collect();
    copy_previous_outputs(run, reexecution.previous_run_id(), &step.key, &output_names).await?;

    info!(
        step_key = %step.key,
        previous_run_id = %reexecution.previous_run_id(),
        "Reused step outputs from previous run"
    );
    Ok(StepOutcome::Succeeded)
}

/// Bring the reusable outputs of unselected upstream steps into this run.
///
/// Only steps that feed a selected step are considered, and only the outputs the
/// reexecution config covers are copied. The steps themselves are not launched and
/// get no outcome.
async fn carry_over_unselected_inputs(
    plan: &dyn ExecutionPlan,
    selected: &HashSet<String>,
    run: &RunContext,
) -> Result<()> {
    let Some(reexecution) = run.run_config.reexecution_config() else {
        return Ok(());
    };

    let feeding: HashSet<&str> = plan
        .steps()
        .iter()
        .filter(|step| selected.contains(&step.key))
        .flat_map(|step| step.upstream_step_keys.iter())
        .filter(|upstream| !selected.contains(*upstream))
        .map(String::as_str)
        .collect();

    for step in plan
        .steps()
        .iter()
        .filter(|step| feeding.contains(step.key.as_str()))
    {
        let output_names: Vec<&str> = step
            .output_names
            .iter()
            .filter(|output_name| reexecution.covers(&step.key, output_name))
            .map(String::as_str)
            .collect();

        if output_names.is_empty() {
            warn!(
                step_key = %step.key,
                previous_run_id = %reexecution.previous_run_id(),
                "Unselected upstream step has no reusable outputs"
            );
            continue;
        }

        copy_previous_outputs(run, reexecution.previous_run_id(), &step.key, &output_names)
            .await?;
        debug!(step_key = %step.key, "Carried over outputs of unselected upstream step");
    }

    Ok(())
}

async fn copy_previous_outputs(
    run: &RunContext,
    previous_run_id: &str,
    step_key: &str,
    output_names: &[&str],
) -> Result<()> {
    let previous_dir = run
        .intermediates_dir
        .parent()
        .map(|storage_dir| storage_dir.join(previous_run_id))
        .unwrap_or_default();

    for output_name in output_names {
        let source = previous_dir.join(step_key).join(output_name);
        let destination = run.intermediates_dir.join(step_key).join(output_name);

        if tokio::fs::try_exists(&source).await? {
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&source, &destination).await?;
        } else {
            debug!(
                step_key = %step_key,
                output_name = %output_name,
                "Reused output has no local intermediate to copy"
            );
        }

        run.sink
            .record(run.step_event(
                step_key,
                EventSpecificData::ObjectStoreOperation {
                    op: ObjectStoreOperationType::CpObject,
                    value_name: (*output_name).to_string(),
                    path: destination.display().to_string(),
                },
            ))
            .await?;
    }

    Ok(())
}

async fn launch_step(
    run: &RunContext,
    step: &ExecutionStep,
    launcher: &dyn StepLauncher,
) -> Result<StepOutcome> {
    run.sink
        .record(run.step_event(&step.key, EventSpecificData::StepStart))
        .await?;

    match launcher.launch_step(StepContext::new(run, step)).await {
        Ok(()) => {
            run.sink
                .record(run.step_event(&step.key, EventSpecificData::StepSuccess))
                .await?;
            Ok(StepOutcome::Succeeded)
        }
        Err(error) => {
            warn!(step_key = %step.key, error = %error, "Step failed");
            run.sink
                .record(run.step_event(
                    &step.key,
                    EventSpecificData::StepFailure {
                        error: error.to_string(),
                    },
                ))
                .await?;
            Ok(StepOutcome::Failed)
        }
    }
}

/// Executes steps one at a time, in plan order, on the calling task
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessEngine;

#[async_trait]
impl Engine for InProcessEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::InProcess
    }

    async fn execute(
        &self,
        plan: Arc<dyn ExecutionPlan>,
        run: RunContext,
        launcher: Arc<dyn StepLauncher>,
    ) -> Result<()> {
        let steps = select_steps(plan.as_ref(), &run.run_config)?;
        let selected: HashSet<String> = steps.iter().map(|step| step.key.clone()).collect();
        carry_over_unselected_inputs(plan.as_ref(), &selected, &run).await?;
        let mut outcomes = HashMap::new();

        for step in &steps {
            let outcome = match readiness(step, &selected, &outcomes) {
                Readiness::Blocked => skip_step(&run, step).await?,
                Readiness::Ready if is_reusable(step, &run.run_config) => {
                    reuse_step(&run, step).await?
                }
                Readiness::Ready => launch_step(&run, step, launcher.as_ref()).await?,
                Readiness::Waiting => {
                    return Err(CoordinatorError::Execution(format!(
                        "Step {} precedes one of its upstream steps in the plan",
                        step.key
                    )))
                }
            };
            outcomes.insert(step.key.clone(), outcome);
        }

        Ok(())
    }
}

/// Executes independent steps concurrently on spawned worker tasks.
///
/// At most `max_concurrent` launches run at any moment. Steps are dispatched as soon
/// as their selected upstream steps have succeeded.
#[derive(Debug, Clone)]
pub struct MultiprocessEngine {
    max_concurrent: NonZeroUsize,
}

impl MultiprocessEngine {
    pub fn new(max_concurrent: NonZeroUsize) -> Self {
        Self { max_concurrent }
    }

    pub fn max_concurrent(&self) -> NonZeroUsize {
        self.max_concurrent
    }
}

#[async_trait]
impl Engine for MultiprocessEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Multiprocess
    }

    async fn execute(
        &self,
        plan: Arc<dyn ExecutionPlan>,
        run: RunContext,
        launcher: Arc<dyn StepLauncher>,
    ) -> Result<()> {
        let mut pending = select_steps(plan.as_ref(), &run.run_config)?;
        let selected: HashSet<String> = pending.iter().map(|step| step.key.clone()).collect();
        carry_over_unselected_inputs(plan.as_ref(), &selected, &run).await?;
        let mut outcomes: HashMap<String, StepOutcome> = HashMap::new();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.get()));
        let mut workers: JoinSet<(String, Result<StepOutcome>)> = JoinSet::new();

        debug!(
            run_id = %run.run_config.run_id(),
            max_concurrent = self.max_concurrent.get(),
            steps = pending.len(),
            "Starting multiprocess execution"
        );

        loop {
            // Resolve everything decidable without waiting on a worker.
            let mut progressed = true;
            while progressed {
                progressed = false;
                let mut waiting = Vec::with_capacity(pending.len());

                for step in pending.drain(..) {
                    match readiness(&step, &selected, &outcomes) {
                        Readiness::Waiting => waiting.push(step),
                        Readiness::Blocked => {
                            let outcome = skip_step(&run, &step).await?;
                            outcomes.insert(step.key, outcome);
                            progressed = true;
                        }
                        Readiness::Ready if is_reusable(&step, &run.run_config) => {
                            let outcome = reuse_step(&run, &step).await?;
                            outcomes.insert(step.key, outcome);
                            progressed = true;
                        }
                        Readiness::Ready => {
                            let run = run.clone();
                            let launcher = Arc::clone(&launcher);
                            let semaphore = Arc::clone(&semaphore);
                            workers.spawn(async move {
                                let outcome = match semaphore.acquire_owned().await {
                                    Ok(_permit) => launch_step(&run, &step, launcher.as_ref()).await,
                                    Err(e) => Err(CoordinatorError::Execution(format!(
                                        "Worker pool closed: {e}"
                                    ))),
                                };
                                (step.key, outcome)
                            });
                        }
                    }
                }

                pending = waiting;
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            let (step_key, outcome) = joined.map_err(|e| {
                CoordinatorError::Execution(format!("Step worker terminated abnormally: {e}"))
            })?;
            outcomes.insert(step_key, outcome?);
        }

        if let Some(step) = pending.first() {
            return Err(CoordinatorError::Execution(format!(
                "Step {} could not be scheduled: its upstream steps never completed",
                step.key
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::config::ReexecutionConfig;
    use crate::execution::plan::{StaticExecutionPlan, StepOutputHandle};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingLauncher {
        fail: HashSet<String>,
        launched: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl RecordingLauncher {
        fn failing(step_keys: &[&str]) -> Self {
            Self {
                fail: step_keys.iter().map(|key| key.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl StepLauncher for RecordingLauncher {
        async fn launch_step(&self, context: StepContext) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.launched.lock().push(context.step_key().to_string());

            for output_name in &context.step().output_names {
                context.record_object_write(output_name).await?;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(context.step_key()) {
                return Err(CoordinatorError::Execution("step exploded".to_string()));
            }
            Ok(())
        }
    }

    fn diamond_plan() -> Arc<dyn ExecutionPlan> {
        Arc::new(
            StaticExecutionPlan::new(
                "diamond",
                vec![
                    ExecutionStep::new("a").with_outputs(["out"]),
                    ExecutionStep::new("b").with_upstream(["a"]).with_outputs(["out"]),
                    ExecutionStep::new("c").with_upstream(["a"]).with_outputs(["out"]),
                    ExecutionStep::new("d").with_upstream(["b", "c"]),
                ],
            )
            .unwrap(),
        )
    }

    fn run_context(run_config: RunConfig, dir: &std::path::Path) -> RunContext {
        RunContext {
            intermediates_dir: dir.join("storage").join(run_config.run_id()).join(""),
            run_config,
            pipeline_name: "diamond".to_string(),
            handle: None,
            sink: EventSink::new(),
        }
    }

    fn step_events(events: &[PipelineEvent], step_key: &str) -> Vec<&'static str> {
        events
            .iter()
            .filter(|event| event.step_key.as_deref() == Some(step_key))
            .map(PipelineEvent::event_type_name)
            .collect()
    }

    #[tokio::test]
    async fn test_in_process_runs_in_plan_order() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let run = run_context(RunConfig::new(), dir.path());

        InProcessEngine
            .execute(diamond_plan(), run.clone(), launcher.clone())
            .await
            .unwrap();

        assert_eq!(*launcher.launched.lock(), vec!["a", "b", "c", "d"]);
        assert_eq!(launcher.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(
            step_events(&run.sink.snapshot().await, "a"),
            vec!["step_start", "object_store_operation", "step_success"]
        );
    }

    #[tokio::test]
    async fn test_failure_skips_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::failing(&["b"]));
        let run = run_context(RunConfig::new(), dir.path());

        MultiprocessEngine::new(NonZeroUsize::new(2).unwrap())
            .execute(diamond_plan(), run.clone(), launcher.clone())
            .await
            .unwrap();

        let events = run.sink.snapshot().await;
        assert!(step_events(&events, "b").contains(&"step_failure"));
        assert!(step_events(&events, "c").contains(&"step_success"));
        assert_eq!(step_events(&events, "d"), vec!["step_skipped"]);
        assert!(!launcher.launched.lock().contains(&"d".to_string()));
    }

    #[tokio::test]
    async fn test_multiprocess_respects_max_concurrent() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let plan: Arc<dyn ExecutionPlan> = Arc::new(
            StaticExecutionPlan::new(
                "wide",
                (0..8).map(|i| ExecutionStep::new(format!("s{i}"))).collect(),
            )
            .unwrap(),
        );

        MultiprocessEngine::new(NonZeroUsize::new(3).unwrap())
            .execute(plan, run_context(RunConfig::new(), dir.path()), launcher.clone())
            .await
            .unwrap();

        assert_eq!(launcher.launched.lock().len(), 8);
        assert!(launcher.max_running.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_subset_treats_unselected_upstream_as_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let run_config = RunConfig::builder()
            .step_keys_to_execute(["b", "d"])
            .build()
            .unwrap();

        InProcessEngine
            .execute(diamond_plan(), run_context(run_config, dir.path()), launcher.clone())
            .await
            .unwrap();

        assert_eq!(*launcher.launched.lock(), vec!["b", "d"]);
    }

    #[tokio::test]
    async fn test_unknown_subset_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let run_config = RunConfig::builder()
            .step_keys_to_execute(["nope"])
            .build()
            .unwrap();

        let result = InProcessEngine
            .execute(
                diamond_plan(),
                run_context(run_config, dir.path()),
                Arc::new(RecordingLauncher::default()),
            )
            .await;
        assert!(matches!(result, Err(CoordinatorError::Execution(_))));
    }

    #[tokio::test]
    async fn test_reused_steps_are_copied_not_launched() {
        let dir = tempfile::tempdir().unwrap();
        let previous_output = dir.path().join("storage").join("prev").join("a").join("out");
        std::fs::create_dir_all(previous_output.parent().unwrap()).unwrap();
        std::fs::write(&previous_output, b"cached").unwrap();

        let run_config = RunConfig::builder()
            .run_id("next")
            .reexecution_config(ReexecutionConfig::new(
                "prev",
                vec![StepOutputHandle::new("a", "out")],
            ))
            .build()
            .unwrap();
        let run = run_context(run_config, dir.path());
        let launcher = Arc::new(RecordingLauncher::default());

        MultiprocessEngine::new(NonZeroUsize::new(4).unwrap())
            .execute(diamond_plan(), run.clone(), launcher.clone())
            .await
            .unwrap();

        assert!(!launcher.launched.lock().contains(&"a".to_string()));
        let events = run.sink.snapshot().await;
        let copies: Vec<_> = events
            .iter()
            .filter_map(PipelineEvent::object_store_operation)
            .filter(|(op, _)| *op == ObjectStoreOperationType::CpObject)
            .collect();
        assert_eq!(copies, vec![(ObjectStoreOperationType::CpObject, "out")]);
        assert_eq!(
            std::fs::read(dir.path().join("storage/next/a/out")).unwrap(),
            b"cached"
        );
    }

    #[tokio::test]
    async fn test_subset_copies_reusable_outputs_of_unselected_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let previous_output = dir.path().join("storage").join("prev").join("a").join("out");
        std::fs::create_dir_all(previous_output.parent().unwrap()).unwrap();
        std::fs::write(&previous_output, b"from-a").unwrap();

        let run_config = RunConfig::builder()
            .run_id("resume")
            .step_keys_to_execute(["b", "c", "d"])
            .reexecution_config(ReexecutionConfig::new(
                "prev",
                vec![StepOutputHandle::new("a", "out")],
            ))
            .build()
            .unwrap();
        let run = run_context(run_config, dir.path());
        let launcher = Arc::new(RecordingLauncher::default());

        MultiprocessEngine::new(NonZeroUsize::new(2).unwrap())
            .execute(diamond_plan(), run.clone(), launcher.clone())
            .await
            .unwrap();

        assert!(!launcher.launched.lock().contains(&"a".to_string()));
        assert_eq!(launcher.launched.lock().len(), 3);
        assert_eq!(
            step_events(&run.sink.snapshot().await, "a"),
            vec!["object_store_operation"]
        );
        assert_eq!(
            std::fs::read(dir.path().join("storage/resume/a/out")).unwrap(),
            b"from-a"
        );
    }
}

//! Entry point for executing a pipeline run against an instance.

use std::sync::Arc;
use tracing::{error, info};

use super::config::{ExecutorConfig, RunConfig};
use super::engine::RunContext;
use super::events::{EventSink, EventSpecificData, PipelineEvent};
use super::plan::{ExecutionPlan, StepLauncher};
use super::results::PipelineExecutionResult;
use crate::error::Result;
use crate::instance::Instance;
use crate::logging::log_run_operation;
use crate::storage::{PipelineRun, PipelineRunStatus, SystemStorageDefinition};

/// Execute `plan` as a new run on `instance`.
///
/// The executor's requirements are checked before anything is written. The run is
/// then recorded as started, every event is stored in the instance's event log as
/// it is emitted, and the run's final status reflects whether any step failed.
/// Once the status is recorded the event log releases what it held open for the run.
/// Step failures are reported through the result, not as an `Err`.
pub async fn execute_run(
    instance: &Instance,
    plan: Arc<dyn ExecutionPlan>,
    run_config: RunConfig,
    executor_config: &ExecutorConfig,
    storage_def: &SystemStorageDefinition,
    launcher: Arc<dyn StepLauncher>,
) -> Result<PipelineExecutionResult> {
    executor_config.check_requirements(instance, storage_def)?;

    let pipeline_name = plan.pipeline_name().to_string();
    let run_id = run_config.run_id().to_string();

    let run = PipelineRun::from_run_config(&pipeline_name, &run_config)
        .with_status(PipelineRunStatus::Started);
    instance.run_storage().add_run(run).await?;
    log_run_operation(
        "start",
        &run_id,
        Some(&pipeline_name),
        "started",
        Some(&executor_config.engine_kind().to_string()),
    );

    let sink = EventSink::persisting_to(Arc::clone(instance.event_storage()));
    let pipeline_event =
        |event: EventSpecificData| PipelineEvent::pipeline(&run_id, &pipeline_name, event);

    sink.record(pipeline_event(EventSpecificData::PipelineStart))
        .await?;

    let run_context = RunContext {
        intermediates_dir: instance.local_artifact_storage().intermediates_dir(&run_id),
        run_config,
        pipeline_name: pipeline_name.clone(),
        handle: executor_config.handle().cloned(),
        sink: sink.clone(),
    };

    let engine = executor_config.get_engine();
    if let Err(engine_error) = engine.execute(plan, run_context, launcher).await {
        error!(run_id = %run_id, error = %engine_error, "Engine failed to coordinate run");
        sink.record(pipeline_event(EventSpecificData::PipelineFailure))
            .await?;
        instance
            .run_storage()
            .update_run_status(&run_id, PipelineRunStatus::Failure)
            .await?;
        instance.event_storage().close_run(&run_id).await?;
        log_run_operation(
            "finish",
            &run_id,
            Some(&pipeline_name),
            "failure",
            Some(&engine_error.to_string()),
        );
        return Err(engine_error);
    }

    let steps_succeeded = !sink
        .snapshot()
        .await
        .iter()
        .any(PipelineEvent::is_step_failure);

    let (event, status) = if steps_succeeded {
        (EventSpecificData::PipelineSuccess, PipelineRunStatus::Success)
    } else {
        (EventSpecificData::PipelineFailure, PipelineRunStatus::Failure)
    };
    sink.record(pipeline_event(event)).await?;
    instance
        .run_storage()
        .update_run_status(&run_id, status)
        .await?;
    instance.event_storage().close_run(&run_id).await?;

    info!(run_id = %run_id, status = %status, "Run finished");
    log_run_operation("finish", &run_id, Some(&pipeline_name), &status.to_string(), None);

    Ok(PipelineExecutionResult::new(
        run_id,
        pipeline_name,
        sink.snapshot().await,
    ))
}

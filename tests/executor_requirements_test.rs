mod common;

use common::{builtin_registry, etl_plan, FileWritingLauncher};
use std::sync::Arc;

use pipeline_coordinator::constants::env::HOME_ENV_VAR;
use pipeline_coordinator::execution::{
    execute_run, EngineKind, ExecutionTargetHandle, ExecutorConfig, MultiprocessExecutorConfig,
    RunConfig,
};
use pipeline_coordinator::instance::Instance;
use pipeline_coordinator::storage::SystemStorageDefinition;

fn multiprocess() -> ExecutorConfig {
    ExecutorConfig::Multiprocess(
        MultiprocessExecutorConfig::new(
            Some(ExecutionTargetHandle::for_module("etl", "pipelines.etl", "define_etl")),
            Some(2),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_multiprocess_requirement_truth_table() {
    let dir = tempfile::tempdir().unwrap();
    let persistent = Instance::from_dir(dir.path(), &builtin_registry())
        .await
        .unwrap();
    let ephemeral = Instance::ephemeral(dir.path().join("ephemeral"));
    let executor = multiprocess();

    let in_memory = SystemStorageDefinition::in_memory();
    let filesystem = SystemStorageDefinition::filesystem();

    for instance in [&persistent, &ephemeral] {
        let error = executor.check_requirements(instance, &in_memory).unwrap_err();
        assert!(error.is_unmet_executor_requirement());
        assert!(error.to_string().contains("in_memory"));
    }

    let error = executor
        .check_requirements(&ephemeral, &filesystem)
        .unwrap_err();
    assert!(error.is_unmet_executor_requirement());
    assert!(error.to_string().contains(HOME_ENV_VAR));

    assert!(executor.check_requirements(&persistent, &filesystem).is_ok());
}

#[tokio::test]
async fn test_in_process_has_no_requirements() {
    let dir = tempfile::tempdir().unwrap();
    let ephemeral = Instance::ephemeral(dir.path());

    for storage_def in [
        SystemStorageDefinition::in_memory(),
        SystemStorageDefinition::filesystem(),
    ] {
        assert!(ExecutorConfig::InProcess
            .check_requirements(&ephemeral, &storage_def)
            .is_ok());
    }
    assert_eq!(ExecutorConfig::InProcess.engine_kind(), EngineKind::InProcess);
    assert_eq!(
        ExecutorConfig::InProcess.get_engine().kind(),
        EngineKind::InProcess
    );
    assert_eq!(multiprocess().get_engine().kind(), EngineKind::Multiprocess);
}

#[tokio::test]
async fn test_execute_run_rejects_unmet_requirements_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let instance = Instance::from_dir(dir.path(), &builtin_registry())
        .await
        .unwrap();
    let launcher = Arc::new(FileWritingLauncher::new());
    let run_config = RunConfig::builder().run_id("rejected").build().unwrap();

    let error = execute_run(
        &instance,
        etl_plan(),
        run_config,
        &multiprocess(),
        &SystemStorageDefinition::in_memory(),
        launcher.clone(),
    )
    .await
    .unwrap_err();

    assert!(error.is_unmet_executor_requirement());
    assert!(launcher.launched().is_empty());
    assert!(!instance.run_storage().has_run("rejected").await.unwrap());
    assert!(instance
        .event_storage()
        .get_logs_for_run("rejected")
        .await
        .unwrap()
        .is_empty());
}

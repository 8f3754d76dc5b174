//! Runs only when `PIPELINE_POSTGRES_TEST_URL` names a disposable database.
#![cfg(feature = "postgres")]

mod common;

use common::postgres_test_url;
use serde_json::json;
use std::sync::Arc;

use pipeline_coordinator::config_plugin::{ConfigPluginData, ConfigPluginRegistry};
use pipeline_coordinator::constants::plugins::{
    POSTGRES_RUN_STORAGE_MODULE, POSTGRES_RUN_STORAGE_PLUGIN,
};
use pipeline_coordinator::execution::RunConfig;
use pipeline_coordinator::storage::{
    register_postgres_plugins, PipelineRun, PipelineRunStatus, PostgresRunStorage, RunStorage,
};
use pipeline_coordinator::CoordinatorError;

#[tokio::test]
async fn test_postgres_run_storage_lifecycle() {
    let Some(url) = postgres_test_url() else {
        eprintln!("PIPELINE_POSTGRES_TEST_URL not set, skipping");
        return;
    };

    let seeded = PostgresRunStorage::new(&url).await.unwrap();
    seeded
        .add_run(PipelineRun::from_run_config("etl", &RunConfig::new()))
        .await
        .unwrap();
    assert!(!seeded.all_runs().await.unwrap().is_empty());
    drop(seeded);

    let storage = PostgresRunStorage::create_clean_storage(&url).await.unwrap();
    assert!(storage.all_runs().await.unwrap().is_empty());

    let run_config = RunConfig::builder().run_id("pg-run").build().unwrap();
    storage
        .add_run(PipelineRun::from_run_config("etl", &run_config))
        .await
        .unwrap();
    assert!(matches!(
        storage
            .add_run(PipelineRun::from_run_config("etl", &run_config))
            .await,
        Err(CoordinatorError::InvalidParameter(_))
    ));

    storage
        .update_run_status("pg-run", PipelineRunStatus::Success)
        .await
        .unwrap();

    let mut registry = ConfigPluginRegistry::new();
    register_postgres_plugins(&mut registry).unwrap();
    let data = ConfigPluginData::from_config(
        POSTGRES_RUN_STORAGE_MODULE,
        POSTGRES_RUN_STORAGE_PLUGIN,
        &json!({ "postgres_url": url }),
    )
    .unwrap();
    let resolved = registry
        .construct::<Arc<dyn RunStorage>>(&data)
        .await
        .unwrap();

    let stored = resolved.get_run_by_id("pg-run").await.unwrap().unwrap();
    assert_eq!(stored.status, PipelineRunStatus::Success);
    assert_eq!(stored.tags, run_config.tags().clone());

    resolved.wipe().await.unwrap();
    assert!(!storage.has_run("pg-run").await.unwrap());
}

//! Tests for the shell-command backup strategy
//!
//! The dump command is mocked where the test is about orchestration and real
//! where the test is about processes and files.

use backup_runner::strategies::BackupStrategy;
use backup_runner::{CommandStrategy, Orchestrator, StartupError};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    create_artifacts, sample_artifacts, CapturedLogs, ConfigBuilder, MemoryStorage, MockExecutor, MockResponse,
    TestContext,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_single_run_uploads_and_prunes() {
    let builder = ConfigBuilder::minimal()
        .with_command("sh -c 'true' {output}")
        .with_retention(2);
    let (config, _temp_dir) = builder.persist();
    let old = sample_artifacts(3);
    let refs: Vec<&str> = old.iter().map(String::as_str).collect();
    let storage = MemoryStorage::with_artifacts(&refs);
    let executor = MockExecutor::new();
    let logs = CapturedLogs::new();

    let strategy = CommandStrategy::from_config(config).with_executor(Arc::new(executor.clone()));
    Orchestrator::new(Box::new(strategy), logs.dispatch(), CancellationToken::new())
        .with_storage(Arc::new(storage.clone()))
        .run_single()
        .await
        .unwrap();

    let uploads = storage.upload_calls();
    assert_eq!(uploads.len(), 1);
    assert_eq!(storage.contents(&uploads[0]).unwrap(), b"mock backup contents");
    assert_eq!(storage.delete_calls(), old[..2].to_vec());
    assert_eq!(storage.artifact_names(), vec![old[2].clone(), uploads[0].clone()]);
    assert!(logs.contains("Applying retention policy (keeping 2 backups)..."));
}

#[tokio::test]
async fn test_dump_without_output_fails_run() {
    let (config, _temp_dir) = ConfigBuilder::minimal()
        .with_command("sh -c 'true'")
        .persist();
    let storage = MemoryStorage::new();
    let executor = MockExecutor::new().respond_to("sh -c", MockResponse::NoOutput);

    let strategy = CommandStrategy::from_config(config).with_executor(Arc::new(executor));
    let err = Orchestrator::new(Box::new(strategy), CapturedLogs::new().dispatch(), CancellationToken::new())
        .with_storage(Arc::new(storage.clone()))
        .run_single()
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("did not produce"));
    assert!(storage.upload_calls().is_empty());
}

#[tokio::test]
async fn test_upload_failure_fails_run_and_skips_retention() {
    let (config, _temp_dir) = ConfigBuilder::minimal()
        .with_command("sh -c 'true' {output}")
        .with_retention(0)
        .persist();
    let storage = MemoryStorage::with_artifacts(&["pg-backup_2024-01-01_00-00-00.dump"]).with_failing_upload();

    let strategy = CommandStrategy::from_config(config).with_executor(Arc::new(MockExecutor::new()));
    let err = Orchestrator::new(Box::new(strategy), CapturedLogs::new().dispatch(), CancellationToken::new())
        .with_storage(Arc::new(storage.clone()))
        .run_single()
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("simulated upload failure"));
    assert!(storage.delete_calls().is_empty());
}

#[tokio::test]
async fn test_failing_test_command_aborts_startup() {
    let (config, _temp_dir) = ConfigBuilder::minimal()
        .with_command("sh -c 'true' {output}")
        .with_test_command("pg_isready -h db")
        .persist();
    let executor = MockExecutor::new().fail_on("pg_isready", "no response");

    let strategy = CommandStrategy::from_config(config).with_executor(Arc::new(executor.clone()));
    let result = Orchestrator::new(Box::new(strategy), CapturedLogs::new().dispatch(), CancellationToken::new())
        .with_storage(Arc::new(MemoryStorage::new()))
        .run()
        .await;

    assert!(matches!(result, Err(StartupError::Connection { name, .. }) if name == "test-command"));
    assert!(!executor.was_called_with("sh -c"));
}

#[tokio::test]
async fn test_missing_dump_program_aborts_startup() {
    let (config, _temp_dir) = ConfigBuilder::minimal()
        .with_command("definitely-not-a-backup-tool-4242 --out {output}")
        .persist();

    let strategy = CommandStrategy::from_config(config).with_executor(Arc::new(MockExecutor::new()));
    let result = Orchestrator::new(Box::new(strategy), CapturedLogs::new().dispatch(), CancellationToken::new())
        .with_storage(Arc::new(MemoryStorage::new()))
        .run()
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("not found in PATH"));
}

#[tokio::test]
async fn test_dump_starting_with_cd_passes_startup() {
    let (config, _temp_dir) = ConfigBuilder::minimal()
        .with_command("cd /tmp && pg_dump -f {output} app")
        .persist();
    let storage = MemoryStorage::new();

    let strategy = CommandStrategy::from_config(config).with_executor(Arc::new(MockExecutor::new()));
    Orchestrator::new(Box::new(strategy), CapturedLogs::new().dispatch(), CancellationToken::new())
        .with_storage(Arc::new(storage.clone()))
        .run_single()
        .await
        .unwrap();

    assert_eq!(storage.upload_calls().len(), 1);
}

#[tokio::test]
async fn test_config_loaded_from_file() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_command("pg_dump -f {output} app"));
    let path = ctx.write_config().unwrap();

    let mut strategy = CommandStrategy::from_path(&path);
    let config = strategy.config().unwrap();

    assert_eq!(config.command.unwrap().dump, "pg_dump -f {output} app");
    assert_eq!(strategy.name(), "test-command");
}

#[cfg(unix)]
#[tokio::test]
async fn test_real_shell_into_local_storage() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal().with_command("printf 'row1\\nrow2\\n' > {output}"),
    );
    let store = ctx.store_path().unwrap();
    create_artifacts(&store, &sample_artifacts(2)).unwrap();
    let config = ctx.config().unwrap().clone();

    Orchestrator::new(
        Box::new(CommandStrategy::from_config(config)),
        CapturedLogs::new().dispatch(),
        CancellationToken::new(),
    )
    .run_single()
    .await
    .unwrap();

    let stored = ctx.stored_files();
    assert_eq!(stored.len(), 3);
    let newest = stored.last().unwrap();
    assert_eq!(std::fs::read_to_string(store.join(newest)).unwrap(), "row1\nrow2\n");
    assert!(std::fs::read_dir(ctx.temp_dir().join("work")).unwrap().next().is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancelled_run_kills_command_and_cleans_up() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_command("sleep 30; touch {output}"));
    let config = ctx.config().unwrap().clone();
    let store = MemoryStorage::new();

    let mut strategy = CommandStrategy::from_config(config);
    strategy.config().unwrap();
    strategy.set_storage(Arc::new(store.clone())).unwrap();

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let started = std::time::Instant::now();
    let result = strategy.run(&cancel).await;
    canceller.await.unwrap();

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(store.upload_calls().is_empty());
    assert!(std::fs::read_dir(ctx.temp_dir().join("work")).unwrap().next().is_none());
}

//! Tests for the orchestrator lifecycle
//!
//! Startup fast-fail, scheduled ticks, per-run timeouts, overlap handling and
//! graceful drain on shutdown.

use backup_runner::storage::StorageError;
use backup_runner::{IntervalSchedule, Orchestrator, RunState, SchedulerClock, StartupError};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{wait_for_state, CapturedLogs, ConfigBuilder, MemoryStorage, MockStrategy, StrategyCall};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Harness {
    strategy: MockStrategy,
    storage: MemoryStorage,
    logs: CapturedLogs,
    shutdown: CancellationToken,
}

impl Harness {
    fn new(strategy: MockStrategy) -> Self {
        Self {
            strategy,
            storage: MemoryStorage::new(),
            logs: CapturedLogs::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Orchestrator ticking every `interval`, with in-memory storage
    fn orchestrator(&self, interval: Duration) -> Orchestrator {
        Orchestrator::new(
            Box::new(self.strategy.clone()),
            self.logs.dispatch(),
            self.shutdown.clone(),
        )
        .with_storage(Arc::new(self.storage.clone()))
        .with_schedule(Box::new(IntervalSchedule(interval)))
        .with_clock(SchedulerClock::runtime())
    }
}

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test(start_paused = true)]
async fn test_connection_failure_aborts_startup() {
    let config = ConfigBuilder::minimal().run_on_startup(true).build();
    let harness = Harness::new(MockStrategy::new(config).with_failing_connection());

    let result = harness.orchestrator(MINUTE).run().await;

    assert!(matches!(result, Err(StartupError::Connection { .. })));
    assert_eq!(harness.strategy.run_count(), 0);
    assert!(harness.logs.contains("Startup failed"));
    assert!(!harness.logs.contains("Scheduler started"));
}

#[tokio::test(start_paused = true)]
async fn test_startup_order() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config).with_failing_connection());

    let _ = harness.orchestrator(MINUTE).run().await;

    assert_eq!(
        harness.strategy.get_calls(),
        vec![
            StrategyCall::Config,
            StrategyCall::SetStorage("memory".to_string()),
            StrategyCall::TestConnection,
        ]
    );
    assert!(harness.strategy.storage().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_config_failure_aborts_startup() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config).with_failing_config());

    let result = harness.orchestrator(MINUTE).run().await;

    assert!(matches!(result, Err(StartupError::Config(_))));
    assert!(!harness.strategy.was_called(&StrategyCall::TestConnection));
}

#[tokio::test(start_paused = true)]
async fn test_set_storage_failure_aborts_startup() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config).with_failing_set_storage());

    let result = harness.orchestrator(MINUTE).run().await;

    assert!(matches!(result, Err(StartupError::SetStorage(_))));
    assert!(!harness.strategy.was_called(&StrategyCall::TestConnection));
}

#[tokio::test]
async fn test_malformed_schedule_aborts_startup() {
    let config = ConfigBuilder::minimal().with_schedule("61 * * * *").build();
    let strategy = MockStrategy::new(config);
    let logs = CapturedLogs::new();

    let result = Orchestrator::new(Box::new(strategy.clone()), logs.dispatch(), CancellationToken::new())
        .with_storage(Arc::new(MemoryStorage::new()))
        .run()
        .await;

    assert!(matches!(result, Err(StartupError::Schedule { expression, .. }) if expression == "61 * * * *"));
    assert!(!strategy.was_called(&StrategyCall::TestConnection));
}

#[tokio::test]
async fn test_schedule_that_never_fires_aborts_startup() {
    let config = ConfigBuilder::minimal().with_schedule("0 0 31 2 *").build();
    let strategy = MockStrategy::new(config);

    let result = Orchestrator::new(Box::new(strategy.clone()), CapturedLogs::new().dispatch(), CancellationToken::new())
        .with_storage(Arc::new(MemoryStorage::new()))
        .run()
        .await;

    assert!(matches!(result, Err(StartupError::ScheduleNeverFires(_))));
}

#[tokio::test]
async fn test_unknown_storage_type_aborts_startup() {
    let config = ConfigBuilder::minimal().with_storage_type("ftp").build();
    let strategy = MockStrategy::new(config);

    let result = Orchestrator::new(Box::new(strategy.clone()), CapturedLogs::new().dispatch(), CancellationToken::new())
        .run()
        .await;

    assert!(matches!(
        result,
        Err(StartupError::Storage(StorageError::UnsupportedType(t))) if t == "ftp"
    ));
    assert!(!strategy.was_called(&StrategyCall::TestConnection));
}

#[tokio::test(start_paused = true)]
async fn test_failed_startup_run_still_schedules() {
    let config = ConfigBuilder::minimal().run_on_startup(true).build();
    let harness = Harness::new(MockStrategy::new(config).with_failing_run());
    let orchestrator = harness.orchestrator(HOUR);
    let mut state = orchestrator.subscribe();

    let handle = tokio::spawn(orchestrator.run());
    wait_for_state(&mut state, RunState::Scheduled).await;

    assert_eq!(harness.strategy.run_count(), 1);
    assert!(harness.logs.contains("Running initial backup on startup..."));
    assert!(harness.logs.contains("Initial backup failed: simulated backup failure"));
    assert!(harness.logs.contains("Scheduler started"));
    assert!(harness.logs.contains("Next backup scheduled at"));

    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(*state.borrow(), RunState::Stopped);
    assert!(harness.logs.contains("Shutdown complete"));
}

#[tokio::test(start_paused = true)]
async fn test_no_startup_run_by_default() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config));
    let orchestrator = harness.orchestrator(HOUR);
    let mut state = orchestrator.subscribe();

    let handle = tokio::spawn(orchestrator.run());
    wait_for_state(&mut state, RunState::Scheduled).await;
    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(harness.strategy.run_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_each_tick_runs_a_backup() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config));

    let handle = tokio::spawn(harness.orchestrator(MINUTE).run());
    tokio::time::sleep(Duration::from_secs(185)).await;
    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(harness.strategy.run_count(), 3);
    assert_eq!(harness.strategy.completed_runs(), 3);
    assert_eq!(harness.logs.count("Cron triggered backup job"), 3);
    assert_eq!(harness.logs.count("Backup completed in"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_does_not_stop_schedule() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config).with_failing_run());

    let handle = tokio::spawn(harness.orchestrator(MINUTE).run());
    tokio::time::sleep(Duration::from_secs(125)).await;
    harness.strategy.set_fail_run(false);
    tokio::time::sleep(Duration::from_secs(60)).await;
    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(harness.strategy.run_count(), 3);
    assert_eq!(harness.logs.count("Backup failed: simulated backup failure"), 2);
    assert_eq!(harness.logs.count("Backup completed in"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_exceeding_timeout_is_cancelled() {
    let config = ConfigBuilder::minimal()
        .run_on_startup(true)
        .with_timeout_minutes(1)
        .build();
    let harness = Harness::new(MockStrategy::new(config).with_run_delay(Duration::from_secs(120)));
    let orchestrator = harness.orchestrator(HOUR);
    let mut state = orchestrator.subscribe();
    let started = Instant::now();

    let handle = tokio::spawn(orchestrator.run());
    wait_for_state(&mut state, RunState::Scheduled).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= MINUTE && elapsed < Duration::from_secs(61));
    assert_eq!(harness.strategy.cancelled_runs(), 1);
    assert_eq!(harness.strategy.completed_runs(), 0);
    assert!(harness.logs.contains("Initial backup timed out after 1 minutes"));

    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_run() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config).with_run_delay(Duration::from_secs(30)));
    let orchestrator = harness.orchestrator(MINUTE);
    let mut state = orchestrator.subscribe();
    let started = Instant::now();

    let handle = tokio::spawn(orchestrator.run());
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(*state.borrow_and_update(), RunState::Running);

    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert!(started.elapsed() >= Duration::from_secs(90));
    assert_eq!(harness.strategy.run_count(), 1);
    assert_eq!(harness.strategy.completed_runs(), 1);
    assert_eq!(harness.strategy.cancelled_runs(), 0);
    assert!(harness.logs.contains("Waiting for 1 in-flight backup(s) to finish..."));
    assert_eq!(*state.borrow(), RunState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_runs_allowed_by_default() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config).with_run_delay(Duration::from_secs(150)));

    let handle = tokio::spawn(harness.orchestrator(MINUTE).run());
    tokio::time::sleep(Duration::from_secs(200)).await;
    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(harness.strategy.run_count(), 3);
    assert_eq!(harness.strategy.max_concurrent(), 3);
    assert_eq!(harness.strategy.completed_runs(), 3);
    assert!(harness.logs.contains("starting an overlapping run"));
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_skips_ticks_while_running() {
    let config = ConfigBuilder::minimal().single_flight(true).build();
    let harness = Harness::new(MockStrategy::new(config).with_run_delay(Duration::from_secs(150)));

    let handle = tokio::spawn(harness.orchestrator(MINUTE).run());
    tokio::time::sleep(Duration::from_secs(200)).await;
    harness.shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(harness.strategy.run_count(), 1);
    assert_eq!(harness.strategy.max_concurrent(), 1);
    assert_eq!(harness.logs.count("Previous backup still running, skipping this run"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_scheduler_starts() {
    let config = ConfigBuilder::minimal().run_on_startup(true).build();
    let harness = Harness::new(MockStrategy::new(config));
    harness.shutdown.cancel();

    harness.orchestrator(MINUTE).run().await.unwrap();

    assert_eq!(harness.strategy.run_count(), 1);
    assert!(!harness.logs.contains("Scheduler started"));
    assert!(harness.logs.contains("Shutdown complete"));
}

#[tokio::test(start_paused = true)]
async fn test_run_single_reports_run_result() {
    let config = ConfigBuilder::minimal().build();
    let harness = Harness::new(MockStrategy::new(config.clone()));
    harness.orchestrator(HOUR).run_single().await.unwrap();
    assert_eq!(harness.strategy.run_count(), 1);
    assert!(harness.logs.contains("Backup completed in"));

    let failing = Harness::new(MockStrategy::new(config).with_failing_run());
    let err = failing.orchestrator(HOUR).run_single().await.unwrap_err();
    assert!(err.to_string().contains("simulated backup failure"));
}

//! Scriptable backup strategy for tests
//! Available for use in external test crates

use super::BackupStrategy;
use crate::config::Config;
use crate::storage::Storage;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Recorded strategy invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrategyCall {
    Config,
    SetStorage(String),
    TestConnection,
    Run,
}

/// Strategy whose behavior is configured up front; clones share state
#[derive(Clone)]
pub struct MockStrategy {
    config: Config,
    pub calls: Arc<Mutex<Vec<StrategyCall>>>,
    storage: Arc<Mutex<Option<Arc<dyn Storage>>>>,
    fail_config: Arc<AtomicBool>,
    fail_set_storage: Arc<AtomicBool>,
    fail_connection: Arc<AtomicBool>,
    fail_run: Arc<AtomicBool>,
    run_delay: Arc<Mutex<Option<Duration>>>,
    running: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
    completed_runs: Arc<AtomicUsize>,
    cancelled_runs: Arc<AtomicUsize>,
}

impl MockStrategy {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            calls: Arc::new(Mutex::new(Vec::new())),
            storage: Arc::new(Mutex::new(None)),
            fail_config: Arc::new(AtomicBool::new(false)),
            fail_set_storage: Arc::new(AtomicBool::new(false)),
            fail_connection: Arc::new(AtomicBool::new(false)),
            fail_run: Arc::new(AtomicBool::new(false)),
            run_delay: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
            completed_runs: Arc::new(AtomicUsize::new(0)),
            cancelled_runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_failing_config(self) -> Self {
        self.fail_config.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_set_storage(self) -> Self {
        self.fail_set_storage.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_connection(self) -> Self {
        self.fail_connection.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_run(self) -> Self {
        self.fail_run.store(true, Ordering::SeqCst);
        self
    }

    /// Make every run take `delay` unless cancelled first
    pub fn with_run_delay(self, delay: Duration) -> Self {
        *self.run_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Toggle run failures after construction
    pub fn set_fail_run(&self, fail: bool) {
        self.fail_run.store(fail, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> Vec<StrategyCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, call: &StrategyCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    /// Number of `run` invocations started
    pub fn run_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == StrategyCall::Run)
            .count()
    }

    /// Runs that finished without being cancelled
    pub fn completed_runs(&self) -> usize {
        self.completed_runs.load(Ordering::SeqCst)
    }

    /// Runs aborted by their cancellation token
    pub fn cancelled_runs(&self) -> usize {
        self.cancelled_runs.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously executing runs observed
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn storage(&self) -> Option<Arc<dyn Storage>> {
        self.storage.lock().unwrap().clone()
    }

    fn record(&self, call: StrategyCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BackupStrategy for MockStrategy {
    fn name(&self) -> &str {
        "mock"
    }

    fn config(&mut self) -> Result<Config> {
        self.record(StrategyCall::Config);
        if self.fail_config.load(Ordering::SeqCst) {
            anyhow::bail!("simulated configuration failure");
        }
        Ok(self.config.clone())
    }

    fn extra_config_log_info(&self) -> Vec<String> {
        vec!["Mock strategy".to_string()]
    }

    fn set_storage(&mut self, storage: Arc<dyn Storage>) -> Result<()> {
        self.record(StrategyCall::SetStorage(storage.storage_type().to_string()));
        if self.fail_set_storage.load(Ordering::SeqCst) {
            anyhow::bail!("simulated set_storage failure");
        }
        *self.storage.lock().unwrap() = Some(storage);
        Ok(())
    }

    async fn test_connection(&self, _cancel: &CancellationToken) -> Result<()> {
        self.record(StrategyCall::TestConnection);
        if self.fail_connection.load(Ordering::SeqCst) {
            anyhow::bail!("simulated connection failure");
        }
        Ok(())
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.record(StrategyCall::Run);

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now_running, Ordering::SeqCst);

        let delay = *self.run_delay.lock().unwrap();
        let cancelled = match delay {
            Some(delay) => tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = cancel.cancelled() => true,
            },
            None => cancel.is_cancelled(),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);

        if cancelled {
            self.cancelled_runs.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("backup cancelled");
        }

        self.completed_runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_run.load(Ordering::SeqCst) {
            anyhow::bail!("simulated backup failure");
        }
        Ok(())
    }
}

pub mod command;
pub mod mock;

pub use command::CommandStrategy;

use crate::config::Config;
use crate::storage::Storage;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Trait for backup strategies
///
/// The orchestrator drives a strategy through `config`, `set_storage` and
/// `test_connection` once at startup, then calls `run` for every scheduled
/// backup. `run` may be invoked concurrently when runs overlap.
#[async_trait]
pub trait BackupStrategy: Send + Sync {
    /// Strategy name (for logging)
    fn name(&self) -> &str;

    /// Load and validate the run configuration
    fn config(&mut self) -> Result<Config>;

    /// Strategy-specific lines logged alongside the configuration summary
    fn extra_config_log_info(&self) -> Vec<String> {
        Vec::new()
    }

    /// Inject the storage every run uploads to
    fn set_storage(&mut self, storage: Arc<dyn Storage>) -> Result<()>;

    /// One-time readiness probe before anything is scheduled
    async fn test_connection(&self, cancel: &CancellationToken) -> Result<()>;

    /// Produce one artifact, upload it and apply retention
    async fn run(&self, cancel: &CancellationToken) -> Result<()>;
}

//! Test utilities for backup-runner
//!
//! This crate provides shared test utilities, mock implementations,
//! and helper functions for testing the backup-runner library.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{CapturedLogs, ConfigBuilder, MemoryStorage, MockStrategy};
//!
//! #[tokio::test(start_paused = true)]
//! async fn my_test() {
//!     let config = ConfigBuilder::minimal().run_on_startup(true).build();
//!     let strategy = MockStrategy::new(config);
//!     let logs = CapturedLogs::new();
//!     // ... hand logs.dispatch() to an Orchestrator
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod logs;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use logs::{wait_for_state, CapturedLogs};
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use backup_runner::config::{
    BackupSettings, CommandConfig, Config, LocalStorageConfig, LoggingConfig, NotificationConfig,
    S3StorageConfig, StorageConfig,
};
pub use backup_runner::storage::{ArtifactNaming, Storage, StorageError};

// Re-export mock implementations from the main crate
pub use backup_runner::storage::mock::{MemoryStorage, StorageCall};
pub use backup_runner::strategies::mock::{MockStrategy, StrategyCall};
pub use backup_runner::utils::executor::mock::{MockExecutor, MockResponse};
pub use backup_runner::utils::executor::CommandExecutor;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;

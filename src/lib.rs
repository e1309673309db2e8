//! Backup Runner Library
//!
//! This library schedules a backup strategy, uploads the artifacts it produces
//! to a pluggable storage backend and prunes old artifacts by retention count.

pub mod config;
pub mod managers;
pub mod storage;
pub mod strategies;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config};
pub use managers::logging::{init_logging, LogGuard};
pub use managers::notification::NotificationManager;
pub use managers::orchestrator::{Orchestrator, RunState, StartupError};
pub use managers::scheduler::{schedule_from_expression, IntervalSchedule, Schedule, Scheduler, SchedulerClock};
pub use storage::{new_storage, ArtifactNaming, Storage, StorageError};
pub use strategies::{BackupStrategy, CommandStrategy};

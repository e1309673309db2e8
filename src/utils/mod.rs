pub mod command;
pub mod cron;
pub mod deadline;
pub mod signal;

// Trait-based abstractions for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use cron::{CronParseError, CronSchedule};
pub use deadline::RunDeadline;
pub use executor::{CommandExecutor, ShellExecutor};

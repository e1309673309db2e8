//! Configuration module for backup-runner
//!
//! Loads a single TOML file, expands `~` in paths and validates it up front so
//! that a bad schedule or storage section fails before anything is scheduled.
//!
//! ## Example Usage
//!
//! ```no_run
//! use backup_runner::config;
//!
//! let config = config::load_config("backup-runner.toml")?;
//! println!("Schedule: {}", config.backup.schedule);
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, parse_config, parse_schedule, validate_config, ConfigError, Result};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

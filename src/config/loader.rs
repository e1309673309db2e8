use super::expand_tilde;
use super::types::*;
use crate::managers::scheduler::{schedule_from_expression, Schedule};
use crate::storage::StorageType;
use crate::utils::CronParseError;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown storage type '{0}' (expected local or s3)")]
    UnknownStorageType(String),

    #[error("Invalid schedule '{expression}': {source}")]
    InvalidSchedule {
        expression: String,
        #[source]
        source: CronParseError,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(contents: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(contents)?;
    expand_paths(&mut config);
    drop_blank_credentials(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn expand_paths(config: &mut Config) {
    if let Some(local) = config.storage.local.as_mut() {
        local.path = expand_tilde(&local.path);
    }
    if let Some(directory) = config.logging.directory.as_mut() {
        *directory = expand_tilde(directory);
    }
    if let Some(work_dir) = config.command.as_mut().and_then(|c| c.work_dir.as_mut()) {
        *work_dir = expand_tilde(work_dir);
    }
}

// Templated configs often render unset credentials as ""
fn drop_blank_credentials(config: &mut Config) {
    if let Some(s3) = config.storage.s3.as_mut() {
        s3.access_key = s3.access_key.take().filter(|key| !key.is_empty());
        s3.secret_key = s3.secret_key.take().filter(|key| !key.is_empty());
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_backup(&config.backup)?;
    validate_storage(&config.storage)?;

    let artifacts = &config.artifacts;
    if artifacts.prefix.is_empty() {
        return Err(ConfigError::ValidationError(
            "artifacts.prefix must not be empty".to_string(),
        ));
    }
    if artifacts.extensions.is_empty() {
        return Err(ConfigError::ValidationError(
            "artifacts.extensions must list at least one extension".to_string(),
        ));
    }
    if let Some(ext) = artifacts.extensions.iter().find(|e| !e.starts_with('.') || e.len() < 2) {
        return Err(ConfigError::ValidationError(format!(
            "artifacts.extensions: '{}' must start with '.'",
            ext
        )));
    }

    if let Some(command) = &config.command {
        if command.dump.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "command.dump must not be empty".to_string(),
            ));
        }
        if !artifacts.approves_extension(&command.extension) {
            return Err(ConfigError::ValidationError(format!(
                "command.extension '{}' is not one of artifacts.extensions {:?}",
                command.extension, artifacts.extensions
            )));
        }
    }

    let webhook = &config.notifications.discord_webhook_url;
    if !webhook.is_empty() && !(webhook.starts_with("https://") || webhook.starts_with("http://")) {
        return Err(ConfigError::ValidationError(format!(
            "notifications.discord_webhook_url must be an http(s) URL: {}",
            webhook
        )));
    }

    Ok(())
}

fn validate_backup(backup: &BackupSettings) -> Result<()> {
    parse_schedule(backup)?;

    if backup.timeout_minutes == 0 {
        return Err(ConfigError::ValidationError(
            "backup.timeout_minutes must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<()> {
    let storage_type = storage
        .storage_type
        .parse::<StorageType>()
        .map_err(|_| ConfigError::UnknownStorageType(storage.storage_type.clone()))?;

    match storage_type {
        StorageType::Local => {
            let local = storage.local.as_ref().ok_or_else(|| {
                ConfigError::ValidationError("storage type 'local' requires a [storage.local] section".to_string())
            })?;
            if local.path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage.local.path must not be empty".to_string(),
                ));
            }
        }
        StorageType::S3 => {
            let s3 = storage.s3.as_ref().ok_or_else(|| {
                ConfigError::ValidationError("storage type 's3' requires a [storage.s3] section".to_string())
            })?;
            if s3.bucket.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage.s3.bucket must not be empty".to_string(),
                ));
            }
            let has_access_key = s3.access_key.as_deref().map_or(false, |k| !k.is_empty());
            let has_secret_key = s3.secret_key.as_deref().map_or(false, |k| !k.is_empty());
            if has_access_key != has_secret_key {
                return Err(ConfigError::ValidationError(
                    "storage.s3.access_key and storage.s3.secret_key must be set together".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Parse the configured schedule, honoring the `utc` flag
pub fn parse_schedule(backup: &BackupSettings) -> Result<Box<dyn Schedule>> {
    schedule_from_expression(&backup.schedule, backup.utc).map_err(|source| ConfigError::InvalidSchedule {
        expression: backup.schedule.clone(),
        source,
    })
}

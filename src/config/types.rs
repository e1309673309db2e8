use crate::storage::ArtifactNaming;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub backup: BackupSettings,
    pub storage: StorageConfig,
    #[serde(default)]
    pub artifacts: ArtifactNaming,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Shell-command backup producer
    #[serde(default)]
    pub command: Option<CommandConfig>,
}

/// Scheduling and retention settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupSettings {
    /// Cron schedule (5 fields or an @descriptor)
    pub schedule: String,

    #[serde(default = "default_retention_count")]
    pub retention_count: usize,

    #[serde(default)]
    pub run_on_startup: bool,

    /// Per-run timeout
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,

    /// Skip a tick while a previous run is still in flight
    #[serde(default)]
    pub single_flight: bool,

    /// Evaluate the schedule in UTC instead of local time
    #[serde(default)]
    pub utc: bool,
}

impl BackupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: String,

    #[serde(default)]
    pub local: Option<LocalStorageConfig>,

    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalStorageConfig {
    pub path: PathBuf,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct S3StorageConfig {
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible providers (e.g. "http://minio:9000")
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub path_style: bool,

    /// Key prefix ("postgres" stores "x.dump" as "postgres/x.dump")
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl S3StorageConfig {
    /// Static key pair, when both halves are non-empty
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(access_key), Some(secret_key)) if !access_key.is_empty() && !secret_key.is_empty() => {
                Some((access_key, secret_key))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .field("prefix", &self.prefix)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Daily-rotated log files are written here when set
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_max_files")]
    pub max_files: usize,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            level: default_log_level(),
            max_files: default_log_max_files(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub discord_webhook_url: String,

    #[serde(default = "default_notify_on")]
    pub notify_on: Vec<NotifyEvent>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: String::new(),
            notify_on: default_notify_on(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
    Failure,
    Success,
}

/// Shell commands that produce a backup artifact
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandConfig {
    /// Display label
    #[serde(default = "default_command_name")]
    pub name: String,

    /// Dump command; `{output}` is replaced with the artifact path
    pub dump: String,

    /// Readiness probe run once at startup
    #[serde(default)]
    pub test: Option<String>,

    /// Extension of the produced artifact
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Directory for the local artifact before upload (system temp dir if unset)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Extra environment for both commands
    #[serde(default)]
    pub env: HashMap<String, String>,
}

// Default value functions

fn default_retention_count() -> usize { 7 }
fn default_timeout_minutes() -> u64 { 60 }
fn default_region() -> String { "us-east-1".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> usize { 10 }
fn default_notify_on() -> Vec<NotifyEvent> {
    vec![NotifyEvent::Failure]
}
fn default_command_name() -> String { "command".to_string() }
fn default_extension() -> String { ".dump".to_string() }

//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.

use backup_runner::config::{
    BackupSettings, CommandConfig, Config, LocalStorageConfig, LoggingConfig, NotificationConfig,
    S3StorageConfig, StorageConfig,
};
use backup_runner::storage::ArtifactNaming;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    backup: BackupSettings,
    storage: StorageConfig,
    artifacts: ArtifactNaming,
    notifications: NotificationConfig,
    command: Option<CommandConfig>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with a daily schedule and no storage section
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let backup = BackupSettings {
            schedule: "0 2 * * *".to_string(),
            retention_count: 7,
            run_on_startup: false,
            timeout_minutes: 60,
            single_flight: false,
            utc: true,
        };

        Self {
            temp_dir,
            backup,
            storage: StorageConfig {
                storage_type: "local".to_string(),
                local: None,
                s3: None,
            },
            artifacts: ArtifactNaming::default(),
            notifications: NotificationConfig::default(),
            command: None,
        }
    }

    /// Create a minimal config backed by a local store in the temp dir
    pub fn minimal() -> Self {
        let builder = Self::new();

        let store = builder.temp_dir.path().join("store");
        fs::create_dir_all(&store).expect("Failed to create store dir");

        builder.with_local_storage(&store)
    }

    /// Set the cron expression
    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.backup.schedule = schedule.to_string();
        self
    }

    pub fn with_retention(mut self, retention_count: usize) -> Self {
        self.backup.retention_count = retention_count;
        self
    }

    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.backup.timeout_minutes = minutes;
        self
    }

    pub fn run_on_startup(mut self, enabled: bool) -> Self {
        self.backup.run_on_startup = enabled;
        self
    }

    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.backup.single_flight = enabled;
        self
    }

    /// Set the storage type string without touching the backend sections
    pub fn with_storage_type(mut self, storage_type: &str) -> Self {
        self.storage.storage_type = storage_type.to_string();
        self
    }

    /// Use a local store at `path`
    pub fn with_local_storage(mut self, path: &Path) -> Self {
        self.storage = StorageConfig {
            storage_type: "local".to_string(),
            local: Some(LocalStorageConfig {
                path: path.to_path_buf(),
            }),
            s3: None,
        };
        self
    }

    /// Use an S3-compatible store with static credentials
    pub fn with_s3_storage(mut self, endpoint: &str, bucket: &str, access_key: &str, secret_key: &str) -> Self {
        self.storage = StorageConfig {
            storage_type: "s3".to_string(),
            local: None,
            s3: Some(S3StorageConfig {
                bucket: bucket.to_string(),
                region: "us-east-1".to_string(),
                endpoint: Some(endpoint.to_string()),
                path_style: true,
                prefix: None,
                access_key: Some(access_key.to_string()),
                secret_key: Some(secret_key.to_string()),
            }),
        };
        self
    }

    pub fn with_artifacts(mut self, naming: ArtifactNaming) -> Self {
        self.artifacts = naming;
        self
    }

    /// Add a `[command]` section whose artifact is staged in the temp dir
    pub fn with_command(mut self, dump: &str) -> Self {
        let work_dir = self.temp_dir.path().join("work");
        self.command = Some(CommandConfig {
            name: "test-command".to_string(),
            dump: dump.to_string(),
            test: None,
            extension: ".dump".to_string(),
            work_dir: Some(work_dir),
            env: HashMap::new(),
        });
        self
    }

    /// Set the readiness probe of the `[command]` section
    pub fn with_test_command(mut self, test: &str) -> Self {
        if let Some(command) = self.command.as_mut() {
            command.test = Some(test.to_string());
        }
        self
    }

    pub fn with_webhook(mut self, url: &str) -> Self {
        self.notifications.discord_webhook_url = url.to_string();
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the local store path, if local storage is configured
    pub fn store_path(&self) -> Option<PathBuf> {
        self.storage.local.as_ref().map(|l| l.path.clone())
    }

    fn into_parts(self) -> (Config, TempDir) {
        let config = Config {
            backup: self.backup,
            storage: self.storage,
            artifacts: self.artifacts,
            logging: LoggingConfig::default(),
            notifications: self.notifications,
            command: self.command,
        };
        (config, self.temp_dir)
    }

    /// Build the Config (the temp dir is deleted)
    pub fn build(self) -> Config {
        self.into_parts().0
    }

    /// Keep the temp directory alive alongside the config
    pub fn persist(self) -> (Config, TempDir) {
        self.into_parts()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

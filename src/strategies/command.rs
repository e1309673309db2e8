//! Shell-command backup strategy
//!
//! Handles:
//! - Running a configured dump command that writes one artifact
//! - Uploading the artifact to the injected storage
//! - Pruning old artifacts with the retention policy
//! - Probing readiness with an optional test command

use super::BackupStrategy;
use crate::config::{self, CommandConfig, Config};
use crate::storage::{apply_retention_policy, Storage};
use crate::utils::command::shell_quote;
use crate::utils::{CommandExecutor, ShellExecutor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable holding the path the dump command must write to
pub const OUTPUT_ENV: &str = "BACKUP_OUTPUT";

/// Placeholder in `command.dump` replaced with the quoted output path
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Shell builtins and keywords that can lead a dump snippet
const SHELL_WORDS: &[&str] = &[
    ".", ":", "[", "alias", "case", "cd", "command", "eval", "exec", "export", "for", "if", "set", "source",
    "test", "time", "trap", "ulimit", "umask", "unset", "until", "while",
];

/// Program a dump snippet starts with, if it can be checked against PATH
///
/// Leading `VAR=value` assignments are skipped. Shell builtins, keywords and
/// words containing shell syntax are left for the shell to resolve.
fn dump_program(dump: &str) -> Option<&str> {
    let word = dump.split_whitespace().find(|word| !word.contains('='))?;
    let shell_syntax = |c: char| "(){}$`;&|<>'\"\\*?!~#".contains(c);
    if SHELL_WORDS.contains(&word) || word.contains(shell_syntax) {
        return None;
    }
    Some(word)
}

enum ConfigSource {
    File(PathBuf),
    Inline(Config),
}

pub struct CommandStrategy {
    source: ConfigSource,
    config: Option<Config>,
    storage: Option<Arc<dyn Storage>>,
    executor: Arc<dyn CommandExecutor>,
    run_on_startup: Option<bool>,
}

impl CommandStrategy {
    /// Strategy whose configuration is read from a TOML file on `config()`
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_source(ConfigSource::File(path.into()))
    }

    /// Strategy with an already-loaded configuration (validated again on `config()`)
    pub fn from_config(config: Config) -> Self {
        Self::with_source(ConfigSource::Inline(config))
    }

    fn with_source(source: ConfigSource) -> Self {
        Self {
            source,
            config: None,
            storage: None,
            executor: Arc::new(ShellExecutor::new()),
            run_on_startup: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Override `backup.run_on_startup` from the configuration
    pub fn with_run_on_startup(mut self, run_on_startup: Option<bool>) -> Self {
        self.run_on_startup = run_on_startup;
        self
    }

    fn loaded(&self) -> Result<&Config> {
        self.config
            .as_ref()
            .context("Configuration not loaded; call config() first")
    }

    fn command(&self) -> Result<&CommandConfig> {
        self.loaded()?
            .command
            .as_ref()
            .context("Missing [command] section in configuration")
    }

    fn storage(&self) -> Result<&Arc<dyn Storage>> {
        self.storage
            .as_ref()
            .context("Storage not set; call set_storage() first")
    }

    fn work_dir(command: &CommandConfig) -> PathBuf {
        command.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    async fn dump_and_upload(
        &self,
        cancel: &CancellationToken,
        command: &CommandConfig,
        storage: &dyn Storage,
        output: &Path,
        artifact_name: &str,
    ) -> Result<()> {
        let output_str = output.to_string_lossy().to_string();
        let dump = command
            .dump
            .replace(OUTPUT_PLACEHOLDER, &shell_quote(&output_str));

        let mut envs = command.env.clone();
        envs.insert(OUTPUT_ENV.to_string(), output_str);

        self.executor
            .run_shell_command(&dump, command.work_dir.as_deref(), &envs, cancel)
            .await
            .with_context(|| format!("Dump command for {} failed", artifact_name))?;

        let metadata = tokio::fs::metadata(output).await.with_context(|| {
            format!(
                "Dump command did not produce {} (write to {{output}} or ${})",
                output.display(),
                OUTPUT_ENV
            )
        })?;
        info!("Dump completed: {} ({} bytes)", artifact_name, metadata.len());

        storage
            .upload(cancel, output, artifact_name)
            .await
            .with_context(|| format!("Failed to upload {} to {} storage", artifact_name, storage.storage_type()))?;

        Ok(())
    }
}

#[async_trait]
impl BackupStrategy for CommandStrategy {
    fn name(&self) -> &str {
        self.config
            .as_ref()
            .and_then(|c| c.command.as_ref())
            .map(|c| c.name.as_str())
            .unwrap_or("command")
    }

    fn config(&mut self) -> Result<Config> {
        let mut loaded = match &self.source {
            ConfigSource::File(path) => config::load_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            ConfigSource::Inline(inline) => {
                config::validate_config(inline)?;
                inline.clone()
            }
        };

        if loaded.command.is_none() {
            anyhow::bail!("Missing [command] section in configuration");
        }
        if let Some(run_on_startup) = self.run_on_startup {
            loaded.backup.run_on_startup = run_on_startup;
        }

        self.config = Some(loaded.clone());
        Ok(loaded)
    }

    fn extra_config_log_info(&self) -> Vec<String> {
        let Some(command) = self.config.as_ref().and_then(|c| c.command.as_ref()) else {
            return Vec::new();
        };

        let mut lines = vec![
            format!("Dump command: {}", command.dump),
            format!("Artifact extension: {}", command.extension),
            format!("Work directory: {}", Self::work_dir(command).display()),
        ];
        if let Some(test) = &command.test {
            lines.push(format!("Test command: {}", test));
        }
        if !command.env.is_empty() {
            let mut keys: Vec<&str> = command.env.keys().map(String::as_str).collect();
            keys.sort_unstable();
            lines.push(format!("Environment: {}", keys.join(", ")));
        }
        lines
    }

    fn set_storage(&mut self, storage: Arc<dyn Storage>) -> Result<()> {
        if self.config.is_none() {
            anyhow::bail!("Configuration must be loaded before storage is set");
        }
        self.storage = Some(storage);
        Ok(())
    }

    async fn test_connection(&self, cancel: &CancellationToken) -> Result<()> {
        let command = self.command()?;

        if let Some(program) = dump_program(&command.dump) {
            which::which(program).with_context(|| format!("Dump program '{}' not found in PATH", program))?;
            debug!("Found dump program: {}", program);
        }

        if let Some(test) = &command.test {
            self.executor
                .run_shell_command(test, command.work_dir.as_deref(), &command.env, cancel)
                .await
                .context("Connection test failed")?;
        }

        Ok(())
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let config = self.loaded()?;
        let command = self.command()?;
        let storage = self.storage()?;

        let artifact_name = config.artifacts.artifact_name(Utc::now(), &command.extension);
        let work_dir = Self::work_dir(command);
        tokio::fs::create_dir_all(&work_dir)
            .await
            .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;
        let output = work_dir.join(&artifact_name);

        info!("Starting backup: {}", artifact_name);
        let result = self
            .dump_and_upload(cancel, command, storage.as_ref(), &output, &artifact_name)
            .await;

        if let Err(e) = tokio::fs::remove_file(&output).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove local artifact {}: {}", output.display(), e);
            }
        }
        result?;

        let report = apply_retention_policy(cancel, storage.as_ref(), config.backup.retention_count)
            .await
            .context("Failed to apply retention policy")?;
        if !report.is_complete() {
            warn!(
                "Retention left {} old backup(s) behind: {}",
                report.failed.len(),
                report
                    .failed
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        if cancel.is_cancelled() {
            anyhow::bail!(
                "Run cancelled while applying retention policy ({} of {} old backups deleted)",
                report.deleted.len(),
                report.deleted.len() + report.failed.len()
            );
        }

        info!("Backup completed: {}", artifact_name);
        Ok(())
    }
}

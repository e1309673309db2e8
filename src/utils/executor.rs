//! Command execution abstraction for testability
//!
//! This module provides a trait-based abstraction for command execution,
//! enabling dependency injection and mocking for tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use tokio_util::sync::CancellationToken;

/// Abstraction for shell command execution, enabling mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a shell command, aborting it when `cancel` fires
    async fn run_shell_command(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        envs: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Output>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run_shell_command(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        envs: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Output> {
        super::command::run_shell_command(command, working_dir, envs, cancel).await
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use crate::strategies::command::OUTPUT_ENV;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub command: String,
        pub working_dir: Option<String>,
        pub envs: HashMap<String, String>,
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        /// Succeed, writing `artifact` to the path in `BACKUP_OUTPUT` when present
        Success { artifact: Vec<u8> },
        /// Succeed without producing any file
        NoOutput,
        Failure { stderr: String },
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                artifact: b"mock backup contents".to_vec(),
            }
        }
    }

    /// Mock executor for testing
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Responses keyed by a substring of the command; first match wins
        pub responses: Arc<Mutex<Vec<(String, MockResponse)>>>,
        /// Response for commands matching no configured pattern
        pub default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure the response for commands containing `pattern`
        pub fn respond_to(self, pattern: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push((pattern.to_string(), response));
            self
        }

        /// Make commands containing `pattern` fail with `stderr`
        pub fn fail_on(self, pattern: &str, stderr: &str) -> Self {
            self.respond_to(
                pattern,
                MockResponse::Failure {
                    stderr: stderr.to_string(),
                },
            )
        }

        /// Get recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Check if a command containing `pattern` was run
        pub fn was_called_with(&self, pattern: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .any(|call| call.command.contains(pattern))
        }

        fn response_for(&self, command: &str) -> MockResponse {
            self.responses
                .lock()
                .unwrap()
                .iter()
                .find(|(pattern, _)| command.contains(pattern.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn run_shell_command(
            &self,
            command: &str,
            working_dir: Option<&Path>,
            envs: &HashMap<String, String>,
            cancel: &CancellationToken,
        ) -> Result<Output> {
            self.calls.lock().unwrap().push(CommandCall {
                command: command.to_string(),
                working_dir: working_dir.map(|p| p.display().to_string()),
                envs: envs.clone(),
            });

            if cancel.is_cancelled() {
                anyhow::bail!("Command cancelled before start: {}", command);
            }

            match self.response_for(command) {
                MockResponse::Success { artifact } => {
                    if let Some(path) = envs.get(OUTPUT_ENV) {
                        tokio::fs::write(path, &artifact).await?;
                    }
                    Ok(success_output())
                }
                MockResponse::NoOutput => Ok(success_output()),
                MockResponse::Failure { stderr } => {
                    anyhow::bail!("Command failed with exit code Some(1): {}", stderr)
                }
            }
        }
    }

    fn success_output() -> Output {
        Output {
            status: std::process::ExitStatus::default(),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

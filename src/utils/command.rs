//! Utilities for running commands with proper error handling and cancellation

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run a command, killing it if `cancel` fires before it exits
///
/// On unix the command leads its own process group and cancellation kills the
/// whole group, so processes started by a shell snippet die with it.
pub async fn run_command(
    program: &str,
    args: &[&str],
    working_dir: Option<&Path>,
    envs: &HashMap<String, String>,
    cancel: &CancellationToken,
) -> Result<Output> {
    if cancel.is_cancelled() {
        anyhow::bail!("Command cancelled before start: {}", program);
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    debug!("Running command: {} {}", program, args.join(" "));

    let child = cmd.spawn().with_context(|| format!("Failed to execute {}", program))?;
    let pid = child.id();

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            kill_process_group(pid).await;
            anyhow::bail!("Command cancelled: {}", program);
        }
        output = child.wait_with_output() => output.with_context(|| format!("Failed to execute {}", program))?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr.trim());
        anyhow::bail!(
            "Command failed with exit code {:?}: {}",
            output.status.code(),
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout.trim());
    }

    Ok(output)
}

#[cfg(unix)]
async fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };

    let group = format!("-{}", pid);
    match Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) if status.success() => debug!("Killed process group {}", pid),
        Ok(status) => debug!("kill for process group {} exited with {}", pid, status),
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

// Without process groups the child is killed on drop
#[cfg(not(unix))]
async fn kill_process_group(_pid: Option<u32>) {}

/// Run a shell command (dump and readiness commands are shell snippets)
pub async fn run_shell_command(
    command: &str,
    working_dir: Option<&Path>,
    envs: &HashMap<String, String>,
    cancel: &CancellationToken,
) -> Result<Output> {
    info!("Running shell command: {}", command);

    #[cfg(unix)]
    let (shell, flag) = ("sh", "-c");

    #[cfg(windows)]
    let (shell, flag) = ("cmd", "/C");

    run_command(shell, &[flag, command], working_dir, envs, cancel).await
}

/// Quote a value for safe interpolation into a POSIX shell command
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}

use anyhow::{Context, Result};
use backup_runner::config::{self, Config};
use backup_runner::managers::logging;
use backup_runner::storage::{apply_retention_policy, new_storage, select_for_deletion};
use backup_runner::utils::signal::spawn_shutdown_listener;
use backup_runner::{CommandStrategy, Orchestrator};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "backup-runner")]
#[command(about = "Scheduled backups with pluggable storage and retention", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "BACKUP_RUNNER_CONFIG", default_value = "/etc/backup-runner/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until SIGINT/SIGTERM (default)
    Run {
        /// Run a backup immediately, regardless of backup.run_on_startup
        #[arg(long)]
        run_on_startup: bool,
    },

    /// Validate startup, run one backup and exit
    Once,

    /// Validate configuration file
    Validate,

    /// List backups in the configured storage, oldest first
    List {
        /// Print as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Apply the retention policy once
    Prune {
        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(&cli.config)
        .with_context(|| format!("Invalid configuration: {}", cli.config.display()))?;

    // Must keep guard alive so file logs are flushed
    let (dispatch, _log_guard) = logging::init_logging(&config.logging)?;
    tracing::dispatcher::set_global_default(dispatch.clone()).context("Failed to install logger")?;

    let command = cli.command.unwrap_or(Commands::Run { run_on_startup: false });

    match command {
        Commands::Run { run_on_startup } => {
            let shutdown = CancellationToken::new();
            spawn_shutdown_listener(shutdown.clone());

            let strategy = CommandStrategy::from_config(config).with_run_on_startup(run_on_startup.then_some(true));
            Orchestrator::new(Box::new(strategy), dispatch, shutdown)
                .run()
                .await?;
        }

        Commands::Once => {
            let strategy = CommandStrategy::from_config(config);
            Orchestrator::new(Box::new(strategy), dispatch, CancellationToken::new())
                .run_single()
                .await?;
            println!("✓ Backup completed successfully");
        }

        Commands::Validate => handle_validate(&config)?,

        Commands::List { json } => {
            let storage = new_storage(&config.storage, &config.artifacts).await?;
            let names = storage.list(&CancellationToken::new()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else if names.is_empty() {
                println!("No backups found in {} storage", storage.storage_type());
            } else {
                println!("Backups in {} storage ({}):", storage.storage_type(), names.len());
                for name in &names {
                    println!("  {}", name);
                }
            }
        }

        Commands::Prune { dry_run } => {
            let storage = new_storage(&config.storage, &config.artifacts).await?;
            let cancel = CancellationToken::new();
            let retention_count = config.backup.retention_count;

            if dry_run {
                let names = storage.list(&cancel).await?;
                let doomed = select_for_deletion(&names, retention_count);
                if doomed.is_empty() {
                    println!("Nothing to prune ({} backups, keeping {})", names.len(), retention_count);
                } else {
                    println!("Would delete {} of {} backups:", doomed.len(), names.len());
                    for name in doomed {
                        println!("  {}", name);
                    }
                }
            } else {
                let report = apply_retention_policy(&cancel, storage.as_ref(), retention_count).await?;
                println!(
                    "Deleted {} backup(s), kept {}",
                    report.deleted.len(),
                    report.retained()
                );
                if !report.is_complete() {
                    for (name, error) in &report.failed {
                        eprintln!("  Failed to delete {}: {}", name, error);
                    }
                    anyhow::bail!("{} backup(s) could not be deleted", report.failed.len());
                }
            }
        }
    }

    Ok(())
}

fn handle_validate(config: &Config) -> Result<()> {
    let schedule = config::parse_schedule(&config.backup)?;
    let upcoming: Vec<String> = schedule
        .upcoming(Utc::now(), 3)
        .iter()
        .map(|t| {
            if config.backup.utc {
                t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
            } else {
                t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %Z").to_string()
            }
        })
        .collect();

    println!("Configuration is valid!");
    println!("Schedule: {}", schedule.describe());
    println!("Storage: {}", config.storage.storage_type);
    println!("Retention count: {}", config.backup.retention_count);
    println!("Run timeout: {} minutes", config.backup.timeout_minutes);
    println!("Run on startup: {}", config.backup.run_on_startup);
    match &config.command {
        Some(command) => println!("Command: {} ({})", command.name, command.dump),
        None => println!("Command: not configured"),
    }
    println!("Next runs:");
    for time in upcoming {
        println!("  {}", time);
    }

    Ok(())
}

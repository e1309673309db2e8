//! Logging manager with file rotation
//!
//! Provides dual-output logging:
//! - Console: stderr, text or JSON
//! - File: daily rotation, only when a log directory is configured
//!
//! Nothing here installs a global subscriber. Callers receive a [`Dispatch`]
//! and decide where it applies, so tests can hand the orchestrator their own.

use anyhow::{Context, Result};
use std::fs;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

const LOG_FILE_PREFIX: &str = "backup-runner";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Build the configured logging dispatch
///
/// The returned guard must be kept alive for the duration of the program.
/// When the guard is dropped, any remaining logs are flushed to disk.
pub fn init_logging(config: &LoggingConfig) -> Result<(Dispatch, LogGuard)> {
    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format, &config.level)];
    let mut file_guard = None;

    if let Some(log_dir) = &config.directory {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

        let mut builder = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log");
        if config.max_files > 0 {
            builder = builder.max_log_files(config.max_files);
        }
        let file_appender = builder
            .build(log_dir)
            .with_context(|| format!("Failed to create log file appender in {:?}", log_dir))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_guard = Some(guard);

        layers.push(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_filter(level_filter(&config.level))
                .boxed(),
        );
    }

    let subscriber = tracing_subscriber::registry().with(layers);

    Ok((
        Dispatch::new(subscriber),
        LogGuard {
            _file_guard: file_guard,
        },
    ))
}

/// Console-only dispatch (for when config isn't available)
pub fn console_dispatch() -> Dispatch {
    let subscriber = tracing_subscriber::registry().with(console_layer(LogFormat::Text, "info"));
    Dispatch::new(subscriber)
}

fn console_layer(format: LogFormat, level: &str) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .with_filter(level_filter(level))
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .with_filter(level_filter(level))
            .boxed(),
    }
}

/// `RUST_LOG` wins over the configured level
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any remaining logs to disk.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

//! Termination signal handling

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Spawn a task that cancels `shutdown` on SIGINT or SIGTERM
pub fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = wait_for_signal() => match result {
                Ok(signal) => {
                    info!("Received {}, shutting down...", signal);
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to listen for termination signals: {}", e),
            },
            _ = shutdown.cancelled() => {}
        }
    });
}

/// Wait for the first termination signal and return its name
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}

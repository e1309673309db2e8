//! Timeout-bounded cancellation scopes for backup runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A cancellation token that is cancelled once a timeout elapses.
///
/// Dropping the deadline stops the timer but leaves the token as it is, so a run
/// that finished in time never sees a cancellation.
pub struct RunDeadline {
    token: CancellationToken,
    expired: Arc<AtomicBool>,
    timeout: Duration,
    timer: JoinHandle<()>,
}

impl RunDeadline {
    /// Start a deadline that fires after `timeout`. Must be called within a tokio runtime.
    pub fn after(timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let expired = Arc::new(AtomicBool::new(false));

        let timer = {
            let token = token.clone();
            let expired = Arc::clone(&expired);
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        expired.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        };

        Self {
            token,
            expired,
            timeout,
            timer,
        }
    }

    /// Token to hand to the run and its storage operations
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the timeout elapsed (as opposed to an explicit cancel)
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for RunDeadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

//! Retention policy: keep the newest N artifacts, prune the rest

use super::{Result, Storage};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of a single retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Number of artifacts listed before pruning
    pub listed: usize,
    pub deleted: Vec<String>,
    /// Artifacts whose deletion failed, with the error message
    pub failed: Vec<(String, String)>,
}

impl RetentionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn retained(&self) -> usize {
        self.listed - self.deleted.len()
    }
}

/// The oldest entries that exceed `retention_count`; `listing` must be ascending
pub fn select_for_deletion(listing: &[String], retention_count: usize) -> &[String] {
    let excess = listing.len().saturating_sub(retention_count);
    &listing[..excess]
}

/// Delete the oldest artifacts so at most `retention_count` remain
///
/// A failed listing aborts the pass. Individual deletion failures are logged
/// and recorded in the report; the remaining deletions still run.
pub async fn apply_retention_policy(
    cancel: &CancellationToken,
    storage: &dyn Storage,
    retention_count: usize,
) -> Result<RetentionReport> {
    info!("Applying retention policy (keeping {} backups)...", retention_count);

    let listing = storage.list(cancel).await?;
    let mut report = RetentionReport {
        listed: listing.len(),
        ..Default::default()
    };

    let doomed = select_for_deletion(&listing, retention_count);
    if doomed.is_empty() {
        info!("Current backup count ({}) within retention limit", listing.len());
        return Ok(report);
    }

    for name in doomed {
        match storage.delete(cancel, name).await {
            Ok(()) => {
                info!("Deleted old backup: {}", name);
                report.deleted.push(name.clone());
            }
            Err(e) => {
                warn!(
                    "Failed to delete old backup {} from {} storage: {}",
                    name,
                    storage.storage_type(),
                    e
                );
                report.failed.push((name.clone(), e.to_string()));
            }
        }
    }

    info!(
        "Retention complete: {} deleted, {} failed, {} kept",
        report.deleted.len(),
        report.failed.len(),
        report.retained()
    );
    Ok(report)
}

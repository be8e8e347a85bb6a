//! Periodic reclamation of expired jobs and their artifacts.
//!
//! Terminal jobs are kept for a retention window (TTL, measured from
//! `completed_at`) so pollers can fetch their outcome, then swept: the
//! on-disk artifact directory is deleted first, the record second, so a
//! record never outlives proof of its result having existed -- a poll
//! racing the sweep sees either the full job or nothing at all.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mediseg_runner::artifacts::ArtifactStore;
use tokio_util::sync::CancellationToken;

use crate::engine::store::JobStore;

#[derive(Debug, Clone)]
pub struct GcConfig {
    /// How often the sweep runs.
    pub interval: Duration,
    /// Retention window after `completed_at`.
    pub ttl: Duration,
}

/// Outcome of one sweep, for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    /// Records past their TTL at sweep time.
    pub expired: usize,
    /// Records actually removed.
    pub deleted: usize,
    /// Artifact deletions that failed; their records are retried on the
    /// next sweep.
    pub artifact_failures: usize,
}

/// Run the reclamation loop until `cancel` fires.
pub async fn run(
    store: Arc<JobStore>,
    artifacts: ArtifactStore,
    config: GcConfig,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = config.interval.as_secs(),
        ttl_secs = config.ttl.as_secs(),
        "Job reclamation task started",
    );

    let mut interval = tokio::time::interval(config.interval);
    // The first tick fires immediately; skip straight to the cadence.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job reclamation task stopping");
                break;
            }
            _ = interval.tick() => {
                let store = Arc::clone(&store);
                let artifacts = artifacts.clone();
                let ttl = config.ttl;

                // Artifact directories can hold large mask volumes;
                // keep their deletion off the async workers.
                let stats = tokio::task::spawn_blocking(move || sweep(&store, &artifacts, ttl))
                    .await
                    .unwrap_or_default();

                if stats.expired > 0 {
                    tracing::info!(
                        expired = stats.expired,
                        deleted = stats.deleted,
                        artifact_failures = stats.artifact_failures,
                        "Job reclamation sweep finished",
                    );
                } else {
                    tracing::debug!("Job reclamation sweep: nothing to do");
                }
            }
        }
    }
}

/// One reclamation pass over the store.
pub fn sweep(store: &JobStore, artifacts: &ArtifactStore, ttl: Duration) -> SweepStats {
    let cutoff = Utc::now() - chrono::Duration::seconds(ttl.as_secs() as i64);
    let expired = store.terminal_before(cutoff);

    let mut stats = SweepStats {
        expired: expired.len(),
        ..SweepStats::default()
    };

    for id in expired {
        match artifacts.remove_job(id) {
            Ok(removed) => {
                if removed {
                    tracing::debug!(job_id = %id, "Artifacts deleted");
                }
                if store.delete(id).is_ok() {
                    stats.deleted += 1;
                }
            }
            Err(e) => {
                // Keep the record so the next sweep retries the deletion.
                stats.artifact_failures += 1;
                tracing::warn!(job_id = %id, error = %e, "Artifact deletion failed");
            }
        }
    }

    stats
}

//! Plumbing from runner callbacks and outcomes into the job store.
//!
//! The runner's progress callback and final outcome both land here. This
//! is also the sanitization boundary: the strings recorded on a failed job
//! are fixed phrases, while the full runner error (paths, exit codes,
//! stderr) goes to server-side logs only.

use std::sync::Arc;

use mediseg_core::types::JobId;

use crate::engine::store::{JobStore, StoreError};

/// Caller-visible failure string for any runner error or panic.
pub const FAILURE_MESSAGE: &str = "segmentation inference failed";

/// Caller-visible failure string for a timed-out run.
pub fn timeout_message(budget_secs: u64) -> String {
    format!("segmentation inference timed out after {budget_secs}s")
}

/// Forward one progress callback into the store.
///
/// A rejected update never interrupts the run: a terminal-state rejection
/// is the documented orphaned-runner race (job already timed out), and a
/// contract violation by the runner (regressing or out-of-range percent)
/// is logged and dropped.
pub fn record_progress(store: &Arc<JobStore>, id: JobId, percent: u8, message: &str) {
    match store.update_progress(id, percent, message) {
        Ok(()) => {}
        Err(StoreError::InvalidTransition { .. }) | Err(StoreError::NotFound(_)) => {
            tracing::debug!(job_id = %id, percent, "Late progress update ignored");
        }
        Err(e @ StoreError::ProgressRegressed { .. })
        | Err(e @ StoreError::ProgressOutOfRange { .. }) => {
            tracing::warn!(job_id = %id, error = %e, "Runner violated progress contract");
        }
    }
}

/// Record a successful run.
pub fn record_success(store: &Arc<JobStore>, id: JobId, result: serde_json::Value) {
    if let Err(e) = store.complete(id, result) {
        // Reachable only through the orphaned-runner race or a GC'd job.
        tracing::debug!(job_id = %id, error = %e, "Late completion ignored");
    }
}

/// Record a failed run with a caller-safe message.
pub fn record_failure(store: &Arc<JobStore>, id: JobId, public_message: String) {
    if let Err(e) = store.fail(id, public_message) {
        tracing::debug!(job_id = %id, error = %e, "Late failure ignored");
    }
}

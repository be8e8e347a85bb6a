//! Thread-safe, in-process storage for job records.
//!
//! The store is the only component that mutates a [`Job`]; everything else
//! sees cloned snapshots. All operations take one store-wide lock for an
//! O(1) critical section (map lookup plus field assignment) and never
//! perform I/O while holding it, so heavy polling stays cheap.
//!
//! State transitions are enforced here and nowhere else:
//! `Pending -> Running -> Completed | Failed`. An attempt to skip a state
//! or leave a terminal one is rejected with a typed error, never silently
//! accepted.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use mediseg_core::job::{Job, JobInput, JobListQuery, JobState, JobStatus};
use mediseg_core::types::{new_job_id, JobId, Timestamp};

/// Default page size for [`JobStore::list`].
const DEFAULT_LIST_LIMIT: usize = 50;
/// Hard cap on [`JobStore::list`] page size.
const MAX_LIST_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected store operations.
///
/// `InvalidTransition` out of a terminal state is expected exactly once in
/// normal operation: a timed-out job's orphaned runner eventually returns
/// and its late completion is rejected here. Every other variant indicates
/// a programming error in the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id}: progress {percent} out of range")]
    ProgressOutOfRange { id: JobId, percent: u8 },

    #[error("job {id}: progress regressed {from} -> {to}")]
    ProgressRegressed { id: JobId, from: u8, to: u8 },
}

/// Job totals per status, for the queue status endpoint.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `Pending` record and return its id.
    pub fn create(&self, input: JobInput) -> JobId {
        let id = new_job_id();
        let job = Job::new(id, input, Utc::now());
        self.write().insert(id, job);
        id
    }

    /// Snapshot of a job. The live record never leaves the store.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    /// Transition `Pending -> Running` and set `started_at`.
    pub fn begin(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        match job.state {
            JobState::Pending => {
                job.state = JobState::Running {
                    progress: 0,
                    message: String::from("starting"),
                };
                job.started_at = Some(Utc::now());
                Ok(())
            }
            _ => {
                let err = StoreError::InvalidTransition {
                    id,
                    from: job.status(),
                    to: JobStatus::Running,
                };
                tracing::error!(job_id = %id, error = %err, "Rejected begin()");
                Err(err)
            }
        }
    }

    /// Update progress for a `Running` job. Rejects out-of-range and
    /// decreasing percentages.
    pub fn update_progress(
        &self,
        id: JobId,
        percent: u8,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        match &mut job.state {
            JobState::Running { progress, message: msg } => {
                if percent > 100 {
                    return Err(StoreError::ProgressOutOfRange { id, percent });
                }
                if percent < *progress {
                    return Err(StoreError::ProgressRegressed {
                        id,
                        from: *progress,
                        to: percent,
                    });
                }
                *progress = percent;
                msg.clear();
                msg.push_str(message);
                Ok(())
            }
            _ => Err(StoreError::InvalidTransition {
                id,
                from: job.status(),
                to: JobStatus::Running,
            }),
        }
    }

    /// Transition `Running -> Completed` with the result payload.
    pub fn complete(&self, id: JobId, result: serde_json::Value) -> Result<(), StoreError> {
        self.finish(id, JobState::Completed { result })
    }

    /// Transition `Running -> Failed` with a sanitized error string.
    pub fn fail(&self, id: JobId, error: String) -> Result<(), StoreError> {
        self.finish(id, JobState::Failed { error })
    }

    fn finish(&self, id: JobId, terminal: JobState) -> Result<(), StoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        match job.state {
            JobState::Running { .. } => {
                job.state = terminal;
                job.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(StoreError::InvalidTransition {
                id,
                from: job.status(),
                to: terminal.status(),
            }),
        }
    }

    /// Roll back a `Pending` record whose admission fell through before a
    /// worker ever saw it. Dispatcher only; a no-op for any other state.
    pub fn discard_pending(&self, id: JobId) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get(&id) {
            if matches!(job.state, JobState::Pending) {
                jobs.remove(&id);
            }
        }
    }

    /// Remove a terminal record. Garbage collector only.
    pub fn delete(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.write();
        let job = jobs.get(&id).ok_or(StoreError::NotFound(id))?;

        if !job.status().is_terminal() {
            let err = StoreError::InvalidTransition {
                id,
                from: job.status(),
                to: job.status(),
            };
            tracing::error!(job_id = %id, error = %err, "Rejected delete() of live job");
            return Err(err);
        }

        jobs.remove(&id);
        Ok(())
    }

    /// Snapshot list, newest first, optionally filtered by status.
    pub fn list(&self, query: &JobListQuery) -> Vec<Job> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT);

        let mut jobs: Vec<Job> = self
            .read()
            .values()
            .filter(|j| query.status.is_none_or(|s| j.status() == s))
            .cloned()
            .collect();

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        jobs
    }

    /// Terminal jobs whose `completed_at` is older than `cutoff`.
    pub fn terminal_before(&self, cutoff: Timestamp) -> Vec<JobId> {
        self.read()
            .values()
            .filter(|j| j.status().is_terminal())
            .filter(|j| j.completed_at.is_some_and(|t| t < cutoff))
            .map(|j| j.id)
            .collect()
    }

    /// Job totals per status.
    pub fn status_counts(&self) -> StatusCounts {
        let jobs = self.read();
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            match job.status() {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Lock poisoning can only result from a panic inside an O(1) critical
    // section; the map stays consistent, so recover instead of cascading.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

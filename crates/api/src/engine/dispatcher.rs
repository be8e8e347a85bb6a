//! Job dispatcher: admission control plus a bounded worker pool.
//!
//! `submit` validates synchronously, creates the job record, and hands the
//! id to one of `max_concurrent` long-lived worker tasks over a bounded
//! queue. Admission is counted by a semaphore sized
//! `max_concurrent + queue_capacity`; when it is exhausted the submission
//! is rejected with a distinct overload error instead of building backlog.
//!
//! Each worker executes the blocking inference call on the blocking pool
//! under a wall-clock timeout. No runner error, panic, or timeout escapes
//! the execution wrapper: every admitted job ends `Completed` or `Failed`.

use std::sync::Arc;
use std::time::Duration;

use mediseg_core::error::CoreError;
use mediseg_core::job::{JobInput, SubmitJobRequest};
use mediseg_core::types::JobId;
use mediseg_runner::artifacts::ArtifactStore;
use mediseg_runner::cases::CaseRegistry;
use mediseg_runner::SegmentationRunner;
use tokio::sync::mpsc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::progress;
use crate::engine::store::JobStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Synchronous submission rejections. The caller learns about these
/// immediately; neither ever leaves a job record behind.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),

    #[error("queue is full, try again later")]
    Overloaded,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Simultaneous inference executions the host can sustain.
    pub max_concurrent: usize,
    /// Jobs allowed to wait for a free slot beyond the running ones.
    pub queue_capacity: usize,
    /// Wall-clock budget per inference run.
    pub job_timeout: Duration,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Work item flowing to the workers. The permit is the job's admission
/// slot; dropping it (after execution) re-opens capacity.
struct QueuedJob {
    id: JobId,
    _permit: OwnedSemaphorePermit,
}

pub struct Dispatcher {
    store: Arc<JobStore>,
    registry: Arc<CaseRegistry>,
    queue_tx: mpsc::Sender<QueuedJob>,
    admission: Arc<Semaphore>,
    max_concurrent: usize,
    queue_capacity: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Spawn the worker pool and return a shared handle.
    pub fn start(
        store: Arc<JobStore>,
        registry: Arc<CaseRegistry>,
        runner: Arc<dyn SegmentationRunner>,
        artifacts: ArtifactStore,
        config: DispatcherConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let max_concurrent = config.max_concurrent.max(1);
        let capacity = max_concurrent + config.queue_capacity;

        // The channel is sized to the full admission bound, so a send
        // under a held permit can never block or fail on capacity.
        let (queue_tx, queue_rx) = mpsc::channel::<QueuedJob>(capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let admission = Arc::new(Semaphore::new(capacity));

        let mut workers = Vec::with_capacity(max_concurrent);
        for worker_id in 0..max_concurrent {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&store),
                Arc::clone(&runner),
                artifacts.clone(),
                Arc::clone(&queue_rx),
                config.job_timeout,
                cancel.clone(),
            )));
        }

        tracing::info!(
            max_concurrent,
            queue_capacity = config.queue_capacity,
            job_timeout_secs = config.job_timeout.as_secs(),
            "Job dispatcher started",
        );

        Arc::new(Self {
            store,
            registry,
            queue_tx,
            admission,
            max_concurrent,
            queue_capacity: config.queue_capacity,
            workers: Mutex::new(workers),
            cancel,
        })
    }

    /// Validate, admit, and schedule one unit of work.
    ///
    /// Validation happens before anything else: a malformed request or an
    /// unknown case is rejected here and never becomes a job that fails
    /// later. With a free admission slot the job record is created
    /// `Pending` and queued for the next free worker; with none, the
    /// submission is rejected as overloaded.
    pub fn submit(&self, request: &SubmitJobRequest) -> Result<JobId, SubmitError> {
        let input = request.validate().map_err(|e| match e {
            CoreError::Validation(msg) => SubmitError::Validation(msg),
            other => SubmitError::Validation(other.to_string()),
        })?;

        if !self.registry.contains(&input.case_id) {
            return Err(SubmitError::Validation(format!(
                "unknown case_id '{}'",
                input.case_id
            )));
        }

        let permit = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|_| SubmitError::Overloaded)?;

        let case_id = input.case_id.clone();
        let mode = input.mode;
        let id = self.store.create(input);

        if let Err(e) = self.queue_tx.try_send(QueuedJob { id, _permit: permit }) {
            // Only reachable when the workers are gone (shutdown); the
            // channel itself can never be full under a held permit.
            tracing::warn!(job_id = %id, error = %e, "Queue closed, discarding submission");
            self.store.discard_pending(id);
            return Err(SubmitError::Overloaded);
        }

        tracing::info!(
            job_id = %id,
            case_id = %case_id,
            mode = mode.as_str(),
            "Job submitted",
        );

        Ok(id)
    }

    /// Jobs currently admitted (queued + executing).
    pub fn admitted(&self) -> usize {
        let capacity = self.max_concurrent + self.queue_capacity;
        capacity - self.admission.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Stop accepting work and wait for the workers to wind down.
    ///
    /// In-flight inference calls cannot be interrupted; callers should
    /// wrap this in a timeout when a bounded shutdown matters.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("Job dispatcher shut down");
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

async fn worker_loop(
    worker_id: usize,
    store: Arc<JobStore>,
    runner: Arc<dyn SegmentationRunner>,
    artifacts: ArtifactStore,
    queue_rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    job_timeout: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = async { queue_rx.lock().await.recv().await } => next,
        };

        let Some(queued) = next else { break };
        execute(&store, &runner, &artifacts, job_timeout, queued.id).await;
        // queued._permit drops here, re-opening the admission slot.
    }

    tracing::debug!(worker_id, "Worker stopped");
}

/// Execution wrapper for one job: begin, run with timeout, record the
/// outcome. Nothing the runner does -- error, panic, or overrun -- may
/// escape this function.
async fn execute(
    store: &Arc<JobStore>,
    runner: &Arc<dyn SegmentationRunner>,
    artifacts: &ArtifactStore,
    job_timeout: Duration,
    id: JobId,
) {
    let Some(job) = store.get(id) else {
        tracing::error!(job_id = %id, "Queued job vanished from the store");
        return;
    };

    if let Err(e) = store.begin(id) {
        tracing::error!(job_id = %id, error = %e, "Could not begin queued job");
        return;
    }

    tracing::info!(
        job_id = %id,
        case_id = %job.input.case_id,
        mode = job.input.mode.as_str(),
        "Job started",
    );

    let mut task = spawn_inference(store, runner, artifacts, id, job.input.clone());

    match tokio::time::timeout(job_timeout, &mut task).await {
        Ok(Ok(Ok(result))) => {
            progress::record_success(store, id, result);
            tracing::info!(job_id = %id, "Job completed");
        }
        Ok(Ok(Err(runner_err))) => {
            // Full detail stays in the logs; the job gets a fixed phrase.
            tracing::error!(job_id = %id, error = %runner_err, "Inference failed");
            progress::record_failure(store, id, progress::FAILURE_MESSAGE.to_string());
        }
        Ok(Err(join_err)) => {
            if join_err.is_panic() {
                tracing::error!(job_id = %id, error = %join_err, "Inference panicked");
            } else {
                tracing::error!(job_id = %id, error = %join_err, "Inference task aborted");
            }
            progress::record_failure(store, id, progress::FAILURE_MESSAGE.to_string());
        }
        Err(_elapsed) => {
            tracing::warn!(
                job_id = %id,
                budget_secs = job_timeout.as_secs(),
                "Inference exceeded its wall-clock budget",
            );
            progress::record_failure(store, id, progress::timeout_message(job_timeout.as_secs()));

            // The blocking call cannot be killed; hold this worker slot
            // until it returns so timed-out runs cannot pile up without
            // bound. Its late outcome is rejected by the store.
            let _ = task.await;
            tracing::debug!(job_id = %id, "Orphaned inference call returned");
        }
    }
}

/// Run the blocking inference call on the blocking pool, with the progress
/// callback wired into the store. Only this task writes to the job while
/// it runs (single-writer rule).
fn spawn_inference(
    store: &Arc<JobStore>,
    runner: &Arc<dyn SegmentationRunner>,
    artifacts: &ArtifactStore,
    id: JobId,
    input: JobInput,
) -> JoinHandle<Result<serde_json::Value, mediseg_runner::RunnerError>> {
    let store = Arc::clone(store);
    let runner = Arc::clone(runner);
    let output_dir = artifacts.job_dir(id);

    tokio::task::spawn_blocking(move || {
        let mut on_progress =
            |percent: u8, message: &str| progress::record_progress(&store, id, percent, message);
        runner.run(&input, &output_dir, &mut on_progress)
    })
}

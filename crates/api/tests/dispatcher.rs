//! Engine-level tests for admission control and the execution wrapper.
//!
//! These drive the dispatcher directly (no HTTP) so timing-sensitive
//! behavior -- queueing order, timeouts, panics, concurrent submission --
//! can be asserted against the store.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{build_test_app, test_dispatcher_config, wait_for_status, TEST_CASE_ID};
use mediseg_api::engine::dispatcher::{DispatcherConfig, SubmitError};
use mediseg_core::job::{JobStatus, SegMode, SubmitJobRequest};
use mediseg_runner::mock::MockRunner;

fn test_request() -> SubmitJobRequest {
    SubmitJobRequest {
        case_id: TEST_CASE_ID.to_string(),
        mode: SegMode::Fast,
    }
}

// ---------------------------------------------------------------------------
// Test: a queued job stays pending until a worker frees up
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_job_queues_behind_a_busy_worker() {
    let runner =
        MockRunner::completing(serde_json::json!({})).with_step_delay(Duration::from_millis(200));
    let test = build_test_app(
        Arc::new(runner),
        DispatcherConfig {
            max_concurrent: 1,
            queue_capacity: 4,
            job_timeout: Duration::from_secs(10),
        },
    );

    let first = test.dispatcher.submit(&test_request()).unwrap();
    wait_for_status(&test.store, first, JobStatus::Running, Duration::from_secs(2)).await;

    let second = test.dispatcher.submit(&test_request()).unwrap();

    // While the single worker is held by the first job, the second must
    // sit in the queue as pending.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(test.store.get(second).unwrap().status(), JobStatus::Pending);
    assert_eq!(test.store.get(first).unwrap().status(), JobStatus::Running);

    // Once the first completes, the second runs and completes normally.
    wait_for_status(&test.store, first, JobStatus::Completed, Duration::from_secs(2)).await;
    wait_for_status(&test.store, second, JobStatus::Completed, Duration::from_secs(2)).await;
}

// ---------------------------------------------------------------------------
// Test: admission is bounded by max_concurrent + queue_capacity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn excess_submissions_are_rejected_as_overloaded() {
    let runner =
        MockRunner::completing(serde_json::json!({})).with_step_delay(Duration::from_millis(500));
    let test = build_test_app(
        Arc::new(runner),
        DispatcherConfig {
            max_concurrent: 1,
            queue_capacity: 2,
            job_timeout: Duration::from_secs(10),
        },
    );

    // Fill every admission slot: 1 running + 2 queued.
    let mut admitted = Vec::new();
    for _ in 0..3 {
        admitted.push(test.dispatcher.submit(&test_request()).unwrap());
    }

    // The next submission must be rejected, not queued forever.
    let err = test.dispatcher.submit(&test_request()).unwrap_err();
    assert_matches!(err, SubmitError::Overloaded);

    // Rejected submissions leave no record behind.
    assert_eq!(test.store.len(), admitted.len());

    // Every admitted job still finishes.
    for id in admitted {
        wait_for_status(&test.store, id, JobStatus::Completed, Duration::from_secs(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Test: unknown case is rejected synchronously with no job id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_case_never_becomes_a_job() {
    let runner = Arc::new(MockRunner::completing(serde_json::json!({})));
    let test = build_test_app(runner.clone(), test_dispatcher_config());

    let err = test
        .dispatcher
        .submit(&SubmitJobRequest {
            case_id: "missing_case".into(),
            mode: SegMode::Full,
        })
        .unwrap_err();

    assert_matches!(err, SubmitError::Validation(msg) if msg.contains("missing_case"));
    assert!(test.store.is_empty());
    assert_eq!(runner.calls(), 0);
}

// ---------------------------------------------------------------------------
// Test: wall-clock timeout forces the job into failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overrunning_job_fails_with_a_timeout_error() {
    let runner =
        MockRunner::completing(serde_json::json!({})).with_step_delay(Duration::from_millis(400));
    let test = build_test_app(
        Arc::new(runner),
        DispatcherConfig {
            max_concurrent: 1,
            queue_capacity: 4,
            job_timeout: Duration::from_millis(100),
        },
    );

    let id = test.dispatcher.submit(&test_request()).unwrap();
    let job = wait_for_status(&test.store, id, JobStatus::Failed, Duration::from_secs(2)).await;

    let error = job.error().unwrap();
    assert!(error.contains("timed out"), "unexpected error: {error}");
    assert!(!error.contains('/'), "leaked a path: {error}");

    // The orphaned runner eventually returns; the verdict must not change.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let job = test.store.get(id).unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error().unwrap().contains("timed out"));
}

// ---------------------------------------------------------------------------
// Test: a panicking runner is contained by the execution wrapper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_runner_fails_the_job_and_spares_the_worker() {
    let test = build_test_app(Arc::new(MockRunner::panicking()), test_dispatcher_config());

    let id = test.dispatcher.submit(&test_request()).unwrap();
    let job = wait_for_status(&test.store, id, JobStatus::Failed, Duration::from_secs(2)).await;

    let error = job.error().unwrap();
    assert!(!error.contains("panic"), "leaked panic detail: {error}");

    // The worker survived: it must pick up and finish a later job. The
    // panicking runner panics again, but each run is contained.
    let next = test.dispatcher.submit(&test_request()).unwrap();
    wait_for_status(&test.store, next, JobStatus::Failed, Duration::from_secs(2)).await;
}

// ---------------------------------------------------------------------------
// Test: concurrent submissions never collide on ids
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn a_thousand_concurrent_submissions_get_distinct_ids() {
    let runner = MockRunner::completing(serde_json::json!({}));
    let test = build_test_app(
        Arc::new(runner),
        DispatcherConfig {
            max_concurrent: 4,
            queue_capacity: 1000,
            job_timeout: Duration::from_secs(30),
        },
    );

    let mut handles = Vec::with_capacity(1000);
    for _ in 0..1000 {
        let dispatcher = Arc::clone(&test.dispatcher);
        handles.push(tokio::spawn(async move {
            dispatcher.submit(&SubmitJobRequest {
                case_id: TEST_CASE_ID.to_string(),
                mode: SegMode::Fast,
            })
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let id = handle.await.unwrap().expect("submission rejected");
        assert!(ids.insert(id), "duplicate job id under race");
    }
    assert_eq!(ids.len(), 1000);
}

// ---------------------------------------------------------------------------
// Test: failure detail stays out of the job record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runner_failure_detail_never_reaches_the_record() {
    let runner = MockRunner::failing("CUDA error at /opt/model/net.pt: boom");
    let test = build_test_app(Arc::new(runner), test_dispatcher_config());

    let id = test.dispatcher.submit(&test_request()).unwrap();
    let job = wait_for_status(&test.store, id, JobStatus::Failed, Duration::from_secs(2)).await;

    let error = job.error().unwrap();
    assert!(!error.contains("boom"));
    assert!(!error.contains("CUDA"));
    assert!(!error.contains('/'));
    assert!(job.completed_at.is_some());
    assert!(job.started_at.is_some());
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use mediseg_api::config::ServerConfig;
use mediseg_api::engine::dispatcher::{Dispatcher, DispatcherConfig};
use mediseg_api::engine::store::JobStore;
use mediseg_api::routes;
use mediseg_api::state::AppState;
use mediseg_core::job::{Job, JobStatus};
use mediseg_core::types::JobId;
use mediseg_runner::artifacts::ArtifactStore;
use mediseg_runner::cases::CaseRegistry;
use mediseg_runner::SegmentationRunner;

/// A case id present in every test registry.
pub const TEST_CASE_ID: &str = "liver_003";

/// Fully wired application over temp directories and a scripted runner.
///
/// The temp dirs are owned here so they outlive the test body.
pub struct TestApp {
    pub app: Router,
    pub store: Arc<JobStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub artifacts: ArtifactStore,
    _data_dir: TempDir,
    _artifact_dir: TempDir,
}

/// Default dispatcher knobs for tests: one worker, small queue, generous
/// timeout.
pub fn test_dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        max_concurrent: 1,
        queue_capacity: 8,
        job_timeout: Duration::from_secs(10),
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(data_dir: PathBuf, artifact_dir: PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        data_dir,
        artifact_dir,
        segment_command: PathBuf::from("segment-infer"),
        max_concurrent_jobs: 1,
        job_queue_capacity: 8,
        job_timeout_secs: 10,
        gc_interval_secs: 600,
        job_ttl_secs: 3600,
    }
}

/// Build the full application router with all middleware layers, using the
/// given runner and dispatcher configuration.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses.
pub fn build_test_app(
    runner: Arc<dyn SegmentationRunner>,
    dispatcher_config: DispatcherConfig,
) -> TestApp {
    let data_dir = tempfile::tempdir().expect("create data dir");
    let artifact_dir = tempfile::tempdir().expect("create artifact dir");

    for case_file in [format!("{TEST_CASE_ID}.nii.gz"), "spleen_12.nii".to_string()] {
        std::fs::write(data_dir.path().join(case_file), b"volume").expect("write case file");
    }

    let registry = Arc::new(CaseRegistry::scan(data_dir.path()).expect("scan cases"));
    let artifacts = ArtifactStore::new(artifact_dir.path()).expect("create artifact store");
    let store = Arc::new(JobStore::new());

    let dispatcher = Dispatcher::start(
        Arc::clone(&store),
        Arc::clone(&registry),
        runner,
        artifacts.clone(),
        dispatcher_config,
        CancellationToken::new(),
    );

    let config = test_config(
        data_dir.path().to_path_buf(),
        artifact_dir.path().to_path_buf(),
    );

    let state = AppState {
        store: Arc::clone(&store),
        dispatcher: Arc::clone(&dispatcher),
        registry,
        artifacts: artifacts.clone(),
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        app,
        store,
        dispatcher,
        artifacts,
        _data_dir: data_dir,
        _artifact_dir: artifact_dir,
    }
}

/// Send one request and return `(status, parsed JSON body)`.
pub async fn request_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, json)
}

/// Submit the standard test case and return its job id.
pub async fn submit_test_job(app: &Router) -> JobId {
    let (status, body) = request_json(
        app,
        Method::POST,
        "/api/v1/jobs",
        Some(serde_json::json!({"case_id": TEST_CASE_ID, "mode": "fast"})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED, "submit failed: {body}");
    assert_eq!(body["data"]["status"], "pending");
    body["data"]["job_id"]
        .as_str()
        .expect("job_id in submit response")
        .parse()
        .expect("job_id is a uuid")
}

/// Poll the store until the job reaches `status` or `deadline` elapses.
pub async fn wait_for_status(
    store: &Arc<JobStore>,
    id: JobId,
    status: JobStatus,
    deadline: Duration,
) -> Job {
    let start = std::time::Instant::now();
    loop {
        if let Some(job) = store.get(id) {
            if job.status() == status {
                return job;
            }
            assert!(
                !job.status().is_terminal(),
                "job {id} reached terminal {:?} while waiting for {status:?}",
                job.status(),
            );
        }
        assert!(
            start.elapsed() < deadline,
            "timed out waiting for job {id} to reach {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs            submit (POST), list (GET)
/// /jobs/{id}       poll one job (GET)
/// /queue           engine load and admission bounds (GET)
/// /cases           case ids accepted for submission (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/jobs",
            post(handlers::jobs::submit_job).get(handlers::jobs::list_jobs),
        )
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .route("/queue", get(handlers::queue::get_queue_status))
        .route("/cases", get(handlers::cases::list_cases))
}

//! Handler for queue observability.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Response for GET /queue.
#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub total_pending: usize,
    pub total_running: usize,
    pub total_completed: usize,
    pub total_failed: usize,
    /// Jobs currently admitted (queued + executing).
    pub admitted: usize,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
}

/// GET /api/v1/queue
///
/// Returns current engine load: job counts per status plus the admission
/// bounds submissions are checked against.
pub async fn get_queue_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let counts = state.store.status_counts();

    let resp = QueueStatusResponse {
        total_pending: counts.pending,
        total_running: counts.running,
        total_completed: counts.completed,
        total_failed: counts.failed,
        admitted: state.dispatcher.admitted(),
        max_concurrent: state.dispatcher.max_concurrent(),
        queue_capacity: state.dispatcher.queue_capacity(),
    };

    Ok(Json(DataResponse { data: resp }))
}

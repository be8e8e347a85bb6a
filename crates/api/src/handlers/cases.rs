//! Handler for the case registry.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Response for GET /cases.
#[derive(Debug, Serialize)]
pub struct CaseListResponse {
    pub case_ids: Vec<String>,
    pub count: usize,
}

/// GET /api/v1/cases
///
/// List the case ids accepted by job submission -- exactly the set the
/// submit-time validation consults.
pub async fn list_cases(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let case_ids: Vec<String> = state.registry.ids().iter().map(|s| s.to_string()).collect();
    let count = case_ids.len();

    Ok(Json(DataResponse {
        data: CaseListResponse { case_ids, count },
    }))
}

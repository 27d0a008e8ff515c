use axum::{ Json, extract::State, http::StatusCode };
use serde::Serialize;
use tracing::error;

use crate::state::AppState;
use crate::store::TaskFilter;

#[derive(Serialize)]
pub struct HealthData {
    status: u16,
}

/// Reports 503 when the task store cannot be reached.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthData>) {
    let status = match state.tasks().count(TaskFilter::all()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, Json(HealthData { status: status.as_u16() }))
}

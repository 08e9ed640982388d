use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::api_state::ApiState;

/// Ready when the primary store answers.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.query("RETURN 1").await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

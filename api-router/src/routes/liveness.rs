use axum::{http::StatusCode, response::IntoResponse};

/// Process is up; no dependency checks.
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::storage::types::{
    evaluation::{DimensionScores, Evaluation, SalesSpecific},
    session::{ContextPayload, PreparationType, Session, SessionStatus, TranscriptTurn},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::Tenant};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub preparation_type: PreparationType,
    #[serde(default)]
    pub context_payload: ContextPayload,
}

#[derive(Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub preparation_type: PreparationType,
    pub context_payload: ContextPayload,
    pub status: SessionStatus,
    pub transcript: Vec<TranscriptTurn>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            preparation_type: session.preparation_type,
            context_payload: session.context_payload,
            status: session.status,
            transcript: session.transcript,
            created_at: session.created_at,
            completed_at: session.completed_at,
        }
    }
}

pub async fn create_session(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .create(&tenant.0, request.preparation_type, request.context_payload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "session_id": session.id, "status": session.status })),
    ))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get(&tenant.0, &session_id).await?;
    Ok(Json(SessionView::from(session)))
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

pub async fn post_message(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .sessions
        .turn(&tenant.0, &session_id, &request.message)
        .await?;

    Ok(Json(json!({
        "assistant_text": outcome.assistant_text,
        "turn_index": outcome.turn_index,
        "retrieved_chunk_ids": outcome.retrieved_chunk_ids,
    })))
}

pub async fn complete_session(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.complete(&tenant.0, &session_id).await?;
    Ok(Json(json!({ "status": session.status })))
}

#[derive(Serialize)]
pub struct EvaluationView {
    pub session_id: String,
    pub dimension_scores: DimensionScores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_specific: Option<SalesSpecific>,
    pub overall_score: u8,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl From<Evaluation> for EvaluationView {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            session_id: evaluation.session_id,
            dimension_scores: evaluation.dimension_scores,
            sales_specific: evaluation.sales_specific,
            overall_score: evaluation.overall_score,
            strengths: evaluation.strengths,
            improvement_areas: evaluation.improvement_areas,
            summary: evaluation.summary,
            created_at: evaluation.created_at,
        }
    }
}

pub async fn evaluate_session(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let evaluation = state.evaluator.evaluate(&tenant.0, &session_id).await?;
    Ok(Json(EvaluationView::from(evaluation)))
}

/// DELETE archives: a soft-delete terminal, not a row removal.
pub async fn archive_session(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.archive(&tenant.0, &session_id).await?;
    Ok(Json(json!({ "status": SessionStatus::Archived })))
}

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::storage::types::{
    session::DealStage,
    talk_point::{TalkPointArtifact, TalkPointContent},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use synthesis::TalkPointRequest;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::Tenant};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
    #[serde(default)]
    pub deal_stage: Option<DealStage>,
    #[serde(default)]
    pub customer_context: Option<String>,
}

#[derive(Serialize)]
pub struct TalkPointView {
    pub talk_point_id: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_stage: Option<DealStage>,
    pub content: TalkPointContent,
    pub sources_used: u32,
    pub created_at: DateTime<Utc>,
}

impl From<TalkPointArtifact> for TalkPointView {
    fn from(artifact: TalkPointArtifact) -> Self {
        Self {
            talk_point_id: artifact.id,
            topic: artifact.topic,
            customer_context: artifact.customer_context,
            deal_stage: artifact.deal_stage,
            content: artifact.content,
            sources_used: artifact.sources_used,
            created_at: artifact.created_at,
        }
    }
}

pub async fn generate_talk_points(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let artifact = state
        .talk_points
        .generate(
            &tenant.0,
            TalkPointRequest {
                topic: request.topic,
                deal_stage: request.deal_stage,
                customer_context: request.customer_context,
            },
        )
        .await?;

    Ok(Json(TalkPointView::from(artifact)))
}

pub async fn list_talk_points(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
) -> Result<impl IntoResponse, ApiError> {
    let artifacts = TalkPointArtifact::list(&state.db, &tenant.0).await?;
    let views: Vec<TalkPointView> = artifacts.into_iter().map(TalkPointView::from).collect();
    Ok(Json(json!({ "talk_points": views })))
}

pub async fn get_talk_point(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(talk_point_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let artifact = TalkPointArtifact::get_scoped(&state.db, &tenant.0, &talk_point_id).await?;
    Ok(Json(TalkPointView::from(artifact)))
}

pub async fn delete_talk_point(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(talk_point_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    TalkPointArtifact::delete_scoped(&state.db, &tenant.0, &talk_point_id).await?;
    Ok(Json(json!({ "deleted": true })))
}

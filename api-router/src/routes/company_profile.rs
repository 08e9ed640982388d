use axum::{extract::State, response::IntoResponse, Extension, Json};
use common::{error::AppError, storage::types::company_profile::CompanyProfile};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::Tenant};

#[derive(Debug, Deserialize)]
pub struct PutProfileRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value_proposition: String,
    #[serde(default)]
    pub industry: String,
}

#[derive(Serialize)]
pub struct ProfileView {
    pub name: String,
    pub description: String,
    pub value_proposition: String,
    pub industry: String,
}

impl From<CompanyProfile> for ProfileView {
    fn from(profile: CompanyProfile) -> Self {
        Self {
            name: profile.name,
            description: profile.description,
            value_proposition: profile.value_proposition,
            industry: profile.industry,
        }
    }
}

pub async fn get_profile(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = CompanyProfile::get_by_tenant(&state.db, &tenant.0)
        .await?
        .ok_or_else(|| AppError::NotFound("No company profile yet".to_string()))?;

    Ok(Json(ProfileView::from(profile)))
}

pub async fn put_profile(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Json(request): Json<PutProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("company name must not be empty"));
    }

    let profile = CompanyProfile::new(
        tenant.0.clone(),
        request.name,
        request.description,
        request.value_proposition,
        request.industry,
    );
    profile.upsert(&state.db).await?;

    Ok(Json(ProfileView::from(profile)))
}

use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::ApiError;

/// The authenticated principal, minted by the upstream auth layer.
///
/// The core trusts the id but scopes every storage call by it.
#[derive(Debug, Clone)]
pub struct Tenant(pub String);

pub async fn api_auth(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let tenant_id = extract_tenant_id(&request)
        .ok_or_else(|| ApiError::unauthorized("You have to be authenticated"))?;

    request.extensions_mut().insert(Tenant(tenant_id));

    Ok(next.run(request).await)
}

fn extract_tenant_id(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-Tenant-Id")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        })
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::storage::types::document::{Document, DocumentStatus, IngestError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::Tenant};

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
}

#[derive(Serialize)]
pub struct DocumentView {
    pub document_id: String,
    pub filename: String,
    pub mime: String,
    pub bytes: u64,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IngestError>,
}

impl From<Document> for DocumentView {
    fn from(doc: Document) -> Self {
        Self {
            document_id: doc.id,
            filename: doc.filename,
            mime: doc.mime,
            bytes: doc.byte_size,
            status: doc.status,
            chunk_count: doc.chunk_count,
            page_count: doc.page_count,
            uploaded_at: doc.created_at,
            indexed_at: doc.indexed_at,
            error: doc.error,
        }
    }
}

/// Intake: persist bytes and the `Uploading` row; a worker claims and
/// indexes asynchronously.
pub async fn upload_document(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filename = input
        .file
        .metadata
        .file_name
        .clone()
        .unwrap_or_else(|| "upload".to_string());
    let mime = input
        .file
        .metadata
        .content_type
        .clone()
        .unwrap_or_else(|| {
            mime_guess::from_path(&filename)
                .first_or(mime::TEXT_PLAIN)
                .to_string()
        });

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(|e| ApiError::validation(format!("could not read upload: {e}")))?;

    if bytes.is_empty() {
        return Err(ApiError::validation("uploaded file is empty"));
    }
    if bytes.len() > state.config.doc.max_bytes {
        return Err(ApiError::validation(format!(
            "uploaded file exceeds the {} byte limit",
            state.config.doc.max_bytes
        )));
    }

    let mut document = Document::new(
        tenant.0.clone(),
        filename,
        mime,
        bytes.len() as u64,
        String::new(),
    );
    document.source_uri = format!("documents/{}/{}", tenant.0, document.id);

    state
        .storage
        .put(&document.source_uri, Bytes::from(bytes))
        .await
        .map_err(common::error::AppError::from)?;
    state
        .db
        .store_item(document.clone())
        .await
        .map_err(common::error::AppError::from)?;

    info!(
        tenant_id = %tenant.0,
        document_id = %document.id,
        bytes = document.byte_size,
        "document accepted for ingestion"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "document_id": document.id, "status": "processing" })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_documents(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.clamp(1, 200);
    let documents = Document::list(&state.db, &tenant.0, limit, params.skip).await?;

    let views: Vec<DocumentView> = documents.into_iter().map(DocumentView::from).collect();
    Ok(Json(json!({ "documents": views })))
}

pub async fn get_document(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get_scoped(&state.db, &tenant.0, &document_id).await?;
    Ok(Json(DocumentView::from(document)))
}

/// Idempotent delete; vector entries are removed before return or handed to
/// the orphan reconciliation queue.
pub async fn delete_document(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Document::delete(
        &state.db,
        &state.index,
        &state.storage,
        &tenant.0,
        &document_id,
    )
    .await?;

    Ok(Json(json!({ "deleted": true })))
}

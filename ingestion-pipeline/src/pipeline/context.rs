use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document::Document},
    utils::config::ChunkerSettings,
};
use tracing::error;

use crate::{chunker::ChunkPiece, extract::ExtractedText};

use super::services::PipelineServices;

pub struct PipelineContext<'a> {
    pub document: &'a Document,
    pub db: &'a SurrealDbClient,
    pub services: &'a dyn PipelineServices,
    pub chunker_settings: &'a ChunkerSettings,
    pub extracted: Option<ExtractedText>,
    pub pieces: Vec<ChunkPiece>,
    pub embeddings: Vec<Vec<f32>>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        document: &'a Document,
        db: &'a SurrealDbClient,
        services: &'a dyn PipelineServices,
        chunker_settings: &'a ChunkerSettings,
    ) -> Self {
        Self {
            document,
            db,
            services,
            chunker_settings,
            extracted: None,
            pieces: Vec::new(),
            embeddings: Vec::new(),
        }
    }

    pub fn extracted(&self) -> Result<&ExtractedText, AppError> {
        self.extracted
            .as_ref()
            .ok_or_else(|| AppError::InternalError("extracted text expected to be available".into()))
    }

    pub fn abort(&self, err: AppError) -> AppError {
        error!(
            document_id = %self.document.id,
            tenant_id = %self.document.tenant_id,
            error = %err,
            "ingestion pipeline aborted"
        );
        err
    }
}

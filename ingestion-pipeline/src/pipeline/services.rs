use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::AppError,
    llm::LlmGateway,
    storage::{store::StorageManager, types::document::Document},
    vector::VectorIndex,
};

use crate::extract::{ExtractedText, TextExtractor};

/// Seams between the pipeline and its collaborators, so tests can substitute
/// any of them.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn load_bytes(&self, document: &Document) -> Result<Bytes, AppError>;

    async fn extract_text(&self, bytes: &[u8], mime: &str) -> Result<ExtractedText, AppError>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    fn vector_index(&self) -> &VectorIndex;
}

pub struct DefaultPipelineServices {
    storage: StorageManager,
    extractor: Arc<dyn TextExtractor>,
    gateway: LlmGateway,
    index: VectorIndex,
}

impl DefaultPipelineServices {
    pub fn new(
        storage: StorageManager,
        extractor: Arc<dyn TextExtractor>,
        gateway: LlmGateway,
        index: VectorIndex,
    ) -> Self {
        Self {
            storage,
            extractor,
            gateway,
            index,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn load_bytes(&self, document: &Document) -> Result<Bytes, AppError> {
        Ok(self.storage.get(&document.source_uri).await?)
    }

    async fn extract_text(&self, bytes: &[u8], mime: &str) -> Result<ExtractedText, AppError> {
        self.extractor.extract(bytes, mime).await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.gateway.embed(texts).await
    }

    fn vector_index(&self) -> &VectorIndex {
        &self.index
    }
}

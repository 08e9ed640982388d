#![allow(clippy::missing_docs_in_private_items)]

pub mod query;

use std::collections::HashMap;
use std::sync::Arc;

use common::{
    error::AppError,
    llm::LlmGateway,
    storage::{db::SurrealDbClient, types::chunk::Chunk},
    vector::VectorIndex,
};
use tracing::{debug, instrument, warn};

/// A ranked chunk with its text hydrated from the document store.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub page: Option<u32>,
    pub text: String,
    pub score: f32,
}

/// Builds a retrieval result from an intent: embed the query, rank against
/// the tenant's vector collection, hydrate the chunk texts in one batched
/// read.
#[derive(Clone)]
pub struct Retriever {
    db: Arc<SurrealDbClient>,
    gateway: LlmGateway,
    index: VectorIndex,
}

impl Retriever {
    pub fn new(db: Arc<SurrealDbClient>, gateway: LlmGateway, index: VectorIndex) -> Self {
        Self { db, gateway, index }
    }

    #[instrument(skip_all, fields(tenant_id = %tenant_id, k))]
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, AppError> {
        let embedding = self
            .gateway
            .embed(&[query_text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::ProviderInvalid("no embedding returned for retrieval query".to_string())
            })?;

        let hits = match self.index.query(tenant_id, &embedding, k).await {
            Ok(hits) => hits,
            Err(AppError::IndexUnavailable(message)) => {
                // Degraded retrieval: the caller proceeds without context.
                warn!(%message, "vector index unavailable; returning empty retrieval");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|hit| hit.chunk_id.clone()).collect();
        let chunks = Chunk::get_many(&self.db, tenant_id, &ids).await?;
        let by_id: HashMap<&str, &Chunk> = chunks
            .iter()
            .map(|chunk| (chunk.id.as_str(), chunk))
            .collect();

        let mut results = Vec::with_capacity(hits.len());
        for hit in &hits {
            match by_id.get(hit.chunk_id.as_str()) {
                Some(chunk) => results.push(RetrievedChunk {
                    chunk_id: hit.chunk_id.clone(),
                    document_id: hit.document_id.clone(),
                    ordinal: hit.ordinal,
                    page: hit.page,
                    text: chunk.text.clone(),
                    score: hit.score,
                }),
                // A vector hit without a chunk row is a benign race with a
                // concurrent document delete.
                None => debug!(
                    chunk_id = %hit.chunk_id,
                    document_id = %hit.document_id,
                    "dropping retrieval hit whose chunk row no longer exists"
                ),
            }
        }

        Ok(results)
    }
}

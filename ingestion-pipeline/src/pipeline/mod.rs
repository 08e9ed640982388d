mod context;
mod services;
mod stages;
mod state;

pub use services::{DefaultPipelineServices, PipelineServices};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{
    error::AppError,
    llm::LlmGateway,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::document::{Document, DocumentStatus, IngestErrorKind, TransitionFields},
    },
    utils::config::ChunkerSettings,
    vector::VectorIndex,
};
use tracing::info;

use crate::extract::TextExtractor;

use self::{context::PipelineContext, state::ready};

pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    services: Arc<dyn PipelineServices>,
    chunker_settings: ChunkerSettings,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        gateway: LlmGateway,
        index: VectorIndex,
        extractor: Arc<dyn TextExtractor>,
        chunker_settings: ChunkerSettings,
    ) -> Self {
        let services = DefaultPipelineServices::new(storage, extractor, gateway, index);
        Self::with_services(db, Arc::new(services), chunker_settings)
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        services: Arc<dyn PipelineServices>,
        chunker_settings: ChunkerSettings,
    ) -> Self {
        Self {
            db,
            services,
            chunker_settings,
        }
    }

    /// Run a claimed document through extract → chunk → embed → index and
    /// commit the terminal status. The caller owns the `Processing` claim.
    ///
    /// Chunk ids are derived from `(document_id, ordinal)`, so re-running a
    /// document overwrites its chunks and vectors instead of duplicating.
    #[tracing::instrument(
        skip_all,
        fields(document_id = %document.id, tenant_id = %document.tenant_id)
    )]
    pub async fn process_document(&self, document: Document) -> Result<(), AppError> {
        let mut ctx = PipelineContext::new(
            &document,
            &self.db,
            self.services.as_ref(),
            &self.chunker_settings,
        );

        let machine = ready();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = match stages::extract(machine, &mut ctx).await {
            Ok(machine) => machine,
            Err(err) => {
                return self
                    .mark_failed(&document, IngestErrorKind::Extraction, ctx.abort(err))
                    .await
            }
        };
        let extract_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = match stages::chunk(machine, &mut ctx).await {
            Ok(machine) => machine,
            Err(err) => {
                return self
                    .mark_failed(&document, IngestErrorKind::Extraction, ctx.abort(err))
                    .await
            }
        };
        let chunk_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = match stages::embed(machine, &mut ctx).await {
            Ok(machine) => machine,
            Err(err) => {
                return self
                    .mark_failed(&document, IngestErrorKind::Embedding, ctx.abort(err))
                    .await
            }
        };
        let embed_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let _machine = match stages::persist(machine, &mut ctx).await {
            Ok(machine) => machine,
            Err(err) => {
                return self
                    .mark_failed(&document, IngestErrorKind::Index, ctx.abort(err))
                    .await
            }
        };
        let persist_duration = stage_start.elapsed();

        let chunk_count = u32::try_from(ctx.pieces.len()).unwrap_or(u32::MAX);
        let page_count = ctx.extracted()?.page_count();

        Document::transition(
            &self.db,
            &document.id,
            DocumentStatus::Processing,
            DocumentStatus::Indexed,
            TransitionFields {
                indexed_at: Some(Utc::now()),
                chunk_count: Some(chunk_count),
                page_count: Some(page_count),
                ..TransitionFields::default()
            },
        )
        .await?;

        info!(
            document_id = %document.id,
            chunk_count,
            page_count,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            extract_ms = Self::duration_millis(extract_duration),
            chunk_ms = Self::duration_millis(chunk_duration),
            embed_ms = Self::duration_millis(embed_duration),
            persist_ms = Self::duration_millis(persist_duration),
            "ingestion pipeline finished"
        );

        Ok(())
    }

    async fn mark_failed(
        &self,
        document: &Document,
        kind: IngestErrorKind,
        err: AppError,
    ) -> Result<(), AppError> {
        Document::set_failed(&self.db, &document.id, kind, err.to_string()).await?;
        Err(err)
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests;

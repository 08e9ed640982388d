use common::{
    error::AppError,
    storage::types::chunk::Chunk,
    vector::VectorEntry,
};
use state_machines::core::GuardError;
use tracing::{debug, error, instrument};

use crate::chunker::chunk_pages;

use super::{
    context::PipelineContext,
    state::{Chunked, Embedded, Extracted, Indexed, IngestionMachine, Ready},
};

#[instrument(
    level = "trace",
    skip_all,
    fields(document_id = %ctx.document.id, tenant_id = %ctx.document.tenant_id)
)]
pub async fn extract(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Extracted>, AppError> {
    let bytes = ctx.services.load_bytes(ctx.document).await?;
    let extracted = ctx
        .services
        .extract_text(&bytes, &ctx.document.mime)
        .await?;

    if extracted.is_empty() {
        return Err(AppError::Validation(
            "document contains no extractable text".into(),
        ));
    }

    debug!(
        document_id = %ctx.document.id,
        pages = extracted.page_count(),
        chars = extracted.full_text().chars().count(),
        "document text extracted"
    );

    ctx.extracted = Some(extracted);

    machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", &guard))
}

#[instrument(
    level = "trace",
    skip_all,
    fields(document_id = %ctx.document.id, tenant_id = %ctx.document.tenant_id)
)]
pub async fn chunk(
    machine: IngestionMachine<(), Extracted>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Chunked>, AppError> {
    let extracted = ctx.extracted()?;
    let pieces = chunk_pages(&extracted.pages, ctx.chunker_settings)?;

    if pieces.is_empty() {
        return Err(AppError::Validation("chunking produced no chunks".into()));
    }

    debug!(
        document_id = %ctx.document.id,
        chunks = pieces.len(),
        "document chunked"
    );

    ctx.pieces = pieces;

    machine
        .chunk()
        .map_err(|(_, guard)| map_guard_error("chunk", &guard))
}

#[instrument(
    level = "trace",
    skip_all,
    fields(document_id = %ctx.document.id, tenant_id = %ctx.document.tenant_id)
)]
pub async fn embed(
    machine: IngestionMachine<(), Chunked>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Embedded>, AppError> {
    let texts: Vec<String> = ctx.pieces.iter().map(|piece| piece.text.clone()).collect();
    let embeddings = ctx.services.embed(&texts).await?;

    if embeddings.len() != ctx.pieces.len() {
        return Err(AppError::ProviderInvalid(format!(
            "embedding batch returned {} vectors for {} chunks",
            embeddings.len(),
            ctx.pieces.len()
        )));
    }

    ctx.embeddings = embeddings;

    machine
        .embed()
        .map_err(|(_, guard)| map_guard_error("embed", &guard))
}

/// Persist chunk rows, then vector entries. If the index insert fails the
/// just-written chunk rows are removed again so the document never
/// references ghost chunks.
#[instrument(
    level = "trace",
    skip_all,
    fields(document_id = %ctx.document.id, tenant_id = %ctx.document.tenant_id)
)]
pub async fn persist(
    machine: IngestionMachine<(), Embedded>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Indexed>, AppError> {
    let document = ctx.document;

    let chunks: Vec<Chunk> = ctx
        .pieces
        .iter()
        .map(|piece| {
            Chunk::new(
                document.id.clone(),
                document.tenant_id.clone(),
                piece.ordinal,
                piece.text.clone(),
                piece.page,
            )
        })
        .collect();

    let entries: Vec<VectorEntry> = chunks
        .iter()
        .zip(ctx.embeddings.iter())
        .map(|(chunk, embedding)| VectorEntry {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            ordinal: chunk.ordinal,
            page: chunk.page,
            embedding: embedding.clone(),
        })
        .collect();

    Chunk::replace_for_document(ctx.db, &document.id, chunks).await?;

    if let Err(err) = ctx
        .services
        .vector_index()
        .insert(&document.tenant_id, entries)
        .await
    {
        if let Err(cleanup) = Chunk::delete_by_document(ctx.db, &document.id).await {
            error!(
                document_id = %document.id,
                error = %cleanup,
                "failed to roll back chunk rows after index failure"
            );
        }
        return Err(err);
    }

    debug!(
        document_id = %document.id,
        chunks = ctx.pieces.len(),
        "chunks and vectors persisted"
    );

    machine
        .index()
        .map_err(|(_, guard)| map_guard_error("index", &guard))
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::AppError,
    llm::{stub::StubBackend, LlmGateway},
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            chunk::Chunk,
            document::{Document, DocumentStatus, IngestErrorKind, TransitionFields},
        },
    },
    utils::config::{ChunkerSettings, IngestionSettings, LlmSettings, StorageKind},
    vector::VectorIndex,
};
use chrono::Utc;
use object_store::memory::InMemory;
use uuid::Uuid;

use crate::{
    drain_pending,
    extract::{ExtractedText, PlainTextExtractor},
    pipeline::{IngestionPipeline, PipelineServices},
};

const VOCAB: [&str; 6] = ["alpha", "bravo", "charlie", "delta", "widget", "sprocket"];

struct Fixture {
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    index: VectorIndex,
    stub: StubBackend,
    pipeline: IngestionPipeline,
    settings: IngestionSettings,
}

async fn fixture() -> Fixture {
    let database = Uuid::new_v4().to_string();
    let db = Arc::new(
        SurrealDbClient::memory("test_ns", &database)
            .await
            .expect("Failed to start in-memory surrealdb"),
    );
    db.ensure_initialized(VOCAB.len())
        .await
        .expect("init indexes");

    let storage = StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory);
    let stub = StubBackend::with_vocab(&VOCAB);
    let gateway = LlmGateway::stubbed(stub.clone(), LlmSettings::default());
    let index = VectorIndex::new(Arc::clone(&db), VOCAB.len());

    let pipeline = IngestionPipeline::new(
        Arc::clone(&db),
        storage.clone(),
        gateway,
        index.clone(),
        Arc::new(PlainTextExtractor),
        ChunkerSettings::default(),
    );

    Fixture {
        db,
        storage,
        index,
        stub,
        pipeline,
        settings: IngestionSettings::default(),
    }
}

async fn upload(fx: &Fixture, tenant: &str, body: &[u8], mime: &str) -> Document {
    let document = Document::new(
        tenant.to_string(),
        "upload.txt".to_string(),
        mime.to_string(),
        body.len() as u64,
        format!("documents/{tenant}/{}", Uuid::new_v4()),
    );
    fx.storage
        .put(&document.source_uri, Bytes::from(body.to_vec()))
        .await
        .expect("store bytes");
    fx.db
        .store_item(document.clone())
        .await
        .expect("store document row");
    document
}

async fn get_document(fx: &Fixture, id: &str) -> Document {
    fx.db
        .get_item(id)
        .await
        .expect("get document")
        .expect("document exists")
}

#[tokio::test]
async fn test_upload_and_index_end_to_end() {
    let fx = fixture().await;
    let document = upload(&fx, "tenant_a", b"alpha bravo charlie", "text/plain").await;

    let processed = drain_pending(&fx.db, &fx.pipeline, &fx.settings)
        .await
        .expect("drain");
    assert_eq!(processed, 1);

    let indexed = get_document(&fx, &document.id).await;
    assert_eq!(indexed.status, DocumentStatus::Indexed);
    assert_eq!(indexed.chunk_count, Some(1));
    assert_eq!(indexed.page_count, Some(1));
    assert!(indexed.indexed_at.is_some());
    assert!(indexed.error.is_none());

    // The chunk is findable through the vector index by one of its tokens.
    let hits = fx
        .index
        .query("tenant_a", &fx.stub.embed("bravo"), 5)
        .await
        .expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, document.id);

    let chunks = Chunk::for_document(&fx.db, &document.id)
        .await
        .expect("chunks");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "alpha bravo charlie");
    assert_eq!(chunks[0].ordinal, 0);
}

#[tokio::test]
async fn test_reingestion_is_idempotent() {
    let fx = fixture().await;
    let document = upload(&fx, "tenant_a", b"widget sprocket delta", "text/plain").await;

    drain_pending(&fx.db, &fx.pipeline, &fx.settings)
        .await
        .expect("first run");

    let after_first = get_document(&fx, &document.id).await;
    let chunks_first = Chunk::for_document(&fx.db, &document.id)
        .await
        .expect("chunks");

    // Push the document back through the pipeline as a stale-claim re-run.
    let reclaimed = Document::transition(
        &fx.db,
        &document.id,
        DocumentStatus::Indexed,
        DocumentStatus::Processing,
        TransitionFields {
            claimed_at: Some(Utc::now()),
            ..TransitionFields::default()
        },
    )
    .await
    .expect("requeue");
    fx.pipeline
        .process_document(reclaimed)
        .await
        .expect("second run");

    let after_second = get_document(&fx, &document.id).await;
    assert_eq!(after_second.status, DocumentStatus::Indexed);
    assert_eq!(after_second.chunk_count, after_first.chunk_count);

    let chunks_second = Chunk::for_document(&fx.db, &document.id)
        .await
        .expect("chunks");
    assert_eq!(chunks_second.len(), chunks_first.len());
    let ids_first: Vec<&str> = chunks_first.iter().map(|c| c.id.as_str()).collect();
    let ids_second: Vec<&str> = chunks_second.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids_first, ids_second, "derived chunk ids must be stable");

    assert_eq!(
        fx.index.count("tenant_a").await.expect("count"),
        chunks_second.len(),
        "vector entries must be overwritten, not duplicated"
    );
}

#[tokio::test]
async fn test_multi_page_document_carries_pages() {
    let fx = fixture().await;
    let document = upload(
        &fx,
        "tenant_a",
        b"alpha bravo\x0ccharlie delta\x0cwidget sprocket",
        "text/plain",
    )
    .await;

    drain_pending(&fx.db, &fx.pipeline, &fx.settings)
        .await
        .expect("drain");

    let indexed = get_document(&fx, &document.id).await;
    assert_eq!(indexed.status, DocumentStatus::Indexed);
    assert_eq!(indexed.page_count, Some(3));
    assert_eq!(indexed.chunk_count, Some(3));

    let chunks = Chunk::for_document(&fx.db, &document.id)
        .await
        .expect("chunks");
    let pages: Vec<Option<u32>> = chunks.iter().map(|c| c.page).collect();
    assert_eq!(pages, vec![Some(1), Some(2), Some(3)]);
    let ordinals: Vec<u32> = chunks.iter().map(|c| c.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_unsupported_mime_fails_with_extraction_error() {
    let fx = fixture().await;
    let document = upload(&fx, "tenant_a", b"%PDF-1.7 ...", "application/pdf").await;

    drain_pending(&fx.db, &fx.pipeline, &fx.settings)
        .await
        .expect("drain");

    let failed = get_document(&fx, &document.id).await;
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(
        failed.error.as_ref().map(|e| e.kind),
        Some(IngestErrorKind::Extraction)
    );
    assert!(Chunk::for_document(&fx.db, &document.id)
        .await
        .expect("chunks")
        .is_empty());
    assert_eq!(fx.index.count("tenant_a").await.expect("count"), 0);
}

/// Services whose embedding provider is down.
struct EmbeddingOutage {
    inner: Arc<dyn PipelineServices>,
}

#[async_trait]
impl PipelineServices for EmbeddingOutage {
    async fn load_bytes(&self, document: &Document) -> Result<Bytes, AppError> {
        self.inner.load_bytes(document).await
    }

    async fn extract_text(&self, bytes: &[u8], mime: &str) -> Result<ExtractedText, AppError> {
        self.inner.extract_text(bytes, mime).await
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Err(AppError::ProviderUnavailable(
            "embedding endpoint timed out".into(),
        ))
    }

    fn vector_index(&self) -> &VectorIndex {
        self.inner.vector_index()
    }
}

#[tokio::test]
async fn test_embedding_outage_fails_document_with_embedding_error() {
    let fx = fixture().await;
    let document = upload(&fx, "tenant_a", b"alpha bravo", "text/plain").await;

    let gateway = LlmGateway::stubbed(fx.stub.clone(), LlmSettings::default());
    let services = Arc::new(crate::pipeline::DefaultPipelineServices::new(
        fx.storage.clone(),
        Arc::new(PlainTextExtractor),
        gateway,
        fx.index.clone(),
    ));
    let outage_pipeline = IngestionPipeline::with_services(
        Arc::clone(&fx.db),
        Arc::new(EmbeddingOutage { inner: services }),
        ChunkerSettings::default(),
    );

    drain_pending(&fx.db, &outage_pipeline, &fx.settings)
        .await
        .expect("drain");

    let failed = get_document(&fx, &document.id).await;
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(
        failed.error.as_ref().map(|e| e.kind),
        Some(IngestErrorKind::Embedding)
    );
}

#[tokio::test]
async fn test_index_failure_rolls_back_chunks_before_failing() {
    let fx = fixture().await;
    let document = upload(&fx, "tenant_a", b"alpha bravo charlie", "text/plain").await;

    // An index opened with the wrong dimension rejects every insert, which
    // stands in for an unavailable collection.
    let broken_index = VectorIndex::new(Arc::clone(&fx.db), VOCAB.len() + 1);
    let gateway = LlmGateway::stubbed(fx.stub.clone(), LlmSettings::default());
    let broken_pipeline = IngestionPipeline::new(
        Arc::clone(&fx.db),
        fx.storage.clone(),
        gateway,
        broken_index,
        Arc::new(PlainTextExtractor),
        ChunkerSettings::default(),
    );

    drain_pending(&fx.db, &broken_pipeline, &fx.settings)
        .await
        .expect("drain");

    let failed = get_document(&fx, &document.id).await;
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(
        failed.error.as_ref().map(|e| e.kind),
        Some(IngestErrorKind::Index)
    );

    // No ghost chunks: the rows written before the index failure are gone.
    assert!(Chunk::for_document(&fx.db, &document.id)
        .await
        .expect("chunks")
        .is_empty());
}

#[tokio::test]
async fn test_round_trip_coverage_of_extracted_text() {
    let fx = fixture().await;
    let sentence = "alpha bravo charlie delta widget sprocket again and again. ";
    let body = sentence.repeat(120);
    let document = upload(&fx, "tenant_a", body.as_bytes(), "text/plain").await;

    drain_pending(&fx.db, &fx.pipeline, &fx.settings)
        .await
        .expect("drain");

    let chunks = Chunk::for_document(&fx.db, &document.id)
        .await
        .expect("chunks");
    assert!(!chunks.is_empty());

    // Every chunk is a verbatim slice of the source, and together (overlap
    // included) they cover at least the whole text.
    for chunk in &chunks {
        assert!(body.contains(&chunk.text));
    }
    let total: usize = chunks.iter().map(|c| c.text.len()).sum();
    let whitespace: usize = body.chars().filter(|c| c.is_whitespace()).count();
    assert!(total + whitespace >= body.trim().len());
}

#[tokio::test]
async fn test_orphan_reconciliation_clears_index() {
    let fx = fixture().await;
    let document = upload(&fx, "tenant_a", b"widget sprocket", "text/plain").await;

    drain_pending(&fx.db, &fx.pipeline, &fx.settings)
        .await
        .expect("drain");
    assert_eq!(fx.index.count("tenant_a").await.expect("count"), 1);

    // Park the document as if a delete could not reach the vector index.
    fx.db
        .query("UPDATE type::thing('document', $id) SET status = $orphaned")
        .bind(("id", document.id.clone()))
        .bind(("orphaned", DocumentStatus::Orphaned))
        .await
        .expect("park orphan")
        .check()
        .expect("park orphan check");

    let orphans = Document::list_orphaned(&fx.db).await.expect("list orphans");
    assert_eq!(orphans.len(), 1);

    let orphan = orphans.into_iter().next().expect("one orphan");
    Document::reconcile_orphan(&fx.db, &fx.index, &orphan)
        .await
        .expect("reconcile");

    assert_eq!(fx.index.count("tenant_a").await.expect("count"), 0);
    let gone: Option<Document> = fx.db.get_item(&document.id).await.expect("get");
    assert!(gone.is_none(), "reconciled orphan row must be removed");
}

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, store::StorageManager},
    stored_object,
    vector::VectorIndex,
};

use super::chunk::Chunk;

/// Lifecycle of an uploaded document.
///
/// `Orphaned` is the delete-reconciliation sub-state: the row is parked there
/// when the vector index could not be cleaned up, and a janitor retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Indexed,
    Failed,
    Orphaned,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Orphaned => "orphaned",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestErrorKind {
    Extraction,
    Embedding,
    Index,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestError {
    pub kind: IngestErrorKind,
    pub detail: String,
}

stored_object!(Document, "document", {
    tenant_id: String,
    filename: String,
    mime: String,
    byte_size: u64,
    source_uri: String,
    status: DocumentStatus,
    #[serde(default)]
    page_count: Option<u32>,
    #[serde(default)]
    chunk_count: Option<u32>,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    indexed_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    error: Option<IngestError>
});

/// Optional fields written alongside a status transition.
#[derive(Debug, Default, Clone)]
pub struct TransitionFields {
    pub claimed_at: Option<DateTime<Utc>>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub chunk_count: Option<u32>,
    pub page_count: Option<u32>,
}

/// Attempts against the vector index before a delete parks the row `Orphaned`.
const VECTOR_DELETE_ATTEMPTS: u32 = 3;

impl Document {
    pub fn new(
        tenant_id: String,
        filename: String,
        mime: String,
        byte_size: u64,
        source_uri: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            filename,
            mime,
            byte_size,
            source_uri,
            status: DocumentStatus::Uploading,
            page_count: None,
            chunk_count: None,
            indexed_at: None,
            claimed_at: None,
            error: None,
        }
    }

    /// Fetch a document, enforcing tenant ownership. Orphaned rows are
    /// invisible to callers; they only exist for the janitor.
    pub async fn get_scoped(
        db: &SurrealDbClient,
        tenant_id: &str,
        id: &str,
    ) -> Result<Self, AppError> {
        let doc: Self = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

        if doc.tenant_id != tenant_id {
            return Err(AppError::Auth(
                "You don't have access to this document".to_string(),
            ));
        }

        if doc.status == DocumentStatus::Orphaned {
            return Err(AppError::NotFound("Document not found".to_string()));
        }

        Ok(doc)
    }

    pub async fn list(
        db: &SurrealDbClient,
        tenant_id: &str,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<Self>, AppError> {
        let sql = format!(
            "SELECT * FROM {table} WHERE tenant_id = $tenant_id AND status != $orphaned \
             ORDER BY created_at DESC LIMIT {limit} START {skip}",
            table = Self::table_name(),
        );

        let docs: Vec<Self> = db
            .query(sql)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("orphaned", DocumentStatus::Orphaned))
            .await?
            .take(0)?;

        Ok(docs)
    }

    /// Compare-and-set status transition. Fails with `StateConflict` when the
    /// current status no longer matches `from` — this gate is the concurrency
    /// control for ingestion.
    pub async fn transition(
        db: &SurrealDbClient,
        id: &str,
        from: DocumentStatus,
        to: DocumentStatus,
        fields: TransitionFields,
    ) -> Result<Self, AppError> {
        let mut sql = String::from(
            "UPDATE type::thing('document', $id) SET status = $to, updated_at = time::now()",
        );
        if fields.claimed_at.is_some() {
            sql.push_str(", claimed_at = $claimed_at");
        }
        if fields.indexed_at.is_some() {
            sql.push_str(", indexed_at = $indexed_at");
        }
        if fields.chunk_count.is_some() {
            sql.push_str(", chunk_count = $chunk_count");
        }
        if fields.page_count.is_some() {
            sql.push_str(", page_count = $page_count");
        }
        sql.push_str(" WHERE status = $from RETURN AFTER");

        let mut query = db
            .query(sql)
            .bind(("id", id.to_string()))
            .bind(("from", from))
            .bind(("to", to));
        if let Some(ts) = fields.claimed_at {
            query = query.bind(("claimed_at", surrealdb::sql::Datetime::from(ts)));
        }
        if let Some(ts) = fields.indexed_at {
            query = query.bind(("indexed_at", surrealdb::sql::Datetime::from(ts)));
        }
        if let Some(count) = fields.chunk_count {
            query = query.bind(("chunk_count", count));
        }
        if let Some(count) = fields.page_count {
            query = query.bind(("page_count", count));
        }

        let updated: Vec<Self> = query.await?.take(0)?;

        updated.into_iter().next().ok_or_else(|| {
            AppError::StateConflict(format!("document {id} is no longer {from}"))
        })
    }

    /// Idempotent terminal failure. A document that already reached `Indexed`
    /// is left alone.
    pub async fn set_failed(
        db: &SurrealDbClient,
        id: &str,
        kind: IngestErrorKind,
        detail: impl Into<String>,
    ) -> Result<(), AppError> {
        let error = IngestError {
            kind,
            detail: detail.into(),
        };

        db.query(
            "UPDATE type::thing('document', $id) \
             SET status = $failed, error = $error, updated_at = time::now() \
             WHERE status != $indexed",
        )
        .bind(("id", id.to_string()))
        .bind(("failed", DocumentStatus::Failed))
        .bind(("error", error))
        .bind(("indexed", DocumentStatus::Indexed))
        .await?
        .check()?;

        Ok(())
    }

    /// Claim the next document waiting for ingestion, or take over a stale
    /// `Processing` claim whose worker stopped heartbeating. Exactly one
    /// caller wins each claim; everyone else observes the CAS miss.
    pub async fn claim_next(
        db: &SurrealDbClient,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Self>, AppError> {
        let waiting: Vec<Self> = db
            .query(format!(
                "SELECT * FROM {table} WHERE status = $uploading ORDER BY created_at ASC LIMIT 1",
                table = Self::table_name(),
            ))
            .bind(("uploading", DocumentStatus::Uploading))
            .await?
            .take(0)?;

        if let Some(doc) = waiting.into_iter().next() {
            match Self::transition(
                db,
                &doc.id,
                DocumentStatus::Uploading,
                DocumentStatus::Processing,
                TransitionFields {
                    claimed_at: Some(now),
                    ..TransitionFields::default()
                },
            )
            .await
            {
                Ok(claimed) => return Ok(Some(claimed)),
                // Another worker won the claim; fall through to stale scan.
                Err(AppError::StateConflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let stale: Vec<Self> = db
            .query(format!(
                "SELECT * FROM {table} WHERE status = $processing AND claimed_at != NONE \
                 AND claimed_at < $stale_before ORDER BY claimed_at ASC LIMIT 1",
                table = Self::table_name(),
            ))
            .bind(("processing", DocumentStatus::Processing))
            .bind(("stale_before", surrealdb::sql::Datetime::from(stale_before)))
            .await?
            .take(0)?;

        if let Some(doc) = stale.into_iter().next() {
            if let Some(expected) = doc.claimed_at {
                match Self::reclaim(db, &doc.id, expected, now).await {
                    Ok(reclaimed) => return Ok(Some(reclaimed)),
                    Err(AppError::StateConflict(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(None)
    }

    /// Take over a stale `Processing` claim via CAS on `claimed_at`. The
    /// status stays `Processing`; only the claim timestamp advances.
    pub async fn reclaim(
        db: &SurrealDbClient,
        id: &str,
        expected_claimed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let updated: Vec<Self> = db
            .query(
                "UPDATE type::thing('document', $id) \
                 SET claimed_at = $now, updated_at = time::now() \
                 WHERE status = $processing AND claimed_at = $expected RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .bind(("processing", DocumentStatus::Processing))
            .bind((
                "expected",
                surrealdb::sql::Datetime::from(expected_claimed_at),
            ))
            .await?
            .take(0)?;

        updated.into_iter().next().ok_or_else(|| {
            AppError::StateConflict(format!("document {id} claim was taken by another worker"))
        })
    }

    /// Delete a document with its chunks and vector entries. Idempotent.
    ///
    /// Chunk rows go first, then the vector entries with bounded retries. If
    /// the index cannot be cleaned up the row is parked `Orphaned` instead of
    /// being removed, and the janitor finishes the job later; either way the
    /// document is gone from every caller-visible read.
    pub async fn delete(
        db: &SurrealDbClient,
        index: &VectorIndex,
        storage: &StorageManager,
        tenant_id: &str,
        id: &str,
    ) -> Result<(), AppError> {
        let doc: Option<Self> = db.get_item(id).await?;
        let Some(doc) = doc else {
            return Ok(());
        };

        if doc.tenant_id != tenant_id {
            return Err(AppError::Auth(
                "You don't have access to this document".to_string(),
            ));
        }

        Chunk::delete_by_document(db, &doc.id).await?;

        let mut vector_clean = false;
        let mut backoff = Duration::from_millis(50);
        for attempt in 0..VECTOR_DELETE_ATTEMPTS {
            match index.delete_by_document(tenant_id, &doc.id).await {
                Ok(_) => {
                    vector_clean = true;
                    break;
                }
                Err(err) => {
                    warn!(
                        document_id = %doc.id,
                        attempt = attempt + 1,
                        error = %err,
                        "vector delete failed during document removal"
                    );
                    sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }

        if vector_clean {
            let _removed: Option<Self> = db.delete_item(&doc.id).await?;
        } else {
            // Park for the janitor; the row stays invisible to list/get.
            db.query(
                "UPDATE type::thing('document', $id) \
                 SET status = $orphaned, updated_at = time::now()",
            )
            .bind(("id", doc.id.clone()))
            .bind(("orphaned", DocumentStatus::Orphaned))
            .await?
            .check()?;
        }

        if let Err(err) = storage.delete(&doc.source_uri).await {
            warn!(document_id = %doc.id, error = %err, "failed to delete document bytes");
        }

        Ok(())
    }

    /// Orphaned rows across all tenants, for the janitor.
    pub async fn list_orphaned(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let docs: Vec<Self> = db
            .query(format!(
                "SELECT * FROM {table} WHERE status = $orphaned",
                table = Self::table_name(),
            ))
            .bind(("orphaned", DocumentStatus::Orphaned))
            .await?
            .take(0)?;

        Ok(docs)
    }

    /// Retry the vector cleanup for an orphaned row; drops the row once the
    /// index is clean.
    pub async fn reconcile_orphan(
        db: &SurrealDbClient,
        index: &VectorIndex,
        doc: &Self,
    ) -> Result<(), AppError> {
        index.delete_by_document(&doc.tenant_id, &doc.id).await?;
        let _removed: Option<Self> = db.delete_item(&doc.id).await?;
        Ok(())
    }
}

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient};

/// Candidate pool width for the HNSW scan, beyond `k`.
const KNN_EF: usize = 100;

/// One embedding with the metadata needed to reconcile it against the
/// document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    #[serde(default)]
    pub page: Option<u32>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub page: Option<u32>,
    pub score: f32,
}

/// Row shape written to the embedding table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingRow {
    chunk_id: String,
    tenant_id: String,
    document_id: String,
    ordinal: u32,
    #[serde(default)]
    page: Option<u32>,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct HitRow {
    chunk_id: String,
    tenant_id: String,
    document_id: String,
    ordinal: u32,
    #[serde(default)]
    page: Option<u32>,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: usize,
}

const EMBEDDING_TABLE: &str = "chunk_embedding";

/// Per-tenant vector collection backed by a SurrealDB HNSW index.
///
/// Callers never see the query language; they see insert/delete/query scoped
/// by tenant. Entries of different tenants share a table but no query path
/// can cross the tenant filter, and `query` re-verifies every hit.
#[derive(Clone)]
pub struct VectorIndex {
    db: Arc<SurrealDbClient>,
    dimension: usize,
}

impl VectorIndex {
    pub fn new(db: Arc<SurrealDbClient>, dimension: usize) -> Self {
        Self { db, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert entries atomically; a duplicate `chunk_id` overwrites.
    pub async fn insert(&self, tenant_id: &str, entries: Vec<VectorEntry>) -> Result<(), AppError> {
        for entry in &entries {
            if entry.embedding.len() != self.dimension {
                // Assertion failure, not a user error: a mismatched vector
                // must never reach the collection.
                return Err(AppError::InternalError(format!(
                    "embedding dimension {} does not match collection dimension {}",
                    entry.embedding.len(),
                    self.dimension
                )));
            }
        }

        if entries.is_empty() {
            return Ok(());
        }

        let rows: Vec<EmbeddingRow> = entries
            .into_iter()
            .map(|entry| EmbeddingRow {
                chunk_id: entry.chunk_id,
                tenant_id: tenant_id.to_string(),
                document_id: entry.document_id,
                ordinal: entry.ordinal,
                page: entry.page,
                embedding: entry.embedding,
            })
            .collect();

        let response = self
            .db
            .client
            .query("BEGIN TRANSACTION;")
            .query(format!(
                "FOR $row IN $rows {{ UPSERT type::thing('{EMBEDDING_TABLE}', $row.chunk_id) CONTENT $row; }};"
            ))
            .query("COMMIT TRANSACTION;")
            .bind(("rows", rows))
            .await
            .map_err(|e| AppError::IndexUnavailable(e.to_string()))?;

        response
            .check()
            .map_err(|e| AppError::IndexUnavailable(e.to_string()))?;

        Ok(())
    }

    /// Remove every entry of a document; returns how many were removed.
    pub async fn delete_by_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct Removed {
            #[allow(dead_code)]
            chunk_id: String,
        }

        let mut response = self
            .db
            .query(format!(
                "DELETE {EMBEDDING_TABLE} \
                 WHERE tenant_id = $tenant_id AND document_id = $document_id \
                 RETURN BEFORE"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("document_id", document_id.to_string()))
            .await
            .map_err(|e| AppError::IndexUnavailable(e.to_string()))?;

        let removed: Vec<Removed> = response
            .take(0)
            .map_err(|e| AppError::IndexCorrupt(e.to_string()))?;

        Ok(removed.len())
    }

    /// Top-k cosine similarity within the tenant's entries. Ties are broken
    /// by ascending ordinal, then document id, so results are deterministic.
    pub async fn query(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, AppError> {
        if embedding.len() != self.dimension {
            return Err(AppError::InternalError(format!(
                "query embedding dimension {} does not match collection dimension {}",
                embedding.len(),
                self.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT
                chunk_id,
                tenant_id,
                document_id,
                ordinal,
                page,
                vector::similarity::cosine(embedding, $embedding) AS score
            FROM {EMBEDDING_TABLE}
            WHERE tenant_id = $tenant_id
              AND embedding <|{k},{KNN_EF}|> $embedding
            ORDER BY score DESC
            LIMIT {k};
            "#
        );

        let mut response = self
            .db
            .query(&sql)
            .bind(("embedding", embedding.to_vec()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(|e| AppError::IndexUnavailable(e.to_string()))?;

        let rows: Vec<HitRow> = response
            .take(0)
            .map_err(|e| AppError::IndexCorrupt(e.to_string()))?;

        // A hit outside the tenant means the filter itself is broken; that
        // must never silently contaminate a response.
        if let Some(stray) = rows.iter().find(|row| row.tenant_id != tenant_id) {
            return Err(AppError::InternalError(format!(
                "vector query for tenant {tenant_id} returned entry of tenant {}",
                stray.tenant_id
            )));
        }

        let mut hits: Vec<VectorHit> = rows
            .into_iter()
            .map(|row| VectorHit {
                chunk_id: row.chunk_id,
                document_id: row.document_id,
                ordinal: row.ordinal,
                page: row.page,
                score: row.score,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    pub async fn count(&self, tenant_id: &str) -> Result<usize, AppError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT count() FROM {EMBEDDING_TABLE} WHERE tenant_id = $tenant_id GROUP ALL"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(|e| AppError::IndexUnavailable(e.to_string()))?;

        let rows: Vec<CountRow> = response
            .take(0)
            .map_err(|e| AppError::IndexCorrupt(e.to_string()))?;

        Ok(rows.first().map_or(0, |row| row.count))
    }

    /// Drop every entry of a tenant. Administrative path.
    pub async fn reset(&self, tenant_id: &str) -> Result<(), AppError> {
        self.db
            .query(format!(
                "DELETE {EMBEDDING_TABLE} WHERE tenant_id = $tenant_id"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(|e| AppError::IndexUnavailable(e.to_string()))?
            .check()
            .map_err(|e| AppError::IndexUnavailable(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DIM: usize = 3;

    async fn test_index() -> VectorIndex {
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", &database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(DIM).await.expect("init indexes");
        VectorIndex::new(Arc::new(db), DIM)
    }

    fn entry(chunk_id: &str, document_id: &str, ordinal: u32, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            ordinal,
            page: None,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_insert_and_query_ranks_by_similarity() {
        let index = test_index().await;

        index
            .insert(
                "tenant_a",
                vec![
                    entry("c1", "d1", 0, vec![1.0, 0.0, 0.0]),
                    entry("c2", "d1", 1, vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .expect("insert");

        let hits = index
            .query("tenant_a", &[0.0, 1.0, 0.0], 2)
            .await
            .expect("query");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "c2");
        assert_eq!(hits[1].chunk_id, "c1");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_query_never_returns_other_tenants_entries() {
        let index = test_index().await;

        index
            .insert("tenant_a", vec![entry("a1", "da", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("insert a");
        index
            .insert("tenant_b", vec![entry("b1", "db", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("insert b");

        let hits = index
            .query("tenant_a", &[1.0, 0.0, 0.0], 10)
            .await
            .expect("query");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "a1");

        let hits_b = index
            .query("tenant_b", &[1.0, 0.0, 0.0], 10)
            .await
            .expect("query b");
        assert_eq!(hits_b.len(), 1);
        assert_eq!(hits_b[0].chunk_id, "b1");
    }

    #[tokio::test]
    async fn test_duplicate_chunk_id_overwrites() {
        let index = test_index().await;

        index
            .insert("tenant_a", vec![entry("c1", "d1", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("first insert");
        index
            .insert("tenant_a", vec![entry("c1", "d1", 0, vec![0.0, 0.0, 1.0])])
            .await
            .expect("overwrite");

        assert_eq!(index.count("tenant_a").await.expect("count"), 1);

        let hits = index
            .query("tenant_a", &[0.0, 0.0, 1.0], 1)
            .await
            .expect("query");
        assert_eq!(hits[0].chunk_id, "c1");
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn test_delete_by_document_removes_all_and_counts() {
        let index = test_index().await;

        index
            .insert(
                "tenant_a",
                vec![
                    entry("c1", "d1", 0, vec![1.0, 0.0, 0.0]),
                    entry("c2", "d1", 1, vec![0.0, 1.0, 0.0]),
                    entry("c3", "d2", 0, vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .expect("insert");

        let removed = index
            .delete_by_document("tenant_a", "d1")
            .await
            .expect("delete");
        assert_eq!(removed, 2);
        assert_eq!(index.count("tenant_a").await.expect("count"), 1);

        // Deleting again removes nothing.
        let removed_again = index
            .delete_by_document("tenant_a", "d1")
            .await
            .expect("delete again");
        assert_eq!(removed_again, 0);
    }

    #[tokio::test]
    async fn test_delete_by_document_is_tenant_scoped() {
        let index = test_index().await;

        index
            .insert("tenant_a", vec![entry("a1", "shared", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("insert a");
        index
            .insert("tenant_b", vec![entry("b1", "shared", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("insert b");

        let removed = index
            .delete_by_document("tenant_a", "shared")
            .await
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(index.count("tenant_b").await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let index = test_index().await;

        let bad_insert = index
            .insert("tenant_a", vec![entry("c1", "d1", 0, vec![1.0, 0.0])])
            .await;
        assert!(matches!(bad_insert, Err(AppError::InternalError(_))));

        let bad_query = index.query("tenant_a", &[1.0, 0.0], 5).await;
        assert!(matches!(bad_query, Err(AppError::InternalError(_))));
    }

    #[tokio::test]
    async fn test_reset_clears_only_the_tenant() {
        let index = test_index().await;

        index
            .insert("tenant_a", vec![entry("a1", "d1", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("insert a");
        index
            .insert("tenant_b", vec![entry("b1", "d2", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("insert b");

        index.reset("tenant_a").await.expect("reset");

        assert_eq!(index.count("tenant_a").await.expect("count a"), 0);
        assert_eq!(index.count("tenant_b").await.expect("count b"), 1);
    }

    #[tokio::test]
    async fn test_tie_break_orders_by_ordinal_then_document() {
        let index = test_index().await;

        // Identical vectors produce identical scores; ordering must still be
        // deterministic.
        index
            .insert(
                "tenant_a",
                vec![
                    entry("c-late", "d2", 5, vec![1.0, 0.0, 0.0]),
                    entry("c-early", "d1", 1, vec![1.0, 0.0, 0.0]),
                    entry("c-mid", "d1", 3, vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .expect("insert");

        let hits = index
            .query("tenant_a", &[1.0, 0.0, 0.0], 3)
            .await
            .expect("query");

        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c-early", "c-mid", "c-late"]);
    }
}

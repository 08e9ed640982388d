use sha2::{Digest, Sha256};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Chunk, "chunk", {
    document_id: String,
    tenant_id: String,
    ordinal: u32,
    text: String,
    #[serde(default)]
    page: Option<u32>
});

impl Chunk {
    /// Chunk ids are derived from `(document_id, ordinal)` so the document
    /// store and the vector index can be reconciled without back-pointers,
    /// and so re-ingestion overwrites instead of duplicating.
    pub fn derive_id(document_id: &str, ordinal: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        hasher.update(b":");
        hasher.update(ordinal.to_be_bytes());
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(32);
        hex
    }

    pub fn new(
        document_id: String,
        tenant_id: String,
        ordinal: u32,
        text: String,
        page: Option<u32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::derive_id(&document_id, ordinal),
            created_at: now,
            updated_at: now,
            document_id,
            tenant_id,
            ordinal,
            text,
            page,
        }
    }

    /// Replace every chunk of a document in a single transaction.
    pub async fn replace_for_document(
        db: &SurrealDbClient,
        document_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<(), AppError> {
        let response = db
            .client
            .query("BEGIN TRANSACTION;")
            .query(format!(
                "DELETE {table} WHERE document_id = $document_id;",
                table = Self::table_name(),
            ))
            .query(format!(
                "FOR $chunk IN $chunks {{ CREATE type::thing('{table}', $chunk.id) CONTENT $chunk; }};",
                table = Self::table_name(),
            ))
            .query("COMMIT TRANSACTION;")
            .bind(("document_id", document_id.to_string()))
            .bind(("chunks", chunks))
            .await
            .map_err(AppError::Database)?;

        response.check().map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn delete_by_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<(), AppError> {
        db.query(format!(
            "DELETE {table} WHERE document_id = $document_id",
            table = Self::table_name(),
        ))
        .bind(("document_id", document_id.to_string()))
        .await?
        .check()?;

        Ok(())
    }

    /// Batched read used to hydrate retrieval hits. Tenant-scoped; missing
    /// ids are simply absent from the result.
    pub async fn get_many(
        db: &SurrealDbClient,
        tenant_id: &str,
        ids: &[String],
    ) -> Result<Vec<Self>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<Self> = db
            .query(format!(
                "SELECT * FROM {table} WHERE tenant_id = $tenant_id AND record::id(id) IN $ids",
                table = Self::table_name(),
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("ids", ids.to_vec()))
            .await?
            .take(0)?;

        Ok(chunks)
    }

    /// Every chunk of a document in reading order.
    pub async fn for_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .query(format!(
                "SELECT * FROM {table} WHERE document_id = $document_id ORDER BY ordinal ASC",
                table = Self::table_name(),
            ))
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;

        Ok(chunks)
    }
}

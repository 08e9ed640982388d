use super::types::StoredObject;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    /// Connect, authenticate and select the namespace/database pair.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Define the indexes the platform queries against.
    ///
    /// `embedding_dimension` must match the configured provider; the HNSW
    /// index rejects vectors of any other length.
    pub async fn ensure_initialized(&self, embedding_dimension: usize) -> Result<(), Error> {
        self.client
            .query(format!(
                "DEFINE INDEX OVERWRITE idx_chunk_embedding ON chunk_embedding FIELDS embedding HNSW DIMENSION {embedding_dimension}"
            ))
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_document_tenant ON document FIELDS tenant_id, created_at")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_document_status ON document FIELDS status")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_document ON chunk FIELDS document_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_session_tenant ON session FIELDS tenant_id, created_at")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_session_status ON session FIELDS tenant_id, status")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_talk_point_tenant ON talk_point FIELDS tenant_id, created_at")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_evaluation_session ON evaluation FIELDS session_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_profile_tenant ON company_profile FIELDS tenant_id")
            .await?;

        Ok(())
    }

    /// Store an object, keyed by its id. Requires `StoredObject`.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Retrieve a single object by its id.
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Delete a single object by its id, returning the removed row.
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Retrieve every row of an object's table.
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(CompanyProfile, "company_profile", {
    tenant_id: String,
    name: String,
    description: String,
    value_proposition: String,
    industry: String
});

impl CompanyProfile {
    /// One profile per tenant; the row id is the tenant id.
    pub fn new(
        tenant_id: String,
        name: String,
        description: String,
        value_proposition: String,
        industry: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: tenant_id.clone(),
            created_at: now,
            updated_at: now,
            tenant_id,
            name,
            description,
            value_proposition,
            industry,
        }
    }

    pub async fn upsert(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query(format!(
            "UPSERT type::thing('{table}', $id) CONTENT $profile",
            table = Self::table_name(),
        ))
        .bind(("id", self.id.clone()))
        .bind(("profile", self.clone()))
        .await?
        .check()?;

        Ok(())
    }

    pub async fn get_by_tenant(
        db: &SurrealDbClient,
        tenant_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let profile: Option<Self> = db.get_item(tenant_id).await?;
        Ok(profile)
    }
}

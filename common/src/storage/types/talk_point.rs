use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::session::DealStage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectionResponse {
    pub objection: String,
    pub response: String,
}

/// The seven fixed sections of a talk-point artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TalkPointContent {
    pub opening_hook: String,
    pub problem_statement: String,
    pub solution_overview: String,
    pub key_benefits: String,
    pub proof_points: String,
    pub objection_handling: Vec<ObjectionResponse>,
    pub call_to_action: String,
}

impl TalkPointContent {
    /// Every section must carry content; objection handling needs at least
    /// one complete pair.
    pub fn validate(&self) -> Result<(), AppError> {
        let sections = [
            ("opening_hook", &self.opening_hook),
            ("problem_statement", &self.problem_statement),
            ("solution_overview", &self.solution_overview),
            ("key_benefits", &self.key_benefits),
            ("proof_points", &self.proof_points),
            ("call_to_action", &self.call_to_action),
        ];
        for (name, value) in sections {
            if value.trim().is_empty() {
                return Err(AppError::ProviderInvalid(format!(
                    "talk point section '{name}' is empty"
                )));
            }
        }

        if self.objection_handling.is_empty() {
            return Err(AppError::ProviderInvalid(
                "talk point objection_handling is empty".to_string(),
            ));
        }
        for pair in &self.objection_handling {
            if pair.objection.trim().is_empty() || pair.response.trim().is_empty() {
                return Err(AppError::ProviderInvalid(
                    "talk point objection_handling has an empty entry".to_string(),
                ));
            }
        }

        Ok(())
    }
}

stored_object!(TalkPointArtifact, "talk_point", {
    tenant_id: String,
    topic: String,
    #[serde(default)]
    customer_context: Option<String>,
    #[serde(default)]
    deal_stage: Option<DealStage>,
    content: TalkPointContent,
    sources_used: u32
});

impl TalkPointArtifact {
    pub fn new(
        tenant_id: String,
        topic: String,
        customer_context: Option<String>,
        deal_stage: Option<DealStage>,
        content: TalkPointContent,
        sources_used: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            topic,
            customer_context,
            deal_stage,
            content,
            sources_used,
        }
    }

    pub async fn get_scoped(
        db: &SurrealDbClient,
        tenant_id: &str,
        id: &str,
    ) -> Result<Self, AppError> {
        let artifact: Self = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Talk point not found".to_string()))?;

        if artifact.tenant_id != tenant_id {
            return Err(AppError::Auth(
                "You don't have access to this talk point".to_string(),
            ));
        }

        Ok(artifact)
    }

    pub async fn list(db: &SurrealDbClient, tenant_id: &str) -> Result<Vec<Self>, AppError> {
        let artifacts: Vec<Self> = db
            .query(format!(
                "SELECT * FROM {table} WHERE tenant_id = $tenant_id ORDER BY created_at DESC",
                table = Self::table_name(),
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .await?
            .take(0)?;

        Ok(artifacts)
    }

    /// Delete with tenant scoping; deleting a missing artifact is a no-op.
    pub async fn delete_scoped(
        db: &SurrealDbClient,
        tenant_id: &str,
        id: &str,
    ) -> Result<(), AppError> {
        let artifact: Option<Self> = db.get_item(id).await?;
        let Some(artifact) = artifact else {
            return Ok(());
        };

        if artifact.tenant_id != tenant_id {
            return Err(AppError::Auth(
                "You don't have access to this talk point".to_string(),
            ));
        }

        let _removed: Option<Self> = db.delete_item(id).await?;
        Ok(())
    }
}

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Numeric scoring across the six coaching dimensions, each in `0..=100`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionScores {
    pub product_knowledge: u8,
    pub customer_understanding: u8,
    pub objection_handling: u8,
    pub value_communication: u8,
    pub question_quality: u8,
    pub confidence_delivery: u8,
}

impl DimensionScores {
    fn values(&self) -> [u8; 6] {
        [
            self.product_knowledge,
            self.customer_understanding,
            self.objection_handling,
            self.value_communication,
            self.question_quality,
            self.confidence_delivery,
        ]
    }

    pub fn min(&self) -> u8 {
        self.values().into_iter().min().unwrap_or(0)
    }

    pub fn max(&self) -> u8 {
        self.values().into_iter().max().unwrap_or(0)
    }

    /// Rounded mean of the six dimensions; always within `[min, max]`.
    pub fn rounded_mean(&self) -> u8 {
        let sum: u32 = self.values().into_iter().map(u32::from).sum();
        let mean = (sum + 3) / 6;
        u8::try_from(mean).unwrap_or(100)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.values().into_iter().any(|v| v > 100) {
            return Err(AppError::ProviderInvalid(
                "dimension score out of the 0..=100 range".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualitativeGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Qualitative flags produced only for sales sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SalesSpecific {
    pub knowledge_base_usage: QualitativeGrade,
    pub stage_appropriateness: QualitativeGrade,
    pub personalization: QualitativeGrade,
}

stored_object!(Evaluation, "evaluation", {
    session_id: String,
    tenant_id: String,
    dimension_scores: DimensionScores,
    #[serde(default)]
    sales_specific: Option<SalesSpecific>,
    overall_score: u8,
    strengths: Vec<String>,
    improvement_areas: Vec<String>,
    summary: String
});

impl Evaluation {
    /// One evaluation per session: the row id is the session id, so a
    /// regeneration replaces the prior evaluation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        tenant_id: String,
        dimension_scores: DimensionScores,
        sales_specific: Option<SalesSpecific>,
        strengths: Vec<String>,
        improvement_areas: Vec<String>,
        summary: String,
    ) -> Self {
        let now = Utc::now();
        let overall_score = dimension_scores.rounded_mean();
        Self {
            id: session_id.clone(),
            created_at: now,
            updated_at: now,
            session_id,
            tenant_id,
            dimension_scores,
            sales_specific,
            overall_score,
            strengths,
            improvement_areas,
            summary,
        }
    }

    pub async fn upsert(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query(format!(
            "UPSERT type::thing('{table}', $id) CONTENT $evaluation",
            table = Self::table_name(),
        ))
        .bind(("id", self.id.clone()))
        .bind(("evaluation", self.clone()))
        .await?
        .check()?;

        Ok(())
    }

    pub async fn get_by_session(
        db: &SurrealDbClient,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Self, AppError> {
        let evaluation: Self = db
            .get_item(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Evaluation not found".to_string()))?;

        if evaluation.tenant_id != tenant_id {
            return Err(AppError::Auth(
                "You don't have access to this evaluation".to_string(),
            ));
        }

        Ok(evaluation)
    }
}

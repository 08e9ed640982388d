use std::fmt::Write;
use std::sync::Arc;

use common::{
    error::AppError,
    llm::{ChatMessage, LlmGateway},
    storage::{
        db::SurrealDbClient,
        types::{
            evaluation::{DimensionScores, Evaluation, SalesSpecific},
            session::{format_transcript, PreparationType, Session, SessionStatus},
        },
    },
};
use serde::Deserialize;
use tracing::instrument;

use crate::schemas::{general_evaluation_schema, sales_evaluation_schema};

const EVALUATION_SYSTEM_MESSAGE: &str =
    "You are a sales coach scoring a practice conversation. The salesperson's \
     lines are marked User; the simulated customer's lines are marked \
     Assistant. Score each dimension from 0 to 100, list concrete strengths \
     and improvement areas (at least one of each), and write a short summary \
     addressed to the salesperson.";

#[derive(Debug, Deserialize)]
struct SalesDraft {
    dimension_scores: DimensionScores,
    sales_specific: SalesSpecific,
    strengths: Vec<String>,
    improvement_areas: Vec<String>,
    summary: String,
}

#[derive(Debug, Deserialize)]
struct GeneralDraft {
    dimension_scores: DimensionScores,
    strengths: Vec<String>,
    improvement_areas: Vec<String>,
    summary: String,
}

/// End-of-session structured scoring. One evaluation per session;
/// regeneration replaces the previous one.
#[derive(Clone)]
pub struct Evaluator {
    db: Arc<SurrealDbClient>,
    gateway: LlmGateway,
}

impl Evaluator {
    pub fn new(db: Arc<SurrealDbClient>, gateway: LlmGateway) -> Self {
        Self { db, gateway }
    }

    #[instrument(skip_all, fields(tenant_id = %tenant_id, session_id = %session_id))]
    pub async fn evaluate(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Evaluation, AppError> {
        let session = Session::get_scoped(&self.db, tenant_id, session_id).await?;
        if session.status != SessionStatus::Completed {
            return Err(AppError::StateConflict(
                "only a completed session can be evaluated".to_string(),
            ));
        }

        let messages = [
            ChatMessage::system(EVALUATION_SYSTEM_MESSAGE),
            ChatMessage::user(render_session(&session)),
        ];

        let evaluation = match session.preparation_type {
            PreparationType::Sales => {
                let draft: SalesDraft = self
                    .gateway
                    .complete_json(
                        &messages,
                        "sales_evaluation",
                        "Multi-dimensional sales session evaluation",
                        sales_evaluation_schema(),
                    )
                    .await?;
                validate_draft(&draft.dimension_scores, &draft.strengths, &draft.improvement_areas)?;

                Evaluation::new(
                    session.id.clone(),
                    tenant_id.to_string(),
                    draft.dimension_scores,
                    Some(draft.sales_specific),
                    draft.strengths,
                    draft.improvement_areas,
                    draft.summary,
                )
            }
            PreparationType::General => {
                let draft: GeneralDraft = self
                    .gateway
                    .complete_json(
                        &messages,
                        "session_evaluation",
                        "Multi-dimensional practice session evaluation",
                        general_evaluation_schema(),
                    )
                    .await?;
                validate_draft(&draft.dimension_scores, &draft.strengths, &draft.improvement_areas)?;

                Evaluation::new(
                    session.id.clone(),
                    tenant_id.to_string(),
                    draft.dimension_scores,
                    None,
                    draft.strengths,
                    draft.improvement_areas,
                    draft.summary,
                )
            }
        };

        evaluation.upsert(&self.db).await?;

        Ok(evaluation)
    }

    pub async fn get(&self, tenant_id: &str, session_id: &str) -> Result<Evaluation, AppError> {
        Evaluation::get_by_session(&self.db, tenant_id, session_id).await
    }
}

fn validate_draft(
    scores: &DimensionScores,
    strengths: &[String],
    improvement_areas: &[String],
) -> Result<(), AppError> {
    scores.validate()?;

    if strengths.iter().all(|s| s.trim().is_empty()) {
        return Err(AppError::ProviderInvalid(
            "evaluation carried no strengths".to_string(),
        ));
    }
    if improvement_areas.iter().all(|s| s.trim().is_empty()) {
        return Err(AppError::ProviderInvalid(
            "evaluation carried no improvement areas".to_string(),
        ));
    }

    Ok(())
}

fn render_session(session: &Session) -> String {
    let payload = &session.context_payload;
    let mut rendered = String::from("Session context:\n");

    if let Some(name) = payload.customer_name.as_deref() {
        let _ = writeln!(rendered, "Customer: {name}");
    }
    if let Some(persona) = payload.customer_persona.as_deref() {
        let _ = writeln!(rendered, "Persona: {persona}");
    }
    if let Some(stage) = payload.deal_stage {
        let _ = writeln!(rendered, "Deal stage: {stage}");
    }
    if let Some(topic) = payload.topic.as_deref() {
        let _ = writeln!(rendered, "Topic: {topic}");
    }

    rendered.push_str("\nTranscript:\n");
    rendered.push_str(&format_transcript(&session.transcript));
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::llm::stub::StubBackend;
    use common::storage::types::session::{ContextPayload, DealStage, TranscriptTurn};
    use common::utils::config::LlmSettings;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        db: Arc<SurrealDbClient>,
        evaluator: Evaluator,
        stub: StubBackend,
    }

    async fn fixture() -> Fixture {
        let database = Uuid::new_v4().to_string();
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        );

        let stub = StubBackend::with_vocab(&["alpha"]);
        let gateway = LlmGateway::stubbed(stub.clone(), LlmSettings::default());
        let evaluator = Evaluator::new(Arc::clone(&db), gateway);

        Fixture {
            db,
            evaluator,
            stub,
        }
    }

    async fn completed_sales_session(fx: &Fixture, tenant: &str) -> Session {
        let mut session = Session::new(
            tenant.to_string(),
            PreparationType::Sales,
            ContextPayload {
                customer_name: Some("Acme".to_string()),
                customer_persona: Some("Skeptical CTO".to_string()),
                deal_stage: Some(DealStage::Negotiation),
                topic: None,
            },
        );
        for index in 0..4 {
            session
                .transcript
                .push(TranscriptTurn::user(format!("pitch line {index}")));
            session.transcript.push(TranscriptTurn::assistant(
                format!("customer pushback {index}"),
                vec![],
            ));
        }
        session.status = SessionStatus::Completed;
        fx.db.store_item(session.clone()).await.expect("store");
        session
    }

    fn sales_draft_json(scores: [u8; 6]) -> serde_json::Value {
        json!({
            "dimension_scores": {
                "product_knowledge": scores[0],
                "customer_understanding": scores[1],
                "objection_handling": scores[2],
                "value_communication": scores[3],
                "question_quality": scores[4],
                "confidence_delivery": scores[5]
            },
            "sales_specific": {
                "knowledge_base_usage": "GOOD",
                "stage_appropriateness": "EXCELLENT",
                "personalization": "FAIR"
            },
            "strengths": ["handled the pricing objection directly"],
            "improvement_areas": ["cite the SLA numbers instead of paraphrasing"],
            "summary": "Strong middle game, weak close."
        })
    }

    #[tokio::test]
    async fn test_evaluate_completed_sales_session() {
        let fx = fixture().await;
        let session = completed_sales_session(&fx, "tenant_a").await;
        fx.stub.push_json(sales_draft_json([80, 70, 90, 60, 75, 85]));

        let evaluation = fx
            .evaluator
            .evaluate("tenant_a", &session.id)
            .await
            .expect("evaluate");

        let scores = &evaluation.dimension_scores;
        assert!(scores.min() <= evaluation.overall_score);
        assert!(evaluation.overall_score <= scores.max());
        assert!(evaluation.sales_specific.is_some());
        assert!(!evaluation.strengths.is_empty());
        assert!(!evaluation.improvement_areas.is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_requires_completed_session() {
        let fx = fixture().await;
        let session = Session::new(
            "tenant_a".to_string(),
            PreparationType::Sales,
            ContextPayload {
                customer_name: Some("Acme".to_string()),
                customer_persona: Some("CTO".to_string()),
                deal_stage: Some(DealStage::Discovery),
                topic: None,
            },
        );
        fx.db.store_item(session.clone()).await.expect("store");

        let refused = fx.evaluator.evaluate("tenant_a", &session.id).await;
        assert!(matches!(refused, Err(AppError::StateConflict(_))));
    }

    #[tokio::test]
    async fn test_reevaluation_replaces_prior() {
        let fx = fixture().await;
        let session = completed_sales_session(&fx, "tenant_a").await;

        fx.stub.push_json(sales_draft_json([50, 50, 50, 50, 50, 50]));
        let first = fx
            .evaluator
            .evaluate("tenant_a", &session.id)
            .await
            .expect("first evaluation");
        assert_eq!(first.overall_score, 50);

        fx.stub.push_json(sales_draft_json([90, 90, 90, 90, 90, 90]));
        let second = fx
            .evaluator
            .evaluate("tenant_a", &session.id)
            .await
            .expect("second evaluation");
        assert_eq!(second.overall_score, 90);

        let stored = fx
            .evaluator
            .get("tenant_a", &session.id)
            .await
            .expect("stored evaluation");
        assert_eq!(stored.overall_score, 90);
    }

    #[tokio::test]
    async fn test_general_session_uses_reduced_schema() {
        let fx = fixture().await;
        let mut session = Session::new(
            "tenant_a".to_string(),
            PreparationType::General,
            ContextPayload {
                topic: Some("quarterly review rehearsal".to_string()),
                ..ContextPayload::default()
            },
        );
        session
            .transcript
            .push(TranscriptTurn::user("opening".to_string()));
        session
            .transcript
            .push(TranscriptTurn::assistant("response".to_string(), vec![]));
        session.status = SessionStatus::Completed;
        fx.db.store_item(session.clone()).await.expect("store");

        fx.stub.push_json(json!({
            "dimension_scores": {
                "product_knowledge": 70,
                "customer_understanding": 70,
                "objection_handling": 70,
                "value_communication": 70,
                "question_quality": 70,
                "confidence_delivery": 70
            },
            "strengths": ["clear structure"],
            "improvement_areas": ["slow down"],
            "summary": "Solid rehearsal."
        }));

        let evaluation = fx
            .evaluator
            .evaluate("tenant_a", &session.id)
            .await
            .expect("evaluate");
        assert!(evaluation.sales_specific.is_none());
        assert_eq!(evaluation.overall_score, 70);
    }

    #[tokio::test]
    async fn test_missing_strengths_is_provider_invalid() {
        let fx = fixture().await;
        let session = completed_sales_session(&fx, "tenant_a").await;

        let mut draft = sales_draft_json([60, 60, 60, 60, 60, 60]);
        draft["strengths"] = json!([]);
        fx.stub.push_json(draft);

        let result = fx.evaluator.evaluate("tenant_a", &session.id).await;
        assert!(matches!(result, Err(AppError::ProviderInvalid(_))));
    }
}

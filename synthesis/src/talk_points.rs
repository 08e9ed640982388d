use std::fmt::Write;
use std::sync::Arc;

use common::{
    error::AppError,
    llm::{ChatMessage, LlmGateway},
    storage::{
        db::SurrealDbClient,
        types::{
            company_profile::CompanyProfile,
            session::DealStage,
            talk_point::{TalkPointArtifact, TalkPointContent},
        },
    },
};
use retrieval_pipeline::{query::synthesis_query, RetrievedChunk, Retriever};
use tracing::instrument;

use crate::schemas::talk_point_schema;

const TALK_POINT_SYSTEM_MESSAGE: &str =
    "You prepare sales enablement material. From the topic, the customer \
     context and the source excerpts, produce a preparation document with \
     exactly these sections: Opening Hook, Problem Statement, Solution \
     Overview, Key Benefits, Proof Points, Objection Handling and Call to \
     Action. Ground every claim you can in the excerpts; quote concrete \
     figures verbatim. Objection Handling lists likely objections each with \
     a strong response.";

#[derive(Debug, Clone)]
pub struct TalkPointRequest {
    pub topic: String,
    pub deal_stage: Option<DealStage>,
    pub customer_context: Option<String>,
}

/// One-shot retrieval + structured generation into the fixed artifact.
#[derive(Clone)]
pub struct TalkPointSynthesizer {
    db: Arc<SurrealDbClient>,
    gateway: LlmGateway,
    retriever: Retriever,
    k_synthesis: usize,
}

impl TalkPointSynthesizer {
    pub fn new(
        db: Arc<SurrealDbClient>,
        gateway: LlmGateway,
        retriever: Retriever,
        k_synthesis: usize,
    ) -> Self {
        Self {
            db,
            gateway,
            retriever,
            k_synthesis,
        }
    }

    #[instrument(skip_all, fields(tenant_id = %tenant_id, topic = %request.topic))]
    pub async fn generate(
        &self,
        tenant_id: &str,
        request: TalkPointRequest,
    ) -> Result<TalkPointArtifact, AppError> {
        if request.topic.trim().is_empty() {
            return Err(AppError::Validation("topic must not be empty".to_string()));
        }

        let profile = CompanyProfile::get_by_tenant(&self.db, tenant_id).await?;

        let query = synthesis_query(
            &request.topic,
            request.deal_stage,
            request.customer_context.as_deref(),
            profile.as_ref(),
        );
        let chunks = self
            .retriever
            .retrieve(tenant_id, &query, self.k_synthesis)
            .await?;

        let user_message = build_user_message(&request, profile.as_ref(), &chunks);
        let messages = [
            ChatMessage::system(TALK_POINT_SYSTEM_MESSAGE),
            ChatMessage::user(user_message),
        ];

        let content: TalkPointContent = self
            .gateway
            .complete_json(
                &messages,
                "talk_point_artifact",
                "Seven-section sales talk point document",
                talk_point_schema(),
            )
            .await?;
        content.validate()?;

        let sources_used = u32::try_from(chunks.len()).unwrap_or(u32::MAX);
        let artifact = TalkPointArtifact::new(
            tenant_id.to_string(),
            request.topic,
            request.customer_context,
            request.deal_stage,
            content,
            sources_used,
        );
        self.db.store_item(artifact.clone()).await?;

        Ok(artifact)
    }
}

fn build_user_message(
    request: &TalkPointRequest,
    profile: Option<&CompanyProfile>,
    chunks: &[RetrievedChunk],
) -> String {
    let mut message = format!("Topic: {}\n", request.topic);

    if let Some(stage) = request.deal_stage {
        let _ = writeln!(message, "Deal stage: {stage}");
    }
    if let Some(context) = request.customer_context.as_deref() {
        let _ = writeln!(message, "Customer context: {context}");
    }
    if let Some(profile) = profile {
        let _ = writeln!(
            message,
            "Company: {} ({}). Value proposition: {}",
            profile.name, profile.industry, profile.value_proposition
        );
    }

    if chunks.is_empty() {
        message.push_str(
            "\nNo source documents were available for this topic. Produce the \
             document from the topic and context alone and keep claims general.\n",
        );
    } else {
        message.push_str("\nSource excerpts:\n");
        for (position, chunk) in chunks.iter().enumerate() {
            let _ = writeln!(
                message,
                "[{index}] {text}",
                index = position + 1,
                text = chunk.text
            );
        }
    }

    message
}

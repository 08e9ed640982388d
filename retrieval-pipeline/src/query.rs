use common::storage::types::{company_profile::CompanyProfile, session::DealStage};

/// Retrieval query for a synthesis intent: the topic enriched with whatever
/// stage, persona and company hints are on hand. More signal in the query
/// embedding pulls more relevant chunks without any reranking stage.
pub fn synthesis_query(
    topic: &str,
    deal_stage: Option<DealStage>,
    customer_context: Option<&str>,
    profile: Option<&CompanyProfile>,
) -> String {
    let mut parts = vec![topic.to_string()];

    if let Some(stage) = deal_stage {
        parts.push(format!("deal stage: {stage}"));
    }
    if let Some(context) = customer_context {
        if !context.trim().is_empty() {
            parts.push(format!("customer: {context}"));
        }
    }
    if let Some(profile) = profile {
        if !profile.value_proposition.trim().is_empty() {
            parts.push(format!("value proposition: {}", profile.value_proposition));
        }
        if !profile.industry.trim().is_empty() {
            parts.push(format!("industry: {}", profile.industry));
        }
    }

    parts.join("\n")
}

/// Retrieval query for an evaluation intent: what the conversation covered.
pub fn evaluation_query(topic_hints: &[&str]) -> String {
    topic_hints.join("\n")
}

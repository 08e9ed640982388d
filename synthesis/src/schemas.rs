use serde_json::{json, Value};

/// Schema for the seven-section talk-point artifact. Strict mode: every
/// section is required and nothing else is accepted.
pub fn talk_point_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "opening_hook": { "type": "string" },
            "problem_statement": { "type": "string" },
            "solution_overview": { "type": "string" },
            "key_benefits": { "type": "string" },
            "proof_points": { "type": "string" },
            "objection_handling": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "objection": { "type": "string" },
                        "response": { "type": "string" }
                    },
                    "required": ["objection", "response"],
                    "additionalProperties": false
                }
            },
            "call_to_action": { "type": "string" }
        },
        "required": [
            "opening_hook",
            "problem_statement",
            "solution_overview",
            "key_benefits",
            "proof_points",
            "objection_handling",
            "call_to_action"
        ],
        "additionalProperties": false
    })
}

fn dimension_scores_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "product_knowledge": { "type": "integer", "minimum": 0, "maximum": 100 },
            "customer_understanding": { "type": "integer", "minimum": 0, "maximum": 100 },
            "objection_handling": { "type": "integer", "minimum": 0, "maximum": 100 },
            "value_communication": { "type": "integer", "minimum": 0, "maximum": 100 },
            "question_quality": { "type": "integer", "minimum": 0, "maximum": 100 },
            "confidence_delivery": { "type": "integer", "minimum": 0, "maximum": 100 }
        },
        "required": [
            "product_knowledge",
            "customer_understanding",
            "objection_handling",
            "value_communication",
            "question_quality",
            "confidence_delivery"
        ],
        "additionalProperties": false
    })
}

fn grade_schema() -> Value {
    json!({ "type": "string", "enum": ["EXCELLENT", "GOOD", "FAIR", "POOR"] })
}

/// Scoring schema for sales sessions: six dimensions plus the qualitative
/// flags.
pub fn sales_evaluation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dimension_scores": dimension_scores_schema(),
            "sales_specific": {
                "type": "object",
                "properties": {
                    "knowledge_base_usage": grade_schema(),
                    "stage_appropriateness": grade_schema(),
                    "personalization": grade_schema()
                },
                "required": [
                    "knowledge_base_usage",
                    "stage_appropriateness",
                    "personalization"
                ],
                "additionalProperties": false
            },
            "strengths": { "type": "array", "items": { "type": "string" } },
            "improvement_areas": { "type": "array", "items": { "type": "string" } },
            "summary": { "type": "string" }
        },
        "required": [
            "dimension_scores",
            "sales_specific",
            "strengths",
            "improvement_areas",
            "summary"
        ],
        "additionalProperties": false
    })
}

/// Reduced schema for non-sales sessions: no qualitative flags.
pub fn general_evaluation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dimension_scores": dimension_scores_schema(),
            "strengths": { "type": "array", "items": { "type": "string" } },
            "improvement_areas": { "type": "array", "items": { "type": "string" } },
            "summary": { "type": "string" }
        },
        "required": ["dimension_scores", "strengths", "improvement_areas", "summary"],
        "additionalProperties": false
    })
}

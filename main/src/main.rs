use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::{extract::FromRef, Router};
use common::{
    llm::LlmGateway,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
};
use ingestion_pipeline::{
    extract::PlainTextExtractor, run_janitor_loop, run_worker_loop, IngestionPipeline,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    db.ensure_initialized(config.vector.dim).await?;

    let gateway = LlmGateway::open_ai(
        &config.openai_api_key,
        &config.openai_base_url,
        config.llm.clone(),
        config.vector.dim,
    );

    // Create global storage manager
    let storage = StorageManager::new(&config).await?;

    let api_state = ApiState::new(
        Arc::clone(&db),
        config.clone(),
        storage.clone(),
        gateway.clone(),
    );
    let index = api_state.index.clone();

    // Ingestion workers and the orphan janitor share the process.
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        storage,
        gateway,
        index.clone(),
        Arc::new(PlainTextExtractor),
        config.chunker.clone(),
    ));

    for _ in 0..config.ingestion.workers.max(1) {
        let worker_db = Arc::clone(&db);
        let worker_pipeline = Arc::clone(&pipeline);
        let worker_settings = config.ingestion.clone();
        tokio::spawn(async move {
            if let Err(err) = run_worker_loop(worker_db, worker_pipeline, worker_settings).await {
                error!(error = %err, "ingestion worker exited");
            }
        });
    }
    let janitor_db = Arc::clone(&db);
    let janitor_settings = config.ingestion.clone();
    tokio::spawn(async move {
        if let Err(err) = run_janitor_loop(janitor_db, index, janitor_settings).await {
            error!(error = %err, "janitor exited");
        }
    });

    // Create Axum router
    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(AppState { api_state });

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use common::llm::stub::StubBackend;
    use common::storage::types::chunk::Chunk;
    use common::utils::config::{AppConfig, IngestionSettings, LlmSettings, StorageKind};
    use common::vector::VectorIndex;
    use ingestion_pipeline::drain_pending;
    use object_store::memory::InMemory;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    const VOCAB: [&str; 12] = [
        "alpha",
        "bravo",
        "charlie",
        "security",
        "aes",
        "256",
        "encryption",
        "widget",
        "reliability",
        "uptime",
        "sla",
        "99",
    ];

    struct Harness {
        app: Router,
        db: Arc<SurrealDbClient>,
        stub: StubBackend,
        pipeline: IngestionPipeline,
        index: VectorIndex,
        ingestion: IngestionSettings,
    }

    async fn harness() -> Harness {
        let database = Uuid::new_v4().to_string();
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized(VOCAB.len())
            .await
            .expect("init indexes");

        let stub = StubBackend::with_vocab(&VOCAB);
        let gateway = LlmGateway::stubbed(stub.clone(), LlmSettings::default());
        let storage = StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory);
        let config = AppConfig::for_tests();

        let api_state = ApiState::new(
            Arc::clone(&db),
            config.clone(),
            storage.clone(),
            gateway.clone(),
        );
        let index = api_state.index.clone();

        let pipeline = IngestionPipeline::new(
            Arc::clone(&db),
            storage,
            gateway,
            index.clone(),
            Arc::new(PlainTextExtractor),
            config.chunker.clone(),
        );

        let app = Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .with_state(AppState { api_state });

        Harness {
            app,
            db,
            stub,
            pipeline,
            index,
            ingestion: config.ingestion,
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn request_json(
        harness: &Harness,
        method: &str,
        tenant: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{uri}"))
            .header("X-Tenant-Id", tenant);

        let request = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                builder
                    .body(Body::from(value.to_string()))
                    .expect("request")
            }
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = harness
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn upload_document(harness: &Harness, tenant: &str, filename: &str, body: &str) -> String {
        let boundary = "X-E2E-BOUNDARY";
        let multipart_body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {body}\r\n\
             --{boundary}--\r\n"
        );

        let response = harness
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/documents")
                    .header("X-Tenant-Id", tenant)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(multipart_body))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "processing");
        body["document_id"].as_str().expect("document id").to_string()
    }

    async fn drain(harness: &Harness) {
        drain_pending(&harness.db, &harness.pipeline, &harness.ingestion)
            .await
            .expect("drain ingestion queue");
    }

    async fn create_sales_session(harness: &Harness, tenant: &str) -> String {
        let (status, body) = request_json(
            harness,
            "POST",
            tenant,
            "/sessions",
            Some(json!({
                "preparation_type": "sales",
                "context_payload": {
                    "customer_name": "Acme",
                    "customer_persona": "Skeptical CTO",
                    "deal_stage": "DISCOVERY"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_id"].as_str().expect("session id").to_string()
    }

    #[tokio::test]
    async fn scenario_upload_and_index() {
        let h = harness().await;
        let document_id = upload_document(&h, "tenant_a", "notes.txt", "alpha bravo charlie").await;

        drain(&h).await;

        let (status, doc) =
            request_json(&h, "GET", "tenant_a", &format!("/documents/{document_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["status"], "indexed");
        assert_eq!(doc["chunk_count"], 1);
        assert_eq!(doc["page_count"], 1);
        assert!(doc["indexed_at"].is_string());

        let hits = h
            .index
            .query("tenant_a", &h.stub.embed("bravo"), 5)
            .await
            .expect("vector query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, document_id);
    }

    #[tokio::test]
    async fn scenario_sales_turn_with_retrieval() {
        let h = harness().await;
        let document_id = upload_document(
            &h,
            "tenant_a",
            "security.txt",
            "Our platform protects customer data with AES-256 encryption and security audits",
        )
        .await;
        drain(&h).await;

        let session_id = create_sales_session(&h, "tenant_a").await;

        h.stub
            .push_completion("Which auditors verified that encryption claim?");
        let (status, reply) = request_json(
            &h,
            "POST",
            "tenant_a",
            &format!("/sessions/{session_id}/messages"),
            Some(json!({ "message": "Tell me about your security" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply["assistant_text"],
            "Which auditors verified that encryption claim?"
        );
        let retrieved = reply["retrieved_chunk_ids"].as_array().expect("ids");
        assert!(!retrieved.is_empty());
        assert!(retrieved.len() <= 5);

        // Every id resolves to a chunk of the uploaded document.
        let ids: Vec<String> = retrieved
            .iter()
            .map(|v| v.as_str().expect("id").to_string())
            .collect();
        let chunks = Chunk::get_many(&h.db, "tenant_a", &ids)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), ids.len());
        assert!(chunks.iter().all(|c| c.document_id == document_id));
    }

    #[tokio::test]
    async fn scenario_completion_threshold() {
        let h = harness().await;
        let session_id = create_sales_session(&h, "tenant_a").await;

        for _ in 0..2 {
            let (status, _) = request_json(
                &h,
                "POST",
                "tenant_a",
                &format!("/sessions/{session_id}/messages"),
                Some(json!({ "message": "a security question" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (early_status, early_body) = request_json(
            &h,
            "POST",
            "tenant_a",
            &format!("/sessions/{session_id}/complete"),
            None,
        )
        .await;
        assert_eq!(early_status, StatusCode::BAD_REQUEST);
        assert_eq!(early_body["error"]["kind"], "VALIDATION");

        let (status, _) = request_json(
            &h,
            "POST",
            "tenant_a",
            &format!("/sessions/{session_id}/messages"),
            Some(json!({ "message": "a third question" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (done_status, done_body) = request_json(
            &h,
            "POST",
            "tenant_a",
            &format!("/sessions/{session_id}/complete"),
            None,
        )
        .await;
        assert_eq!(done_status, StatusCode::OK);
        assert_eq!(done_body["status"], "completed");
    }

    #[tokio::test]
    async fn scenario_tenant_isolation() {
        let h = harness().await;
        let t1_doc = upload_document(&h, "tenant_1", "w1.txt", "widget catalog for tenant one").await;
        let _t2_doc = upload_document(&h, "tenant_2", "w2.txt", "widget catalog for tenant two").await;
        drain(&h).await;

        let hits = h
            .index
            .query("tenant_1", &h.stub.embed("widget"), 5)
            .await
            .expect("query");
        assert!(!hits.is_empty());
        assert!(
            hits.iter().all(|hit| hit.document_id == t1_doc),
            "tenant_1 must never see tenant_2 chunks"
        );
    }

    #[tokio::test]
    async fn scenario_document_delete_cascades() {
        let h = harness().await;
        let d1 = upload_document(&h, "tenant_a", "one.txt", "alpha bravo content").await;
        let d2 = upload_document(&h, "tenant_a", "two.txt", "widget charlie content").await;
        drain(&h).await;

        let (status, body) =
            request_json(&h, "DELETE", "tenant_a", &format!("/documents/{d1}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);

        // Retrieval only surfaces the surviving document.
        let hits = h
            .index
            .query("tenant_a", &h.stub.embed("alpha bravo widget charlie"), 5)
            .await
            .expect("query");
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|hit| hit.document_id == d2));

        // No chunk rows remain for the deleted document.
        assert!(Chunk::for_document(&h.db, &d1)
            .await
            .expect("chunks")
            .is_empty());

        // The listing no longer includes it.
        let (_, listed) = request_json(&h, "GET", "tenant_a", "/documents", None).await;
        let ids: Vec<&str> = listed["documents"]
            .as_array()
            .expect("array")
            .iter()
            .map(|d| d["document_id"].as_str().expect("id"))
            .collect();
        assert_eq!(ids, vec![d2.as_str()]);

        // Deleting again is a no-op.
        let (again_status, again_body) =
            request_json(&h, "DELETE", "tenant_a", &format!("/documents/{d1}"), None).await;
        assert_eq!(again_status, StatusCode::OK);
        assert_eq!(again_body["deleted"], true);
    }

    #[tokio::test]
    async fn scenario_talk_point_generation() {
        let h = harness().await;
        upload_document(
            &h,
            "tenant_a",
            "sla.txt",
            "We guarantee a 99.99% uptime SLA backed by reliability engineering",
        )
        .await;
        drain(&h).await;

        h.stub.push_json(json!({
            "opening_hook": "Downtime is the silent deal-killer",
            "problem_statement": "Every outage erodes customer trust",
            "solution_overview": "A platform engineered for continuous availability",
            "key_benefits": "Fewer incidents, faster recovery, happier customers",
            "proof_points": "Contractually backed 99.99% uptime SLA",
            "objection_handling": [
                {
                    "objection": "SLAs are just marketing",
                    "response": "Ours carries service credits and three years of audited uptime"
                }
            ],
            "call_to_action": "Let's schedule a reliability deep dive"
        }));

        let (status, artifact) = request_json(
            &h,
            "POST",
            "tenant_a",
            "/talk-points/generate",
            Some(json!({ "topic": "reliability" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(artifact["sources_used"].as_u64().expect("count") >= 1);
        assert!(artifact["content"]["proof_points"]
            .as_str()
            .expect("proof points")
            .contains("99.99% uptime SLA"));
        for section in [
            "opening_hook",
            "problem_statement",
            "solution_overview",
            "key_benefits",
            "proof_points",
            "objection_handling",
            "call_to_action",
        ] {
            assert!(
                !artifact["content"][section].is_null(),
                "missing section {section}"
            );
        }

        // The artifact is retrievable and deletable.
        let talk_point_id = artifact["talk_point_id"].as_str().expect("id");
        let (get_status, _) = request_json(
            &h,
            "GET",
            "tenant_a",
            &format!("/talk-points/{talk_point_id}"),
            None,
        )
        .await;
        assert_eq!(get_status, StatusCode::OK);
    }

    #[tokio::test]
    async fn scenario_evaluation_schema() {
        let h = harness().await;
        let session_id = create_sales_session(&h, "tenant_a").await;

        for _ in 0..4 {
            let (status, _) = request_json(
                &h,
                "POST",
                "tenant_a",
                &format!("/sessions/{session_id}/messages"),
                Some(json!({ "message": "a pitch about security" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        let (complete_status, _) = request_json(
            &h,
            "POST",
            "tenant_a",
            &format!("/sessions/{session_id}/complete"),
            None,
        )
        .await;
        assert_eq!(complete_status, StatusCode::OK);

        h.stub.push_json(json!({
            "dimension_scores": {
                "product_knowledge": 82,
                "customer_understanding": 74,
                "objection_handling": 68,
                "value_communication": 77,
                "question_quality": 71,
                "confidence_delivery": 80
            },
            "sales_specific": {
                "knowledge_base_usage": "GOOD",
                "stage_appropriateness": "EXCELLENT",
                "personalization": "FAIR"
            },
            "strengths": ["grounded the encryption claims in the uploaded material"],
            "improvement_areas": ["close with a concrete next step"],
            "summary": "Confident discovery call with room to tighten the close."
        }));

        let (status, evaluation) = request_json(
            &h,
            "POST",
            "tenant_a",
            &format!("/sessions/{session_id}/evaluate"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let scores = &evaluation["dimension_scores"];
        let mut values = Vec::new();
        for dimension in [
            "product_knowledge",
            "customer_understanding",
            "objection_handling",
            "value_communication",
            "question_quality",
            "confidence_delivery",
        ] {
            let value = scores[dimension].as_u64().expect("score");
            assert!(value <= 100, "{dimension} out of range");
            values.push(value);
        }

        let overall = evaluation["overall_score"].as_u64().expect("overall");
        let min = *values.iter().min().expect("min");
        let max = *values.iter().max().expect("max");
        assert!(min <= overall && overall <= max);

        for flag in [
            "knowledge_base_usage",
            "stage_appropriateness",
            "personalization",
        ] {
            let grade = evaluation["sales_specific"][flag].as_str().expect("grade");
            assert!(["EXCELLENT", "GOOD", "FAIR", "POOR"].contains(&grade));
        }

        assert!(!evaluation["strengths"].as_array().expect("strengths").is_empty());
        assert!(!evaluation["improvement_areas"]
            .as_array()
            .expect("improvement areas")
            .is_empty());

        // The stored transcript alternates strictly for the completed session.
        let (_, session) =
            request_json(&h, "GET", "tenant_a", &format!("/sessions/{session_id}"), None).await;
        let transcript = session["transcript"].as_array().expect("transcript");
        assert_eq!(transcript.len(), 8);
        for (index, turn) in transcript.iter().enumerate() {
            let expected = if index % 2 == 0 { "user" } else { "assistant" };
            assert_eq!(turn["role"], expected);
        }
    }

    #[tokio::test]
    async fn scenario_failed_document_surfaces_error_in_listing() {
        let h = harness().await;
        let boundary = "X-E2E-BOUNDARY";
        // A mime type with no registered extractor fails the document.
        let multipart_body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"deck.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n\
             %PDF-1.7 not really\r\n\
             --{boundary}--\r\n"
        );
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/documents")
                    .header("X-Tenant-Id", "tenant_a")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(multipart_body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        drain(&h).await;

        let (_, listed) = request_json(&h, "GET", "tenant_a", "/documents", None).await;
        let documents = listed["documents"].as_array().expect("array");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["status"], "failed");
        assert_eq!(documents[0]["error"]["kind"], "extraction");
    }
}

use std::sync::Arc;

use common::{
    llm::LlmGateway,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
    vector::VectorIndex,
};
use ingestion_pipeline::{
    extract::PlainTextExtractor, run_janitor_loop, run_worker_loop, IngestionPipeline,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

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

    let storage = StorageManager::new(&config).await?;
    let index = VectorIndex::new(Arc::clone(&db), config.vector.dim);

    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        storage,
        gateway,
        index.clone(),
        Arc::new(PlainTextExtractor),
        config.chunker.clone(),
    ));

    info!(workers = config.ingestion.workers, "Starting worker process");

    let mut handles = Vec::new();
    for _ in 0..config.ingestion.workers.max(1) {
        handles.push(tokio::spawn(run_worker_loop(
            Arc::clone(&db),
            Arc::clone(&pipeline),
            config.ingestion.clone(),
        )));
    }
    handles.push(tokio::spawn(run_janitor_loop(
        Arc::clone(&db),
        index,
        config.ingestion.clone(),
    )));

    for handle in handles {
        handle.await??;
    }

    Ok(())
}

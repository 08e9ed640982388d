use std::sync::Arc;

use common::{
    llm::LlmGateway,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::AppConfig,
    vector::VectorIndex,
};
use retrieval_pipeline::Retriever;
use session_engine::SessionEngine;
use synthesis::{Evaluator, TalkPointSynthesizer};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub index: VectorIndex,
    pub sessions: SessionEngine,
    pub talk_points: TalkPointSynthesizer,
    pub evaluator: Evaluator,
}

impl ApiState {
    /// Wire the component graph from the process-wide resources.
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        storage: StorageManager,
        gateway: LlmGateway,
    ) -> Self {
        let index = VectorIndex::new(Arc::clone(&db), gateway.embedding_dimensions());
        let retriever = Retriever::new(Arc::clone(&db), gateway.clone(), index.clone());

        let sessions = SessionEngine::new(
            Arc::clone(&db),
            gateway.clone(),
            retriever.clone(),
            config.session.clone(),
            config.retrieval.k_chat,
        );
        let talk_points = TalkPointSynthesizer::new(
            Arc::clone(&db),
            gateway.clone(),
            retriever,
            config.retrieval.k_synthesis,
        );
        let evaluator = Evaluator::new(Arc::clone(&db), gateway);

        Self {
            db,
            config,
            storage,
            index,
            sessions,
            talk_points,
            evaluator,
        }
    }
}

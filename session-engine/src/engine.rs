use std::sync::Arc;
use std::time::Duration;

use common::{
    error::AppError,
    llm::LlmGateway,
    storage::{
        db::SurrealDbClient,
        types::session::{
            ContextPayload, PreparationType, Session, SessionStatus, TranscriptTurn,
        },
    },
    utils::config::SessionSettings,
};
use retrieval_pipeline::Retriever;
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::{locks::SessionLocks, prompt};

/// Exchanges required before a session may be completed.
const MIN_EXCHANGES_TO_COMPLETE: usize = 3;

const TURN_TEMPERATURE: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub assistant_text: String,
    pub retrieved_chunk_ids: Vec<String>,
    pub turn_index: usize,
}

/// Owns every Session mutation: lifecycle, per-turn retrieval, prompt
/// assembly and the serialized transcript append.
#[derive(Clone)]
pub struct SessionEngine {
    db: Arc<SurrealDbClient>,
    gateway: LlmGateway,
    retriever: Retriever,
    locks: SessionLocks,
    settings: SessionSettings,
    k_chat: usize,
}

impl SessionEngine {
    pub fn new(
        db: Arc<SurrealDbClient>,
        gateway: LlmGateway,
        retriever: Retriever,
        settings: SessionSettings,
        k_chat: usize,
    ) -> Self {
        Self {
            db,
            gateway,
            retriever,
            locks: SessionLocks::new(),
            settings,
            k_chat,
        }
    }

    pub async fn create(
        &self,
        tenant_id: &str,
        preparation_type: PreparationType,
        context_payload: ContextPayload,
    ) -> Result<Session, AppError> {
        context_payload.validate(preparation_type)?;

        let session = Session::new(tenant_id.to_string(), preparation_type, context_payload);
        self.db.store_item(session.clone()).await?;

        Ok(session)
    }

    pub async fn get(&self, tenant_id: &str, session_id: &str) -> Result<Session, AppError> {
        Session::get_scoped(&self.db, tenant_id, session_id).await
    }

    /// Run one USER/ASSISTANT exchange.
    ///
    /// The session lock is held for exactly this turn and released on every
    /// exit path. On completion failure nothing is appended, so the caller
    /// can retry the same user text without producing two consecutive USER
    /// turns.
    #[instrument(skip_all, fields(tenant_id = %tenant_id, session_id = %session_id))]
    pub async fn turn(
        &self,
        tenant_id: &str,
        session_id: &str,
        user_text: &str,
    ) -> Result<TurnOutcome, AppError> {
        if user_text.trim().is_empty() {
            return Err(AppError::Validation("message must not be empty".to_string()));
        }

        let _lock = self.locks.try_acquire(session_id)?;

        let session = Session::get_scoped(&self.db, tenant_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(AppError::StateConflict(format!(
                "session {session_id} is not in progress"
            )));
        }

        let retrieved = if session.preparation_type == PreparationType::Sales {
            match self
                .retriever
                .retrieve(tenant_id, user_text, self.k_chat)
                .await
            {
                Ok(chunks) => chunks,
                Err(err) => {
                    // The turn still completes; it just lacks grounding.
                    warn!(error = %err, "retrieval degraded; continuing without context");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let messages = prompt::assemble_turn_messages(
            &session,
            &retrieved,
            user_text,
            self.settings.history_turns,
        );

        let assistant_text = timeout(
            Duration::from_millis(self.settings.turn_deadline_ms),
            self.gateway
                .complete(&messages, TURN_TEMPERATURE, self.settings.turn_max_tokens),
        )
        .await
        .map_err(|_| AppError::ProviderUnavailable("turn exceeded deadline".to_string()))??;

        let retrieved_chunk_ids: Vec<String> = retrieved
            .iter()
            .map(|chunk| chunk.chunk_id.clone())
            .collect();

        let updated = Session::append_exchange(
            &self.db,
            session_id,
            TranscriptTurn::user(user_text.to_string()),
            TranscriptTurn::assistant(assistant_text.clone(), retrieved_chunk_ids.clone()),
        )
        .await?;

        Ok(TurnOutcome {
            assistant_text,
            retrieved_chunk_ids,
            turn_index: updated.transcript.len().saturating_sub(1),
        })
    }

    /// Advance to `Completed`; requires three full exchanges.
    pub async fn complete(&self, tenant_id: &str, session_id: &str) -> Result<Session, AppError> {
        let session = Session::get_scoped(&self.db, tenant_id, session_id).await?;

        if session.exchange_count() < MIN_EXCHANGES_TO_COMPLETE {
            return Err(AppError::Validation(format!(
                "session needs at least {MIN_EXCHANGES_TO_COMPLETE} complete exchanges before completion"
            )));
        }

        Session::complete(&self.db, session_id).await
    }

    /// Soft-delete terminal; idempotent.
    pub async fn archive(&self, tenant_id: &str, session_id: &str) -> Result<(), AppError> {
        Session::get_scoped(&self.db, tenant_id, session_id).await?;
        Session::archive(&self.db, session_id).await
    }
}

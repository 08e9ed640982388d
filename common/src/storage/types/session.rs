use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreparationType {
    Sales,
    General,
}

/// Where a sales opportunity sits in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStage {
    Prospecting,
    Discovery,
    Qualification,
    Proposal,
    Negotiation,
    Closing,
    FollowUp,
}

impl fmt::Display for DealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DealStage::Prospecting => "prospecting",
            DealStage::Discovery => "discovery",
            DealStage::Qualification => "qualification",
            DealStage::Proposal => "proposal",
            DealStage::Negotiation => "negotiation",
            DealStage::Closing => "closing",
            DealStage::FollowUp => "follow-up",
        };
        write!(f, "{label}")
    }
}

/// Per-type session context supplied at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextPayload {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_persona: Option<String>,
    #[serde(default)]
    pub deal_stage: Option<DealStage>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl ContextPayload {
    /// Validate the payload against the preparation type it was created for.
    pub fn validate(&self, preparation_type: PreparationType) -> Result<(), AppError> {
        match preparation_type {
            PreparationType::Sales => {
                let name_ok = self
                    .customer_name
                    .as_deref()
                    .is_some_and(|v| !v.trim().is_empty());
                let persona_ok = self
                    .customer_persona
                    .as_deref()
                    .is_some_and(|v| !v.trim().is_empty());

                if !name_ok {
                    return Err(AppError::Validation(
                        "sales sessions require a customer_name".to_string(),
                    ));
                }
                if !persona_ok {
                    return Err(AppError::Validation(
                        "sales sessions require a customer_persona".to_string(),
                    ));
                }
                if self.deal_stage.is_none() {
                    return Err(AppError::Validation(
                        "sales sessions require a deal_stage".to_string(),
                    ));
                }
                Ok(())
            }
            PreparationType::General => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "User"),
            TurnRole::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retrieved_chunk_ids: Option<Vec<String>>,
}

impl TranscriptTurn {
    pub fn user(text: String) -> Self {
        Self {
            role: TurnRole::User,
            text,
            timestamp: Utc::now(),
            retrieved_chunk_ids: None,
        }
    }

    pub fn assistant(text: String, retrieved_chunk_ids: Vec<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text,
            timestamp: Utc::now(),
            retrieved_chunk_ids: Some(retrieved_chunk_ids),
        }
    }
}

impl fmt::Display for TranscriptTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.text)
    }
}

stored_object!(Session, "session", {
    tenant_id: String,
    preparation_type: PreparationType,
    context_payload: ContextPayload,
    transcript: Vec<TranscriptTurn>,
    status: SessionStatus,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    completed_at: Option<DateTime<Utc>>
});

impl Session {
    pub fn new(
        tenant_id: String,
        preparation_type: PreparationType,
        context_payload: ContextPayload,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            preparation_type,
            context_payload,
            transcript: Vec::new(),
            status: SessionStatus::InProgress,
            completed_at: None,
        }
    }

    pub async fn get_scoped(
        db: &SurrealDbClient,
        tenant_id: &str,
        id: &str,
    ) -> Result<Self, AppError> {
        let session: Self = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        if session.tenant_id != tenant_id {
            return Err(AppError::Auth(
                "You don't have access to this session".to_string(),
            ));
        }

        Ok(session)
    }

    /// Role of the most recent transcript turn, if any.
    pub fn last_role(&self) -> Option<TurnRole> {
        self.transcript.last().map(|turn| turn.role)
    }

    /// Completed USER/ASSISTANT exchanges, honoring strict alternation.
    pub fn exchange_count(&self) -> usize {
        self.transcript
            .windows(2)
            .filter(|pair| {
                matches!(
                    (pair.first().map(|t| t.role), pair.get(1).map(|t| t.role)),
                    (Some(TurnRole::User), Some(TurnRole::Assistant))
                )
            })
            .count()
    }

    /// Append one USER/ASSISTANT exchange atomically. The update is guarded
    /// by the status so a completed session can never grow its transcript.
    /// Returns the refreshed session.
    pub async fn append_exchange(
        db: &SurrealDbClient,
        id: &str,
        user_turn: TranscriptTurn,
        assistant_turn: TranscriptTurn,
    ) -> Result<Self, AppError> {
        let turns = vec![user_turn, assistant_turn];

        let updated: Vec<Self> = db
            .query(
                "UPDATE type::thing('session', $id) \
                 SET transcript += $turns, updated_at = time::now() \
                 WHERE status = $in_progress RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .bind(("turns", turns))
            .bind(("in_progress", SessionStatus::InProgress))
            .await?
            .take(0)?;

        updated
            .into_iter()
            .next()
            .ok_or_else(|| AppError::StateConflict(format!("session {id} is not in progress")))
    }

    /// CAS advance `InProgress → Completed`.
    pub async fn complete(db: &SurrealDbClient, id: &str) -> Result<Self, AppError> {
        let updated: Vec<Self> = db
            .query(
                "UPDATE type::thing('session', $id) \
                 SET status = $completed, completed_at = time::now(), updated_at = time::now() \
                 WHERE status = $in_progress RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .bind(("completed", SessionStatus::Completed))
            .bind(("in_progress", SessionStatus::InProgress))
            .await?
            .take(0)?;

        updated
            .into_iter()
            .next()
            .ok_or_else(|| AppError::StateConflict(format!("session {id} is not in progress")))
    }

    /// Archive from any live state; archiving an archived session is a no-op.
    pub async fn archive(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('session', $id) \
             SET status = $archived, updated_at = time::now() \
             WHERE status != $archived",
        )
        .bind(("id", id.to_string()))
        .bind(("archived", SessionStatus::Archived))
        .await?
        .check()?;

        Ok(())
    }
}

/// Render turns for prompt context, one per line.
pub fn format_transcript(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{turn}"))
        .collect::<Vec<String>>()
        .join("\n")
}

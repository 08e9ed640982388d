use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("State conflict: {0}")]
    StateConflict(String),
    #[error("Session busy: {0}")]
    SessionBusy(String),
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Provider response invalid: {0}")]
    ProviderInvalid(String),
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("Vector index corrupt: {0}")]
    IndexCorrupt(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether a client can expect the same call to succeed on a retry.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::StateConflict(_)
                | Self::SessionBusy(_)
                | Self::ProviderUnavailable(_)
                | Self::IndexUnavailable(_)
        )
    }
}

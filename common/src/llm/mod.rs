#[cfg(any(test, feature = "test-utils"))]
pub mod stub;

use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
        ResponseFormat, ResponseFormatJsonSchema,
    },
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::timeout;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

use crate::{error::AppError, utils::config::LlmSettings};

/// Escalation retries for JSON-mode parse failures, on top of the transport
/// retry budget.
const JSON_MODE_RETRIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

enum Backend {
    OpenAi(async_openai::Client<OpenAIConfig>),
    #[cfg(any(test, feature = "test-utils"))]
    Stub(stub::StubBackend),
}

struct GatewayInner {
    backend: Backend,
    settings: LlmSettings,
    embedding_dimensions: usize,
}

/// Uniform access to the completion + embedding provider.
///
/// Stateless across calls; cheap to clone. Transport failures are retried
/// with exponential backoff and jitter up to `llm.retry_budget`, and every
/// call is bounded by `llm.request_deadline_ms` overall.
#[derive(Clone)]
pub struct LlmGateway {
    inner: Arc<GatewayInner>,
}

impl LlmGateway {
    pub fn open_ai(
        api_key: &str,
        base_url: &str,
        settings: LlmSettings,
        embedding_dimensions: usize,
    ) -> Self {
        let client = async_openai::Client::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url),
        );

        Self {
            inner: Arc::new(GatewayInner {
                backend: Backend::OpenAi(client),
                settings,
                embedding_dimensions,
            }),
        }
    }

    /// A gateway over the deterministic stub backend; embeddings are one-hot
    /// token counts over the stub's vocabulary.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn stubbed(backend: stub::StubBackend, settings: LlmSettings) -> Self {
        let embedding_dimensions = backend.dimension();
        Self {
            inner: Arc::new(GatewayInner {
                backend: Backend::Stub(backend),
                settings,
                embedding_dimensions,
            }),
        }
    }

    pub fn embedding_dimensions(&self) -> usize {
        self.inner.embedding_dimensions
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.inner.settings.request_deadline_ms)
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(200)
            .map(jitter)
            .take(self.inner.settings.retry_budget)
    }

    /// Embed a batch of texts; vectors come back in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.inner.backend {
            Backend::OpenAi(client) => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(&self.inner.settings.embedding_model)
                    .dimensions(u32::try_from(self.inner.embedding_dimensions).unwrap_or(u32::MAX))
                    .input(texts.to_vec())
                    .build()?;

                let attempt = || async {
                    client
                        .embeddings()
                        .create(request.clone())
                        .await
                        .map_err(map_openai_error)
                };

                let response = timeout(
                    self.deadline(),
                    RetryIf::spawn(self.retry_strategy(), attempt, AppError::retryable),
                )
                .await
                .map_err(|_| {
                    AppError::ProviderUnavailable("embedding call exceeded deadline".to_string())
                })??;

                debug!(
                    prompt_tokens = response.usage.prompt_tokens,
                    total_tokens = response.usage.total_tokens,
                    inputs = texts.len(),
                    "embedding tokens consumed"
                );

                if response.data.len() != texts.len() {
                    return Err(AppError::ProviderInvalid(format!(
                        "embedding response carried {} vectors for {} inputs",
                        response.data.len(),
                        texts.len()
                    )));
                }

                let mut data = response.data;
                data.sort_by_key(|d| d.index);
                Ok(data.into_iter().map(|d| d.embedding).collect())
            }
            #[cfg(any(test, feature = "test-utils"))]
            Backend::Stub(stub) => Ok(texts.iter().map(|text| stub.embed(text)).collect()),
        }
    }

    /// One chat completion, plain text out.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, AppError> {
        match &self.inner.backend {
            Backend::OpenAi(client) => {
                let request = CreateChatCompletionRequestArgs::default()
                    .model(&self.inner.settings.model)
                    .temperature(temperature)
                    .max_completion_tokens(max_tokens)
                    .messages(to_request_messages(messages)?)
                    .build()?;

                let text = self.execute_chat(client, request).await?;
                Ok(text)
            }
            #[cfg(any(test, feature = "test-utils"))]
            Backend::Stub(stub) => Ok(stub.complete()),
        }
    }

    /// JSON-mode completion validated by deserializing into `T`.
    ///
    /// A parse or shape failure is retried up to K=2 times with an
    /// escalating instruction before surfacing `ProviderInvalid`.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
        schema_name: &str,
        description: &str,
        schema: Value,
    ) -> Result<T, AppError> {
        let mut last_error = String::new();

        for attempt in 0..=JSON_MODE_RETRIES {
            let mut attempt_messages = messages.to_vec();
            if attempt == 1 {
                attempt_messages.push(ChatMessage::system(
                    "Return ONLY valid JSON matching the provided schema.",
                ));
            } else if attempt > 1 {
                attempt_messages.push(ChatMessage::system(
                    "You MUST return valid JSON matching the provided schema. \
                     No prose, no markdown fences, no commentary.",
                ));
            }

            let text = self
                .complete_json_text(&attempt_messages, schema_name, description, schema.clone())
                .await?;

            match serde_json::from_str::<T>(&text) {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    warn!(
                        schema = schema_name,
                        attempt = attempt + 1,
                        error = %err,
                        "JSON-mode response failed validation"
                    );
                    last_error = err.to_string();
                }
            }
        }

        Err(AppError::ProviderInvalid(format!(
            "response for schema '{schema_name}' failed validation after retries: {last_error}"
        )))
    }

    async fn complete_json_text(
        &self,
        messages: &[ChatMessage],
        schema_name: &str,
        description: &str,
        schema: Value,
    ) -> Result<String, AppError> {
        match &self.inner.backend {
            Backend::OpenAi(client) => {
                let response_format = ResponseFormat::JsonSchema {
                    json_schema: ResponseFormatJsonSchema {
                        description: Some(description.to_string()),
                        name: schema_name.to_string(),
                        schema: Some(schema),
                        strict: Some(true),
                    },
                };

                let request = CreateChatCompletionRequestArgs::default()
                    .model(&self.inner.settings.model)
                    .messages(to_request_messages(messages)?)
                    .response_format(response_format)
                    .build()?;

                self.execute_chat(client, request).await
            }
            #[cfg(any(test, feature = "test-utils"))]
            Backend::Stub(stub) => Ok(stub.complete_json_text()),
        }
    }

    async fn execute_chat(
        &self,
        client: &async_openai::Client<OpenAIConfig>,
        request: CreateChatCompletionRequest,
    ) -> Result<String, AppError> {
        let attempt = || async {
            client
                .chat()
                .create(request.clone())
                .await
                .map_err(map_openai_error)
        };

        let response = timeout(
            self.deadline(),
            RetryIf::spawn(self.retry_strategy(), attempt, AppError::retryable),
        )
        .await
        .map_err(|_| {
            AppError::ProviderUnavailable("completion call exceeded deadline".to_string())
        })??;

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion tokens consumed"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::ProviderInvalid("no content in completion response".to_string())
            })
    }
}

fn to_request_messages(
    messages: &[ChatMessage],
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    messages
        .iter()
        .map(|message| {
            Ok(match message.role {
                ChatRole::System => {
                    ChatCompletionRequestSystemMessage::from(message.content.clone()).into()
                }
                ChatRole::User => {
                    ChatCompletionRequestUserMessage::from(message.content.clone()).into()
                }
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.clone())
                    .build()?
                    .into(),
            })
        })
        .collect()
}

/// Transport-level failures are retryable; a provider that answers with the
/// wrong shape is not.
fn map_openai_error(err: OpenAIError) -> AppError {
    match &err {
        OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => {
            AppError::ProviderUnavailable(err.to_string())
        }
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            if kind.contains("rate_limit")
                || kind.contains("server_error")
                || kind.contains("overloaded")
            {
                AppError::ProviderUnavailable(err.to_string())
            } else {
                AppError::ProviderInvalid(err.to_string())
            }
        }
        _ => AppError::ProviderInvalid(err.to_string()),
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

/// Completion and embedding provider settings.
#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub embedding_model: String,
    pub request_deadline_ms: u64,
    pub retry_budget: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            embedding_model: "text-embedding-3-small".to_owned(),
            request_deadline_ms: 30_000,
            retry_budget: 3,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct ChunkerSettings {
    pub size_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            size_tokens: 1000,
            overlap_tokens: 200,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k_chat: usize,
    pub k_synthesis: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k_chat: 5,
            k_synthesis: 10,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct IngestionSettings {
    pub workers: usize,
    /// A PROCESSING claim older than this is considered abandoned and may be
    /// taken over by another worker.
    pub stale_claim_secs: u64,
    pub janitor_interval_secs: u64,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            stale_claim_secs: 300,
            janitor_interval_secs: 60,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct SessionSettings {
    pub turn_deadline_ms: u64,
    /// How many trailing transcript turns are replayed into the prompt.
    pub history_turns: usize,
    pub turn_max_tokens: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            turn_deadline_ms: 30_000,
            history_turns: 10,
            turn_max_tokens: 512,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct DocSettings {
    pub max_bytes: usize,
}

impl Default for DocSettings {
    fn default() -> Self {
        Self {
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct VectorSettings {
    pub dim: usize,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self { dim: 1536 }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub chunker: ChunkerSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub doc: DocSettings,
    #[serde(default)]
    pub vector: VectorSettings,
}

fn default_data_dir() -> String {
    "./data".to_owned()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// Configuration for tests: in-memory everything, no real credentials.
    pub fn for_tests() -> Self {
        Self {
            openai_api_key: "test-key".to_owned(),
            surrealdb_address: "mem://".to_owned(),
            surrealdb_username: "root".to_owned(),
            surrealdb_password: "root".to_owned(),
            surrealdb_namespace: "test_ns".to_owned(),
            surrealdb_database: "test_db".to_owned(),
            data_dir: "/tmp/unused".to_owned(),
            http_port: 0,
            openai_base_url: "https://example.com".to_owned(),
            storage: StorageKind::Memory,
            llm: LlmSettings::default(),
            chunker: ChunkerSettings::default(),
            retrieval: RetrievalSettings::default(),
            ingestion: IngestionSettings::default(),
            session: SessionSettings::default(),
            doc: DocSettings::default(),
            vector: VectorSettings::default(),
        }
    }
}

//! Configuration types for the blueprint store.
//!
//! `BlueprintConfig` represents the top-level `config.toml`: the database
//! connection and the embedding provider chain. All fields have defaults so
//! an empty file (or no file) yields a working local setup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default embedding dimension for the blueprints table.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Identifier of the built-in local provider.
pub const LOCAL_PROVIDER_ID: &str = "local";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueprintConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Connection settings for the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string, e.g. `sqlite:///home/me/.blueprints/blueprints.db`.
    /// Empty means "derive from the data directory".
    #[serde(default)]
    pub url: String,

    /// Upper bound on concurrent read connections.
    #[serde(default = "default_max_reader_connections")]
    pub max_reader_connections: u32,

    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_max_reader_connections() -> u32 {
    8
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reader_connections: default_max_reader_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

/// Embedding service settings: table dimension and provider chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Fixed dimension of every stored embedding.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Provider tried first when a call does not name one.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Providers tried, in order, after the first one fails.
    #[serde(default)]
    pub fallback_providers: Vec<String>,

    /// Construction parameters keyed by provider id.
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderSettings>,
}

fn default_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}

fn default_provider() -> String {
    LOCAL_PROVIDER_ID.to_string()
}

fn default_providers() -> BTreeMap<String, ProviderSettings> {
    BTreeMap::from([(LOCAL_PROVIDER_ID.to_string(), ProviderSettings::local_default())])
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            default_provider: default_provider(),
            fallback_providers: Vec::new(),
            providers: default_providers(),
        }
    }
}

impl EmbeddingConfig {
    /// Dimension a given provider is expected to return.
    pub fn dimensions_for(&self, provider: &str) -> usize {
        self.providers
            .get(provider)
            .and_then(|p| p.dimensions)
            .unwrap_or(self.dimensions)
    }
}

/// How a provider reaches its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// In-process ONNX model.
    #[serde(rename = "local")]
    Local,
    /// Remote `/v1/embeddings` endpoint (OpenAI, Ollama, vLLM, LiteLLM, ...).
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

/// Construction parameters for one embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,

    /// Model identifier (e.g. "bge-base-en-v1.5", "text-embedding-3-small").
    pub model: String,

    /// Inference device for local models.
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Base URL for remote providers (e.g. "https://api.openai.com/v1").
    #[serde(default)]
    pub base_url: Option<String>,

    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Upper bound on a single embedding attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Output dimension override; defaults to the table dimension.
    #[serde(default)]
    pub dimensions: Option<usize>,
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProviderSettings {
    /// Settings for the built-in local model (768-dim BGE base).
    pub fn local_default() -> Self {
        Self {
            kind: ProviderKind::Local,
            model: "bge-base-en-v1.5".to_string(),
            device: default_device(),
            batch_size: default_batch_size(),
            base_url: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            dimensions: None,
        }
    }
}

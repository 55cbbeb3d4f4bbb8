//! OpenAiCompatibleProvider -- remote [`EmbeddingProvider`] over an
//! OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama, vLLM, LiteLLM).
//!
//! The API key, when configured, is wrapped in [`secrecy::SecretString`] and
//! is only exposed when building the `Authorization` header.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use blueprint_core::embedding::EmbeddingProvider;
use blueprint_types::embedding::Embedding;
use blueprint_types::error::EmbeddingError;

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Remote embedding provider with native batch support.
pub struct OpenAiCompatibleProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    dimensions: usize,
    /// Sent as the `dimensions` request field (models that support truncation).
    request_dimensions: Option<usize>,
    timeout: Duration,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let id = id.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::ProviderUnavailable {
                provider: id.clone(),
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            id,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            dimensions,
            request_dimensions: None,
            timeout,
        })
    }

    /// Ask the endpoint to return vectors of exactly `dimensions` components.
    pub fn with_request_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.request_dimensions = dimensions;
        self
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input,
            dimensions: self.request_dimensions,
        };

        let mut request = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout {
                    provider: self.id.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                EmbeddingError::ProviderUnavailable {
                    provider: self.id.clone(),
                    message: format!("HTTP request failed: {e}"),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request(format!(
                "{}: HTTP {status}: {error_body}",
                self.id
            )));
        }

        let mut parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("failed to parse embeddings response: {e}"))
        })?;

        if parsed.data.len() != input.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                input.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn request_timeout(&self) -> Duration {
        self.timeout
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embeddings response".to_string()))?;
        Ok(Embedding::new(vector))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(texts).await?;
        Ok(vectors.into_iter().map(Embedding::new).collect())
    }
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

//! EmbeddingProvider trait for text-to-vector conversion.
//!
//! Implementations (local ONNX model, remote HTTP API) live in blueprint-infra.

use std::future::Future;
use std::time::Duration;

use blueprint_types::embedding::Embedding;
use blueprint_types::error::EmbeddingError;

/// Attempt timeout used when a provider does not declare its own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Text used by the default health probe.
const HEALTH_PROBE_TEXT: &str = "health check";

/// Trait for converting text into fixed-dimension embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// `embed_batch` and `health_check` have default implementations built on
/// `embed`; providers with a native batch endpoint override `embed_batch`.
pub trait EmbeddingProvider: Send + Sync {
    /// Provider id this instance was registered under (e.g. "local").
    fn name(&self) -> &str;

    /// Model identifier (e.g. "bge-base-en-v1.5").
    fn model(&self) -> &str;

    /// Dimension of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Upper bound on a single call. Enforced by the embedding service.
    fn request_timeout(&self) -> Duration {
        DEFAULT_REQUEST_TIMEOUT
    }

    /// Embed a single text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Embedding, EmbeddingError>> + Send;

    /// Embed several texts, one vector per input, in input order.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Embedding>, EmbeddingError>> + Send {
        async move {
            let mut embeddings = Vec::with_capacity(texts.len());
            for text in texts {
                embeddings.push(self.embed(text).await?);
            }
            Ok(embeddings)
        }
    }

    /// Verify the backing model answers with vectors of the right shape.
    fn health_check(&self) -> impl Future<Output = Result<(), EmbeddingError>> + Send {
        async move {
            let embedding = self.embed(HEALTH_PROBE_TEXT).await?;
            check_dimensions(self.name(), self.dimensions(), &embedding.vector)
        }
    }
}

/// Reject vectors whose length differs from the expected dimension.
pub fn check_dimensions(provider: &str, expected: usize, vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            provider: provider.to_string(),
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

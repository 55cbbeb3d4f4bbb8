//! Provider construction port.
//!
//! The embedding service builds providers lazily, on first use, from their
//! configured settings. How a provider is built (loading an ONNX model,
//! creating an HTTP client) is an infrastructure concern.

use std::future::Future;

use blueprint_types::config::ProviderSettings;
use blueprint_types::error::EmbeddingError;

use super::box_provider::BoxEmbeddingProvider;

/// Builds embedding providers from their settings.
///
/// Implementations live in blueprint-infra. `build` is called at most once
/// per provider id for the lifetime of an `EmbeddingService`, unless a
/// previous attempt failed.
pub trait ProviderFactory: Send + Sync {
    fn build(
        &self,
        id: &str,
        settings: &ProviderSettings,
        dimensions: usize,
    ) -> impl Future<Output = Result<BoxEmbeddingProvider, EmbeddingError>> + Send;
}

//! BoxEmbeddingProvider -- object-safe dynamic dispatch wrapper for EmbeddingProvider.
//!
//! 1. Define an object-safe `EmbeddingProviderDyn` trait with boxed futures
//! 2. Blanket-impl `EmbeddingProviderDyn` for all `T: EmbeddingProvider`
//! 3. `BoxEmbeddingProvider` wraps `Box<dyn EmbeddingProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use blueprint_types::embedding::Embedding;
use blueprint_types::error::EmbeddingError;

use super::provider::EmbeddingProvider;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`EmbeddingProvider`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `EmbeddingProvider`.
pub trait EmbeddingProviderDyn: Send + Sync {
    fn name_dyn(&self) -> &str;

    fn model_dyn(&self) -> &str;

    fn dimensions_dyn(&self) -> usize;

    fn request_timeout_dyn(&self) -> Duration;

    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Embedding, EmbeddingError>>;

    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Embedding>, EmbeddingError>>;

    fn health_check_boxed(&self) -> BoxFuture<'_, Result<(), EmbeddingError>>;
}

impl<T: EmbeddingProvider> EmbeddingProviderDyn for T {
    fn name_dyn(&self) -> &str {
        self.name()
    }

    fn model_dyn(&self) -> &str {
        self.model()
    }

    fn dimensions_dyn(&self) -> usize {
        self.dimensions()
    }

    fn request_timeout_dyn(&self) -> Duration {
        self.request_timeout()
    }

    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Embedding, EmbeddingError>> {
        Box::pin(self.embed(text))
    }

    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Embedding>, EmbeddingError>> {
        Box::pin(self.embed_batch(texts))
    }

    fn health_check_boxed(&self) -> BoxFuture<'_, Result<(), EmbeddingError>> {
        Box::pin(self.health_check())
    }
}

/// Type-erased embedding provider for runtime selection.
///
/// Since `EmbeddingProvider` uses RPITIT, it cannot be used as a trait object
/// directly. The service registry stores providers of different concrete types
/// behind this wrapper.
pub struct BoxEmbeddingProvider {
    inner: Box<dyn EmbeddingProviderDyn + Send + Sync>,
}

impl BoxEmbeddingProvider {
    /// Wrap a concrete `EmbeddingProvider` in a type-erased box.
    pub fn new<T: EmbeddingProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name_dyn()
    }

    pub fn model(&self) -> &str {
        self.inner.model_dyn()
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions_dyn()
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout_dyn()
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.inner.embed_boxed(text).await
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.inner.embed_batch_boxed(texts).await
    }

    pub async fn health_check(&self) -> Result<(), EmbeddingError> {
        self.inner.health_check_boxed().await
    }
}

impl std::fmt::Debug for BoxEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxEmbeddingProvider")
            .field("name", &self.name())
            .field("model", &self.model())
            .field("dimensions", &self.dimensions())
            .finish()
    }
}

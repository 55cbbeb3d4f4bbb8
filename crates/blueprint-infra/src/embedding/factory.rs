//! Concrete `ProviderFactory`: turns configured settings into live providers.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use blueprint_core::embedding::{BoxEmbeddingProvider, ProviderFactory};
use blueprint_types::config::{ProviderKind, ProviderSettings};
use blueprint_types::error::EmbeddingError;

use super::local::{FastEmbedEncoder, LocalEmbeddingProvider, resolve_model};
use super::remote::OpenAiCompatibleProvider;

/// Builds local and remote embedding providers.
#[derive(Debug, Clone, Default)]
pub struct InfraProviderFactory {
    /// Where local models are downloaded; fastembed's default when `None`.
    model_cache_dir: Option<PathBuf>,
}

impl InfraProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_cache_dir = Some(dir.into());
        self
    }

    async fn build_local(
        &self,
        id: &str,
        settings: &ProviderSettings,
        dimensions: usize,
    ) -> Result<BoxEmbeddingProvider, EmbeddingError> {
        let (model, model_dims) = resolve_model(&settings.model).ok_or_else(|| {
            EmbeddingError::ProviderUnavailable {
                provider: id.to_string(),
                message: format!("unsupported local model '{}'", settings.model),
            }
        })?;
        if model_dims != dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                provider: id.to_string(),
                expected: dimensions,
                actual: model_dims,
            });
        }
        if !settings.device.eq_ignore_ascii_case("cpu") {
            tracing::warn!(provider = %id, device = %settings.device, "Only CPU inference is available, using cpu");
        }

        let cache_dir = self.model_cache_dir.clone();
        let encoder = tokio::task::spawn_blocking(move || FastEmbedEncoder::load(model, cache_dir))
            .await
            .map_err(|e| EmbeddingError::ProviderUnavailable {
                provider: id.to_string(),
                message: format!("model loading task failed: {e}"),
            })?
            .map_err(|message| EmbeddingError::ProviderUnavailable {
                provider: id.to_string(),
                message,
            })?;

        tracing::info!(provider = %id, model = %settings.model, dimensions, "Local embedding model loaded");
        Ok(BoxEmbeddingProvider::new(LocalEmbeddingProvider::new(
            id,
            settings.model.clone(),
            encoder,
            dimensions,
            settings.batch_size,
            Duration::from_secs(settings.timeout_secs),
        )))
    }

    fn build_remote(
        &self,
        id: &str,
        settings: &ProviderSettings,
        dimensions: usize,
    ) -> Result<BoxEmbeddingProvider, EmbeddingError> {
        let base_url = settings.base_url.clone().ok_or_else(|| EmbeddingError::ProviderUnavailable {
            provider: id.to_string(),
            message: "base_url is required for openai_compatible providers".to_string(),
        })?;

        let api_key = match &settings.api_key_env {
            Some(var) => {
                let key = std::env::var(var).map_err(|_| EmbeddingError::ProviderUnavailable {
                    provider: id.to_string(),
                    message: format!("environment variable {var} is not set"),
                })?;
                Some(SecretString::from(key))
            }
            None => None,
        };

        let provider = OpenAiCompatibleProvider::new(
            id,
            base_url,
            settings.model.clone(),
            api_key,
            dimensions,
            Duration::from_secs(settings.timeout_secs),
        )?
        .with_request_dimensions(settings.dimensions);

        tracing::info!(provider = %id, model = %settings.model, "Remote embedding provider configured");
        Ok(BoxEmbeddingProvider::new(provider))
    }
}

impl ProviderFactory for InfraProviderFactory {
    async fn build(
        &self,
        id: &str,
        settings: &ProviderSettings,
        dimensions: usize,
    ) -> Result<BoxEmbeddingProvider, EmbeddingError> {
        match settings.kind {
            ProviderKind::Local => self.build_local(id, settings, dimensions).await,
            ProviderKind::OpenAiCompatible => self.build_remote(id, settings, dimensions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_settings(base_url: Option<&str>, api_key_env: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            kind: ProviderKind::OpenAiCompatible,
            model: "text-embedding-3-small".to_string(),
            base_url: base_url.map(str::to_string),
            api_key_env: api_key_env.map(str::to_string),
            timeout_secs: 7,
            ..ProviderSettings::local_default()
        }
    }

    #[tokio::test]
    async fn remote_provider_built_from_settings() {
        let factory = InfraProviderFactory::new();
        let provider = factory
            .build("openai", &remote_settings(Some("http://localhost:9/v1"), None), 1536)
            .await
            .unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "text-embedding-3-small");
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.request_timeout(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn remote_requires_base_url() {
        let err = InfraProviderFactory::new()
            .build("openai", &remote_settings(None, None), 1536)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn remote_missing_key_variable_fails() {
        let err = InfraProviderFactory::new()
            .build(
                "openai",
                &remote_settings(Some("http://localhost:9"), Some("BLUEPRINT_TEST_UNSET_KEY_VAR")),
                1536,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("BLUEPRINT_TEST_UNSET_KEY_VAR"));
    }

    #[tokio::test]
    async fn local_unknown_model_fails_without_download() {
        let settings = ProviderSettings {
            model: "word2vec".to_string(),
            ..ProviderSettings::local_default()
        };
        let err = InfraProviderFactory::new()
            .build("local", &settings, 768)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn local_dimension_mismatch_fails_without_download() {
        let settings = ProviderSettings {
            model: "bge-small-en-v1.5".to_string(),
            ..ProviderSettings::local_default()
        };
        let err = InfraProviderFactory::new()
            .build("local", &settings, 768)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 768, actual: 384, .. }
        ));
    }
}

//! Local embedding provider running an ONNX model in-process via fastembed.
//!
//! Inference is CPU-bound, so every call runs on `spawn_blocking`. Results
//! are cached per input text in a `DashMap`; cache hits are reported back to
//! the embedding service through `Embedding::cache_hit`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use blueprint_core::embedding::EmbeddingProvider;
use blueprint_types::embedding::Embedding;
use blueprint_types::error::EmbeddingError;

/// Blocking text-to-vector encoder behind the local provider.
pub trait TextEncoder: Send + Sync + 'static {
    fn encode(&self, texts: Vec<String>, batch_size: usize) -> Result<Vec<Vec<f32>>, String>;
}

/// fastembed `TextEmbedding` guarded for exclusive use during inference.
pub struct FastEmbedEncoder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedEncoder {
    /// Load (downloading on first use) the named model. Blocking.
    pub fn load(model: EmbeddingModel, cache_dir: Option<PathBuf>) -> Result<Self, String> {
        let mut options = InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(options).map_err(|e| e.to_string())?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl TextEncoder for FastEmbedEncoder {
    fn encode(&self, texts: Vec<String>, batch_size: usize) -> Result<Vec<Vec<f32>>, String> {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model
            .embed(texts, Some(batch_size))
            .map_err(|e| e.to_string())
    }
}

/// Map a configured model name to a fastembed model and its output dimension.
pub fn resolve_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    let resolved = match name.to_ascii_lowercase().as_str() {
        "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "multilingual-e5-base" => (EmbeddingModel::MultilingualE5Base, 768),
        _ => return None,
    };
    Some(resolved)
}

/// In-process embedding provider with a per-text cache.
pub struct LocalEmbeddingProvider<E: TextEncoder = FastEmbedEncoder> {
    id: String,
    model_name: String,
    dimensions: usize,
    batch_size: usize,
    timeout: Duration,
    encoder: Arc<E>,
    cache: DashMap<String, Vec<f32>>,
}

impl<E: TextEncoder> LocalEmbeddingProvider<E> {
    pub fn new(
        id: impl Into<String>,
        model_name: impl Into<String>,
        encoder: E,
        dimensions: usize,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            model_name: model_name.into(),
            dimensions,
            batch_size: batch_size.max(1),
            timeout,
            encoder: Arc::new(encoder),
            cache: DashMap::new(),
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encoder = Arc::clone(&self.encoder);
        let batch_size = self.batch_size;
        let expected = texts.len();

        let vectors = tokio::task::spawn_blocking(move || encoder.encode(texts, batch_size))
            .await
            .map_err(|e| EmbeddingError::ProviderUnavailable {
                provider: self.id.clone(),
                message: format!("inference task failed: {e}"),
            })?
            .map_err(|message| EmbeddingError::ProviderUnavailable {
                provider: self.id.clone(),
                message,
            })?;

        if vectors.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "model returned {} vectors for {expected} texts",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

impl<E: TextEncoder> EmbeddingProvider for LocalEmbeddingProvider<E> {
    fn name(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn request_timeout(&self) -> Duration {
        self.timeout
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(Embedding::cached(cached.clone()));
        }

        let vector = self
            .encode(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("model returned no vector".to_string()))?;
        self.cache.insert(text.to_string(), vector.clone());
        Ok(Embedding::new(vector))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut results: Vec<Option<Embedding>> = texts
            .iter()
            .map(|text| self.cache.get(text).map(|v| Embedding::cached(v.clone())))
            .collect();

        let uncached: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(i, _)| i)
            .collect();

        if !uncached.is_empty() {
            let inputs: Vec<String> = uncached.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.encode(inputs).await?;
            for (&idx, vector) in uncached.iter().zip(vectors) {
                self.cache.insert(texts[idx].clone(), vector.clone());
                results[idx] = Some(Embedding::new(vector));
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

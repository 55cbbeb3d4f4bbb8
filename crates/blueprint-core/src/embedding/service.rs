//! Multi-provider embedding service.
//!
//! Routes embedding requests through an ordered provider chain with
//! automatic failover, constructs providers lazily on first use, and keeps
//! cumulative usage and latency statistics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::OnceCell;
use tracing::Instrument;

use blueprint_types::config::EmbeddingConfig;
use blueprint_types::embedding::{EmbedOptions, Embedding, EmbeddingStats, ProviderHealthReport};
use blueprint_types::error::EmbeddingError;

use super::box_provider::BoxEmbeddingProvider;
use super::factory::ProviderFactory;
use super::provider::check_dimensions;
use crate::vector::{l2_normalize, zero_vector};

type ProviderCell = Arc<OnceCell<Arc<BoxEmbeddingProvider>>>;

/// Mutable state guarded by the service's single lock.
#[derive(Default)]
struct ServiceState {
    /// Provider id -> once-only construction cell.
    registry: HashMap<String, ProviderCell>,
    stats: EmbeddingStats,
}

/// Embedding service shared by every store operation in the process.
///
/// Construct one instance and inject it (usually behind an `Arc`) into the
/// components that need embeddings. The provider registry and statistics
/// share one mutex, which is never held across an `.await`.
pub struct EmbeddingService<F: ProviderFactory> {
    config: EmbeddingConfig,
    factory: F,
    state: Mutex<ServiceState>,
}

impl<F: ProviderFactory> EmbeddingService<F> {
    pub fn new(config: EmbeddingConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            state: Mutex::new(ServiceState::default()),
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Fixed dimension of the blueprint table's embeddings.
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Zero vector of the configured dimension.
    pub fn zero_vector(&self) -> Vec<f32> {
        zero_vector(self.config.dimensions)
    }

    /// Provider ids in the order a default `embed` call tries them.
    pub fn provider_ids(&self) -> Vec<String> {
        self.attempt_order(&EmbedOptions::default())
    }

    /// Snapshot of the cumulative statistics.
    pub fn stats(&self) -> EmbeddingStats {
        self.lock_state().stats.clone()
    }

    pub fn reset_stats(&self) {
        self.lock_state().stats = EmbeddingStats::default();
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the de-duplicated provider attempt list.
    ///
    /// `[requested or default] + caller fallbacks + configured fallbacks`,
    /// keeping the first occurrence of each id.
    fn attempt_order(&self, options: &EmbedOptions) -> Vec<String> {
        let first = options
            .provider
            .clone()
            .unwrap_or_else(|| self.config.default_provider.clone());

        let mut order: Vec<String> = Vec::new();
        let candidates = std::iter::once(&first)
            .chain(options.fallback_providers.iter())
            .chain(self.config.fallback_providers.iter());
        for id in candidates {
            if !order.iter().any(|existing| existing == id) {
                order.push(id.clone());
            }
        }
        order
    }

    /// Get (or lazily construct) the provider registered under `id`.
    ///
    /// The registry lookup and insertion happen under the state lock; the
    /// per-id `OnceCell` guarantees at most one live instance even when
    /// several callers race on first use.
    async fn provider(&self, id: &str) -> Result<Arc<BoxEmbeddingProvider>, EmbeddingError> {
        let settings = self
            .config
            .providers
            .get(id)
            .ok_or_else(|| EmbeddingError::UnknownProvider(id.to_string()))?;

        let cell = {
            let mut state = self.lock_state();
            state.registry.entry(id.to_string()).or_default().clone()
        };

        let dimensions = self.config.dimensions_for(id);
        let provider = cell
            .get_or_try_init(|| async {
                tracing::info!(provider = %id, model = %settings.model, "Constructing embedding provider");
                self.factory
                    .build(id, settings, dimensions)
                    .await
                    .map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(provider))
    }

    /// Embed a single text, failing over across the provider chain.
    ///
    /// Providers are tried strictly in order and the first success is
    /// returned. Provider-level failures are logged and counted against that
    /// provider only; the service-level counters record one end-to-end
    /// outcome per call.
    pub async fn embed(&self, text: &str, options: &EmbedOptions) -> Result<Vec<f32>, EmbeddingError> {
        let order = self.attempt_order(options);
        let started = Instant::now();
        let mut last_error: Option<EmbeddingError> = None;

        for (attempt, id) in order.iter().enumerate() {
            let span = tracing::info_span!(
                "gen_ai.embeddings",
                gen_ai.operation.name = "embeddings",
                gen_ai.provider.name = %id,
                attempt = attempt
            );

            match self.attempt(id, text, options).instrument(span).await {
                Ok(embedding) => {
                    self.record_attempt(id, true, embedding.cache_hit);
                    self.record_outcome(1, true, started.elapsed());
                    if attempt > 0 {
                        tracing::warn!(provider = %id, attempt, "Embedding served by fallback provider");
                    }
                    return Ok(embedding.vector);
                }
                Err(err) => {
                    tracing::warn!(provider = %id, error = %err, "Embedding provider failed, trying next in chain");
                    self.record_attempt(id, false, false);
                    last_error = Some(err);
                }
            }
        }

        self.record_outcome(1, false, started.elapsed());
        let last = last_error.unwrap_or_else(|| {
            EmbeddingError::Request("no embedding providers configured".to_string())
        });
        tracing::error!(attempts = ?order, error = %last, "All embedding providers failed");
        Err(EmbeddingError::AllProvidersFailed {
            attempts: order,
            last: Box::new(last),
        })
    }

    /// One bounded attempt against a single provider.
    async fn attempt(&self, id: &str, text: &str, options: &EmbedOptions) -> Result<Embedding, EmbeddingError> {
        let provider = self.provider(id).await?;
        let timeout = options.timeout.unwrap_or_else(|| provider.request_timeout());

        let started = Instant::now();
        let mut embedding = tokio::time::timeout(timeout, provider.embed(text))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                provider: id.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;
        tracing::debug!(
            provider = %id,
            gen_ai.request.model = %provider.model(),
            latency_ms = started.elapsed().as_millis() as u64,
            cache_hit = embedding.cache_hit,
            "Embedding attempt succeeded"
        );

        check_dimensions(id, provider.dimensions(), &embedding.vector)?;
        if options.normalize {
            embedding.vector = l2_normalize(&embedding.vector);
        }
        Ok(embedding)
    }

    /// Embed several texts with a single provider.
    ///
    /// No fallback across items: the requested (or default) provider handles
    /// the whole batch, using its native batch support when it has one. The
    /// batch counts as `texts.len()` requests in the service statistics.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        options: &EmbedOptions,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let id = options
            .provider
            .clone()
            .unwrap_or_else(|| self.config.default_provider.clone());
        let count = texts.len() as u64;
        let started = Instant::now();

        let result = self.attempt_batch(&id, texts, options).await;
        match result {
            Ok(embeddings) => {
                let cache_hits = embeddings.iter().filter(|e| e.cache_hit).count() as u64;
                {
                    let mut state = self.lock_state();
                    let usage = state.stats.provider_usage.entry(id.clone()).or_default();
                    usage.requests += 1;
                    usage.successes += 1;
                    state.stats.cache_hits += cache_hits;
                }
                self.record_outcome(count, true, started.elapsed());
                Ok(embeddings.into_iter().map(|e| e.vector).collect())
            }
            Err(err) => {
                tracing::warn!(provider = %id, batch_size = texts.len(), error = %err, "Batch embedding failed");
                self.record_attempt(&id, false, false);
                self.record_outcome(count, false, started.elapsed());
                Err(err)
            }
        }
    }

    async fn attempt_batch(
        &self,
        id: &str,
        texts: &[String],
        options: &EmbedOptions,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        let provider = self.provider(id).await?;
        let per_item = options.timeout.unwrap_or_else(|| provider.request_timeout());
        let timeout = per_item.saturating_mul(u32::try_from(texts.len()).unwrap_or(u32::MAX));

        let mut embeddings = tokio::time::timeout(timeout, provider.embed_batch(texts))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                provider: id.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "provider '{id}' returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
        for embedding in &mut embeddings {
            check_dimensions(id, provider.dimensions(), &embedding.vector)?;
            if options.normalize {
                embedding.vector = l2_normalize(&embedding.vector);
            }
        }
        Ok(embeddings)
    }

    /// Probe every configured provider independently.
    ///
    /// A failure (including failure to construct) on one provider is
    /// reported in its own entry and never aborts the others.
    pub async fn health_check(&self) -> Vec<ProviderHealthReport> {
        let checks = self.config.providers.keys().map(|id| self.check_provider(id));
        join_all(checks).await
    }

    async fn check_provider(&self, id: &str) -> ProviderHealthReport {
        let started = Instant::now();
        let provider = match self.provider(id).await {
            Ok(provider) => provider,
            Err(err) => {
                tracing::warn!(provider = %id, error = %err, "Provider construction failed during health check");
                return ProviderHealthReport {
                    provider: id.to_string(),
                    healthy: false,
                    model: None,
                    dimensions: None,
                    latency_ms: None,
                    error: Some(err.to_string()),
                };
            }
        };

        let timeout = provider.request_timeout();
        let outcome = match tokio::time::timeout(timeout, provider.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout {
                provider: id.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        ProviderHealthReport {
            provider: id.to_string(),
            healthy: outcome.is_ok(),
            model: Some(provider.model().to_string()),
            dimensions: Some(provider.dimensions()),
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: outcome.err().map(|e| e.to_string()),
        }
    }

    fn record_attempt(&self, id: &str, success: bool, cache_hit: bool) {
        let mut state = self.lock_state();
        let usage = state.stats.provider_usage.entry(id.to_string()).or_default();
        usage.requests += 1;
        if success {
            usage.successes += 1;
        } else {
            usage.failures += 1;
        }
        if cache_hit {
            state.stats.cache_hits += 1;
        }
    }

    /// Record an end-to-end outcome and fold its latency into the running mean.
    fn record_outcome(&self, count: u64, success: bool, elapsed: Duration) {
        let mut state = self.lock_state();
        let stats = &mut state.stats;
        stats.total_requests += count;
        if success {
            stats.successful_requests += count;
        } else {
            stats.failed_requests += count;
        }

        let n = stats.total_requests as f64;
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        stats.average_response_time_ms += (duration_ms - stats.average_response_time_ms) / n;
    }
}

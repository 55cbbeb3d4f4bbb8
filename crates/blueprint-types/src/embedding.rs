//! Embedding request/response types and usage accounting.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single embedding produced by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// True when the provider answered from its own cache.
    pub cache_hit: bool,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            cache_hit: false,
        }
    }

    pub fn cached(vector: Vec<f32>) -> Self {
        Self {
            vector,
            cache_hit: true,
        }
    }
}

/// Per-call options for `EmbeddingService::embed`.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Provider to try first. `None` starts with the configured default.
    pub provider: Option<String>,
    /// Extra providers tried after `provider`, before the configured chain.
    pub fallback_providers: Vec<String>,
    /// L2-normalize the returned vector.
    pub normalize: bool,
    /// Per-attempt timeout override; defaults to the provider's own timeout.
    pub timeout: Option<Duration>,
}

impl EmbedOptions {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_fallbacks<S: Into<String>>(mut self, providers: impl IntoIterator<Item = S>) -> Self {
        self.fallback_providers = providers.into_iter().map(Into::into).collect();
        self
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Usage counters for a single provider.
///
/// Every attempt is counted here, including attempts that failed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Cumulative statistics for the embedding service.
///
/// `total_requests`, `successful_requests` and `failed_requests` reflect
/// end-to-end outcomes only; provider retries show up in `provider_usage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    /// Running mean of end-to-end latency in milliseconds.
    pub average_response_time_ms: f64,
    pub provider_usage: BTreeMap<String, ProviderUsage>,
}

impl EmbeddingStats {
    /// Fraction of end-to-end requests that succeeded (0.0 when none ran).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}

/// Health report for a single provider, produced by `health_check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthReport {
    pub provider: String,
    pub healthy: bool,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_empty() {
        let stats = EmbeddingStats::default();
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_success_rate() {
        let stats = EmbeddingStats {
            total_requests: 4,
            successful_requests: 3,
            failed_requests: 1,
            ..Default::default()
        };
        assert!((stats.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_embed_options_builder() {
        let opts = EmbedOptions::default()
            .with_provider("openai")
            .with_fallbacks(["local"])
            .normalized()
            .with_timeout(Duration::from_secs(2));
        assert_eq!(opts.provider.as_deref(), Some("openai"));
        assert_eq!(opts.fallback_providers, vec!["local"]);
        assert!(opts.normalize);
        assert_eq!(opts.timeout, Some(Duration::from_secs(2)));
    }
}

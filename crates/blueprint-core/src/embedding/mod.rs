//! Embedding provider abstractions and the multi-provider embedding service.
//!
//! - `EmbeddingProvider`: RPITIT trait for concrete provider implementations
//! - `BoxEmbeddingProvider`: object-safe wrapper for dynamic dispatch
//! - `ProviderFactory`: lazy construction of providers from settings
//! - `EmbeddingService`: fallback chain, usage statistics, health checks

pub mod box_provider;
pub mod factory;
pub mod provider;
pub mod service;

pub use box_provider::BoxEmbeddingProvider;
pub use factory::ProviderFactory;
pub use provider::EmbeddingProvider;
pub use service::EmbeddingService;

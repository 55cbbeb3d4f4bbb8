//! Embedding provider implementations and the provider factory.
//!
//! - `LocalEmbeddingProvider`: in-process ONNX model via fastembed
//! - `OpenAiCompatibleProvider`: any OpenAI-compatible `/embeddings` endpoint
//! - `InfraProviderFactory`: builds either from `ProviderSettings`

pub mod factory;
pub mod local;
pub mod remote;

pub use factory::InfraProviderFactory;
pub use local::LocalEmbeddingProvider;
pub use remote::OpenAiCompatibleProvider;

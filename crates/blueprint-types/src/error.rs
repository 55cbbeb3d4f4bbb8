use thiserror::Error;

/// Errors produced while turning text into an embedding vector.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("provider '{provider}' unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("provider '{provider}' returned {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("unknown embedding provider '{0}'")]
    UnknownProvider(String),

    #[error("all providers failed (tried: {}): {last}", attempts.join(", "))]
    AllProvidersFailed {
        attempts: Vec<String>,
        last: Box<EmbeddingError>,
    },
}

impl EmbeddingError {
    /// The innermost provider error, unwrapping an aggregate failure.
    pub fn root_cause(&self) -> &EmbeddingError {
        match self {
            EmbeddingError::AllProvidersFailed { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

/// Errors from repository operations (used by trait definitions in blueprint-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("stale write: {0}")]
    Stale(String),
}

/// Errors crossing the public `BlueprintStore` boundary.
///
/// Only `Connection` and `Schema` are produced at construction time; every
/// per-call failure afterwards is one of the remaining variants.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot connect to {url}: {message}")]
    Connection { url: String, message: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<RepositoryError> for StoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Connection(msg) => StoreError::Storage(format!("connection lost: {msg}")),
            RepositoryError::Conflict(msg) => StoreError::ConstraintViolation(msg),
            RepositoryError::Stale(msg) => StoreError::ConstraintViolation(msg),
            other => StoreError::Storage(other.to_string()),
        }
    }
}

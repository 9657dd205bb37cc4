use thiserror::Error;

/// Error taxonomy for the service. Each variant maps to one recovery
/// strategy and, on the request path, one HTTP status code.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or invalid payload. Surfaced as 400.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Webhook signature missing or wrong. Surfaced as 401.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Ingest queue at capacity. Surfaced as 503 so the crawler retries.
    #[error("Ingest queue is full")]
    Backpressure,

    /// A dependency call failed after retries were exhausted.
    #[error("{dependency} unavailable: {source}")]
    DependencyTransient {
        dependency: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The circuit breaker for a dependency is open; no call was made.
    #[error("{dependency} circuit is open")]
    DependencyUnavailable { dependency: &'static str },

    /// Embedding vector does not match the collection dimension. Fatal:
    /// nothing may be written once this is detected.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Anything unexpected. Surfaced as 500; details logged, not returned.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// True for failures worth retrying against the same dependency.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::DependencyTransient { .. } | ServiceError::DependencyUnavailable { .. }
        )
    }
}

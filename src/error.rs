//! Error handling for the learning-content backend

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, LearnError>;

/// Main error type for the learning-content backend
#[derive(Error, Debug)]
pub enum LearnError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Errors from the LLM orchestration layer
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Quality gate rejected output: {0}")]
    QualityRejected(String),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Timeout: operation took too long")]
    Timeout,

    #[error("Service not configured")]
    NotConfigured,
}

/// Errors from the property-graph store
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph not configured")]
    NotConfigured,

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

impl From<neo4rs::Error> for GraphError {
    fn from(err: neo4rs::Error) -> Self {
        GraphError::QueryFailed(err.to_string())
    }
}

impl From<neo4rs::Error> for LearnError {
    fn from(err: neo4rs::Error) -> Self {
        LearnError::Graph(GraphError::from(err))
    }
}

/// Errors from the chunking pipeline
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Empty text provided")]
    EmptyText,

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Document extraction failed: {0}")]
    ExtractionFailed(String),
}

impl LearnError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LearnError::Llm(LlmError::Timeout)
                | LearnError::Llm(LlmError::ConnectionFailed(_))
                | LearnError::Llm(LlmError::RateLimited)
                | LearnError::Graph(GraphError::ConnectionFailed(_))
                | LearnError::Http(_)
        )
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            LearnError::Llm(_) => "llm",
            LearnError::Graph(_) => "graph",
            LearnError::Chunking(_) => "chunking",
            LearnError::Embedding(_) => "embedding",
            LearnError::Validation(_) => "validation",
            LearnError::Config(_) => "config",
            LearnError::NotFound(_) => "not_found",
            LearnError::Io(_) => "io",
            LearnError::Serialization(_) => "serialization",
            LearnError::Http(_) => "http",
            LearnError::Database(_) => "database",
            LearnError::Generic(_) => "generic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_error = LearnError::Llm(LlmError::Timeout);
        assert!(timeout_error.is_retryable());

        let validation_error = LearnError::Validation("query must not be empty".to_string());
        assert!(!validation_error.is_retryable());
    }

    #[test]
    fn test_error_category() {
        let llm_error = LearnError::Llm(LlmError::CircuitOpen);
        assert_eq!(llm_error.category(), "llm");

        let graph_error = LearnError::Graph(GraphError::NotConfigured);
        assert_eq!(graph_error.category(), "graph");

        let chunk_error = LearnError::Chunking(ChunkError::EmptyText);
        assert_eq!(chunk_error.category(), "chunking");
    }
}

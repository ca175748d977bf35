//! LearnForge Library
//!
//! A learning-content backend that integrates:
//! - Structure-aware PDF chunking with protected math, definitions and examples
//! - A Neo4j property graph with embeddings and prerequisite relationships
//! - LLM orchestration for question generation, query expansion and grading
//! - Transactional learning-path assembly over a relational ticket store
//!
//! # Example
//!
//! ```rust,no_run
//! use learnforge::{api, AppConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let state = api::AppState::new(config).await?;
//!     let router = api::create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod paths;
pub mod pdf;
pub mod store;

// Re-export main types
pub use cache::{cache_key, ArtifactCache, CacheStats};
pub use config::{
    AppConfig, BreakerConfig, CacheConfig, ChunkerConfig, DatabaseConfig, EmbeddingConfig,
    GraphConfig, LlmConfig, RetryConfig, ServerConfig,
};
pub use embedding::{cosine_similarity, EmbeddingClient, RemoteEmbeddingClient};
pub use error::{ChunkError, GraphError, LearnError, LlmError, Result};
pub use evaluation::{AnswerEvaluator, EvaluationOutcome, HistoryEntry};
pub use graph::{
    ChunkRecord, GraphHealth, GraphStore, PrerequisiteType, RelatedChunk, TextbookSubtree,
    VectorHit,
};
pub use ingest::{IngestionPipeline, IngestionSummary};
pub use llm::{
    AcademicContext, BreakerState, CircuitBreaker, Evaluation, GatewayLlmClient,
    GeneratedQuestion, LlmClient, LlmOrchestrator,
};
pub use paths::{ChunkInput, LearningPathBuilder};
pub use pdf::{
    BaseMetadata, BatchReport, Chunk, ChunkMetadata, ChunkingController, ChunkingReport,
    ChunkingRequest, ChunkingStrategy, ContentAwareChunker, ContentType, DetectionResult,
    Document, FallbackChunker, ProtectedRegion, QualityAssessment, QualityAssessor,
    StructureDetector, StructureElement, StructureType,
};
pub use store::{ConceptRecord, LearningPath, PathTicket, Prerequisite, RelationalStore};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}

//! REST API server for the learning-content backend
//!
//! Provides HTTP endpoints for:
//! - Vector search (plain, enhanced, compare, bulk)
//! - Chunk and prerequisite management
//! - Question generation
//! - Learning-path assembly and progress
//! - Answer evaluation
//! - System health

use crate::cache::ArtifactCache;
use crate::config::AppConfig;
use crate::embedding::{EmbeddingClient, RemoteEmbeddingClient};
use crate::error::{GraphError, LearnError, LlmError, Result};
use crate::evaluation::{AnswerEvaluator, EvaluationOutcome, HistoryEntry};
use crate::graph::{GraphHealth, GraphStore, PrerequisiteType, RelatedChunk, VectorHit};
use crate::ingest::{IngestionPipeline, IngestionSummary};
use crate::pdf::document::Document;
use crate::llm::client::GatewayLlmClient;
use crate::llm::orchestrator::{GeneratedQuestion, LlmOrchestrator};
use crate::paths::{ChunkInput, LearningPathBuilder};
use crate::pdf::controller::ChunkingController;
use crate::pdf::structure::StructureDetector;
use crate::store::{PathTicket, ProgressUpdate, RelationalStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub controller: Arc<ChunkingController>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub graph: Arc<GraphStore>,
    pub llm: Arc<LlmOrchestrator>,
    pub store: Arc<RelationalStore>,
    pub paths: Arc<LearningPathBuilder>,
    pub evaluator: Arc<AnswerEvaluator>,
    pub cache: Arc<ArtifactCache>,
    pub ingestion: Arc<IngestionPipeline>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let cache = Arc::new(ArtifactCache::new(config.cache.clone()).await?);

        let llm_client = Arc::new(GatewayLlmClient::new(config.llm.clone())?);
        let llm = Arc::new(LlmOrchestrator::new(
            llm_client,
            config.llm.breaker.clone(),
            Some(Arc::clone(&cache)),
        ));

        let embedder: Arc<dyn EmbeddingClient> =
            Arc::new(RemoteEmbeddingClient::new(config.embedding.clone())?);
        let dimension = embedder.dimension(&config.embedding.model);

        let graph = Arc::new(GraphStore::connect(&config.graph, dimension).await?);
        if graph.is_configured() {
            graph.ensure_indexes().await?;
        }

        let store = Arc::new(RelationalStore::connect(&config.database).await?);
        let controller = Arc::new(ChunkingController::new(config.chunking.clone()));

        let paths = Arc::new(LearningPathBuilder::new(
            Arc::clone(&store),
            Arc::clone(&llm),
        ));
        let evaluator = Arc::new(AnswerEvaluator::new(
            Arc::clone(&store),
            Arc::clone(&llm),
            Some(Arc::clone(&cache)),
        ));
        let ingestion = Arc::new(IngestionPipeline::new(
            StructureDetector::new(
                config.chunking.min_chapters,
                config.chunking.strategy_threshold,
            ),
            Arc::clone(&controller),
            Arc::clone(&embedder),
            Arc::clone(&graph),
        ));

        Ok(Self {
            config,
            controller,
            embedder,
            graph,
            llm,
            store,
            paths,
            evaluator,
            cache,
            ingestion,
        })
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// API error wrapper mapping domain errors onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(LearnError);

impl From<LearnError> for ApiError {
    fn from(err: LearnError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self.0 {
            LearnError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            LearnError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            LearnError::Embedding(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate embedding".to_string(),
            ),
            LearnError::Llm(
                LlmError::CircuitOpen
                | LlmError::Timeout
                | LlmError::ConnectionFailed(_)
                | LlmError::RateLimited
                | LlmError::NotConfigured,
            ) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "LLM service temporarily unavailable".to_string(),
            ),
            LearnError::Graph(GraphError::NotConfigured | GraphError::ConnectionFailed(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Graph service unavailable".to_string(),
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        if status.is_server_error() {
            error!("API error ({}): {}", status, self.0);
        }

        let body = Json(ErrorResponse {
            error: error_message,
            detail: Some(self.0.to_string()),
        });

        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============= Vector search DTOs =============

#[derive(Debug, Deserialize, ToSchema)]
pub struct VectorSearchRequest {
    pub query: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_prerequisites: bool,
    #[serde(default)]
    pub include_dependents: bool,
}

fn default_min_score() -> f64 {
    0.65
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    #[serde(flatten)]
    pub hit: VectorHit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<Vec<RelatedChunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependents: Option<Vec<RelatedChunk>>,
}

#[derive(Debug, Serialize)]
pub struct VectorSearchResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    pub count: usize,
    pub min_score_used: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnhancedSearchRequest {
    pub query: String,
    #[serde(default = "default_sentences")]
    pub generate_sentences: usize,
    #[serde(default = "default_enhanced_min_score")]
    pub min_score: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_true")]
    pub include_prerequisites: bool,
    #[serde(default = "default_true")]
    pub include_generated_context: bool,
}

fn default_sentences() -> usize {
    5
}

fn default_enhanced_min_score() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeneratedContext {
    pub sentences: Vec<String>,
    pub sentence_count: usize,
    pub combined_text: String,
}

#[derive(Debug, Serialize)]
pub struct EnhancedSearchResponse {
    pub original_query: String,
    pub search_method: String,
    pub results: Vec<SearchResultItem>,
    pub result_count: usize,
    pub min_score_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_context: Option<GeneratedContext>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompareSearchRequest {
    pub query: String,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_compare_limit")]
    pub limit: usize,
}

fn default_compare_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkSearchRequest {
    pub queries: Vec<String>,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_bulk_limit")]
    pub limit_per_query: usize,
}

fn default_bulk_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChunkCreateRequest {
    pub content: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub concept: Option<String>,
    #[serde(default)]
    pub has_prerequisite: Vec<String>,
    #[serde(default)]
    pub prerequisite_for: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PrerequisiteRequest {
    pub from_chunk_id: String,
    pub to_chunk_id: String,
    #[serde(default = "default_relationship")]
    pub relationship_type: String,
}

fn default_relationship() -> String {
    "STRONG".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub max_depth: Option<usize>,
}

// ============= LLM DTOs =============

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateQuestionRequest {
    pub chunk_content: String,
    pub concept: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub context: String,
    #[serde(default = "default_question_type")]
    pub question_type: String,
}

fn default_difficulty() -> u8 {
    3
}

fn default_question_type() -> String {
    "comprehension".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateMultipleRequest {
    pub chunk_content: String,
    pub concept: String,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_difficulty_min")]
    pub difficulty_min: u8,
    #[serde(default = "default_difficulty_max")]
    pub difficulty_max: u8,
    #[serde(default)]
    pub question_types: Vec<String>,
}

fn default_count() -> usize {
    3
}

fn default_difficulty_min() -> u8 {
    2
}

fn default_difficulty_max() -> u8 {
    4
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeContentRequest {
    pub text: String,
    #[serde(default = "default_analysis_kind")]
    pub analysis_type: String,
}

fn default_analysis_kind() -> String {
    "difficulty".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateFromChunksRequest {
    pub chunk_ids: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
}

#[derive(Debug, Serialize)]
pub struct ChunkQuestion {
    pub chunk_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<GeneratedQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============= Learning path DTOs =============

#[derive(Debug, Deserialize)]
pub struct CreatePathRequest {
    pub user_id: String,
    pub query: String,
    pub chunks: Vec<ChunkInput>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_difficulty_level")]
    pub difficulty: String,
}

fn default_difficulty_level() -> String {
    "intermediate".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PathFromSearchRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_bulk_limit")]
    pub limit: usize,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_difficulty_level")]
    pub difficulty: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatePathResponse {
    pub path_id: Uuid,
    pub ticket_count: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProgressRequest {
    pub user_id: String,
    pub status: String,
    #[serde(default)]
    pub mastery_score: Option<f64>,
    #[serde(default)]
    pub time_spent_minutes: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

// ============= Evaluation DTOs =============

#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    pub user_id: String,
    pub ticket_id: i64,
    pub answer: String,
    #[serde(default)]
    pub time_spent_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: String,
}

// ============= Ingestion =============

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestTextRequest {
    pub title: String,
    pub subject: String,
    pub text: String,
}

// ============= Health =============

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub graph: GraphHealth,
    pub llm_breaker: String,
    pub llm_configured: bool,
    pub cache_entries: usize,
}

#[derive(OpenApi)]
#[openapi(
    components(schemas(
        ErrorResponse,
        VectorSearchRequest,
        EnhancedSearchRequest,
        CompareSearchRequest,
        BulkSearchRequest,
        ChunkCreateRequest,
        PrerequisiteRequest,
        GeneratedContext,
        GenerateQuestionRequest,
        GenerateMultipleRequest,
        GenerateFromChunksRequest,
        AnalyzeContentRequest,
        PathFromSearchRequest,
        CreatePathResponse,
        ProgressRequest,
        EvaluateRequest,
        IngestTextRequest,
    )),
    tags(
        (name = "vector", description = "Vector similarity search"),
        (name = "llm", description = "Question generation"),
        (name = "tickets", description = "Learning paths and progress"),
        (name = "evaluation", description = "Answer evaluation")
    ),
    info(
        title = "LearnForge API",
        version = "0.2.0",
        description = "Learning-content backend: retrieval, question generation, learning paths and answer evaluation"
    )
)]
struct ApiDoc;

/// OpenAPI document for external tooling.
pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_default()
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Vector search
        .route("/vector/search", post(vector_search_handler))
        .route("/vector/search/enhanced", post(enhanced_search_handler))
        .route("/vector/search/compare", post(compare_search_handler))
        .route("/vector/search/bulk", post(bulk_search_handler))
        .route("/vector/chunks", post(create_chunk_handler))
        .route("/vector/prerequisites", post(create_prerequisite_handler))
        .route(
            "/vector/chunks/{id}/prerequisites",
            get(prerequisites_handler),
        )
        .route("/vector/chunks/{id}/dependents", get(dependents_handler))
        // LLM
        .route("/llm/generate-question", post(generate_question_handler))
        .route(
            "/llm/generate-multiple-questions",
            post(generate_multiple_handler),
        )
        .route("/llm/generate-from-chunks", post(generate_from_chunks_handler))
        .route("/llm/analyze-content", post(analyze_content_handler))
        // Learning paths
        .route("/tickets/learning-paths", post(create_path_handler))
        .route(
            "/tickets/learning-paths/from-vector-search",
            post(path_from_search_handler),
        )
        .route(
            "/tickets/learning-paths/{id}/tickets",
            get(path_tickets_handler),
        )
        .route("/tickets/tickets/{id}/progress", put(progress_handler))
        // Ingestion
        .route("/ingest/textbooks", post(ingest_text_handler))
        // Evaluation
        .route("/evaluation/evaluate", post(evaluate_handler))
        .route("/evaluation/history/{ticket_id}", get(history_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn query_embedding(state: &AppState, query: &str) -> Result<Vec<f32>> {
    let embedding = state.embedder.embed(query).await?;
    if embedding.is_empty() {
        return Err(LearnError::Embedding(
            "Failed to generate embedding".to_string(),
        ));
    }
    Ok(embedding)
}

async fn expand_results(
    state: &AppState,
    hits: Vec<VectorHit>,
    include_prerequisites: bool,
    include_dependents: bool,
) -> Result<Vec<SearchResultItem>> {
    let mut items = Vec::with_capacity(hits.len());

    for hit in hits {
        let prerequisites = if include_prerequisites {
            Some(state.graph.prerequisite_chain(&hit.id, 3).await?)
        } else {
            None
        };
        let dependents = if include_dependents {
            Some(state.graph.dependents(&hit.id, 3).await?)
        } else {
            None
        };
        items.push(SearchResultItem {
            hit,
            prerequisites,
            dependents,
        });
    }

    Ok(items)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let graph = state.graph.health_check().await;
    let cache_entries = state
        .cache
        .stats()
        .await
        .map(|s| s.total_entries)
        .unwrap_or(0);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        environment: state.config.server.environment.clone(),
        graph,
        llm_breaker: state.llm.breaker_state().as_str().to_string(),
        llm_configured: state.llm.is_configured(),
        cache_entries,
    })
}

async fn vector_search_handler(
    State(state): State<AppState>,
    Json(request): Json<VectorSearchRequest>,
) -> ApiResult<Json<VectorSearchResponse>> {
    let embedding = match &request.embedding {
        Some(embedding) if !embedding.is_empty() => embedding.clone(),
        _ => query_embedding(&state, &request.query).await?,
    };

    let hits = state
        .graph
        .vector_search(&embedding, request.min_score, request.limit)
        .await?;
    let count = hits.len();

    let results = expand_results(
        &state,
        hits,
        request.include_prerequisites,
        request.include_dependents,
    )
    .await?;

    Ok(Json(VectorSearchResponse {
        query: request.query,
        results,
        count,
        min_score_used: request.min_score,
    }))
}

async fn enhanced_search_handler(
    State(state): State<AppState>,
    Json(request): Json<EnhancedSearchRequest>,
) -> ApiResult<Json<EnhancedSearchResponse>> {
    info!("Generating academic context for query: {}", request.query);

    let expansion = state
        .llm
        .expand_query(&request.query, request.generate_sentences)
        .await;

    let (embedding, search_method, context) = match expansion {
        Ok(context) => {
            let embedding = query_embedding(&state, &context.combined_text).await?;
            (embedding, "enhanced", Some(context))
        }
        Err(e) => {
            // LLM failure degrades to a raw-query search.
            info!("LLM expansion failed, falling back to regular search: {}", e);
            let embedding = query_embedding(&state, &request.query).await?;
            (embedding, "fallback", None)
        }
    };

    let hits = state
        .graph
        .vector_search(&embedding, request.min_score, request.limit)
        .await?;
    let result_count = hits.len();

    let results = expand_results(&state, hits, request.include_prerequisites, false).await?;

    let generated_context = context.filter(|_| request.include_generated_context).map(|c| {
        GeneratedContext {
            sentence_count: c.sentence_count,
            sentences: c.sentences,
            combined_text: c.combined_text,
        }
    });

    Ok(Json(EnhancedSearchResponse {
        original_query: request.query,
        search_method: search_method.to_string(),
        results,
        result_count,
        min_score_used: request.min_score,
        generated_context,
    }))
}

async fn compare_search_handler(
    State(state): State<AppState>,
    Json(request): Json<CompareSearchRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let regular_embedding = query_embedding(&state, &request.query).await?;
    let regular_results = state
        .graph
        .vector_search(&regular_embedding, request.min_score, request.limit)
        .await?;

    let expansion = state.llm.expand_query(&request.query, 5).await;
    let (enhanced_results, sentences) = match &expansion {
        Ok(context) => {
            let enhanced_embedding = query_embedding(&state, &context.combined_text).await?;
            let results = state
                .graph
                .vector_search(&enhanced_embedding, request.min_score, request.limit)
                .await?;
            (results, context.sentences.clone())
        }
        Err(_) => (Vec::new(), Vec::new()),
    };

    let regular_ids: std::collections::HashSet<&String> =
        regular_results.iter().map(|r| &r.id).collect();
    let enhanced_ids: std::collections::HashSet<&String> =
        enhanced_results.iter().map(|r| &r.id).collect();
    let common = regular_ids.intersection(&enhanced_ids).count();
    let max_side = regular_ids.len().max(enhanced_ids.len()).max(1);

    Ok(Json(serde_json::json!({
        "query": request.query,
        "comparison": {
            "regular_search": {
                "result_count": regular_results.len(),
                "top_scores": regular_results.iter().take(5).map(|r| r.score).collect::<Vec<_>>(),
                "unique_results": regular_ids.len() - common,
            },
            "enhanced_search": {
                "result_count": enhanced_results.len(),
                "top_scores": enhanced_results.iter().take(5).map(|r| r.score).collect::<Vec<_>>(),
                "unique_results": enhanced_ids.len() - common,
                "generated_sentences": sentences,
            },
            "overlap": {
                "common_results": common,
                "percentage": (common as f64 / max_side as f64) * 100.0,
            }
        },
        "regular_results": regular_results.iter().take(5).collect::<Vec<_>>(),
        "enhanced_results": enhanced_results.iter().take(5).collect::<Vec<_>>(),
    })))
}

async fn bulk_search_handler(
    State(state): State<AppState>,
    Json(request): Json<BulkSearchRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(request.queries.len());
    for query in &request.queries {
        embeddings.push(state.embedder.embed(query).await.ok());
    }

    let valid: Vec<Vec<f32>> = embeddings.iter().flatten().cloned().collect();
    if valid.is_empty() {
        return Err(
            LearnError::Embedding("Failed to generate any embeddings".to_string()).into(),
        );
    }

    let results = state
        .graph
        .bulk_vector_search(&valid, request.min_score, request.limit_per_query)
        .await?;

    let mut searches = Vec::with_capacity(request.queries.len());
    let mut result_index = 0usize;
    for (query, embedding) in request.queries.iter().zip(embeddings.iter()) {
        if embedding.is_some() {
            let hits = results.get(result_index).cloned().unwrap_or_default();
            result_index += 1;
            let count = hits.len();
            searches.push(serde_json::json!({
                "query": query,
                "results": hits,
                "count": count,
            }));
        } else {
            searches.push(serde_json::json!({
                "query": query,
                "results": [],
                "count": 0,
                "error": "Failed to generate embedding",
            }));
        }
    }

    Ok(Json(serde_json::json!({
        "searches": searches,
        "total_queries": request.queries.len(),
        "successful_queries": valid.len(),
    })))
}

async fn create_chunk_handler(
    State(state): State<AppState>,
    Json(request): Json<ChunkCreateRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if request.content.trim().is_empty() {
        return Err(LearnError::Validation("content must not be empty".to_string()).into());
    }

    let embedding = query_embedding(&state, &request.content).await?;

    let digest = Sha256::digest(request.content.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    let chunk_id = format!("chunk_{}", hex);

    state
        .graph
        .create_chunk(
            &chunk_id,
            &request.content,
            &embedding,
            request.subject.as_deref(),
            request.concept.as_deref(),
            &request.has_prerequisite,
            &request.prerequisite_for,
        )
        .await?;

    for prereq_id in &request.has_prerequisite {
        state
            .graph
            .create_prerequisite(&chunk_id, prereq_id, PrerequisiteType::Strong)
            .await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "chunk_id": chunk_id,
            "message": "Chunk created successfully",
        })),
    ))
}

async fn create_prerequisite_handler(
    State(state): State<AppState>,
    Json(request): Json<PrerequisiteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .graph
        .create_prerequisite(
            &request.from_chunk_id,
            &request.to_chunk_id,
            PrerequisiteType::parse(&request.relationship_type),
        )
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Prerequisite relationship created successfully",
    })))
}

async fn prerequisites_handler(
    State(state): State<AppState>,
    Path(chunk_id): Path<String>,
    Query(params): Query<DepthQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let max_depth = params.max_depth.unwrap_or(5);
    let prerequisites = state.graph.prerequisite_chain(&chunk_id, max_depth).await?;
    let count = prerequisites.len();

    Ok(Json(serde_json::json!({
        "chunk_id": chunk_id,
        "prerequisites": prerequisites,
        "count": count,
        "max_depth": max_depth,
    })))
}

async fn dependents_handler(
    State(state): State<AppState>,
    Path(chunk_id): Path<String>,
    Query(params): Query<DepthQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let max_depth = params.max_depth.unwrap_or(3);
    let dependents = state.graph.dependents(&chunk_id, max_depth).await?;
    let count = dependents.len();

    Ok(Json(serde_json::json!({
        "chunk_id": chunk_id,
        "dependents": dependents,
        "count": count,
        "max_depth": max_depth,
    })))
}

async fn generate_question_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateQuestionRequest>,
) -> ApiResult<Json<GeneratedQuestion>> {
    if !(1..=5).contains(&request.difficulty) {
        return Err(
            LearnError::Validation("difficulty must be between 1 and 5".to_string()).into(),
        );
    }

    let question = state
        .llm
        .generate_question(
            &request.chunk_content,
            &request.concept,
            request.difficulty,
            &request.context,
            &request.question_type,
        )
        .await?;

    Ok(Json(question))
}

async fn generate_multiple_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateMultipleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if request.difficulty_min > request.difficulty_max {
        return Err(LearnError::Validation(
            "difficulty_min must not exceed difficulty_max".to_string(),
        )
        .into());
    }

    let questions = state
        .llm
        .generate_questions(
            &request.chunk_content,
            &request.concept,
            request.count,
            (request.difficulty_min, request.difficulty_max),
            &request.question_types,
        )
        .await;

    let count = questions.len();
    Ok(Json(serde_json::json!({
        "questions": questions,
        "count": count,
        "requested": request.count,
    })))
}

async fn generate_from_chunks_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateFromChunksRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if request.chunk_ids.is_empty() {
        return Err(LearnError::Validation("chunk_ids must not be empty".to_string()).into());
    }

    let mut questions = Vec::with_capacity(request.chunk_ids.len());
    for chunk_id in &request.chunk_ids {
        let Some(chunk) = state.graph.get_chunk(chunk_id).await? else {
            questions.push(ChunkQuestion {
                chunk_id: chunk_id.clone(),
                question: None,
                error: Some("Chunk not found".to_string()),
            });
            continue;
        };

        let concept = chunk.concept.clone().unwrap_or_else(|| chunk_id.clone());
        match state
            .llm
            .generate_question(
                &chunk.content,
                &concept,
                request.difficulty,
                "",
                "comprehension",
            )
            .await
        {
            Ok(question) => questions.push(ChunkQuestion {
                chunk_id: chunk_id.clone(),
                question: Some(question),
                error: None,
            }),
            Err(e) => questions.push(ChunkQuestion {
                chunk_id: chunk_id.clone(),
                question: None,
                error: Some(e.to_string()),
            }),
        }
    }

    let generated = questions.iter().filter(|q| q.question.is_some()).count();
    Ok(Json(serde_json::json!({
        "questions": questions,
        "generated": generated,
        "requested": request.chunk_ids.len(),
    })))
}

async fn analyze_content_handler(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeContentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let valid_kinds = ["difficulty", "concepts", "readability"];
    if !valid_kinds.contains(&request.analysis_type.as_str()) {
        return Err(LearnError::Validation(format!(
            "analysis_type must be one of {:?}",
            valid_kinds
        ))
        .into());
    }

    let analysis = state
        .llm
        .analyze_content(&request.text, &request.analysis_type)
        .await?;

    Ok(Json(serde_json::json!({
        "analysis_type": request.analysis_type,
        "analysis": analysis,
    })))
}

async fn create_path_handler(
    State(state): State<AppState>,
    Json(request): Json<CreatePathRequest>,
) -> ApiResult<(StatusCode, Json<CreatePathResponse>)> {
    let path_id = state
        .paths
        .create_path(
            &request.user_id,
            &request.query,
            &request.chunks,
            request.title,
            &request.difficulty,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePathResponse {
            path_id,
            ticket_count: request.chunks.len(),
        }),
    ))
}

async fn path_from_search_handler(
    State(state): State<AppState>,
    Json(request): Json<PathFromSearchRequest>,
) -> ApiResult<(StatusCode, Json<CreatePathResponse>)> {
    let embedding = query_embedding(&state, &request.query).await?;
    let hits = state
        .graph
        .vector_search(&embedding, request.min_score, request.limit)
        .await?;

    if hits.is_empty() {
        return Err(LearnError::NotFound(
            "No relevant chunks found for the query".to_string(),
        )
        .into());
    }

    let chunks: Vec<ChunkInput> = hits
        .into_iter()
        .map(|hit| ChunkInput {
            concept: hit.concept.clone().unwrap_or_else(|| hit.id.clone()),
            subject: hit.subject.clone().unwrap_or_else(|| "general".to_string()),
            id: hit.id,
            content: hit.content,
            score: hit.score,
            has_prerequisite: hit.has_prerequisite,
            prerequisite_for: hit.prerequisite_for,
            metadata: Default::default(),
        })
        .collect();
    let ticket_count = chunks.len();

    let path_id = state
        .paths
        .create_path(
            &request.user_id,
            &request.query,
            &chunks,
            request.title,
            &request.difficulty,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePathResponse {
            path_id,
            ticket_count,
        }),
    ))
}

async fn path_tickets_handler(
    State(state): State<AppState>,
    Path(path_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PathTicket>>> {
    let tickets = state.store.path_tickets(path_id).await?;
    if tickets.is_empty() {
        return Err(LearnError::NotFound(format!("No tickets for path {}", path_id)).into());
    }
    Ok(Json(tickets))
}

async fn progress_handler(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
    Json(request): Json<ProgressRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let valid_statuses = ["not_started", "in_progress", "completed", "mastered"];
    if !valid_statuses.contains(&request.status.as_str()) {
        return Err(LearnError::Validation(format!(
            "status must be one of {:?}",
            valid_statuses
        ))
        .into());
    }

    let Some(concept_id) = state.store.concept_for_ticket(ticket_id).await? else {
        return Err(
            LearnError::NotFound(format!("No concept found for ticket {}", ticket_id)).into(),
        );
    };

    state
        .store
        .upsert_progress(&ProgressUpdate {
            user_id: request.user_id.clone(),
            concept_id,
            ticket_id,
            status: request.status.clone(),
            mastery_score: request.mastery_score,
            time_spent_minutes: request.time_spent_minutes.unwrap_or(0),
            notes: request.notes.clone(),
        })
        .await?;

    match request.status.as_str() {
        "mastered" => {
            state
                .store
                .close_ticket_mastered(ticket_id, &request.user_id)
                .await?;
        }
        "completed" => {
            state
                .store
                .update_ticket_status(ticket_id, "accepted", &request.user_id)
                .await?;
        }
        _ => {}
    }

    Ok(Json(serde_json::json!({
        "ticket_id": ticket_id,
        "status": request.status,
        "message": "Progress updated",
    })))
}

async fn ingest_text_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestTextRequest>,
) -> ApiResult<(StatusCode, Json<IngestionSummary>)> {
    if request.text.trim().is_empty() {
        return Err(LearnError::Validation("text must not be empty".to_string()).into());
    }

    let document = Document::from_text(request.text.as_bytes(), request.text.clone());
    let summary = state
        .ingestion
        .ingest_document(&document, &request.title, &request.subject)
        .await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

async fn evaluate_handler(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> ApiResult<Json<EvaluationOutcome>> {
    if request.answer.trim().is_empty() {
        return Err(LearnError::Validation("answer must not be empty".to_string()).into());
    }

    let outcome = state
        .evaluator
        .evaluate(
            &request.user_id,
            request.ticket_id,
            &request.answer,
            request.time_spent_minutes,
        )
        .await?;

    Ok(Json(outcome))
}

async fn history_handler(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
    Query(params): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let history = state.evaluator.history(&params.user_id, ticket_id).await?;
    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (
                LearnError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                LearnError::NotFound("missing".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                LearnError::Llm(LlmError::CircuitOpen),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LearnError::Graph(GraphError::NotConfigured),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LearnError::Embedding("empty".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_request_defaults() {
        let request: VectorSearchRequest =
            serde_json::from_str(r#"{"query": "binary trees"}"#).unwrap();
        assert!((request.min_score - 0.65).abs() < 1e-9);
        assert_eq!(request.limit, 20);
        assert!(!request.include_prerequisites);

        let request: EnhancedSearchRequest =
            serde_json::from_str(r#"{"query": "binary trees"}"#).unwrap();
        assert_eq!(request.generate_sentences, 5);
        assert!((request.min_score - 0.7).abs() < 1e-9);
        assert!(request.include_prerequisites);
    }

    #[test]
    fn test_openapi_document_builds() {
        let doc = openapi_json();
        assert!(doc.get("info").is_some());
    }
}

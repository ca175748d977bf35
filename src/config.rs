//! Configuration management for the learning-content backend

use crate::error::{LearnError, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Relational database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Property-graph settings
    #[serde(default)]
    pub graph: GraphConfig,

    /// LLM gateway settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding backend settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking pipeline settings
    #[serde(default)]
    pub chunking: ChunkerConfig,

    /// Artifact cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Comma-separated allowed CORS origins ("*" for any)
    #[serde(default = "default_origins")]
    pub allowed_origins: String,

    /// Deployment environment name
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Relational database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Query timeout in seconds
    #[serde(default = "default_sql_timeout")]
    pub query_timeout_secs: u64,
}

/// Property-graph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Neo4j bolt URI; empty disables the graph store
    #[serde(default)]
    pub uri: String,

    /// Username for the graph connection
    #[serde(default = "default_neo4j_user")]
    pub username: String,

    /// Password for the graph connection
    #[serde(default)]
    pub password: String,

    /// Query timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub query_timeout_secs: u64,
}

/// LLM gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API gateway base URL
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Bearer token for the gateway; empty disables generation
    #[serde(default)]
    pub api_key: String,

    /// Model used for generation
    #[serde(default = "default_text_model")]
    pub model: String,

    /// Maximum tokens per generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker policy
    #[serde(default)]
    pub breaker: BreakerConfig,
}

/// Retry policy for gateway calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts after the first try
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in seconds
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,

    /// Delay cap in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,

    /// Exponential backoff base
    #[serde(default = "default_exp_base")]
    pub exponential_base: f64,
}

/// Circuit breaker policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before opening
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before a half-open probe
    #[serde(default = "default_breaker_timeout")]
    pub timeout_secs: u64,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding endpoint base URL
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Bearer token; falls back to the LLM key when empty
    #[serde(default)]
    pub api_key: String,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

/// Chunking pipeline configuration with documented defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target chunk size in characters
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    /// Minimum acceptable chunk size
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Maximum acceptable chunk size
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Overlap between adjacent chunks within a section
    #[serde(default = "default_overlap")]
    pub overlap_size: usize,

    /// Keep mathematical content as complete units
    #[serde(default = "default_true")]
    pub preserve_math: bool,

    /// Keep definitions with their explanations
    #[serde(default = "default_true")]
    pub preserve_definitions: bool,

    /// Keep examples with their solutions
    #[serde(default = "default_true")]
    pub preserve_examples: bool,

    /// Allow concurrent batch workers over the shared statistics; when
    /// false, batches process on a single worker
    #[serde(default = "default_true")]
    pub thread_safe: bool,

    /// Worker pool size for batch chunking (ignored when `thread_safe` is
    /// false)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Quality score threshold for content-aware strategy
    #[serde(default = "default_strategy_threshold")]
    pub strategy_threshold: f64,

    /// Minimum chapters for a valid textbook structure
    #[serde(default = "default_min_chapters")]
    pub min_chapters: usize,
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable or disable caching
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite database path ("sqlite::memory:" for ephemeral)
    #[serde(default = "default_cache_db")]
    pub db_path: String,

    /// Maximum number of cache entries
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    /// Default time-to-live in seconds
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: i64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_origins() -> String {
    "*".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_database_url() -> String {
    "sqlite:learnforge.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_sql_timeout() -> u64 {
    10
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_graph_timeout() -> u64 {
    30
}

fn default_gateway_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_text_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    60.0
}

fn default_exp_base() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_timeout() -> u64 {
    60
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_target_size() -> usize {
    1250
}

fn default_min_size() -> usize {
    300
}

fn default_max_size() -> usize {
    1500
}

fn default_overlap() -> usize {
    150
}

fn default_max_workers() -> usize {
    4
}

fn default_strategy_threshold() -> f64 {
    0.3
}

fn default_min_chapters() -> usize {
    3
}

fn default_cache_db() -> String {
    "cache.db".to_string()
}

fn default_cache_entries() -> usize {
    1000
}

fn default_cache_ttl() -> i64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_origins(),
            environment: default_environment(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            query_timeout_secs: default_sql_timeout(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            username: default_neo4j_user(),
            password: String::new(),
            query_timeout_secs: default_graph_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            api_key: String::new(),
            model: default_text_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            exponential_base: default_exp_base(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_secs: default_breaker_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            api_key: String::new(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            min_size: default_min_size(),
            max_size: default_max_size(),
            overlap_size: default_overlap(),
            preserve_math: true,
            preserve_definitions: true,
            preserve_examples: true,
            thread_safe: true,
            max_workers: default_max_workers(),
            strategy_threshold: default_strategy_threshold(),
            min_chapters: default_min_chapters(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_cache_db(),
            max_entries: default_cache_entries(),
            default_ttl_secs: default_cache_ttl(),
        }
    }
}

impl ChunkerConfig {
    /// Fallback-strategy variant of this configuration
    pub fn fallback_variant(&self) -> Self {
        Self {
            target_size: 1000,
            overlap_size: 200,
            ..self.clone()
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// Recognized variables: `DATABASE_URL`, `NEO4J_URI`, `NEO4J_USERNAME`,
    /// `NEO4J_PASSWORD`, `LLM_API_KEY`, `API_GATEWAY_URL`, `LOG_LEVEL`,
    /// `ENVIRONMENT`, `ALLOWED_ORIGINS`, plus any `LEARNFORGE__`-prefixed
    /// override of the nested structure (e.g. `LEARNFORGE__SERVER__PORT`).
    pub fn from_env() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("LEARNFORGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| LearnError::Config(e.to_string()))?;

        let mut cfg: AppConfig = builder
            .try_deserialize()
            .unwrap_or_else(|_| AppConfig::default());

        // Well-known flat variables take precedence over the prefixed form.
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }
        if let Ok(uri) = std::env::var("NEO4J_URI") {
            cfg.graph.uri = uri;
        }
        if let Ok(user) = std::env::var("NEO4J_USERNAME") {
            cfg.graph.username = user;
        }
        if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
            cfg.graph.password = password;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            cfg.llm.api_key = key.clone();
            if cfg.embedding.api_key.is_empty() {
                cfg.embedding.api_key = key;
            }
        }
        if let Ok(url) = std::env::var("API_GATEWAY_URL") {
            cfg.llm.gateway_url = url.clone();
            cfg.embedding.gateway_url = url;
        }
        if let Ok(env) = std::env::var("ENVIRONMENT") {
            cfg.server.environment = env;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            cfg.server.allowed_origins = origins;
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.chunking.target_size, 1250);
        assert_eq!(config.chunking.min_size, 300);
        assert_eq!(config.chunking.max_size, 1500);
        assert_eq!(config.chunking.max_workers, 4);
        assert_eq!(config.llm.retry.max_retries, 3);
        assert_eq!(config.llm.breaker.failure_threshold, 5);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.cache.default_ttl_secs, 3600);
    }

    #[test]
    fn test_fallback_variant() {
        let config = ChunkerConfig::default();
        let fallback = config.fallback_variant();
        assert_eq!(fallback.target_size, 1000);
        assert_eq!(fallback.overlap_size, 200);
        assert_eq!(fallback.min_size, config.min_size);
        assert_eq!(fallback.max_size, config.max_size);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.chunking.overlap_size, config.chunking.overlap_size);
    }
}

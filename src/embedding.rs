//! Embedding generation via a remote model endpoint
//!
//! Batch calls return one slot per input; a failed slot is `None` and
//! callers must handle the gap. Cosine similarity is computed in-process.

use crate::config::EmbeddingConfig;
use crate::error::{LearnError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Trait for embedding backends
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts; failed slots are `None`
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>>;

    /// Embedding dimension for a model name
    fn dimension(&self, model: &str) -> usize;
}

/// Remote embedding client against an OpenAI-style `/embeddings` endpoint
pub struct RemoteEmbeddingClient {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl RemoteEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LearnError::Http)?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/embeddings",
            self.config.gateway_url.trim_end_matches('/')
        )
    }

    async fn request(&self, input: EmbeddingInput<'_>) -> Result<EmbeddingResponse> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input,
        };

        let response = timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| LearnError::Embedding("embedding request timed out".to_string()))?
        .map_err(|e| LearnError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Embedding API error {}: {}", status, body);
            return Err(LearnError::Embedding(format!(
                "embedding request failed with status {status}"
            )));
        }

        response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| LearnError::Embedding(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingClient for RemoteEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(LearnError::Embedding("empty text".to_string()));
        }

        debug!("Generating embedding for text of length {}", text.len());
        let mut response = self.request(EmbeddingInput::Single(text)).await?;

        let first = response
            .data
            .drain(..)
            .next()
            .ok_or_else(|| LearnError::Embedding("empty embedding response".to_string()))?;

        info!("Generated embedding with dimension {}", first.embedding.len());
        Ok(first.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());
        match self.request(EmbeddingInput::Batch(texts)).await {
            Ok(response) => {
                let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
                for (fallback_index, data) in response.data.into_iter().enumerate() {
                    let index = data.index.unwrap_or(fallback_index);
                    if index < slots.len() {
                        slots[index] = Some(data.embedding);
                    }
                }
                Ok(slots)
            }
            Err(e) => {
                // Backend failure degrades to empty slots rather than
                // aborting the whole batch.
                error!("Batch embedding failed: {}", e);
                Ok(vec![None; texts.len()])
            }
        }
    }

    fn dimension(&self, model: &str) -> usize {
        dimension_for(model)
    }
}

/// Known embedding dimensions by model name
pub fn dimension_for(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        "all-MiniLM-L6-v2" => 384,
        "all-mpnet-base-v2" => 768,
        _ => 1536,
    }
}

/// Cosine similarity between two vectors; 0.0 on length mismatch or zero
/// norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Rank candidate embeddings against a query, best first.
pub fn find_most_similar(
    query: &[f32],
    candidates: &[Vec<f32>],
    top_k: usize,
) -> Vec<(usize, f32)> {
    let mut similarities: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
        .collect();

    similarities.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    similarities.truncate(top_k);
    similarities
}

//! Hybrid chunking controller
//!
//! Orchestrates assessment → strategy selection → chunking → validation,
//! with text preprocessing, batch processing over a bounded worker pool,
//! and mutex-guarded global counters.

use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::pdf::content_aware::{ChunkerOutput, ContentAwareChunker};
use crate::pdf::fallback::FallbackChunker;
use crate::pdf::metadata::{BaseMetadata, Chunk};
use crate::pdf::quality::{ChunkingStrategy, QualityAssessment, QualityAssessor};
use crate::pdf::structure::{StructureDetector, StructureElement};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A single chunking request
#[derive(Debug, Clone)]
pub struct ChunkingRequest {
    pub text: String,
    pub document_id: String,
    pub base: BaseMetadata,
    pub elements: Vec<StructureElement>,
    pub force_strategy: Option<ChunkingStrategy>,
}

impl ChunkingRequest {
    pub fn new(text: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            document_id: document_id.into(),
            base: BaseMetadata::default(),
            elements: Vec::new(),
            force_strategy: None,
        }
    }
}

/// Aggregate chunk statistics for one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingStatistics {
    pub total_chunks: usize,
    pub avg_chunk_size: f64,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub median_chunk_size: usize,
    pub size_std_dev: f64,
    pub total_characters: usize,
    pub total_words: usize,
    pub avg_words_per_chunk: f64,
    pub content_type_distribution: HashMap<String, usize>,
    pub avg_difficulty: f64,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub chunks_within_target: f64,
    pub structure_quality_score: f64,
}

/// Complete result of a controller run over one document
#[derive(Debug)]
pub struct ChunkingReport {
    pub chunks: Vec<Chunk>,
    pub strategy_used: ChunkingStrategy,
    pub quality: Option<QualityAssessment>,
    pub processing_time: Duration,
    pub chunks_per_second: f64,
    pub statistics: ChunkingStatistics,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Aggregated result of a batch run
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<ChunkingReport>,
    pub total_documents: usize,
    pub successful_documents: usize,
    pub failed_documents: usize,
    pub total_processing_time: Duration,
    pub average_chunks_per_document: f64,
    pub docs_per_second: f64,
    pub chunks_per_second: f64,
    pub errors: Vec<String>,
}

/// Global counters across controller runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_documents: usize,
    pub content_aware_used: usize,
    pub fallback_used: usize,
    pub hybrid_used: usize,
    pub total_chunks_created: usize,
    pub total_processing_secs: f64,
}

/// Hybrid content chunking controller.
pub struct ChunkingController {
    config: ChunkerConfig,
    detector: StructureDetector,
    assessor: QualityAssessor,
    content_aware: ContentAwareChunker,
    fallback: FallbackChunker,
    stats: Mutex<ProcessingStats>,
    blank_runs_re: Regex,
    spaces_re: Regex,
    page_header_re: Regex,
    format_bar_re: Regex,
}

impl ChunkingController {
    pub fn new(config: ChunkerConfig) -> Self {
        let assessor = QualityAssessor::new(config.strategy_threshold, 2);
        let content_aware = ContentAwareChunker::new(config.clone());
        let fallback = FallbackChunker::new(config.fallback_variant());

        Self {
            detector: StructureDetector::new(config.min_chapters, config.strategy_threshold),
            assessor,
            content_aware,
            fallback,
            config,
            stats: Mutex::new(ProcessingStats::default()),
            blank_runs_re: Regex::new(r"\n\s*\n\s*\n+").expect("blank-run regex must compile"),
            spaces_re: Regex::new(r" +").expect("spaces regex must compile"),
            page_header_re: Regex::new(r"(?m)^\s*Page \d+[^\n]*$").expect("page regex must compile"),
            format_bar_re: Regex::new(r"(?m)^[-_]{5,}[^\n]*$").expect("bar regex must compile"),
        }
    }

    /// Chunk one document: preprocess, pick a strategy, chunk, validate.
    pub fn chunk(&self, request: &ChunkingRequest) -> Result<ChunkingReport> {
        let start_time = Instant::now();

        if request.text.trim().is_empty() {
            return Ok(self.empty_report("Empty text provided", start_time));
        }

        let text = self.preprocess(&request.text);

        let (strategy, quality) = match request.force_strategy {
            Some(forced) => {
                info!("Using forced strategy: {}", forced.as_str());
                (forced, None)
            }
            None => {
                let detection = self
                    .detector
                    .result_from_elements(request.elements.clone(), text.len());
                let assessment = self.assessor.assess(&detection);
                info!(
                    "Selected strategy {} (quality {:.2})",
                    assessment.recommended_strategy.as_str(),
                    assessment.overall_quality_score
                );
                (assessment.recommended_strategy, Some(assessment))
            }
        };

        let mut output = self.execute_strategy(strategy, &text, request);

        let chunks = self.postprocess(std::mem::take(&mut output.chunks), &request.document_id);

        let processing_time = start_time.elapsed();
        let chunks_per_second =
            chunks.len() as f64 / processing_time.as_secs_f64().max(0.001);

        let statistics = calculate_statistics(&chunks, &quality);
        let mut warnings = output.warnings;
        warnings.extend(generate_warnings(&chunks, &statistics, &quality));
        let recommendations = generate_recommendations(&statistics, &quality);

        self.record_run(strategy, chunks.len(), processing_time);

        info!(
            "Chunking complete for {}: {} chunks in {:.2}s",
            request.document_id,
            chunks.len(),
            processing_time.as_secs_f64()
        );

        Ok(ChunkingReport {
            chunks,
            strategy_used: strategy,
            quality,
            processing_time,
            chunks_per_second,
            statistics,
            warnings,
            recommendations,
        })
    }

    /// Process many requests in parallel on a bounded worker pool.
    /// Results come back in input order; failures land in `errors` with
    /// their originating document id. With `thread_safe` off the batch
    /// runs on a single worker.
    pub async fn chunk_batch(
        self: &Arc<Self>,
        requests: Vec<ChunkingRequest>,
        max_workers: Option<usize>,
    ) -> BatchReport {
        let start_time = Instant::now();
        let workers = if self.config.thread_safe {
            max_workers.unwrap_or(self.config.max_workers).max(1)
        } else {
            1
        };
        let total_documents = requests.len();

        info!(
            "Batch chunking {} documents with {} workers",
            total_documents, workers
        );

        let indexed = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| {
                let controller = Arc::clone(self);
                async move {
                    let document_id = request.document_id.clone();
                    let joined = tokio::task::spawn_blocking(move || controller.chunk(&request))
                        .await;
                    let outcome = match joined {
                        Ok(result) => result,
                        Err(e) => Err(crate::error::LearnError::Generic(anyhow::anyhow!(
                            "chunking task panicked: {e}"
                        ))),
                    };
                    (index, document_id, outcome)
                }
            })
            .buffer_unordered(workers)
            .collect::<Vec<_>>()
            .await;

        let mut slots: Vec<Option<ChunkingReport>> =
            (0..total_documents).map(|_| None).collect();
        let mut errors = Vec::new();

        for (index, document_id, outcome) in indexed {
            match outcome {
                Ok(report) => slots[index] = Some(report),
                Err(e) => {
                    let message = format!("Failed to process {}: {}", document_id, e);
                    warn!("{}", message);
                    errors.push(message);
                }
            }
        }

        let results: Vec<ChunkingReport> = slots.into_iter().flatten().collect();
        let total_processing_time = start_time.elapsed();
        let successful_documents = results.len();
        let failed_documents = errors.len();
        let total_chunks: usize = results.iter().map(|r| r.chunks.len()).sum();
        let elapsed = total_processing_time.as_secs_f64().max(0.001);

        BatchReport {
            average_chunks_per_document: total_chunks as f64
                / successful_documents.max(1) as f64,
            docs_per_second: successful_documents as f64 / elapsed,
            chunks_per_second: total_chunks as f64 / elapsed,
            results,
            total_documents,
            successful_documents,
            failed_documents,
            total_processing_time,
            errors,
        }
    }

    /// Snapshot of the global counters.
    pub fn statistics(&self) -> ProcessingStats {
        self.stats
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Zero the global counters.
    pub fn reset_statistics(&self) {
        if let Ok(mut guard) = self.stats.lock() {
            *guard = ProcessingStats::default();
        }
    }

    fn execute_strategy(
        &self,
        strategy: ChunkingStrategy,
        text: &str,
        request: &ChunkingRequest,
    ) -> ChunkerOutput {
        match strategy {
            ChunkingStrategy::ContentAware => self.content_aware.chunk(
                text,
                &request.elements,
                &request.document_id,
                &request.base,
            ),
            ChunkingStrategy::Fallback => {
                self.fallback.chunk(text, &request.document_id, &request.base)
            }
            ChunkingStrategy::Hybrid => {
                let attempt = self.content_aware.chunk(
                    text,
                    &request.elements,
                    &request.document_id,
                    &request.base,
                );
                let mean_confidence = if attempt.chunks.is_empty() {
                    0.0
                } else {
                    attempt
                        .chunks
                        .iter()
                        .map(|c| c.metadata.confidence)
                        .sum::<f64>()
                        / attempt.chunks.len() as f64
                };

                if attempt.chunks.is_empty() || mean_confidence < 0.6 {
                    warn!(
                        "Content-aware attempt unsatisfactory (chunks={}, confidence={:.2}), retrying with fallback",
                        attempt.chunks.len(),
                        mean_confidence
                    );
                    self.fallback.chunk(text, &request.document_id, &request.base)
                } else {
                    attempt
                }
            }
        }
    }

    /// Collapse blank-line runs, strip page headers/footers and formatting
    /// bars before chunking.
    fn preprocess(&self, text: &str) -> String {
        let text = self.page_header_re.replace_all(text, "");
        let text = self.format_bar_re.replace_all(&text, "");
        let text = self.blank_runs_re.replace_all(&text, "\n\n");
        let text = self.spaces_re.replace_all(&text, " ");
        text.trim().to_string()
    }

    /// Drop low-quality chunks and renumber ids sequentially.
    fn postprocess(&self, chunks: Vec<Chunk>, document_id: &str) -> Vec<Chunk> {
        let mut kept: Vec<Chunk> = chunks
            .into_iter()
            .filter(|chunk| {
                if validate_chunk(chunk) {
                    true
                } else {
                    warn!(
                        "Chunk {} failed quality validation and was dropped",
                        chunk.metadata.chunk_id
                    );
                    false
                }
            })
            .collect();

        for (i, chunk) in kept.iter_mut().enumerate() {
            chunk.metadata.chunk_id = format!("{}_chunk_{:04}", document_id, i);
        }

        kept
    }

    fn record_run(&self, strategy: ChunkingStrategy, chunk_count: usize, elapsed: Duration) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.total_documents += 1;
            stats.total_chunks_created += chunk_count;
            stats.total_processing_secs += elapsed.as_secs_f64();
            match strategy {
                ChunkingStrategy::ContentAware => stats.content_aware_used += 1,
                ChunkingStrategy::Fallback => stats.fallback_used += 1,
                ChunkingStrategy::Hybrid => stats.hybrid_used += 1,
            }
        }
    }

    fn empty_report(&self, reason: &str, start_time: Instant) -> ChunkingReport {
        ChunkingReport {
            chunks: Vec::new(),
            strategy_used: ChunkingStrategy::Fallback,
            quality: None,
            processing_time: start_time.elapsed(),
            chunks_per_second: 0.0,
            statistics: ChunkingStatistics::default(),
            warnings: vec![reason.to_string()],
            recommendations: vec!["Provide valid text content for chunking".to_string()],
        }
    }
}

/// Postprocess gate: length, confidence, word count and repetition checks.
fn validate_chunk(chunk: &Chunk) -> bool {
    if chunk.text.trim().len() < 50 {
        return false;
    }
    if chunk.metadata.confidence < 0.2 {
        return false;
    }

    let words: Vec<String> = chunk
        .text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();
    if words.len() < 5 {
        return false;
    }
    if words.len() > 10 {
        let unique: std::collections::HashSet<&String> = words.iter().collect();
        if (unique.len() as f64) / (words.len() as f64) < 0.3 {
            return false;
        }
    }

    true
}

fn calculate_statistics(
    chunks: &[Chunk],
    quality: &Option<QualityAssessment>,
) -> ChunkingStatistics {
    if chunks.is_empty() {
        return ChunkingStatistics::default();
    }

    let mut sizes: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
    sizes.sort_unstable();

    let total_characters: usize = sizes.iter().sum();
    let avg = total_characters as f64 / sizes.len() as f64;
    let variance = sizes
        .iter()
        .map(|&s| (s as f64 - avg).powi(2))
        .sum::<f64>()
        / sizes.len() as f64;

    let mut content_type_distribution: HashMap<String, usize> = HashMap::new();
    for chunk in chunks {
        *content_type_distribution
            .entry(chunk.metadata.content_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    let confidences: Vec<f64> = chunks.iter().map(|c| c.metadata.confidence).collect();
    let total_words: usize = chunks.iter().map(|c| c.metadata.word_count).sum();

    ChunkingStatistics {
        total_chunks: chunks.len(),
        avg_chunk_size: avg,
        min_chunk_size: sizes[0],
        max_chunk_size: sizes[sizes.len() - 1],
        median_chunk_size: sizes[sizes.len() / 2],
        size_std_dev: variance.sqrt(),
        total_characters,
        total_words,
        avg_words_per_chunk: total_words as f64 / chunks.len() as f64,
        content_type_distribution,
        avg_difficulty: chunks.iter().map(|c| c.metadata.difficulty).sum::<f64>()
            / chunks.len() as f64,
        avg_confidence: confidences.iter().sum::<f64>() / confidences.len() as f64,
        min_confidence: confidences.iter().copied().fold(f64::INFINITY, f64::min),
        max_confidence: confidences.iter().copied().fold(0.0, f64::max),
        chunks_within_target: sizes
            .iter()
            .filter(|&&s| (800..=1600).contains(&s))
            .count() as f64
            / sizes.len() as f64,
        structure_quality_score: quality
            .as_ref()
            .map(|q| q.overall_quality_score)
            .unwrap_or(0.0),
    }
}

fn generate_warnings(
    chunks: &[Chunk],
    statistics: &ChunkingStatistics,
    quality: &Option<QualityAssessment>,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if chunks.is_empty() {
        warnings.push("No chunks were created from the input text".to_string());
        return warnings;
    }

    if statistics.avg_chunk_size < 500.0 {
        warnings.push(format!(
            "Average chunk size ({:.0}) is quite small - may affect retrieval quality",
            statistics.avg_chunk_size
        ));
    } else if statistics.avg_chunk_size > 2000.0 {
        warnings.push(format!(
            "Average chunk size ({:.0}) is quite large - may affect processing speed",
            statistics.avg_chunk_size
        ));
    }

    if statistics.avg_confidence < 0.5 {
        warnings.push(format!(
            "Low average confidence ({:.2}) - consider manual review",
            statistics.avg_confidence
        ));
    }

    let low_confidence = chunks
        .iter()
        .filter(|c| c.metadata.confidence < 0.4)
        .count();
    if low_confidence * 10 > chunks.len() * 3 {
        warnings.push(format!("{} chunks have low confidence scores", low_confidence));
    }

    if let Some(q) = quality {
        if q.overall_quality_score < 0.4 {
            warnings.push(
                "Poor document structure detected - chunking quality may be suboptimal"
                    .to_string(),
            );
        }
    }

    if statistics.content_type_distribution.get("text").copied() == Some(chunks.len()) {
        warnings.push(
            "No specialized content types detected - all chunks classified as general text"
                .to_string(),
        );
    }

    if statistics.size_std_dev > statistics.avg_chunk_size * 0.5 {
        warnings.push(
            "High variance in chunk sizes - document may have inconsistent content density"
                .to_string(),
        );
    }

    warnings
}

fn generate_recommendations(
    statistics: &ChunkingStatistics,
    quality: &Option<QualityAssessment>,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if let Some(q) = quality {
        if q.overall_quality_score > 0.7 {
            recommendations.push(
                "High structure quality - consider using content-aware chunking exclusively"
                    .to_string(),
            );
        } else if q.overall_quality_score < 0.3 {
            recommendations.push(
                "Poor structure quality - consider document restructuring before processing"
                    .to_string(),
            );
        }
    }

    if statistics.total_chunks > 0 {
        if statistics.avg_chunk_size < 800.0 {
            recommendations.push(
                "Consider increasing target chunk size for better context preservation"
                    .to_string(),
            );
        } else if statistics.avg_chunk_size > 1600.0 {
            recommendations
                .push("Consider decreasing target chunk size for faster processing".to_string());
        }

        if statistics.avg_confidence < 0.6 {
            recommendations.push(
                "Low confidence scores suggest manual review of chunking results".to_string(),
            );
        }

        if statistics.chunks_within_target < 0.7 {
            recommendations.push(
                "Many chunks outside target size range - consider adjusting chunking parameters"
                    .to_string(),
            );
        }

        let math_chunks = statistics
            .content_type_distribution
            .get("math")
            .copied()
            .unwrap_or(0);
        if math_chunks * 10 > statistics.total_chunks * 3 {
            recommendations.push(
                "High mathematical content - consider specialized mathematical processing"
                    .to_string(),
            );
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> Arc<ChunkingController> {
        Arc::new(ChunkingController::new(ChunkerConfig {
            target_size: 400,
            min_size: 100,
            max_size: 600,
            overlap_size: 50,
            ..ChunkerConfig::default()
        }))
    }

    fn varied_prose(paragraphs: usize) -> String {
        "Graphs model pairwise relations between objects drawn from a shared domain. \
         Vertices carry labels while edges encode dependencies or flows. \
         Traversal algorithms visit nodes in breadth or depth order depending on the queue discipline. \
         Weighted variants support shortest path computation with relaxation steps. \
         Spanning trees connect every vertex using a minimal subset of edges. \
         Coloring assigns classes so adjacent vertices never share one. \
         Matching pairs vertices under compatibility constraints. \
         Planar embeddings avoid crossings whenever the surface permits.\n\n"
            .repeat(paragraphs)
    }

    fn sample_text() -> String {
        format!(
            "Chapter 1: Basics\n{}\nChapter 2: More\n{}\nChapter 3: End\n{}",
            varied_prose(2),
            varied_prose(2),
            varied_prose(2)
        )
    }

    #[test]
    fn test_empty_text_warns_without_error() {
        let report = controller()
            .chunk(&ChunkingRequest::new("", "doc"))
            .unwrap();

        assert!(report.chunks.is_empty());
        assert!(report.warnings.iter().any(|w| w.contains("Empty text")));
    }

    #[test]
    fn test_chunk_ids_renumbered_sequentially() {
        let report = controller()
            .chunk(&ChunkingRequest::new(sample_text(), "bk"))
            .unwrap();

        assert!(!report.chunks.is_empty());
        for (i, chunk) in report.chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_id, format!("bk_chunk_{:04}", i));
        }
    }

    #[test]
    fn test_rerun_produces_identical_chunks() {
        let ctl = controller();
        let request = ChunkingRequest::new(sample_text(), "bk");

        let first = ctl.chunk(&request).unwrap();
        let second = ctl.chunk(&request).unwrap();

        let first_texts: Vec<&String> = first.chunks.iter().map(|c| &c.text).collect();
        let second_texts: Vec<&String> = second.chunks.iter().map(|c| &c.text).collect();
        assert_eq!(first_texts, second_texts);

        let first_ids: Vec<&String> =
            first.chunks.iter().map(|c| &c.metadata.chunk_id).collect();
        let second_ids: Vec<&String> =
            second.chunks.iter().map(|c| &c.metadata.chunk_id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_forced_strategy_skips_assessment() {
        let report = controller()
            .chunk(&ChunkingRequest {
                force_strategy: Some(ChunkingStrategy::Fallback),
                ..ChunkingRequest::new(sample_text(), "bk")
            })
            .unwrap();

        assert_eq!(report.strategy_used, ChunkingStrategy::Fallback);
        assert!(report.quality.is_none());
    }

    #[test]
    fn test_preprocess_strips_page_headers() {
        let ctl = controller();
        let cleaned = ctl.preprocess("Page 12 of 300\nReal content stays.\n_______\nMore text.");

        assert!(!cleaned.contains("Page 12"));
        assert!(!cleaned.contains("_______"));
        assert!(cleaned.contains("Real content stays."));
    }

    #[test]
    fn test_repetitive_chunks_dropped() {
        let ctl = controller();
        let repetitive = "word word word word word word word word word word word word";
        let report = ctl
            .chunk(&ChunkingRequest::new(repetitive, "doc"))
            .unwrap();

        assert!(report.chunks.is_empty());
    }

    #[test]
    fn test_global_statistics_accumulate_and_reset() {
        let ctl = controller();
        ctl.chunk(&ChunkingRequest::new(sample_text(), "a")).unwrap();
        ctl.chunk(&ChunkingRequest::new(sample_text(), "b")).unwrap();

        let stats = ctl.statistics();
        assert_eq!(stats.total_documents, 2);
        assert!(stats.total_chunks_created > 0);

        ctl.reset_statistics();
        assert_eq!(ctl.statistics().total_documents, 0);
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let ctl = controller();
        let requests = vec![
            ChunkingRequest::new(sample_text(), "first"),
            ChunkingRequest::new(sample_text(), "second"),
            ChunkingRequest::new(sample_text(), "third"),
        ];

        let batch = ctl.chunk_batch(requests, Some(2)).await;

        assert_eq!(batch.total_documents, 3);
        assert_eq!(batch.successful_documents, 3);
        assert_eq!(batch.failed_documents, 0);
        let ids: Vec<String> = batch
            .results
            .iter()
            .map(|r| r.chunks[0].metadata.document_id.clone())
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_batch_runs_sequentially_without_thread_safety() {
        let ctl = Arc::new(ChunkingController::new(ChunkerConfig {
            target_size: 400,
            min_size: 100,
            max_size: 600,
            overlap_size: 50,
            thread_safe: false,
            ..ChunkerConfig::default()
        }));
        let requests = vec![
            ChunkingRequest::new(sample_text(), "a"),
            ChunkingRequest::new(sample_text(), "b"),
            ChunkingRequest::new(sample_text(), "c"),
        ];

        // The worker override is ignored; the batch degrades to one worker.
        let batch = ctl.chunk_batch(requests, Some(4)).await;

        assert_eq!(batch.successful_documents, 3);
        let ids: Vec<String> = batch
            .results
            .iter()
            .map(|r| r.chunks[0].metadata.document_id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ctl.statistics().total_documents, 3);
    }

    #[tokio::test]
    async fn test_batch_collects_empty_documents_without_failing() {
        let ctl = controller();
        let requests = vec![
            ChunkingRequest::new(sample_text(), "ok"),
            ChunkingRequest::new("", "empty"),
        ];

        let batch = ctl.chunk_batch(requests, None).await;
        assert_eq!(batch.successful_documents, 2);
        assert!(batch.results[1].chunks.is_empty());
    }
}

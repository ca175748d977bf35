//! Document ingestion pipeline
//!
//! Runs structure detection, quality-driven chunking and embedding, then
//! writes the Textbook → Chapter → Section → Concept → Chunk subtree to
//! the graph in one transaction.

use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::graph::{
    ChapterNode, ChunkNodeSpec, ConceptNode, GraphStore, SectionNode, TextbookNode,
    TextbookSubtree,
};
use crate::pdf::controller::{ChunkingController, ChunkingRequest};
use crate::pdf::document::Document;
use crate::pdf::metadata::{BaseMetadata, Chunk};
use crate::pdf::quality::ChunkingStrategy;
use crate::pdf::structure::{StructureDetector, StructureElement, StructureType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Counts and warnings from one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub document_id: String,
    pub strategy: ChunkingStrategy,
    pub chapters: usize,
    pub sections: usize,
    pub concepts: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub stored_in_graph: bool,
    pub warnings: Vec<String>,
}

/// End-to-end ingestion pipeline.
pub struct IngestionPipeline {
    detector: StructureDetector,
    controller: Arc<ChunkingController>,
    embedder: Arc<dyn EmbeddingClient>,
    graph: Arc<GraphStore>,
}

impl IngestionPipeline {
    pub fn new(
        detector: StructureDetector,
        controller: Arc<ChunkingController>,
        embedder: Arc<dyn EmbeddingClient>,
        graph: Arc<GraphStore>,
    ) -> Self {
        Self {
            detector,
            controller,
            embedder,
            graph,
        }
    }

    /// Extract a PDF and ingest it.
    pub async fn ingest_pdf(
        &self,
        path: &Path,
        title: &str,
        subject: &str,
    ) -> Result<IngestionSummary> {
        let document = Document::from_pdf(path)?;
        self.ingest_document(&document, title, subject).await
    }

    /// Ingest an already-extracted document.
    pub async fn ingest_document(
        &self,
        document: &Document,
        title: &str,
        subject: &str,
    ) -> Result<IngestionSummary> {
        info!("Ingesting document {} ({})", document.id, title);

        let detection = self.detector.detect_structure(&document.text);
        let mut warnings = detection.warnings.clone();

        let request = ChunkingRequest {
            text: document.text.clone(),
            document_id: document.id.clone(),
            base: BaseMetadata {
                title: title.to_string(),
                subject: subject.to_string(),
            },
            elements: detection.hierarchy.elements.clone(),
            force_strategy: None,
        };

        let report = self.controller.chunk(&request)?;
        warnings.extend(report.warnings.clone());

        let texts: Vec<String> = report.chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let embedded_chunks = embeddings.iter().filter(|e| e.is_some()).count();
        if embedded_chunks < report.chunks.len() {
            warnings.push(format!(
                "{} of {} chunks missing embeddings",
                report.chunks.len() - embedded_chunks,
                report.chunks.len()
            ));
        }

        let subtree = build_subtree(
            &document.id,
            title,
            subject,
            &detection.hierarchy.elements,
            &report.chunks,
            &embeddings,
            document,
        );

        let stored_in_graph = if self.graph.is_configured() {
            self.graph.store_textbook_subtree(&subtree).await?;
            true
        } else {
            warn!("Graph store not configured; subtree for {} not persisted", document.id);
            false
        };

        let summary = IngestionSummary {
            document_id: document.id.clone(),
            strategy: report.strategy_used,
            chapters: subtree.chapters.len(),
            sections: subtree.sections.len(),
            concepts: subtree.concepts.len(),
            chunks: subtree.chunks.len(),
            embedded_chunks,
            stored_in_graph,
            warnings,
        };

        info!(
            "Ingestion of {} complete: {} chapters, {} sections, {} chunks ({} embedded)",
            summary.document_id,
            summary.chapters,
            summary.sections,
            summary.chunks,
            summary.embedded_chunks
        );
        Ok(summary)
    }
}

/// Assemble the graph subtree. Chunk node ids carry their position:
/// `{textbook}_ch{n}_s{section}_c{ordinal}`.
fn build_subtree(
    document_id: &str,
    title: &str,
    subject: &str,
    elements: &[StructureElement],
    chunks: &[Chunk],
    embeddings: &[Option<Vec<f32>>],
    document: &Document,
) -> TextbookSubtree {
    let mut subtree = TextbookSubtree {
        textbook: Some(TextbookNode {
            id: document_id.to_string(),
            title: title.to_string(),
            subject: subject.to_string(),
        }),
        ..TextbookSubtree::default()
    };

    let mut current_chapter: i64 = 0;
    let mut section_titles: HashMap<String, String> = HashMap::new();
    let mut fallback_chapter_number: i64 = 0;

    for element in elements {
        match element.element_type {
            StructureType::Chapter => {
                fallback_chapter_number += 1;
                let number = element
                    .number
                    .as_deref()
                    .and_then(|n| n.parse::<i64>().ok())
                    .unwrap_or(fallback_chapter_number);
                current_chapter = number;

                let start_page = document.page_of_offset(element.start_offset);
                let end_page = document
                    .page_of_offset(element.end_offset.unwrap_or(element.start_offset));

                subtree.chapters.push(ChapterNode {
                    number,
                    title: element.title.clone(),
                    pages: format!("{}-{}", start_page, end_page),
                });
            }
            StructureType::Section
            | StructureType::Subsection
            | StructureType::Subsubsection => {
                let number = element
                    .number
                    .clone()
                    .unwrap_or_else(|| element.title.clone());
                section_titles.insert(number.clone(), element.title.clone());

                subtree.sections.push(SectionNode {
                    number: number.clone(),
                    title: element.title.clone(),
                    chapter_number: current_chapter.max(1),
                });
                subtree.concepts.push(ConceptNode {
                    name: element.title.clone(),
                    section_number: number,
                });
            }
            StructureType::Heading => {}
        }
    }

    // Per-(chapter, section) ordinals for assembly chunk ids.
    let mut ordinals: HashMap<(String, String), usize> = HashMap::new();

    for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
        let chapter = if chunk.metadata.chapter.is_empty() {
            "0".to_string()
        } else {
            chunk.metadata.chapter.clone()
        };
        let section = if chunk.metadata.section.is_empty() {
            "0".to_string()
        } else {
            chunk.metadata.section.clone()
        };

        let ordinal = ordinals
            .entry((chapter.clone(), section.clone()))
            .and_modify(|o| *o += 1)
            .or_insert(0);

        let chapter_number = chapter.parse::<i64>().unwrap_or(0);
        let concept_name = section_titles.get(&chunk.metadata.section).cloned();

        subtree.chunks.push(ChunkNodeSpec {
            id: format!("{}_ch{}_s{}_c{}", document_id, chapter, section, ordinal),
            textbook_id: document_id.to_string(),
            chapter_number,
            section_number: section,
            concept_name,
            subject: Some(subject.to_string()),
            text: chunk.text.clone(),
            embedding: embedding.clone(),
        });
    }

    subtree
}

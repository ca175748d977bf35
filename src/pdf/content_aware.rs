//! Structure-respecting chunker with protected-region awareness
//!
//! Splits each structured section near a sliding size target, preferring
//! paragraph then sentence then whitespace boundaries, and never placing a
//! boundary inside a protected region.

use crate::config::ChunkerConfig;
use crate::pdf::metadata::{
    chunk_confidence, classify_content, estimate_difficulty, extract_keywords, sentence_count,
    BaseMetadata, Chunk, ChunkMetadata, ContentType,
};
use crate::pdf::protected::{
    clamp_boundary, merge_regions, DefinitionDetector, ExampleDetector, MathDetector,
    ProtectedRegion,
};
use crate::pdf::quality::ChunkingStrategy;
use crate::pdf::structure::{StructureElement, StructureType};
use regex::Regex;
use tracing::{debug, info};

/// Output of a single chunker run
#[derive(Debug, Default)]
pub struct ChunkerOutput {
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryKind {
    Paragraph,
    Sentence,
    Word,
    ProtectedRegion,
    Forced,
    End,
}

#[derive(Debug, Clone)]
struct ChunkBoundary {
    position: usize,
    kind: BoundaryKind,
    quality: f64,
}

struct SectionSpan {
    start: usize,
    end: usize,
    chapter: String,
    section: String,
}

/// Content-aware chunker. Protected math, definitions and examples are kept
/// as complete units even when that forces a chunk past `max_size`.
pub struct ContentAwareChunker {
    config: ChunkerConfig,
    math: MathDetector,
    definitions: DefinitionDetector,
    examples: ExampleDetector,
    paragraph_re: Regex,
    sentence_re: Regex,
    whitespace_re: Regex,
}

impl ContentAwareChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            math: MathDetector::new(),
            definitions: DefinitionDetector::new(),
            examples: ExampleDetector::new(),
            paragraph_re: Regex::new(r"\n\s*\n").expect("paragraph regex must compile"),
            sentence_re: Regex::new(r"[.!?]\s+").expect("sentence regex must compile"),
            whitespace_re: Regex::new(r"\s+").expect("whitespace regex must compile"),
        }
    }

    pub fn chunk(
        &self,
        text: &str,
        elements: &[StructureElement],
        document_id: &str,
        base: &BaseMetadata,
    ) -> ChunkerOutput {
        if text.trim().is_empty() {
            return ChunkerOutput::default();
        }

        info!(
            "Content-aware chunking {} characters of {}",
            text.len(),
            document_id
        );

        let protected = self.find_protected_regions(text);
        let sections = organize_by_structure(elements, text.len());

        let mut output = ChunkerOutput::default();
        for span in sections {
            self.chunk_section(text, &span, &protected, document_id, base, &mut output);
        }

        info!(
            "Content-aware chunking produced {} chunks",
            output.chunks.len()
        );
        output
    }

    fn find_protected_regions(&self, text: &str) -> Vec<ProtectedRegion> {
        let mut regions = Vec::new();

        if self.config.preserve_math {
            regions.extend(self.math.detect(text));
        }
        if self.config.preserve_definitions {
            regions.extend(self.definitions.detect(text));
        }
        if self.config.preserve_examples {
            regions.extend(self.examples.detect(text));
        }

        merge_regions(regions, 20)
    }

    fn chunk_section(
        &self,
        text: &str,
        span: &SectionSpan,
        protected: &[ProtectedRegion],
        document_id: &str,
        base: &BaseMetadata,
        output: &mut ChunkerOutput,
    ) {
        let section_text = &text[span.start..span.end];
        if section_text.trim().is_empty() {
            return;
        }

        // Regions fully inside this section, rebased to section coordinates.
        let section_protected: Vec<ProtectedRegion> = protected
            .iter()
            .filter(|r| r.start >= span.start && r.end <= span.end)
            .map(|r| ProtectedRegion::new(r.start - span.start, r.end - span.start, r.kind.clone()))
            .collect();

        if section_text.trim().len() < self.config.min_size {
            let chunk = self.build_chunk(
                section_text.to_string(),
                document_id,
                span,
                span.start,
                span.end,
                base,
                &section_protected,
                0,
                section_text.len(),
            );
            output.chunks.push(chunk);
            return;
        }

        let boundaries = self.find_chunk_boundaries(section_text, &section_protected);

        let mut current_pos = 0usize;
        for (i, boundary) in boundaries.iter().enumerate() {
            let chunk_end = boundary.position;

            let chunk_start = if i > 0 {
                clamp_boundary(
                    section_text,
                    current_pos.saturating_sub(self.config.overlap_size),
                )
            } else {
                current_pos
            };

            let chunk_text = section_text[chunk_start..chunk_end].trim();
            if chunk_text.is_empty() {
                current_pos = chunk_end;
                continue;
            }

            if chunk_text.len() >= self.config.min_size {
                let chunk = self.build_chunk(
                    chunk_text.to_string(),
                    document_id,
                    span,
                    span.start + chunk_start,
                    span.start + chunk_end,
                    base,
                    &section_protected,
                    chunk_start,
                    chunk_end,
                );
                output.chunks.push(chunk);
            } else if let Some(last) = output.chunks.last_mut() {
                // Sub-minimum remainder folds into the previous chunk.
                last.text.push(' ');
                last.text.push_str(chunk_text);
                last.metadata.end_offset = span.start + chunk_end;
                last.refresh_counts();
                output
                    .warnings
                    .push(format!("Merged {}-char fragment into previous chunk", chunk_text.len()));
            } else {
                output
                    .warnings
                    .push(format!("Dropped leading {}-char fragment", chunk_text.len()));
            }

            current_pos = chunk_end;
        }
    }

    fn find_chunk_boundaries(
        &self,
        text: &str,
        protected: &[ProtectedRegion],
    ) -> Vec<ChunkBoundary> {
        let mut boundaries = Vec::new();
        let mut current = 0usize;

        while current < text.len() {
            let target = current + self.config.target_size;

            if target >= text.len() {
                boundaries.push(ChunkBoundary {
                    position: text.len(),
                    kind: BoundaryKind::End,
                    quality: 1.0,
                });
                break;
            }

            let boundary = self.find_best_boundary(text, current, target, protected);
            debug!(
                "Boundary at {} ({:?}, quality {:.1})",
                boundary.position, boundary.kind, boundary.quality
            );
            if boundary.position <= current {
                // Guard against stalling on degenerate inputs.
                boundaries.push(ChunkBoundary {
                    position: text.len(),
                    kind: BoundaryKind::End,
                    quality: 1.0,
                });
                break;
            }
            current = boundary.position;
            boundaries.push(boundary);
        }

        boundaries
    }

    fn find_best_boundary(
        &self,
        text: &str,
        start: usize,
        target: usize,
        protected: &[ProtectedRegion],
    ) -> ChunkBoundary {
        let search_start = clamp_boundary(
            text,
            (start + self.config.min_size).max(target.saturating_sub(200)),
        );
        let search_end = clamp_boundary(text, (target + 200).min(text.len()));

        // A target inside a protected region moves the boundary to the
        // region edge; an oversized region extends the chunk to its end.
        for region in protected {
            if region.contains(target) {
                if region.end < search_end {
                    return ChunkBoundary {
                        position: clamp_boundary(text, region.end),
                        kind: BoundaryKind::ProtectedRegion,
                        quality: 0.9,
                    };
                }
                if region.start > search_start && region.start > start {
                    return ChunkBoundary {
                        position: clamp_boundary(text, region.start),
                        kind: BoundaryKind::ProtectedRegion,
                        quality: 0.8,
                    };
                }
                return ChunkBoundary {
                    position: clamp_boundary(text, region.end.min(text.len())),
                    kind: BoundaryKind::ProtectedRegion,
                    quality: 0.7,
                };
            }
        }

        if search_start >= search_end {
            return ChunkBoundary {
                position: clamp_boundary(text, target),
                kind: BoundaryKind::Forced,
                quality: 0.2,
            };
        }

        let window = &text[search_start..search_end];
        let mut candidates: Vec<ChunkBoundary> = Vec::new();

        for m in self.paragraph_re.find_iter(window) {
            candidates.push(ChunkBoundary {
                position: search_start + m.end(),
                kind: BoundaryKind::Paragraph,
                quality: 0.9,
            });
        }
        for m in self.sentence_re.find_iter(window) {
            candidates.push(ChunkBoundary {
                position: search_start + m.end(),
                kind: BoundaryKind::Sentence,
                quality: 0.7,
            });
        }
        for m in self.whitespace_re.find_iter(window) {
            candidates.push(ChunkBoundary {
                position: search_start + m.end(),
                kind: BoundaryKind::Word,
                quality: 0.5,
            });
        }

        // A candidate inside a protected region would split it.
        candidates.retain(|c| {
            !protected
                .iter()
                .any(|r| r.start < c.position && c.position < r.end)
        });

        let best = candidates.into_iter().max_by(|a, b| {
            self.score_candidate(a, target)
                .partial_cmp(&self.score_candidate(b, target))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        match best {
            Some(boundary) => boundary,
            None => {
                debug!("No natural boundary near {}, forcing split", target);
                ChunkBoundary {
                    position: clamp_boundary(text, target),
                    kind: BoundaryKind::Forced,
                    quality: 0.2,
                }
            }
        }
    }

    fn score_candidate(&self, candidate: &ChunkBoundary, target: usize) -> f64 {
        let distance = candidate.position.abs_diff(target) as f64;
        let distance_score = (1.0 - distance / 200.0).max(0.0);
        candidate.quality * 0.7 + distance_score * 0.3
    }

    #[allow(clippy::too_many_arguments)]
    fn build_chunk(
        &self,
        text: String,
        document_id: &str,
        span: &SectionSpan,
        start_offset: usize,
        end_offset: usize,
        base: &BaseMetadata,
        section_protected: &[ProtectedRegion],
        rel_start: usize,
        rel_end: usize,
    ) -> Chunk {
        let overlapping: Vec<&ProtectedRegion> = section_protected
            .iter()
            .filter(|r| r.start < rel_end && r.end > rel_start)
            .collect();

        let content_type = classify_content(&overlapping);
        let keywords = extract_keywords(&text, 5);
        let difficulty = estimate_difficulty(&text, content_type, &self.math);
        let confidence = chunk_confidence(
            &text,
            content_type,
            self.config.min_size,
            self.config.max_size,
        );

        let metadata = ChunkMetadata {
            chunk_id: format!("{}_chunk_{}", document_id, start_offset),
            document_id: document_id.to_string(),
            title: base.title.clone(),
            subject: base.subject.clone(),
            chapter: span.chapter.clone(),
            section: span.section.clone(),
            content_type,
            difficulty,
            keywords,
            start_offset,
            end_offset,
            confidence,
            char_count: text.len(),
            word_count: text.split_whitespace().count(),
            sentence_count: sentence_count(&text),
            strategy: ChunkingStrategy::ContentAware,
        };

        Chunk { text, metadata }
    }
}

/// Map detected elements to contiguous section spans with chapter/section
/// context. Without elements the whole text is one unstructured span.
fn organize_by_structure(elements: &[StructureElement], text_len: usize) -> Vec<SectionSpan> {
    if elements.is_empty() {
        return vec![SectionSpan {
            start: 0,
            end: text_len,
            chapter: String::new(),
            section: String::new(),
        }];
    }

    let mut spans = Vec::new();
    let mut current_chapter = String::new();
    let mut current_section = String::new();

    for element in elements {
        match element.element_type {
            StructureType::Chapter => {
                current_chapter = element
                    .number
                    .clone()
                    .unwrap_or_else(|| element.title.clone());
                current_section.clear();
            }
            StructureType::Section
            | StructureType::Subsection
            | StructureType::Subsubsection => {
                current_section = element
                    .number
                    .clone()
                    .unwrap_or_else(|| element.title.clone());
            }
            StructureType::Heading => {}
        }

        spans.push(SectionSpan {
            start: element.start_offset,
            end: element.end_offset.unwrap_or(text_len).min(text_len),
            chapter: current_chapter.clone(),
            section: current_section.clone(),
        });
    }

    spans
}

//! Boundary-aware sliding-window chunker used when structure is absent
//! or too poor to trust.

use crate::config::ChunkerConfig;
use crate::pdf::content_aware::ChunkerOutput;
use crate::pdf::metadata::{
    chunk_confidence, classify_content, estimate_difficulty, extract_keywords, sentence_count,
    BaseMetadata, Chunk, ChunkMetadata,
};
use crate::pdf::protected::{
    clamp_boundary, DefinitionDetector, ExampleDetector, MathDetector, ProtectedRegion,
};
use crate::pdf::quality::ChunkingStrategy;
use regex::Regex;
use tracing::info;

/// Fallback chunker: slides a window of `target_size` characters with
/// `overlap_size` carry-over, preferring paragraph, then sentence, then
/// whitespace boundaries inside the same search window the content-aware
/// chunker uses. Chapter and section context stay empty.
pub struct FallbackChunker {
    config: ChunkerConfig,
    math: MathDetector,
    definitions: DefinitionDetector,
    examples: ExampleDetector,
    paragraph_re: Regex,
    sentence_re: Regex,
    whitespace_re: Regex,
}

impl FallbackChunker {
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

    pub fn chunk(&self, text: &str, document_id: &str, base: &BaseMetadata) -> ChunkerOutput {
        let mut output = ChunkerOutput::default();

        if text.trim().is_empty() {
            return output;
        }

        info!(
            "Fallback chunking {} characters of {}",
            text.len(),
            document_id
        );

        if text.trim().len() < self.config.min_size {
            output
                .chunks
                .push(self.build_chunk(text.trim().to_string(), document_id, base, 0, text.len()));
            return output;
        }

        let mut current = 0usize;
        while current < text.len() {
            let target = current + self.config.target_size;

            let end = if target >= text.len() {
                text.len()
            } else {
                self.best_boundary(text, current, target)
            };
            if end <= current {
                break;
            }

            let start = if current > 0 {
                clamp_boundary(text, current.saturating_sub(self.config.overlap_size))
            } else {
                0
            };

            let chunk_text = text[start..end].trim();
            if chunk_text.len() >= self.config.min_size {
                output.chunks.push(self.build_chunk(
                    chunk_text.to_string(),
                    document_id,
                    base,
                    start,
                    end,
                ));
            } else if let Some(last) = output.chunks.last_mut() {
                last.text.push(' ');
                last.text.push_str(chunk_text);
                last.metadata.end_offset = end;
                last.refresh_counts();
                output.warnings.push(format!(
                    "Merged {}-char trailing fragment into previous chunk",
                    chunk_text.len()
                ));
            } else if !chunk_text.is_empty() {
                output
                    .chunks
                    .push(self.build_chunk(chunk_text.to_string(), document_id, base, start, end));
            }

            current = end;
        }

        output
    }

    fn best_boundary(&self, text: &str, start: usize, target: usize) -> usize {
        let search_start = clamp_boundary(
            text,
            (start + self.config.min_size).max(target.saturating_sub(200)),
        );
        let search_end = clamp_boundary(text, (target + 200).min(text.len()));

        if search_start >= search_end {
            return clamp_boundary(text, target.min(text.len()));
        }

        let window = &text[search_start..search_end];
        let mut best: Option<(usize, f64)> = None;

        let mut consider = |position: usize, quality: f64, target: usize| {
            let distance = position.abs_diff(target) as f64;
            let score = quality * 0.7 + (1.0 - distance / 200.0).max(0.0) * 0.3;
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((position, score));
            }
        };

        for m in self.paragraph_re.find_iter(window) {
            consider(search_start + m.end(), 0.9, target);
        }
        for m in self.sentence_re.find_iter(window) {
            consider(search_start + m.end(), 0.7, target);
        }
        for m in self.whitespace_re.find_iter(window) {
            consider(search_start + m.end(), 0.5, target);
        }

        best.map(|(pos, _)| pos)
            .unwrap_or_else(|| clamp_boundary(text, target.min(text.len())))
    }

    fn build_chunk(
        &self,
        text: String,
        document_id: &str,
        base: &BaseMetadata,
        start: usize,
        end: usize,
    ) -> Chunk {
        // Classification runs over the chunk body; fallback has no section
        // map to carry regions across chunks.
        let mut regions: Vec<ProtectedRegion> = self.math.detect(&text);
        regions.extend(self.definitions.detect(&text));
        regions.extend(self.examples.detect(&text));
        let refs: Vec<&ProtectedRegion> = regions.iter().collect();

        let content_type = classify_content(&refs);
        let keywords = extract_keywords(&text, 5);
        let difficulty = estimate_difficulty(&text, content_type, &self.math);
        let confidence = chunk_confidence(
            &text,
            content_type,
            self.config.min_size,
            self.config.max_size,
        );

        let metadata = ChunkMetadata {
            chunk_id: format!("{}_chunk_{}", document_id, start),
            document_id: document_id.to_string(),
            title: base.title.clone(),
            subject: base.subject.clone(),
            chapter: String::new(),
            section: String::new(),
            content_type,
            difficulty,
            keywords,
            start_offset: start,
            end_offset: end,
            confidence,
            char_count: text.len(),
            word_count: text.split_whitespace().count(),
            sentence_count: sentence_count(&text),
            strategy: ChunkingStrategy::Fallback,
        };

        Chunk { text, metadata }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(target: usize, min: usize, overlap: usize) -> FallbackChunker {
        FallbackChunker::new(ChunkerConfig {
            target_size: target,
            min_size: min,
            max_size: target + 500,
            overlap_size: overlap,
            ..ChunkerConfig::default()
        })
    }

    #[test]
    fn test_empty_text() {
        let output = chunker(1000, 300, 200).chunk("", "doc", &BaseMetadata::default());
        assert!(output.chunks.is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let output =
            chunker(1000, 300, 200).chunk("Short text.", "doc", &BaseMetadata::default());
        assert_eq!(output.chunks.len(), 1);
        assert_eq!(output.chunks[0].metadata.strategy, ChunkingStrategy::Fallback);
        assert!(output.chunks[0].metadata.chapter.is_empty());
    }

    #[test]
    fn test_window_advances_with_overlap() {
        let sentence = "Paragraphs of ordinary prose provide boundary candidates to pick. ";
        let text = sentence.repeat(40);
        let output = chunker(400, 100, 50).chunk(&text, "doc", &BaseMetadata::default());

        assert!(output.chunks.len() > 2);
        for pair in output.chunks.windows(2) {
            assert!(
                pair[1].metadata.start_offset < pair[0].metadata.end_offset,
                "adjacent chunks should overlap"
            );
            assert!(pair[1].metadata.end_offset > pair[0].metadata.end_offset);
        }
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let sentence = "Every sentence in this sample finishes with a period and a space. ";
        let text = sentence.repeat(30);
        let output = chunker(300, 80, 40).chunk(&text, "doc", &BaseMetadata::default());

        let aligned = output
            .chunks
            .iter()
            .take(output.chunks.len() - 1)
            .filter(|c| c.text.trim_end().ends_with('.'))
            .count();
        assert!(aligned * 2 >= output.chunks.len() - 1);
    }
}

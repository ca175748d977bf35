//! Chunk types and the metadata helpers shared by both chunkers

use crate::pdf::protected::{MathDetector, ProtectedRegion};
use crate::pdf::quality::ChunkingStrategy;
use serde::{Deserialize, Serialize};

/// Dominant content classification of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Math,
    Definition,
    Example,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Math => "math",
            ContentType::Definition => "definition",
            ContentType::Example => "example",
        }
    }
}

/// Metadata attached to every produced chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub document_id: String,
    pub title: String,
    pub subject: String,
    pub chapter: String,
    pub section: String,
    pub content_type: ContentType,
    pub difficulty: f64,
    pub keywords: Vec<String>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub confidence: f64,
    pub char_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    pub strategy: ChunkingStrategy,
}

/// A contiguous text span with metadata, suitable for retrieval and grading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Document-level metadata propagated into every chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseMetadata {
    pub title: String,
    pub subject: String,
}

impl Chunk {
    /// Recompute token statistics after the text was extended or merged.
    pub fn refresh_counts(&mut self) {
        self.metadata.char_count = self.text.len();
        self.metadata.word_count = self.text.split_whitespace().count();
        self.metadata.sentence_count = sentence_count(&self.text);
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "been", "being", "have", "has", "had", "does",
    "did", "will", "would", "should", "could", "can", "may", "might", "must", "this", "that",
    "these", "those", "with", "from", "into", "over", "but", "not", "you", "your", "its",
];

/// Top-5 tokens of length ≥ 3 by frequency, stop words excluded.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let mut frequency: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for raw in text.split(|c: char| !c.is_alphabetic()) {
        let word = raw.to_lowercase();
        if word.len() >= 3 && !STOP_WORDS.contains(&word.as_str()) {
            *frequency.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max_keywords);
    ranked.into_iter().map(|(word, _)| word).collect()
}

pub fn sentence_count(text: &str) -> usize {
    let mut count = 0usize;
    let mut in_terminator = false;
    for c in text.chars() {
        let is_term = matches!(c, '.' | '!' | '?');
        if is_term && !in_terminator {
            count += 1;
        }
        in_terminator = is_term;
    }
    count
}

/// Content type from the protected regions overlapping a chunk: math wins
/// over definition, definition over example.
pub fn classify_content(regions: &[&ProtectedRegion]) -> ContentType {
    let mut result = ContentType::Text;
    for region in regions {
        if region.kind.contains("math") || region.kind.contains("equation") {
            return ContentType::Math;
        }
        if region.kind.contains("definition") && result == ContentType::Text {
            result = ContentType::Definition;
        }
        if region.kind.contains("example") && result == ContentType::Text {
            result = ContentType::Example;
        }
    }
    result
}

/// Difficulty estimate in [0, 1]: base 0.5 adjusted by content type, word
/// and sentence complexity, and math symbol density.
pub fn estimate_difficulty(text: &str, content_type: ContentType, math: &MathDetector) -> f64 {
    let mut difficulty: f64 = 0.5;

    difficulty += match content_type {
        ContentType::Math => 0.2,
        ContentType::Definition => 0.15,
        ContentType::Example => -0.1,
        ContentType::Text => 0.0,
    };

    let words: Vec<&str> = text.split_whitespace().collect();
    if !words.is_empty() {
        let avg_word_length =
            words.iter().map(|w| w.len()).sum::<usize>() as f64 / words.len() as f64;
        if avg_word_length > 6.0 {
            difficulty += 0.1;
        }
    }

    let sentences = sentence_count(text).max(1);
    let avg_sentence_length = words.len() as f64 / sentences as f64;
    if avg_sentence_length > 20.0 {
        difficulty += 0.1;
    }

    difficulty += math.symbol_count(text) as f64 * 0.02;

    difficulty.clamp(0.0, 1.0)
}

/// Confidence estimate in [0, 1]: 0.8 base, size appropriateness, protected
/// content bonus, incomplete-sentence penalty.
pub fn chunk_confidence(
    text: &str,
    content_type: ContentType,
    min_size: usize,
    max_size: usize,
) -> f64 {
    let mut confidence: f64 = 0.8;

    let char_count = text.len();
    if (min_size..=max_size).contains(&char_count) {
        confidence += 0.1;
    } else if char_count < min_size {
        confidence -= 0.2;
    }

    if content_type != ContentType::Text {
        confidence += 0.1;
    }

    let trimmed = text.trim_end();
    if !trimmed.is_empty() && !trimmed.ends_with(['.', '!', '?']) {
        confidence -= 0.1;
    }

    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_ranked_by_frequency() {
        let text = "graph graph graph vector vector search node stop the the the";
        let keywords = extract_keywords(text, 5);

        assert_eq!(keywords[0], "graph");
        assert_eq!(keywords[1], "vector");
        assert!(!keywords.contains(&"the".to_string()));
        assert!(keywords.len() <= 5);
    }

    #[test]
    fn test_sentence_count_collapses_runs() {
        assert_eq!(sentence_count("One. Two! Three?"), 3);
        assert_eq!(sentence_count("Wait... what?"), 2);
        assert_eq!(sentence_count("no terminator"), 0);
    }

    #[test]
    fn test_content_classification_precedence() {
        let math = ProtectedRegion::new(0, 5, "inline_math");
        let definition = ProtectedRegion::new(10, 20, "definition");
        let example = ProtectedRegion::new(30, 40, "example");

        assert_eq!(
            classify_content(&[&definition, &math]),
            ContentType::Math
        );
        assert_eq!(
            classify_content(&[&example, &definition]),
            ContentType::Definition
        );
        assert_eq!(classify_content(&[&example]), ContentType::Example);
        assert_eq!(classify_content(&[]), ContentType::Text);
    }

    #[test]
    fn test_difficulty_bounds() {
        let math = MathDetector::new();
        let easy = estimate_difficulty("Simple words here. Short.", ContentType::Example, &math);
        let hard = estimate_difficulty(
            "∑ ∫ π θ λ μ σ ρ Δ Ω considerations of extraordinarily complicated terminology",
            ContentType::Math,
            &math,
        );

        assert!(easy < hard);
        assert!((0.0..=1.0).contains(&easy));
        assert!((0.0..=1.0).contains(&hard));
    }

    #[test]
    fn test_confidence_penalizes_undersized_chunks() {
        let small = chunk_confidence("tiny.", ContentType::Text, 300, 1500);
        let body = "a".repeat(398);
        let sized = chunk_confidence(&body, ContentType::Text, 300, 1500);

        assert!(small < sized);
    }

    #[test]
    fn test_refresh_counts() {
        let mut chunk = Chunk {
            text: "One sentence. Two sentences now.".to_string(),
            metadata: ChunkMetadata {
                chunk_id: "doc_chunk_0000".to_string(),
                document_id: "doc".to_string(),
                title: String::new(),
                subject: String::new(),
                chapter: String::new(),
                section: String::new(),
                content_type: ContentType::Text,
                difficulty: 0.5,
                keywords: vec![],
                start_offset: 0,
                end_offset: 32,
                confidence: 0.8,
                char_count: 0,
                word_count: 0,
                sentence_count: 0,
                strategy: ChunkingStrategy::Fallback,
            },
        };

        chunk.refresh_counts();
        assert_eq!(chunk.metadata.word_count, 5);
        assert_eq!(chunk.metadata.sentence_count, 2);
        assert_eq!(chunk.metadata.char_count, chunk.text.len());
    }
}

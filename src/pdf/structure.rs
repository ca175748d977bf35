//! Document structure detection for chapters, sections and headings
//!
//! Scans raw text with regex families for chapter-like, section-like and
//! heading-like lines, scores each match, assigns hierarchy levels and
//! derives quality metrics used for chunking-strategy selection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Types of detected structure elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureType {
    Chapter,
    Section,
    Subsection,
    Subsubsection,
    Heading,
}

impl StructureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::Chapter => "chapter",
            StructureType::Section => "section",
            StructureType::Subsection => "subsection",
            StructureType::Subsubsection => "subsubsection",
            StructureType::Heading => "heading",
        }
    }

    fn is_section_like(&self) -> bool {
        matches!(
            self,
            StructureType::Section | StructureType::Subsection | StructureType::Subsubsection
        )
    }
}

/// Numbering styles found in documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberingStyle {
    Arabic,
    RomanUpper,
    RomanLower,
    LetterUpper,
    LetterLower,
    Decimal,
    None,
}

/// A detected structure element, ordered by `start_offset`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureElement {
    pub element_type: StructureType,
    pub title: String,
    pub number: Option<String>,
    pub level: usize,
    pub start_offset: usize,
    pub end_offset: Option<usize>,
    pub confidence: f64,
    pub numbering_style: NumberingStyle,
    pub raw_text: String,
}

/// Derived view over the detected elements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    pub elements: Vec<StructureElement>,
    pub total_chapters: usize,
    pub total_sections: usize,
    pub max_depth: usize,
    pub numbering_consistency: f64,
    pub overall_confidence: f64,
    pub quality_score: f64,
}

impl Hierarchy {
    fn empty() -> Self {
        Self {
            elements: Vec::new(),
            total_chapters: 0,
            total_sections: 0,
            max_depth: 0,
            numbering_consistency: 0.0,
            overall_confidence: 0.0,
            quality_score: 0.0,
        }
    }
}

/// Detection statistics for diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionStatistics {
    pub total_elements: usize,
    pub element_types: HashMap<String, usize>,
    pub numbering_styles: HashMap<String, usize>,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub text_coverage: f64,
    pub average_element_length: f64,
}

/// Result from structure detection
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub hierarchy: Hierarchy,
    pub is_valid_textbook: bool,
    pub warnings: Vec<String>,
    pub statistics: DetectionStatistics,
}

struct NamedPattern {
    name: &'static str,
    regex: Regex,
}

/// Document structure detector.
///
/// Chapter patterns take priority over section patterns, which take priority
/// over generic headings; a line produces at most one element.
pub struct StructureDetector {
    min_chapters: usize,
    confidence_threshold: f64,
    chapter_patterns: Vec<NamedPattern>,
    section_patterns: Vec<NamedPattern>,
    heading_patterns: Vec<NamedPattern>,
    title_keywords: Vec<&'static str>,
}

impl Default for StructureDetector {
    fn default() -> Self {
        Self::new(3, 0.3)
    }
}

impl StructureDetector {
    pub fn new(min_chapters: usize, confidence_threshold: f64) -> Self {
        let compile = |name: &'static str, pattern: &str| NamedPattern {
            name,
            regex: Regex::new(pattern).expect("structure pattern must compile"),
        };

        let chapter_patterns = vec![
            compile(
                "standard",
                r"(?i)^(?:Chapter|Ch\.?)\s*(\d+)(?:\s*[:.\-]\s*(.+?))?$",
            ),
            compile("unit", r"(?i)^Unit\s+(\d+)(?:\s*[:.\-]\s*(.+?))?$"),
            compile("part", r"(?i)^Part\s+([IVXLCDM]+|\d+)(?:\s*[:.\-]\s*(.+?))?$"),
            compile("numbered_simple", r"^(\d+)\s*[:\-]\s*(.+)$"),
            compile("numbered_dot", r"^(\d+)\.\s+(\D.+)$"),
            compile("roman_numbered", r"^([IVXLCDM]+)\.\s*(.+)$"),
            compile("lesson", r"(?i)^Lesson\s+(\d+)(?:\s*[:.\-]\s*(.+?))?$"),
            compile("module", r"(?i)^Module\s+(\d+)(?:\s*[:.\-]\s*(.+?))?$"),
        ];

        let section_patterns = vec![
            compile("decimal", r"^(\d+(?:\.\d+)+)\s+(.+)$"),
            compile("letter_section", r"^([A-Z])\.\s*(.+)$"),
            compile("subsection", r"^(\d+\.\d+\.\d+)\s+(.+)$"),
            compile("roman_section", r"^([ivxlcdm]+)\.\s*(.+)$"),
        ];

        let heading_patterns = vec![
            compile("title_case", r"^([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\s*$"),
            compile("all_caps", r"^([A-Z\s]{4,})\s*$"),
            compile("bold_indicators", r"^\*\*(.+?)\*\*$|^\*(.+?)\*$"),
        ];

        Self {
            min_chapters,
            confidence_threshold,
            chapter_patterns,
            section_patterns,
            heading_patterns,
            title_keywords: vec![
                "introduction",
                "overview",
                "definition",
                "example",
                "exercise",
                "summary",
                "conclusion",
            ],
        }
    }

    /// Build a detection result from externally supplied elements, e.g.
    /// when a caller passes pre-detected structure into the chunking
    /// controller.
    pub fn result_from_elements(
        &self,
        mut elements: Vec<StructureElement>,
        text_len: usize,
    ) -> DetectionResult {
        elements.sort_by_key(|e| e.start_offset);
        assign_end_offsets(&mut elements, text_len);

        let hierarchy = self.build_hierarchy(elements);
        let (is_valid, warnings) = self.validate_textbook_structure(&hierarchy);

        DetectionResult {
            hierarchy,
            is_valid_textbook: is_valid,
            warnings,
            statistics: DetectionStatistics::default(),
        }
    }

    /// Detect document structure from text.
    pub fn detect_structure(&self, text: &str) -> DetectionResult {
        if text.trim().is_empty() {
            return DetectionResult {
                hierarchy: Hierarchy::empty(),
                is_valid_textbook: false,
                warnings: vec!["Empty text provided".to_string()],
                statistics: DetectionStatistics::default(),
            };
        }

        let mut elements = self.detect_all_elements(text);
        elements.sort_by_key(|e| e.start_offset);
        self.assign_hierarchy_levels(&mut elements);
        assign_end_offsets(&mut elements, text.len());

        let hierarchy = self.build_hierarchy(elements);
        let (is_valid, warnings) = self.validate_textbook_structure(&hierarchy);
        let statistics = generate_statistics(&hierarchy.elements, text);

        info!(
            "Structure detection found {} chapters, {} sections",
            hierarchy.total_chapters, hierarchy.total_sections
        );

        DetectionResult {
            hierarchy,
            is_valid_textbook: is_valid,
            warnings,
            statistics,
        }
    }

    fn detect_all_elements(&self, text: &str) -> Vec<StructureElement> {
        let mut elements = Vec::new();
        let mut position = 0usize;

        for line in text.split('\n') {
            let line_start = position;
            position += line.len() + 1;

            let trimmed = line.trim();
            if trimmed.len() < 2 {
                continue;
            }
            let offset = line_start + (line.len() - line.trim_start().len());

            if let Some(element) = self.detect_chapter(trimmed, offset) {
                elements.push(element);
                continue;
            }
            if let Some(element) = self.detect_section(trimmed, offset) {
                elements.push(element);
                continue;
            }
            if let Some(element) = self.detect_heading(trimmed, offset) {
                elements.push(element);
            }
        }

        elements
    }

    fn detect_chapter(&self, line: &str, offset: usize) -> Option<StructureElement> {
        for pattern in &self.chapter_patterns {
            if let Some(caps) = pattern.regex.captures(line) {
                let number = caps.get(1).map(|m| m.as_str().to_string());
                let title = caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| line.to_string());

                let confidence =
                    self.chapter_confidence(pattern.name, line, number.as_deref());

                return Some(StructureElement {
                    element_type: StructureType::Chapter,
                    title,
                    numbering_style: numbering_style(number.as_deref()),
                    number,
                    level: 0,
                    start_offset: offset,
                    end_offset: None,
                    confidence,
                    raw_text: line.to_string(),
                });
            }
        }
        None
    }

    fn detect_section(&self, line: &str, offset: usize) -> Option<StructureElement> {
        for pattern in &self.section_patterns {
            if let Some(caps) = pattern.regex.captures(line) {
                let number = caps.get(1)?.as_str().to_string();
                let title = caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_else(|| line.to_string());

                let level = section_level(&number, pattern.name);
                let element_type = match level {
                    1 => StructureType::Section,
                    2 => StructureType::Subsection,
                    3 => StructureType::Subsubsection,
                    _ => StructureType::Section,
                };

                let confidence = self.section_confidence(pattern.name, line, &number);

                return Some(StructureElement {
                    element_type,
                    title,
                    numbering_style: numbering_style(Some(&number)),
                    number: Some(number),
                    level,
                    start_offset: offset,
                    end_offset: None,
                    confidence,
                    raw_text: line.to_string(),
                });
            }
        }
        None
    }

    fn detect_heading(&self, line: &str, offset: usize) -> Option<StructureElement> {
        if line.len() < 3 || line.len() > 200 {
            return None;
        }

        for pattern in &self.heading_patterns {
            if pattern.regex.is_match(line) {
                let confidence = self.heading_confidence(pattern.name, line);
                if confidence < 0.3 {
                    continue;
                }

                return Some(StructureElement {
                    element_type: StructureType::Heading,
                    title: line.to_string(),
                    number: None,
                    level: 2,
                    start_offset: offset,
                    end_offset: None,
                    confidence,
                    numbering_style: NumberingStyle::None,
                    raw_text: line.to_string(),
                });
            }
        }
        None
    }

    /// Raise section and heading levels so they nest strictly below the
    /// preceding chapter level.
    fn assign_hierarchy_levels(&self, elements: &mut [StructureElement]) {
        let mut current_chapter_level = 0usize;

        for element in elements.iter_mut() {
            match element.element_type {
                StructureType::Chapter => {
                    element.level = 0;
                    current_chapter_level = 0;
                }
                StructureType::Section
                | StructureType::Subsection
                | StructureType::Subsubsection => {
                    if element.level <= current_chapter_level {
                        element.level = current_chapter_level + 1;
                    }
                }
                StructureType::Heading => {
                    element.level = element.level.max(current_chapter_level + 1).max(1);
                }
            }
        }
    }

    fn chapter_confidence(&self, pattern_name: &str, line: &str, number: Option<&str>) -> f64 {
        let mut confidence: f64 = match pattern_name {
            "standard" => 0.9,
            "unit" => 0.85,
            "part" => 0.8,
            "numbered_simple" => 0.6,
            "numbered_dot" => 0.6,
            "roman_numbered" => 0.7,
            "lesson" => 0.75,
            "module" => 0.75,
            _ => 0.5,
        };

        if number.is_some_and(|n| n.chars().all(|c| c.is_ascii_digit())) {
            confidence += 0.05;
        }

        let title_length = line.len();
        if title_length < 5 {
            confidence -= 0.2;
        } else if title_length > 100 {
            confidence -= 0.1;
        }

        let lower = line.to_lowercase();
        if ["introduction", "overview", "conclusion", "summary"]
            .iter()
            .any(|word| lower.contains(word))
        {
            confidence += 0.05;
        }

        confidence.clamp(0.0, 1.0)
    }

    fn section_confidence(&self, pattern_name: &str, line: &str, number: &str) -> f64 {
        let mut confidence: f64 = match pattern_name {
            "decimal" => 0.85,
            "subsection" => 0.9,
            "letter_section" => 0.7,
            "roman_section" => 0.65,
            _ => 0.5,
        };

        if number.contains('.')
            && number
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        {
            confidence += 0.05;
        }

        if line.split_whitespace().count() < 2 {
            confidence -= 0.15;
        }

        confidence.clamp(0.0, 1.0)
    }

    fn heading_confidence(&self, pattern_name: &str, line: &str) -> f64 {
        let mut confidence: f64 = match pattern_name {
            "title_case" => 0.6,
            "all_caps" => 0.5,
            "bold_indicators" => 0.7,
            _ => 0.3,
        };

        let word_count = line.split_whitespace().count();
        if (2..=10).contains(&word_count) {
            confidence += 0.1;
        } else if word_count > 20 {
            confidence -= 0.2;
        }

        let lower = line.to_lowercase();
        if self.title_keywords.iter().any(|word| lower.contains(word)) {
            confidence += 0.1;
        }

        confidence.clamp(0.0, 1.0)
    }

    fn build_hierarchy(&self, elements: Vec<StructureElement>) -> Hierarchy {
        let total_chapters = elements
            .iter()
            .filter(|e| e.element_type == StructureType::Chapter)
            .count();
        let total_sections = elements
            .iter()
            .filter(|e| e.element_type.is_section_like())
            .count();
        let max_depth = elements.iter().map(|e| e.level).max().unwrap_or(0);

        let numbering_consistency = numbering_consistency(&elements);
        let overall_confidence = if elements.is_empty() {
            0.0
        } else {
            elements.iter().map(|e| e.confidence).sum::<f64>() / elements.len() as f64
        };
        let quality_score = self.structure_quality(&elements, numbering_consistency);

        Hierarchy {
            elements,
            total_chapters,
            total_sections,
            max_depth,
            numbering_consistency,
            overall_confidence,
            quality_score,
        }
    }

    /// Quality = 0.6·mean confidence + 0.2·numbering consistency
    /// + 0.1 for enough chapters + 0.1 for a sane section-to-chapter ratio.
    fn structure_quality(&self, elements: &[StructureElement], consistency: f64) -> f64 {
        if elements.is_empty() {
            return 0.0;
        }

        let avg_confidence =
            elements.iter().map(|e| e.confidence).sum::<f64>() / elements.len() as f64;
        let mut quality = avg_confidence * 0.6 + consistency * 0.2;

        let chapters = elements
            .iter()
            .filter(|e| e.element_type == StructureType::Chapter)
            .count();
        let sections = elements.len() - chapters;

        if chapters >= self.min_chapters {
            quality += 0.1;
        }
        if sections > 0 && chapters > 0 {
            let ratio = sections as f64 / chapters as f64;
            if (1.0..=10.0).contains(&ratio) {
                quality += 0.1;
            }
        }

        quality.clamp(0.0, 1.0)
    }

    fn validate_textbook_structure(&self, hierarchy: &Hierarchy) -> (bool, Vec<String>) {
        let mut warnings = Vec::new();
        let mut is_valid = true;

        if hierarchy.total_chapters < self.min_chapters {
            warnings.push(format!(
                "Insufficient chapters: {} < {}",
                hierarchy.total_chapters, self.min_chapters
            ));
            is_valid = false;
        }

        if hierarchy.quality_score < self.confidence_threshold {
            warnings.push(format!(
                "Low structure quality: {:.2} < {}",
                hierarchy.quality_score, self.confidence_threshold
            ));
            is_valid = false;
        }

        if hierarchy.total_chapters > 0 {
            let avg_sections = hierarchy.total_sections as f64 / hierarchy.total_chapters as f64;
            if avg_sections < 0.5 {
                warnings.push(
                    "Very few sections per chapter - may indicate poor structure detection"
                        .to_string(),
                );
            } else if avg_sections > 20.0 {
                warnings
                    .push("Too many sections per chapter - may indicate over-detection".to_string());
            }
        }

        if hierarchy.numbering_consistency < 0.5 {
            warnings.push("Inconsistent numbering scheme detected".to_string());
        }

        if hierarchy.max_depth > 4 {
            warnings.push(format!(
                "Deeply nested structure ({} levels) - processing continues",
                hierarchy.max_depth
            ));
        }

        (is_valid, warnings)
    }
}

/// End of element i = start of the next same-or-higher-level element, or
/// the end of the document.
fn assign_end_offsets(elements: &mut [StructureElement], text_len: usize) {
    let starts_and_levels: Vec<(usize, usize)> = elements
        .iter()
        .map(|e| (e.start_offset, e.level))
        .collect();

    for (i, element) in elements.iter_mut().enumerate() {
        let end = starts_and_levels[i + 1..]
            .iter()
            .find(|(_, level)| *level <= element.level)
            .map(|(start, _)| *start)
            .unwrap_or(text_len);
        element.end_offset = Some(end);
    }
}

/// Per-(type, level) frequency of the dominant numbering style.
fn numbering_consistency(elements: &[StructureElement]) -> f64 {
    if elements.is_empty() {
        return 0.0;
    }

    let mut groups: HashMap<(StructureType, usize), Vec<NumberingStyle>> = HashMap::new();
    for element in elements {
        if element.number.is_some() {
            groups
                .entry((element.element_type, element.level))
                .or_default()
                .push(element.numbering_style);
        }
    }

    let mut scores = Vec::new();
    for styles in groups.values() {
        if styles.len() < 2 {
            continue;
        }
        let mut counts: HashMap<NumberingStyle, usize> = HashMap::new();
        for style in styles {
            *counts.entry(*style).or_insert(0) += 1;
        }
        let dominant = counts.values().max().copied().unwrap_or(0);
        scores.push(dominant as f64 / styles.len() as f64);
    }

    if scores.is_empty() {
        0.5
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn section_level(number: &str, pattern_name: &str) -> usize {
    match pattern_name {
        "decimal" => number.matches('.').count(),
        "subsection" => 2,
        _ => 1,
    }
}

fn numbering_style(number: Option<&str>) -> NumberingStyle {
    let Some(number) = number else {
        return NumberingStyle::None;
    };

    if number.chars().all(|c| c.is_ascii_digit()) && !number.is_empty() {
        NumberingStyle::Arabic
    } else if !number.is_empty() && number.chars().all(|c| "IVXLCDM".contains(c)) {
        NumberingStyle::RomanUpper
    } else if !number.is_empty() && number.chars().all(|c| "ivxlcdm".contains(c)) {
        NumberingStyle::RomanLower
    } else if number.len() == 1 && number.chars().all(|c| c.is_ascii_uppercase()) {
        NumberingStyle::LetterUpper
    } else if number.len() == 1 && number.chars().all(|c| c.is_ascii_lowercase()) {
        NumberingStyle::LetterLower
    } else if number.contains('.') {
        NumberingStyle::Decimal
    } else {
        NumberingStyle::Arabic
    }
}

fn generate_statistics(elements: &[StructureElement], text: &str) -> DetectionStatistics {
    let mut stats = DetectionStatistics {
        total_elements: elements.len(),
        ..Default::default()
    };

    for element in elements {
        *stats
            .element_types
            .entry(element.element_type.as_str().to_string())
            .or_insert(0) += 1;
        *stats
            .numbering_styles
            .entry(format!("{:?}", element.numbering_style).to_lowercase())
            .or_insert(0) += 1;

        if element.confidence > 0.8 {
            stats.high_confidence += 1;
        } else if element.confidence > 0.5 {
            stats.medium_confidence += 1;
        } else {
            stats.low_confidence += 1;
        }
    }

    if !elements.is_empty() && !text.is_empty() {
        let lengths: Vec<usize> = elements
            .iter()
            .map(|e| e.end_offset.unwrap_or(text.len()).saturating_sub(e.start_offset))
            .collect();
        let covered: usize = lengths.iter().sum();
        stats.text_coverage = (covered as f64 / text.len() as f64).min(1.0);
        stats.average_element_length = covered as f64 / lengths.len() as f64;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textbook_sample() -> &'static str {
        "Chapter 1: Introduction\n\
         Some introductory prose about the subject.\n\
         1.1 Getting Started\n\
         Content of the first section.\n\
         1.2 Basic Ideas\n\
         More content here.\n\
         Chapter 2: Fundamentals\n\
         Opening text for chapter two.\n\
         2.1 Core Concepts\n\
         Deeper content.\n\
         Chapter 3: Advanced Topics\n\
         Closing material.\n\
         3.1 Theory\n\
         Theory content.\n"
    }

    #[test]
    fn test_detects_chapters_and_sections() {
        let detector = StructureDetector::default();
        let result = detector.detect_structure(textbook_sample());

        assert_eq!(result.hierarchy.total_chapters, 3);
        assert!(result.hierarchy.total_sections >= 4);
        assert!(result.is_valid_textbook);
    }

    #[test]
    fn test_elements_sorted_by_offset() {
        let detector = StructureDetector::default();
        let result = detector.detect_structure(textbook_sample());

        let offsets: Vec<usize> = result
            .hierarchy
            .elements
            .iter()
            .map(|e| e.start_offset)
            .collect();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(offsets, sorted, "offsets must be strictly increasing");
    }

    #[test]
    fn test_section_levels_above_chapter() {
        let detector = StructureDetector::default();
        let result = detector.detect_structure(textbook_sample());

        for element in &result.hierarchy.elements {
            match element.element_type {
                StructureType::Chapter => assert_eq!(element.level, 0),
                _ => assert!(element.level >= 1),
            }
        }
    }

    #[test]
    fn test_empty_text() {
        let detector = StructureDetector::default();
        let result = detector.detect_structure("   ");

        assert!(!result.is_valid_textbook);
        assert!(result.warnings.iter().any(|w| w.contains("Empty text")));
        assert!(result.hierarchy.elements.is_empty());
    }

    #[test]
    fn test_insufficient_chapters_warns() {
        let detector = StructureDetector::default();
        let result = detector.detect_structure("Chapter 1: Only One\nSome text.\n");

        assert!(!result.is_valid_textbook);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Insufficient chapters")));
    }

    #[test]
    fn test_decimal_depth_sets_level() {
        let detector = StructureDetector::default();
        let result = detector.detect_structure("1.1 Section\nText.\n1.1.1 Subsection\nText.\n");

        let kinds: Vec<StructureType> = result
            .hierarchy
            .elements
            .iter()
            .map(|e| e.element_type)
            .collect();
        assert!(kinds.contains(&StructureType::Section));
        assert!(kinds.contains(&StructureType::Subsection));
    }

    #[test]
    fn test_numbering_style_classification() {
        assert_eq!(numbering_style(Some("12")), NumberingStyle::Arabic);
        assert_eq!(numbering_style(Some("IV")), NumberingStyle::RomanUpper);
        assert_eq!(numbering_style(Some("iv")), NumberingStyle::RomanLower);
        assert_eq!(numbering_style(Some("B")), NumberingStyle::LetterUpper);
        assert_eq!(numbering_style(Some("b")), NumberingStyle::LetterLower);
        assert_eq!(numbering_style(Some("1.2")), NumberingStyle::Decimal);
        assert_eq!(numbering_style(None), NumberingStyle::None);
    }

    #[test]
    fn test_end_offsets_close_at_next_peer() {
        let detector = StructureDetector::default();
        let text = "Chapter 1: One\nbody\nChapter 2: Two\nbody\n";
        let result = detector.detect_structure(text);

        let chapters: Vec<&StructureElement> = result
            .hierarchy
            .elements
            .iter()
            .filter(|e| e.element_type == StructureType::Chapter)
            .collect();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].end_offset, Some(chapters[1].start_offset));
        assert_eq!(chapters[1].end_offset, Some(text.len()));
    }

    #[test]
    fn test_deep_nesting_warns_but_processes() {
        let detector = StructureDetector::new(1, 0.1);
        let text = "Chapter 1: Root\n1.1 A\n1.1.1 B\n1.1.1.1 C\n1.1.1.1.1 D\nbody text\n";
        let result = detector.detect_structure(text);

        assert!(result.hierarchy.max_depth > 4);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Deeply nested structure")));
        assert!(!result.hierarchy.elements.is_empty());
    }
}

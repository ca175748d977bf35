//! Structure quality assessment and chunking-strategy selection
//!
//! Scores detected structure on four weighted factors and recommends a
//! chunking strategy. Scores near the threshold fall into the hybrid band.

use crate::pdf::structure::{DetectionResult, NumberingStyle, StructureElement, StructureType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Available chunking strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    ContentAware,
    Fallback,
    Hybrid,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::ContentAware => "content_aware",
            ChunkingStrategy::Fallback => "fallback",
            ChunkingStrategy::Hybrid => "hybrid",
        }
    }
}

/// Per-factor scores, each in [0, 1]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorScores {
    pub heading_consistency: f64,
    pub chapter_boundaries: f64,
    pub section_organization: f64,
    pub hierarchy_logic: f64,
}

/// Result of a structure quality assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub overall_quality_score: f64,
    pub recommended_strategy: ChunkingStrategy,
    pub confidence: f64,
    pub factors: FactorScores,
    pub supports_educational_chunking: bool,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Assesses detected document structure for chunking-strategy selection.
///
/// Composite score = 0.4·heading consistency + 0.3·chapter boundaries
/// + 0.2·section organization + 0.1·hierarchy logic.
pub struct QualityAssessor {
    strategy_threshold: f64,
    min_chapters_for_structure: usize,
}

impl Default for QualityAssessor {
    fn default() -> Self {
        Self::new(0.3, 2)
    }
}

impl QualityAssessor {
    pub fn new(strategy_threshold: f64, min_chapters_for_structure: usize) -> Self {
        Self {
            strategy_threshold,
            min_chapters_for_structure,
        }
    }

    pub fn assess(&self, detection: &DetectionResult) -> QualityAssessment {
        let elements = &detection.hierarchy.elements;

        if elements.is_empty() {
            return self.poor_quality_assessment("No structure elements detected");
        }

        let factors = FactorScores {
            heading_consistency: self.assess_heading_consistency(elements),
            chapter_boundaries: self.assess_chapter_boundaries(elements),
            section_organization: self
                .assess_section_organization(elements, detection.hierarchy.max_depth),
            hierarchy_logic: self.assess_hierarchy_logic(elements),
        };

        let overall = factors.heading_consistency * 0.4
            + factors.chapter_boundaries * 0.3
            + factors.section_organization * 0.2
            + factors.hierarchy_logic * 0.1;

        let (strategy, confidence) = self.determine_strategy(
            overall,
            detection.hierarchy.total_chapters,
            detection.hierarchy.numbering_consistency,
        );

        let warnings = self.generate_warnings(detection, &factors);
        let suggestions = self.generate_suggestions(overall, &factors);

        debug!(
            "Quality assessment: overall={:.2} strategy={}",
            overall,
            strategy.as_str()
        );

        QualityAssessment {
            overall_quality_score: overall,
            recommended_strategy: strategy,
            confidence,
            factors,
            supports_educational_chunking: overall >= self.strategy_threshold,
            warnings,
            suggestions,
        }
    }

    /// Style consistency, level appropriateness, title-format cohesion and
    /// sequential numbering, averaged.
    fn assess_heading_consistency(&self, elements: &[StructureElement]) -> f64 {
        let style = style_consistency(elements);
        let level = level_appropriateness(elements);
        let title = title_format_cohesion(elements);
        let sequential = sequential_numbering_rate(elements);

        (style + level + title + sequential) / 4.0
    }

    /// Chapter count vs minimum, spacing consistency, title quality, and
    /// length uniformity.
    fn assess_chapter_boundaries(&self, elements: &[StructureElement]) -> f64 {
        let chapters: Vec<&StructureElement> = elements
            .iter()
            .filter(|e| e.element_type == StructureType::Chapter)
            .collect();

        if chapters.is_empty() {
            return 0.0;
        }

        let count_score =
            (chapters.len() as f64 / self.min_chapters_for_structure as f64).min(1.0);
        let spacing_score = spacing_consistency(&chapters);
        let title_score = chapter_title_quality(&chapters);
        let length_score = length_uniformity(&chapters);

        (count_score + spacing_score + title_score + length_score) / 4.0
    }

    /// Sections-per-chapter distribution, depth appropriateness,
    /// subsection ratio, and length balance.
    fn assess_section_organization(
        &self,
        elements: &[StructureElement],
        max_depth: usize,
    ) -> f64 {
        let chapters = elements
            .iter()
            .filter(|e| e.element_type == StructureType::Chapter)
            .count();
        let sections: Vec<&StructureElement> = elements
            .iter()
            .filter(|e| e.element_type == StructureType::Section)
            .collect();
        let subsections = elements
            .iter()
            .filter(|e| {
                matches!(
                    e.element_type,
                    StructureType::Subsection | StructureType::Subsubsection
                )
            })
            .count();

        if chapters == 0 && sections.is_empty() {
            return 0.3;
        }

        let distribution_score = if chapters > 0 {
            let per_chapter = sections.len() as f64 / chapters as f64;
            if (1.0..=5.0).contains(&per_chapter) {
                1.0
            } else if per_chapter < 1.0 {
                0.4 + per_chapter * 0.6
            } else {
                (1.0 - (per_chapter - 5.0) / 15.0).max(0.2)
            }
        } else {
            0.3
        };

        let depth_score = match max_depth {
            2 | 3 => 1.0,
            1 | 4 => 0.7,
            0 => 0.3,
            _ => 0.2,
        };

        let subsection_score = if sections.is_empty() {
            if subsections == 0 {
                0.7
            } else {
                0.2
            }
        } else {
            let ratio = subsections as f64 / sections.len() as f64;
            (1.0 - (ratio - 1.0).max(0.0)).max(0.2)
        };

        let balance_score = length_uniformity(&sections.iter().copied().collect::<Vec<_>>());

        (distribution_score + depth_score + subsection_score + balance_score) / 4.0
    }

    /// Proper nesting, no orphaned types, monotone numbering, and no level
    /// jumps greater than one.
    fn assess_hierarchy_logic(&self, elements: &[StructureElement]) -> f64 {
        let nesting = proper_nesting_score(elements);
        let orphans = orphan_score(elements);
        let monotone = monotone_numbering_score(elements);
        let transitions = level_transition_score(elements);

        (nesting + orphans + monotone + transitions) / 4.0
    }

    /// Strategy with confidence. Quality within ±0.1 of the threshold
    /// selects hybrid; confidence decays with few chapters or inconsistent
    /// numbering and never drops below 0.1.
    fn determine_strategy(
        &self,
        quality: f64,
        total_chapters: usize,
        numbering_consistency: f64,
    ) -> (ChunkingStrategy, f64) {
        let mut confidence = if quality >= self.strategy_threshold {
            (0.7 + (quality - self.strategy_threshold) * 0.3 / (1.0 - self.strategy_threshold))
                .min(1.0)
        } else {
            (0.8 - (self.strategy_threshold - quality) * 0.5 / self.strategy_threshold).min(1.0)
        };

        if total_chapters < self.min_chapters_for_structure {
            confidence *= 0.8;
        }
        if numbering_consistency < 0.5 {
            confidence *= 0.9;
        }

        let strategy = if (quality - self.strategy_threshold).abs() < 0.1 {
            ChunkingStrategy::Hybrid
        } else if quality >= self.strategy_threshold {
            ChunkingStrategy::ContentAware
        } else {
            ChunkingStrategy::Fallback
        };

        (strategy, confidence.max(0.1))
    }

    fn generate_warnings(
        &self,
        detection: &DetectionResult,
        factors: &FactorScores,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        if detection.hierarchy.total_chapters < self.min_chapters_for_structure {
            warnings.push(format!(
                "Only {} chapters detected; structured chunking may be unreliable",
                detection.hierarchy.total_chapters
            ));
        }
        if factors.heading_consistency < 0.4 {
            warnings.push("Inconsistent heading patterns detected".to_string());
        }
        if factors.hierarchy_logic < 0.4 {
            warnings.push("Hierarchy contains orphaned or mis-nested elements".to_string());
        }

        warnings
    }

    fn generate_suggestions(&self, quality: f64, factors: &FactorScores) -> Vec<String> {
        let mut suggestions = Vec::new();

        if quality < self.strategy_threshold {
            suggestions
                .push("Structure quality is low; fallback chunking will be used".to_string());
        }
        if factors.chapter_boundaries < 0.5 {
            suggestions.push(
                "Chapter boundaries are unclear; verify the source document formatting"
                    .to_string(),
            );
        }
        if factors.section_organization < 0.5 {
            suggestions.push("Section organization is uneven across chapters".to_string());
        }

        suggestions
    }

    fn poor_quality_assessment(&self, reason: &str) -> QualityAssessment {
        QualityAssessment {
            overall_quality_score: 0.0,
            recommended_strategy: ChunkingStrategy::Fallback,
            confidence: 0.8,
            factors: FactorScores::default(),
            supports_educational_chunking: false,
            warnings: vec![reason.to_string()],
            suggestions: vec!["Provide text with detectable structure".to_string()],
        }
    }
}

fn style_consistency(elements: &[StructureElement]) -> f64 {
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
            scores.push(1.0);
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

/// Chapters belong at level 0, sections at 1, subsections at 2.
fn level_appropriateness(elements: &[StructureElement]) -> f64 {
    if elements.is_empty() {
        return 0.0;
    }

    let appropriate = elements
        .iter()
        .filter(|e| match e.element_type {
            StructureType::Chapter => e.level == 0,
            StructureType::Section => e.level == 1,
            StructureType::Subsection => e.level == 2,
            StructureType::Subsubsection => e.level == 3,
            StructureType::Heading => e.level >= 1,
        })
        .count();

    appropriate as f64 / elements.len() as f64
}

fn title_format_cohesion(elements: &[StructureElement]) -> f64 {
    if elements.len() < 2 {
        return 1.0;
    }

    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for element in elements {
        let title = element.title.trim();
        let format = if title.chars().all(|c| !c.is_lowercase()) && title.len() > 3 {
            "all_caps"
        } else if title
            .split_whitespace()
            .all(|w| w.chars().next().is_some_and(|c| c.is_uppercase() || !c.is_alphabetic()))
        {
            "title_case"
        } else {
            "sentence_case"
        };
        *counts.entry(format).or_insert(0) += 1;
    }

    let dominant = counts.values().max().copied().unwrap_or(0);
    dominant as f64 / elements.len() as f64
}

/// Fraction of same-group consecutive arabic numbers that increment by one.
fn sequential_numbering_rate(elements: &[StructureElement]) -> f64 {
    let mut groups: HashMap<(StructureType, usize), Vec<u64>> = HashMap::new();
    for element in elements {
        if let Some(number) = &element.number {
            if let Ok(n) = number.split('.').next_back().unwrap_or(number).parse::<u64>() {
                groups
                    .entry((element.element_type, element.level))
                    .or_default()
                    .push(n);
            }
        }
    }

    let mut pairs = 0usize;
    let mut sequential = 0usize;
    for numbers in groups.values() {
        for window in numbers.windows(2) {
            pairs += 1;
            if window[1] == window[0] + 1 || window[1] == 1 {
                sequential += 1;
            }
        }
    }

    if pairs == 0 {
        0.8
    } else {
        sequential as f64 / pairs as f64
    }
}

/// 1/(1 + variance/mean) over gaps between consecutive chapter starts.
fn spacing_consistency(chapters: &[&StructureElement]) -> f64 {
    if chapters.len() < 3 {
        return 0.7;
    }

    let gaps: Vec<f64> = chapters
        .windows(2)
        .map(|pair| (pair[1].start_offset - pair[0].start_offset) as f64)
        .collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;

    1.0 / (1.0 + variance / mean)
}

fn chapter_title_quality(chapters: &[&StructureElement]) -> f64 {
    if chapters.is_empty() {
        return 0.0;
    }

    let keywords = [
        "introduction",
        "overview",
        "fundamentals",
        "basics",
        "advanced",
        "summary",
        "conclusion",
    ];

    let total: f64 = chapters
        .iter()
        .map(|chapter| {
            let title = chapter.title.trim();
            let mut score: f64 = 0.3;
            if (5..=100).contains(&title.len()) {
                score += 0.3;
            }
            if title.chars().next().is_some_and(|c| c.is_uppercase()) {
                score += 0.2;
            }
            let lower = title.to_lowercase();
            if keywords.iter().any(|k| lower.contains(k)) {
                score += 0.2;
            }
            score.min(1.0)
        })
        .sum();

    total / chapters.len() as f64
}

/// Coefficient-of-variation score over element body lengths.
fn length_uniformity(elements: &[&StructureElement]) -> f64 {
    if elements.len() < 2 {
        return 0.7;
    }

    let lengths: Vec<f64> = elements
        .iter()
        .filter_map(|e| e.end_offset.map(|end| (end - e.start_offset) as f64))
        .collect();
    if lengths.len() < 2 {
        return 0.7;
    }

    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    if mean == 0.0 {
        return 0.2;
    }
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
    let cv = variance.sqrt() / mean;

    if cv <= 0.3 {
        1.0
    } else if cv >= 1.0 {
        0.2
    } else {
        1.0 - (cv - 0.3) * (0.8 / 0.7)
    }
}

/// No section may precede every chapter; no subsection may precede every
/// section.
fn proper_nesting_score(elements: &[StructureElement]) -> f64 {
    let mut seen_chapter = false;
    let mut seen_section = false;
    let mut violations = 0usize;
    let mut checked = 0usize;

    let has_chapters = elements
        .iter()
        .any(|e| e.element_type == StructureType::Chapter);

    for element in elements {
        match element.element_type {
            StructureType::Chapter => seen_chapter = true,
            StructureType::Section => {
                checked += 1;
                if has_chapters && !seen_chapter {
                    violations += 1;
                }
                seen_section = true;
            }
            StructureType::Subsection | StructureType::Subsubsection => {
                checked += 1;
                if !seen_section && !seen_chapter {
                    violations += 1;
                }
            }
            StructureType::Heading => {}
        }
    }

    if checked == 0 {
        1.0
    } else {
        1.0 - violations as f64 / checked as f64
    }
}

fn orphan_score(elements: &[StructureElement]) -> f64 {
    let chapters = elements
        .iter()
        .filter(|e| e.element_type == StructureType::Chapter)
        .count();
    let sections = elements
        .iter()
        .filter(|e| e.element_type == StructureType::Section)
        .count();
    let subsections = elements
        .iter()
        .filter(|e| {
            matches!(
                e.element_type,
                StructureType::Subsection | StructureType::Subsubsection
            )
        })
        .count();

    let mut penalty: f64 = 0.0;
    if sections > 0 && chapters == 0 {
        penalty += 0.3;
    }
    if subsections > 0 && sections == 0 {
        penalty += 0.4;
    }

    (1.0 - penalty).max(0.0)
}

fn monotone_numbering_score(elements: &[StructureElement]) -> f64 {
    let chapter_numbers: Vec<u64> = elements
        .iter()
        .filter(|e| e.element_type == StructureType::Chapter)
        .filter_map(|e| e.number.as_ref().and_then(|n| n.parse::<u64>().ok()))
        .collect();

    if chapter_numbers.len() < 2 {
        return 0.8;
    }

    let ordered = chapter_numbers
        .windows(2)
        .filter(|pair| pair[1] > pair[0])
        .count();
    ordered as f64 / (chapter_numbers.len() - 1) as f64
}

/// Adjacent level transitions must not descend more than one level at once.
fn level_transition_score(elements: &[StructureElement]) -> f64 {
    if elements.len() < 2 {
        return 1.0;
    }

    let mut valid = 0usize;
    let mut total = 0usize;
    for pair in elements.windows(2) {
        total += 1;
        if pair[1].level <= pair[0].level + 1 {
            valid += 1;
        }
    }

    valid as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::structure::StructureDetector;

    fn assess(text: &str) -> QualityAssessment {
        let detection = StructureDetector::default().detect_structure(text);
        QualityAssessor::default().assess(&detection)
    }

    #[test]
    fn test_well_structured_text_selects_content_aware() {
        let text = "Chapter 1: Introduction\nbody text\n\
                    1.1 First Section\nbody\n1.2 Second Section\nbody\n\
                    Chapter 2: Fundamentals\nbody\n\
                    2.1 Another Section\nbody\n2.2 Next Section\nbody\n\
                    Chapter 3: Advanced Topics\nbody\n\
                    3.1 Final Section\nbody\n";
        let assessment = assess(text);

        assert!(assessment.overall_quality_score > 0.3);
        assert!(matches!(
            assessment.recommended_strategy,
            ChunkingStrategy::ContentAware | ChunkingStrategy::Hybrid
        ));
        assert!(assessment.confidence >= 0.1);
    }

    #[test]
    fn test_empty_structure_selects_fallback() {
        let detection = StructureDetector::default().detect_structure("plain prose only here.");
        let assessment = QualityAssessor::default().assess(&detection);

        assert_eq!(
            assessment.recommended_strategy,
            ChunkingStrategy::Fallback
        );
        assert!(!assessment.supports_educational_chunking);
    }

    #[test]
    fn test_confidence_floor() {
        let assessor = QualityAssessor::new(0.9, 10);
        let detection = StructureDetector::default()
            .detect_structure("Chapter 1: Lone\nsome body\n");
        let assessment = assessor.assess(&detection);

        assert!(assessment.confidence >= 0.1);
    }

    #[test]
    fn test_scores_within_unit_interval() {
        let assessment = assess(
            "Chapter 1: One\ntext\n1.1 Sec\ntext\nChapter 2: Two\ntext\n2.1 Sec\ntext\n",
        );

        for score in [
            assessment.overall_quality_score,
            assessment.factors.heading_consistency,
            assessment.factors.chapter_boundaries,
            assessment.factors.section_organization,
            assessment.factors.hierarchy_logic,
        ] {
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn test_hybrid_band() {
        let assessor = QualityAssessor::default();
        let (strategy, _) = assessor.determine_strategy(0.35, 3, 0.9);
        assert_eq!(strategy, ChunkingStrategy::Hybrid);

        let (strategy, _) = assessor.determine_strategy(0.8, 3, 0.9);
        assert_eq!(strategy, ChunkingStrategy::ContentAware);

        let (strategy, _) = assessor.determine_strategy(0.05, 3, 0.9);
        assert_eq!(strategy, ChunkingStrategy::Fallback);
    }
}

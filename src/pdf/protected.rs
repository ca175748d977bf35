//! Protected-region detection: math, definitions and examples
//!
//! Regions reported here must never be split by a chunk boundary. Each
//! detector works independently; `merge_regions` unions the results.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A span that chunk boundaries must not split.
///
/// `kind` is one of `inline_math`, `display_math`, `equation`, `function`,
/// `mathematical_expression`, `definition`, `example`, or a `a+b` union
/// produced by merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedRegion {
    pub start: usize,
    pub end: usize,
    pub kind: String,
}

impl ProtectedRegion {
    pub fn new(start: usize, end: usize, kind: impl Into<String>) -> Self {
        Self {
            start,
            end,
            kind: kind.into(),
        }
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.end
    }
}

/// Clamp an arbitrary byte index down to the nearest char boundary.
pub(crate) fn clamp_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Merge sorted regions that overlap or sit within `max_gap` bytes of each
/// other; differing kinds are joined as `a+b`.
pub fn merge_regions(mut regions: Vec<ProtectedRegion>, max_gap: usize) -> Vec<ProtectedRegion> {
    if regions.is_empty() {
        return regions;
    }

    regions.sort_by_key(|r| r.start);
    let mut merged: Vec<ProtectedRegion> = vec![regions[0].clone()];

    for current in regions.into_iter().skip(1) {
        let last = merged.last_mut().expect("merged is non-empty");
        if current.start <= last.end + max_gap {
            last.end = last.end.max(current.end);
            if last.kind != current.kind && !last.kind.contains(&current.kind) {
                last.kind = format!("{}+{}", last.kind, current.kind);
            }
        } else {
            merged.push(current);
        }
    }

    merged
}

/// Detects mathematical content that must stay a complete unit.
pub struct MathDetector {
    patterns: Vec<Regex>,
    math_symbols: Vec<char>,
}

impl Default for MathDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MathDetector {
    pub fn new() -> Self {
        let sources = [
            // LaTeX
            r"\$\$[^$]+\$\$",
            r"\$[^$]+\$",
            r"(?s)\\begin\{equation\}.*?\\end\{equation\}",
            r"(?s)\\begin\{align\}.*?\\end\{align\}",
            r"(?s)\\begin\{eqnarray\}.*?\\end\{eqnarray\}",
            // Operators with context
            r"[∑∏∫∮∂∇][\w\s()]+",
            // Greek letter runs
            r"[α-ωΑ-Ω][\w\s]*",
            // Simple equalities: a op b = c
            r"\b\d+\s*[+\-*/]\s*\d+[^\n]*?=[^\n]*?\d+",
            // Function definitions
            r"[fgh]\([^)\n]+\)\s*=\s*[^,.\n]+",
            // Fractions
            r"\\frac\{[^}]+\}\{[^}]+\}",
            // Polynomials
            r"[xy][\d²³⁴]+\s*[+\-]\s*[xy]?[\d²³⁴]*",
        ];

        let patterns = sources
            .iter()
            .map(|s| Regex::new(s).expect("math pattern must compile"))
            .collect();

        Self {
            patterns,
            math_symbols: vec![
                '≈', '≠', '≤', '≥', '±', '∞', '√', '∑', '∏', '∫', '∮', '∂', '∇', 'π', 'θ', 'φ',
                'λ', 'μ', 'σ', 'ρ', 'Δ', 'Ω', 'α', 'β', 'γ',
            ],
        }
    }

    /// Count designated math symbols present in text.
    pub fn symbol_count(&self, text: &str) -> usize {
        text.chars()
            .filter(|c| self.math_symbols.contains(c))
            .count()
    }

    pub fn detect(&self, text: &str) -> Vec<ProtectedRegion> {
        let mut regions = Vec::new();

        for pattern in &self.patterns {
            for m in pattern.find_iter(text) {
                let kind = classify_math(m.as_str());
                regions.push(ProtectedRegion::new(m.start(), m.end(), kind));
            }
        }

        merge_regions(regions, 10)
    }
}

fn classify_math(content: &str) -> &'static str {
    if content.starts_with("$$") || content.contains("\\begin{") {
        "display_math"
    } else if content.starts_with('$') {
        "inline_math"
    } else if content.contains('=')
        && ['+', '-', '*', '/'].iter().any(|op| content.contains(*op))
    {
        "equation"
    } else if content.contains("f(") || content.contains("g(") {
        "function"
    } else {
        "mathematical_expression"
    }
}

/// Detects definitions and keeps them with their explanations.
pub struct DefinitionDetector {
    patterns: Vec<Regex>,
    sentence_end: Regex,
}

impl Default for DefinitionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionDetector {
    pub fn new() -> Self {
        let sources = [
            r"(?i)\bDefinition(\s+\d+(\.\d+)*)?\s*[:.]",
            r"(?i)\b[A-Z][a-z]+(\s+[A-Z]?[a-z]+)*\s+is\s+(defined\s+as|a|an)\s+",
            r"(?i)\b(Let|Suppose)\s+.{1,80}?\s+(be|denote|represent)\s+",
            r"(?i)\b(We\s+define|By\s+definition)\b",
        ];

        Self {
            patterns: sources
                .iter()
                .map(|s| Regex::new(s).expect("definition pattern must compile"))
                .collect(),
            sentence_end: Regex::new(r"[.!?]\s+").expect("sentence pattern must compile"),
        }
    }

    pub fn detect(&self, text: &str) -> Vec<ProtectedRegion> {
        let mut regions = Vec::new();
        let mut sentence_start = 0usize;

        let mut boundaries: Vec<usize> = self
            .sentence_end
            .find_iter(text)
            .map(|m| m.end())
            .collect();
        boundaries.push(text.len());

        for boundary in boundaries {
            if boundary <= sentence_start {
                continue;
            }
            let sentence = &text[sentence_start..boundary];
            if self.patterns.iter().any(|p| p.is_match(sentence)) {
                let end = self.definition_end(text, boundary);
                regions.push(ProtectedRegion::new(sentence_start, end, "definition"));
            }
            sentence_start = boundary;
        }

        regions
    }

    /// Extend a definition through its explanation: the next one or two
    /// sentences, never more than 200 characters past the match.
    fn definition_end(&self, text: &str, start: usize) -> usize {
        let remaining = &text[start..];

        let ends: Vec<usize> = self
            .sentence_end
            .find_iter(remaining)
            .take(2)
            .map(|m| start + m.end())
            .collect();

        match ends.len() {
            0 => clamp_boundary(text, (start + 200).min(text.len())),
            1 => ends[0],
            _ => {
                if ends[0] - start < 100 {
                    ends[1]
                } else {
                    ends[0]
                }
            }
        }
    }
}

/// Detects examples and exercises, keeping them with their solutions.
pub struct ExampleDetector {
    example_patterns: Vec<Regex>,
    solution_patterns: Vec<Regex>,
    paragraph_break: Regex,
}

impl Default for ExampleDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExampleDetector {
    pub fn new() -> Self {
        let example_sources = [
            r"(?i)\b(Example|Ex\.)\s*\d*\s*[:.]?",
            r"(?i)\b(Exercise|Problem)\s*\d*\s*[:.]?",
            r"(?i)\b(Consider|Suppose)\s+the\s+(following|case|example)",
            r"(?i)\bFor\s+(instance|example)\b",
        ];
        let solution_sources = [
            r"(?i)\b(Solution|Answer|Proof)\s*[:.]?",
            r"(?i)\b(We\s+(have|get|obtain|find)|Therefore|Thus|Hence)\b",
        ];

        Self {
            example_patterns: example_sources
                .iter()
                .map(|s| Regex::new(s).expect("example pattern must compile"))
                .collect(),
            solution_patterns: solution_sources
                .iter()
                .map(|s| Regex::new(s).expect("solution pattern must compile"))
                .collect(),
            paragraph_break: Regex::new(r"\n\s*\n").expect("paragraph pattern must compile"),
        }
    }

    pub fn detect(&self, text: &str) -> Vec<ProtectedRegion> {
        let mut regions = Vec::new();

        for pattern in &self.example_patterns {
            for m in pattern.find_iter(text) {
                let end = self.example_end(text, m.start());
                regions.push(ProtectedRegion::new(m.start(), end, "example"));
            }
        }

        merge_regions(regions, 0)
    }

    /// Extend an example through a Solution/Answer/Proof block when one
    /// follows within 500 characters, else to the next paragraph break.
    fn example_end(&self, text: &str, start: usize) -> usize {
        let remaining = &text[start..];

        let solution_start = self
            .solution_patterns
            .iter()
            .filter_map(|p| p.find(remaining))
            .map(|m| m.start())
            .filter(|&pos| pos < 500)
            .min();

        if let Some(rel_solution) = solution_start {
            let solution_abs = start + rel_solution;
            let solution_text = &text[solution_abs..];

            let next_example = self
                .example_patterns
                .iter()
                .filter_map(|p| p.find(solution_text))
                .map(|m| m.start())
                .filter(|&pos| pos > 50)
                .min();
            if let Some(pos) = next_example {
                return solution_abs + pos;
            }

            if let Some(m) = self.paragraph_break.find(solution_text) {
                if m.start() > 50 {
                    return solution_abs + m.start();
                }
            }
            clamp_boundary(text, (solution_abs + 300).min(text.len()))
        } else if let Some(m) = self.paragraph_break.find(remaining) {
            start + m.start()
        } else {
            clamp_boundary(text, (start + 200).min(text.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_math_detection() {
        let detector = MathDetector::new();
        let regions = detector.detect("The famous equation $E = mc^2$ changed physics.");

        assert!(!regions.is_empty());
        let region = &regions[0];
        assert!(region.kind.contains("inline_math"));
        assert_eq!(
            &"The famous equation $E = mc^2$ changed physics."[region.start..region.end],
            "$E = mc^2$"
        );
    }

    #[test]
    fn test_display_math_detection() {
        let detector = MathDetector::new();
        let regions = detector.detect("Consider $$\\int x dx$$ for the area.");

        assert!(regions.iter().any(|r| r.kind.contains("display_math")));
    }

    #[test]
    fn test_equation_environment() {
        let detector = MathDetector::new();
        let text = "\\begin{equation}\na^2 + b^2 = c^2\n\\end{equation}";
        let regions = detector.detect(text);

        assert!(!regions.is_empty());
        assert!(regions[0].kind.contains("display_math"));
    }

    #[test]
    fn test_math_symbol_count() {
        let detector = MathDetector::new();
        assert_eq!(detector.symbol_count("π ≈ 3.14 and Δ ≥ 0"), 3);
        assert_eq!(detector.symbol_count("plain prose"), 0);
    }

    #[test]
    fn test_definition_detection_extends() {
        let detector = DefinitionDetector::new();
        let text = "Definition 1.1: A function is a relation between sets. \
                    Each element in the domain maps to exactly one element. \
                    This property distinguishes functions.";
        let regions = detector.detect(text);

        assert!(!regions.is_empty());
        let region = &regions[0];
        assert_eq!(region.kind, "definition");
        assert!(region.end > text.find("sets.").unwrap() + 5);
    }

    #[test]
    fn test_example_with_solution() {
        let detector = ExampleDetector::new();
        let text = "Example 3: Compute the sum of 1 through 10.\n\
                    Solution: Pair the terms to get 5 times 11, which is 55. \
                    The technique generalizes to any arithmetic series nicely.\n\n\
                    Unrelated paragraph follows here.";
        let regions = detector.detect(text);

        assert!(!regions.is_empty());
        let region = &regions[0];
        assert!(text[region.start..region.end].contains("Solution"));
    }

    #[test]
    fn test_merge_overlapping_regions() {
        let regions = vec![
            ProtectedRegion::new(0, 50, "inline_math"),
            ProtectedRegion::new(55, 90, "definition"),
            ProtectedRegion::new(200, 250, "example"),
        ];
        let merged = merge_regions(regions, 20);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start, 0);
        assert_eq!(merged[0].end, 90);
        assert_eq!(merged[0].kind, "inline_math+definition");
        assert_eq!(merged[1].kind, "example");
    }

    #[test]
    fn test_merge_keeps_distant_regions_apart() {
        let regions = vec![
            ProtectedRegion::new(0, 10, "equation"),
            ProtectedRegion::new(100, 120, "equation"),
        ];
        let merged = merge_regions(regions, 20);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_no_regions_in_plain_text() {
        let detector = MathDetector::new();
        let regions = detector.detect("Just a perfectly ordinary paragraph of prose.");
        assert!(regions.is_empty());
    }
}

//! LLM orchestration: question generation, query expansion, answer
//! evaluation and content analysis
//!
//! Every gateway call goes through the circuit breaker; question and
//! expansion outputs are cached by content hash. Parsing prefers the
//! structured reply shape and falls back to heuristics.

use crate::cache::{cache_key, ArtifactCache};
use crate::config::BreakerConfig;
use crate::error::{LlmError, Result};
use crate::llm::breaker::{BreakerState, CircuitBreaker};
use crate::llm::client::{system_message, user_message, LlmClient};
use crate::llm::prompts;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const QUESTION_TTL_SECS: i64 = 3600;

/// A generated question with its expected answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub expected_answer: String,
    pub concept: String,
    pub difficulty: u8,
    pub question_type: String,
    pub generated_at: DateTime<Utc>,
}

/// LLM-expanded academic context for a search query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicContext {
    pub sentences: Vec<String>,
    pub combined_text: String,
    pub sentence_count: usize,
}

/// Result of grading a student answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    pub feedback: String,
    pub suggestions: Vec<String>,
}

/// Orchestrates prompted generation with cache, retry and circuit breaker.
pub struct LlmOrchestrator {
    client: Arc<dyn LlmClient>,
    breaker: CircuitBreaker,
    cache: Option<Arc<ArtifactCache>>,
    question_re: Regex,
    answer_re: Regex,
    score_re: Regex,
    feedback_re: Regex,
    suggestions_re: Regex,
}

impl LlmOrchestrator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        breaker_config: BreakerConfig,
        cache: Option<Arc<ArtifactCache>>,
    ) -> Self {
        Self {
            client,
            breaker: CircuitBreaker::new(breaker_config),
            cache,
            question_re: Regex::new(r"(?is)QUESTION:\s*(.+?)(?:EXPECTED_ANSWER:|$)")
                .expect("question regex must compile"),
            answer_re: Regex::new(r"(?is)EXPECTED_ANSWER:\s*(.+)$")
                .expect("answer regex must compile"),
            score_re: Regex::new(r"(?i)SCORE:\s*([\d.]+)").expect("score regex must compile"),
            feedback_re: Regex::new(r"(?is)FEEDBACK:\s*(.+?)(?:SUGGESTIONS:|$)")
                .expect("feedback regex must compile"),
            suggestions_re: Regex::new(r"(?is)SUGGESTIONS:\s*(.+)$")
                .expect("suggestions regex must compile"),
        }
    }

    /// Observable breaker state, surfaced by the health endpoint.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    /// Generate a single question for a chunk. Cached for one hour by the
    /// hash of all inputs; the quality gate rejects malformed output.
    pub async fn generate_question(
        &self,
        chunk_content: &str,
        concept: &str,
        difficulty: u8,
        context: &str,
        question_type: &str,
    ) -> Result<GeneratedQuestion> {
        let key = cache_key(
            "question",
            &[
                chunk_content,
                concept,
                &difficulty.to_string(),
                context,
                question_type,
            ],
        );

        if let Some(cache) = &self.cache {
            if let Ok(Some(value)) = cache.get_json(&key).await {
                if let Ok(cached) = serde_json::from_value::<GeneratedQuestion>(value) {
                    info!("Returning cached question for concept: {}", concept);
                    return Ok(cached);
                }
            }
        }

        if !self.breaker.can_execute() {
            warn!("Circuit breaker is open, skipping LLM call");
            return Err(LlmError::CircuitOpen.into());
        }

        let prompt = prompts::question_prompt(
            chunk_content,
            concept,
            difficulty,
            context,
            question_type,
        );
        let messages = [
            system_message(prompts::QUESTION_SYSTEM_PROMPT),
            user_message(prompt),
        ];

        let content = match self.client.generate(&messages).await {
            Ok(content) => content,
            Err(e) => {
                self.breaker.record_failure();
                return Err(e);
            }
        };

        let (question, expected_answer) = self.parse_question_response(&content);

        let (Some(question), Some(expected_answer)) = (question, expected_answer) else {
            self.breaker.record_failure();
            return Err(LlmError::InvalidResponse(
                "missing question or expected answer".to_string(),
            )
            .into());
        };

        let generated = GeneratedQuestion {
            question,
            expected_answer,
            concept: concept.to_string(),
            difficulty,
            question_type: question_type.to_string(),
            generated_at: Utc::now(),
        };

        if let Err(reason) = validate_question_quality(&generated) {
            warn!(
                "Generated question failed quality validation for concept {}: {}",
                concept, reason
            );
            self.breaker.record_success();
            return Err(LlmError::QualityRejected(reason).into());
        }

        self.breaker.record_success();

        if let Some(cache) = &self.cache {
            if let Ok(value) = serde_json::to_value(&generated) {
                let _ = cache.set_json(&key, &value, Some(QUESTION_TTL_SECS)).await;
            }
        }

        info!("Successfully generated question for concept: {}", concept);
        Ok(generated)
    }

    /// Generate several questions concurrently, cycling difficulty through
    /// the given range and types through the given list. Results keep the
    /// fan-out order; failed slots are dropped.
    pub async fn generate_questions(
        &self,
        chunk_content: &str,
        concept: &str,
        count: usize,
        difficulty_range: (u8, u8),
        question_types: &[String],
    ) -> Vec<GeneratedQuestion> {
        let default_types = ["comprehension", "application", "analysis"];
        let types: Vec<&str> = if question_types.is_empty() {
            default_types.to_vec()
        } else {
            question_types.iter().map(|s| s.as_str()).collect()
        };

        let (low, high) = difficulty_range;
        let span = high.saturating_sub(low) + 1;

        let tasks = (0..count).map(|i| {
            let difficulty = low + (i as u8 % span);
            let question_type = types[i % types.len()];
            self.generate_question(chunk_content, concept, difficulty, "", question_type)
        });

        let results = join_all(tasks).await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(question) => Some(question),
                Err(e) => {
                    warn!("Question generation failed in batch: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Expand a user query into `n` academic sentences plus a combined
    /// text suitable for re-embedding.
    pub async fn expand_query(&self, user_input: &str, n: usize) -> Result<AcademicContext> {
        let key = cache_key("expansion", &[user_input, &n.to_string()]);

        if let Some(cache) = &self.cache {
            if let Ok(Some(value)) = cache.get_json(&key).await {
                if let Ok(cached) = serde_json::from_value::<AcademicContext>(value) {
                    debug!("Returning cached expansion for query");
                    return Ok(cached);
                }
            }
        }

        if !self.breaker.can_execute() {
            return Err(LlmError::CircuitOpen.into());
        }

        let messages = [
            system_message(prompts::EXPANSION_SYSTEM_PROMPT),
            user_message(prompts::expansion_prompt(user_input, n)),
        ];

        let content = match self.client.generate(&messages).await {
            Ok(content) => content,
            Err(e) => {
                self.breaker.record_failure();
                return Err(e);
            }
        };
        self.breaker.record_success();

        let sentences: Vec<String> = content
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(|c: char| {
                        c.is_ascii_digit() || c == '.' || c == '-' || c == '*' || c == ' '
                    })
                    .to_string()
            })
            .filter(|line| !line.is_empty())
            .take(n)
            .collect();

        if sentences.is_empty() {
            return Err(
                LlmError::InvalidResponse("no sentences in expansion".to_string()).into(),
            );
        }

        let combined_text = sentences.join(" ");
        let context = AcademicContext {
            sentence_count: sentences.len(),
            sentences,
            combined_text,
        };

        if let Some(cache) = &self.cache {
            if let Ok(value) = serde_json::to_value(&context) {
                let _ = cache.set_json(&key, &value, None).await;
            }
        }

        Ok(context)
    }

    /// Grade a student answer. When the gateway is unavailable or the
    /// reply fails validation, word-overlap fallback scoring applies.
    pub async fn evaluate_answer(
        &self,
        question: &str,
        expected_answer: &str,
        student_answer: &str,
        context: &str,
        difficulty: u8,
    ) -> Evaluation {
        if !self.breaker.can_execute() {
            warn!("Circuit breaker open, using fallback evaluation");
            return fallback_evaluation(student_answer, expected_answer);
        }

        let messages = [
            system_message(prompts::EVALUATION_SYSTEM_PROMPT),
            user_message(prompts::evaluation_prompt(
                question,
                expected_answer,
                student_answer,
                context,
                difficulty,
            )),
        ];

        let content = match self.client.generate(&messages).await {
            Ok(content) => {
                self.breaker.record_success();
                content
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!("LLM evaluation failed ({}), using fallback", e);
                return fallback_evaluation(student_answer, expected_answer);
            }
        };

        let evaluation = self.parse_evaluation_response(&content);
        if validate_evaluation(&evaluation) {
            evaluation
        } else {
            warn!("Evaluation failed validation, using fallback");
            fallback_evaluation(student_answer, expected_answer)
        }
    }

    /// Analyze content along one axis: difficulty, concepts or readability.
    pub async fn analyze_content(&self, text: &str, kind: &str) -> Result<String> {
        let key = cache_key("analysis", &[text, kind]);

        if let Some(cache) = &self.cache {
            if let Ok(Some(value)) = cache.get_json(&key).await {
                if let Some(cached) = value.as_str() {
                    return Ok(cached.to_string());
                }
            }
        }

        if !self.breaker.can_execute() {
            return Err(LlmError::CircuitOpen.into());
        }

        let messages = [
            system_message(prompts::QUESTION_SYSTEM_PROMPT),
            user_message(prompts::analysis_prompt(text, kind)),
        ];

        let content = match self.client.generate(&messages).await {
            Ok(content) => {
                self.breaker.record_success();
                content
            }
            Err(e) => {
                self.breaker.record_failure();
                return Err(e);
            }
        };

        if let Some(cache) = &self.cache {
            let _ = cache
                .set_json(&key, &serde_json::Value::String(content.clone()), None)
                .await;
        }

        Ok(content)
    }

    /// Structured extraction with heuristic fallback: the first
    /// `?`-terminated line becomes the question, the longest remaining
    /// block the answer.
    fn parse_question_response(&self, content: &str) -> (Option<String>, Option<String>) {
        let mut question = self
            .question_re
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()));
        let mut answer = self
            .answer_re
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()));

        if question.as_deref().map(str::is_empty).unwrap_or(true)
            || answer.as_deref().map(str::is_empty).unwrap_or(true)
        {
            let lines: Vec<&str> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();

            if question.as_deref().map(str::is_empty).unwrap_or(true) {
                question = lines
                    .iter()
                    .find(|line| {
                        line.contains('?') || {
                            let lower = line.to_lowercase();
                            ["what", "how", "why", "when", "where", "which"]
                                .iter()
                                .any(|w| lower.starts_with(w))
                        }
                    })
                    .or(lines.first())
                    .map(|l| clean_text(l));
            }

            if answer.as_deref().map(str::is_empty).unwrap_or(true) {
                let q = question.clone().unwrap_or_default();
                answer = lines
                    .iter()
                    .copied()
                    .filter(|line| *line != q && line.len() > 50)
                    .max_by_key(|line| line.len())
                    .map(clean_text);
            }
        }

        (
            question.filter(|q| !q.is_empty()),
            answer.filter(|a| !a.is_empty()),
        )
    }

    fn parse_evaluation_response(&self, content: &str) -> Evaluation {
        let score = self
            .score_re
            .captures(content)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        let feedback = self
            .feedback_re
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| "Your answer has been evaluated.".to_string());

        let suggestions_text = self
            .suggestions_re
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let suggestions = if suggestions_text.is_empty()
            || suggestions_text.eq_ignore_ascii_case("none")
        {
            Vec::new()
        } else {
            suggestions_text
                .split(|c| c == ',' || c == ';' || c == '\n')
                .map(|s| s.trim().trim_start_matches('-').trim().to_string())
                .filter(|s| s.len() > 10)
                .take(3)
                .collect()
        };

        Evaluation {
            score,
            feedback,
            suggestions,
        }
    }
}

fn clean_text(text: &str) -> String {
    let mut cleaned = text.trim().to_string();

    for prefix in ["QUESTION:", "EXPECTED_ANSWER:", "question:", "expected_answer:"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim().to_string();
        }
    }

    cleaned = cleaned
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == ' ')
        .trim_start_matches(['-', '*'])
        .trim()
        .to_string();

    let collapsed: String = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
}

/// Quality gate: length windows, terminal `?`, no placeholder tokens, and
/// ≥ 30% of concept tokens present in question ∪ answer.
fn validate_question_quality(question: &GeneratedQuestion) -> std::result::Result<(), String> {
    let q_len = question.question.len();
    if !(100..=500).contains(&q_len) {
        return Err(format!("question length {} outside 100-500", q_len));
    }

    let a_len = question.expected_answer.len();
    if !(200..=1000).contains(&a_len) {
        return Err(format!("answer length {} outside 200-1000", a_len));
    }

    if !question.question.trim_end().ends_with('?') {
        return Err("question does not end with a question mark".to_string());
    }

    let combined = format!(
        "{} {}",
        question.question.to_lowercase(),
        question.expected_answer.to_lowercase()
    );
    for token in ["...", "…", "todo", "placeholder", "["] {
        if combined.contains(token) {
            return Err(format!("contains placeholder token {:?}", token));
        }
    }

    if question.concept.len() > 3 {
        let concept_words: Vec<String> = question
            .concept
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();
        if !concept_words.is_empty() {
            let present = concept_words
                .iter()
                .filter(|w| combined.contains(w.as_str()))
                .count();
            let relevance = present as f64 / concept_words.len() as f64;
            if relevance < 0.3 {
                return Err(format!("low concept relevance {:.2}", relevance));
            }
        }
    }

    Ok(())
}

fn validate_evaluation(evaluation: &Evaluation) -> bool {
    if !(0.0..=1.0).contains(&evaluation.score) {
        return false;
    }
    if evaluation.feedback.len() < 20 {
        return false;
    }
    if evaluation.score < 0.8 && evaluation.suggestions.is_empty() {
        return false;
    }
    true
}

/// Word-overlap scoring used when the LLM is unavailable. Capped at 0.9;
/// short answers are damped.
pub fn fallback_evaluation(student_answer: &str, expected_answer: &str) -> Evaluation {
    let student_words: std::collections::HashSet<String> = student_answer
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();
    let expected_words: std::collections::HashSet<String> = expected_answer
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();

    let mut score = if expected_words.is_empty() {
        0.5
    } else {
        let overlap = student_words.intersection(&expected_words).count();
        (overlap as f64 / expected_words.len() as f64).min(0.9)
    };

    if student_answer.len() < 50 {
        score *= 0.8;
    }
    score = (score * 100.0).round() / 100.0;

    let mut feedback = String::from("Your answer has been automatically evaluated. ");
    if score >= 0.8 {
        feedback.push_str("Good job! You've demonstrated understanding of the concept.");
    } else if score >= 0.6 {
        feedback
            .push_str("You're on the right track. Consider expanding your answer with more detail.");
    } else {
        feedback.push_str(
            "Your answer needs more work. Review the material and try to address all aspects of the question.",
        );
    }

    let suggestions = if score < 0.8 {
        vec![
            "Review the learning material for this concept".to_string(),
            "Try to include more specific details in your answer".to_string(),
        ]
    } else {
        Vec::new()
    };

    Evaluation {
        score,
        feedback,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::error::Result as LearnResult;
    use crate::llm::client::Message;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        replies: Vec<std::result::Result<String, ()>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(replies: Vec<std::result::Result<String, ()>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn generate(&self, _messages: &[Message]) -> LearnResult<String> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.get(index).or_else(|| self.replies.last());
            match reply {
                Some(Ok(text)) => Ok(text.clone()),
                _ => Err(LlmError::ConnectionFailed("scripted failure".to_string()).into()),
            }
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    fn good_reply() -> String {
        let question = "What fundamental property distinguishes a binary search tree from an \
                        ordinary binary tree, and how does that property support efficient lookup?";
        let answer = "A binary search tree keeps every node's left subtree strictly below its \
                      key and the right subtree strictly above it. Because the invariant holds \
                      recursively, each comparison at a node discards half of the remaining \
                      candidates, which is what gives lookup its logarithmic behavior on \
                      balanced trees.";
        format!("QUESTION: {}\nEXPECTED_ANSWER: {}", question, answer)
    }

    fn orchestrator(replies: Vec<std::result::Result<String, ()>>) -> LlmOrchestrator {
        LlmOrchestrator::new(
            Arc::new(ScriptedClient::new(replies)),
            BreakerConfig {
                failure_threshold: 2,
                timeout_secs: 60,
            },
            None,
        )
    }

    async fn cached_orchestrator(
        replies: Vec<std::result::Result<String, ()>>,
    ) -> LlmOrchestrator {
        let cache = ArtifactCache::new(CacheConfig {
            enabled: true,
            db_path: "sqlite::memory:".to_string(),
            max_entries: 100,
            default_ttl_secs: 3600,
        })
        .await
        .unwrap();

        LlmOrchestrator::new(
            Arc::new(ScriptedClient::new(replies)),
            BreakerConfig::default(),
            Some(Arc::new(cache)),
        )
    }

    #[tokio::test]
    async fn test_generate_question_parses_structured_reply() {
        let orch = orchestrator(vec![Ok(good_reply())]);
        let question = orch
            .generate_question("content", "binary search tree", 3, "", "comprehension")
            .await
            .unwrap();

        assert!(question.question.ends_with('?'));
        assert!(question.expected_answer.len() >= 200);
        assert_eq!(question.difficulty, 3);
    }

    #[tokio::test]
    async fn test_quality_gate_rejects_short_question() {
        let orch = orchestrator(vec![Ok(
            "QUESTION: Too short?\nEXPECTED_ANSWER: Also much too short.".to_string(),
        )]);
        let result = orch
            .generate_question("content", "trees", 3, "", "comprehension")
            .await;

        assert!(matches!(
            result,
            Err(crate::error::LearnError::Llm(LlmError::QualityRejected(_)))
        ));
    }

    #[tokio::test]
    async fn test_breaker_opens_after_failures() {
        let orch = orchestrator(vec![Err(()), Err(()), Ok(good_reply())]);

        let _ = orch
            .generate_question("c", "binary search tree", 3, "", "comprehension")
            .await;
        let _ = orch
            .generate_question("c", "binary search tree", 3, "", "comprehension")
            .await;

        assert_eq!(orch.breaker_state(), BreakerState::Open);
        let third = orch
            .generate_question("c", "binary search tree", 3, "", "comprehension")
            .await;
        assert!(matches!(
            third,
            Err(crate::error::LearnError::Llm(LlmError::CircuitOpen))
        ));
    }

    #[tokio::test]
    async fn test_question_cache_hit_skips_gateway() {
        let orch = cached_orchestrator(vec![Ok(good_reply()), Err(())]).await;

        let first = orch
            .generate_question("c", "binary search tree", 3, "", "comprehension")
            .await
            .unwrap();
        // Second call must come from cache: the scripted client would fail.
        let second = orch
            .generate_question("c", "binary search tree", 3, "", "comprehension")
            .await
            .unwrap();

        assert_eq!(first.question, second.question);
    }

    #[tokio::test]
    async fn test_expand_query_collects_sentences() {
        let orch = orchestrator(vec![Ok(
            "Binary search trees order their keys.\nEach lookup halves the space.\nBalancing keeps depth logarithmic.".to_string(),
        )]);
        let context = orch.expand_query("binary search trees", 5).await.unwrap();

        assert_eq!(context.sentence_count, 3);
        assert!(context.combined_text.contains("halves the space"));
    }

    #[tokio::test]
    async fn test_evaluate_answer_parses_reply() {
        let orch = orchestrator(vec![Ok(
            "SCORE: 0.85\nFEEDBACK: A clear and mostly complete answer to the question posed.\nSUGGESTIONS: None".to_string(),
        )]);
        let evaluation = orch
            .evaluate_answer("Q?", "expected words", "student words", "", 3)
            .await;

        assert!((evaluation.score - 0.85).abs() < 1e-9);
        assert!(evaluation.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_answer_falls_back_on_failure() {
        let orch = orchestrator(vec![Err(())]);
        let evaluation = orch
            .evaluate_answer(
                "Q?",
                "graphs store nodes and edges efficiently",
                "graphs store nodes and edges efficiently",
                "",
                3,
            )
            .await;

        assert!(evaluation.score <= 0.9);
        assert!(!evaluation.feedback.is_empty());
    }

    #[tokio::test]
    async fn test_generate_questions_drops_failures() {
        let orch = orchestrator(vec![Ok(good_reply()), Err(()), Ok(good_reply())]);
        let questions = orch
            .generate_questions("content", "binary search tree", 3, (2, 4), &[])
            .await;

        assert!(questions.len() <= 3);
        for q in &questions {
            assert!(q.question.ends_with('?'));
        }
    }

    #[test]
    fn test_fallback_evaluation_caps_score() {
        let expected = "the binary search tree invariant orders keys for logarithmic search";
        let evaluation = fallback_evaluation(expected, expected);
        assert!(evaluation.score <= 0.9);
        assert!(evaluation.score > 0.7);
    }

    #[test]
    fn test_fallback_evaluation_damps_short_answers() {
        let expected = "a long expected answer with very many distinct meaningful words inside";
        let short = fallback_evaluation("a long", expected);
        let full = fallback_evaluation(expected, expected);
        assert!(short.score < full.score);
        assert!(!short.suggestions.is_empty());
    }

    #[test]
    fn test_heuristic_parse_picks_question_line() {
        let orch = orchestrator(vec![]);
        let content = "Here is my output\nWhat is the height of a balanced tree with n nodes?\n\
                       The height of a balanced binary tree with n nodes grows logarithmically because each level doubles capacity.";
        let (question, answer) = orch.parse_question_response(content);

        assert!(question.unwrap().contains("height of a balanced tree"));
        assert!(answer.unwrap().contains("grows logarithmically"));
    }
}

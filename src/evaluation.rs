//! Answer evaluation: LLM grading, progress tracking and mastery closure
//!
//! Grading and the progress upsert are the primary steps; ticket closure,
//! result caching and cache invalidation are auxiliary and never fail the
//! evaluation.

use crate::cache::ArtifactCache;
use crate::error::{LearnError, Result};
use crate::llm::orchestrator::LlmOrchestrator;
use crate::store::{ProgressUpdate, RelationalStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

const EVALUATION_TTL_SECS: i64 = 3600;
pub const DEFAULT_MASTERY_THRESHOLD: f64 = 0.8;

/// Result of evaluating one submitted answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub score: f64,
    pub feedback: String,
    pub suggestions: Vec<String>,
    pub status: String,
    pub mastery_achieved: bool,
}

/// One attempt-history entry for a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: String,
    pub score: Option<f64>,
    pub time_spent_minutes: i64,
    pub attempt_count: i64,
    pub last_accessed: Option<String>,
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated: Option<String>,
}

/// Evaluates student answers and maintains progress state.
pub struct AnswerEvaluator {
    store: Arc<RelationalStore>,
    llm: Arc<LlmOrchestrator>,
    cache: Option<Arc<ArtifactCache>>,
    mastery_threshold: f64,
}

impl AnswerEvaluator {
    pub fn new(
        store: Arc<RelationalStore>,
        llm: Arc<LlmOrchestrator>,
        cache: Option<Arc<ArtifactCache>>,
    ) -> Self {
        Self {
            store,
            llm,
            cache,
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
        }
    }

    pub fn with_mastery_threshold(mut self, threshold: f64) -> Self {
        self.mastery_threshold = threshold;
        self
    }

    /// Evaluate a student's answer for a learning ticket.
    pub async fn evaluate(
        &self,
        user_id: &str,
        ticket_id: i64,
        student_answer: &str,
        time_spent_minutes: Option<i64>,
    ) -> Result<EvaluationOutcome> {
        let Some(fields) = self.store.question_fields(ticket_id).await? else {
            warn!("No question data found for ticket {}", ticket_id);
            return Err(LearnError::NotFound("Question not found".to_string()));
        };

        let evaluation = self
            .llm
            .evaluate_answer(
                &fields.question,
                &fields.expected_answer,
                student_answer,
                &fields.context,
                fields.difficulty,
            )
            .await;

        let status = if evaluation.score >= self.mastery_threshold {
            "mastered"
        } else {
            "completed"
        };

        let concept_id = self.store.concept_for_ticket(ticket_id).await?;
        match concept_id {
            Some(concept_id) => {
                let notes = serde_json::json!({
                    "last_answer": student_answer,
                    "last_feedback": evaluation.feedback,
                    "last_evaluated": Utc::now().to_rfc3339(),
                });

                self.store
                    .upsert_progress(&ProgressUpdate {
                        user_id: user_id.to_string(),
                        concept_id,
                        ticket_id,
                        status: status.to_string(),
                        mastery_score: Some(evaluation.score),
                        time_spent_minutes: time_spent_minutes.unwrap_or(0),
                        notes: Some(notes.to_string()),
                    })
                    .await?;
            }
            None => {
                warn!(
                    "No concept record for ticket {}; progress not tracked",
                    ticket_id
                );
            }
        }

        if status == "mastered" {
            if let Err(e) = self
                .store
                .close_ticket_mastered(ticket_id, "learning-system")
                .await
            {
                error!("Error updating ticket status: {}", e);
            }
        }

        self.cache_evaluation(user_id, ticket_id, &evaluation).await;
        self.invalidate_caches(user_id, ticket_id).await;

        info!(
            "Evaluated answer for user {}, ticket {}, score {:.2}",
            user_id, ticket_id, evaluation.score
        );

        Ok(EvaluationOutcome {
            score: evaluation.score,
            feedback: evaluation.feedback,
            suggestions: evaluation.suggestions,
            status: status.to_string(),
            mastery_achieved: status == "mastered",
        })
    }

    /// Attempt history for a user and ticket.
    pub async fn history(&self, user_id: &str, ticket_id: i64) -> Result<Vec<HistoryEntry>> {
        let Some(concept_id) = self.store.concept_for_ticket(ticket_id).await? else {
            return Ok(Vec::new());
        };

        let Some(row) = self.store.progress_for(user_id, concept_id).await? else {
            return Ok(Vec::new());
        };

        let mut entry = HistoryEntry {
            status: row.status,
            score: row.mastery_score,
            time_spent_minutes: row.time_spent_minutes,
            attempt_count: row.attempt_count,
            last_accessed: row.last_accessed,
            completed_at: row.completed_at,
            last_answer: None,
            last_feedback: None,
            last_evaluated: None,
        };

        if let Some(notes) = row.notes {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&notes) {
                entry.last_answer = parsed
                    .get("last_answer")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                entry.last_feedback = parsed
                    .get("last_feedback")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                entry.last_evaluated = parsed
                    .get("last_evaluated")
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
        }

        Ok(vec![entry])
    }

    async fn cache_evaluation(
        &self,
        user_id: &str,
        ticket_id: i64,
        evaluation: &crate::llm::orchestrator::Evaluation,
    ) {
        let Some(cache) = &self.cache else {
            return;
        };

        let key = format!("evaluation:{}:{}", user_id, ticket_id);
        let value = serde_json::json!({
            "score": evaluation.score,
            "feedback": evaluation.feedback,
            "suggestions": evaluation.suggestions,
            "evaluated_at": Utc::now().to_rfc3339(),
        });

        if let Err(e) = cache.set_json(&key, &value, Some(EVALUATION_TTL_SECS)).await {
            error!("Error caching evaluation: {}", e);
        }
    }

    async fn invalidate_caches(&self, user_id: &str, ticket_id: i64) {
        let Some(cache) = &self.cache else {
            return;
        };

        let milestone = match self.store.ticket_milestone(ticket_id).await {
            Ok(milestone) => milestone,
            Err(e) => {
                error!("Error loading milestone for cache invalidation: {}", e);
                None
            }
        };

        let mut keys = vec![
            format!("user_progress:{}", user_id),
            format!("learning_progress:{}_{}", ticket_id, user_id),
        ];
        if let Some(milestone) = milestone {
            keys.push(format!("milestone_graph:{}", milestone));
            keys.push(format!("learning_graph:{}:{}", milestone, user_id));
        }

        for key in keys {
            if let Err(e) = cache.invalidate(&key).await {
                error!("Error invalidating cache key {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::llm::client::{LlmClient, Message};
    use crate::store::{ConceptRecord, NewTicket};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct FixedScoreClient {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for FixedScoreClient {
        async fn generate(&self, _messages: &[Message]) -> Result<String> {
            Ok(self.reply.clone())
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    async fn evaluator_with_reply(reply: &str) -> (AnswerEvaluator, i64) {
        let store = Arc::new(
            RelationalStore::connect_url("sqlite::memory:", 2)
                .await
                .unwrap(),
        );

        let mut tx = store.begin().await.unwrap();
        let ticket_id = store
            .insert_ticket(
                &mut tx,
                &NewTicket {
                    ticket_type: "learning_concept".to_string(),
                    milestone: "algebra".to_string(),
                    status: "new".to_string(),
                    resolution: String::new(),
                    summary: "Groups".to_string(),
                    description: "Group theory content".to_string(),
                    owner: "student-1".to_string(),
                    reporter: "learning-system".to_string(),
                    keywords: "learning".to_string(),
                },
            )
            .await
            .unwrap();
        store
            .insert_custom_fields(
                &mut tx,
                ticket_id,
                &[
                    ("question".to_string(), "What is a group?".to_string()),
                    (
                        "expected_answer".to_string(),
                        "A set with an associative operation, identity and inverses.".to_string(),
                    ),
                    ("question_difficulty".to_string(), "3".to_string()),
                ],
            )
            .await
            .unwrap();
        store
            .insert_concept_records(
                &mut tx,
                &[ConceptRecord {
                    concept_id: Uuid::new_v4(),
                    ticket_id,
                    path_id: Uuid::new_v4(),
                    sequence_order: 1,
                    difficulty_score: 3.0,
                    mastery_threshold: 0.8,
                    estimated_minutes: 30,
                    tags: String::new(),
                }],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let llm = Arc::new(LlmOrchestrator::new(
            Arc::new(FixedScoreClient {
                reply: reply.to_string(),
            }),
            BreakerConfig::default(),
            None,
        ));

        (AnswerEvaluator::new(store, llm, None), ticket_id)
    }

    #[tokio::test]
    async fn test_mastery_closes_ticket_and_sets_progress() {
        let reply = "SCORE: 0.9\nFEEDBACK: Excellent and complete answer covering every key point.\nSUGGESTIONS: None";
        let (evaluator, ticket_id) = evaluator_with_reply(reply).await;

        let outcome = evaluator
            .evaluate("student-1", ticket_id, "A set with an associative operation.", Some(12))
            .await
            .unwrap();

        assert_eq!(outcome.status, "mastered");
        assert!(outcome.mastery_achieved);

        let row = sqlx::query("SELECT status, resolution FROM ticket WHERE id = ?")
            .bind(ticket_id)
            .fetch_one(evaluator.store.pool())
            .await
            .unwrap();
        use sqlx::Row;
        assert_eq!(row.get::<String, _>("status"), "closed");
        assert_eq!(row.get::<String, _>("resolution"), "fixed");

        let history = evaluator.history("student-1", ticket_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].attempt_count >= 1);
        assert!(history[0].completed_at.is_some());
        assert_eq!(history[0].status, "mastered");
    }

    #[tokio::test]
    async fn test_below_threshold_marks_completed() {
        let reply = "SCORE: 0.55\nFEEDBACK: The answer shows partial understanding of group axioms.\nSUGGESTIONS: Review the identity element, Study inverse elements carefully";
        let (evaluator, ticket_id) = evaluator_with_reply(reply).await;

        let outcome = evaluator
            .evaluate("student-1", ticket_id, "A set.", None)
            .await
            .unwrap();

        assert_eq!(outcome.status, "completed");
        assert!(!outcome.mastery_achieved);
        assert!(!outcome.suggestions.is_empty());

        let row = sqlx::query("SELECT status FROM ticket WHERE id = ?")
            .bind(ticket_id)
            .fetch_one(evaluator.store.pool())
            .await
            .unwrap();
        use sqlx::Row;
        assert_eq!(row.get::<String, _>("status"), "new");
    }

    #[tokio::test]
    async fn test_missing_question_is_not_found() {
        let (evaluator, _) = evaluator_with_reply("SCORE: 0.9\nFEEDBACK: n/a\nSUGGESTIONS: None").await;

        let result = evaluator.evaluate("student-1", 9999, "answer", None).await;
        assert!(matches!(result, Err(LearnError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_records_last_answer() {
        let reply = "SCORE: 0.9\nFEEDBACK: A thorough and well-structured answer to the question.\nSUGGESTIONS: None";
        let (evaluator, ticket_id) = evaluator_with_reply(reply).await;

        evaluator
            .evaluate("student-1", ticket_id, "my detailed answer", None)
            .await
            .unwrap();

        let history = evaluator.history("student-1", ticket_id).await.unwrap();
        assert_eq!(history[0].last_answer.as_deref(), Some("my detailed answer"));
        assert!(history[0].last_feedback.is_some());
    }
}

//! Transactional learning-path assembly
//!
//! Builds one ticket per retrieved chunk with generated questions, concept
//! records in input order, and prerequisite rows resolved by concept name.
//! Question generation fans out in parallel; every insert happens inside a
//! single transaction that rolls back on any failure.

use crate::error::{LearnError, Result};
use crate::llm::orchestrator::LlmOrchestrator;
use crate::store::{ConceptRecord, LearningPath, NewTicket, Prerequisite, RelationalStore};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_QUERY_LENGTH: usize = 1000;
const DEFAULT_QUESTION_DIFFICULTY: u8 = 3;

/// One retrieved chunk feeding path assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub id: String,
    pub content: String,
    pub concept: String,
    pub subject: String,
    pub score: f64,
    #[serde(default)]
    pub has_prerequisite: Vec<String>,
    #[serde(default)]
    pub prerequisite_for: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Assembles learning paths from retrieved chunks.
pub struct LearningPathBuilder {
    store: Arc<RelationalStore>,
    llm: Arc<LlmOrchestrator>,
}

struct PreparedQuestion {
    question: String,
    expected_answer: String,
}

impl LearningPathBuilder {
    pub fn new(store: Arc<RelationalStore>, llm: Arc<LlmOrchestrator>) -> Self {
        Self { store, llm }
    }

    /// Create a learning path: one ticket, one concept record and a
    /// sequence position per chunk, plus prerequisite rows for every
    /// `has_prerequisite` entry that resolves to a concept in this path.
    pub async fn create_path(
        &self,
        user_id: &str,
        query: &str,
        chunks: &[ChunkInput],
        title: Option<String>,
        difficulty: &str,
    ) -> Result<Uuid> {
        validate_input(user_id, query, chunks)?;

        // Question generation fans out before the transaction opens; a
        // failed generation falls back to a canned question so one bad
        // LLM reply cannot abort the whole path.
        let questions = self.generate_questions(chunks, query).await;

        let path_id = Uuid::new_v4();
        let title = title.unwrap_or_else(|| {
            let prefix: String = query.chars().take(50).collect();
            format!("Learning Path: {}...", prefix)
        });

        let mut tx = self.store.begin().await?;

        self.store
            .insert_learning_path(
                &mut tx,
                &LearningPath {
                    path_id,
                    user_id: user_id.to_string(),
                    title,
                    query: query.to_string(),
                    difficulty: difficulty.to_string(),
                    created_at: Utc::now(),
                },
            )
            .await?;

        info!("Created learning path {} for user {}", path_id, user_id);

        // Tickets insert in input order; sequence_order mirrors that
        // order regardless of question completion order.
        let mut concept_map: HashMap<String, (i64, Uuid)> = HashMap::new();
        let mut records = Vec::with_capacity(chunks.len());

        for (i, (chunk, question)) in chunks.iter().zip(questions.iter()).enumerate() {
            let ticket_id = self
                .store
                .insert_ticket(
                    &mut tx,
                    &NewTicket {
                        ticket_type: "learning_concept".to_string(),
                        milestone: chunk.subject.clone(),
                        status: "new".to_string(),
                        resolution: String::new(),
                        summary: chunk.concept.clone(),
                        description: chunk.content.clone(),
                        owner: user_id.to_string(),
                        reporter: "learning-system".to_string(),
                        keywords: format!("learning,{},{}", chunk.subject, chunk.concept),
                    },
                )
                .await?;

            let mut fields = vec![
                ("question".to_string(), question.question.clone()),
                (
                    "expected_answer".to_string(),
                    question.expected_answer.clone(),
                ),
                (
                    "question_difficulty".to_string(),
                    DEFAULT_QUESTION_DIFFICULTY.to_string(),
                ),
                ("question_context".to_string(), query.to_string()),
                ("chunk_id".to_string(), chunk.id.clone()),
                ("cognito_user_id".to_string(), user_id.to_string()),
                ("relevance_score".to_string(), chunk.score.to_string()),
                ("learning_type".to_string(), "concept".to_string()),
                ("auto_generated".to_string(), "true".to_string()),
            ];
            for (key, value) in &chunk.metadata {
                if let Some(scalar) = scalar_string(value) {
                    fields.push((format!("metadata_{}", key), scalar));
                }
            }
            self.store
                .insert_custom_fields(&mut tx, ticket_id, &fields)
                .await?;

            let concept_id = Uuid::new_v4();
            concept_map
                .entry(chunk.concept.clone())
                .or_insert((ticket_id, concept_id));

            records.push(ConceptRecord {
                concept_id,
                ticket_id,
                path_id,
                sequence_order: (i + 1) as i64,
                difficulty_score: DEFAULT_QUESTION_DIFFICULTY as f64,
                mastery_threshold: 0.8,
                estimated_minutes: 30,
                tags: "auto-generated".to_string(),
            });
        }

        self.store.insert_concept_records(&mut tx, &records).await?;

        let prerequisite_rows = resolve_prerequisites(chunks, &records, &concept_map);
        self.store
            .insert_prerequisites(&mut tx, &prerequisite_rows)
            .await?;

        tx.commit().await?;

        info!(
            "Learning path {} assembled with {} tickets and {} prerequisites",
            path_id,
            chunks.len(),
            prerequisite_rows.len()
        );
        Ok(path_id)
    }

    async fn generate_questions(
        &self,
        chunks: &[ChunkInput],
        query: &str,
    ) -> Vec<PreparedQuestion> {
        let tasks = chunks.iter().map(|chunk| {
            self.llm.generate_question(
                &chunk.content,
                &chunk.concept,
                DEFAULT_QUESTION_DIFFICULTY,
                query,
                "comprehension",
            )
        });

        join_all(tasks)
            .await
            .into_iter()
            .zip(chunks.iter())
            .map(|(result, chunk)| match result {
                Ok(generated) => PreparedQuestion {
                    question: generated.question,
                    expected_answer: generated.expected_answer,
                },
                Err(e) => {
                    warn!(
                        "Question generation failed for chunk {}: {}; using fallback",
                        chunk.id, e
                    );
                    PreparedQuestion {
                        question: format!("What is the key concept in {}?", chunk.concept),
                        expected_answer: format!(
                            "The key concept involves understanding {} as described in the learning material.",
                            chunk.concept
                        ),
                    }
                }
            })
            .collect()
    }
}

fn validate_input(user_id: &str, query: &str, chunks: &[ChunkInput]) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(LearnError::Validation(
            "user_id must be a non-empty string".to_string(),
        ));
    }
    if query.trim().is_empty() {
        return Err(LearnError::Validation(
            "query must be a non-empty string".to_string(),
        ));
    }
    if query.len() > MAX_QUERY_LENGTH {
        return Err(LearnError::Validation(format!(
            "query must be less than {} characters",
            MAX_QUERY_LENGTH
        )));
    }
    if chunks.is_empty() {
        return Err(LearnError::Validation(
            "chunks must be a non-empty list".to_string(),
        ));
    }

    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.id.trim().is_empty() {
            return Err(LearnError::Validation(format!(
                "chunk {} 'id' must be a non-empty string",
                i
            )));
        }
        if chunk.content.trim().is_empty() {
            return Err(LearnError::Validation(format!(
                "chunk {} 'content' must be a non-empty string",
                i
            )));
        }
        if chunk.concept.trim().is_empty() {
            return Err(LearnError::Validation(format!(
                "chunk {} 'concept' must be a non-empty string",
                i
            )));
        }
        if chunk.subject.trim().is_empty() {
            return Err(LearnError::Validation(format!(
                "chunk {} 'subject' must be a non-empty string",
                i
            )));
        }
        if chunk.score < 0.0 || !chunk.score.is_finite() {
            return Err(LearnError::Validation(format!(
                "chunk {} 'score' must be a non-negative number",
                i
            )));
        }
    }

    Ok(())
}

/// Resolve `has_prerequisite` names against the concepts created in this
/// path. First occurrence wins for duplicate concept names; unresolved
/// names are skipped with a warning.
fn resolve_prerequisites(
    chunks: &[ChunkInput],
    records: &[ConceptRecord],
    concept_map: &HashMap<String, (i64, Uuid)>,
) -> Vec<Prerequisite> {
    let mut rows = Vec::new();

    for (chunk, record) in chunks.iter().zip(records.iter()) {
        for prereq_name in &chunk.has_prerequisite {
            match concept_map.get(prereq_name) {
                Some((_, prereq_concept_id)) => {
                    rows.push(Prerequisite {
                        prerequisite_id: Uuid::new_v4(),
                        concept_id: record.concept_id,
                        prereq_concept_id: *prereq_concept_id,
                        requirement_type: "mandatory".to_string(),
                    });
                    info!("Created prerequisite: {} -> {}", prereq_name, chunk.concept);
                }
                None => {
                    warn!(
                        "Prerequisite concept '{}' not found for '{}'",
                        prereq_name, chunk.concept
                    );
                }
            }
        }
    }

    rows
}

fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

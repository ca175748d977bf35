//! Property-graph adapter over Neo4j
//!
//! Holds the Textbook → Chapter → Section → Concept → Chunk hierarchy with
//! embeddings and prerequisite edges, and serves cosine vector search and
//! prerequisite traversals. All writes for one document go through a single
//! transaction so a failed ingest leaves no partial subtree.

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use neo4rs::{query, Graph};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Prerequisite edge strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrerequisiteType {
    Strong,
    Weak,
    Optional,
}

impl PrerequisiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrerequisiteType::Strong => "STRONG",
            PrerequisiteType::Weak => "WEAK",
            PrerequisiteType::Optional => "OPTIONAL",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "WEAK" => PrerequisiteType::Weak,
            "OPTIONAL" => PrerequisiteType::Optional,
            _ => PrerequisiteType::Strong,
        }
    }
}

/// A vector-search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub content: String,
    pub subject: Option<String>,
    pub concept: Option<String>,
    pub has_prerequisite: Vec<String>,
    pub prerequisite_for: Vec<String>,
    pub score: f64,
}

/// A chunk reached by prerequisite traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedChunk {
    pub id: String,
    pub content: String,
    pub subject: Option<String>,
    pub concept: Option<String>,
    pub depth: i64,
}

/// A chunk fetched by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub content: String,
    pub subject: Option<String>,
    pub concept: Option<String>,
    pub has_prerequisite: Vec<String>,
    pub prerequisite_for: Vec<String>,
}

/// Textbook root node
#[derive(Debug, Clone)]
pub struct TextbookNode {
    pub id: String,
    pub title: String,
    pub subject: String,
}

/// Chapter node within a textbook
#[derive(Debug, Clone)]
pub struct ChapterNode {
    pub number: i64,
    pub title: String,
    pub pages: String,
}

/// Section node within a chapter
#[derive(Debug, Clone)]
pub struct SectionNode {
    pub number: String,
    pub title: String,
    pub chapter_number: i64,
}

/// Concept node within a section
#[derive(Debug, Clone)]
pub struct ConceptNode {
    pub name: String,
    pub section_number: String,
}

/// Chunk node payload for ingestion
#[derive(Debug, Clone)]
pub struct ChunkNodeSpec {
    pub id: String,
    pub textbook_id: String,
    pub chapter_number: i64,
    pub section_number: String,
    pub concept_name: Option<String>,
    pub subject: Option<String>,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

/// A full document subtree written in one transaction
#[derive(Debug, Clone, Default)]
pub struct TextbookSubtree {
    pub textbook: Option<TextbookNode>,
    pub chapters: Vec<ChapterNode>,
    pub sections: Vec<SectionNode>,
    pub concepts: Vec<ConceptNode>,
    pub chunks: Vec<ChunkNodeSpec>,
}

/// Graph health snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphHealth {
    pub status: String,
    pub chunk_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Neo4j-backed graph store. `connect` with an empty URI yields a
/// disconnected store whose operations fail with `NotConfigured`.
pub struct GraphStore {
    graph: Option<Graph>,
    dimension: usize,
}

fn to_f64(embedding: &[f32]) -> Vec<f64> {
    embedding.iter().map(|v| *v as f64).collect()
}

impl GraphStore {
    pub async fn connect(config: &GraphConfig, dimension: usize) -> Result<Self> {
        if config.uri.is_empty() {
            warn!("Neo4j URI not configured; graph store disabled");
            return Ok(Self {
                graph: None,
                dimension,
            });
        }

        let graph = Graph::new(&config.uri, &config.username, &config.password)
            .await
            .map_err(|e| GraphError::ConnectionFailed(e.to_string()))?;

        info!("Graph store connected to {}", config.uri);
        Ok(Self {
            graph: Some(graph),
            dimension,
        })
    }

    /// A store with no backing graph, for tests and degraded deployments.
    pub fn disconnected() -> Self {
        Self {
            graph: None,
            dimension: 1536,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.graph.is_some()
    }

    fn graph(&self) -> std::result::Result<&Graph, GraphError> {
        self.graph.as_ref().ok_or(GraphError::NotConfigured)
    }

    /// One vector index over Chunk.embedding plus lookup indexes on id,
    /// subject and concept.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let graph = self.graph()?;

        let vector_index = format!(
            "CREATE VECTOR INDEX chunk_embeddings IF NOT EXISTS \
             FOR (c:Chunk) ON (c.embedding) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {}, `vector.similarity_function`: 'cosine'}}}}",
            self.dimension
        );
        graph.run(query(&vector_index)).await?;

        graph
            .run(query(
                "CREATE INDEX chunk_id IF NOT EXISTS FOR (c:Chunk) ON (c.id)",
            ))
            .await?;
        graph
            .run(query(
                "CREATE INDEX chunk_subject IF NOT EXISTS FOR (c:Chunk) ON (c.subject)",
            ))
            .await?;
        graph
            .run(query(
                "CREATE INDEX chunk_concept IF NOT EXISTS FOR (c:Chunk) ON (c.concept)",
            ))
            .await?;

        info!("Vector and lookup indexes ensured");
        Ok(())
    }

    /// Cosine similarity search over chunk embeddings, descending by score.
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let graph = self.graph()?;

        let mut stream = graph
            .execute(
                query(
                    "MATCH (c:Chunk) \
                     WHERE c.embedding IS NOT NULL \
                     WITH c, gds.similarity.cosine(c.embedding, $embedding) AS score \
                     WHERE score >= $min_score \
                     RETURN c.id AS id, c.content AS content, c.subject AS subject, \
                            c.concept AS concept, c.has_prerequisite AS has_prerequisite, \
                            c.prerequisite_for AS prerequisite_for, score \
                     ORDER BY score DESC \
                     LIMIT $limit",
                )
                .param("embedding", to_f64(embedding))
                .param("min_score", min_score)
                .param("limit", limit as i64),
            )
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = stream.next().await? {
            hits.push(VectorHit {
                id: row.get::<String>("id").unwrap_or_default(),
                content: row.get::<String>("content").unwrap_or_default(),
                subject: row.get::<Option<String>>("subject").unwrap_or(None),
                concept: row.get::<Option<String>>("concept").unwrap_or(None),
                has_prerequisite: row
                    .get::<Option<Vec<String>>>("has_prerequisite")
                    .unwrap_or(None)
                    .unwrap_or_default(),
                prerequisite_for: row
                    .get::<Option<Vec<String>>>("prerequisite_for")
                    .unwrap_or(None)
                    .unwrap_or_default(),
                score: row.get::<f64>("score").unwrap_or(0.0),
            });
        }

        Ok(hits)
    }

    /// Run several searches; a failed query yields an empty slot rather
    /// than failing the batch.
    pub async fn bulk_vector_search(
        &self,
        embeddings: &[Vec<f32>],
        min_score: f64,
        limit_per: usize,
    ) -> Result<Vec<Vec<VectorHit>>> {
        let mut results = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            match self.vector_search(embedding, min_score, limit_per).await {
                Ok(hits) => results.push(hits),
                Err(e) => {
                    error!("Bulk search query failed: {}", e);
                    results.push(Vec::new());
                }
            }
        }
        Ok(results)
    }

    /// Fetch one chunk by id.
    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let graph = self.graph()?;

        let mut stream = graph
            .execute(
                query(
                    "MATCH (c:Chunk {id: $id}) \
                     RETURN c.id AS id, c.content AS content, c.subject AS subject, \
                            c.concept AS concept, c.has_prerequisite AS has_prerequisite, \
                            c.prerequisite_for AS prerequisite_for",
                )
                .param("id", chunk_id),
            )
            .await?;

        let Some(row) = stream.next().await? else {
            return Ok(None);
        };

        Ok(Some(ChunkRecord {
            id: row.get::<String>("id").unwrap_or_default(),
            content: row.get::<String>("content").unwrap_or_default(),
            subject: row.get::<Option<String>>("subject").unwrap_or(None),
            concept: row.get::<Option<String>>("concept").unwrap_or(None),
            has_prerequisite: row
                .get::<Option<Vec<String>>>("has_prerequisite")
                .unwrap_or(None)
                .unwrap_or_default(),
            prerequisite_for: row
                .get::<Option<Vec<String>>>("prerequisite_for")
                .unwrap_or(None)
                .unwrap_or_default(),
        }))
    }

    /// Create or update a standalone chunk with its embedding and
    /// denormalized prerequisite arrays.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_chunk(
        &self,
        chunk_id: &str,
        content: &str,
        embedding: &[f32],
        subject: Option<&str>,
        concept: Option<&str>,
        has_prerequisite: &[String],
        prerequisite_for: &[String],
    ) -> Result<()> {
        let graph = self.graph()?;

        graph
            .run(
                query(
                    "MERGE (c:Chunk {id: $id}) \
                     SET c.content = $content, c.embedding = $embedding, \
                         c.subject = $subject, c.concept = $concept, \
                         c.has_prerequisite = $has_prerequisite, \
                         c.prerequisite_for = $prerequisite_for, \
                         c.has_embedding = true, \
                         c.char_count = $char_count, c.word_count = $word_count, \
                         c.updated_at = datetime()",
                )
                .param("id", chunk_id)
                .param("content", content)
                .param("embedding", to_f64(embedding))
                .param("subject", subject.unwrap_or_default())
                .param("concept", concept.unwrap_or_default())
                .param("has_prerequisite", has_prerequisite.to_vec())
                .param("prerequisite_for", prerequisite_for.to_vec())
                .param("char_count", content.len() as i64)
                .param("word_count", content.split_whitespace().count() as i64),
            )
            .await?;

        Ok(())
    }

    /// BFS along outgoing HAS_PREREQUISITE edges, bounded by depth.
    pub async fn prerequisite_chain(
        &self,
        chunk_id: &str,
        max_depth: usize,
    ) -> Result<Vec<RelatedChunk>> {
        let graph = self.graph()?;

        let cypher = format!(
            "MATCH (start:Chunk {{id: $chunk_id}}) \
             OPTIONAL MATCH path = (start)-[:HAS_PREREQUISITE*1..{}]->(prereq:Chunk) \
             WITH DISTINCT prereq, min(length(path)) AS depth \
             WHERE prereq IS NOT NULL \
             RETURN prereq.id AS id, prereq.content AS content, \
                    prereq.subject AS subject, prereq.concept AS concept, depth \
             ORDER BY depth, prereq.id",
            max_depth.max(1)
        );

        self.traverse(&cypher, chunk_id).await
    }

    /// BFS along incoming HAS_PREREQUISITE edges: everything that depends
    /// on this chunk.
    pub async fn dependents(&self, chunk_id: &str, max_depth: usize) -> Result<Vec<RelatedChunk>> {
        let cypher = format!(
            "MATCH (start:Chunk {{id: $chunk_id}}) \
             OPTIONAL MATCH path = (start)<-[:HAS_PREREQUISITE*1..{}]-(dependent:Chunk) \
             WITH DISTINCT dependent, min(length(path)) AS depth \
             WHERE dependent IS NOT NULL \
             RETURN dependent.id AS id, dependent.content AS content, \
                    dependent.subject AS subject, dependent.concept AS concept, depth \
             ORDER BY depth, dependent.id",
            max_depth.max(1)
        );

        self.traverse(&cypher, chunk_id).await
    }

    async fn traverse(&self, cypher: &str, chunk_id: &str) -> Result<Vec<RelatedChunk>> {
        let graph = self.graph()?;

        let mut stream = graph
            .execute(query(cypher).param("chunk_id", chunk_id))
            .await?;

        let mut related = Vec::new();
        while let Some(row) = stream.next().await? {
            related.push(RelatedChunk {
                id: row.get::<String>("id").unwrap_or_default(),
                content: row.get::<String>("content").unwrap_or_default(),
                subject: row.get::<Option<String>>("subject").unwrap_or(None),
                concept: row.get::<Option<String>>("concept").unwrap_or(None),
                depth: row.get::<i64>("depth").unwrap_or(0),
            });
        }

        Ok(related)
    }

    /// Create a HAS_PREREQUISITE edge and reconcile the denormalized
    /// arrays on both endpoints. MERGE keeps repeated calls idempotent.
    pub async fn create_prerequisite(
        &self,
        from_chunk_id: &str,
        to_chunk_id: &str,
        relationship_type: PrerequisiteType,
    ) -> Result<()> {
        let graph = self.graph()?;

        if from_chunk_id == to_chunk_id {
            return Err(crate::error::LearnError::Validation(
                "a chunk cannot be its own prerequisite".to_string(),
            ));
        }

        // The prerequisite subgraph must stay acyclic: reject an edge whose
        // target already reaches the source.
        let mut stream = graph
            .execute(
                query(
                    "OPTIONAL MATCH path = (to:Chunk {id: $to_id})-[:HAS_PREREQUISITE*1..10]->(from:Chunk {id: $from_id}) \
                     RETURN count(path) > 0 AS cyclic",
                )
                .param("from_id", from_chunk_id)
                .param("to_id", to_chunk_id),
            )
            .await?;
        if let Some(row) = stream.next().await? {
            if row.get::<bool>("cyclic").unwrap_or(false) {
                return Err(crate::error::LearnError::Validation(format!(
                    "prerequisite {} -> {} would create a cycle",
                    from_chunk_id, to_chunk_id
                )));
            }
        }

        graph
            .run(
                query(
                    "MATCH (from:Chunk {id: $from_id}) \
                     MATCH (to:Chunk {id: $to_id}) \
                     MERGE (from)-[r:HAS_PREREQUISITE]->(to) \
                     SET r.type = $type, \
                         r.created_at = coalesce(r.created_at, datetime()), \
                         r.updated_at = datetime()",
                )
                .param("from_id", from_chunk_id)
                .param("to_id", to_chunk_id)
                .param("type", relationship_type.as_str()),
            )
            .await?;

        graph
            .run(
                query(
                    "MATCH (c:Chunk {id: $chunk_id}) \
                     OPTIONAL MATCH (c)-[:HAS_PREREQUISITE]->(prereq:Chunk) \
                     WITH c, collect(DISTINCT prereq.id) AS prereqs \
                     SET c.has_prerequisite = prereqs",
                )
                .param("chunk_id", from_chunk_id),
            )
            .await?;

        graph
            .run(
                query(
                    "MATCH (c:Chunk {id: $chunk_id}) \
                     OPTIONAL MATCH (c)<-[:HAS_PREREQUISITE]-(dependent:Chunk) \
                     WITH c, collect(DISTINCT dependent.id) AS dependents \
                     SET c.prerequisite_for = dependents",
                )
                .param("chunk_id", to_chunk_id),
            )
            .await?;

        info!(
            "Prerequisite edge {} -> {} ({})",
            from_chunk_id,
            to_chunk_id,
            relationship_type.as_str()
        );
        Ok(())
    }

    /// Write a whole document subtree in one transaction: textbook,
    /// chapters with PRECEDES ordering, sections and concepts with NEXT
    /// ordering, chunks with BELONGS_TO.
    pub async fn store_textbook_subtree(&self, subtree: &TextbookSubtree) -> Result<()> {
        let graph = self.graph()?;
        let Some(textbook) = &subtree.textbook else {
            return Err(GraphError::QueryFailed("subtree has no textbook".to_string()).into());
        };

        let mut txn = graph.start_txn().await?;

        txn.run(
            query(
                "MERGE (t:Textbook {textbook_id: $id}) \
                 SET t.title = $title, t.subject = $subject, t.processed_at = datetime()",
            )
            .param("id", textbook.id.as_str())
            .param("title", textbook.title.as_str())
            .param("subject", textbook.subject.as_str()),
        )
        .await?;

        for (i, chapter) in subtree.chapters.iter().enumerate() {
            txn.run(
                query(
                    "MERGE (c:Chapter {textbook_id: $textbook_id, chapter_number: $number}) \
                     SET c.title = $title, c.pages = $pages \
                     WITH c MATCH (t:Textbook {textbook_id: $textbook_id}) \
                     MERGE (t)-[:HAS_CHAPTER]->(c)",
                )
                .param("textbook_id", textbook.id.as_str())
                .param("number", chapter.number)
                .param("title", chapter.title.as_str())
                .param("pages", chapter.pages.as_str()),
            )
            .await?;

            if i > 0 {
                let previous = &subtree.chapters[i - 1];
                txn.run(
                    query(
                        "MATCH (c1:Chapter {textbook_id: $textbook_id, chapter_number: $prev}) \
                         MATCH (c2:Chapter {textbook_id: $textbook_id, chapter_number: $next}) \
                         MERGE (c1)-[:PRECEDES]->(c2)",
                    )
                    .param("textbook_id", textbook.id.as_str())
                    .param("prev", previous.number)
                    .param("next", chapter.number),
                )
                .await?;
            }
        }

        for (i, section) in subtree.sections.iter().enumerate() {
            txn.run(
                query(
                    "MERGE (s:Section {textbook_id: $textbook_id, section_number: $number}) \
                     SET s.title = $title, s.chapter_number = $chapter_number \
                     WITH s MATCH (c:Chapter {textbook_id: $textbook_id, chapter_number: $chapter_number}) \
                     MERGE (c)-[:HAS_SECTION]->(s)",
                )
                .param("textbook_id", textbook.id.as_str())
                .param("number", section.number.as_str())
                .param("title", section.title.as_str())
                .param("chapter_number", section.chapter_number),
            )
            .await?;

            if i > 0 {
                let previous = &subtree.sections[i - 1];
                txn.run(
                    query(
                        "MATCH (s1:Section {textbook_id: $textbook_id, section_number: $prev}) \
                         MATCH (s2:Section {textbook_id: $textbook_id, section_number: $next}) \
                         MERGE (s1)-[:NEXT]->(s2)",
                    )
                    .param("textbook_id", textbook.id.as_str())
                    .param("prev", previous.number.as_str())
                    .param("next", section.number.as_str()),
                )
                .await?;
            }
        }

        for (i, concept) in subtree.concepts.iter().enumerate() {
            txn.run(
                query(
                    "MERGE (co:Concept {textbook_id: $textbook_id, section_number: $section_number, concept_name: $name}) \
                     WITH co MATCH (s:Section {textbook_id: $textbook_id, section_number: $section_number}) \
                     MERGE (s)-[:CONTAINS_CONCEPT]->(co)",
                )
                .param("textbook_id", textbook.id.as_str())
                .param("section_number", concept.section_number.as_str())
                .param("name", concept.name.as_str()),
            )
            .await?;

            if i > 0 {
                let previous = &subtree.concepts[i - 1];
                if previous.section_number == concept.section_number {
                    txn.run(
                        query(
                            "MATCH (co1:Concept {textbook_id: $textbook_id, section_number: $section_number, concept_name: $prev}) \
                             MATCH (co2:Concept {textbook_id: $textbook_id, section_number: $section_number, concept_name: $next}) \
                             MERGE (co1)-[:NEXT]->(co2)",
                        )
                        .param("textbook_id", textbook.id.as_str())
                        .param("section_number", concept.section_number.as_str())
                        .param("prev", previous.name.as_str())
                        .param("next", concept.name.as_str()),
                    )
                    .await?;
                }
            }
        }

        for chunk in &subtree.chunks {
            let embedding = chunk.embedding.as_deref().map(to_f64);
            let has_embedding = embedding.is_some();

            let q = query(
                "MERGE (ch:Chunk {id: $id}) \
                 SET ch.textbook_id = $textbook_id, ch.chapter_number = $chapter_number, \
                     ch.section_number = $section_number, ch.concept = $concept, \
                     ch.subject = $subject, ch.content = $content, \
                     ch.embedding = $embedding, ch.has_embedding = $has_embedding, \
                     ch.char_count = $char_count, ch.word_count = $word_count \
                 WITH ch MATCH (s:Section {textbook_id: $textbook_id, section_number: $section_number}) \
                 MERGE (ch)-[:BELONGS_TO]->(s)",
            )
            .param("id", chunk.id.as_str())
            .param("textbook_id", chunk.textbook_id.as_str())
            .param("chapter_number", chunk.chapter_number)
            .param("section_number", chunk.section_number.as_str())
            .param("concept", chunk.concept_name.clone().unwrap_or_default())
            .param("subject", chunk.subject.clone().unwrap_or_default())
            .param("content", chunk.text.as_str())
            .param("embedding", embedding.unwrap_or_default())
            .param("has_embedding", has_embedding)
            .param("char_count", chunk.text.len() as i64)
            .param("word_count", chunk.text.split_whitespace().count() as i64);

            txn.run(q).await?;
        }

        txn.commit().await?;
        info!(
            "Stored textbook subtree {}: {} chapters, {} sections, {} concepts, {} chunks",
            textbook.id,
            subtree.chapters.len(),
            subtree.sections.len(),
            subtree.concepts.len(),
            subtree.chunks.len()
        );
        Ok(())
    }

    /// Connectivity check plus chunk count.
    pub async fn health_check(&self) -> GraphHealth {
        let Ok(graph) = self.graph() else {
            return GraphHealth {
                status: "not_configured".to_string(),
                chunk_count: 0,
                error: None,
            };
        };

        let count = async {
            let mut stream = graph
                .execute(query("MATCH (c:Chunk) RETURN count(c) AS chunk_count"))
                .await?;
            let row = stream.next().await?;
            Ok::<i64, neo4rs::Error>(
                row.and_then(|r| r.get::<i64>("chunk_count").ok())
                    .unwrap_or(0),
            )
        }
        .await;

        match count {
            Ok(chunk_count) => GraphHealth {
                status: "healthy".to_string(),
                chunk_count,
                error: None,
            },
            Err(e) => GraphHealth {
                status: "unhealthy".to_string(),
                chunk_count: 0,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prerequisite_type_roundtrip() {
        assert_eq!(PrerequisiteType::parse("strong"), PrerequisiteType::Strong);
        assert_eq!(PrerequisiteType::parse("WEAK"), PrerequisiteType::Weak);
        assert_eq!(
            PrerequisiteType::parse("Optional"),
            PrerequisiteType::Optional
        );
        assert_eq!(PrerequisiteType::parse("anything"), PrerequisiteType::Strong);
        assert_eq!(PrerequisiteType::Strong.as_str(), "STRONG");
    }

    #[tokio::test]
    async fn test_disconnected_store_reports_not_configured() {
        let store = GraphStore::disconnected();
        assert!(!store.is_configured());

        let result = store.vector_search(&[0.1, 0.2], 0.65, 10).await;
        assert!(matches!(
            result,
            Err(crate::error::LearnError::Graph(GraphError::NotConfigured))
        ));

        let health = store.health_check().await;
        assert_eq!(health.status, "not_configured");
    }

    #[tokio::test]
    async fn test_subtree_requires_textbook() {
        let store = GraphStore::disconnected();
        let result = store.store_textbook_subtree(&TextbookSubtree::default()).await;
        assert!(result.is_err());
    }
}

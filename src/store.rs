//! Relational mirror of tickets, learning paths, concept records and
//! progress
//!
//! Thin adapter over a SQL pool. Write paths take a caller-supplied
//! transaction so multi-row assembly stays atomic; read paths acquire
//! connections from the pool.

use crate::config::DatabaseConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Transaction};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A learning path header row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPath {
    pub path_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub query: String,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
}

/// Core fields for a new ticket
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_type: String,
    pub milestone: String,
    pub status: String,
    pub resolution: String,
    pub summary: String,
    pub description: String,
    pub owner: String,
    pub reporter: String,
    pub keywords: String,
}

/// Relational mirror of one concept in a path; one per ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub concept_id: Uuid,
    pub ticket_id: i64,
    pub path_id: Uuid,
    pub sequence_order: i64,
    pub difficulty_score: f64,
    pub mastery_threshold: f64,
    pub estimated_minutes: i64,
    pub tags: String,
}

/// A prerequisite row between concept records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prerequisite {
    pub prerequisite_id: Uuid,
    pub concept_id: Uuid,
    pub prereq_concept_id: Uuid,
    pub requirement_type: String,
}

/// Question data stored in ticket custom fields
#[derive(Debug, Clone)]
pub struct QuestionFields {
    pub question: String,
    pub expected_answer: String,
    pub context: String,
    pub difficulty: u8,
}

/// Inputs for a progress upsert
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub user_id: String,
    pub concept_id: Uuid,
    pub ticket_id: i64,
    pub status: String,
    pub mastery_score: Option<f64>,
    pub time_spent_minutes: i64,
    pub notes: Option<String>,
}

/// A progress row as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    pub concept_id: Uuid,
    pub ticket_id: i64,
    pub status: String,
    pub mastery_score: Option<f64>,
    pub time_spent_minutes: i64,
    pub attempt_count: i64,
    pub last_accessed: Option<String>,
    pub completed_at: Option<String>,
    pub notes: Option<String>,
}

/// One ticket of a learning path with its sparse custom fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathTicket {
    pub ticket_id: i64,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub milestone: String,
    pub concept_id: Uuid,
    pub sequence_order: i64,
    pub custom_fields: std::collections::HashMap<String, String>,
}

/// SQL adapter with schema bootstrap
pub struct RelationalStore {
    pool: SqlitePool,
}

impl RelationalStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_url(&config.url, config.max_connections).await
    }

    pub async fn connect_url(url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting relational store: {}", url);

        let options = if url == "sqlite::memory:" {
            SqliteConnectOptions::from_str(url)?
        } else {
            SqliteConnectOptions::from_str(url)?.create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("Relational store initialized");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, sqlx::Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS ticket (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                time INTEGER NOT NULL,
                changetime INTEGER NOT NULL,
                milestone TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                resolution TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                owner TEXT NOT NULL DEFAULT '',
                reporter TEXT NOT NULL DEFAULT '',
                keywords TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ticket_custom (
                ticket INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT,
                PRIMARY KEY (ticket, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ticket_change (
                ticket INTEGER NOT NULL,
                time INTEGER NOT NULL,
                author TEXT,
                field TEXT NOT NULL,
                oldvalue TEXT,
                newvalue TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS learning_paths (
                path_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                difficulty_level TEXT NOT NULL,
                created_by TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS concept_metadata (
                concept_id TEXT PRIMARY KEY,
                ticket_id INTEGER NOT NULL,
                path_id TEXT NOT NULL,
                sequence_order INTEGER NOT NULL,
                concept_type TEXT NOT NULL DEFAULT 'lesson',
                difficulty_score REAL NOT NULL DEFAULT 3,
                mastery_threshold REAL NOT NULL DEFAULT 0.8,
                estimated_minutes INTEGER NOT NULL DEFAULT 30,
                tags TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS prerequisites (
                prerequisite_id TEXT PRIMARY KEY,
                concept_id TEXT NOT NULL,
                prereq_concept_id TEXT NOT NULL,
                requirement_type TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                student_id TEXT NOT NULL,
                concept_id TEXT NOT NULL,
                ticket_id INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                mastery_score REAL,
                time_spent_minutes INTEGER NOT NULL DEFAULT 0,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT,
                completed_at TEXT,
                notes TEXT,
                PRIMARY KEY (student_id, concept_id)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_concept_metadata_path ON concept_metadata(path_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_concept_metadata_ticket ON concept_metadata(ticket_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_learning_path(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        path: &LearningPath,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO learning_paths (path_id, title, description, difficulty_level, created_by, tags, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(path.path_id.to_string())
        .bind(&path.title)
        .bind(&path.query)
        .bind(&path.difficulty)
        .bind(&path.user_id)
        .bind("generated,auto-created")
        .bind(path.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;

        debug!("Inserted learning path {}", path.path_id);
        Ok(())
    }

    pub async fn insert_ticket(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        ticket: &NewTicket,
    ) -> Result<i64> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO ticket (type, time, changetime, milestone, status, resolution, summary, description, owner, reporter, keywords) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ticket.ticket_type)
        .bind(now)
        .bind(now)
        .bind(&ticket.milestone)
        .bind(&ticket.status)
        .bind(&ticket.resolution)
        .bind(&ticket.summary)
        .bind(&ticket.description)
        .bind(&ticket.owner)
        .bind(&ticket.reporter)
        .bind(&ticket.keywords)
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn insert_custom_fields(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        ticket_id: i64,
        fields: &[(String, String)],
    ) -> Result<()> {
        for (name, value) in fields {
            sqlx::query(
                "INSERT OR REPLACE INTO ticket_custom (ticket, name, value) VALUES (?, ?, ?)",
            )
            .bind(ticket_id)
            .bind(name)
            .bind(value)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_concept_records(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        records: &[ConceptRecord],
    ) -> Result<()> {
        for record in records {
            sqlx::query(
                "INSERT INTO concept_metadata \
                 (concept_id, ticket_id, path_id, sequence_order, concept_type, difficulty_score, mastery_threshold, estimated_minutes, tags) \
                 VALUES (?, ?, ?, ?, 'lesson', ?, ?, ?, ?)",
            )
            .bind(record.concept_id.to_string())
            .bind(record.ticket_id)
            .bind(record.path_id.to_string())
            .bind(record.sequence_order)
            .bind(record.difficulty_score)
            .bind(record.mastery_threshold)
            .bind(record.estimated_minutes)
            .bind(&record.tags)
            .execute(&mut **tx)
            .await?;
        }

        info!("Stored {} concept records", records.len());
        Ok(())
    }

    pub async fn insert_prerequisites(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        rows: &[Prerequisite],
    ) -> Result<()> {
        for row in rows {
            sqlx::query(
                "INSERT INTO prerequisites (prerequisite_id, concept_id, prereq_concept_id, requirement_type) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(row.prerequisite_id.to_string())
            .bind(row.concept_id.to_string())
            .bind(row.prereq_concept_id.to_string())
            .bind(&row.requirement_type)
            .execute(&mut **tx)
            .await?;
        }

        if !rows.is_empty() {
            info!("Created {} prerequisite relationships", rows.len());
        }
        Ok(())
    }

    /// Question custom fields for one ticket, if present.
    pub async fn question_fields(&self, ticket_id: i64) -> Result<Option<QuestionFields>> {
        let rows = sqlx::query(
            "SELECT name, value FROM ticket_custom WHERE ticket = ? AND name IN \
             ('question', 'expected_answer', 'question_context', 'question_difficulty')",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        let mut question = None;
        let mut expected_answer = String::new();
        let mut context = String::new();
        let mut difficulty = 3u8;

        for row in rows {
            let name: String = row.get("name");
            let value: Option<String> = row.get("value");
            let value = value.unwrap_or_default();
            match name.as_str() {
                "question" => question = Some(value),
                "expected_answer" => expected_answer = value,
                "question_context" => context = value,
                "question_difficulty" => difficulty = value.parse().unwrap_or(3),
                _ => {}
            }
        }

        Ok(question.filter(|q| !q.is_empty()).map(|question| QuestionFields {
            question,
            expected_answer,
            context,
            difficulty,
        }))
    }

    /// Concept id resolved from a ticket's concept record.
    pub async fn concept_for_ticket(&self, ticket_id: i64) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT concept_id FROM concept_metadata WHERE ticket_id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .and_then(|r| r.get::<String, _>("concept_id").parse::<Uuid>().ok()))
    }

    /// Upsert keyed on (user, concept): counts attempts, accumulates time,
    /// and stamps `completed_at` on the first completed/mastered
    /// transition.
    pub async fn upsert_progress(&self, update: &ProgressUpdate) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let completed = matches!(update.status.as_str(), "completed" | "mastered");

        sqlx::query(
            r#"
            INSERT INTO progress
            (student_id, concept_id, ticket_id, status, mastery_score,
             time_spent_minutes, attempt_count, last_accessed, completed_at, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, CASE WHEN ?8 THEN ?7 ELSE NULL END, ?9)
            ON CONFLICT (student_id, concept_id) DO UPDATE SET
                status = excluded.status,
                ticket_id = excluded.ticket_id,
                mastery_score = COALESCE(excluded.mastery_score, progress.mastery_score),
                time_spent_minutes = progress.time_spent_minutes + ?6,
                attempt_count = progress.attempt_count + 1,
                last_accessed = excluded.last_accessed,
                completed_at = CASE
                    WHEN ?8 AND progress.completed_at IS NULL THEN ?7
                    ELSE progress.completed_at
                END,
                notes = COALESCE(excluded.notes, progress.notes)
            "#,
        )
        .bind(&update.user_id)
        .bind(update.concept_id.to_string())
        .bind(update.ticket_id)
        .bind(&update.status)
        .bind(update.mastery_score)
        .bind(update.time_spent_minutes)
        .bind(&now)
        .bind(completed)
        .bind(&update.notes)
        .execute(&self.pool)
        .await?;

        info!(
            "Updated progress for user {}, concept {}, status {}",
            update.user_id, update.concept_id, update.status
        );
        Ok(())
    }

    /// Progress row for a (user, concept) pair.
    pub async fn progress_for(
        &self,
        user_id: &str,
        concept_id: Uuid,
    ) -> Result<Option<ProgressRow>> {
        let row = sqlx::query(
            "SELECT student_id, concept_id, ticket_id, status, mastery_score, \
                    time_spent_minutes, attempt_count, last_accessed, completed_at, notes \
             FROM progress WHERE student_id = ? AND concept_id = ?",
        )
        .bind(user_id)
        .bind(concept_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ProgressRow {
            user_id: r.get("student_id"),
            concept_id: r
                .get::<String, _>("concept_id")
                .parse()
                .unwrap_or_else(|_| Uuid::nil()),
            ticket_id: r.get("ticket_id"),
            status: r.get("status"),
            mastery_score: r.get("mastery_score"),
            time_spent_minutes: r.get("time_spent_minutes"),
            attempt_count: r.get("attempt_count"),
            last_accessed: r.get("last_accessed"),
            completed_at: r.get("completed_at"),
            notes: r.get("notes"),
        }))
    }

    /// Ticket milestone, used for cache invalidation.
    pub async fn ticket_milestone(&self, ticket_id: i64) -> Result<Option<String>> {
        let row = sqlx::query("SELECT milestone FROM ticket WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.get::<String, _>("milestone"))
            .filter(|m| !m.is_empty()))
    }

    /// Close a mastered ticket as fixed and append the audit rows: status
    /// and resolution transitions plus an automatic comment.
    pub async fn close_ticket_mastered(&self, ticket_id: i64, author: &str) -> Result<()> {
        let now = Utc::now().timestamp();

        let old_status: Option<String> = sqlx::query("SELECT status FROM ticket WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("status"));

        sqlx::query(
            "UPDATE ticket SET status = 'closed', resolution = 'fixed', changetime = ? WHERE id = ?",
        )
        .bind(now)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;

        let changes = [
            ("status", old_status.unwrap_or_default(), "closed".to_string()),
            ("resolution", String::new(), "fixed".to_string()),
            (
                "comment",
                String::new(),
                "Automatically closed: Student achieved mastery on this learning concept."
                    .to_string(),
            ),
        ];

        for (field, oldvalue, newvalue) in changes {
            sqlx::query(
                "INSERT INTO ticket_change (ticket, time, author, field, oldvalue, newvalue) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(ticket_id)
            .bind(now)
            .bind(author)
            .bind(field)
            .bind(oldvalue)
            .bind(newvalue)
            .execute(&self.pool)
            .await?;
        }

        info!("Closed ticket {} (mastery achieved)", ticket_id);
        Ok(())
    }

    /// Generic ticket status transition with an audit row.
    pub async fn update_ticket_status(
        &self,
        ticket_id: i64,
        status: &str,
        author: &str,
    ) -> Result<()> {
        let now = Utc::now().timestamp();

        let old_status: Option<String> = sqlx::query("SELECT status FROM ticket WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("status"));

        sqlx::query("UPDATE ticket SET status = ?, changetime = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "INSERT INTO ticket_change (ticket, time, author, field, oldvalue, newvalue) \
             VALUES (?, ?, ?, 'status', ?, ?)",
        )
        .bind(ticket_id)
        .bind(now)
        .bind(author)
        .bind(old_status.unwrap_or_default())
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All tickets of a path in sequence order, with their custom fields.
    pub async fn path_tickets(&self, path_id: Uuid) -> Result<Vec<PathTicket>> {
        let rows = sqlx::query(
            "SELECT t.id AS ticket_id, t.summary, t.description, t.status, t.milestone, \
                    cm.concept_id, cm.sequence_order \
             FROM concept_metadata cm \
             JOIN ticket t ON cm.ticket_id = t.id \
             WHERE cm.path_id = ? \
             ORDER BY cm.sequence_order",
        )
        .bind(path_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in rows {
            let ticket_id: i64 = row.get("ticket_id");

            let field_rows =
                sqlx::query("SELECT name, value FROM ticket_custom WHERE ticket = ?")
                    .bind(ticket_id)
                    .fetch_all(&self.pool)
                    .await?;
            let custom_fields = field_rows
                .into_iter()
                .map(|r| {
                    (
                        r.get::<String, _>("name"),
                        r.get::<Option<String>, _>("value").unwrap_or_default(),
                    )
                })
                .collect();

            tickets.push(PathTicket {
                ticket_id,
                summary: row.get("summary"),
                description: row.get("description"),
                status: row.get("status"),
                milestone: row.get("milestone"),
                concept_id: row
                    .get::<String, _>("concept_id")
                    .parse()
                    .unwrap_or_else(|_| Uuid::nil()),
                sequence_order: row.get("sequence_order"),
                custom_fields,
            });
        }

        Ok(tickets)
    }

    /// Count prerequisite rows for a path's concepts.
    pub async fn prerequisites_for_path(&self, path_id: Uuid) -> Result<Vec<Prerequisite>> {
        let rows = sqlx::query(
            "SELECT p.prerequisite_id, p.concept_id, p.prereq_concept_id, p.requirement_type \
             FROM prerequisites p \
             JOIN concept_metadata cm ON p.concept_id = cm.concept_id \
             WHERE cm.path_id = ?",
        )
        .bind(path_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Prerequisite {
                prerequisite_id: r
                    .get::<String, _>("prerequisite_id")
                    .parse()
                    .unwrap_or_else(|_| Uuid::nil()),
                concept_id: r
                    .get::<String, _>("concept_id")
                    .parse()
                    .unwrap_or_else(|_| Uuid::nil()),
                prereq_concept_id: r
                    .get::<String, _>("prereq_concept_id")
                    .parse()
                    .unwrap_or_else(|_| Uuid::nil()),
                requirement_type: r.get("requirement_type"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> RelationalStore {
        RelationalStore::connect_url("sqlite::memory:", 2)
            .await
            .unwrap()
    }

    fn ticket(summary: &str) -> NewTicket {
        NewTicket {
            ticket_type: "learning_concept".to_string(),
            milestone: "algebra".to_string(),
            status: "new".to_string(),
            resolution: String::new(),
            summary: summary.to_string(),
            description: "content".to_string(),
            owner: "student-1".to_string(),
            reporter: "learning-system".to_string(),
            keywords: "learning,algebra".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ticket_and_custom_fields_roundtrip() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();

        let ticket_id = store.insert_ticket(&mut tx, &ticket("Groups")).await.unwrap();
        store
            .insert_custom_fields(
                &mut tx,
                ticket_id,
                &[
                    ("question".to_string(), "What is a group?".to_string()),
                    ("expected_answer".to_string(), "A set with an operation.".to_string()),
                    ("question_difficulty".to_string(), "4".to_string()),
                ],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let fields = store.question_fields(ticket_id).await.unwrap().unwrap();
        assert_eq!(fields.question, "What is a group?");
        assert_eq!(fields.difficulty, 4);
    }

    #[tokio::test]
    async fn test_question_fields_absent() {
        let store = memory_store().await;
        assert!(store.question_fields(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_progress_upsert_accumulates() {
        let store = memory_store().await;
        let concept_id = Uuid::new_v4();

        let update = ProgressUpdate {
            user_id: "student-1".to_string(),
            concept_id,
            ticket_id: 1,
            status: "completed".to_string(),
            mastery_score: Some(0.7),
            time_spent_minutes: 10,
            notes: Some("{}".to_string()),
        };
        store.upsert_progress(&update).await.unwrap();
        store
            .upsert_progress(&ProgressUpdate {
                status: "mastered".to_string(),
                mastery_score: Some(0.9),
                time_spent_minutes: 5,
                ..update.clone()
            })
            .await
            .unwrap();

        let row = store
            .progress_for("student-1", concept_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.attempt_count, 2);
        assert_eq!(row.time_spent_minutes, 15);
        assert_eq!(row.status, "mastered");
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_completed_at_set_once() {
        let store = memory_store().await;
        let concept_id = Uuid::new_v4();

        let base = ProgressUpdate {
            user_id: "s".to_string(),
            concept_id,
            ticket_id: 1,
            status: "completed".to_string(),
            mastery_score: Some(0.6),
            time_spent_minutes: 0,
            notes: None,
        };
        store.upsert_progress(&base).await.unwrap();
        let first = store
            .progress_for("s", concept_id)
            .await
            .unwrap()
            .unwrap()
            .completed_at;

        store
            .upsert_progress(&ProgressUpdate {
                status: "mastered".to_string(),
                ..base.clone()
            })
            .await
            .unwrap();
        let second = store
            .progress_for("s", concept_id)
            .await
            .unwrap()
            .unwrap()
            .completed_at;

        assert_eq!(first, second, "completed_at must not move on re-completion");
    }

    #[tokio::test]
    async fn test_close_ticket_mastered_writes_change_log() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        let ticket_id = store.insert_ticket(&mut tx, &ticket("Rings")).await.unwrap();
        tx.commit().await.unwrap();

        store
            .close_ticket_mastered(ticket_id, "learning-system")
            .await
            .unwrap();

        let row = sqlx::query("SELECT status, resolution FROM ticket WHERE id = ?")
            .bind(ticket_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("status"), "closed");
        assert_eq!(row.get::<String, _>("resolution"), "fixed");

        let changes: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM ticket_change WHERE ticket = ?")
                .bind(ticket_id)
                .fetch_one(store.pool())
                .await
                .unwrap()
                .get("n");
        assert_eq!(changes, 3);
    }

    #[tokio::test]
    async fn test_path_tickets_in_sequence_order() {
        let store = memory_store().await;
        let path_id = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();

        store
            .insert_learning_path(
                &mut tx,
                &LearningPath {
                    path_id,
                    user_id: "student-1".to_string(),
                    title: "Algebra path".to_string(),
                    query: "groups and rings".to_string(),
                    difficulty: "intermediate".to_string(),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let mut records = Vec::new();
        for (i, name) in ["Sets", "Groups", "Rings"].iter().enumerate() {
            let ticket_id = store.insert_ticket(&mut tx, &ticket(name)).await.unwrap();
            records.push(ConceptRecord {
                concept_id: Uuid::new_v4(),
                ticket_id,
                path_id,
                sequence_order: (i + 1) as i64,
                difficulty_score: 3.0,
                mastery_threshold: 0.8,
                estimated_minutes: 30,
                tags: "auto-generated".to_string(),
            });
        }
        store.insert_concept_records(&mut tx, &records).await.unwrap();
        tx.commit().await.unwrap();

        let tickets = store.path_tickets(path_id).await.unwrap();
        assert_eq!(tickets.len(), 3);
        let orders: Vec<i64> = tickets.iter().map(|t| t.sequence_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(tickets[1].summary, "Groups");
    }
}

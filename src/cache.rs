//! Cached-artifact store for LLM outputs, evaluations and derived views
//!
//! SQLite-backed JSON cache keyed as `{kind}:{content_hash}` with a
//! per-entry TTL and LRU size bound.

use crate::config::CacheConfig;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed artifact cache
pub struct ArtifactCache {
    pool: SqlitePool,
    config: CacheConfig,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: usize,
    pub max_entries: usize,
    pub default_ttl_secs: i64,
}

/// Deterministic content hash for cache keys: `{kind}:{hash(parts)}`.
pub fn cache_key(kind: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    format!("{}:{}", kind, hex)
}

impl ArtifactCache {
    /// Create a new artifact cache, bootstrapping the table on first use.
    pub async fn new(config: CacheConfig) -> Result<Self> {
        if !config.enabled {
            info!("Artifact cache is disabled");
        }

        info!("Initializing artifact cache at: {}", config.db_path);

        let options = if config.db_path == "sqlite::memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::from_str(&format!("sqlite:{}", config.db_path))?
                .create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_artifacts (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_artifacts_last_accessed ON cached_artifacts(last_accessed)",
        )
        .execute(&pool)
        .await?;

        info!("Artifact cache initialized");
        Ok(Self { pool, config })
    }

    /// Get a cached JSON value if present and not expired.
    pub async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT value_json, expires_at, hit_count FROM cached_artifacts WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((value_json, expires_at, hit_count)) = row else {
            debug!("Cache miss for key: {}", key);
            return Ok(None);
        };

        let expires = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        if Utc::now() > expires {
            debug!("Cache entry expired: {}", key);
            self.invalidate(key).await?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE cached_artifacts SET last_accessed = ?, hit_count = ? WHERE key = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(hit_count + 1)
        .bind(key)
        .execute(&self.pool)
        .await?;

        debug!("Cache hit for {} (hits: {})", key, hit_count + 1);
        Ok(serde_json::from_str(&value_json).ok())
    }

    /// Store a JSON value with the given TTL (defaults when `None`).
    pub async fn set_json(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: Option<i64>,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Utc::now();
        let ttl = ttl_secs.unwrap_or(self.config.default_ttl_secs);
        let expires = now + Duration::seconds(ttl);

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cached_artifacts
            (key, value_json, created_at, expires_at, last_accessed, hit_count)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(now.to_rfc3339())
        .bind(expires.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Cached artifact {} (ttl: {}s)", key, ttl);
        self.enforce_size_limit().await?;

        Ok(())
    }

    /// Remove a specific entry.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        sqlx::query("DELETE FROM cached_artifacts WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        debug!("Invalidated cache entry: {}", key);
        Ok(())
    }

    /// Clear every entry.
    pub async fn clear(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        sqlx::query("DELETE FROM cached_artifacts")
            .execute(&self.pool)
            .await?;

        info!("Cleared all cache entries");
        Ok(())
    }

    /// Remove entries past their expiry; returns how many were removed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM cached_artifacts WHERE expires_at < ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() as usize;
        if removed > 0 {
            info!("Cleaned up {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Cache statistics.
    pub async fn stats(&self) -> Result<CacheStats> {
        let total_entries: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cached_artifacts")
            .fetch_one(&self.pool)
            .await?;
        let total_hits: (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(hit_count), 0) FROM cached_artifacts")
                .fetch_one(&self.pool)
                .await?;

        Ok(CacheStats {
            total_entries: total_entries.0 as usize,
            total_hits: total_hits.0 as usize,
            max_entries: self.config.max_entries,
            default_ttl_secs: self.config.default_ttl_secs,
        })
    }

    /// LRU eviction down to the configured size bound.
    async fn enforce_size_limit(&self) -> Result<()> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cached_artifacts")
            .fetch_one(&self.pool)
            .await?;

        if count.0 > self.config.max_entries as i64 {
            let to_remove = count.0 - self.config.max_entries as i64;

            sqlx::query(
                r#"
                DELETE FROM cached_artifacts
                WHERE key IN (
                    SELECT key FROM cached_artifacts
                    ORDER BY last_accessed ASC
                    LIMIT ?
                )
                "#,
            )
            .bind(to_remove)
            .execute(&self.pool)
            .await?;

            info!("Evicted {} old cache entries (LRU)", to_remove);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_cache(max_entries: usize) -> ArtifactCache {
        ArtifactCache::new(CacheConfig {
            enabled: true,
            db_path: "sqlite::memory:".to_string(),
            max_entries,
            default_ttl_secs: 3600,
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_cache_key_deterministic() {
        let a = cache_key("question", &["content", "concept", "3"]);
        let b = cache_key("question", &["content", "concept", "3"]);
        let c = cache_key("question", &["content", "concept", "4"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("question:"));
    }

    #[test]
    fn test_cache_key_kind_separates_namespaces() {
        let a = cache_key("question", &["x"]);
        let b = cache_key("evaluation", &["x"]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_cache_roundtrip_and_invalidation() {
        let cache = memory_cache(10).await;
        let key = cache_key("question", &["abc"]);
        let value = serde_json::json!({"question": "What is a graph?", "score": 0.9});

        assert!(cache.get_json(&key).await.unwrap().is_none());

        cache.set_json(&key, &value, None).await.unwrap();
        let cached = cache.get_json(&key).await.unwrap().unwrap();
        assert_eq!(cached["question"], "What is a graph?");

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_hits, 1);

        cache.invalidate(&key).await.unwrap();
        assert!(cache.get_json(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_persists_across_reopen() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        let config = CacheConfig {
            enabled: true,
            db_path,
            max_entries: 10,
            default_ttl_secs: 3600,
        };

        let key = cache_key("question", &["persisted"]);
        {
            let cache = ArtifactCache::new(config.clone()).await.unwrap();
            cache
                .set_json(&key, &serde_json::json!({"question": "kept"}), None)
                .await
                .unwrap();
        }

        let reopened = ArtifactCache::new(config).await.unwrap();
        let cached = reopened.get_json(&key).await.unwrap().unwrap();
        assert_eq!(cached["question"], "kept");
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = memory_cache(10).await;
        let key = cache_key("evaluation", &["user", "42"]);

        cache
            .set_json(&key, &serde_json::json!({"score": 0.5}), Some(-1))
            .await
            .unwrap();

        assert!(cache.get_json(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = memory_cache(3).await;

        for i in 0..5 {
            let key = cache_key("question", &[&i.to_string()]);
            cache
                .set_json(&key, &serde_json::json!({"i": i}), None)
                .await
                .unwrap();
        }

        let stats = cache.stats().await.unwrap();
        assert!(stats.total_entries <= 3);
    }
}
